use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::axis::DateAxis;

/// Sparse per-series cost samples plus the date axis they share.
///
/// A second point for the same `(label, date)` replaces the first one.
#[derive(Debug, Default)]
pub struct SeriesStore {
    points: HashMap<String, HashMap<NaiveDate, f64>>,
    axis: DateAxis,
}

impl SeriesStore {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, date: NaiveDate, cost: f64, label: &str) {
        self.points
            .entry(label.to_string())
            .or_default()
            .insert(date, cost);
        self.axis.record_date(date);
    }

    pub fn axis(&mut self) -> &mut DateAxis {
        &mut self.axis
    }

    pub fn series_count(&self) -> usize {
        self.points.len()
    }

    /// Expands every series into a vector aligned to the sorted axis dates.
    ///
    /// Dates a series has no sample for are filled with `0.0`.
    pub fn materialize(&mut self) -> BTreeMap<String, Vec<f64>> {
        let dates = self.axis.sorted_dates();

        self.points
            .iter()
            .map(|(label, samples)| {
                let dense = dates
                    .iter()
                    .map(|date| samples.get(date).copied().unwrap_or(0.0))
                    .collect();
                (label.clone(), dense)
            })
            .collect()
    }
}
