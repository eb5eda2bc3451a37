use chrono::NaiveDate;
use std::collections::HashSet;

/// A single x axis position. Positions without a label still mark where a bar sits.
#[derive(Clone, Debug, PartialEq)]
pub struct Tick {
    pub position: f64,
    pub label: String,
}

/// The shared x axis: every distinct date seen across all series.
#[derive(Debug, Default)]
pub struct DateAxis {
    dates: HashSet<NaiveDate>,
    sorted: Option<Vec<NaiveDate>>,
}

impl DateAxis {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a date and drops the cached ordering.
    pub fn record_date(&mut self, date: NaiveDate) {
        self.dates.insert(date);
        self.sorted = None;
    }

    /// All recorded dates, ascending and deduplicated.
    pub fn sorted_dates(&mut self) -> &[NaiveDate] {
        let dates = &self.dates;
        self.sorted.get_or_insert_with(|| {
            let mut sorted: Vec<NaiveDate> = dates.iter().copied().collect();
            sorted.sort_unstable();
            sorted
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Ticks for every date index inside `[min, max]`.
    ///
    /// Only every `ceil(dates / max_labels)`-th position (counted from `min`)
    /// carries a label, so no more than `max_labels` labels are emitted.
    pub fn tick_labels(&mut self, min: f64, max: f64, max_labels: usize) -> Vec<Tick> {
        let dates = self.sorted_dates();
        if dates.is_empty() || max_labels == 0 {
            return Vec::new();
        }

        let stride = dates.len().div_ceil(max_labels) as i64;

        dates
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let position = *i as f64;
                position >= min && position <= max
            })
            .map(|(i, date)| {
                let position = i as f64;
                let label = if ((position - min) as i64) % stride == 0 {
                    date.format("%Y-%m-%d").to_string()
                } else {
                    String::new()
                };
                Tick { position, label }
            })
            .collect()
    }
}
