use std::collections::BTreeMap;

use super::types::{MAX_SERIES, OTHERS_LABEL};

/// One series ready for drawing: dense values aligned to the date axis.
#[derive(Clone, Debug, PartialEq)]
pub struct ReducedSeries {
    pub label: String,
    pub values: Vec<f64>,
    pub total: f64,
}

/// Orders series by total cost (descending, ties by label) and folds
/// everything past the top `MAX_SERIES - 1` into a trailing "Others" series.
///
/// The per-date sum across the output always equals the per-date sum across
/// the input.
pub fn reduce_series(dense: BTreeMap<String, Vec<f64>>) -> Vec<ReducedSeries> {
    let mut series: Vec<ReducedSeries> = dense
        .into_iter()
        .map(|(label, values)| {
            let total = values.iter().sum();
            ReducedSeries {
                label,
                values,
                total,
            }
        })
        .collect();

    series.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.label.cmp(&b.label))
    });

    if series.len() <= MAX_SERIES {
        return series;
    }

    let rest = series.split_off(MAX_SERIES - 1);
    let width = rest.first().map(|s| s.values.len()).unwrap_or(0);
    let mut others = vec![0.0_f64; width];
    for s in &rest {
        for (slot, value) in others.iter_mut().zip(&s.values) {
            *slot += value;
        }
    }

    tracing::debug!(
        "[GRAPH] Folded {} series into \"{}\"",
        rest.len(),
        OTHERS_LABEL
    );

    series.push(ReducedSeries {
        label: OTHERS_LABEL.to_string(),
        total: others.iter().sum(),
        values: others,
    });
    series
}
