use ab_glyph::FontArc;
use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeDelta};
use std::collections::HashMap;

use super::anomaly::{Anomaly, RootCause};
use super::cost_explorer::{CostExplorer, CostQuery, CostSample};
use super::graph::{CostGraph, RenderedChart};
use super::organizations::AccountDirectory;

/// Days of context drawn on either side of the anomaly window.
const PERIOD_PADDING_DAYS: i64 = 8;
const DEFAULT_UNIT: &str = "USD";

/// A rendered chart and the file name it is uploaded under.
#[derive(Clone, Debug)]
pub struct NamedChart {
    pub name: String,
    pub title: String,
    pub chart: RenderedChart,
}

/// Turns each root cause of an anomaly into a stacked daily cost chart.
pub struct GraphGenerator<'a> {
    cost_explorer: &'a CostExplorer,
    accounts: &'a AccountDirectory,
    font: &'a FontArc,
}

impl<'a> GraphGenerator<'a> {
    pub fn new(
        cost_explorer: &'a CostExplorer,
        accounts: &'a AccountDirectory,
        font: &'a FontArc,
    ) -> Self {
        Self {
            cost_explorer,
            accounts,
            font,
        }
    }

    /// The `[start - 8d, end + 8d)` window charted for `anomaly`.
    pub fn period(anomaly: &Anomaly) -> (NaiveDate, NaiveDate) {
        let padding = TimeDelta::days(PERIOD_PADDING_DAYS);
        (
            anomaly.anomaly_start_date.date_naive() - padding,
            anomaly.anomaly_end_date.date_naive() + padding,
        )
    }

    pub fn chart_name(anomaly_id: &str, index: usize) -> String {
        format!("anomaly-{}-root-cause{}.png", anomaly_id, index + 1)
    }

    pub async fn generate(&self, anomaly: &Anomaly) -> Result<Vec<NamedChart>> {
        let (start, end) = Self::period(anomaly);
        let mut charts = Vec::with_capacity(anomaly.root_causes.len());

        for (i, cause) in anomaly.root_causes.iter().enumerate() {
            let (title, chart) = self
                .generate_one(start, end, cause)
                .await
                .with_context(|| format!("failed to generate graph for root cause {}", i + 1))?;
            charts.push(NamedChart {
                name: Self::chart_name(&anomaly.anomaly_id, i),
                title,
                chart,
            });
        }

        Ok(charts)
    }

    async fn generate_one(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        cause: &RootCause,
    ) -> Result<(String, RenderedChart)> {
        let query = CostQuery::for_root_cause(start, end, cause);
        let samples = self
            .cost_explorer
            .get_cost_and_usage(&query)
            .await
            .context("failed to get cost and usage")?;

        let mut title = cause.title();
        if title.is_empty() {
            title = "Total".to_string();
        }
        tracing::info!(
            "[GEN] Generating graph \"{}\" from {} to {} ({} samples)",
            title,
            start,
            end,
            samples.len()
        );

        let labels = self.series_labels(&samples, &title).await;
        let graph = CostGraph::new();
        for (sample, label) in samples.iter().zip(&labels) {
            graph.add_point(sample.date, sample.cost, label);
        }

        let unit = samples
            .iter()
            .rev()
            .map(|s| s.unit.as_str())
            .find(|u| !u.is_empty())
            .unwrap_or(DEFAULT_UNIT);
        let chart = graph.render(self.font, &title, &format!("Cost ({unit})"))?;
        Ok((title, chart))
    }

    /// One label per sample: the decorated account for grouped samples, the
    /// chart title for totals. Each account is resolved once.
    async fn series_labels(&self, samples: &[CostSample], title: &str) -> Vec<String> {
        let mut resolved: HashMap<&str, String> = HashMap::new();
        for sample in samples {
            if let Some(key) = sample.label.as_deref() {
                if !resolved.contains_key(key) {
                    let label = self.accounts.label_for(key).await;
                    resolved.insert(key, label);
                }
            }
        }

        samples
            .iter()
            .map(|s| match s.label.as_deref() {
                Some(key) => resolved.get(key).cloned().unwrap_or_else(|| key.to_string()),
                None => title.to_string(),
            })
            .collect()
    }
}
