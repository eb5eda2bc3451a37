mod axis;
mod drawing;
mod helpers;
mod reducer;
mod series;
mod types;

pub use types::{ChartStyle, GraphError, RenderedChart, load_font};
#[cfg(test)]
pub use types::{FALLBACK_COLOR, OTHERS_LABEL, PALETTE, series_color};

use drawing::ChartLayout;
use reducer::reduce_series;
use series::SeriesStore;
use types::MAX_X_LABELS;

use ab_glyph::FontArc;
use chrono::NaiveDate;
use image::DynamicImage;
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Daily cost samples for one chart, rendered as stacked bars.
///
/// Points may be added from several tasks at once; every access goes through
/// one lock so a render never observes a half-applied insert.
#[derive(Debug, Default)]
pub struct CostGraph {
    store: Mutex<SeriesStore>,
    style: ChartStyle,
}

impl CostGraph {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_style(style: ChartStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, SeriesStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `cost` for `label` on `date`, replacing any earlier value.
    pub fn add_point(&self, date: NaiveDate, cost: f64, label: &str) {
        self.lock().add_point(date, cost, label);
    }

    pub fn series_count(&self) -> usize {
        self.lock().series_count()
    }

    pub fn date_count(&self) -> usize {
        self.lock().axis().len()
    }

    /// Aligns, reduces and lays out the current samples without drawing.
    pub fn layout(&self) -> ChartLayout {
        let mut store = self.lock();
        if store.axis().is_empty() {
            tracing::debug!("[GRAPH] No samples recorded, laying out an empty chart");
        }
        let dense = store.materialize();
        let date_count = store.axis().len();
        let reduced = reduce_series(dense);

        let has_legend = reduced.len() > 1;
        let max_position = date_count.saturating_sub(1) as f64 + if has_legend { 2.0 } else { 0.0 };
        let x_ticks = store.axis().tick_labels(0.0, max_position, MAX_X_LABELS);
        drop(store);

        ChartLayout::build(&reduced, date_count, x_ticks)
    }

    /// Renders the chart as a PNG. An empty graph still yields a valid image
    /// with axes and title but no bars and no legend.
    pub fn render(
        &self,
        font: &FontArc,
        title: &str,
        y_label: &str,
    ) -> Result<RenderedChart, GraphError> {
        self.style.validate()?;

        let (series, dates) = (self.series_count(), self.date_count());
        let layout = self.layout();
        tracing::info!(
            "[GRAPH] Rendering \"{}\": {} series over {} dates, {} bar segments, legend={}",
            title,
            series,
            dates,
            layout.bars.len(),
            layout.legend.as_ref().map(|l| l.len()).unwrap_or(0)
        );

        let img = drawing::draw_chart(&self.style, &layout, font, title, y_label);

        let dyna = DynamicImage::ImageRgba8(img);
        let mut out_buf: Vec<u8> = Vec::new();
        dyna.write_to(&mut Cursor::new(&mut out_buf), image::ImageFormat::Png)
            .map_err(|e| {
                tracing::error!("[GRAPH] Failed to encode PNG: {}", e);
                GraphError::Encode(e)
            })?;

        let chart = RenderedChart::new(out_buf);
        tracing::info!(
            "[GRAPH] Successfully generated graph ({} bytes)",
            chart.size
        );
        Ok(chart)
    }
}
