use ab_glyph::FontArc;
use image::Rgba;
use thiserror::Error;

static DEFAULT_FONT: &[u8] = include_bytes!("../../../assets/fonts/DejaVuSans.ttf");

/// Maximum number of series drawn on one chart, the "Others" bucket included.
pub const MAX_SERIES: usize = 10;

/// Label of the synthetic series that collects everything past the top entries.
pub const OTHERS_LABEL: &str = "Others";

/// Maximum number of non-empty date labels on the x axis.
pub const MAX_X_LABELS: usize = 8;

/// Series colors, assigned by position in the reduced set.
pub const PALETTE: [Rgba<u8>; 10] = [
    Rgba([51, 153, 255, 255]),
    Rgba([255, 102, 102, 255]),
    Rgba([46, 204, 113, 255]),
    Rgba([138, 43, 226, 255]),
    Rgba([255, 179, 0, 255]),
    Rgba([51, 12, 180, 255]),
    Rgba([0, 128, 0, 255]),
    Rgba([255, 102, 0, 255]),
    Rgba([126, 0, 185, 255]),
    Rgba([140, 81, 10, 255]),
];

/// Used for any series index past the end of [`PALETTE`].
pub const FALLBACK_COLOR: Rgba<u8> = Rgba([0, 128, 255, 255]);

/// Returns the color for the series drawn at `index`. Never cycles.
pub fn series_color(index: usize) -> Rgba<u8> {
    PALETTE.get(index).copied().unwrap_or(FALLBACK_COLOR)
}

#[derive(Debug, Error)]
pub enum GraphError {
    /// The layout cannot produce an image, e.g. a zero bar width or an empty canvas.
    #[error("Invalid chart layout: {0}")]
    InvalidLayout(String),
    #[error("Failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Failed to load font: {0}")]
    Font(String),
}

/// Loads the TTF at `path`, or the bundled DejaVu Sans when no path is given.
pub fn load_font(path: Option<&str>) -> Result<FontArc, GraphError> {
    match path {
        Some(path) => {
            let bytes = std::fs::read(path)
                .map_err(|e| GraphError::Font(format!("{path}: {e}")))?;
            FontArc::try_from_vec(bytes)
                .map_err(|_| GraphError::Font(format!("{path}: not a valid font")))
        }
        None => FontArc::try_from_slice(DEFAULT_FONT)
            .map_err(|_| GraphError::Font("bundled font is invalid".to_string())),
    }
}

/// Fixed geometry of the chart. Every chart is drawn at the same size so it
/// embeds consistently in chat messages.
#[derive(Clone, Copy, Debug)]
pub struct ChartStyle {
    pub width: u32,
    pub height: u32,
    pub bar_width: f32,
    pub left_margin: f32,
    pub right_margin: f32,
    pub top_margin: f32,
    pub bottom_margin: f32,
    pub title_size: f32,
    pub label_size: f32,
    pub tick_size: f32,
    pub legend_size: f32,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 800,
            height: 400,
            bar_width: 20.0,
            left_margin: 72.0,
            right_margin: 20.0,
            top_margin: 44.0,
            bottom_margin: 56.0,
            title_size: 18.0,
            label_size: 14.0,
            tick_size: 11.0,
            legend_size: 11.0,
        }
    }
}

impl ChartStyle {
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.width == 0 || self.height == 0 {
            return Err(GraphError::InvalidLayout(format!(
                "canvas must not be empty ({}x{})",
                self.width, self.height
            )));
        }
        if self.bar_width.is_nan() || self.bar_width <= 0.0 {
            return Err(GraphError::InvalidLayout(format!(
                "bar width must be positive, got {}",
                self.bar_width
            )));
        }
        let plot_w = self.width as f32 - self.left_margin - self.right_margin;
        let plot_h = self.height as f32 - self.top_margin - self.bottom_margin;
        if plot_w <= 0.0 || plot_h <= 0.0 {
            return Err(GraphError::InvalidLayout(
                "margins leave no room for the plot area".to_string(),
            ));
        }
        Ok(())
    }
}

/// An encoded chart together with its exact byte length, so transports can
/// declare the content length up front.
#[derive(Clone, Debug)]
pub struct RenderedChart {
    pub data: Vec<u8>,
    pub size: u64,
}

impl RenderedChart {
    pub fn new(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { data, size }
    }
}
