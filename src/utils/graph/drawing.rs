use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;

use super::axis::Tick;
use super::helpers::{
    draw_dashed_horizontal_line, draw_vertical_text, format_cost, nice_ticks, text_width,
};
use super::reducer::ReducedSeries;
use super::types::{ChartStyle, series_color};

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const AXIS_COLOR: Rgba<u8> = Rgba([64, 64, 64, 255]);
const GRID_COLOR: Rgba<u8> = Rgba([220, 220, 220, 255]);
const TEXT_COLOR: Rgba<u8> = Rgba([32, 32, 32, 255]);
const LEGEND_BORDER: Rgba<u8> = Rgba([190, 190, 190, 255]);

/// Extra empty slots after the last bar when a legend is drawn.
const LEGEND_SLOTS: f64 = 2.0;
const Y_TICK_COUNT: usize = 5;

/// One stacked segment: series `series` at date index `index`, spanning
/// `bottom..top` in cost units.
#[derive(Clone, Debug, PartialEq)]
pub struct Bar {
    pub index: usize,
    pub series: usize,
    pub bottom: f64,
    pub top: f64,
    pub color: Rgba<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: Rgba<u8>,
}

/// Everything needed to draw a chart, computed before touching any pixels.
#[derive(Clone, Debug)]
pub struct ChartLayout {
    /// Width of the x domain in bar slots, trailing legend room included.
    pub slot_count: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub y_ticks: Vec<f64>,
    pub x_ticks: Vec<Tick>,
    pub bars: Vec<Bar>,
    /// `None` when there are fewer than two series.
    pub legend: Option<Vec<LegendEntry>>,
}

impl ChartLayout {
    pub fn build(series: &[ReducedSeries], date_count: usize, x_ticks: Vec<Tick>) -> Self {
        let has_legend = series.len() > 1;
        let extra = if has_legend { LEGEND_SLOTS } else { 0.0 };
        let slot_count = (date_count as f64 + extra).max(1.0);

        // stack in reduction order, so the largest series forms the base
        let mut cumulative = vec![0.0_f64; date_count];
        let mut bars = Vec::new();
        for (series_idx, s) in series.iter().enumerate() {
            let color = series_color(series_idx);
            for (index, value) in s.values.iter().enumerate().take(date_count) {
                let bottom = cumulative[index];
                let top = bottom + value;
                cumulative[index] = top;
                if *value != 0.0 {
                    bars.push(Bar {
                        index,
                        series: series_idx,
                        bottom,
                        top,
                        color,
                    });
                }
            }
        }

        let (low, high) = bars.iter().fold((0.0_f64, 0.0_f64), |(lo, hi), bar| {
            (
                lo.min(bar.bottom).min(bar.top),
                hi.max(bar.bottom).max(bar.top),
            )
        });
        let (low, high) = if high - low > 0.0 { (low, high) } else { (0.0, 1.0) };

        let y_ticks = nice_ticks(low, high, Y_TICK_COUNT);
        let y_min = y_ticks.first().copied().unwrap_or(low).min(low);
        let y_max = y_ticks.last().copied().unwrap_or(high).max(high);

        let legend = has_legend.then(|| {
            series
                .iter()
                .enumerate()
                .map(|(i, s)| LegendEntry {
                    label: s.label.clone(),
                    color: series_color(i),
                })
                .collect()
        });

        Self {
            slot_count,
            y_min,
            y_max,
            y_ticks,
            x_ticks,
            bars,
            legend,
        }
    }
}

/// Pixel geometry of the plot rectangle.
#[derive(Clone, Copy, Debug)]
pub struct PlotArea {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl PlotArea {
    pub fn new(style: &ChartStyle) -> Self {
        Self {
            left: style.left_margin,
            top: style.top_margin,
            right: style.width as f32 - style.right_margin,
            bottom: style.height as f32 - style.bottom_margin,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Centre of the bar slot at `position`.
    pub fn project_x(&self, layout: &ChartLayout, position: f64) -> f32 {
        self.left + ((position + 0.5) / layout.slot_count) as f32 * self.width()
    }

    pub fn project_y(&self, layout: &ChartLayout, value: f64) -> f32 {
        let ratio = (value - layout.y_min) / (layout.y_max - layout.y_min);
        self.bottom - ratio as f32 * self.height()
    }
}

pub fn draw_title(img: &mut RgbaImage, style: &ChartStyle, font: &FontArc, title: &str) {
    if title.is_empty() {
        return;
    }
    let w = text_width(font, style.title_size, title) as f32;
    let x = ((style.width as f32 - w) / 2.0).max(0.0);
    draw_text_mut(
        img,
        TEXT_COLOR,
        x as i32,
        10,
        PxScale::from(style.title_size),
        font,
        title,
    );
}

pub fn draw_y_axis(
    img: &mut RgbaImage,
    style: &ChartStyle,
    area: &PlotArea,
    layout: &ChartLayout,
    font: &FontArc,
    y_label: &str,
) {
    draw_line_segment_mut(
        img,
        (area.left, area.top),
        (area.left, area.bottom),
        AXIS_COLOR,
    );

    let step = match layout.y_ticks.as_slice() {
        [first, second, ..] => second - first,
        _ => 1.0,
    };

    for value in &layout.y_ticks {
        let y = area.project_y(layout, *value);
        if y < area.top - 0.5 || y > area.bottom + 0.5 {
            continue;
        }
        if y < area.bottom - 0.5 {
            draw_dashed_horizontal_line(img, y, area.left + 1.0, area.right, GRID_COLOR, 4, 3);
        }
        draw_line_segment_mut(img, (area.left - 4.0, y), (area.left, y), AXIS_COLOR);

        let text = format_cost(*value, step);
        let w = text_width(font, style.tick_size, &text) as f32;
        draw_text_mut(
            img,
            TEXT_COLOR,
            (area.left - 8.0 - w) as i32,
            (y - style.tick_size / 2.0) as i32,
            PxScale::from(style.tick_size),
            font,
            &text,
        );
    }

    draw_vertical_text(
        img,
        TEXT_COLOR,
        4,
        ((area.top + area.bottom) / 2.0) as i32,
        style.label_size,
        font,
        y_label,
    );
}

pub fn draw_x_axis(
    img: &mut RgbaImage,
    style: &ChartStyle,
    area: &PlotArea,
    layout: &ChartLayout,
    font: &FontArc,
) {
    let zero = area.project_y(layout, 0.0).clamp(area.top, area.bottom);
    draw_line_segment_mut(img, (area.left, zero), (area.right, zero), AXIS_COLOR);
    if zero < area.bottom {
        draw_line_segment_mut(
            img,
            (area.left, area.bottom),
            (area.right, area.bottom),
            AXIS_COLOR,
        );
    }

    for tick in &layout.x_ticks {
        let x = area.project_x(layout, tick.position);
        let tick_len = if tick.label.is_empty() { 3.0 } else { 6.0 };
        draw_line_segment_mut(
            img,
            (x, area.bottom),
            (x, area.bottom + tick_len),
            AXIS_COLOR,
        );
        if tick.label.is_empty() {
            continue;
        }
        let w = text_width(font, style.tick_size, &tick.label) as f32;
        draw_text_mut(
            img,
            TEXT_COLOR,
            (x - w / 2.0) as i32,
            (area.bottom + 9.0) as i32,
            PxScale::from(style.tick_size),
            font,
            &tick.label,
        );
    }

    let caption = "Date";
    let w = text_width(font, style.label_size, caption) as f32;
    draw_text_mut(
        img,
        TEXT_COLOR,
        ((area.left + area.right - w) / 2.0) as i32,
        (style.height as f32 - style.label_size - 8.0) as i32,
        PxScale::from(style.label_size),
        font,
        caption,
    );
}

pub fn draw_bars(img: &mut RgbaImage, style: &ChartStyle, area: &PlotArea, layout: &ChartLayout) {
    for bar in &layout.bars {
        let center = area.project_x(layout, bar.index as f64);
        let y_a = area.project_y(layout, bar.bottom);
        let y_b = area.project_y(layout, bar.top);
        let (y_top, y_bottom) = if y_a < y_b { (y_a, y_b) } else { (y_b, y_a) };

        let x0 = (center - style.bar_width / 2.0).round() as i32;
        let y0 = y_top.round() as i32;
        let height = (y_bottom.round() as i32 - y0).max(0) as u32;
        let width = style.bar_width.round().max(1.0) as u32;
        if height == 0 {
            continue;
        }

        tracing::trace!(
            "[GRAPH] Bar series={} index={} {:.2}..{:.2}",
            bar.series,
            bar.index,
            bar.bottom,
            bar.top
        );
        draw_filled_rect_mut(img, Rect::at(x0, y0).of_size(width, height), bar.color);
    }
}

/// Legend box anchored to the top right corner of the plot.
pub fn draw_legend(
    img: &mut RgbaImage,
    style: &ChartStyle,
    area: &PlotArea,
    entries: &[LegendEntry],
    font: &FontArc,
) {
    if entries.is_empty() {
        return;
    }

    let swatch = style.legend_size.round() as u32;
    let row_height = style.legend_size + 4.0;
    let padding = 5.0;
    let label_w = entries
        .iter()
        .map(|e| text_width(font, style.legend_size, &e.label))
        .max()
        .unwrap_or(0) as f32;

    let box_w = padding * 3.0 + swatch as f32 + label_w;
    let box_h = padding * 2.0 + row_height * entries.len() as f32;
    let box_x = (area.right - box_w - 4.0).max(area.left);
    let box_y = area.top + 4.0;

    let frame = Rect::at(box_x as i32, box_y as i32).of_size(box_w as u32, box_h as u32);
    draw_filled_rect_mut(img, frame, BACKGROUND);
    draw_hollow_rect_mut(img, frame, LEGEND_BORDER);

    for (i, entry) in entries.iter().enumerate() {
        let row_y = box_y + padding + row_height * i as f32;
        draw_filled_rect_mut(
            img,
            Rect::at((box_x + padding) as i32, (row_y + 2.0) as i32).of_size(swatch, swatch),
            entry.color,
        );
        draw_text_mut(
            img,
            TEXT_COLOR,
            (box_x + padding * 2.0 + swatch as f32) as i32,
            row_y as i32,
            PxScale::from(style.legend_size),
            font,
            &entry.label,
        );
    }
}

/// Paints a full chart onto a fresh canvas.
pub fn draw_chart(
    style: &ChartStyle,
    layout: &ChartLayout,
    font: &FontArc,
    title: &str,
    y_label: &str,
) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(style.width, style.height, BACKGROUND);
    let area = PlotArea::new(style);

    draw_y_axis(&mut img, style, &area, layout, font, y_label);
    draw_bars(&mut img, style, &area, layout);
    draw_x_axis(&mut img, style, &area, layout, font);
    if let Some(entries) = &layout.legend {
        draw_legend(&mut img, style, &area, entries, font);
    }
    draw_title(&mut img, style, font, title);

    img
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(label: &str, values: &[f64]) -> ReducedSeries {
        ReducedSeries {
            label: label.to_string(),
            values: values.to_vec(),
            total: values.iter().sum(),
        }
    }

    #[test]
    fn bars_stack_on_previous_series() {
        let reduced = vec![series("a", &[3.0, 1.0]), series("b", &[2.0, 0.0])];
        let layout = ChartLayout::build(&reduced, 2, Vec::new());

        assert_eq!(layout.bars.len(), 3);
        let stacked = layout
            .bars
            .iter()
            .find(|b| b.series == 1 && b.index == 0)
            .unwrap();
        assert_eq!(stacked.bottom, 3.0);
        assert_eq!(stacked.top, 5.0);
        assert!(layout.y_max >= 5.0);
        assert_eq!(layout.y_min, 0.0);
    }

    #[test]
    fn single_series_has_no_legend_or_extra_room() {
        let layout = ChartLayout::build(&[series("only", &[1.0, 2.0, 3.0])], 3, Vec::new());
        assert!(layout.legend.is_none());
        assert_eq!(layout.slot_count, 3.0);
    }

    #[test]
    fn multiple_series_reserve_room_for_the_legend() {
        let reduced = vec![series("a", &[1.0]), series("b", &[1.0])];
        let layout = ChartLayout::build(&reduced, 1, Vec::new());
        let legend = layout.legend.unwrap();
        assert_eq!(
            legend.iter().map(|e| e.label.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(legend[0].color, series_color(0));
        assert_eq!(layout.slot_count, 1.0 + LEGEND_SLOTS);
    }

    #[test]
    fn empty_layout_still_has_a_y_range() {
        let layout = ChartLayout::build(&[], 0, Vec::new());
        assert!(layout.bars.is_empty());
        assert!(layout.legend.is_none());
        assert!(layout.y_max > layout.y_min);
        assert_eq!(layout.slot_count, 1.0);
    }

    #[test]
    fn negative_costs_extend_the_range_below_zero() {
        let layout = ChartLayout::build(&[series("credit", &[-2.0, 4.0])], 2, Vec::new());
        assert!(layout.y_min <= -2.0);
        assert!(layout.y_max >= 4.0);
    }

    #[test]
    fn projection_maps_the_y_range_onto_the_plot() {
        let style = ChartStyle::default();
        let area = PlotArea::new(&style);
        let layout = ChartLayout::build(&[series("a", &[10.0])], 1, Vec::new());
        assert_eq!(area.project_y(&layout, layout.y_min), area.bottom);
        assert_eq!(area.project_y(&layout, layout.y_max), area.top);
        assert_eq!(area.project_x(&layout, 0.0), area.left + area.width() / 2.0);
    }
}
