use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_text_mut, text_size};

/// Evenly spaced "nice" values (1, 2, 5 x 10^n steps) covering `[min, max]`.
pub fn nice_ticks(mut min: f64, mut max: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    if min == max {
        return vec![min];
    }
    if min > max {
        std::mem::swap(&mut min, &mut max);
    }
    let step = nice_step((max - min) / count as f64);
    if step == 0.0 {
        return vec![min, max];
    }

    let start = (min / step).floor() * step;
    let stop = (max / step).ceil() * step;
    let n = ((stop - start) / step).round().clamp(0.0, 1000.0) as u32;

    (0..=n).map(|i| start + step * f64::from(i)).collect()
}

pub fn nice_step(step: f64) -> f64 {
    if !step.is_finite() || step <= 0.0 {
        return 0.0;
    }
    let base = 10_f64.powf(step.log10().floor());
    let error = step / base;
    let nice = if error >= 7.5 {
        10.0
    } else if error >= 3.5 {
        5.0
    } else if error >= 1.5 {
        2.0
    } else {
        1.0
    };
    nice * base
}

/// Formats a y axis value with just enough decimals for the tick step.
pub fn format_cost(value: f64, step: f64) -> String {
    let decimals = if step > 0.0 && step < 1.0 {
        (-step.log10().floor()).clamp(0.0, 4.0) as usize
    } else {
        0
    };
    // avoid printing "-0"
    let value = if value.abs() < f64::EPSILON { 0.0 } else { value };
    format!("{value:.decimals$}")
}

/// Width in pixels of `text` at `size`.
pub fn text_width(font: &FontArc, size: f32, text: &str) -> u32 {
    text_size(PxScale::from(size), font, text).0
}

/// Draw a dashed horizontal line on the image
pub fn draw_dashed_horizontal_line(
    img: &mut RgbaImage,
    y: f32,
    x_start: f32,
    x_end: f32,
    color: Rgba<u8>,
    dash_length: i32,
    gap_length: i32,
) {
    let y = y.round() as i32;
    let x_start = x_start.round() as i32;
    let x_end = x_end.round() as i32;

    if y < 0 || y >= img.height() as i32 {
        return;
    }

    let mut x = x_start;
    let mut drawing_dash = true;

    while x < x_end {
        if drawing_dash {
            let dash_end = (x + dash_length).min(x_end);
            for px in x.max(0)..dash_end.min(img.width() as i32) {
                img.put_pixel(px as u32, y as u32, color);
            }
            x += dash_length;
        } else {
            x += gap_length;
        }
        drawing_dash = !drawing_dash;
    }
}

/// Draws `text` rotated a quarter turn counter-clockwise, vertically centred on
/// `center_y` with its left edge at `x`.
pub fn draw_vertical_text(
    img: &mut RgbaImage,
    color: Rgba<u8>,
    x: i32,
    center_y: i32,
    size: f32,
    font: &FontArc,
    text: &str,
) {
    let scale = PxScale::from(size);
    let (w, h) = text_size(scale, font, text);
    if w == 0 || h == 0 {
        return;
    }

    let pad = 4;
    let mut label = RgbaImage::new(w + pad, h + pad);
    draw_text_mut(&mut label, color, 0, 0, scale, font, text);

    let rotated = imageops::rotate270(&label);
    let top = center_y - rotated.height() as i32 / 2;
    imageops::overlay(img, &rotated, i64::from(x), i64::from(top));
}
