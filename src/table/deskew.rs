use image::{GrayImage, Luma};
use imageproc::edges::canny;
use tracing::debug;

use super::hough::{HoughParams, Segment, detect_segments};
use crate::config::PreprocessConfig;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const CUBIC_A: f64 = -0.75;

/// Median angle (degrees) of the long straight segments in `gray`, or `None`
/// when no segment survives filtering.
pub(super) fn estimate_skew(gray: &GrayImage, config: &PreprocessConfig) -> Option<f64> {
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let segments = detect_segments(
        &edges,
        HoughParams {
            vote_threshold: config.hough_vote_threshold,
            min_line_length: config.hough_min_line_length,
            max_line_gap: config.hough_max_line_gap,
        },
    );
    let mut angles = segments
        .iter()
        .filter(|segment| segment.length() >= config.deskew_min_segment_length)
        .map(Segment::angle_degrees)
        .map(normalize_angle)
        .collect::<Vec<_>>();
    debug!(
        "deskew: {} segments, {} usable",
        segments.len(),
        angles.len()
    );
    median(&mut angles)
}

/// Folds a direction into (-45, 45] so horizontal and vertical strokes
/// agree on the skew they imply.
pub(super) fn normalize_angle(degrees: f64) -> f64 {
    let mut angle = degrees % 90.0;
    if angle > 45.0 {
        angle -= 90.0;
    } else if angle <= -45.0 {
        angle += 90.0;
    }
    angle
}

pub(super) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) * 0.5)
    } else {
        Some(values[mid])
    }
}

/// Rotates content skewed by `skew_degrees` back to level. The canvas grows to
/// hold the whole rotated image; samples outside the source repeat the edge.
pub(super) fn rotate_expanded(gray: &GrayImage, skew_degrees: f64) -> GrayImage {
    let (width, height) = gray.dimensions();
    let theta = skew_degrees.to_radians();
    let (sin, cos) = theta.sin_cos();
    let w = f64::from(width);
    let h = f64::from(height);
    let out_w = ((h * sin.abs() + w * cos.abs()).round() as u32).max(1);
    let out_h = ((h * cos.abs() + w * sin.abs()).round() as u32).max(1);

    let cx = (w - 1.0) * 0.5;
    let cy = (h - 1.0) * 0.5;
    let ocx = (f64::from(out_w) - 1.0) * 0.5;
    let ocy = (f64::from(out_h) - 1.0) * 0.5;

    let mut out = GrayImage::new(out_w, out_h);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let dx = f64::from(x) - ocx;
        let dy = f64::from(y) - ocy;
        let sx = cx + dx * cos - dy * sin;
        let sy = cy + dx * sin + dy * cos;
        *pixel = Luma([sample_bicubic(gray, sx, sy)]);
    }
    out
}

fn cubic_weight(t: f64) -> f64 {
    let t = t.abs();
    if t <= 1.0 {
        (CUBIC_A + 2.0) * t * t * t - (CUBIC_A + 3.0) * t * t + 1.0
    } else if t < 2.0 {
        CUBIC_A * t * t * t - 5.0 * CUBIC_A * t * t + 8.0 * CUBIC_A * t - 4.0 * CUBIC_A
    } else {
        0.0
    }
}

fn sample_bicubic(gray: &GrayImage, x: f64, y: f64) -> u8 {
    let (width, height) = gray.dimensions();
    let max_x = i64::from(width) - 1;
    let max_y = i64::from(height) - 1;
    let fx = x.floor();
    let fy = y.floor();
    let tx = x - fx;
    let ty = y - fy;

    let mut sum = 0.0;
    for j in -1i64..=2 {
        let wy = cubic_weight(j as f64 - ty);
        let sy = (fy as i64 + j).clamp(0, max_y) as u32;
        for i in -1i64..=2 {
            let wx = cubic_weight(i as f64 - tx);
            let sx = (fx as i64 + i).clamp(0, max_x) as u32;
            sum += f64::from(gray.get_pixel(sx, sy)[0]) * wx * wy;
        }
    }
    sum.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_line_segment_mut;

    #[test]
    fn normalizes_into_half_open_range() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(2.0), 2.0);
        assert_eq!(normalize_angle(92.0), 2.0);
        assert_eq!(normalize_angle(-88.0), 2.0);
        assert_eq!(normalize_angle(178.0), -2.0);
        assert_eq!(normalize_angle(45.0), 45.0);
        assert_eq!(normalize_angle(-45.0), 45.0);
        assert_eq!(normalize_angle(-90.0), 0.0);
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }

    #[test]
    fn zero_rotation_is_identity() {
        let gray = GrayImage::from_fn(30, 20, |x, y| Luma([((x * 8 + y) % 256) as u8]));
        assert_eq!(rotate_expanded(&gray, 0.0), gray);
    }

    #[test]
    fn rotation_expands_canvas_and_replicates_edges() {
        let gray = GrayImage::from_pixel(200, 100, Luma([255]));
        let rotated = rotate_expanded(&gray, 10.0);
        assert!(rotated.width() > 200);
        assert!(rotated.height() > 100);
        assert!(rotated.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn estimates_skew_of_tilted_rules() {
        let mut gray = GrayImage::from_pixel(400, 300, Luma([255]));
        let slope = 2.0f32.to_radians().tan();
        for base in [60.0f32, 150.0, 240.0] {
            for offset in 0..4 {
                let y0 = base + offset as f32;
                draw_line_segment_mut(
                    &mut gray,
                    (20.0, y0),
                    (380.0, y0 + 360.0 * slope),
                    Luma([0]),
                );
            }
        }
        let config = PreprocessConfig::default();
        let angle = estimate_skew(&gray, &config).expect("segments");
        assert!((1.0..=3.0).contains(&angle), "angle {}", angle);
    }

    #[test]
    fn blank_page_has_no_skew() {
        let gray = GrayImage::from_pixel(200, 200, Luma([255]));
        assert_eq!(estimate_skew(&gray, &PreprocessConfig::default()), None);
    }
}
