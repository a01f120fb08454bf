use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::point::Point;
use tracing::{debug, info};

use super::binary::BinaryImage;
use super::morph::{dilate_run, open_run};
use super::{Line, Orientation, Span};
use crate::config::LineConfig;

/// Finds the horizontal and vertical ruled lines of a table image.
///
/// Each list is sorted by `(position, span.start)`.
pub fn extract_lines(binary: &BinaryImage, config: &LineConfig) -> (Vec<Line>, Vec<Line>) {
    let ink = binary.ink_mask();
    let horizontal = extract_oriented(&ink, Orientation::Horizontal, config);
    let vertical = extract_oriented(&ink, Orientation::Vertical, config);
    info!(
        "lines: {} horizontal, {} vertical",
        horizontal.len(),
        vertical.len()
    );
    (horizontal, vertical)
}

fn line_mask(ink: &GrayImage, orientation: Orientation, config: &LineConfig) -> GrayImage {
    let (extent, scale) = match orientation {
        Orientation::Horizontal => (ink.width(), config.horizontal_kernel_scale),
        Orientation::Vertical => (ink.height(), config.vertical_kernel_scale),
    };
    let length = (extent / scale.max(1)).max(1);
    let mut mask = open_run(ink, orientation, length);
    for _ in 0..config.dilation_iterations {
        mask = dilate_run(&mask, orientation, length);
    }
    debug!(
        "lines: {} kernel length {}",
        orientation.as_str(),
        length
    );
    mask
}

fn extract_oriented(ink: &GrayImage, orientation: Orientation, config: &LineConfig) -> Vec<Line> {
    let mask = line_mask(ink, orientation, config);
    let mut lines = find_contours::<u32>(&mask)
        .into_iter()
        .filter(|contour| contour.parent.is_none())
        .filter_map(|contour| bounding_box(&contour.points))
        .filter_map(|bbox| line_from_box(bbox, orientation, config.min_line_length))
        .collect::<Vec<_>>();
    lines.sort_by_key(|line| (line.position, line.span.start));
    lines
}

/// `(x, y, width, height)` of a point set.
fn bounding_box(points: &[Point<u32>]) -> Option<(u32, u32, u32, u32)> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in points {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

fn line_from_box(
    (x, y, width, height): (u32, u32, u32, u32),
    orientation: Orientation,
    min_length: u32,
) -> Option<Line> {
    let line = match orientation {
        Orientation::Horizontal => Line {
            orientation,
            position: y + height / 2,
            span: Span {
                start: x,
                end: x + width,
            },
            thickness: height,
        },
        Orientation::Vertical => Line {
            orientation,
            position: x + width / 2,
            span: Span {
                start: y,
                end: y + height,
            },
            thickness: width,
        },
    };
    (line.length() >= min_length).then_some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn grid_image() -> BinaryImage {
        let mut gray = GrayImage::from_pixel(200, 200, Luma([255]));
        for y in [50, 100] {
            draw_filled_rect_mut(&mut gray, Rect::at(0, y - 1).of_size(200, 3), Luma([0]));
        }
        for x in [50, 100] {
            draw_filled_rect_mut(&mut gray, Rect::at(x - 1, 0).of_size(3, 200), Luma([0]));
        }
        BinaryImage::from_gray(&gray, 127)
    }

    #[test]
    fn finds_full_width_rules() {
        let (horizontal, vertical) = extract_lines(&grid_image(), &LineConfig::default());
        let positions = horizontal.iter().map(|l| l.position).collect::<Vec<_>>();
        assert_eq!(positions, vec![50, 100]);
        let positions = vertical.iter().map(|l| l.position).collect::<Vec<_>>();
        assert_eq!(positions, vec![50, 100]);
        for line in horizontal.iter().chain(vertical.iter()) {
            assert_eq!(line.span, Span { start: 0, end: 200 });
            assert_eq!(line.thickness, 3);
        }
    }

    #[test]
    fn ignores_short_marks() {
        let mut gray = GrayImage::from_pixel(200, 200, Luma([255]));
        draw_filled_rect_mut(&mut gray, Rect::at(10, 10).of_size(20, 2), Luma([0]));
        draw_filled_rect_mut(&mut gray, Rect::at(10, 150).of_size(120, 2), Luma([0]));
        let binary = BinaryImage::from_gray(&gray, 127);
        let (horizontal, vertical) = extract_lines(&binary, &LineConfig::default());
        assert_eq!(horizontal.len(), 1);
        assert_eq!(horizontal[0].position, 151);
        assert_eq!(horizontal[0].span, Span { start: 6, end: 134 });
        assert!(vertical.is_empty());
    }

    #[test]
    fn text_blobs_are_not_lines() {
        let mut gray = GrayImage::from_pixel(400, 200, Luma([255]));
        for i in 0..8 {
            draw_filled_rect_mut(&mut gray, Rect::at(40 + i * 12, 80).of_size(6, 9), Luma([0]));
        }
        let binary = BinaryImage::from_gray(&gray, 127);
        let (horizontal, vertical) = extract_lines(&binary, &LineConfig::default());
        assert!(horizontal.is_empty());
        assert!(vertical.is_empty());
    }

    #[test]
    fn output_is_sorted_and_repeatable() {
        let mut gray = GrayImage::from_pixel(300, 300, Luma([255]));
        draw_filled_rect_mut(&mut gray, Rect::at(150, 200).of_size(100, 2), Luma([0]));
        draw_filled_rect_mut(&mut gray, Rect::at(10, 200).of_size(100, 2), Luma([0]));
        draw_filled_rect_mut(&mut gray, Rect::at(10, 40).of_size(250, 2), Luma([0]));
        let binary = BinaryImage::from_gray(&gray, 127);
        let config = LineConfig::default();
        let (first, _) = extract_lines(&binary, &config);
        let (second, _) = extract_lines(&binary, &config);
        assert_eq!(first, second);
        let keys = first
            .iter()
            .map(|l| (l.position, l.span.start))
            .collect::<Vec<_>>();
        assert_eq!(keys, vec![(41, 4), (201, 4), (201, 144)]);
    }
}
