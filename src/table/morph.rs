use image::{GrayImage, Luma};

use super::Orientation;

/// Opening with a 1 pixel thick, `length` pixel long element laid along
/// `orientation`. Foreground is any non-zero pixel.
pub(super) fn open_run(mask: &GrayImage, orientation: Orientation, length: u32) -> GrayImage {
    dilate_run(&erode_run(mask, orientation, length), orientation, length)
}

pub(super) fn erode_run(mask: &GrayImage, orientation: Orientation, length: u32) -> GrayImage {
    let (before, after) = reach(length);
    filter_runs(mask, orientation, before, after, |fg, total| fg == total)
}

pub(super) fn dilate_run(mask: &GrayImage, orientation: Orientation, length: u32) -> GrayImage {
    let (before, after) = reach(length);
    filter_runs(mask, orientation, after, before, |fg, _| fg > 0)
}

/// Pixels covered before and after the anchor, which sits at `length / 2`.
fn reach(length: u32) -> (u32, u32) {
    let length = length.max(1);
    let anchor = length / 2;
    (anchor, length - 1 - anchor)
}

/// Applies `keep(foreground, total)` to every window along each row (or
/// column). Windows are clipped at the image border.
fn filter_runs(
    mask: &GrayImage,
    orientation: Orientation,
    before: u32,
    after: u32,
    keep: impl Fn(u32, u32) -> bool,
) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut out = GrayImage::new(width, height);
    let (runs, len) = match orientation {
        Orientation::Horizontal => (height, width),
        Orientation::Vertical => (width, height),
    };
    if len == 0 {
        return out;
    }
    let at = |run: u32, i: u32| match orientation {
        Orientation::Horizontal => (i, run),
        Orientation::Vertical => (run, i),
    };

    let mut prefix = vec![0u32; len as usize + 1];
    for run in 0..runs {
        for i in 0..len {
            let (x, y) = at(run, i);
            prefix[i as usize + 1] = prefix[i as usize] + u32::from(mask.get_pixel(x, y)[0] > 0);
        }
        for i in 0..len {
            let lo = i.saturating_sub(before);
            let hi = i.saturating_add(after).min(len - 1);
            let fg = prefix[hi as usize + 1] - prefix[lo as usize];
            if keep(fg, hi - lo + 1) {
                let (x, y) = at(run, i);
                out.put_pixel(x, y, Luma([255]));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[u8]) -> GrayImage {
        GrayImage::from_fn(values.len() as u32, 1, |x, _| Luma([values[x as usize]]))
    }

    fn as_bits(image: &GrayImage) -> Vec<u8> {
        image.pixels().map(|p| u8::from(p[0] > 0)).collect()
    }

    #[test]
    fn erosion_removes_short_runs() {
        let mask = row(&[0, 255, 255, 0, 255, 255, 255, 255, 255, 0]);
        let eroded = erode_run(&mask, Orientation::Horizontal, 3);
        assert_eq!(as_bits(&eroded), vec![0, 0, 0, 0, 0, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn opening_keeps_long_runs_whole() {
        let mask = row(&[0, 255, 255, 0, 255, 255, 255, 255, 255, 0]);
        let opened = open_run(&mask, Orientation::Horizontal, 3);
        assert_eq!(as_bits(&opened), vec![0, 0, 0, 0, 1, 1, 1, 1, 1, 0]);
    }

    #[test]
    fn opening_with_even_length_is_exact() {
        let mask = row(&[0, 255, 255, 255, 255, 0, 255, 255, 255, 0]);
        let opened = open_run(&mask, Orientation::Horizontal, 4);
        assert_eq!(as_bits(&opened), vec![0, 1, 1, 1, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn vertical_runs_ignore_horizontal_strokes() {
        let mut mask = GrayImage::new(6, 6);
        for x in 0..6 {
            mask.put_pixel(x, 2, Luma([255]));
        }
        for y in 0..6 {
            mask.put_pixel(4, y, Luma([255]));
        }
        let opened = open_run(&mask, Orientation::Vertical, 4);
        for y in 0..6 {
            assert_eq!(opened.get_pixel(4, y)[0], 255);
        }
        assert_eq!(opened.get_pixel(1, 2)[0], 0);
    }

    #[test]
    fn dilation_grows_along_axis_only() {
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(2, 2, Luma([255]));
        let dilated = dilate_run(&mask, Orientation::Horizontal, 3);
        assert_eq!(dilated.get_pixel(1, 2)[0], 255);
        assert_eq!(dilated.get_pixel(3, 2)[0], 255);
        assert_eq!(dilated.get_pixel(2, 1)[0], 0);
        assert_eq!(dilated.pixels().filter(|p| p[0] > 0).count(), 3);
    }
}
