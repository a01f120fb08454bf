use image::{GrayImage, Luma};

use super::Orientation;

pub const INK: u8 = 0;
pub const PAPER: u8 = 255;

/// Two-level image: every pixel is either [`INK`] or [`PAPER`].
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryImage(GrayImage);

impl BinaryImage {
    /// Pixels brighter than `threshold` become paper, the rest ink.
    pub fn from_gray(gray: &GrayImage, threshold: u8) -> Self {
        let mut out = gray.clone();
        for pixel in out.pixels_mut() {
            pixel[0] = if pixel[0] > threshold { PAPER } else { INK };
        }
        Self(out)
    }

    /// Inverse of [`BinaryImage::ink_mask`]: foreground (non-zero) becomes ink.
    pub fn from_ink_mask(mask: &GrayImage) -> Self {
        let mut out = mask.clone();
        for pixel in out.pixels_mut() {
            pixel[0] = if pixel[0] > 0 { INK } else { PAPER };
        }
        Self(out)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_gray(self) -> GrayImage {
        self.0
    }

    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y)[0] == INK
    }

    /// Ink as foreground (255) on a zero background, the polarity imageproc's
    /// morphology and contour routines expect.
    pub fn ink_mask(&self) -> GrayImage {
        let (width, height) = self.0.dimensions();
        let mut mask = GrayImage::new(width, height);
        for (x, y, pixel) in self.0.enumerate_pixels() {
            if pixel[0] == INK {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    /// Share of the positions along a boundary strip `[x0, x1) x [y0, y1)`
    /// that carry any ink across the strip. A vertical boundary is walked
    /// row by row, a horizontal one column by column, so the stroke width of
    /// a rule does not change the result. `None` when the clipped region is
    /// empty.
    pub fn ink_coverage(
        &self,
        (x0, y0, x1, y1): (u32, u32, u32, u32),
        boundary: Orientation,
    ) -> Option<f64> {
        let x1 = x1.min(self.width());
        let y1 = y1.min(self.height());
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        let (covered, total) = match boundary {
            Orientation::Vertical => (
                (y0..y1).filter(|&y| (x0..x1).any(|x| self.is_ink(x, y))).count(),
                y1 - y0,
            ),
            Orientation::Horizontal => (
                (x0..x1).filter(|&x| (y0..y1).any(|y| self.is_ink(x, y))).count(),
                x1 - x0,
            ),
        };
        Some(covered as f64 / f64::from(total))
    }
}
