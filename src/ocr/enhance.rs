use image::GrayImage;

use crate::table::{binarize_otsu, equalize_tiles};

const RETRY_CLIP_LIMIT: f32 = 3.0;
const RETRY_TILE_GRID: u32 = 8;

/// Enhanced crop for a low-confidence retry: local contrast equalization on
/// the first attempt, global Otsu binarization afterwards.
pub(super) fn enhance_for_retry(crop: &GrayImage, attempt: u32) -> GrayImage {
    if attempt == 0 {
        equalize_tiles(crop, RETRY_CLIP_LIMIT, RETRY_TILE_GRID)
    } else {
        binarize_otsu(crop).into_gray()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn later_attempts_are_two_level() {
        let crop = GrayImage::from_fn(40, 20, |x, _| Luma([120 + x as u8]));
        let enhanced = enhance_for_retry(&crop, 1);
        assert!(enhanced.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(enhanced.dimensions(), crop.dimensions());
    }

    #[test]
    fn first_attempt_keeps_shape_and_flat_regions() {
        let crop = GrayImage::from_pixel(40, 24, Luma([120]));
        let enhanced = enhance_for_retry(&crop, 0);
        assert_eq!(enhanced.dimensions(), crop.dimensions());
        let first = enhanced.get_pixel(0, 0)[0];
        assert!(enhanced.pixels().all(|p| p[0] == first));
    }
}
