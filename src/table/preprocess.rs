use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::close;
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::Serialize;
use tracing::{debug, info};

use super::binary::{BinaryImage, INK, PAPER};
use super::{clahe, deskew};
use crate::config::{BinarizeMethod, PreprocessConfig};

const FIXED_THRESHOLD: u8 = 127;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreprocessInfo {
    pub input_width: u32,
    pub input_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub contrast_adjusted: bool,
    pub rotation_angle: f64,
    pub binarization: &'static str,
    pub denoised: bool,
}

#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    pub binary: BinaryImage,
    /// Deskewed grayscale without contrast enhancement, same frame as `binary`.
    pub aligned: GrayImage,
    pub info: PreprocessInfo,
}

pub fn preprocess(image: &DynamicImage, config: &PreprocessConfig) -> PreprocessOutput {
    let (input_width, input_height) = image.dimensions();
    info!("preprocess: input {}x{}", input_width, input_height);

    let gray = to_grayscale(image);
    let contrasted = config
        .enable_contrast_adjustment
        .then(|| clahe::equalize_tiles(&gray, config.clahe_clip_limit, config.clahe_tile_size));
    let working = contrasted.as_ref().unwrap_or(&gray);

    let skew = if config.enable_rotation_correction {
        deskew::estimate_skew(working, config)
            .filter(|angle| angle.abs() >= config.rotation_angle_threshold)
    } else {
        None
    };
    let (levelled, aligned, rotation_angle) = match skew {
        Some(angle) => {
            info!("preprocess: correcting skew of {:.2} degrees", angle);
            (
                deskew::rotate_expanded(working, angle),
                deskew::rotate_expanded(&gray, angle),
                angle,
            )
        }
        None => (working.clone(), gray.clone(), 0.0),
    };

    let binary = binarize(&levelled, config.binarization);
    let binary = denoise(binary, config.denoise_kernel_size, config.morphology_iterations);
    let (output_width, output_height) = binary.dimensions();
    debug!(
        "preprocess: output {}x{} ({})",
        output_width,
        output_height,
        config.binarization.as_str()
    );

    PreprocessOutput {
        binary,
        aligned,
        info: PreprocessInfo {
            input_width,
            input_height,
            output_width,
            output_height,
            contrast_adjusted: contrasted.is_some(),
            rotation_angle,
            binarization: config.binarization.as_str(),
            denoised: config.denoise_kernel_size > 1,
        },
    }
}

/// Luma of the image composited over white.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
        let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
        let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
        luma.put_pixel(x, y, Luma([value]));
    }
    luma
}

pub(crate) fn binarize(gray: &GrayImage, method: BinarizeMethod) -> BinaryImage {
    match method {
        BinarizeMethod::Otsu => binarize_otsu(gray),
        BinarizeMethod::Adaptive { block_size, c } => binarize_adaptive(gray, block_size, c),
        BinarizeMethod::Fixed => BinaryImage::from_gray(gray, FIXED_THRESHOLD),
    }
}

pub(crate) fn binarize_otsu(gray: &GrayImage) -> BinaryImage {
    let mut values = gray.pixels().map(|p| p[0]);
    let uniform = match values.next() {
        Some(first) => values.all(|value| value == first),
        None => true,
    };
    if uniform {
        return BinaryImage::from_gray(gray, FIXED_THRESHOLD);
    }
    BinaryImage::from_gray(gray, otsu_level(gray))
}

/// Gaussian-weighted local mean minus `c`, with the sigma a `block_size`
/// aperture implies.
fn binarize_adaptive(gray: &GrayImage, block_size: u32, c: i32) -> BinaryImage {
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local = gaussian_blur_f32(gray, sigma);
    let mut out = gray.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let threshold = i32::from(local.get_pixel(x, y)[0]) - c;
        pixel[0] = if i32::from(pixel[0]) > threshold { PAPER } else { INK };
    }
    BinaryImage::from_gray(&out, FIXED_THRESHOLD)
}

/// Drops ink specks whose bounding box fits in a `kernel_size` square
/// (grown by `iterations`), then closes small gaps in what is left. Strokes
/// of any width survive untouched.
fn denoise(binary: BinaryImage, kernel_size: u32, iterations: u32) -> BinaryImage {
    let radius = (kernel_size / 2).saturating_mul(iterations).min(u32::from(u8::MAX)) as u8;
    if radius == 0 {
        return binary;
    }
    let ink = binary.ink_mask();
    let cleaned = drop_specks(&ink, kernel_size.saturating_mul(iterations));
    let closed = close(&cleaned, Norm::LInf, radius);
    BinaryImage::from_ink_mask(&closed)
}

fn drop_specks(mask: &GrayImage, max_side: u32) -> GrayImage {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let count = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    // (min_x, min_y, max_x, max_y) per label
    let mut boxes = vec![(u32::MAX, u32::MAX, 0u32, 0u32); count + 1];
    for (x, y, label) in labels.enumerate_pixels() {
        let bbox = &mut boxes[label[0] as usize];
        bbox.0 = bbox.0.min(x);
        bbox.1 = bbox.1.min(y);
        bbox.2 = bbox.2.max(x);
        bbox.3 = bbox.3.max(y);
    }
    let speck = boxes
        .iter()
        .map(|&(x0, y0, x1, y1)| x1 >= x0 && x1 - x0 < max_side && y1 - y0 < max_side)
        .collect::<Vec<_>>();

    let mut out = mask.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let label = labels.get_pixel(x, y)[0] as usize;
        if label != 0 && speck[label] {
            pixel[0] = 0;
        }
    }
    let dropped = speck.iter().skip(1).filter(|&&is_speck| is_speck).count();
    debug!("preprocess: dropped {} ink specks", dropped);
    out
}
