use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{BinarizeMethod, EngineKind, PipelineConfig};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");
const DEFAULT_ADAPTIVE_BLOCK_SIZE: u32 = 11;
const DEFAULT_ADAPTIVE_C: i32 = 2;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    preprocess: Option<PreprocessSettings>,
    lines: Option<LineSettings>,
    merge: Option<MergeSettings>,
    ocr: Option<OcrSettings>,
    geometry: Option<GeometrySettings>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PreprocessSettings {
    contrast: Option<bool>,
    clahe_clip_limit: Option<f32>,
    clahe_tile_size: Option<u32>,
    rotation: Option<bool>,
    rotation_angle_threshold: Option<f64>,
    deskew_min_segment_length: Option<f64>,
    hough_vote_threshold: Option<u32>,
    hough_min_line_length: Option<u32>,
    hough_max_line_gap: Option<u32>,
    binarization: Option<String>,
    adaptive_block_size: Option<u32>,
    adaptive_c: Option<i32>,
    denoise_kernel_size: Option<u32>,
    morphology_iterations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LineSettings {
    min_line_length: Option<u32>,
    horizontal_kernel_scale: Option<u32>,
    vertical_kernel_scale: Option<u32>,
    dilation_iterations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MergeSettings {
    tolerance: Option<u32>,
    ink_fraction_threshold: Option<f64>,
    strip_half_width: Option<u32>,
    sample_margin: Option<u32>,
    thin_line_threshold: Option<u32>,
    medium_line_threshold: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OcrSettings {
    engine: Option<String>,
    languages: Option<String>,
    page_segmentation: Option<u32>,
    confidence_threshold: Option<f32>,
    retry: Option<bool>,
    retry_count: Option<u32>,
    normalize: Option<bool>,
    cell_margin: Option<u32>,
    min_crop_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GeometrySettings {
    column_width_scale: Option<f64>,
    row_height_scale: Option<f64>,
    pixel_to_column_width: Option<f64>,
    pixel_to_row_height: Option<f64>,
    max_column_width: Option<f64>,
    max_row_height: Option<f64>,
    default_column_width: Option<f64>,
    default_row_height: Option<f64>,
    header_rows: Option<usize>,
}

/// Built-in defaults, then `./settings.toml`, `./settings.local.toml` and
/// finally `extra_path`, which must exist when given. Later files override
/// earlier ones key by key.
pub fn load_settings(extra_path: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::default();
    apply_settings_str(&mut config, DEFAULT_SETTINGS_TOML)
        .with_context(|| "failed to parse built-in settings")?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            apply_settings_str(&mut config, &content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    config.validate()?;
    Ok(config)
}

/// Overlays the keys present in `content` onto `config`.
pub fn apply_settings_str(config: &mut PipelineConfig, content: &str) -> Result<()> {
    let parsed: SettingsFile = toml::from_str(content)?;
    merge(config, parsed)
}

fn merge(config: &mut PipelineConfig, incoming: SettingsFile) -> Result<()> {
    if let Some(pre) = incoming.preprocess {
        let target = &mut config.preprocess;
        if let Some(value) = pre.contrast {
            target.enable_contrast_adjustment = value;
        }
        if let Some(value) = pre.clahe_clip_limit {
            target.clahe_clip_limit = value;
        }
        if let Some(value) = pre.clahe_tile_size {
            target.clahe_tile_size = value;
        }
        if let Some(value) = pre.rotation {
            target.enable_rotation_correction = value;
        }
        if let Some(value) = pre.rotation_angle_threshold {
            target.rotation_angle_threshold = value;
        }
        if let Some(value) = pre.deskew_min_segment_length {
            target.deskew_min_segment_length = value;
        }
        if let Some(value) = pre.hough_vote_threshold {
            target.hough_vote_threshold = value;
        }
        if let Some(value) = pre.hough_min_line_length {
            target.hough_min_line_length = value;
        }
        if let Some(value) = pre.hough_max_line_gap {
            target.hough_max_line_gap = value;
        }
        target.binarization = merge_binarization(
            target.binarization,
            pre.binarization.as_deref(),
            pre.adaptive_block_size,
            pre.adaptive_c,
        )?;
        if let Some(value) = pre.denoise_kernel_size {
            target.denoise_kernel_size = value;
        }
        if let Some(value) = pre.morphology_iterations {
            target.morphology_iterations = value;
        }
    }

    if let Some(lines) = incoming.lines {
        let target = &mut config.lines;
        if let Some(value) = lines.min_line_length {
            target.min_line_length = value;
        }
        if let Some(value) = lines.horizontal_kernel_scale {
            target.horizontal_kernel_scale = value;
        }
        if let Some(value) = lines.vertical_kernel_scale {
            target.vertical_kernel_scale = value;
        }
        if let Some(value) = lines.dilation_iterations {
            target.dilation_iterations = value;
        }
    }

    if let Some(merge) = incoming.merge {
        let target = &mut config.merge;
        if let Some(value) = merge.tolerance {
            target.tolerance = value;
        }
        if let Some(value) = merge.ink_fraction_threshold {
            target.ink_fraction_threshold = value;
        }
        if let Some(value) = merge.strip_half_width {
            target.strip_half_width = value;
        }
        if let Some(value) = merge.sample_margin {
            target.sample_margin = value;
        }
        if let Some(value) = merge.thin_line_threshold {
            target.thin_line_threshold = value;
        }
        if let Some(value) = merge.medium_line_threshold {
            target.medium_line_threshold = value;
        }
    }

    if let Some(ocr) = incoming.ocr {
        let target = &mut config.ocr;
        if let Some(value) = ocr.engine {
            target.engine = EngineKind::parse(&value)?;
        }
        if let Some(value) = ocr.languages {
            if !value.trim().is_empty() {
                target.languages = value.trim().to_string();
            }
        }
        if let Some(value) = ocr.page_segmentation {
            target.page_segmentation = value;
        }
        if let Some(value) = ocr.confidence_threshold {
            target.confidence_threshold = value;
        }
        if let Some(value) = ocr.retry {
            target.enable_retry = value;
        }
        if let Some(value) = ocr.retry_count {
            target.retry_count = value;
        }
        if let Some(value) = ocr.normalize {
            target.enable_normalization = value;
        }
        if let Some(value) = ocr.cell_margin {
            target.cell_margin = value;
        }
        if let Some(value) = ocr.min_crop_size {
            target.min_crop_size = value;
        }
    }

    if let Some(geometry) = incoming.geometry {
        let target = &mut config.geometry;
        if let Some(value) = geometry.column_width_scale {
            target.column_width_scale = value;
        }
        if let Some(value) = geometry.row_height_scale {
            target.row_height_scale = value;
        }
        if let Some(value) = geometry.pixel_to_column_width {
            target.pixel_to_column_width = value;
        }
        if let Some(value) = geometry.pixel_to_row_height {
            target.pixel_to_row_height = value;
        }
        if let Some(value) = geometry.max_column_width {
            target.max_column_width = value;
        }
        if let Some(value) = geometry.max_row_height {
            target.max_row_height = value;
        }
        if let Some(value) = geometry.default_column_width {
            target.default_column_width = value;
        }
        if let Some(value) = geometry.default_row_height {
            target.default_row_height = value;
        }
        if let Some(value) = geometry.header_rows {
            target.header_rows = value;
        }
    }
    Ok(())
}

fn merge_binarization(
    current: BinarizeMethod,
    method: Option<&str>,
    block_size: Option<u32>,
    c: Option<i32>,
) -> Result<BinarizeMethod> {
    let (current_block, current_c) = match current {
        BinarizeMethod::Adaptive { block_size, c } => (block_size, c),
        _ => (DEFAULT_ADAPTIVE_BLOCK_SIZE, DEFAULT_ADAPTIVE_C),
    };
    let adaptive = BinarizeMethod::Adaptive {
        block_size: block_size.unwrap_or(current_block),
        c: c.unwrap_or(current_c),
    };
    let Some(method) = method else {
        return Ok(match current {
            BinarizeMethod::Adaptive { .. } => adaptive,
            other => other,
        });
    };
    match method.trim().to_ascii_lowercase().as_str() {
        "otsu" => Ok(BinarizeMethod::Otsu),
        "adaptive" => Ok(adaptive),
        "fixed" => Ok(BinarizeMethod::Fixed),
        other => Err(anyhow!(
            "unknown binarization method: {} (expected otsu, adaptive or fixed)",
            other
        )),
    }
}
