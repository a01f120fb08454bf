use anyhow::{Result, anyhow};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum BinarizeMethod {
    Otsu,
    Adaptive { block_size: u32, c: i32 },
    Fixed,
}

impl BinarizeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinarizeMethod::Otsu => "otsu",
            BinarizeMethod::Adaptive { .. } => "adaptive",
            BinarizeMethod::Fixed => "fixed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Lines,
    Words,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Lines => "lines",
            EngineKind::Words => "words",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lines" | "line" | "hocr" => Ok(EngineKind::Lines),
            "words" | "word" | "tsv" => Ok(EngineKind::Words),
            other => Err(anyhow!("unknown OCR engine: {} (expected lines or words)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub enable_contrast_adjustment: bool,
    pub clahe_clip_limit: f32,
    pub clahe_tile_size: u32,
    pub enable_rotation_correction: bool,
    pub rotation_angle_threshold: f64,
    pub deskew_min_segment_length: f64,
    pub hough_vote_threshold: u32,
    pub hough_min_line_length: u32,
    pub hough_max_line_gap: u32,
    pub binarization: BinarizeMethod,
    pub denoise_kernel_size: u32,
    pub morphology_iterations: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enable_contrast_adjustment: true,
            clahe_clip_limit: 2.0,
            clahe_tile_size: 8,
            enable_rotation_correction: true,
            rotation_angle_threshold: 0.5,
            deskew_min_segment_length: 50.0,
            hough_vote_threshold: 100,
            hough_min_line_length: 100,
            hough_max_line_gap: 10,
            binarization: BinarizeMethod::Otsu,
            denoise_kernel_size: 3,
            morphology_iterations: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineConfig {
    pub min_line_length: u32,
    pub horizontal_kernel_scale: u32,
    pub vertical_kernel_scale: u32,
    pub dilation_iterations: u32,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            min_line_length: 30,
            horizontal_kernel_scale: 40,
            vertical_kernel_scale: 40,
            dilation_iterations: 2,
        }
    }
}

/// Grid, merge and border parameters. `tolerance` is shared by grid
/// deduplication and border matching.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub tolerance: u32,
    pub ink_fraction_threshold: f64,
    pub strip_half_width: u32,
    pub sample_margin: u32,
    pub thin_line_threshold: u32,
    pub medium_line_threshold: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            tolerance: 5,
            ink_fraction_threshold: 0.3,
            strip_half_width: 2,
            sample_margin: 5,
            thin_line_threshold: 2,
            medium_line_threshold: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub engine: EngineKind,
    pub languages: String,
    pub page_segmentation: u32,
    pub confidence_threshold: f32,
    pub enable_retry: bool,
    pub retry_count: u32,
    pub enable_normalization: bool,
    pub cell_margin: u32,
    pub min_crop_size: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Lines,
            languages: "jpn+eng".to_string(),
            page_segmentation: 6,
            confidence_threshold: 0.85,
            enable_retry: true,
            retry_count: 2,
            enable_normalization: true,
            cell_margin: 3,
            min_crop_size: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeometryConfig {
    pub column_width_scale: f64,
    pub row_height_scale: f64,
    pub pixel_to_column_width: f64,
    pub pixel_to_row_height: f64,
    pub max_column_width: f64,
    pub max_row_height: f64,
    pub default_column_width: f64,
    pub default_row_height: f64,
    pub header_rows: usize,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            column_width_scale: 1.0,
            row_height_scale: 1.0,
            pixel_to_column_width: 1.0 / 7.0,
            pixel_to_row_height: 0.75,
            max_column_width: 255.0,
            max_row_height: 409.5,
            default_column_width: 8.43,
            default_row_height: 15.0,
            header_rows: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DebugConfig {
    pub output_dir: Option<PathBuf>,
    pub base_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub lines: LineConfig,
    pub merge: MergeConfig,
    pub ocr: OcrConfig,
    pub geometry: GeometryConfig,
    pub debug: DebugConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let pre = &self.preprocess;
        if let BinarizeMethod::Adaptive { block_size, .. } = pre.binarization {
            if block_size < 3 || block_size % 2 == 0 {
                return Err(anyhow!(
                    "adaptive block size must be odd and >= 3 (got {})",
                    block_size
                ));
            }
        }
        if pre.denoise_kernel_size == 0 {
            return Err(anyhow!("denoise kernel size must be >= 1"));
        }
        if pre.morphology_iterations == 0 {
            return Err(anyhow!("morphology iterations must be >= 1"));
        }
        let radius = (pre.denoise_kernel_size / 2).saturating_mul(pre.morphology_iterations);
        if radius > u32::from(u8::MAX) {
            return Err(anyhow!("denoise kernel size times iterations is too large"));
        }
        if !(pre.clahe_clip_limit.is_finite() && pre.clahe_clip_limit > 0.0) {
            return Err(anyhow!("clahe clip limit must be > 0"));
        }
        if pre.clahe_tile_size == 0 {
            return Err(anyhow!("clahe tile size must be >= 1"));
        }
        if !(pre.rotation_angle_threshold.is_finite() && pre.rotation_angle_threshold >= 0.0) {
            return Err(anyhow!("rotation angle threshold must be >= 0"));
        }
        if pre.hough_vote_threshold == 0 {
            return Err(anyhow!("hough vote threshold must be >= 1"));
        }

        let lines = &self.lines;
        if lines.horizontal_kernel_scale == 0 || lines.vertical_kernel_scale == 0 {
            return Err(anyhow!("line kernel scales must be >= 1"));
        }

        let merge = &self.merge;
        if merge.tolerance == 0 {
            return Err(anyhow!("tolerance must be >= 1"));
        }
        if !(merge.ink_fraction_threshold > 0.0 && merge.ink_fraction_threshold <= 1.0) {
            return Err(anyhow!(
                "ink fraction threshold must be in (0, 1] (got {})",
                merge.ink_fraction_threshold
            ));
        }
        if merge.thin_line_threshold >= merge.medium_line_threshold {
            return Err(anyhow!(
                "thin line threshold ({}) must be below medium line threshold ({})",
                merge.thin_line_threshold,
                merge.medium_line_threshold
            ));
        }

        let ocr = &self.ocr;
        if !(0.0..=1.0).contains(&ocr.confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold must be in [0, 1] (got {})",
                ocr.confidence_threshold
            ));
        }
        if ocr.languages.trim().is_empty() {
            return Err(anyhow!("ocr languages is empty"));
        }

        let geometry = &self.geometry;
        for (name, value) in [
            ("column width scale", geometry.column_width_scale),
            ("row height scale", geometry.row_height_scale),
            ("pixel to column width", geometry.pixel_to_column_width),
            ("pixel to row height", geometry.pixel_to_row_height),
            ("max column width", geometry.max_column_width),
            ("max row height", geometry.max_row_height),
            ("default column width", geometry.default_column_width),
            ("default row height", geometry.default_row_height),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(anyhow!("{} must be > 0 (got {})", name, value));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PipelineConfig::default().validate().expect("defaults");
    }

    #[test]
    fn rejects_even_adaptive_block() {
        let mut config = PipelineConfig::default();
        config.preprocess.binarization = BinarizeMethod::Adaptive { block_size: 10, c: 2 };
        let err = config.validate().expect_err("even block");
        assert!(err.to_string().contains("block size"));

        config.preprocess.binarization = BinarizeMethod::Adaptive { block_size: 11, c: 2 };
        config.validate().expect("odd block");
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let mut config = PipelineConfig::default();
        config.merge.ink_fraction_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.ocr.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.merge.thin_line_threshold = 5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.geometry.column_width_scale = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.ocr.languages = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn engine_kind_parses_aliases() {
        assert_eq!(EngineKind::parse("Lines").expect("lines"), EngineKind::Lines);
        assert_eq!(EngineKind::parse("tsv").expect("tsv"), EngineKind::Words);
        assert!(EngineKind::parse("cloud").is_err());
    }
}
