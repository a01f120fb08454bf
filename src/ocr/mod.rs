mod enhance;
mod normalize;
mod orchestrator;
mod parse;
mod tesseract;

use anyhow::Result;
use image::DynamicImage;
use serde::Serialize;

use crate::config::{EngineKind, OcrConfig};

pub use normalize::normalize_text;
pub use orchestrator::{OcrStats, recognize_cells};
pub use tesseract::{TesseractLineEngine, TesseractWordEngine, list_tesseract_languages};

/// Engine output for one image: text plus a confidence in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Final text of a table cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CellContent {
    pub text: String,
    pub confidence: f32,
}

impl CellContent {
    pub fn empty() -> Self {
        Self::default()
    }
}

impl From<Recognition> for CellContent {
    fn from(value: Recognition) -> Self {
        Self {
            text: value.text,
            confidence: value.confidence,
        }
    }
}

/// Text recognizer for a single cell crop.
///
/// Implementations may initialize lazily on first use; calls are sequential.
pub trait OcrEngine: Send {
    fn name(&self) -> &'static str;

    fn recognize(&self, image: &DynamicImage) -> Result<Recognition>;
}

pub fn build_engine(config: &OcrConfig) -> Box<dyn OcrEngine> {
    match config.engine {
        EngineKind::Lines => Box::new(TesseractLineEngine::new(
            config.languages.clone(),
            config.page_segmentation,
        )),
        EngineKind::Words => Box::new(TesseractWordEngine::new(
            config.languages.clone(),
            config.page_segmentation,
        )),
    }
}
