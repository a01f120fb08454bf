use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::enhance::enhance_for_retry;
use super::normalize::normalize_text;
use super::{CellContent, OcrEngine, Recognition};
use crate::config::OcrConfig;
use crate::table::{Cell, CellKey};

const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OcrStats {
    pub cells: usize,
    pub average_confidence: f32,
    pub low_confidence_cells: usize,
    pub failed_cells: usize,
}

/// Recognizes every cell of `image` with `engine`.
///
/// A failing engine call leaves that cell empty with zero confidence; the
/// remaining cells are still processed.
pub fn recognize_cells(
    engine: &dyn OcrEngine,
    image: &DynamicImage,
    cells: &[Cell],
    config: &OcrConfig,
) -> (BTreeMap<CellKey, CellContent>, OcrStats) {
    info!("ocr: {} cells with {}", cells.len(), engine.name());
    let mut contents = BTreeMap::new();
    let mut failed = 0usize;
    for (idx, cell) in cells.iter().enumerate() {
        let content = match recognize_cell(engine, image, cell, config) {
            Ok(content) => content,
            Err(err) => {
                warn!("ocr: cell ({}, {}) failed: {:#}", cell.row, cell.col, err);
                failed += 1;
                CellContent::empty()
            }
        };
        contents.insert(cell.key(), content);
        if (idx + 1) % PROGRESS_EVERY == 0 {
            info!("ocr: {}/{} cells", idx + 1, cells.len());
        }
    }

    let stats = summarize(&contents, config.confidence_threshold, failed);
    info!(
        "ocr: average confidence {:.3}, {} below {:.2}",
        stats.average_confidence, stats.low_confidence_cells, config.confidence_threshold
    );
    (contents, stats)
}

fn summarize(contents: &BTreeMap<CellKey, CellContent>, threshold: f32, failed: usize) -> OcrStats {
    let cells = contents.len();
    let total = contents.values().map(|c| c.confidence).sum::<f32>();
    OcrStats {
        cells,
        average_confidence: if cells > 0 { total / cells as f32 } else { 0.0 },
        low_confidence_cells: contents.values().filter(|c| c.confidence < threshold).count(),
        failed_cells: failed,
    }
}

fn recognize_cell(
    engine: &dyn OcrEngine,
    image: &DynamicImage,
    cell: &Cell,
    config: &OcrConfig,
) -> anyhow::Result<CellContent> {
    let Some((x, y, width, height)) = crop_box(cell, image.dimensions(), config) else {
        debug!("ocr: cell ({}, {}) too small to crop", cell.row, cell.col);
        return Ok(CellContent::empty());
    };
    let crop = image.crop_imm(x, y, width, height);
    let mut best = engine.recognize(&crop)?;

    if config.enable_retry && best.confidence < config.confidence_threshold {
        best = retry_enhanced(engine, &crop, best, cell, config);
    }

    let mut content = CellContent::from(best);
    if config.enable_normalization && !content.text.is_empty() {
        content.text = normalize_text(&content.text);
    }
    Ok(content)
}

/// Re-runs recognition on enhanced crops and keeps the most confident
/// result. Stops once the threshold is reached or an attempt fails.
fn retry_enhanced(
    engine: &dyn OcrEngine,
    crop: &DynamicImage,
    mut best: Recognition,
    cell: &Cell,
    config: &OcrConfig,
) -> Recognition {
    let gray = crop.to_luma8();
    for attempt in 0..config.retry_count {
        let enhanced = DynamicImage::ImageLuma8(enhance_for_retry(&gray, attempt));
        match engine.recognize(&enhanced) {
            Ok(candidate) => {
                debug!(
                    "ocr: cell ({}, {}) retry {} confidence {:.3}",
                    cell.row, cell.col, attempt, candidate.confidence
                );
                if candidate.confidence > best.confidence {
                    best = candidate;
                }
            }
            Err(err) => {
                warn!("ocr: cell ({}, {}) retry {} failed: {:#}", cell.row, cell.col, attempt, err);
                break;
            }
        }
        if best.confidence >= config.confidence_threshold {
            break;
        }
    }
    best
}

/// Cell box shrunk by the configured margin and clamped to the image, or
/// `None` when what is left is smaller than the minimum crop size.
fn crop_box(
    cell: &Cell,
    (width, height): (u32, u32),
    config: &OcrConfig,
) -> Option<(u32, u32, u32, u32)> {
    let margin = config.cell_margin;
    let x0 = (cell.x + margin).min(width);
    let y0 = (cell.y + margin).min(height);
    let x1 = cell.right().saturating_sub(margin).min(width);
    let y1 = cell.bottom().saturating_sub(margin).min(height);
    let crop_w = x1.saturating_sub(x0);
    let crop_h = y1.saturating_sub(y0);
    if crop_w < config.min_crop_size || crop_h < config.min_crop_size {
        return None;
    }
    Some((x0, y0, crop_w, crop_h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use image::GrayImage;
    use std::sync::Mutex;

    /// Returns scripted results in order and records crop sizes.
    struct Scripted {
        results: Mutex<Vec<Result<Recognition>>>,
        seen: Mutex<Vec<(u32, u32)>>,
    }

    impl Scripted {
        fn new(results: Vec<Result<Recognition>>) -> Self {
            Self {
                results: Mutex::new(results.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().expect("seen").len()
        }
    }

    impl OcrEngine for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn recognize(&self, image: &DynamicImage) -> Result<Recognition> {
            self.seen.lock().expect("seen").push(image.dimensions());
            self.results
                .lock()
                .expect("results")
                .pop()
                .unwrap_or_else(|| Ok(Recognition::default()))
        }
    }

    fn page() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 100, image::Luma([255])))
    }

    #[test]
    fn crops_inside_margin() {
        let engine = Scripted::new(vec![Ok(Recognition::new("x", 0.99))]);
        let cells = vec![Cell::unit(0, 0, 10, 20, 40, 30)];
        let (contents, _) = recognize_cells(&engine, &page(), &cells, &OcrConfig::default());
        assert_eq!(engine.seen.lock().expect("seen").as_slice(), &[(34, 24)]);
        assert_eq!(contents[&(0, 0)].text, "x");
    }

    #[test]
    fn tiny_cells_skip_the_engine() {
        let engine = Scripted::new(vec![]);
        let cells = vec![Cell::unit(0, 0, 0, 0, 10, 40), Cell::unit(0, 1, 98, 0, 40, 40)];
        let (contents, stats) = recognize_cells(&engine, &page(), &cells, &OcrConfig::default());
        assert_eq!(engine.calls(), 0);
        assert_eq!(contents[&(0, 0)], CellContent::empty());
        assert_eq!(contents[&(0, 1)], CellContent::empty());
        assert_eq!(stats.low_confidence_cells, 2);
    }

    #[test]
    fn retry_keeps_best_and_stops_at_threshold() {
        let engine = Scripted::new(vec![
            Ok(Recognition::new("l2", 0.40)),
            Ok(Recognition::new("12", 0.90)),
            Ok(Recognition::new("unused", 0.95)),
        ]);
        let cells = vec![Cell::unit(0, 0, 0, 0, 50, 50)];
        let (contents, stats) = recognize_cells(&engine, &page(), &cells, &OcrConfig::default());
        assert_eq!(engine.calls(), 2);
        assert_eq!(contents[&(0, 0)].text, "12");
        assert!((contents[&(0, 0)].confidence - 0.90).abs() < 1e-6);
        assert_eq!(stats.low_confidence_cells, 0);
    }

    #[test]
    fn retry_never_lowers_confidence() {
        let engine = Scripted::new(vec![
            Ok(Recognition::new("first", 0.60)),
            Ok(Recognition::new("worse", 0.20)),
            Ok(Recognition::new("also worse", 0.50)),
        ]);
        let cells = vec![Cell::unit(0, 0, 0, 0, 50, 50)];
        let (contents, _) = recognize_cells(&engine, &page(), &cells, &OcrConfig::default());
        assert_eq!(engine.calls(), 3);
        assert_eq!(contents[&(0, 0)].text, "first");
        assert!((contents[&(0, 0)].confidence - 0.60).abs() < 1e-6);
    }

    #[test]
    fn retry_can_be_disabled() {
        let engine = Scripted::new(vec![Ok(Recognition::new("low", 0.1))]);
        let config = OcrConfig {
            enable_retry: false,
            ..OcrConfig::default()
        };
        let cells = vec![Cell::unit(0, 0, 0, 0, 50, 50)];
        let (_, stats) = recognize_cells(&engine, &page(), &cells, &config);
        assert_eq!(engine.calls(), 1);
        assert_eq!(stats.low_confidence_cells, 1);
    }

    #[test]
    fn engine_errors_leave_cell_empty_and_continue() {
        let engine = Scripted::new(vec![
            Err(anyhow!("engine crashed")),
            Ok(Recognition::new("Ｏ５", 0.99)),
        ]);
        let cells = vec![Cell::unit(0, 0, 0, 0, 50, 50), Cell::unit(0, 1, 50, 0, 50, 50)];
        let (contents, stats) = recognize_cells(&engine, &page(), &cells, &OcrConfig::default());
        assert_eq!(contents[&(0, 0)], CellContent::empty());
        assert_eq!(contents[&(0, 1)].text, "05");
        assert_eq!(stats.failed_cells, 1);
        assert!((stats.average_confidence - 0.495).abs() < 1e-6);
    }

    #[test]
    fn normalization_can_be_disabled() {
        let engine = Scripted::new(vec![Ok(Recognition::new(" Ｏ５ ", 0.99))]);
        let config = OcrConfig {
            enable_normalization: false,
            ..OcrConfig::default()
        };
        let cells = vec![Cell::unit(0, 0, 0, 0, 50, 50)];
        let (contents, _) = recognize_cells(&engine, &page(), &cells, &config);
        assert_eq!(contents[&(0, 0)].text, " Ｏ５ ");
    }
}
