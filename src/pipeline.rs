use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, GenericImageView};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::debug::DebugArtifacts;
use crate::ocr::{CellContent, OcrEngine, OcrStats, build_engine, recognize_cells};
use crate::table::{
    BinaryImage, BorderStyle, Cell, CellKey, GridAxis, PreprocessInfo, build_grid, extract_lines,
    lattice_cells, map_geometry, preprocess, resolve_merges_and_borders,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSummary {
    pub rows: GridAxis,
    pub cols: GridAxis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionStats {
    pub grid_rows: usize,
    pub grid_cols: usize,
    pub total_cells: usize,
    pub merged_cells: usize,
    pub horizontal_lines: usize,
    pub vertical_lines: usize,
    pub ocr: OcrStats,
}

/// Everything recovered from one table image, ready for a spreadsheet
/// writer.
#[derive(Debug, Clone, Serialize)]
pub struct TableReconstruction {
    pub preprocess: PreprocessInfo,
    pub grid: GridSummary,
    pub cells: Vec<Cell>,
    #[serde(serialize_with = "serialize_keyed")]
    pub borders: BTreeMap<CellKey, BorderStyle>,
    #[serde(serialize_with = "serialize_keyed")]
    pub contents: BTreeMap<CellKey, CellContent>,
    pub column_widths: Vec<f64>,
    pub row_heights: Vec<f64>,
    pub header_rows: usize,
    pub stats: ConversionStats,
}

impl TableReconstruction {
    /// Border of every lattice slot, with merged outlines split into the
    /// share each covered slot carries.
    pub fn unit_borders(&self) -> BTreeMap<CellKey, BorderStyle> {
        let mut out = BTreeMap::new();
        for cell in &self.cells {
            let style = self.borders.get(&cell.key()).copied().unwrap_or_default();
            for row in cell.row..=cell.last_row() {
                for col in cell.col..=cell.last_col() {
                    out.insert((row, col), style.share_for(cell, row, col));
                }
            }
        }
        out
    }

    pub fn is_header(&self, row: usize) -> bool {
        row < self.header_rows
    }

    pub fn cell_at(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.covers(row, col))
    }

    pub fn text_at(&self, row: usize, col: usize) -> Option<&str> {
        self.contents.get(&(row, col)).map(|content| content.text.as_str())
    }
}

/// Maps keyed by `(row, col)` serialize as a list of `{row, col, ...value}`.
fn serialize_keyed<S, T>(
    map: &BTreeMap<CellKey, T>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    #[derive(Serialize)]
    struct Keyed<'a, T> {
        row: usize,
        col: usize,
        #[serde(flatten)]
        value: &'a T,
    }

    serializer.collect_seq(
        map.iter()
            .map(|(&(row, col), value)| Keyed { row, col, value }),
    )
}

pub struct TablePipeline {
    config: PipelineConfig,
    engine: Box<dyn OcrEngine>,
}

impl TablePipeline {
    pub fn new(config: PipelineConfig, engine: Box<dyn OcrEngine>) -> Result<Self> {
        config
            .validate()
            .with_context(|| "invalid pipeline configuration")?;
        Ok(Self { config, engine })
    }

    /// Pipeline with the tesseract engine the configuration selects.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let engine = build_engine(&config.ocr);
        Self::new(config, engine)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn convert(&self, image: &DynamicImage) -> Result<TableReconstruction> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("input image is empty ({}x{})", width, height));
        }

        let pre = preprocess(image, &self.config.preprocess);
        let (horizontal, vertical) = extract_lines(&pre.binary, &self.config.lines);
        let (rows, cols) = build_grid(
            &horizontal,
            &vertical,
            pre.binary.dimensions(),
            self.config.merge.tolerance,
        );
        let lattice = lattice_cells(&rows, &cols);
        let (cells, borders) = resolve_merges_and_borders(
            &lattice,
            &pre.binary,
            &horizontal,
            &vertical,
            &self.config.merge,
        );

        let aligned = DynamicImage::ImageLuma8(pre.aligned);
        let (contents, ocr) =
            recognize_cells(self.engine.as_ref(), &aligned, &cells, &self.config.ocr);
        let (column_widths, row_heights) = map_geometry(&cells, &self.config.geometry);

        self.write_debug_artifacts(&pre.binary, &aligned, &cells);

        let stats = ConversionStats {
            grid_rows: rows.bands(),
            grid_cols: cols.bands(),
            total_cells: cells.len(),
            merged_cells: cells.iter().filter(|cell| cell.is_merged()).count(),
            horizontal_lines: horizontal.len(),
            vertical_lines: vertical.len(),
            ocr,
        };
        info!(
            "convert: {}x{} grid, {} cells ({} merged)",
            stats.grid_rows, stats.grid_cols, stats.total_cells, stats.merged_cells
        );

        Ok(TableReconstruction {
            preprocess: pre.info,
            grid: GridSummary { rows, cols },
            cells,
            borders,
            contents,
            column_widths,
            row_heights,
            header_rows: self.config.geometry.header_rows,
            stats,
        })
    }

    fn write_debug_artifacts(&self, binary: &BinaryImage, aligned: &DynamicImage, cells: &[Cell]) {
        let artifacts = match DebugArtifacts::from_config(&self.config.debug) {
            Ok(Some(artifacts)) => artifacts,
            Ok(None) => return,
            Err(err) => {
                warn!("debug: {:#}", err);
                return;
            }
        };
        if let Err(err) = artifacts.write_binary(binary) {
            warn!("debug: {:#}", err);
        }
        if let Some(page) = aligned.as_luma8() {
            if let Err(err) = artifacts.write_cells(page, cells) {
                warn!("debug: {:#}", err);
            }
        }
    }
}

/// Decodes an image file.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(anyhow!("input image not found: {}", path.display()));
    }
    image::open(path).with_context(|| format!("failed to decode image: {}", path.display()))
}
