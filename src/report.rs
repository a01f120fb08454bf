use serde::Serialize;
use std::fmt;

use crate::pipeline::TableReconstruction;

/// Human-readable summary of one conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionReport {
    pub input_width: u32,
    pub input_height: u32,
    pub rotation_angle: f64,
    pub grid_rows: usize,
    pub grid_cols: usize,
    pub cells: usize,
    pub merged_cells: usize,
    pub horizontal_lines: usize,
    pub vertical_lines: usize,
    pub average_confidence: f32,
    pub low_confidence_cells: usize,
    pub failed_cells: usize,
    pub sheet_width: f64,
    pub sheet_height: f64,
}

impl ConversionReport {
    pub fn from_reconstruction(table: &TableReconstruction) -> Self {
        let stats = &table.stats;
        Self {
            input_width: table.preprocess.input_width,
            input_height: table.preprocess.input_height,
            rotation_angle: table.preprocess.rotation_angle,
            grid_rows: stats.grid_rows,
            grid_cols: stats.grid_cols,
            cells: stats.total_cells,
            merged_cells: stats.merged_cells,
            horizontal_lines: stats.horizontal_lines,
            vertical_lines: stats.vertical_lines,
            average_confidence: stats.ocr.average_confidence,
            low_confidence_cells: stats.ocr.low_confidence_cells,
            failed_cells: stats.ocr.failed_cells,
            sheet_width: table.column_widths.iter().sum(),
            sheet_height: table.row_heights.iter().sum(),
        }
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Input image    : {}x{} px", self.input_width, self.input_height)?;
        writeln!(f, "Deskew         : {:.2} deg", self.rotation_angle)?;
        writeln!(
            f,
            "Lines          : {} horizontal, {} vertical",
            self.horizontal_lines, self.vertical_lines
        )?;
        writeln!(f, "Grid           : {} rows x {} cols", self.grid_rows, self.grid_cols)?;
        writeln!(f, "Cells          : {} ({} merged)", self.cells, self.merged_cells)?;
        writeln!(
            f,
            "OCR confidence : {:.3} avg, {} low, {} failed",
            self.average_confidence, self.low_confidence_cells, self.failed_cells
        )?;
        write!(
            f,
            "Sheet size     : {:.2} chars x {:.2} pt",
            self.sheet_width, self.sheet_height
        )
    }
}
