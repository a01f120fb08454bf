use tracing::info;

use super::{Cell, GridAxis, Line};

/// Row and column boundaries from the detected lines.
///
/// A line position closer than `tolerance` to an already accepted coordinate
/// is a duplicate; the first one wins.
pub fn build_grid(
    horizontal: &[Line],
    vertical: &[Line],
    (width, height): (u32, u32),
    tolerance: u32,
) -> (GridAxis, GridAxis) {
    let rows = axis_from_lines(horizontal, height, tolerance);
    let cols = axis_from_lines(vertical, width, tolerance);
    info!("grid: {} rows x {} cols", rows.bands(), cols.bands());
    (rows, cols)
}

fn axis_from_lines(lines: &[Line], extent: u32, tolerance: u32) -> GridAxis {
    let mut coords = vec![0u32];
    for line in lines {
        let position = line.position;
        if !coords.iter().any(|kept| kept.abs_diff(position) < tolerance) {
            coords.push(position);
        }
    }
    coords.retain(|&coord| coord == 0 || (coord < extent && extent - coord >= tolerance));
    coords.sort_unstable();
    coords.push(extent.max(1));
    GridAxis { boundaries: coords }
}

/// One unit cell per (row band, column band), row-major.
pub fn lattice_cells(rows: &GridAxis, cols: &GridAxis) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(rows.bands() * cols.bands());
    for row in 0..rows.bands() {
        let (top, bottom) = (rows.boundaries[row], rows.boundaries[row + 1]);
        for col in 0..cols.bands() {
            let (left, right) = (cols.boundaries[col], cols.boundaries[col + 1]);
            cells.push(Cell::unit(row, col, left, top, right - left, bottom - top));
        }
    }
    cells
}
