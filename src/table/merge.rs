use std::collections::BTreeMap;
use tracing::{debug, info};

use super::binary::BinaryImage;
use super::{BorderStyle, BorderWeight, Cell, CellKey, Line, Orientation};
use crate::config::MergeConfig;

/// Merges unit cells whose shared boundary carries no ink, then classifies
/// the border weight of every resulting cell edge.
pub fn resolve_merges_and_borders(
    cells: &[Cell],
    binary: &BinaryImage,
    horizontal: &[Line],
    vertical: &[Line],
    config: &MergeConfig,
) -> (Vec<Cell>, BTreeMap<CellKey, BorderStyle>) {
    let resolved = resolve_merges(cells, binary, config);
    let borders = resolved
        .iter()
        .map(|cell| {
            let style = classify_borders(cell, horizontal, vertical, config);
            (cell.key(), style)
        })
        .collect::<BTreeMap<_, _>>();
    debug!(
        "borders: {} styled cells",
        borders.values().filter(|s| !s.is_empty()).count()
    );
    (resolved, borders)
}

/// Unit cells laid out on their lattice, with the slots already claimed by a
/// merged cell.
struct Lattice {
    rows: usize,
    cols: usize,
    slots: Vec<Option<Cell>>,
    consumed: Vec<bool>,
}

impl Lattice {
    fn from_cells(cells: &[Cell]) -> Self {
        let rows = cells.iter().map(|c| c.row + 1).max().unwrap_or(0);
        let cols = cells.iter().map(|c| c.col + 1).max().unwrap_or(0);
        let mut slots = vec![None; rows * cols];
        for cell in cells {
            slots[cell.row * cols + cell.col] = Some(*cell);
        }
        Self {
            rows,
            cols,
            slots,
            consumed: vec![false; rows * cols],
        }
    }

    /// The unit cell at `(row, col)` if it exists and is unclaimed.
    fn free(&self, row: usize, col: usize) -> Option<Cell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let index = row * self.cols + col;
        if self.consumed[index] {
            return None;
        }
        self.slots[index]
    }

    fn slot(&self, row: usize, col: usize) -> Option<Cell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.slots[row * self.cols + col]
    }

    fn consume(&mut self, row: usize, col: usize) {
        self.consumed[row * self.cols + col] = true;
    }
}

/// Row-major merge pass. Each seed grows rightward first, then downward
/// across its whole colspan.
pub fn resolve_merges(cells: &[Cell], binary: &BinaryImage, config: &MergeConfig) -> Vec<Cell> {
    let mut lattice = Lattice::from_cells(cells);
    let mut resolved = Vec::with_capacity(cells.len());
    for row in 0..lattice.rows {
        for col in 0..lattice.cols {
            let Some(seed) = lattice.free(row, col) else {
                continue;
            };
            lattice.consume(row, col);
            let colspan = extend_right(&mut lattice, &seed, binary, config);
            let rowspan = extend_down(&mut lattice, &seed, colspan, binary, config);
            resolved.push(union_of_slots(&lattice, &seed, rowspan, colspan));
        }
    }
    let merged = resolved.iter().filter(|cell| cell.is_merged()).count();
    info!("merge: {} cells, {} merged", resolved.len(), merged);
    resolved
}

fn extend_right(
    lattice: &mut Lattice,
    seed: &Cell,
    binary: &BinaryImage,
    config: &MergeConfig,
) -> usize {
    let (y0, y1) = inset(seed.y, seed.height, config.sample_margin);
    let mut colspan = 1;
    while let Some(next) = lattice.free(seed.row, seed.col + colspan) {
        let x0 = next.x.saturating_sub(config.strip_half_width);
        let x1 = next.x + config.strip_half_width + 1;
        if boundary_present(binary, (x0, y0, x1, y1), Orientation::Vertical, config) {
            break;
        }
        lattice.consume(seed.row, seed.col + colspan);
        colspan += 1;
    }
    colspan
}

fn extend_down(
    lattice: &mut Lattice,
    seed: &Cell,
    colspan: usize,
    binary: &BinaryImage,
    config: &MergeConfig,
) -> usize {
    let right = lattice
        .slot(seed.row, seed.col + colspan - 1)
        .map_or(seed.right(), |cell| cell.right());
    let (x0, x1) = inset(seed.x, right - seed.x, config.sample_margin);
    let mut rowspan = 1;
    loop {
        let next_row = seed.row + rowspan;
        let Some(next) = lattice.free(next_row, seed.col) else {
            break;
        };
        if !(seed.col..seed.col + colspan).all(|col| lattice.free(next_row, col).is_some()) {
            break;
        }
        let y0 = next.y.saturating_sub(config.strip_half_width);
        let y1 = next.y + config.strip_half_width + 1;
        if boundary_present(binary, (x0, y0, x1, y1), Orientation::Horizontal, config) {
            break;
        }
        for col in seed.col..seed.col + colspan {
            lattice.consume(next_row, col);
        }
        rowspan += 1;
    }
    rowspan
}

/// Sampling range along a band, shrunk by `margin` at both ends unless the
/// band is too short for it.
fn inset(start: u32, length: u32, margin: u32) -> (u32, u32) {
    if length > margin.saturating_mul(2) {
        (start + margin, start + length - margin)
    } else {
        (start, start + length)
    }
}

/// A boundary is drawn when enough of its length carries ink anywhere
/// across the strip.
fn boundary_present(
    binary: &BinaryImage,
    strip: (u32, u32, u32, u32),
    boundary: Orientation,
    config: &MergeConfig,
) -> bool {
    binary
        .ink_coverage(strip, boundary)
        .is_some_and(|coverage| coverage >= config.ink_fraction_threshold)
}

fn union_of_slots(lattice: &Lattice, seed: &Cell, rowspan: usize, colspan: usize) -> Cell {
    let right = lattice
        .slot(seed.row, seed.col + colspan - 1)
        .map_or(seed.right(), |cell| cell.right());
    let bottom = lattice
        .slot(seed.row + rowspan - 1, seed.col)
        .map_or(seed.bottom(), |cell| cell.bottom());
    Cell {
        width: right - seed.x,
        height: bottom - seed.y,
        rowspan,
        colspan,
        ..*seed
    }
}

fn classify_borders(
    cell: &Cell,
    horizontal: &[Line],
    vertical: &[Line],
    config: &MergeConfig,
) -> BorderStyle {
    BorderStyle {
        top: edge_weight(horizontal, cell.y, config),
        bottom: edge_weight(horizontal, cell.bottom(), config),
        left: edge_weight(vertical, cell.x, config),
        right: edge_weight(vertical, cell.right(), config),
    }
}

fn edge_weight(lines: &[Line], coordinate: u32, config: &MergeConfig) -> Option<BorderWeight> {
    lines
        .iter()
        .find(|line| line.position.abs_diff(coordinate) < config.tolerance)
        .map(|line| classify_thickness(line.thickness, config))
}

pub fn classify_thickness(thickness: u32, config: &MergeConfig) -> BorderWeight {
    if thickness <= config.thin_line_threshold {
        BorderWeight::Thin
    } else if thickness <= config.medium_line_threshold {
        BorderWeight::Medium
    } else {
        BorderWeight::Thick
    }
}
