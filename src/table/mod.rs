use anyhow::{Result, anyhow};
use serde::Serialize;

mod binary;
mod clahe;
mod deskew;
mod dimensions;
mod grid;
mod hough;
mod lines;
mod merge;
mod morph;
mod preprocess;

pub use binary::{BinaryImage, INK, PAPER};
pub use dimensions::map_geometry;
pub use grid::{build_grid, lattice_cells};
pub use lines::extract_lines;
pub use merge::{classify_thickness, resolve_merges, resolve_merges_and_borders};
pub use preprocess::{PreprocessInfo, PreprocessOutput, preprocess, to_grayscale};

pub(crate) use clahe::equalize_tiles;
pub(crate) use preprocess::binarize_otsu;

/// Lattice coordinate of a cell: `(row, col)`.
pub type CellKey = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Horizontal => "horizontal",
            Orientation::Vertical => "vertical",
        }
    }
}

/// Half-open pixel range `[start, end)` along a line's own axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn length(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

/// A ruled line found in the binary image.
///
/// `position` is the perpendicular coordinate (y for horizontal lines, x for
/// vertical ones) measured at the middle of the stroke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub orientation: Orientation,
    pub position: u32,
    pub span: Span,
    pub thickness: u32,
}

impl Line {
    pub fn length(&self) -> u32 {
        self.span.length()
    }
}

/// Band boundaries along one axis. Always starts at 0 and ends at the extent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GridAxis {
    boundaries: Vec<u32>,
}

impl GridAxis {
    pub fn from_boundaries(boundaries: Vec<u32>) -> Result<Self> {
        if boundaries.len() < 2 {
            return Err(anyhow!("grid axis needs at least two boundaries"));
        }
        if boundaries[0] != 0 {
            return Err(anyhow!("grid axis must start at 0"));
        }
        if boundaries.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(anyhow!("grid axis boundaries must be strictly increasing"));
        }
        Ok(Self { boundaries })
    }

    pub fn boundaries(&self) -> &[u32] {
        &self.boundaries
    }

    /// Number of bands between consecutive boundaries.
    pub fn bands(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn band(&self, index: usize) -> Option<(u32, u32)> {
        let start = *self.boundaries.get(index)?;
        let end = *self.boundaries.get(index + 1)?;
        Some((start, end))
    }

    pub fn extent(&self) -> u32 {
        self.boundaries[self.boundaries.len() - 1]
    }
}

/// A table cell: its lattice anchor, pixel box and span counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub rowspan: usize,
    pub colspan: usize,
}

impl Cell {
    pub fn unit(row: usize, col: usize, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            row,
            col,
            x,
            y,
            width,
            height,
            rowspan: 1,
            colspan: 1,
        }
    }

    pub fn key(&self) -> CellKey {
        (self.row, self.col)
    }

    pub fn is_merged(&self) -> bool {
        self.rowspan > 1 || self.colspan > 1
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn last_row(&self) -> usize {
        self.row + self.rowspan - 1
    }

    pub fn last_col(&self) -> usize {
        self.col + self.colspan - 1
    }

    /// Whether the lattice slot `(row, col)` lies inside this cell's span.
    pub fn covers(&self, row: usize, col: usize) -> bool {
        (self.row..=self.last_row()).contains(&row) && (self.col..=self.last_col()).contains(&col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderWeight {
    Thin,
    Medium,
    Thick,
}

impl BorderWeight {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorderWeight::Thin => "thin",
            BorderWeight::Medium => "medium",
            BorderWeight::Thick => "thick",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BorderStyle {
    pub top: Option<BorderWeight>,
    pub bottom: Option<BorderWeight>,
    pub left: Option<BorderWeight>,
    pub right: Option<BorderWeight>,
}

impl BorderStyle {
    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.bottom.is_none() && self.left.is_none() && self.right.is_none()
    }

    /// Portion of a merged cell's outline that falls on the unit slot
    /// `(row, col)`. Sides facing the inside of the merged block are dropped.
    pub fn share_for(&self, cell: &Cell, row: usize, col: usize) -> BorderStyle {
        if !cell.covers(row, col) {
            return BorderStyle::default();
        }
        BorderStyle {
            top: self.top.filter(|_| row == cell.row),
            bottom: self.bottom.filter(|_| row == cell.last_row()),
            left: self.left.filter(|_| col == cell.col),
            right: self.right.filter(|_| col == cell.last_col()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged() -> Cell {
        Cell {
            row: 1,
            col: 2,
            x: 100,
            y: 50,
            width: 100,
            height: 100,
            rowspan: 2,
            colspan: 2,
        }
    }

    #[test]
    fn grid_axis_rejects_bad_boundaries() {
        assert!(GridAxis::from_boundaries(vec![0]).is_err());
        assert!(GridAxis::from_boundaries(vec![3, 10]).is_err());
        assert!(GridAxis::from_boundaries(vec![0, 10, 10]).is_err());
        let axis = GridAxis::from_boundaries(vec![0, 50, 100]).expect("axis");
        assert_eq!(axis.bands(), 2);
        assert_eq!(axis.band(1), Some((50, 100)));
        assert_eq!(axis.band(2), None);
        assert_eq!(axis.extent(), 100);
    }

    #[test]
    fn border_weights_are_ordered() {
        assert!(BorderWeight::Thin < BorderWeight::Medium);
        assert!(BorderWeight::Medium < BorderWeight::Thick);
    }

    #[test]
    fn share_for_keeps_only_outward_sides() {
        let cell = merged();
        let style = BorderStyle {
            top: Some(BorderWeight::Thin),
            bottom: Some(BorderWeight::Medium),
            left: Some(BorderWeight::Thick),
            right: Some(BorderWeight::Thin),
        };

        let top_left = style.share_for(&cell, 1, 2);
        assert_eq!(top_left.top, Some(BorderWeight::Thin));
        assert_eq!(top_left.left, Some(BorderWeight::Thick));
        assert_eq!(top_left.bottom, None);
        assert_eq!(top_left.right, None);

        let bottom_right = style.share_for(&cell, 2, 3);
        assert_eq!(bottom_right.top, None);
        assert_eq!(bottom_right.left, None);
        assert_eq!(bottom_right.bottom, Some(BorderWeight::Medium));
        assert_eq!(bottom_right.right, Some(BorderWeight::Thin));

        assert!(style.share_for(&cell, 0, 0).is_empty());
    }

    #[test]
    fn unit_cell_share_is_identity() {
        let cell = Cell::unit(0, 0, 0, 0, 10, 10);
        let style = BorderStyle {
            top: Some(BorderWeight::Thin),
            bottom: None,
            left: Some(BorderWeight::Medium),
            right: Some(BorderWeight::Thick),
        };
        assert_eq!(style.share_for(&cell, 0, 0), style);
    }
}
