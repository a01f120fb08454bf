use tracing::debug;

use super::Cell;
use crate::config::GeometryConfig;

/// Spreadsheet column widths (character units) and row heights (points).
///
/// Only unmerged cells contribute samples; a column or row without any gets
/// the spreadsheet default.
pub fn map_geometry(cells: &[Cell], config: &GeometryConfig) -> (Vec<f64>, Vec<f64>) {
    let cols = cells.iter().map(|c| c.last_col() + 1).max().unwrap_or(0);
    let rows = cells.iter().map(|c| c.last_row() + 1).max().unwrap_or(0);

    let mut width_samples = vec![Vec::new(); cols];
    let mut height_samples = vec![Vec::new(); rows];
    for cell in cells.iter().filter(|cell| !cell.is_merged()) {
        width_samples[cell.col].push(
            f64::from(cell.width) * config.pixel_to_column_width * config.column_width_scale,
        );
        height_samples[cell.row]
            .push(f64::from(cell.height) * config.pixel_to_row_height * config.row_height_scale);
    }

    let widths = width_samples
        .iter()
        .map(|samples| {
            mean(samples).map_or(config.default_column_width, |value| {
                value.clamp(1.0, config.max_column_width)
            })
        })
        .collect::<Vec<_>>();
    let heights = height_samples
        .iter()
        .map(|samples| {
            mean(samples).map_or(config.default_row_height, |value| {
                value.clamp(1.0, config.max_row_height)
            })
        })
        .collect::<Vec<_>>();
    debug!("geometry: widths {:?}, heights {:?}", widths, heights);
    (widths, heights)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn converts_pixels_to_sheet_units() {
        let cells = vec![
            Cell::unit(0, 0, 0, 0, 70, 20),
            Cell::unit(0, 1, 70, 0, 140, 20),
            Cell::unit(1, 0, 0, 20, 84, 40),
            Cell::unit(1, 1, 70, 20, 140, 40),
        ];
        let (widths, heights) = map_geometry(&cells, &GeometryConfig::default());
        assert!(approx(widths[0], 11.0));
        assert!(approx(widths[1], 20.0));
        assert!(approx(heights[0], 15.0));
        assert!(approx(heights[1], 30.0));
    }

    #[test]
    fn merged_cells_do_not_contribute() {
        let merged = Cell {
            colspan: 2,
            ..Cell::unit(0, 0, 0, 0, 700, 20)
        };
        let cells = vec![
            merged,
            Cell::unit(1, 0, 0, 20, 70, 20),
            Cell::unit(1, 1, 70, 20, 140, 20),
        ];
        let (widths, heights) = map_geometry(&cells, &GeometryConfig::default());
        assert_eq!(widths.len(), 2);
        assert!(approx(widths[0], 10.0));
        assert!(approx(widths[1], 20.0));
        assert!(approx(heights[0], 15.0));
    }

    #[test]
    fn missing_samples_fall_back_to_defaults() {
        let merged = Cell {
            rowspan: 2,
            colspan: 2,
            ..Cell::unit(0, 0, 0, 0, 200, 200)
        };
        let config = GeometryConfig::default();
        let (widths, heights) = map_geometry(&[merged], &config);
        assert_eq!(widths, vec![config.default_column_width; 2]);
        assert_eq!(heights, vec![config.default_row_height; 2]);
    }

    #[test]
    fn clamps_to_sheet_limits() {
        let cells = vec![Cell::unit(0, 0, 0, 0, 3, 1), Cell::unit(0, 1, 3, 0, 5000, 1)];
        let config = GeometryConfig {
            row_height_scale: 1000.0,
            ..GeometryConfig::default()
        };
        let (widths, heights) = map_geometry(&cells, &config);
        assert!(approx(widths[0], 1.0));
        assert!(approx(widths[1], 255.0));
        assert!(approx(heights[0], 409.5));
    }

    #[test]
    fn scale_factors_apply() {
        let cells = vec![Cell::unit(0, 0, 0, 0, 70, 20)];
        let config = GeometryConfig {
            column_width_scale: 2.0,
            row_height_scale: 0.5,
            ..GeometryConfig::default()
        };
        let (widths, heights) = map_geometry(&cells, &config);
        assert!(approx(widths[0], 20.0));
        assert!(approx(heights[0], 7.5));
    }
}
