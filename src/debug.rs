use anyhow::{Context, Result};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use crate::config::DebugConfig;
use crate::table::{BinaryImage, Cell};

const UNIT_COLOR: Rgb<u8> = Rgb([220, 30, 30]);
const MERGED_COLOR: Rgb<u8> = Rgb([30, 90, 220]);

/// Where intermediate images of one conversion are written.
#[derive(Debug, Clone)]
pub struct DebugArtifacts {
    output_dir: PathBuf,
    base_name: String,
}

impl DebugArtifacts {
    pub fn new(output_dir: &Path, base_name: &str) -> Result<Self> {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create debug dir: {}", output_dir.display()))?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            base_name: sanitize_filename_component(base_name),
        })
    }

    /// `None` when no output directory is configured.
    pub fn from_config(config: &DebugConfig) -> Result<Option<Self>> {
        let Some(dir) = config.output_dir.as_deref() else {
            return Ok(None);
        };
        let base = config.base_name.as_deref().unwrap_or("table");
        Self::new(dir, base).map(Some)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_binary.png", self.base_name))
    }

    pub fn cells_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_cells.png", self.base_name))
    }

    pub fn write_binary(&self, binary: &BinaryImage) -> Result<PathBuf> {
        let path = self.binary_path();
        binary
            .as_gray()
            .save(&path)
            .with_context(|| format!("failed to write debug image: {}", path.display()))?;
        Ok(path)
    }

    /// Draws every cell outline over `page`; merged cells use a second color.
    pub fn write_cells(&self, page: &GrayImage, cells: &[Cell]) -> Result<PathBuf> {
        let path = self.cells_path();
        let mut canvas = RgbImage::from_fn(page.width(), page.height(), |x, y| {
            let value = page.get_pixel(x, y)[0];
            Rgb([value, value, value])
        });
        for cell in cells.iter().filter(|cell| cell.width > 0 && cell.height > 0) {
            let color = if cell.is_merged() { MERGED_COLOR } else { UNIT_COLOR };
            let rect = Rect::at(cell.x as i32, cell.y as i32).of_size(cell.width, cell.height);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
        canvas
            .save(&path)
            .with_context(|| format!("failed to write debug image: {}", path.display()))?;
        Ok(path)
    }
}

pub(crate) fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if ch.is_whitespace() || ch == '.' {
            out.push('_');
        }
    }
    if out.is_empty() {
        "table".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use tempfile::tempdir;

    #[test]
    fn sanitizes_base_names() {
        assert_eq!(sanitize_filename_component("scan 01.v2"), "scan_01_v2");
        assert_eq!(sanitize_filename_component("表"), "table");
        assert_eq!(sanitize_filename_component("a/b"), "ab");
    }

    #[test]
    fn writes_binary_and_cell_overlay() {
        let dir = tempdir().expect("tempdir");
        let artifacts =
            DebugArtifacts::new(&dir.path().join("debug"), "page one").expect("artifacts");
        let gray = GrayImage::from_pixel(40, 30, Luma([255]));
        let binary = BinaryImage::from_gray(&gray, 127);

        let binary_path = artifacts.write_binary(&binary).expect("binary");
        assert!(binary_path.ends_with("page_one_binary.png"));
        assert!(binary_path.exists());

        let cells = vec![Cell::unit(0, 0, 0, 0, 20, 30), Cell::unit(0, 1, 20, 0, 20, 30)];
        let cells_path = artifacts.write_cells(&gray, &cells).expect("cells");
        let overlay = image::open(&cells_path).expect("open overlay").to_rgb8();
        assert_eq!(overlay.get_pixel(0, 10), &UNIT_COLOR);
        assert_eq!(overlay.get_pixel(10, 10), &Rgb([255, 255, 255]));
    }

    #[test]
    fn missing_dir_disables_artifacts() {
        let config = DebugConfig::default();
        assert!(DebugArtifacts::from_config(&config).expect("config").is_none());
    }
}
