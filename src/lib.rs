use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod config;
pub mod debug;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod report;
pub mod settings;
pub mod table;

pub use config::{
    BinarizeMethod, DebugConfig, EngineKind, GeometryConfig, LineConfig, MergeConfig, OcrConfig,
    PipelineConfig, PreprocessConfig,
};
pub use ocr::{CellContent, OcrEngine, Recognition};
pub use pipeline::{ConversionStats, GridSummary, TablePipeline, TableReconstruction, load_image};
pub use report::ConversionReport;
pub use table::{BorderStyle, BorderWeight, Cell, CellKey, GridAxis, Line, Orientation, Span};

/// Command-line overrides applied on top of the layered settings.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub input: PathBuf,
    pub settings_path: Option<String>,
    pub column_width_scale: Option<f64>,
    pub row_height_scale: Option<f64>,
    pub min_line_length: Option<u32>,
    pub engine: Option<String>,
    pub languages: Option<String>,
    pub no_retry: bool,
    pub debug_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub json: String,
    pub report: ConversionReport,
}

pub fn run(config: Config) -> Result<RunOutput> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut pipeline_config = settings::load_settings(settings_path)?;
    apply_overrides(&mut pipeline_config, &config)?;

    let image = load_image(&config.input)?;
    let pipeline = TablePipeline::from_config(pipeline_config)?;
    info!(
        "run: {} with {}",
        config.input.display(),
        pipeline.config().ocr.engine.as_str()
    );
    let table = pipeline.convert(&image)?;

    let json = serde_json::to_string_pretty(&table).with_context(|| "failed to serialize table")?;
    Ok(RunOutput {
        json,
        report: ConversionReport::from_reconstruction(&table),
    })
}

fn apply_overrides(target: &mut PipelineConfig, config: &Config) -> Result<()> {
    if let Some(scale) = config.column_width_scale {
        target.geometry.column_width_scale = scale;
    }
    if let Some(scale) = config.row_height_scale {
        target.geometry.row_height_scale = scale;
    }
    if let Some(length) = config.min_line_length {
        target.lines.min_line_length = length;
    }
    if let Some(engine) = config.engine.as_deref() {
        target.ocr.engine = EngineKind::parse(engine)?;
    }
    if let Some(languages) = config.languages.as_deref() {
        target.ocr.languages = languages.trim().to_string();
    }
    if config.no_retry {
        target.ocr.enable_retry = false;
    }
    if let Some(dir) = config.debug_dir.as_ref() {
        target.debug.output_dir = Some(dir.clone());
        target.debug.base_name = config
            .input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string);
    }
    target.validate()
}
