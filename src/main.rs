use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "ruled-table-rust",
    version,
    about = "Reconstruct a ruled table (grid, merged cells, borders, text) from an image"
)]
struct Cli {
    /// Table image (png/jpeg/bmp/tiff)
    input: Option<PathBuf>,

    /// Write the JSON reconstruction to this file (default: stdout)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Column width scale factor
    #[arg(long = "scale-col")]
    scale_col: Option<f64>,

    /// Row height scale factor
    #[arg(long = "scale-row")]
    scale_row: Option<f64>,

    /// Minimum ruling length in pixels
    #[arg(long = "min-line")]
    min_line: Option<u32>,

    /// OCR engine: lines (hOCR) or words (TSV)
    #[arg(long = "engine")]
    engine: Option<String>,

    /// Tesseract languages (e.g. jpn+eng)
    #[arg(long = "lang")]
    lang: Option<String>,

    /// Disable confidence-driven OCR retries
    #[arg(long = "no-retry")]
    no_retry: bool,

    /// Write binary and cell overlay images to this directory
    #[arg(long = "debug-dir")]
    debug_dir: Option<PathBuf>,

    /// Print a conversion summary to stderr
    #[arg(long = "report")]
    report: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Suppress log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    ruled_table_rust::logging::init(cli.verbose, cli.quiet)?;

    let input = cli
        .input
        .ok_or_else(|| anyhow!("no input image given (usage: ruled-table-rust <IMAGE>)"))?;

    let output = ruled_table_rust::run(ruled_table_rust::Config {
        input,
        settings_path: cli.read_settings,
        column_width_scale: cli.scale_col,
        row_height_scale: cli.scale_row,
        min_line_length: cli.min_line,
        engine: cli.engine,
        languages: cli.lang,
        no_retry: cli.no_retry,
        debug_dir: cli.debug_dir,
    })?;

    match cli.output {
        Some(path) => fs::write(&path, format!("{}\n", output.json))
            .with_context(|| format!("failed to write output: {}", path.display()))?,
        None => println!("{}", output.json),
    }
    if cli.report {
        eprintln!("{}", output.report);
    }
    Ok(())
}
