use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::parse::{parse_hocr_lines, parse_tsv_lines};
use super::{OcrEngine, Recognition};

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_language_list(&stdout))
}

fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keeps the requested languages tesseract actually has installed.
fn normalize_ocr_languages(requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }

    let available = match list_tesseract_languages() {
        Ok(list) => list,
        Err(err) => {
            debug!("tesseract: language list failed: {:#}", err);
            return Ok(trimmed.to_string());
        }
    };
    select_languages(trimmed, &available)
}

fn select_languages(requested: &str, available: &[String]) -> Result<String> {
    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in requested.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }
    Ok(chosen.join("+"))
}

#[derive(Debug, Clone, Copy)]
enum OutputFormat {
    Hocr,
    Tsv,
}

impl OutputFormat {
    fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Hocr => "hocr",
            OutputFormat::Tsv => "tsv",
        }
    }
}

fn run_tesseract(path: &Path, languages: &str, psm: u32, format: OutputFormat) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg("--dpi")
        .arg("300")
        .arg(format.as_str())
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Language selection and subprocess plumbing shared by both engines. The
/// installed-language check runs once, on first recognition; a failed check
/// is remembered and reported for every later call.
#[derive(Debug)]
struct TesseractSession {
    requested: String,
    psm: u32,
    languages: OnceLock<std::result::Result<String, String>>,
}

impl TesseractSession {
    fn new(requested: String, psm: u32) -> Self {
        Self {
            requested,
            psm,
            languages: OnceLock::new(),
        }
    }

    fn languages(&self) -> Result<&str> {
        self.languages_with(normalize_ocr_languages)
    }

    fn languages_with(&self, resolve: impl FnOnce(&str) -> Result<String>) -> Result<&str> {
        let resolved = self.languages.get_or_init(|| match resolve(self.requested.as_str()) {
            Ok(languages) => {
                debug!("tesseract: using languages {}", languages);
                Ok(languages)
            }
            Err(err) => {
                warn!("tesseract: language check failed: {:#}", err);
                Err(format!("{:#}", err))
            }
        });
        match resolved {
            Ok(languages) => Ok(languages),
            Err(message) => Err(anyhow!("{}", message)),
        }
    }

    fn run(&self, image: &DynamicImage, format: OutputFormat) -> Result<String> {
        let languages = self.languages()?;
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();
        run_tesseract(tmp.path(), languages, self.psm, format)
    }
}

/// Line-level recognition through hOCR. Confidence is the mean line
/// confidence.
#[derive(Debug)]
pub struct TesseractLineEngine {
    session: TesseractSession,
}

impl TesseractLineEngine {
    pub fn new(languages: impl Into<String>, psm: u32) -> Self {
        Self {
            session: TesseractSession::new(languages.into(), psm),
        }
    }
}

impl OcrEngine for TesseractLineEngine {
    fn name(&self) -> &'static str {
        "tesseract-lines"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<Recognition> {
        let hocr = self.session.run(image, OutputFormat::Hocr)?;
        Ok(recognition_from_hocr(&hocr))
    }
}

fn recognition_from_hocr(hocr: &str) -> Recognition {
    let lines = parse_hocr_lines(hocr);
    if lines.is_empty() {
        return Recognition::default();
    }
    let text = lines
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let mean = lines.iter().map(|line| line.conf).sum::<f32>() / lines.len() as f32;
    Recognition::new(text, mean / 100.0)
}

/// Word-level recognition through TSV. Confidence is the character-weighted
/// mean word confidence.
#[derive(Debug)]
pub struct TesseractWordEngine {
    session: TesseractSession,
}

impl TesseractWordEngine {
    pub fn new(languages: impl Into<String>, psm: u32) -> Self {
        Self {
            session: TesseractSession::new(languages.into(), psm),
        }
    }
}

impl OcrEngine for TesseractWordEngine {
    fn name(&self) -> &'static str {
        "tesseract-words"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<Recognition> {
        let tsv = self.session.run(image, OutputFormat::Tsv)?;
        Ok(recognition_from_tsv(&tsv))
    }
}

fn recognition_from_tsv(tsv: &str) -> Recognition {
    let lines = parse_tsv_lines(tsv);
    if lines.is_empty() {
        return Recognition::default();
    }
    let weight = lines.iter().map(|line| line.weight).sum::<f32>();
    let weighted = lines.iter().map(|line| line.conf * line.weight).sum::<f32>();
    let text = lines
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    Recognition::new(text, weighted / weight / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_list_skips_header() {
        let stdout =
            "List of available languages in \"/usr/share/tessdata/\" (3):\neng\njpn\n\nosd\n";
        assert_eq!(parse_language_list(stdout), vec!["eng", "jpn", "osd"]);
    }

    #[test]
    fn selects_installed_languages() {
        let available = vec!["eng".to_string(), "osd".to_string()];
        assert_eq!(select_languages("jpn+eng", &available).expect("eng"), "eng");
        assert!(select_languages("jpn", &available).is_err());
    }

    #[test]
    fn failed_language_check_runs_once() {
        let session = TesseractSession::new("jpn".to_string(), 6);
        let calls = std::cell::Cell::new(0);
        let failing = |_: &str| -> Result<String> {
            calls.set(calls.get() + 1);
            Err(anyhow!("no requested OCR language is installed"))
        };
        let first = session.languages_with(failing).expect_err("first");
        let second = session
            .languages_with(|_| Ok("eng".to_string()))
            .expect_err("remembered");
        assert_eq!(calls.get(), 1);
        assert_eq!(first.to_string(), second.to_string());
        assert!(second.to_string().contains("installed"));
    }

    #[test]
    fn resolved_languages_are_reused() {
        let session = TesseractSession::new("jpn+eng".to_string(), 6);
        assert_eq!(session.languages_with(|_| Ok("eng".to_string())).expect("eng"), "eng");
        assert_eq!(session.languages_with(|_| Ok("jpn".to_string())).expect("cached"), "eng");
    }

    #[test]
    fn hocr_confidence_is_mean_of_lines() {
        let hocr = "<span class='ocr_line' title='bbox 0 0 50 10'>\
<span class='ocrx_word' title='bbox 0 0 20 10; x_wconf 90'>ab</span></span>\
<span class='ocr_line' title='bbox 0 20 50 30'>\
<span class='ocrx_word' title='bbox 0 20 20 30; x_wconf 70'>cdef</span></span>";
        let recognition = recognition_from_hocr(hocr);
        assert_eq!(recognition.text, "ab\ncdef");
        assert!((recognition.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn tsv_confidence_is_character_weighted() {
        let tsv = [
            "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\t\
             left\ttop\twidth\theight\tconf\ttext",
            "5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tab",
            "5\t1\t1\t1\t2\t1\t0\t20\t10\t10\t70\tcdef",
        ]
        .join("\n");
        let recognition = recognition_from_tsv(&tsv);
        assert_eq!(recognition.text, "ab\ncdef");
        assert!((recognition.confidence - (90.0 * 2.0 + 70.0 * 4.0) / 600.0).abs() < 1e-6);
    }

    #[test]
    fn empty_output_is_empty_recognition() {
        assert_eq!(recognition_from_hocr(""), Recognition::default());
        assert_eq!(recognition_from_tsv("level\n"), Recognition::default());
    }
}
