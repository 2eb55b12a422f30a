//! OCR over rendered pages.
//!
//! [`Recognizer`] is the process boundary for OCR. The default
//! [`Tesseract`] implementation pipes the PNG into `tesseract` on stdin and
//! parses its TSV report from stdout, which carries per-word confidences.

use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::PageError;
use crate::process::{run_tool, ProcessError, ProcessLimits};
use crate::raster::Bitmap;

/// Language used when no hint is given.
pub const DEFAULT_LANGUAGE: &str = "eng";

const MAX_LANGUAGE_LEN: usize = 32;

/// TSV `level` column value for words.
const WORD_LEVEL: u32 = 5;

/// One recognized line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    /// Words of the line joined by single spaces
    pub text: String,
    /// Mean word confidence in `[0, 1]`
    pub confidence: f32,
}

/// Text recognized on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrText {
    /// Recognized text, paragraphs separated by blank lines
    pub text: String,
    /// Mean word confidence in `[0, 1]`; 0 when nothing was recognized
    pub confidence: f32,
    /// Per-line breakdown
    pub lines: Vec<OcrLine>,
}

impl OcrText {
    /// Result with text only, for engines that report no per-line detail.
    pub fn plain(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            lines: Vec::new(),
        }
    }
}

/// Everything a recognizer needs for one page.
#[derive(Debug, Clone, Copy)]
pub struct OcrRequest<'a> {
    /// 1-based page number, for logs
    pub page_number: u32,
    /// Tesseract-style language hint (`eng`, `eng+hin`, ...)
    pub language: &'a str,
    /// Timeout and output cap
    pub limits: ProcessLimits,
    /// Run-level cancellation
    pub cancel: &'a CancellationToken,
}

/// Recognizes text in a bitmap.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Recognize one page image.
    async fn recognize(&self, bitmap: &Bitmap, request: OcrRequest<'_>)
        -> Result<OcrText, PageError>;
}

/// Check a language hint before it reaches a command line.
pub fn validate_language(language: &str) -> Result<(), String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_]+(\+[A-Za-z0-9_]+)*$").expect("valid language pattern")
    });

    if language.is_empty() || language.len() > MAX_LANGUAGE_LEN {
        return Err(format!("invalid language hint length: {:?}", language));
    }
    if !pattern.is_match(language) {
        return Err(format!("invalid language hint: {:?}", language));
    }
    Ok(())
}

/// Runs the `tesseract` CLI.
#[derive(Debug, Clone)]
pub struct Tesseract {
    program: PathBuf,
}

impl Tesseract {
    /// Use `program` as the `tesseract` executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, bitmap: &Bitmap, language: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .arg("--dpi")
            .arg(bitmap.dpi().to_string())
            .arg("tsv");
        cmd
    }
}

impl Default for Tesseract {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl Recognizer for Tesseract {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(
        &self,
        bitmap: &Bitmap,
        request: OcrRequest<'_>,
    ) -> Result<OcrText, PageError> {
        validate_language(request.language).map_err(PageError::Ocr)?;

        let stdout = run_tool(
            self.command(bitmap, request.language),
            Some(bitmap.png()),
            request.limits,
            request.cancel,
        )
        .await
        .map_err(ocr_error)?;

        let report = String::from_utf8_lossy(&stdout);
        let text = parse_tsv(&report)?;
        log::debug!(
            "page {}: OCR recognized {} lines (confidence {:.2})",
            request.page_number,
            text.lines.len(),
            text.confidence
        );
        Ok(text)
    }
}

fn ocr_error(err: ProcessError) -> PageError {
    match err {
        ProcessError::Timeout { timeout, .. } => PageError::OcrTimeout(timeout),
        ProcessError::OutputTooLarge { tool, limit } => PageError::OutputTooLarge { tool, limit },
        ProcessError::Cancelled { .. } => PageError::Cancelled,
        other => PageError::Ocr(other.to_string()),
    }
}

/// Parse a tesseract TSV report into text with confidences.
pub fn parse_tsv(report: &str) -> Result<OcrText, PageError> {
    let mut rows = report.lines();
    let header = rows
        .next()
        .ok_or_else(|| PageError::Ocr("empty OCR report".into()))?;
    if !header.starts_with("level\t") {
        return Err(PageError::Ocr(format!(
            "unexpected OCR report header: {:?}",
            header.chars().take(40).collect::<String>()
        )));
    }

    let mut lines: Vec<(LineKey, Vec<(String, f32)>)> = Vec::new();

    for row in rows {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        if cols[0].parse::<u32>().ok() != Some(WORD_LEVEL) {
            continue;
        }
        let word = cols[11].trim();
        let Ok(conf) = cols[10].trim().parse::<f32>() else {
            continue;
        };
        if word.is_empty() || conf < 0.0 {
            continue;
        }

        let key = LineKey {
            page: cols[1].parse().unwrap_or(0),
            block: cols[2].parse().unwrap_or(0),
            par: cols[3].parse().unwrap_or(0),
            line: cols[4].parse().unwrap_or(0),
        };
        match lines.last_mut() {
            Some((last, words)) if *last == key => words.push((word.to_string(), conf)),
            _ => lines.push((key, vec![(word.to_string(), conf)])),
        }
    }

    let mut text = String::new();
    let mut out_lines = Vec::with_capacity(lines.len());
    let mut total_conf = 0.0f32;
    let mut total_words = 0usize;
    let mut previous: Option<LineKey> = None;

    for (key, words) in lines {
        if let Some(prev) = previous {
            text.push('\n');
            if !prev.same_paragraph(&key) {
                text.push('\n');
            }
        }
        let line_text = words
            .iter()
            .map(|(w, _)| w.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let line_conf: f32 = words.iter().map(|(_, c)| *c).sum();
        total_conf += line_conf;
        total_words += words.len();

        text.push_str(&line_text);
        out_lines.push(OcrLine {
            text: line_text,
            confidence: (line_conf / words.len() as f32 / 100.0).clamp(0.0, 1.0),
        });
        previous = Some(key);
    }

    let confidence = if total_words == 0 {
        0.0
    } else {
        (total_conf / total_words as f32 / 100.0).clamp(0.0, 1.0)
    };

    Ok(OcrText {
        text,
        confidence,
        lines: out_lines,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineKey {
    page: u32,
    block: u32,
    par: u32,
    line: u32,
}

impl LineKey {
    fn same_paragraph(&self, other: &LineKey) -> bool {
        self.page == other.page && self.block == other.block && self.par == other.par
    }
}
