//! Input format detection and PDF header sniffing.
//!
//! Cheap checks that run before anything is parsed, so that obviously
//! wrong uploads fail fast with [`Error::UnknownFormat`].

use crate::error::{Error, Result};

/// PDF header information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfHeader {
    /// PDF version (e.g., "1.7", "2.0")
    pub version: String,
    /// Byte offset of the `%PDF-` marker
    pub offset: usize,
    /// Whether an `%%EOF` marker appears near the end of the buffer
    pub has_eof_marker: bool,
}

impl std::fmt::Display for PdfHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PDF {}", self.version)
    }
}

/// Accepted input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Paged PDF, extracted per page
    Pdf,
    /// Word document, read as one entry
    Docx,
    /// UTF-8 text, read as one entry
    Text,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SourceFormat::Pdf => "PDF",
            SourceFormat::Docx => "DOCX",
            SourceFormat::Text => "TXT",
        })
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const VERSION_LEN: usize = 3; // e.g., "1.7"

/// Readers accept junk before the header within the first kilobyte.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Window searched backwards for `%%EOF`.
const EOF_SEARCH_WINDOW: usize = 2048;

/// Decide how to read `data`.
///
/// A `txt` or `docx` extension is trusted as given. Otherwise the content
/// decides: a ZIP package is taken as DOCX, and anything else must carry a
/// PDF header. Plain text has no signature, so without the extension it is
/// rejected like any other unknown input.
pub fn detect_format(data: &[u8], extension: Option<&str>) -> Result<SourceFormat> {
    let extension = extension.map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("txt") => return Ok(SourceFormat::Text),
        Some("docx") => return Ok(SourceFormat::Docx),
        _ => {}
    }
    if data.starts_with(ZIP_MAGIC) {
        return Ok(SourceFormat::Docx);
    }
    sniff(data).map(|_| SourceFormat::Pdf)
}

/// Locate and validate the PDF header in `data`.
///
/// # Returns
/// * `Ok(PdfHeader)` if a `%PDF-x.y` marker is found in the first kilobyte
/// * `Err(Error::UnknownFormat)` if no marker is found
/// * `Err(Error::UnsupportedVersion)` if the version is malformed
pub fn sniff(data: &[u8]) -> Result<PdfHeader> {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let offset = find(window, PDF_MAGIC).ok_or(Error::UnknownFormat)?;

    let version_start = offset + PDF_MAGIC.len();
    let version_bytes = data
        .get(version_start..version_start + VERSION_LEN)
        .ok_or(Error::UnknownFormat)?;
    let version = String::from_utf8_lossy(version_bytes).to_string();

    if !is_valid_version(&version) {
        return Err(Error::UnsupportedVersion(version));
    }

    let tail_start = data.len().saturating_sub(EOF_SEARCH_WINDOW);
    let has_eof_marker = find(&data[tail_start..], b"%%EOF").is_some();

    Ok(PdfHeader {
        version,
        offset,
        has_eof_marker,
    })
}

/// Check if bytes look like a PDF.
pub fn is_pdf_bytes(data: &[u8]) -> bool {
    sniff(data).is_ok()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn is_valid_version(version: &str) -> bool {
    let bytes = version.as_bytes();
    bytes.len() == VERSION_LEN
        && matches!(bytes[0], b'1' | b'2')
        && bytes[1] == b'.'
        && bytes[2].is_ascii_digit()
}
