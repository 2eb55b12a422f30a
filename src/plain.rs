//! Sources without pages: DOCX bodies and UTF-8 text files.
//!
//! Each becomes a one-entry result whose text is taken as native text. Empty
//! sources fail with [`Error::NoText`] rather than producing an empty entry.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::detect::SourceFormat;
use crate::error::{Error, Result};

/// Main document part of a DOCX package.
const DOCX_BODY: &str = "word/document.xml";

/// Text of a DOCX or plain-text source.
pub fn extract(data: &[u8], format: SourceFormat) -> Result<String> {
    match format {
        SourceFormat::Docx => docx_text(data),
        SourceFormat::Text => utf8_text(data),
        SourceFormat::Pdf => Err(Error::InvalidDocument(
            "PDF input must be loaded as a paged document".to_string(),
        )),
    }
}

/// Non-empty paragraphs of a DOCX body, joined with spaces.
pub fn docx_text(data: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| Error::InvalidDocument(format!("not a DOCX package: {}", e)))?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| Error::InvalidDocument(format!("{}: {}", DOCX_BODY, e)))?
        .read_to_string(&mut xml)?;

    let text = paragraphs(&xml)?
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.trim().is_empty() {
        return Err(Error::NoText("DOCX".to_string()));
    }
    Ok(text)
}

/// A UTF-8 text file, with CRLF line endings folded to LF.
pub fn utf8_text(data: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::InvalidDocument(format!("text file is not UTF-8: {}", e)))?;
    if text.trim().is_empty() {
        return Err(Error::NoText("TXT".to_string()));
    }
    Ok(text.replace("\r\n", "\n"))
}

/// Paragraph texts in document order. Paragraphs nested in text boxes are
/// folded into the paragraph that anchors them.
fn paragraphs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => depth += 1,
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) if depth > 0 => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text && depth > 0 => {
                current.push_str(&t.unescape().map_err(xml_error)?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"p" if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

fn xml_error(err: quick_xml::Error) -> Error {
    Error::InvalidDocument(format!("{}: {}", DOCX_BODY, err))
}
