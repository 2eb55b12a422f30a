//! Plain text rendering of extraction results.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::result::{DocumentResult, ExtractionResult};

use super::{CleanupOptions, TextCleanup};

/// Options for [`to_text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    /// Inserted between consecutive pages
    pub separator: String,

    /// Written in place of a failed page; `{page}` and `{reason}` are
    /// substituted. `None` drops failed pages from the output.
    pub failure_marker: Option<String>,

    /// Leave out pages whose text is empty
    pub skip_empty: bool,

    /// Truncate the output to this many characters
    pub max_chars: Option<usize>,

    /// Cleanup applied to each page's text
    pub cleanup: Option<CleanupOptions>,
}

impl TextOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Set the failure marker template.
    pub fn with_failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.failure_marker = Some(marker.into());
        self
    }

    /// Drop failed pages from the output.
    pub fn without_failures(mut self) -> Self {
        self.failure_marker = None;
        self
    }

    /// Keep or drop empty pages.
    pub fn with_skip_empty(mut self, skip: bool) -> Self {
        self.skip_empty = skip;
        self
    }

    /// Truncate the output.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }

    /// Enable cleanup.
    pub fn with_cleanup(mut self, cleanup: CleanupOptions) -> Self {
        self.cleanup = Some(cleanup);
        self
    }
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            separator: "\n".to_string(),
            failure_marker: Some("[page {page}: {reason}]".to_string()),
            skip_empty: true,
            max_chars: None,
            cleanup: None,
        }
    }
}

/// Join page texts in document order.
pub fn to_text(result: &DocumentResult, options: &TextOptions) -> Result<String> {
    let cleanup = options.cleanup.clone().map(TextCleanup::new);

    let mut parts: Vec<String> = Vec::with_capacity(result.pages.len());
    for page in &result.pages {
        let part = match &page.outcome {
            ExtractionResult::NativeText { text, .. } | ExtractionResult::OcrText { text, .. } => {
                match &cleanup {
                    Some(cleanup) => cleanup.process(text),
                    None => text.clone(),
                }
            }
            ExtractionResult::Failed { reason } => match &options.failure_marker {
                Some(marker) => marker
                    .replace("{page}", &page.number.to_string())
                    .replace("{reason}", &reason.message),
                None => continue,
            },
        };
        if options.skip_empty && part.trim().is_empty() {
            continue;
        }
        parts.push(part);
    }

    let output = parts.join(&options.separator);
    Ok(match options.max_chars {
        Some(max) => truncate_chars(output, max),
        None => output,
    })
}

fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max) {
        text.truncate(cut);
    }
    text
}
