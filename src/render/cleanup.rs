//! Text cleanup for extracted page text.
//!
//! Text from embedded layers often carries presentation forms (ligatures,
//! decomposed accents) and OCR output carries ragged whitespace. A
//! [`TextCleanup`] pass evens both out before text is handed downstream.

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Cleanup preset levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPreset {
    /// Unicode NFC normalization and whitespace only
    Minimal,
    /// Minimal plus ligatures, replacement characters and hyphenation
    #[default]
    Standard,
}

/// Options for text cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupOptions {
    /// Normalize Unicode to NFC form
    pub normalize_unicode: bool,

    /// Replace ligature code points (ﬁ, ﬂ, ...) with their letters
    pub fix_ligatures: bool,

    /// Remove the Unicode replacement character (U+FFFD)
    pub remove_replacement_char: bool,

    /// Remove Private Use Area characters left by unmapped fonts
    pub remove_pua: bool,

    /// Join words hyphenated across line breaks
    pub fix_hyphenation: bool,

    /// Collapse runs of spaces and tabs, trim line ends
    pub normalize_whitespace: bool,

    /// Maximum consecutive newlines (0 = unlimited)
    pub max_consecutive_newlines: u8,
}

impl CleanupOptions {
    /// Create options from a preset.
    pub fn from_preset(preset: CleanupPreset) -> Self {
        match preset {
            CleanupPreset::Minimal => Self::minimal(),
            CleanupPreset::Standard => Self::standard(),
        }
    }

    /// Minimal cleanup options.
    pub fn minimal() -> Self {
        Self {
            normalize_unicode: true,
            fix_ligatures: false,
            remove_replacement_char: false,
            remove_pua: false,
            fix_hyphenation: false,
            normalize_whitespace: true,
            max_consecutive_newlines: 0,
        }
    }

    /// Standard cleanup options.
    pub fn standard() -> Self {
        Self {
            normalize_unicode: true,
            fix_ligatures: true,
            remove_replacement_char: true,
            remove_pua: true,
            fix_hyphenation: true,
            normalize_whitespace: true,
            max_consecutive_newlines: 2,
        }
    }
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self::standard()
    }
}

const LIGATURES: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
];

/// Text cleanup pass.
#[derive(Debug, Clone)]
pub struct TextCleanup {
    options: CleanupOptions,
    hyphenation: Regex,
    spaces: Regex,
}

impl TextCleanup {
    /// Create a cleanup pass with the given options.
    pub fn new(options: CleanupOptions) -> Self {
        Self {
            options,
            hyphenation: Regex::new(r"([A-Za-z])-[ \t]*\n[ \t]*([a-z])").unwrap(),
            spaces: Regex::new(r"[ \t\u{00A0}]{2,}").unwrap(),
        }
    }

    /// Create a cleanup pass from a preset.
    pub fn from_preset(preset: CleanupPreset) -> Self {
        Self::new(CleanupOptions::from_preset(preset))
    }

    /// Options in effect.
    pub fn options(&self) -> &CleanupOptions {
        &self.options
    }

    /// Clean one page of text.
    pub fn process(&self, text: &str) -> String {
        let mut result: String = if self.options.normalize_unicode {
            text.nfc().collect()
        } else {
            text.to_string()
        };

        if self.options.fix_ligatures && result.chars().any(is_ligature) {
            result = result
                .chars()
                .fold(String::with_capacity(result.len()), |mut out, c| {
                    match LIGATURES.iter().find(|(lig, _)| *lig == c) {
                        Some((_, letters)) => out.push_str(letters),
                        None => out.push(c),
                    }
                    out
                });
        }

        if self.options.remove_replacement_char || self.options.remove_pua {
            result.retain(|c| {
                !(self.options.remove_replacement_char && c == '\u{FFFD}'
                    || self.options.remove_pua && is_pua(c))
            });
        }

        if self.options.fix_hyphenation {
            result = self.hyphenation.replace_all(&result, "$1$2").into_owned();
        }

        if self.options.normalize_whitespace {
            result = self.normalize_whitespace(&result);
        }

        if self.options.max_consecutive_newlines > 0 {
            result = limit_newlines(&result, self.options.max_consecutive_newlines as usize);
        }

        result.trim().to_string()
    }

    fn normalize_whitespace(&self, text: &str) -> String {
        let collapsed = self.spaces.replace_all(text, " ");
        collapsed
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for TextCleanup {
    fn default() -> Self {
        Self::new(CleanupOptions::default())
    }
}

fn is_ligature(c: char) -> bool {
    ('\u{FB00}'..='\u{FB06}').contains(&c)
}

fn is_pua(c: char) -> bool {
    let code = c as u32;
    (0xE000..=0xF8FF).contains(&code)
        || (0xF0000..=0xFFFFD).contains(&code)
        || (0x100000..=0x10FFFD).contains(&code)
}

fn limit_newlines(text: &str, max: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0;
    for c in text.chars() {
        if c == '\n' {
            run += 1;
            if run > max {
                continue;
            }
        } else {
            run = 0;
        }
        out.push(c);
    }
    out
}
