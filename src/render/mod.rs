//! Rendering module for converting extraction results to output formats.

mod cleanup;
mod json;
mod text;

pub use cleanup::{CleanupOptions, CleanupPreset, TextCleanup};
pub use json::{to_json, JsonFormat};
pub use text::{to_text, TextOptions};
