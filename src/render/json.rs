//! JSON rendering of extraction results.

use crate::error::{Error, Result};
use crate::result::DocumentResult;

/// JSON output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonFormat {
    /// Pretty-printed JSON with indentation
    #[default]
    Pretty,
    /// Compact JSON without extra whitespace
    Compact,
}

/// Convert a document result to JSON.
pub fn to_json(result: &DocumentResult, format: JsonFormat) -> Result<String> {
    let json = match format {
        JsonFormat::Pretty => serde_json::to_string_pretty(result),
        JsonFormat::Compact => serde_json::to_string(result),
    };

    json.map_err(|e| Error::Serialize(format!("JSON serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceId;
    use crate::error::PageError;
    use crate::result::{assemble, ExtractionResult, PageResult, RunMetadata};
    use crate::strategy::Strategy;

    fn sample() -> DocumentResult {
        let mut native = PageResult::new(
            0,
            ExtractionResult::NativeText {
                text: "Hello".into(),
                density: 0.5,
            },
        );
        native.strategy = Some(Strategy::NativeOnly);
        let failed = PageResult::failed(1, &PageError::Cancelled);
        assemble(
            vec![native, failed],
            RunMetadata::started(SourceId::new("upload.pdf")),
            0,
        )
    }

    #[test]
    fn test_to_json_pretty() {
        let json = to_json(&sample(), JsonFormat::Pretty).unwrap();
        assert!(json.contains("\"status\": \"native\""));
        assert!(json.contains('\n'));
    }

    #[test]
    fn test_to_json_compact() {
        let json = to_json(&sample(), JsonFormat::Compact).unwrap();
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_json_shape() {
        let json = to_json(&sample(), JsonFormat::Compact).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let pages = value["pages"].as_array().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0]["strategy"], "native_only");
        assert_eq!(pages[0]["text"], "Hello");
        assert_eq!(pages[1]["status"], "failed");
        assert_eq!(pages[1]["reason"]["kind"], "cancelled");
        assert_eq!(value["stats"]["failed_pages"], 1);
        assert_eq!(value["metadata"]["source"], "upload.pdf");
    }

    #[test]
    fn test_json_round_trip() {
        let original = sample();
        let json = to_json(&original, JsonFormat::Compact).unwrap();
        let parsed: DocumentResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }
}
