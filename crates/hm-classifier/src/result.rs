//! Classifier result types.

use serde::{Deserialize, Serialize};

/// Which format mismatch an upload showed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// PNG signature followed by a JFIF marker.
    PngWithJpegMarker,

    /// JPEG start-of-image followed by a PNG token.
    JpegWithPngMarker,
}

impl AnomalyKind {
    /// Machine-readable code.
    pub fn to_code(&self) -> &'static str {
        match self {
            AnomalyKind::PngWithJpegMarker => "PNG_WITH_JPEG_MARKER",
            AnomalyKind::JpegWithPngMarker => "JPEG_WITH_PNG_MARKER",
        }
    }
}

/// Result of inspecting an upload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inspection {
    /// Whether the upload should trigger the crash flow.
    pub anomalous: bool,

    /// The mismatch that was seen. None when clean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AnomalyKind>,
}

impl Inspection {
    /// A clean upload.
    pub fn clean() -> Self {
        Self {
            anomalous: false,
            kind: None,
        }
    }

    /// An anomalous upload.
    pub fn anomalous(kind: AnomalyKind) -> Self {
        Self {
            anomalous: true,
            kind: Some(kind),
        }
    }
}

/// Outcome of an access gate check, as the retrieval handler sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    /// Proceed with the lookup.
    Allow,

    /// Do not look anything up; redirect to a fixed target.
    Redirect { location: String },
}

impl GateDecision {
    /// True for [`GateDecision::Allow`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspection_serialization() {
        let json = serde_json::to_string(&Inspection::anomalous(AnomalyKind::PngWithJpegMarker))
            .unwrap();
        assert!(json.contains("\"anomalous\":true"));
        assert!(json.contains("PNG_WITH_JPEG_MARKER"));

        let json = serde_json::to_string(&Inspection::clean()).unwrap();
        assert!(!json.contains("kind"));
    }

    #[test]
    fn test_gate_decision_serialization() {
        let json = serde_json::to_string(&GateDecision::Redirect {
            location: "https://example.org/".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"decision":"redirect","location":"https://example.org/"}"#);
        assert!(GateDecision::Allow.is_allowed());
    }
}
