//! Cheap, pure classifiers used at the service boundary.
//!
//! - [`classify`] / [`inspect`]: flags uploads whose leading bytes claim one
//!   image format while carrying a marker of another (a polyglot). This is a
//!   trigger heuristic, not a validator.
//! - [`AccessGate`]: allow-list check on the caller-declared host.
//! - [`extract_token`]: pulls a flag token out of free-form text.

mod config;
mod parser;
mod result;
pub mod samples;

pub use config::GateConfig;
pub use parser::{extract_token, extract_tokens, TokenParser, DEFAULT_PREFIX};
pub use result::{AnomalyKind, GateDecision, Inspection};

/// Canonical PNG file signature.
pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// JPEG start-of-image marker.
pub const JPEG_SOI: &[u8] = b"\xff\xd8";

/// Token that only a JPEG (JFIF APP0 segment) should contain.
const JPEG_ONLY_TOKEN: &[u8] = b"JFIF";

/// Token that only a PNG should contain.
const PNG_ONLY_TOKEN: &[u8] = b"PNG";

/// Buffers shorter than this are never anomalous.
pub const MIN_INSPECT_LEN: usize = 10;

/// Leading window (in bytes) searched for the foreign-format token.
pub const INSPECT_WINDOW: usize = 100;

/// Returns true if the upload looks format-mismatched.
pub fn classify(bytes: &[u8]) -> bool {
    inspect(bytes).anomalous
}

/// Classify an upload and report which mismatch was seen.
pub fn inspect(bytes: &[u8]) -> Inspection {
    if bytes.len() < MIN_INSPECT_LEN {
        return Inspection::clean();
    }

    let window = &bytes[..bytes.len().min(INSPECT_WINDOW)];

    if bytes.starts_with(PNG_SIGNATURE) && contains(window, JPEG_ONLY_TOKEN) {
        return Inspection::anomalous(AnomalyKind::PngWithJpegMarker);
    }

    if bytes.starts_with(JPEG_SOI) && contains(window, PNG_ONLY_TOKEN) {
        return Inspection::anomalous(AnomalyKind::JpegWithPngMarker);
    }

    Inspection::clean()
}

/// Authorization check against a host allow-list.
///
/// Denial is never an error: callers get a [`GateDecision::Redirect`] to a
/// fixed target, so a caller cannot tell "forbidden" from "absent".
#[derive(Debug, Clone)]
pub struct AccessGate {
    config: GateConfig,
}

impl AccessGate {
    /// Create a gate from its configuration.
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// True iff the host header contains an allow-listed identifier.
    pub fn authorize(&self, host_header: &str) -> bool {
        let host = host_header.trim();
        if host.is_empty() {
            return false;
        }
        self.config
            .allowed_hosts
            .iter()
            .filter(|allowed| !allowed.is_empty())
            .any(|allowed| host.contains(allowed.as_str()))
    }

    /// Authorize and map the result to the handler-facing decision.
    pub fn decide(&self, host_header: &str) -> GateDecision {
        if self.authorize(host_header) {
            GateDecision::Allow
        } else {
            GateDecision::Redirect {
                location: self.config.redirect_target.clone(),
            }
        }
    }

    /// The configured redirect target.
    pub fn redirect_target(&self) -> &str {
        &self.config.redirect_target
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
