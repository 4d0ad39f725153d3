//! Flag token extraction from free-form submitted text.
//!
//! Token grammar: `<PREFIX>{<body>}` where `<PREFIX>` is ASCII alphanumeric
//! and `<body>` is one or more of `[A-Za-z0-9_-]`.

use regex_lite::Regex;

/// Token prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "CTF";

/// Compiled token matcher for one prefix. Build once, reuse per request.
#[derive(Debug, Clone)]
pub struct TokenParser {
    prefix: String,
    re: Regex,
}

impl TokenParser {
    /// None unless `prefix` is non-empty ASCII alphanumeric.
    pub fn new(prefix: &str) -> Option<Self> {
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        let re = Regex::new(&format!(r"{}\{{[A-Za-z0-9_\-]+\}}", prefix)).ok()?;
        Some(Self {
            prefix: prefix.to_string(),
            re,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// First well-formed token in `text`.
    pub fn extract(&self, text: &str) -> Option<String> {
        self.re.find(text).map(|m| m.as_str().to_string())
    }

    /// Every well-formed token in `text`, in order of appearance.
    pub fn extract_all(&self, text: &str) -> Vec<String> {
        self.re
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// Extract the first well-formed token from `text`.
///
/// Compiles the pattern on each call; hold a [`TokenParser`] on hot paths.
pub fn extract_token(text: &str, prefix: &str) -> Option<String> {
    TokenParser::new(prefix)?.extract(text)
}

/// Extract every well-formed token from `text`, in order of appearance.
pub fn extract_tokens(text: &str, prefix: &str) -> Vec<String> {
    TokenParser::new(prefix)
        .map(|p| p.extract_all(text))
        .unwrap_or_default()
}
