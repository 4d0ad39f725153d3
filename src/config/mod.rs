//! Service configuration (hidemenot.toml)
//!
//! Every key is optional; missing keys fall back to [`defaults`]. The file
//! is parsed with `toml` and checked by [`ServiceConfig::validate`].

mod defaults;

pub use defaults::{
    DEFAULT_ARTIFACT_ROOT, DEFAULT_BASELINE_COLOR, DEFAULT_BASELINE_HEIGHT, DEFAULT_BASELINE_WIDTH,
    DEFAULT_LONG_TTL_SECONDS, DEFAULT_MAX_IDENTIFIER_ATTEMPTS, DEFAULT_SECRET_DB,
    DEFAULT_SECRET_TTL_SECONDS, DEFAULT_SHORT_TTL_SECONDS,
};

use chrono::Duration;
use hm_classifier::GateConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Error types for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Lifetime of a secret record (seconds)
    pub secret_ttl_seconds: u64,

    /// Lifetime of the log and flag artifacts (seconds)
    pub short_ttl_seconds: u64,

    /// Lifetime of the marked image artifact (seconds)
    /// Longer than the short TTL since the image is the discovery clue.
    pub long_ttl_seconds: u64,

    /// Host substrings allowed to read flag artifacts
    pub allowed_hosts: Vec<String>,

    /// Fixed redirect for denied flag requests
    pub redirect_target: String,

    /// Flag token prefix, e.g. "CTF" for `CTF{...}`
    pub flag_prefix: String,

    /// Bounded regeneration attempts on identifier collision
    pub max_identifier_attempts: u32,

    /// Root directory of the filesystem artifact store
    pub artifact_root: PathBuf,

    /// Path of the JSON secret store
    pub secret_db: PathBuf,

    /// Optional image file (PNG, BMP, PNM or JPEG) used as the baseline for marked images
    pub baseline_image: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let gate = GateConfig::default();
        Self {
            secret_ttl_seconds: DEFAULT_SECRET_TTL_SECONDS,
            short_ttl_seconds: DEFAULT_SHORT_TTL_SECONDS,
            long_ttl_seconds: DEFAULT_LONG_TTL_SECONDS,
            allowed_hosts: gate.allowed_hosts,
            redirect_target: gate.redirect_target,
            flag_prefix: hm_classifier::DEFAULT_PREFIX.to_string(),
            max_identifier_attempts: DEFAULT_MAX_IDENTIFIER_ATTEMPTS,
            artifact_root: PathBuf::from(DEFAULT_ARTIFACT_ROOT),
            secret_db: PathBuf::from(DEFAULT_SECRET_DB),
            baseline_image: None,
        }
    }
}

impl ServiceConfig {
    /// Load and parse config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse config from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "secret_ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.short_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "short_ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.long_ttl_seconds < self.short_ttl_seconds {
            return Err(ConfigError::ValidationError(format!(
                "long_ttl_seconds ({}) must be at least short_ttl_seconds ({})",
                self.long_ttl_seconds, self.short_ttl_seconds
            )));
        }
        // Durations are handled as chrono::Duration milliseconds.
        let max_seconds = i64::MAX as u64 / 1000;
        for (key, value) in [
            ("secret_ttl_seconds", self.secret_ttl_seconds),
            ("long_ttl_seconds", self.long_ttl_seconds),
        ] {
            if value > max_seconds {
                return Err(ConfigError::ValidationError(format!(
                    "{} is out of range: {}",
                    key, value
                )));
            }
        }
        if self.allowed_hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "allowed_hosts must contain at least one non-empty host".to_string(),
            ));
        }
        if self.redirect_target.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "redirect_target must not be empty".to_string(),
            ));
        }
        if self.flag_prefix.is_empty()
            || !self.flag_prefix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::ValidationError(format!(
                "flag_prefix must be ASCII alphanumeric, got '{}'",
                self.flag_prefix
            )));
        }
        if self.max_identifier_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_identifier_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Access gate settings
    pub fn gate(&self) -> GateConfig {
        GateConfig {
            allowed_hosts: self.allowed_hosts.clone(),
            redirect_target: self.redirect_target.clone(),
        }
    }

    pub fn secret_ttl(&self) -> Duration {
        seconds(self.secret_ttl_seconds)
    }

    pub fn short_ttl(&self) -> Duration {
        seconds(self.short_ttl_seconds)
    }

    pub fn long_ttl(&self) -> Duration {
        seconds(self.long_ttl_seconds)
    }
}

fn seconds(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}
