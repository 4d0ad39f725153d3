//! Built-in defaults
//!
//! Hardcoded defaults for all configuration values.

/// Secret record lifetime (2 minutes)
pub const DEFAULT_SECRET_TTL_SECONDS: u64 = 120;

/// Log and flag artifact lifetime (2 minutes)
pub const DEFAULT_SHORT_TTL_SECONDS: u64 = 120;

/// Marked image artifact lifetime (4 minutes)
pub const DEFAULT_LONG_TTL_SECONDS: u64 = 240;

/// Identifier regeneration attempts before trigger fails
pub const DEFAULT_MAX_IDENTIFIER_ATTEMPTS: u32 = 8;

/// Filesystem artifact store root
pub const DEFAULT_ARTIFACT_ROOT: &str = "artifacts";

/// JSON secret store path
pub const DEFAULT_SECRET_DB: &str = "secrets.json";

/// Baseline image used when no baseline file is configured
pub const DEFAULT_BASELINE_WIDTH: u32 = 400;
pub const DEFAULT_BASELINE_HEIGHT: u32 = 300;

/// Light blue
pub const DEFAULT_BASELINE_COLOR: [u8; 3] = [173, 216, 230];
