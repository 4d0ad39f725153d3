//! Access gate configuration.

use serde::{Deserialize, Serialize};

/// Hosts accepted by the gate when nothing else is configured.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["127.0.0.1", "localhost"];

/// Fixed, unrelated redirect target for denied requests.
pub const DEFAULT_REDIRECT_TARGET: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Configuration for the [`AccessGate`](crate::AccessGate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Substrings a host header must contain to be allowed.
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Where denied callers are sent.
    #[serde(default = "default_redirect_target")]
    pub redirect_target: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
            redirect_target: default_redirect_target(),
        }
    }
}

fn default_allowed_hosts() -> Vec<String> {
    DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect()
}

fn default_redirect_target() -> String {
    DEFAULT_REDIRECT_TARGET.to_string()
}
