//! Named byte artifacts with independent lifetimes.
//!
//! An artifact is owned by the lifecycle manager that created it; readers
//! never delete. Names are relative, `/`-separated paths whose first segment
//! tells the artifact class:
//!
//! - `logs/<id>.log`: diagnostic log
//! - `flags/<id>.txt`: flag text (host-gated on retrieval)
//! - `uploads/democrashed_<id>.png`: marked image

mod fs_store;
mod store;

pub use fs_store::FsArtifactStore;
pub use store::{ArtifactStore, ArtifactStoreError, MemoryArtifactStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Directory for log artifacts
pub const LOG_DIR: &str = "logs";

/// Directory for flag artifacts
pub const FLAG_DIR: &str = "flags";

/// Directory for marked image artifacts
pub const IMAGE_DIR: &str = "uploads";

/// Suffix reserved for metadata sidecars
pub const META_SUFFIX: &str = ".meta.json";

/// Maximum artifact name length
pub const MAX_NAME_LEN: usize = 255;

/// Artifact class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Log,
    Flag,
    MarkedImage,
}

impl ArtifactKind {
    /// Directory the class lives under
    pub fn dir(&self) -> &'static str {
        match self {
            ArtifactKind::Log => LOG_DIR,
            ArtifactKind::Flag => FLAG_DIR,
            ArtifactKind::MarkedImage => IMAGE_DIR,
        }
    }

    /// Class implied by a name, without consulting any store
    pub fn for_name(name: &str) -> Option<Self> {
        match name.split('/').next()? {
            LOG_DIR => Some(ArtifactKind::Log),
            FLAG_DIR => Some(ArtifactKind::Flag),
            IMAGE_DIR => Some(ArtifactKind::MarkedImage),
            _ => None,
        }
    }

    /// Whether retrieval must pass the access gate first
    pub fn is_gated(&self) -> bool {
        matches!(self, ArtifactKind::Flag)
    }

    /// Artifact name for a trigger identifier
    pub fn name_for(&self, identifier: &str) -> String {
        match self {
            ArtifactKind::Log => format!("{}/{}.log", LOG_DIR, identifier),
            ArtifactKind::Flag => format!("{}/{}.txt", FLAG_DIR, identifier),
            ArtifactKind::MarkedImage => format!("{}/democrashed_{}.png", IMAGE_DIR, identifier),
        }
    }
}

/// Artifact metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub name: String,

    pub kind: ArtifactKind,

    pub created_at: DateTime<Utc>,

    /// Last instant at which the artifact is retrievable
    pub expires_at: DateTime<Utc>,

    /// Content size in bytes
    pub size: u64,

    /// SHA-256 of the content (hex)
    pub sha256: String,
}

impl ArtifactMeta {
    pub fn new(
        name: String,
        kind: ArtifactKind,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        content: &[u8],
    ) -> Self {
        Self {
            name,
            kind,
            created_at,
            expires_at,
            size: content.len() as u64,
            sha256: compute_sha256(content),
        }
    }

    /// Live while `now <= expires_at`
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }

    pub fn handle(&self) -> ArtifactHandle {
        ArtifactHandle {
            name: self.name.clone(),
            kind: self.kind,
            expires_at: self.expires_at,
        }
    }
}

/// What callers get back for each created artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub name: String,
    pub kind: ArtifactKind,
    pub expires_at: DateTime<Utc>,
}

/// Result of looking up an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLookup {
    Content(Vec<u8>),
    /// Never created, already evicted, or past its deadline
    Gone,
}

impl ArtifactLookup {
    pub fn is_gone(&self) -> bool {
        matches!(self, ArtifactLookup::Gone)
    }
}

/// Check that a name is a safe relative path.
pub fn validate_name(name: &str) -> Result<(), ArtifactStoreError> {
    let invalid = |reason: &str| {
        Err(ArtifactStoreError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return invalid("length must be 1-255");
    }
    if name.ends_with(META_SUFFIX) {
        return invalid("reserved suffix");
    }
    for segment in name.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return invalid("empty or relative path segment");
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return invalid("characters must be [A-Za-z0-9._-]");
        }
    }
    Ok(())
}

/// Compute SHA-256 of bytes and return hex string
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
