//! Artifact storage port.

use std::collections::BTreeMap;
use std::io;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use super::{validate_name, ArtifactMeta};

/// Errors from artifact store operations.
#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid artifact name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("content SHA-256 mismatch for {name}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for named byte artifacts.
///
/// Removal is idempotent: removing an absent artifact is `Ok(false)`.
pub trait ArtifactStore: Send + Sync {
    fn put(&self, meta: &ArtifactMeta, content: &[u8]) -> Result<(), ArtifactStoreError>;

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, ArtifactStoreError>;

    fn contains(&self, name: &str) -> Result<bool, ArtifactStoreError>;

    fn remove(&self, name: &str) -> Result<bool, ArtifactStoreError>;

    fn list(&self) -> Result<Vec<ArtifactMeta>, ArtifactStoreError>;
}

/// In-process artifact store.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: RwLock<BTreeMap<String, (ArtifactMeta, Vec<u8>)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, meta: &ArtifactMeta, content: &[u8]) -> Result<(), ArtifactStoreError> {
        validate_name(&meta.name)?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(meta.name.clone(), (meta.clone(), content.to_vec()));
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, ArtifactStoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|(_, content)| content.clone()))
    }

    fn contains(&self, name: &str) -> Result<bool, ArtifactStoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name))
    }

    fn remove(&self, name: &str) -> Result<bool, ArtifactStoreError> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some())
    }

    fn list(&self) -> Result<Vec<ArtifactMeta>, ArtifactStoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|(meta, _)| meta.clone())
            .collect())
    }
}
