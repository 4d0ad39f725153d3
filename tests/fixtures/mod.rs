//! Shared setup for integration tests
//!
//! - A manager over in-memory stores with a hand-driven clock and scheduler
//! - Scripted identifier sources for collision tests
//! - Secret stores that fail on demand

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use hidemenot::secret::SecretStoreError;
use hidemenot::{
    Clock, IdentifierSource, ManualClock, ManualScheduler, MemoryArtifactStore, MemorySecretStore,
    Redeemer, SecretLifecycleManager, SecretRecord, SecretStore,
};
use hm_stego::Image;

/// Fixed start time for every scenario
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Small baseline so marked images stay cheap
pub fn baseline() -> Image {
    Image::filled(64, 48, [173, 216, 230])
}

pub struct Harness {
    pub clock: ManualClock,
    pub scheduler: Arc<ManualScheduler>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub manager: SecretLifecycleManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(MemorySecretStore::new()), None)
    }

    pub fn with_parts(
        secrets: Arc<dyn SecretStore>,
        identifiers: Option<Arc<dyn IdentifierSource>>,
    ) -> Self {
        let clock = ManualClock::new(t0());
        let scheduler = Arc::new(ManualScheduler::new());
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let mut builder = SecretLifecycleManager::builder(artifacts.clone(), secrets.clone())
            .clock(Arc::new(clock.clone()))
            .scheduler(scheduler.clone())
            .baseline(baseline());
        if let Some(ids) = identifiers {
            builder = builder.identifiers(ids);
        }
        let manager = builder.open().unwrap();
        Self {
            clock,
            scheduler,
            artifacts,
            secrets,
            manager,
        }
    }

    /// Move the clock and run whatever fell due.
    pub fn advance(&self, by: chrono::Duration) -> usize {
        self.clock.advance(by);
        self.scheduler.run_due(self.clock.now())
    }
}

/// Hands out a fixed script of identifiers, then repeats the last one.
pub struct ScriptedIdentifiers {
    script: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedIdentifiers {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            script: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
            last: Mutex::new(ids.last().map(|s| s.to_string()).unwrap_or_default()),
        }
    }
}

impl IdentifierSource for ScriptedIdentifiers {
    fn generate(&self, _now: DateTime<Utc>) -> String {
        match self.script.lock().unwrap().pop_front() {
            Some(id) => id,
            None => self.last.lock().unwrap().clone(),
        }
    }
}

/// Secret store whose writes always fail
#[derive(Default)]
pub struct UnavailableSecretStore;

impl SecretStore for UnavailableSecretStore {
    fn insert(&self, _record: &SecretRecord) -> Result<(), SecretStoreError> {
        Err(SecretStoreError::Unavailable("database offline".to_string()))
    }

    fn mark_redeemed(
        &self,
        _value: &str,
        _by: &Redeemer,
        _at: DateTime<Utc>,
    ) -> Result<SecretRecord, SecretStoreError> {
        Err(SecretStoreError::Unavailable("database offline".to_string()))
    }

    fn remove(&self, _value: &str) -> Result<bool, SecretStoreError> {
        Err(SecretStoreError::Unavailable("database offline".to_string()))
    }

    fn get(&self, _value: &str) -> Result<Option<SecretRecord>, SecretStoreError> {
        Ok(None)
    }

    fn load_all(&self) -> Result<Vec<SecretRecord>, SecretStoreError> {
        Ok(Vec::new())
    }
}
