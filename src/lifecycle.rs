//! Secret lifecycle manager.
//!
//! One manager owns a registry of secret records and a ledger of the
//! artifacts it created. It is the only writer of both:
//!
//! - [`SecretLifecycleManager::trigger`] inserts a record and three artifacts
//! - [`SecretLifecycleManager::redeem`] flips a record ACTIVE → REDEEMED
//! - eviction (scheduled jobs, [`SecretLifecycleManager::sweep`], lazy expiry
//!   on lookup) deletes whatever is past its deadline
//!
//! Registry and ledger mutations happen under short in-memory locks; store
//! I/O always happens after the lock is released. Stores are write-through
//! and may lag behind or disagree with the in-memory view; such drift is
//! logged and repaired by the sweep, never surfaced as an error.

use chrono::{DateTime, Duration, Utc};
use hm_stego::{BitIndex, Image};
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use thiserror::Error;

use crate::artifact::{
    ArtifactHandle, ArtifactKind, ArtifactLookup, ArtifactMeta, ArtifactStore, ArtifactStoreError,
    FLAG_DIR,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{
    ServiceConfig, DEFAULT_BASELINE_COLOR, DEFAULT_BASELINE_HEIGHT, DEFAULT_BASELINE_WIDTH,
};
use crate::container;
use crate::schedule::{EvictionJob, EvictionScheduler, EvictionTarget, ManualScheduler};
use crate::secret::{
    RedeemOutcome, Redeemer, SecretRecord, SecretState, SecretStore, SecretStoreError,
};

/// Errors that abort a trigger
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("could not find a free identifier after {attempts} attempts")]
    IdentifierExhausted { attempts: u32 },
}

/// Errors while loading existing state at construction
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to load artifacts: {0}")]
    Artifacts(#[from] ArtifactStoreError),

    #[error("failed to load secrets: {0}")]
    Secrets(#[from] SecretStoreError),
}

/// Lifetimes and minting rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Secret record lifetime
    pub secret_ttl: Duration,
    /// Log and flag artifact lifetime
    pub short_ttl: Duration,
    /// Marked image lifetime
    pub long_ttl: Duration,
    /// Token prefix, the secret is `<prefix>{<identifier>}`
    pub flag_prefix: String,
    pub max_identifier_attempts: u32,
}

impl From<&ServiceConfig> for LifecyclePolicy {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            secret_ttl: config.secret_ttl(),
            short_ttl: config.short_ttl(),
            long_ttl: config.long_ttl(),
            flag_prefix: config.flag_prefix.clone(),
            max_identifier_attempts: config.max_identifier_attempts,
        }
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

/// Source of trigger identifiers.
pub trait IdentifierSource: Send + Sync {
    fn generate(&self, now: DateTime<Utc>) -> String;
}

/// `YYYY-MM-DD_HH-MM-SS_xxxxxx`: wall-clock second plus 24 random bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdentifiers;

impl IdentifierSource for RandomIdentifiers {
    fn generate(&self, now: DateTime<Utc>) -> String {
        let suffix: u32 = rand::thread_rng().gen_range(0..=0x00ff_ffff);
        format!("{}_{:06x}", now.format("%Y-%m-%d_%H-%M-%S"), suffix)
    }
}

/// What a trigger produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerReceipt {
    pub identifier: String,
    /// The minted secret value
    pub secret: String,
    /// Whether the secret record reached the secret store
    pub secret_persisted: bool,
    /// Artifacts actually written, in log, flag, image order
    pub artifacts: Vec<ArtifactHandle>,
}

impl TriggerReceipt {
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactHandle> {
        self.artifacts.iter().find(|h| h.kind == kind)
    }
}

/// Outcome of a single eviction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionResult {
    /// Removed by this call
    Evicted,
    /// Still live at the current time
    NotDue,
    /// Redeemed secrets are kept
    Retained,
    /// Nothing known by that name (never created or already gone)
    Absent,
    /// Dropped from memory but the store refused the delete; the sweep retries
    Failed,
}

/// Totals from one [`SecretLifecycleManager::sweep`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub artifacts_evicted: usize,
    pub secrets_evicted: usize,
    /// Expired store entries the manager had no in-memory record of
    pub orphans_removed: usize,
    pub errors: Vec<String>,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.artifacts_evicted + self.secrets_evicted + self.orphans_removed
    }
}

/// Builder for [`SecretLifecycleManager`]
pub struct LifecycleBuilder {
    artifacts: Arc<dyn ArtifactStore>,
    secrets: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn EvictionScheduler>,
    identifiers: Arc<dyn IdentifierSource>,
    policy: LifecyclePolicy,
    baseline: Option<Image>,
}

impl LifecycleBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn EvictionScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn identifiers(mut self, identifiers: Arc<dyn IdentifierSource>) -> Self {
        self.identifiers = identifiers;
        self
    }

    pub fn policy(mut self, policy: LifecyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cover image for marked images. Defaults to a solid light-blue 400x300.
    pub fn baseline(mut self, image: Image) -> Self {
        self.baseline = Some(image);
        self
    }

    /// Build the manager and load whatever the stores already hold.
    ///
    /// Existing artifacts and unredeemed secrets are re-armed for eviction;
    /// anything already past its deadline becomes due immediately.
    pub fn open(self) -> Result<SecretLifecycleManager, OpenError> {
        let baseline = self.baseline.unwrap_or_else(|| {
            Image::filled(
                DEFAULT_BASELINE_WIDTH,
                DEFAULT_BASELINE_HEIGHT,
                DEFAULT_BASELINE_COLOR,
            )
        });
        let inner = Arc::new(Inner {
            artifacts: self.artifacts,
            secrets: self.secrets,
            clock: self.clock,
            scheduler: self.scheduler,
            identifiers: self.identifiers,
            policy: self.policy,
            baseline,
            registry: Mutex::new(HashMap::new()),
            ledger: Mutex::new(BTreeMap::new()),
            minting: Mutex::new(HashSet::new()),
            crashed: AtomicBool::new(false),
        });
        inner.hydrate()?;
        Ok(SecretLifecycleManager { inner })
    }
}

struct Inner {
    artifacts: Arc<dyn ArtifactStore>,
    secrets: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn EvictionScheduler>,
    identifiers: Arc<dyn IdentifierSource>,
    policy: LifecyclePolicy,
    baseline: Image,
    /// Secret records by value
    registry: Mutex<HashMap<String, SecretRecord>>,
    /// Artifacts this manager created, by name
    ledger: Mutex<BTreeMap<String, ArtifactMeta>>,
    /// Identifiers claimed by triggers still in progress
    minting: Mutex<HashSet<String>>,
    crashed: AtomicBool,
}

/// Owns secret records and their artifacts from trigger to eviction.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SecretLifecycleManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SecretLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretLifecycleManager")
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl SecretLifecycleManager {
    /// Start building a manager over the given stores.
    pub fn builder(
        artifacts: Arc<dyn ArtifactStore>,
        secrets: Arc<dyn SecretStore>,
    ) -> LifecycleBuilder {
        LifecycleBuilder {
            artifacts,
            secrets,
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(ManualScheduler::new()),
            identifiers: Arc::new(RandomIdentifiers),
            policy: LifecyclePolicy::default(),
            baseline: None,
        }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.inner.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Mint a secret and its artifacts, then arm their eviction.
    pub fn trigger(&self) -> Result<TriggerReceipt, TriggerError> {
        self.inner.trigger()
    }

    /// Consume a secret at most once.
    pub fn redeem(&self, value: &str, by: Redeemer) -> RedeemOutcome {
        self.inner.redeem(value, by)
    }

    /// Content of a live artifact, or `Gone`.
    ///
    /// An artifact past its deadline is evicted on the spot.
    pub fn lookup_artifact(&self, name: &str) -> ArtifactLookup {
        self.inner.lookup_artifact(name)
    }

    /// Snapshot of a secret record
    pub fn lookup_secret(&self, value: &str) -> Option<SecretRecord> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(value)
            .cloned()
    }

    /// Evict one artifact if it is past its deadline.
    pub fn evict_artifact(&self, name: &str) -> EvictionResult {
        self.inner.evict_artifact(name)
    }

    /// Evict one secret record if it is past its deadline and unredeemed.
    pub fn evict_secret(&self, value: &str) -> EvictionResult {
        self.inner.evict_secret(value)
    }

    /// Evict everything past its deadline, including expired store entries
    /// the manager does not track.
    pub fn sweep(&self) -> SweepReport {
        self.inner.sweep()
    }

    /// Most recent live marked image
    pub fn latest_marked_image(&self) -> Option<ArtifactHandle> {
        let now = self.inner.clock.now();
        self.inner
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|m| m.kind == ArtifactKind::MarkedImage && m.is_live_at(now))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)))
            .map(ArtifactMeta::handle)
    }

    /// Whether a trigger has happened since this manager (or a predecessor
    /// sharing its stores) started.
    pub fn crash_occurred(&self) -> bool {
        self.inner.crashed.load(Ordering::SeqCst)
    }

    /// Live artifacts known to the manager
    pub fn artifacts(&self) -> Vec<ArtifactHandle> {
        let now = self.inner.clock.now();
        self.inner
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|m| m.is_live_at(now))
            .map(ArtifactMeta::handle)
            .collect()
    }
}

impl Inner {
    fn hydrate(self: &Arc<Self>) -> Result<(), OpenError> {
        let now = self.clock.now();
        let metas = self.artifacts.list()?;
        let records = self.secrets.load_all()?;

        for record in records {
            if !record.is_redeemed() {
                self.arm(record.expires_at, EvictionTarget::Secret(record.value.clone()));
            }
            self.registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(record.value.clone(), record);
        }

        for meta in metas {
            if meta.kind == ArtifactKind::MarkedImage && meta.is_live_at(now) {
                self.crashed.store(true, Ordering::SeqCst);
            }
            if meta.kind == ArtifactKind::Flag {
                let value = self.secret_for_flag(&meta.name);
                let known = value.as_ref().is_some_and(|v| {
                    self.registry
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .contains_key(v)
                });
                if !known {
                    tracing::warn!(artifact = %meta.name, "flag artifact has no secret record");
                }
            }
            self.arm(meta.expires_at, EvictionTarget::Artifact(meta.name.clone()));
            self.ledger
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(meta.name.clone(), meta);
        }

        tracing::debug!(
            artifacts = self.ledger.lock().unwrap_or_else(PoisonError::into_inner).len(),
            secrets = self.registry.lock().unwrap_or_else(PoisonError::into_inner).len(),
            "lifecycle state loaded"
        );
        Ok(())
    }

    fn secret_value(&self, identifier: &str) -> String {
        format!("{}{{{}}}", self.policy.flag_prefix, identifier)
    }

    fn secret_for_flag(&self, name: &str) -> Option<String> {
        let id = name
            .strip_prefix(FLAG_DIR)?
            .strip_prefix('/')?
            .strip_suffix(".txt")?;
        Some(self.secret_value(id))
    }

    fn arm(self: &Arc<Self>, deadline: DateTime<Utc>, target: EvictionTarget) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let key = target.clone();
        let job: EvictionJob = Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match &key {
                EvictionTarget::Artifact(name) => inner.evict_artifact(name),
                EvictionTarget::Secret(value) => inner.evict_secret(value),
            };
        });
        self.scheduler.schedule(deadline, target, job);
    }

    /// Claim a fresh identifier. The claim is released when the trigger ends.
    fn claim_identifier(&self, now: DateTime<Utc>) -> Result<String, TriggerError> {
        let attempts = self.policy.max_identifier_attempts;
        for attempt in 1..=attempts {
            let id = self.identifiers.generate(now);
            if !self
                .minting
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id.clone())
            {
                tracing::debug!(identifier = %id, attempt, "identifier in use by a concurrent trigger");
                continue;
            }
            if self.identifier_taken(&id) {
                tracing::debug!(identifier = %id, attempt, "identifier collision");
                self.release_identifier(&id);
                continue;
            }
            return Ok(id);
        }
        Err(TriggerError::IdentifierExhausted { attempts })
    }

    fn release_identifier(&self, id: &str) {
        self.minting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    fn identifier_taken(&self, id: &str) -> bool {
        let names = [
            ArtifactKind::Log.name_for(id),
            ArtifactKind::Flag.name_for(id),
            ArtifactKind::MarkedImage.name_for(id),
        ];
        {
            let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            if names.iter().any(|n| ledger.contains_key(n)) {
                return true;
            }
        }
        if self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&self.secret_value(id))
        {
            return true;
        }
        names.iter().any(|n| match self.artifacts.contains(n) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(artifact = %n, error = %e, "artifact store lookup failed");
                false
            }
        })
    }

    fn trigger(self: &Arc<Self>) -> Result<TriggerReceipt, TriggerError> {
        let now = self.clock.now();
        let id = self.claim_identifier(now)?;
        let value = self.secret_value(&id);

        let record = SecretRecord::new(value.clone(), now, self.policy.secret_ttl);
        let secret_persisted = match self.secrets.insert(&record) {
            Ok(()) => {
                self.registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(value.clone(), record.clone());
                true
            }
            Err(e) => {
                tracing::warn!(identifier = %id, error = %e, "secret not persisted; continuing with artifacts");
                false
            }
        };

        let log_name = ArtifactKind::Log.name_for(&id);
        let flag_name = ArtifactKind::Flag.name_for(&id);
        let image_name = ArtifactKind::MarkedImage.name_for(&id);

        let log_text = format!(
            "[INFO] Server crash detected - polyglot file upload\n\
             [INFO] File saved to /{}\n\
             [TIMESTAMP] {}\n",
            flag_name,
            now.format("%Y-%m-%d %H:%M:%S")
        );
        let flag_text = format!("Congratulations! You found the final flag: {}\n", value);
        let hint = format!("[!] Crash logged at: /{}", log_name);
        let marked = hm_stego::encode(&self.baseline, &hint, BitIndex::Alternate);

        let mut planned = vec![
            (ArtifactKind::Log, log_name, log_text.into_bytes(), self.policy.short_ttl),
            (ArtifactKind::Flag, flag_name, flag_text.into_bytes(), self.policy.short_ttl),
        ];
        match container::write_png(&marked) {
            Ok(bytes) => planned.push((ArtifactKind::MarkedImage, image_name, bytes, self.policy.long_ttl)),
            Err(e) => {
                tracing::warn!(artifact = %image_name, error = %e, "marked image not encoded");
            }
        }

        let mut written = Vec::with_capacity(planned.len());
        for (kind, name, content, ttl) in planned {
            let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
            let meta = ArtifactMeta::new(name, kind, now, expires_at, &content);
            match self.artifacts.put(&meta, &content) {
                Ok(()) => written.push(meta),
                Err(e) => {
                    tracing::warn!(artifact = %meta.name, error = %e, "artifact not written");
                }
            }
        }

        {
            let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            for meta in &written {
                ledger.insert(meta.name.clone(), meta.clone());
            }
        }
        self.release_identifier(&id);
        self.crashed.store(true, Ordering::SeqCst);

        // Arm only after everything exists.
        for meta in &written {
            self.arm(meta.expires_at, EvictionTarget::Artifact(meta.name.clone()));
        }
        if secret_persisted {
            self.arm(record.expires_at, EvictionTarget::Secret(value.clone()));
        }

        let artifacts: Vec<ArtifactHandle> = written.iter().map(ArtifactMeta::handle).collect();
        tracing::info!(
            identifier = %id,
            artifacts = ?artifacts.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(),
            secret_persisted,
            "trigger complete"
        );

        Ok(TriggerReceipt {
            identifier: id,
            secret: value,
            secret_persisted,
            artifacts,
        })
    }

    /// Pull a record another manager sharing the store may have minted.
    ///
    /// Expired records are left to the sweep: one being evicted right now
    /// would otherwise be removed twice.
    fn adopt_secret(self: &Arc<Self>, value: &str) {
        let record = match self.secrets.get(value) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(secret = %value, error = %e, "secret store lookup failed");
                return;
            }
        };
        if record.state_at(self.clock.now()) == SecretState::Expired {
            return;
        }
        let unredeemed = !record.is_redeemed();
        let deadline = record.expires_at;
        let adopted = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            if registry.contains_key(value) {
                false
            } else {
                registry.insert(value.to_string(), record);
                true
            }
        };
        if adopted && unredeemed {
            self.arm(deadline, EvictionTarget::Secret(value.to_string()));
        }
    }

    fn redeem(self: &Arc<Self>, value: &str, by: Redeemer) -> RedeemOutcome {
        let known = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(value);
        if !known {
            self.adopt_secret(value);
        }

        let now = self.clock.now();
        let outcome = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            let state = registry.get(value).map(|r| r.state_at(now));
            match state {
                None => RedeemOutcome::NotFound,
                Some(SecretState::Redeemed) => RedeemOutcome::AlreadyRedeemed,
                Some(SecretState::Expired) => {
                    registry.remove(value);
                    RedeemOutcome::Expired
                }
                Some(SecretState::Active) => {
                    match registry.get_mut(value).map(|r| r.redeem(by.clone(), now)) {
                        Some(Ok(())) => RedeemOutcome::Success,
                        _ => RedeemOutcome::AlreadyRedeemed,
                    }
                }
            }
        };

        // The in-memory claim is provisional until the store agrees.
        let outcome = match outcome {
            RedeemOutcome::Success => self.confirm_redemption(value, &by, now),
            RedeemOutcome::Expired => {
                if let Err(e) = self.secrets.remove(value) {
                    tracing::warn!(secret = %value, error = %e, "expired secret not removed from store");
                }
                RedeemOutcome::Expired
            }
            other => other,
        };

        if matches!(outcome, RedeemOutcome::Success | RedeemOutcome::Expired) {
            self.scheduler.cancel(&EvictionTarget::Secret(value.to_string()));
        }
        tracing::info!(redeemer = %by, outcome = ?outcome, "redeem");
        outcome
    }

    /// Compare-and-set the redemption in the store, repairing the registry
    /// when another manager got there first.
    fn confirm_redemption(&self, value: &str, by: &Redeemer, now: DateTime<Utc>) -> RedeemOutcome {
        match self.secrets.mark_redeemed(value, by, now) {
            Ok(_) => RedeemOutcome::Success,
            Err(SecretStoreError::AlreadyRedeemed(_)) => {
                let stored = self.secrets.get(value).ok().flatten();
                let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
                match stored {
                    Some(record) => {
                        registry.insert(value.to_string(), record);
                    }
                    None => {
                        registry.remove(value);
                    }
                }
                tracing::info!(secret = %value, "redeemed through another manager");
                RedeemOutcome::AlreadyRedeemed
            }
            Err(SecretStoreError::Expired(_)) => {
                self.registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(value);
                if let Err(e) = self.secrets.remove(value) {
                    tracing::warn!(secret = %value, error = %e, "expired secret not removed from store");
                }
                RedeemOutcome::Expired
            }
            Err(SecretStoreError::NotFound(_)) => {
                self.registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(value);
                tracing::info!(secret = %value, "secret evicted through another manager");
                RedeemOutcome::NotFound
            }
            Err(e) => {
                // Store unreachable: the registry keeps the redemption.
                tracing::warn!(secret = %value, error = %e, "redemption state not persisted");
                RedeemOutcome::Success
            }
        }
    }

    fn lookup_artifact(&self, name: &str) -> ArtifactLookup {
        let now = self.clock.now();
        let meta = self
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();

        let Some(meta) = meta else {
            tracing::debug!(artifact = %name, "lookup of unknown artifact");
            return ArtifactLookup::Gone;
        };
        if !meta.is_live_at(now) {
            if self.evict_artifact(name) == EvictionResult::Evicted {
                self.scheduler.cancel(&EvictionTarget::Artifact(name.to_string()));
            }
            return ArtifactLookup::Gone;
        }

        match self.artifacts.get(name) {
            Ok(Some(content)) => ArtifactLookup::Content(content),
            Ok(None) => {
                tracing::warn!(artifact = %name, "artifact removed outside the manager");
                self.forget_artifact(name);
                ArtifactLookup::Gone
            }
            Err(e) => {
                tracing::warn!(artifact = %name, error = %e, "artifact read failed");
                ArtifactLookup::Gone
            }
        }
    }

    fn forget_artifact(&self, name: &str) {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        self.scheduler.cancel(&EvictionTarget::Artifact(name.to_string()));
    }

    fn evict_artifact(&self, name: &str) -> EvictionResult {
        let now = self.clock.now();
        {
            let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            match ledger.get(name).map(|m| m.is_live_at(now)) {
                None => {
                    tracing::debug!(artifact = %name, "eviction: already absent");
                    return EvictionResult::Absent;
                }
                Some(true) => {
                    tracing::debug!(artifact = %name, "eviction: not yet due");
                    return EvictionResult::NotDue;
                }
                Some(false) => {
                    ledger.remove(name);
                }
            }
        }

        match self.artifacts.remove(name) {
            Ok(true) => {
                tracing::debug!(artifact = %name, "evicted");
                EvictionResult::Evicted
            }
            Ok(false) => {
                tracing::debug!(artifact = %name, "evicted (content already removed)");
                EvictionResult::Evicted
            }
            Err(e) => {
                tracing::warn!(artifact = %name, error = %e, "artifact eviction failed");
                EvictionResult::Failed
            }
        }
    }

    fn evict_secret(&self, value: &str) -> EvictionResult {
        let now = self.clock.now();
        {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            match registry.get(value).map(|r| r.state_at(now)) {
                None => {
                    tracing::debug!(secret = %value, "eviction: already absent");
                    return EvictionResult::Absent;
                }
                Some(SecretState::Redeemed) => return EvictionResult::Retained,
                Some(SecretState::Active) => {
                    tracing::debug!(secret = %value, "eviction: not yet due");
                    return EvictionResult::NotDue;
                }
                Some(SecretState::Expired) => {
                    registry.remove(value);
                }
            }
        }

        match self.secrets.remove(value) {
            Ok(_) => {
                tracing::debug!(secret = %value, "evicted");
                EvictionResult::Evicted
            }
            Err(e) => {
                tracing::warn!(secret = %value, error = %e, "secret eviction failed");
                EvictionResult::Failed
            }
        }
    }

    fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let due_artifacts: Vec<String> = self
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|m| !m.is_live_at(now))
            .map(|m| m.name.clone())
            .collect();
        for name in due_artifacts {
            match self.evict_artifact(&name) {
                EvictionResult::Evicted => report.artifacts_evicted += 1,
                EvictionResult::Failed => report.errors.push(format!("artifact {}", name)),
                _ => {}
            }
            self.scheduler.cancel(&EvictionTarget::Artifact(name));
        }

        let due_secrets: Vec<String> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| !r.is_redeemed() && r.is_past_deadline(now))
            .map(|r| r.value.clone())
            .collect();
        for value in due_secrets {
            match self.evict_secret(&value) {
                EvictionResult::Evicted => report.secrets_evicted += 1,
                EvictionResult::Failed => report.errors.push(format!("secret {}", value)),
                _ => {}
            }
            self.scheduler.cancel(&EvictionTarget::Secret(value));
        }

        self.sweep_orphans(now, &mut report);

        if report.total() > 0 || !report.errors.is_empty() {
            tracing::info!(
                artifacts = report.artifacts_evicted,
                secrets = report.secrets_evicted,
                orphans = report.orphans_removed,
                errors = report.errors.len(),
                "sweep"
            );
        }
        report
    }

    /// Expired store entries the in-memory view does not know about
    fn sweep_orphans(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        match self.artifacts.list() {
            Ok(metas) => {
                for meta in metas.into_iter().filter(|m| !m.is_live_at(now)) {
                    let tracked = self
                        .ledger
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .contains_key(&meta.name);
                    if tracked {
                        continue;
                    }
                    match self.artifacts.remove(&meta.name) {
                        Ok(true) => report.orphans_removed += 1,
                        Ok(false) => {}
                        Err(e) => report.errors.push(format!("artifact {}: {}", meta.name, e)),
                    }
                }
            }
            Err(e) => report.errors.push(format!("artifact listing: {}", e)),
        }

        match self.secrets.load_all() {
            Ok(records) => {
                for record in records
                    .into_iter()
                    .filter(|r| !r.is_redeemed() && r.is_past_deadline(now))
                {
                    let tracked = self
                        .registry
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .contains_key(&record.value);
                    if tracked {
                        continue;
                    }
                    match self.secrets.remove(&record.value) {
                        Ok(true) => report.orphans_removed += 1,
                        Ok(false) => {}
                        Err(e) => report.errors.push(format!("secret {}: {}", record.value, e)),
                    }
                }
            }
            Err(e) => report.errors.push(format!("secret listing: {}", e)),
        }
    }
}
