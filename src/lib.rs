//! hidemenot - crash-triggered secret minting for a steganography puzzle
//!
//! A polyglot upload makes the service "crash": it mints a one-time secret,
//! writes a diagnostic log, a host-gated flag file and a marked image whose
//! alternate bit plane points at the log, and lets all of them expire on
//! independent timers. The secret can be redeemed exactly once.

pub mod artifact;
pub mod clock;
pub mod config;
pub mod container;
pub mod handlers;
pub mod lifecycle;
pub mod schedule;
pub mod secret;

pub use artifact::{
    ArtifactHandle, ArtifactKind, ArtifactLookup, ArtifactMeta, ArtifactStore, FsArtifactStore,
    MemoryArtifactStore,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ServiceConfig};
pub use handlers::{DecodeResponse, RedeemResponse, RetrievalResponse, Service, UploadResponse};
pub use lifecycle::{
    EvictionResult, IdentifierSource, LifecyclePolicy, RandomIdentifiers, SecretLifecycleManager,
    SweepReport, TriggerError, TriggerReceipt,
};
pub use schedule::{EvictionScheduler, EvictionTarget, ManualScheduler, TokioScheduler};
pub use secret::{
    JsonSecretStore, MemorySecretStore, RedeemOutcome, Redeemer, SecretRecord, SecretStore,
};
