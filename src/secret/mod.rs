//! Secret records, their state machine, and persistence.

mod record;
mod store;

pub use record::{RedeemOutcome, Redeemer, SecretRecord, SecretState, SecretStateError};
pub use store::{
    JsonSecretStore, MemorySecretStore, SecretStore, SecretStoreError, SCHEMA_ID, SCHEMA_VERSION,
};
