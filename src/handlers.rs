//! Request-level operations.
//!
//! [`Service`] is what a web layer (or the CLI) calls. It owns the routing
//! decisions: which uploads trigger a crash, which artifact classes sit
//! behind the access gate, and how free-form redemption text is reduced to a
//! token. Everything stateful is delegated to the [`SecretLifecycleManager`].

use hm_classifier::{AccessGate, AnomalyKind, GateDecision, TokenParser};
use hm_stego::{BitIndex, Image, ImageDecodeError};
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactHandle, ArtifactKind, ArtifactLookup};
use crate::config::ServiceConfig;
use crate::container::{self, ContainerError};
use crate::lifecycle::{SecretLifecycleManager, TriggerError};
use crate::secret::{RedeemOutcome, Redeemer};

/// Result of an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadResponse {
    /// Ordinary upload; the caller continues with normal processing
    Accepted,
    /// Simulated server crash
    Crashed {
        anomaly: AnomalyKind,
        artifacts: Vec<ArtifactHandle>,
    },
}

/// Result of an artifact fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalResponse {
    Content(Vec<u8>),
    /// 404 equivalent
    Gone,
    /// Gate denial; the lookup never ran
    Redirect { location: String },
}

/// Result of a redemption request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RedeemResponse {
    /// The submitted text held no well-formed token
    NoToken,
    Redeemed {
        token: String,
        outcome: RedeemOutcome,
    },
}

/// Result of a decode request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecodeResponse {
    Message { text: String },
    NoMessage,
}

impl DecodeResponse {
    fn from_text(text: String) -> Self {
        if text.trim().is_empty() {
            DecodeResponse::NoMessage
        } else {
            DecodeResponse::Message { text }
        }
    }
}

/// The service boundary
#[derive(Debug, Clone)]
pub struct Service {
    manager: SecretLifecycleManager,
    gate: AccessGate,
    /// None for a prefix that can never form a token
    tokens: Option<TokenParser>,
}

impl Service {
    pub fn new(manager: SecretLifecycleManager, config: &ServiceConfig) -> Self {
        Self {
            manager,
            gate: AccessGate::new(config.gate()),
            tokens: TokenParser::new(&config.flag_prefix),
        }
    }

    pub fn manager(&self) -> &SecretLifecycleManager {
        &self.manager
    }

    /// Inspect an upload and trigger the crash flow on a polyglot.
    pub fn handle_upload(&self, bytes: &[u8]) -> Result<UploadResponse, TriggerError> {
        let inspection = hm_classifier::inspect(bytes);
        let Some(anomaly) = inspection.kind else {
            return Ok(UploadResponse::Accepted);
        };

        tracing::info!(anomaly = anomaly.to_code(), size = bytes.len(), "polyglot upload");
        let receipt = self.manager.trigger()?;
        Ok(UploadResponse::Crashed {
            anomaly,
            artifacts: receipt.artifacts,
        })
    }

    /// Fetch an artifact on behalf of a caller presenting `host`.
    ///
    /// For gated classes the gate is consulted first and a denial short-cuts
    /// to the redirect, whether or not the artifact exists.
    pub fn fetch_artifact(&self, name: &str, host: &str) -> RetrievalResponse {
        let gated = ArtifactKind::for_name(name).is_some_and(|k| k.is_gated());
        if gated {
            if let GateDecision::Redirect { location } = self.gate.decide(host) {
                tracing::info!(host = %host, "gate denied flag request");
                return RetrievalResponse::Redirect { location };
            }
        }

        match self.manager.lookup_artifact(name) {
            ArtifactLookup::Content(bytes) => RetrievalResponse::Content(bytes),
            ArtifactLookup::Gone => RetrievalResponse::Gone,
        }
    }

    /// Extract a token from free-form text and redeem it.
    pub fn redeem(&self, text: &str, redeemer: Redeemer) -> RedeemResponse {
        match self.tokens.as_ref().and_then(|p| p.extract(text)) {
            Some(token) => {
                let outcome = self.manager.redeem(&token, redeemer);
                RedeemResponse::Redeemed { token, outcome }
            }
            None => RedeemResponse::NoToken,
        }
    }

    /// Decode the alternate plane of the most recent marked image.
    pub fn decode_alternative(&self) -> Result<DecodeResponse, ContainerError> {
        let Some(handle) = self.manager.latest_marked_image() else {
            return Ok(DecodeResponse::NoMessage);
        };
        let ArtifactLookup::Content(bytes) = self.manager.lookup_artifact(&handle.name) else {
            return Ok(DecodeResponse::NoMessage);
        };
        let image = container::read_image(&bytes)?;
        let text = hm_stego::decode(&image, BitIndex::Alternate)?;
        Ok(DecodeResponse::from_text(text))
    }

    /// Path of the latest marked image, revealed only after a crash and only
    /// to callers arriving from the crash page.
    pub fn crash_hint(&self, from_crash_flow: bool) -> Option<String> {
        if !from_crash_flow || !self.manager.crash_occurred() {
            return None;
        }
        self.manager
            .latest_marked_image()
            .map(|h| format!("/{}", h.name))
    }
}

/// Hide `message` on the standard plane.
pub fn encode_message(image: &Image, message: &str) -> Image {
    hm_stego::encode(image, message, BitIndex::Standard)
}

/// Read the standard plane.
pub fn decode_message(image: &Image) -> Result<DecodeResponse, ImageDecodeError> {
    hm_stego::decode(image, BitIndex::Standard).map(DecodeResponse::from_text)
}
