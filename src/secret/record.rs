//! Secret record and its state machine
//!
//! Secret states: ACTIVE → {REDEEMED | EXPIRED}
//!
//! REDEEMED is terminal and never becomes EXPIRED. EXPIRED records are
//! deleted by the eviction sweep or by a late redemption attempt.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity of whoever redeemed a secret (e.g. a user id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Redeemer(pub String);

impl Redeemer {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Redeemer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secret state, as observed at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecretState {
    /// Redeemable
    Active,
    /// Consumed exactly once
    Redeemed,
    /// Past its deadline without being redeemed
    Expired,
}

impl SecretState {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: SecretState) -> bool {
        matches!(
            (self, target),
            (SecretState::Active, SecretState::Redeemed) | (SecretState::Active, SecretState::Expired)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SecretState::Active)
    }
}

/// Result of a redemption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemOutcome {
    Success,
    AlreadyRedeemed,
    Expired,
    NotFound,
}

/// Errors for secret state operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretStateError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: SecretState, to: SecretState },
}

/// Persisted secret record, keyed by `value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    /// The secret itself; globally unique
    pub value: String,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_by: Option<Redeemer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl SecretRecord {
    /// Create a new ACTIVE record expiring `ttl` after `now`
    ///
    /// A deadline past the representable range is clamped to the maximum.
    pub fn new(value: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            redeemed_by: None,
            redeemed_at: None,
        }
    }

    /// Strictly past the deadline; the deadline instant itself is still live.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_redeemed(&self) -> bool {
        self.redeemed_by.is_some()
    }

    /// State at `now`
    pub fn state_at(&self, now: DateTime<Utc>) -> SecretState {
        if self.is_redeemed() {
            SecretState::Redeemed
        } else if self.is_past_deadline(now) {
            SecretState::Expired
        } else {
            SecretState::Active
        }
    }

    /// ACTIVE → REDEEMED
    pub fn redeem(&mut self, by: Redeemer, now: DateTime<Utc>) -> Result<(), SecretStateError> {
        let from = self.state_at(now);
        if !from.can_transition_to(SecretState::Redeemed) {
            return Err(SecretStateError::InvalidTransition {
                from,
                to: SecretState::Redeemed,
            });
        }
        self.redeemed_by = Some(by);
        self.redeemed_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn record() -> SecretRecord {
        SecretRecord::new("CTF{abc}".to_string(), t0(), Duration::seconds(120))
    }

    #[test]
    fn test_new_record_is_active() {
        let r = record();
        assert_eq!(r.expires_at, t0() + Duration::seconds(120));
        assert_eq!(r.state_at(t0()), SecretState::Active);
        assert!(!r.is_redeemed());
    }

    #[test]
    fn test_deadline_boundary_is_inclusive() {
        let r = record();
        assert_eq!(r.state_at(r.expires_at), SecretState::Active);
        assert_eq!(
            r.state_at(r.expires_at + Duration::milliseconds(1)),
            SecretState::Expired
        );
    }

    #[test]
    fn test_redeem_once() {
        let mut r = record();
        r.redeem(Redeemer::new("alice"), t0()).unwrap();
        assert_eq!(r.redeemed_by, Some(Redeemer::new("alice")));
        assert_eq!(r.redeemed_at, Some(t0()));

        let err = r.redeem(Redeemer::new("bob"), t0()).unwrap_err();
        assert_eq!(
            err,
            SecretStateError::InvalidTransition {
                from: SecretState::Redeemed,
                to: SecretState::Redeemed
            }
        );
        assert_eq!(r.redeemed_by, Some(Redeemer::new("alice")));
    }

    #[test]
    fn test_redeemed_never_expires() {
        let mut r = record();
        r.redeem(Redeemer::new("alice"), t0()).unwrap();
        assert_eq!(
            r.state_at(t0() + Duration::days(365)),
            SecretState::Redeemed
        );
    }

    #[test]
    fn test_expired_cannot_be_redeemed() {
        let mut r = record();
        let late = t0() + Duration::seconds(121);
        assert!(r.redeem(Redeemer::new("alice"), late).is_err());
        assert!(r.redeemed_by.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SecretState::Active.is_terminal());
        assert!(SecretState::Redeemed.is_terminal());
        assert!(SecretState::Expired.is_terminal());
        assert!(!SecretState::Redeemed.can_transition_to(SecretState::Expired));
        assert!(!SecretState::Expired.can_transition_to(SecretState::Redeemed));
    }

    #[test]
    fn test_record_layout() {
        let mut r = record();
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("redeemed_by").is_none());

        r.redeem(Redeemer::new("alice"), t0()).unwrap();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["value"], "CTF{abc}");
        assert_eq!(json["redeemed_by"], "alice");
        assert!(json.get("created_at").is_some());
        assert!(json.get("expires_at").is_some());
        assert!(json.get("redeemed_at").is_some());
    }
}
