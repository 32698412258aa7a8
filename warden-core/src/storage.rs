//! Domain records shared by services and storage backends.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::hash_token,
    fingerprint::Fingerprint,
    id::{generate_prefixed_id, validate_prefixed_id},
};

/// A unique, stable identifier for an authenticated identity.
///
/// Issued by the credential verifier; opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: &str) -> Self {
        IdentityId(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for IdentityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a device session, e.g. `ses_...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: &str) -> Self {
        SessionId(id.to_string())
    }

    pub fn new_random() -> Self {
        SessionId(generate_prefixed_id("ses"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, "ses")
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity a credential verifier vouches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub id: IdentityId,
    /// Where verification codes and alerts are delivered.
    pub email: String,
}

impl VerifiedIdentity {
    pub fn new(id: impl Into<IdentityId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Why a login attempt was recorded as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    InvalidCredentials,
    Other(String),
}

impl FailureReason {
    pub fn as_str(&self) -> &str {
        match self {
            FailureReason::InvalidCredentials => "invalid_credentials",
            FailureReason::Other(reason) => reason,
        }
    }
}

impl From<&str> for FailureReason {
    fn from(s: &str) -> Self {
        match s {
            "invalid_credentials" => FailureReason::InvalidCredentials,
            other => FailureReason::Other(other.to_string()),
        }
    }
}

/// One row of the append-only attempt ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub id: i64,
    pub identifier: String,
    pub reason: FailureReason,
    pub attempted_at: DateTime<Utc>,
}

/// Windowed aggregate over the attempt ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptStats {
    pub count: u32,
    pub latest_at: Option<DateTime<Utc>>,
}

/// A time-bounded denial of authentication for an identifier.
///
/// Never deleted. It becomes inactive when `unlock_at` passes or when it is
/// manually unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockout {
    pub id: String,
    pub identifier: String,
    pub reason: String,
    pub failed_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub unlock_at: DateTime<Utc>,
    pub is_manually_unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub unlocked_by: Option<String>,
}

impl Lockout {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_manually_unlocked && now < self.unlock_at
    }

    /// When the lockout stopped (or will stop) denying logins.
    pub fn released_at(&self) -> DateTime<Utc> {
        match self.unlocked_at {
            Some(unlocked_at) if self.is_manually_unlocked => unlocked_at.min(self.unlock_at),
            _ => self.unlock_at,
        }
    }
}

/// Parameters for a lockout about to be created.
#[derive(Debug, Clone)]
pub struct NewLockout {
    pub id: String,
    pub identifier: String,
    pub reason: String,
    pub failed_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub unlock_at: DateTime<Utc>,
}

impl NewLockout {
    pub fn new(
        identifier: &str,
        failed_attempts: u32,
        created_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id: generate_prefixed_id("lck"),
            identifier: identifier.to_string(),
            reason: "too_many_failed_attempts".to_string(),
            failed_attempts,
            created_at,
            unlock_at: created_at + duration,
        }
    }
}

/// Answer to "is this identifier locked right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutStatus {
    pub identifier: String,
    pub locked: bool,
    pub unlock_at: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    pub fn unlocked(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            locked: false,
            unlock_at: None,
        }
    }

    pub fn from_lockout(lockout: &Lockout) -> Self {
        Self {
            identifier: lockout.identifier.clone(),
            locked: true,
            unlock_at: Some(lockout.unlock_at),
        }
    }

    /// Seconds until the lockout ends, rounded up.
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.unlock_at
            .filter(|_| self.locked)
            .map(|until| ((until - now).num_milliseconds() + 999).div_euclid(1000).max(0))
    }
}

/// Outcome of evaluating a failure count against the lockout threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockoutDecision {
    Locked {
        lockout: Lockout,
        /// False when a concurrent failure already created this episode's lockout.
        newly_created: bool,
    },
    NotLocked {
        remaining: u32,
    },
}

impl LockoutDecision {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockoutDecision::Locked { .. })
    }
}

/// An (identity, fingerprint) pair allowed to log in without a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedDevice {
    pub identity: IdentityId,
    pub fingerprint: Fingerprint,
    pub trusted_at: DateTime<Utc>,
}

/// Opaque bearer token addressing a challenge.
///
/// Handed to the client in plaintext exactly once; only its hash is stored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChallengeToken(String);

impl ChallengeToken {
    pub fn new(token: &str) -> Self {
        ChallengeToken(token.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn hash(&self) -> String {
        hash_token(&self.0)
    }

    pub fn is_well_formed(&self) -> bool {
        validate_prefixed_id(&self.0, "chl")
    }
}

impl fmt::Debug for ChallengeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChallengeToken(<redacted>)")
    }
}

impl From<String> for ChallengeToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChallengeToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A pending or finished one-time-code challenge.
///
/// Terminal once `verified_at` is set. Neither the token nor the code is
/// held in plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Challenge {
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub identity: IdentityId,
    pub destination: String,
    pub fingerprint: Fingerprint,
    #[serde(skip_serializing)]
    pub code_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
}

impl Challenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    /// Unverified, unexpired and not out of attempts. A `max_attempts` of
    /// zero means unlimited.
    pub fn is_live(&self, now: DateTime<Utc>, max_attempts: u32) -> bool {
        !self.is_verified()
            && !self.is_expired(now)
            && (max_attempts == 0 || self.failed_attempts < max_attempts)
    }
}

/// A login session on a particular device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSession {
    pub id: SessionId,
    pub identity: IdentityId,
    pub fingerprint: Fingerprint,
    pub user_agent: Option<String>,
    pub is_trusted: bool,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl DeviceSession {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}
