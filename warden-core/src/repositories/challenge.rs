//! Repository trait for one-time-code challenges.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    storage::{Challenge, IdentityId},
};

/// Storage for challenges, addressed by the SHA256 hash of their token.
///
/// Every state transition is a single conditional write so that concurrent
/// callers cannot both win:
///
/// - `mark_verified` sets `verified_at` only where it is still null
/// - `replace_code` only touches a challenge that is still live
/// - `record_failed_verification` only counts against a live challenge
///
/// `max_attempts` of zero means the attempt cap is disabled.
#[async_trait]
pub trait ChallengeRepository: Send + Sync + 'static {
    async fn create(&self, challenge: Challenge) -> Result<Challenge, Error>;

    /// Raw lookup regardless of state.
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Challenge>, Error>;

    /// Swap in a new code and expiry on a live challenge whose last send was
    /// at or before `sent_before`.
    ///
    /// Returns the updated challenge, or `None` if no row qualified.
    async fn replace_code(
        &self,
        token_hash: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        sent_before: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<Challenge>, Error>;

    /// Set `verified_at = now` if the challenge is live and `code_hash` matches.
    ///
    /// Returns the verified challenge, or `None` if nothing was updated.
    async fn mark_verified(
        &self,
        token_hash: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<Challenge>, Error>;

    /// Count a wrong code against a live challenge.
    ///
    /// Returns the new failure count, or `None` if the challenge is not live.
    async fn record_failed_verification(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<u32>, Error>;

    /// All challenges for an identity, newest first.
    async fn list_for_identity(&self, identity: &IdentityId) -> Result<Vec<Challenge>, Error>;

    /// Delete challenges that expired before `before`. Returns the number deleted.
    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
