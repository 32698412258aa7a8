//! Repository trait for the attempt ledger and lockout records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    storage::{AttemptStats, FailedAttempt, FailureReason, Lockout, NewLockout},
};

/// Storage for failed login attempts and the lockouts they trigger.
///
/// The attempt ledger is append-only: rows are never updated, and only
/// deleted by retention clean-up. Lockouts are never deleted.
///
/// # Concurrency
///
/// [`create_lockout_if_none_active`](Self::create_lockout_if_none_active)
/// must be atomic. Two concurrent threshold crossings for the same
/// identifier must produce one lockout, never two overlapping ones.
#[async_trait]
pub trait LockoutRepository: Send + Sync + 'static {
    /// Append a failed attempt to the ledger.
    async fn record_failure(
        &self,
        identifier: &str,
        reason: &FailureReason,
        attempted_at: DateTime<Utc>,
    ) -> Result<FailedAttempt, Error>;

    /// Count failures for `identifier` at or after `since`.
    async fn get_attempt_stats(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error>;

    /// Insert `lockout` unless the identifier already has a lockout that is
    /// active at `lockout.created_at`.
    ///
    /// Returns the lockout now in force and whether it was created by this call.
    async fn create_lockout_if_none_active(
        &self,
        lockout: NewLockout,
    ) -> Result<(Lockout, bool), Error>;

    /// The lockout active at `now`, if any.
    async fn find_active_lockout(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Lockout>, Error>;

    /// The most recently created lockout, active or not.
    async fn find_latest_lockout(&self, identifier: &str) -> Result<Option<Lockout>, Error>;

    /// Flag every lockout active at `now` as manually unlocked.
    ///
    /// Returns the number of lockouts released. Idempotent.
    async fn manual_unlock(
        &self,
        identifier: &str,
        unlocked_by: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, Error>;

    /// Full lockout history for an identifier, newest first.
    async fn list_lockouts(&self, identifier: &str) -> Result<Vec<Lockout>, Error>;

    /// Every lockout active at `now`, soonest to expire first.
    async fn list_active_lockouts(&self, now: DateTime<Utc>) -> Result<Vec<Lockout>, Error>;

    /// Delete ledger rows older than `before`. Returns the number deleted.
    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
