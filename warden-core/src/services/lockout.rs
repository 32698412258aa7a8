//! Failed-login ledger and windowed account lockout.
//!
//! Every credential failure is appended to the ledger. Failures are then
//! counted over a trailing window and, once the count reaches the policy
//! threshold, a time-bounded lockout is created.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::services::LockoutService;
//!
//! let service = LockoutService::new(repository, LockoutPolicy::default(), clock, events);
//!
//! // Check before calling the credential verifier
//! if service.is_locked("bob@x.com").await?.locked {
//!     // refuse without looking at the password
//! }
//!
//! // After a rejected credential
//! let count = service.record_failure("bob@x.com", FailureReason::InvalidCredentials).await?;
//! let decision = service.evaluate_lockout("bob@x.com", count).await?;
//! ```

use std::sync::Arc;

use crate::{
    Error,
    clock::Clock,
    config::LockoutPolicy,
    events::{Event, EventBus},
    repositories::LockoutRepository,
    storage::{FailureReason, Lockout, LockoutDecision, LockoutStatus, NewLockout},
    validation::normalize_identifier,
};

/// Service for the attempt ledger and lockouts.
///
/// Identifiers are normalized on the way in, so callers may pass them as
/// typed by the user. All decisions are computed from stored state.
pub struct LockoutService<R: LockoutRepository> {
    repository: Arc<R>,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl<R: LockoutRepository> LockoutService<R> {
    pub fn new(
        repository: Arc<R>,
        policy: LockoutPolicy,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            repository,
            policy,
            clock,
            events,
        }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Append a failure to the ledger and return the number of failures in
    /// the current counting episode.
    ///
    /// The episode is the trailing window, cut short by the release of the
    /// most recent lockout: failures that already caused a lockout do not
    /// count again once it has been released.
    pub async fn record_failure(
        &self,
        identifier: &str,
        reason: FailureReason,
    ) -> Result<u32, Error> {
        let identifier = normalize_identifier(identifier)?;
        let now = self.clock.now();

        self.repository
            .record_failure(&identifier, &reason, now)
            .await?;

        let mut since = now - self.policy.window;
        if let Some(latest) = self.repository.find_latest_lockout(&identifier).await? {
            let released = latest.released_at();
            if released <= now && released > since {
                since = released;
            }
        }

        let stats = self.repository.get_attempt_stats(&identifier, since).await?;

        tracing::debug!(
            identifier = %identifier,
            failed_attempts = stats.count,
            reason = reason.as_str(),
            "Recorded failed login attempt"
        );

        Ok(stats.count)
    }

    /// Decide whether `count` failures lock the identifier.
    ///
    /// Crossing the threshold creates a lockout unless one is already active,
    /// in which case the existing one is returned with `newly_created: false`.
    pub async fn evaluate_lockout(
        &self,
        identifier: &str,
        count: u32,
    ) -> Result<LockoutDecision, Error> {
        if count < self.policy.threshold {
            return Ok(LockoutDecision::NotLocked {
                remaining: self.policy.threshold - count,
            });
        }

        let identifier = normalize_identifier(identifier)?;
        let now = self.clock.now();

        let (lockout, newly_created) = self
            .repository
            .create_lockout_if_none_active(NewLockout::new(
                &identifier,
                count,
                now,
                self.policy.lock_duration,
            ))
            .await?;

        if newly_created {
            tracing::info!(
                identifier = %identifier,
                failed_attempts = count,
                unlock_at = %lockout.unlock_at,
                "Account locked after too many failed login attempts"
            );
            self.events
                .publish(Event::LockoutCreated {
                    identifier: identifier.clone(),
                    failed_attempts: count,
                    unlock_at: lockout.unlock_at,
                    timestamp: now,
                })
                .await;
        }

        Ok(LockoutDecision::Locked {
            lockout,
            newly_created,
        })
    }

    /// Whether the identifier has an active lockout right now.
    pub async fn is_locked(&self, identifier: &str) -> Result<LockoutStatus, Error> {
        let identifier = normalize_identifier(identifier)?;
        let now = self.clock.now();

        Ok(
            match self
                .repository
                .find_active_lockout(&identifier, now)
                .await?
            {
                Some(lockout) => LockoutStatus::from_lockout(&lockout),
                None => LockoutStatus::unlocked(&identifier),
            },
        )
    }

    /// Release every active lockout for the identifier.
    ///
    /// Idempotent. Returns the number of lockouts released.
    pub async fn manual_unlock(&self, identifier: &str, unlocked_by: &str) -> Result<u64, Error> {
        let identifier = normalize_identifier(identifier)?;
        let now = self.clock.now();

        let released = self
            .repository
            .manual_unlock(&identifier, unlocked_by, now)
            .await?;

        if released > 0 {
            tracing::info!(
                identifier = %identifier,
                unlocked_by = %unlocked_by,
                released,
                "Account manually unlocked"
            );
            self.events
                .publish(Event::AccountUnlocked {
                    identifier,
                    unlocked_by: unlocked_by.to_string(),
                    released,
                    timestamp: now,
                })
                .await;
        }

        Ok(released)
    }

    /// Lockout history for an identifier, newest first.
    pub async fn list_lockouts(&self, identifier: &str) -> Result<Vec<Lockout>, Error> {
        let identifier = normalize_identifier(identifier)?;
        self.repository.list_lockouts(&identifier).await
    }

    /// Every lockout in force right now.
    pub async fn list_active_lockouts(&self) -> Result<Vec<Lockout>, Error> {
        self.repository
            .list_active_lockouts(self.clock.now())
            .await
    }

    /// Delete ledger rows older than the retention period. Lockouts are kept.
    pub async fn prune_attempts(&self) -> Result<u64, Error> {
        let before = self.clock.now() - self.policy.attempt_retention;
        let deleted = self.repository.cleanup_old_attempts(before).await?;
        if deleted > 0 {
            tracing::info!(count = deleted, "Cleaned up old failed login attempt records");
        }
        Ok(deleted)
    }
}
