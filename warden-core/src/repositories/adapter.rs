use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    fingerprint::Fingerprint,
    repositories::{
        ChallengeRepository, DeviceSessionRepository, LockoutRepository, RepositoryProvider,
        TrustedDeviceRepository,
    },
    storage::{
        AttemptStats, Challenge, DeviceSession, FailedAttempt, FailureReason, IdentityId, Lockout,
        NewLockout, SessionId, TrustedDevice,
    },
};

/// Adapter that wraps a RepositoryProvider and implements LockoutRepository
pub struct LockoutRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> LockoutRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> LockoutRepository for LockoutRepositoryAdapter<R> {
    async fn record_failure(
        &self,
        identifier: &str,
        reason: &FailureReason,
        attempted_at: DateTime<Utc>,
    ) -> Result<FailedAttempt, Error> {
        self.provider
            .lockout()
            .record_failure(identifier, reason, attempted_at)
            .await
    }

    async fn get_attempt_stats(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error> {
        self.provider
            .lockout()
            .get_attempt_stats(identifier, since)
            .await
    }

    async fn create_lockout_if_none_active(
        &self,
        lockout: NewLockout,
    ) -> Result<(Lockout, bool), Error> {
        self.provider
            .lockout()
            .create_lockout_if_none_active(lockout)
            .await
    }

    async fn find_active_lockout(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Lockout>, Error> {
        self.provider
            .lockout()
            .find_active_lockout(identifier, now)
            .await
    }

    async fn find_latest_lockout(&self, identifier: &str) -> Result<Option<Lockout>, Error> {
        self.provider.lockout().find_latest_lockout(identifier).await
    }

    async fn manual_unlock(
        &self,
        identifier: &str,
        unlocked_by: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        self.provider
            .lockout()
            .manual_unlock(identifier, unlocked_by, now)
            .await
    }

    async fn list_lockouts(&self, identifier: &str) -> Result<Vec<Lockout>, Error> {
        self.provider.lockout().list_lockouts(identifier).await
    }

    async fn list_active_lockouts(&self, now: DateTime<Utc>) -> Result<Vec<Lockout>, Error> {
        self.provider.lockout().list_active_lockouts(now).await
    }

    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.lockout().cleanup_old_attempts(before).await
    }
}

/// Adapter that wraps a RepositoryProvider and implements ChallengeRepository
pub struct ChallengeRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> ChallengeRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> ChallengeRepository for ChallengeRepositoryAdapter<R> {
    async fn create(&self, challenge: Challenge) -> Result<Challenge, Error> {
        self.provider.challenge().create(challenge).await
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Challenge>, Error> {
        self.provider.challenge().find_by_token_hash(token_hash).await
    }

    async fn replace_code(
        &self,
        token_hash: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        sent_before: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<Challenge>, Error> {
        self.provider
            .challenge()
            .replace_code(
                token_hash,
                code_hash,
                now,
                expires_at,
                sent_before,
                max_attempts,
            )
            .await
    }

    async fn mark_verified(
        &self,
        token_hash: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<Challenge>, Error> {
        self.provider
            .challenge()
            .mark_verified(token_hash, code_hash, now, max_attempts)
            .await
    }

    async fn record_failed_verification(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<u32>, Error> {
        self.provider
            .challenge()
            .record_failed_verification(token_hash, now, max_attempts)
            .await
    }

    async fn list_for_identity(&self, identity: &IdentityId) -> Result<Vec<Challenge>, Error> {
        self.provider.challenge().list_for_identity(identity).await
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.challenge().cleanup_expired(before).await
    }
}

/// Adapter that wraps a RepositoryProvider and implements TrustedDeviceRepository
pub struct TrustedDeviceRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> TrustedDeviceRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> TrustedDeviceRepository for TrustedDeviceRepositoryAdapter<R> {
    async fn upsert(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
        trusted_at: DateTime<Utc>,
    ) -> Result<TrustedDevice, Error> {
        self.provider
            .trusted_device()
            .upsert(identity, fingerprint, trusted_at)
            .await
    }

    async fn is_trusted(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, Error> {
        self.provider
            .trusted_device()
            .is_trusted(identity, fingerprint)
            .await
    }

    async fn list(&self, identity: &IdentityId) -> Result<Vec<TrustedDevice>, Error> {
        self.provider.trusted_device().list(identity).await
    }

    async fn remove(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, Error> {
        self.provider
            .trusted_device()
            .remove(identity, fingerprint)
            .await
    }
}

/// Adapter that wraps a RepositoryProvider and implements DeviceSessionRepository
pub struct DeviceSessionRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> DeviceSessionRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> DeviceSessionRepository for DeviceSessionRepositoryAdapter<R> {
    async fn create(&self, session: DeviceSession) -> Result<DeviceSession, Error> {
        self.provider.device_session().create(session).await
    }

    async fn find(&self, id: &SessionId) -> Result<Option<DeviceSession>, Error> {
        self.provider.device_session().find(id).await
    }

    async fn has_any(&self, identity: &IdentityId) -> Result<bool, Error> {
        self.provider.device_session().has_any(identity).await
    }

    async fn list(&self, identity: &IdentityId) -> Result<Vec<DeviceSession>, Error> {
        self.provider.device_session().list(identity).await
    }

    async fn revoke(
        &self,
        identity: &IdentityId,
        id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.provider.device_session().revoke(identity, id, now).await
    }

    async fn revoke_all_except(
        &self,
        identity: &IdentityId,
        keep: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        self.provider
            .device_session()
            .revoke_all_except(identity, keep, now)
            .await
    }

    async fn touch(&self, id: &SessionId, now: DateTime<Utc>) -> Result<bool, Error> {
        self.provider.device_session().touch(id, now).await
    }
}
