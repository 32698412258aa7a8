//! In-memory repositories backed by `DashMap`.
//!
//! Useful for tests and single-process deployments that do not need
//! durability. Conditional writes hold the shard lock of the affected key for
//! the whole check-and-update, which gives the same atomicity the SQL
//! backends get from conditional `UPDATE`/`INSERT` statements.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    Error,
    crypto::constant_time_compare,
    error::StorageError,
    fingerprint::Fingerprint,
    repositories::{
        ChallengeRepository, ChallengeRepositoryProvider, DeviceSessionRepository,
        DeviceSessionRepositoryProvider, LockoutRepository, LockoutRepositoryProvider,
        RepositoryProvider, TrustedDeviceRepository, TrustedDeviceRepositoryProvider,
    },
    storage::{
        AttemptStats, Challenge, DeviceSession, FailedAttempt, FailureReason, IdentityId, Lockout,
        NewLockout, SessionId, TrustedDevice,
    },
};

#[derive(Default)]
pub struct InMemoryLockoutRepository {
    attempts: DashMap<String, Vec<FailedAttempt>>,
    lockouts: DashMap<String, Vec<Lockout>>,
    next_attempt_id: AtomicI64,
}

#[async_trait]
impl LockoutRepository for InMemoryLockoutRepository {
    async fn record_failure(
        &self,
        identifier: &str,
        reason: &FailureReason,
        attempted_at: DateTime<Utc>,
    ) -> Result<FailedAttempt, Error> {
        let attempt = FailedAttempt {
            id: self.next_attempt_id.fetch_add(1, Ordering::SeqCst) + 1,
            identifier: identifier.to_string(),
            reason: reason.clone(),
            attempted_at,
        };
        self.attempts
            .entry(identifier.to_string())
            .or_default()
            .push(attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt_stats(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error> {
        let Some(attempts) = self.attempts.get(identifier) else {
            return Ok(AttemptStats::default());
        };
        let matching: Vec<_> = attempts
            .iter()
            .filter(|a| a.attempted_at >= since)
            .map(|a| a.attempted_at)
            .collect();

        Ok(AttemptStats {
            count: matching.len() as u32,
            latest_at: matching.into_iter().max(),
        })
    }

    async fn create_lockout_if_none_active(
        &self,
        lockout: NewLockout,
    ) -> Result<(Lockout, bool), Error> {
        let mut entry = self
            .lockouts
            .entry(lockout.identifier.clone())
            .or_default();

        if let Some(active) = entry.iter().find(|l| l.is_active(lockout.created_at)) {
            return Ok((active.clone(), false));
        }

        let created = Lockout {
            id: lockout.id,
            identifier: lockout.identifier,
            reason: lockout.reason,
            failed_attempts: lockout.failed_attempts,
            created_at: lockout.created_at,
            unlock_at: lockout.unlock_at,
            is_manually_unlocked: false,
            unlocked_at: None,
            unlocked_by: None,
        };
        entry.push(created.clone());
        Ok((created, true))
    }

    async fn find_active_lockout(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Lockout>, Error> {
        Ok(self.lockouts.get(identifier).and_then(|lockouts| {
            lockouts
                .iter()
                .filter(|l| l.is_active(now))
                .max_by_key(|l| l.unlock_at)
                .cloned()
        }))
    }

    async fn find_latest_lockout(&self, identifier: &str) -> Result<Option<Lockout>, Error> {
        Ok(self
            .lockouts
            .get(identifier)
            .and_then(|lockouts| lockouts.iter().max_by_key(|l| l.created_at).cloned()))
    }

    async fn manual_unlock(
        &self,
        identifier: &str,
        unlocked_by: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let Some(mut lockouts) = self.lockouts.get_mut(identifier) else {
            return Ok(0);
        };
        let mut released = 0;
        for lockout in lockouts.iter_mut().filter(|l| l.is_active(now)) {
            lockout.is_manually_unlocked = true;
            lockout.unlocked_at = Some(now);
            lockout.unlocked_by = Some(unlocked_by.to_string());
            released += 1;
        }
        Ok(released)
    }

    async fn list_lockouts(&self, identifier: &str) -> Result<Vec<Lockout>, Error> {
        let mut lockouts = self
            .lockouts
            .get(identifier)
            .map(|l| l.clone())
            .unwrap_or_default();
        lockouts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lockouts)
    }

    async fn list_active_lockouts(&self, now: DateTime<Utc>) -> Result<Vec<Lockout>, Error> {
        let mut active: Vec<Lockout> = self
            .lockouts
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|l| l.is_active(now))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        active.sort_by(|a, b| a.unlock_at.cmp(&b.unlock_at));
        Ok(active)
    }

    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let mut deleted = 0u64;
        self.attempts.retain(|_, attempts| {
            let len = attempts.len();
            attempts.retain(|a| a.attempted_at >= before);
            deleted += (len - attempts.len()) as u64;
            !attempts.is_empty()
        });
        Ok(deleted)
    }
}

#[derive(Default)]
pub struct InMemoryChallengeRepository {
    challenges: DashMap<String, Challenge>,
}

#[async_trait]
impl ChallengeRepository for InMemoryChallengeRepository {
    async fn create(&self, challenge: Challenge) -> Result<Challenge, Error> {
        match self.challenges.entry(challenge.token_hash.clone()) {
            Entry::Occupied(_) => Err(Error::Storage(StorageError::Constraint(
                "challenge token already exists".to_string(),
            ))),
            Entry::Vacant(slot) => {
                slot.insert(challenge.clone());
                Ok(challenge)
            }
        }
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Challenge>, Error> {
        Ok(self.challenges.get(token_hash).map(|c| c.clone()))
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
        let Some(mut challenge) = self.challenges.get_mut(token_hash) else {
            return Ok(None);
        };
        if !challenge.is_live(now, max_attempts) || challenge.last_sent_at > sent_before {
            return Ok(None);
        }
        challenge.code_hash = code_hash.to_string();
        challenge.expires_at = expires_at;
        challenge.last_sent_at = now;
        Ok(Some(challenge.clone()))
    }

    async fn mark_verified(
        &self,
        token_hash: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<Challenge>, Error> {
        let Some(mut challenge) = self.challenges.get_mut(token_hash) else {
            return Ok(None);
        };
        if !challenge.is_live(now, max_attempts)
            || !constant_time_compare(challenge.code_hash.as_bytes(), code_hash.as_bytes())
        {
            return Ok(None);
        }
        challenge.verified_at = Some(now);
        Ok(Some(challenge.clone()))
    }

    async fn record_failed_verification(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<u32>, Error> {
        let Some(mut challenge) = self.challenges.get_mut(token_hash) else {
            return Ok(None);
        };
        if !challenge.is_live(now, max_attempts) {
            return Ok(None);
        }
        challenge.failed_attempts += 1;
        Ok(Some(challenge.failed_attempts))
    }

    async fn list_for_identity(&self, identity: &IdentityId) -> Result<Vec<Challenge>, Error> {
        let mut challenges: Vec<Challenge> = self
            .challenges
            .iter()
            .filter(|c| &c.identity == identity)
            .map(|c| c.clone())
            .collect();
        challenges.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(challenges)
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let len = self.challenges.len();
        self.challenges.retain(|_, c| c.expires_at >= before);
        Ok(len.saturating_sub(self.challenges.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryTrustedDeviceRepository {
    devices: DashMap<IdentityId, Vec<TrustedDevice>>,
}

#[async_trait]
impl TrustedDeviceRepository for InMemoryTrustedDeviceRepository {
    async fn upsert(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
        trusted_at: DateTime<Utc>,
    ) -> Result<TrustedDevice, Error> {
        let mut devices = self.devices.entry(identity.clone()).or_default();
        if let Some(existing) = devices.iter().find(|d| &d.fingerprint == fingerprint) {
            return Ok(existing.clone());
        }
        let device = TrustedDevice {
            identity: identity.clone(),
            fingerprint: *fingerprint,
            trusted_at,
        };
        devices.push(device.clone());
        Ok(device)
    }

    async fn is_trusted(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, Error> {
        Ok(self
            .devices
            .get(identity)
            .is_some_and(|devices| devices.iter().any(|d| &d.fingerprint == fingerprint)))
    }

    async fn list(&self, identity: &IdentityId) -> Result<Vec<TrustedDevice>, Error> {
        Ok(self
            .devices
            .get(identity)
            .map(|d| d.clone())
            .unwrap_or_default())
    }

    async fn remove(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, Error> {
        let Some(mut devices) = self.devices.get_mut(identity) else {
            return Ok(false);
        };
        let len = devices.len();
        devices.retain(|d| &d.fingerprint != fingerprint);
        Ok(devices.len() != len)
    }
}

#[derive(Default)]
pub struct InMemoryDeviceSessionRepository {
    sessions: DashMap<SessionId, DeviceSession>,
}

#[async_trait]
impl DeviceSessionRepository for InMemoryDeviceSessionRepository {
    async fn create(&self, session: DeviceSession) -> Result<DeviceSession, Error> {
        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => Err(Error::Storage(StorageError::Constraint(
                "session id already exists".to_string(),
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    async fn find(&self, id: &SessionId) -> Result<Option<DeviceSession>, Error> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    async fn has_any(&self, identity: &IdentityId) -> Result<bool, Error> {
        Ok(self.sessions.iter().any(|s| &s.identity == identity))
    }

    async fn list(&self, identity: &IdentityId) -> Result<Vec<DeviceSession>, Error> {
        let mut sessions: Vec<DeviceSession> = self
            .sessions
            .iter()
            .filter(|s| &s.identity == identity)
            .map(|s| s.clone())
            .collect();
        sessions.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(sessions)
    }

    async fn revoke(
        &self,
        identity: &IdentityId,
        id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let Some(mut session) = self.sessions.get_mut(id) else {
            return Ok(false);
        };
        if &session.identity != identity || !session.is_active() {
            return Ok(false);
        }
        session.revoked_at = Some(now);
        Ok(true)
    }

    async fn revoke_all_except(
        &self,
        identity: &IdentityId,
        keep: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut revoked = 0;
        for mut session in self.sessions.iter_mut() {
            if &session.identity == identity && &session.id != keep && session.is_active() {
                session.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn touch(&self, id: &SessionId, now: DateTime<Utc>) -> Result<bool, Error> {
        let Some(mut session) = self.sessions.get_mut(id) else {
            return Ok(false);
        };
        if !session.is_active() {
            return Ok(false);
        }
        session.last_active_at = now;
        Ok(true)
    }
}

/// Repository provider keeping all state in process memory.
#[derive(Default)]
pub struct InMemoryRepositoryProvider {
    lockout: InMemoryLockoutRepository,
    challenge: InMemoryChallengeRepository,
    trusted_device: InMemoryTrustedDeviceRepository,
    device_session: InMemoryDeviceSessionRepository,
}

impl InMemoryRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockoutRepositoryProvider for InMemoryRepositoryProvider {
    type LockoutRepo = InMemoryLockoutRepository;

    fn lockout(&self) -> &Self::LockoutRepo {
        &self.lockout
    }
}

impl ChallengeRepositoryProvider for InMemoryRepositoryProvider {
    type ChallengeRepo = InMemoryChallengeRepository;

    fn challenge(&self) -> &Self::ChallengeRepo {
        &self.challenge
    }
}

impl TrustedDeviceRepositoryProvider for InMemoryRepositoryProvider {
    type TrustedDeviceRepo = InMemoryTrustedDeviceRepository;

    fn trusted_device(&self) -> &Self::TrustedDeviceRepo {
        &self.trusted_device
    }
}

impl DeviceSessionRepositoryProvider for InMemoryRepositoryProvider {
    type DeviceSessionRepo = InMemoryDeviceSessionRepository;

    fn device_session(&self) -> &Self::DeviceSessionRepo {
        &self.device_session
    }
}

#[async_trait]
impl RepositoryProvider for InMemoryRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}
