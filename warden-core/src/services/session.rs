use std::sync::Arc;

use crate::{
    Error, ValidationError,
    clock::Clock,
    events::{Event, EventBus},
    fingerprint::Fingerprint,
    repositories::{DeviceSessionRepository, TrustedDeviceRepository},
    storage::{DeviceSession, IdentityId, SessionId, TrustedDevice},
};

/// Registry of trusted devices and per-device sessions.
///
/// The only writer of trust: devices are promoted here after a first login
/// or a verified challenge, and forgotten here on request.
pub struct SessionRegistry<T: TrustedDeviceRepository, S: DeviceSessionRepository> {
    devices: Arc<T>,
    sessions: Arc<S>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl<T: TrustedDeviceRepository, S: DeviceSessionRepository> SessionRegistry<T, S> {
    pub fn new(devices: Arc<T>, sessions: Arc<S>, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            devices,
            sessions,
            clock,
            events,
        }
    }

    /// Trust (identity, fingerprint). Upserting an already trusted pair
    /// returns the existing record unchanged.
    pub async fn upsert_trusted_device(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<TrustedDevice, Error> {
        let already_trusted = self.devices.is_trusted(identity, fingerprint).await?;
        let now = self.clock.now();
        let device = self.devices.upsert(identity, fingerprint, now).await?;

        if !already_trusted {
            tracing::info!(
                identity = %identity,
                fingerprint = %fingerprint,
                "Device trusted"
            );
            self.events
                .publish(Event::DeviceTrusted {
                    identity: identity.clone(),
                    fingerprint: *fingerprint,
                    timestamp: now,
                })
                .await;
        }

        Ok(device)
    }

    pub async fn register_session(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
        user_agent: Option<&str>,
        trusted: bool,
    ) -> Result<DeviceSession, Error> {
        let now = self.clock.now();
        let session = DeviceSession {
            id: SessionId::new_random(),
            identity: identity.clone(),
            fingerprint: *fingerprint,
            user_agent: user_agent.map(str::to_string),
            is_trusted: trusted,
            created_at: now,
            last_active_at: now,
            revoked_at: None,
        };

        let session = self.sessions.create(session).await?;
        tracing::debug!(
            identity = %identity,
            session_id = %session.id,
            trusted,
            "Session registered"
        );
        Ok(session)
    }

    pub async fn list_sessions(&self, identity: &IdentityId) -> Result<Vec<DeviceSession>, Error> {
        self.sessions.list(identity).await
    }

    pub async fn list_trusted_devices(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<TrustedDevice>, Error> {
        self.devices.list(identity).await
    }

    /// Revoke one session. Returns false if it does not exist, belongs to
    /// another identity or is already revoked.
    pub async fn revoke(&self, identity: &IdentityId, session_id: &SessionId) -> Result<bool, Error> {
        if !session_id.is_valid() {
            return Err(ValidationError::InvalidField(format!("session id: {session_id}")).into());
        }

        let now = self.clock.now();
        let revoked = self.sessions.revoke(identity, session_id, now).await?;
        if revoked {
            tracing::info!(identity = %identity, session_id = %session_id, "Session revoked");
            self.events
                .publish(Event::SessionRevoked {
                    identity: identity.clone(),
                    session_id: session_id.clone(),
                    timestamp: now,
                })
                .await;
        }
        Ok(revoked)
    }

    /// Revoke every session of the identity except `current`.
    pub async fn revoke_all_except(
        &self,
        identity: &IdentityId,
        current: &SessionId,
    ) -> Result<u64, Error> {
        let revoked = self
            .sessions
            .revoke_all_except(identity, current, self.clock.now())
            .await?;
        if revoked > 0 {
            tracing::info!(identity = %identity, count = revoked, "Revoked other sessions");
        }
        Ok(revoked)
    }

    /// Remove trust for a device. Later logins from it are challenged again.
    pub async fn forget_device(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, Error> {
        let removed = self.devices.remove(identity, fingerprint).await?;
        if removed {
            tracing::info!(identity = %identity, fingerprint = %fingerprint, "Device forgotten");
        }
        Ok(removed)
    }

    /// Mark a session as active now. Returns false for unknown or revoked sessions.
    pub async fn touch(&self, session_id: &SessionId) -> Result<bool, Error> {
        self.sessions.touch(session_id, self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repositories::memory::{
        InMemoryDeviceSessionRepository, InMemoryTrustedDeviceRepository,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};

    type Registry = SessionRegistry<InMemoryTrustedDeviceRepository, InMemoryDeviceSessionRepository>;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn registry(clock: Arc<ManualClock>) -> Registry {
        SessionRegistry::new(
            Arc::new(InMemoryTrustedDeviceRepository::default()),
            Arc::new(InMemoryDeviceSessionRepository::default()),
            clock,
            EventBus::new(),
        )
    }

    fn chrome() -> Fingerprint {
        "Chrome/Windows/Desktop".parse().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_trusted_device_publishes_once() {
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = registry(clock.clone());
        let mut events = registry.events.subscribe();
        let identity = IdentityId::new("u1");

        let first = registry.upsert_trusted_device(&identity, &chrome()).await.unwrap();
        clock.advance(Duration::days(1));
        let second = registry.upsert_trusted_device(&identity, &chrome()).await.unwrap();

        assert_eq!(first.trusted_at, t0());
        assert_eq!(second.trusted_at, t0());
        assert!(matches!(
            events.try_recv().unwrap(),
            Event::DeviceTrusted { .. }
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_revoke_and_touch() {
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = registry(clock.clone());
        let identity = IdentityId::new("u1");

        let session = registry
            .register_session(&identity, &chrome(), Some("Mozilla/5.0"), true)
            .await
            .unwrap();
        assert!(session.id.is_valid());
        assert_eq!(session.user_agent.as_deref(), Some("Mozilla/5.0"));

        clock.advance(Duration::minutes(5));
        assert!(registry.touch(&session.id).await.unwrap());
        let listed = registry.list_sessions(&identity).await.unwrap();
        assert_eq!(listed[0].last_active_at, t0() + Duration::minutes(5));

        // Someone else cannot revoke it
        assert!(
            !registry
                .revoke(&IdentityId::new("u2"), &session.id)
                .await
                .unwrap()
        );
        assert!(registry.revoke(&identity, &session.id).await.unwrap());
        assert!(!registry.revoke(&identity, &session.id).await.unwrap());
        assert!(!registry.touch(&session.id).await.unwrap());

        assert!(
            registry
                .revoke(&identity, &SessionId::new("bogus"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_revoke_all_except_current() {
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = registry(clock);
        let identity = IdentityId::new("u1");

        let current = registry
            .register_session(&identity, &chrome(), None, true)
            .await
            .unwrap();
        for _ in 0..3 {
            registry
                .register_session(&identity, &chrome(), None, true)
                .await
                .unwrap();
        }

        assert_eq!(
            registry
                .revoke_all_except(&identity, &current.id)
                .await
                .unwrap(),
            3
        );
        let active: Vec<_> = registry
            .list_sessions(&identity)
            .await
            .unwrap()
            .into_iter()
            .filter(DeviceSession::is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, current.id);
    }

    #[tokio::test]
    async fn test_forget_device() {
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = registry(clock);
        let identity = IdentityId::new("u1");

        registry.upsert_trusted_device(&identity, &chrome()).await.unwrap();
        assert_eq!(registry.list_trusted_devices(&identity).await.unwrap().len(), 1);
        assert!(registry.forget_device(&identity, &chrome()).await.unwrap());
        assert!(!registry.forget_device(&identity, &chrome()).await.unwrap());
        assert!(registry.list_trusted_devices(&identity).await.unwrap().is_empty());
    }
}
