use std::sync::Arc;

use crate::{
    Error,
    fingerprint::Fingerprint,
    repositories::{DeviceSessionRepository, TrustedDeviceRepository},
    storage::IdentityId,
};

/// Read-only trust lookups used by login orchestration.
///
/// Classification itself is the pure [`classify`](crate::fingerprint::classify);
/// this service only answers questions about stored trust.
pub struct DeviceTrustService<T: TrustedDeviceRepository, S: DeviceSessionRepository> {
    devices: Arc<T>,
    sessions: Arc<S>,
}

impl<T: TrustedDeviceRepository, S: DeviceSessionRepository> DeviceTrustService<T, S> {
    pub fn new(devices: Arc<T>, sessions: Arc<S>) -> Self {
        Self { devices, sessions }
    }

    /// True if (identity, fingerprint) is a trusted device.
    pub async fn is_known(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, Error> {
        self.devices.is_trusted(identity, fingerprint).await
    }

    /// True if the identity has ever logged in.
    ///
    /// Revoked sessions and forgotten devices still count: revoking
    /// everything must not turn the next login into a trusted first login.
    pub async fn has_any_sessions(&self, identity: &IdentityId) -> Result<bool, Error> {
        if self.sessions.has_any(identity).await? {
            return Ok(true);
        }
        Ok(!self.devices.list(identity).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::{
        InMemoryDeviceSessionRepository, InMemoryTrustedDeviceRepository,
    };
    use crate::storage::{DeviceSession, SessionId};
    use chrono::Utc;

    fn service() -> (
        DeviceTrustService<InMemoryTrustedDeviceRepository, InMemoryDeviceSessionRepository>,
        Arc<InMemoryTrustedDeviceRepository>,
        Arc<InMemoryDeviceSessionRepository>,
    ) {
        let devices = Arc::new(InMemoryTrustedDeviceRepository::default());
        let sessions = Arc::new(InMemoryDeviceSessionRepository::default());
        (
            DeviceTrustService::new(devices.clone(), sessions.clone()),
            devices,
            sessions,
        )
    }

    #[tokio::test]
    async fn test_new_identity_has_no_sessions() {
        let (service, _, _) = service();
        let identity = IdentityId::new("u1");
        let fingerprint: Fingerprint = "Chrome/Windows/Desktop".parse().unwrap();

        assert!(!service.has_any_sessions(&identity).await.unwrap());
        assert!(!service.is_known(&identity, &fingerprint).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoked_session_still_counts() {
        let (service, _, sessions) = service();
        let identity = IdentityId::new("u1");
        let now = Utc::now();
        let session = DeviceSession {
            id: SessionId::new_random(),
            identity: identity.clone(),
            fingerprint: "Chrome/Windows/Desktop".parse().unwrap(),
            user_agent: None,
            is_trusted: true,
            created_at: now,
            last_active_at: now,
            revoked_at: None,
        };
        sessions.create(session.clone()).await.unwrap();
        sessions.revoke(&identity, &session.id, now).await.unwrap();

        assert!(service.has_any_sessions(&identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_trusted_device_is_known_per_identity() {
        let (service, devices, _) = service();
        let fingerprint: Fingerprint = "Firefox/macOS/Desktop".parse().unwrap();
        devices
            .upsert(&IdentityId::new("u1"), &fingerprint, Utc::now())
            .await
            .unwrap();

        assert!(
            service
                .is_known(&IdentityId::new("u1"), &fingerprint)
                .await
                .unwrap()
        );
        assert!(
            !service
                .is_known(&IdentityId::new("u2"), &fingerprint)
                .await
                .unwrap()
        );
        assert!(
            service
                .has_any_sessions(&IdentityId::new("u1"))
                .await
                .unwrap()
        );
    }
}
