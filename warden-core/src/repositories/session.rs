use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    storage::{DeviceSession, IdentityId, SessionId},
};

/// Storage for per-device login sessions.
///
/// Revocation only stamps `revoked_at`; rows are kept so an identity that
/// has logged in before is never mistaken for a brand-new one.
#[async_trait]
pub trait DeviceSessionRepository: Send + Sync + 'static {
    async fn create(&self, session: DeviceSession) -> Result<DeviceSession, Error>;

    async fn find(&self, id: &SessionId) -> Result<Option<DeviceSession>, Error>;

    /// True if the identity has ever had a session, revoked ones included.
    async fn has_any(&self, identity: &IdentityId) -> Result<bool, Error>;

    /// All sessions for an identity, most recently active first.
    async fn list(&self, identity: &IdentityId) -> Result<Vec<DeviceSession>, Error>;

    /// Revoke one active session owned by `identity`. Returns true if it was revoked.
    async fn revoke(
        &self,
        identity: &IdentityId,
        id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<bool, Error>;

    /// Revoke every active session of `identity` except `keep`.
    async fn revoke_all_except(
        &self,
        identity: &IdentityId,
        keep: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<u64, Error>;

    /// Bump `last_active_at` on an active session.
    async fn touch(&self, id: &SessionId, now: DateTime<Utc>) -> Result<bool, Error>;
}
