use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    fingerprint::Fingerprint,
    storage::{IdentityId, TrustedDevice},
};

/// Storage for trusted (identity, fingerprint) pairs.
///
/// The pair is unique; upserting an existing pair returns the original row
/// with its original `trusted_at`.
#[async_trait]
pub trait TrustedDeviceRepository: Send + Sync + 'static {
    async fn upsert(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
        trusted_at: DateTime<Utc>,
    ) -> Result<TrustedDevice, Error>;

    async fn is_trusted(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, Error>;

    async fn list(&self, identity: &IdentityId) -> Result<Vec<TrustedDevice>, Error>;

    /// Returns true if a row was removed.
    async fn remove(&self, identity: &IdentityId, fingerprint: &Fingerprint)
    -> Result<bool, Error>;
}
