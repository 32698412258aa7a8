use async_trait::async_trait;

use crate::{error::CredentialError, storage::VerifiedIdentity};

/// Checks an (identifier, secret) pair.
///
/// Password storage and hashing live behind this trait. Return `Ok(None)`
/// for a rejected pair, whether the identifier exists or not, and reserve
/// `Err` for failures that say nothing about the credentials.
#[async_trait]
pub trait CredentialVerifier: Send + Sync + 'static {
    async fn verify(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Option<VerifiedIdentity>, CredentialError>;
}
