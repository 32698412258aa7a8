//! Repository implementations for SQLite storage
//!
//! Timestamps are stored as integer milliseconds since the Unix epoch so that
//! window and expiry comparisons happen in SQL without string parsing.

pub mod challenge;
pub mod device;
pub mod lockout;
pub mod session;

pub use challenge::SqliteChallengeRepository;
pub use device::SqliteTrustedDeviceRepository;
pub use lockout::SqliteLockoutRepository;
pub use session::SqliteDeviceSessionRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use warden_core::{
    Error,
    error::StorageError,
    repositories::{
        ChallengeRepositoryProvider, DeviceSessionRepositoryProvider, LockoutRepositoryProvider,
        RepositoryProvider, TrustedDeviceRepositoryProvider,
    },
};

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        Error::from(StorageError::Database(format!(
            "Stored timestamp out of range: {ms}"
        )))
    })
}

/// Repository provider implementation for SQLite
///
/// This struct implements all the individual repository provider traits
/// as well as the unified `RepositoryProvider` trait.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    lockout: Arc<SqliteLockoutRepository>,
    challenge: Arc<SqliteChallengeRepository>,
    trusted_device: Arc<SqliteTrustedDeviceRepository>,
    device_session: Arc<SqliteDeviceSessionRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let lockout = Arc::new(SqliteLockoutRepository::new(pool.clone()));
        let challenge = Arc::new(SqliteChallengeRepository::new(pool.clone()));
        let trusted_device = Arc::new(SqliteTrustedDeviceRepository::new(pool.clone()));
        let device_session = Arc::new(SqliteDeviceSessionRepository::new(pool.clone()));

        Self {
            pool,
            lockout,
            challenge,
            trusted_device,
            device_session,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl LockoutRepositoryProvider for SqliteRepositoryProvider {
    type LockoutRepo = SqliteLockoutRepository;

    fn lockout(&self) -> &Self::LockoutRepo {
        &self.lockout
    }
}

impl ChallengeRepositoryProvider for SqliteRepositoryProvider {
    type ChallengeRepo = SqliteChallengeRepository;

    fn challenge(&self) -> &Self::ChallengeRepo {
        &self.challenge
    }
}

impl TrustedDeviceRepositoryProvider for SqliteRepositoryProvider {
    type TrustedDeviceRepo = SqliteTrustedDeviceRepository;

    fn trusted_device(&self) -> &Self::TrustedDeviceRepo {
        &self.trusted_device
    }
}

impl DeviceSessionRepositoryProvider for SqliteRepositoryProvider {
    type DeviceSessionRepo = SqliteDeviceSessionRepository;

    fn device_session(&self) -> &Self::DeviceSessionRepo {
        &self.device_session
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        use crate::migrations::{MigrationManager, SqliteMigrationManager, all};

        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            Error::Storage(StorageError::Migration(
                "Failed to initialize migrations".to_string(),
            ))
        })?;

        manager.up(&all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            Error::Storage(StorageError::Migration(
                "Failed to run migrations".to_string(),
            ))
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        Ok(())
    }
}
