//! SQLite storage backend for warden.
//!
//! Implements every repository trait from `warden-core` on a single
//! [`SqlitePool`]. The race-sensitive operations (lockout creation,
//! challenge verification and resend) are single conditional statements,
//! so they stay atomic across processes sharing one database file.
//!
//! ```rust,no_run
//! use warden_core::repositories::RepositoryProvider;
//! use warden_storage_sqlite::SqliteRepositoryProvider;
//!
//! # async fn run() -> Result<(), warden_core::Error> {
//! let provider = SqliteRepositoryProvider::connect("sqlite://warden.db?mode=rwc").await?;
//! provider.migrate().await?;
//! # Ok(())
//! # }
//! ```

pub mod migrations;
pub mod repositories;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use warden_core::{Error, error::StorageError};

pub use repositories::{
    SqliteChallengeRepository, SqliteDeviceSessionRepository, SqliteLockoutRepository,
    SqliteRepositoryProvider, SqliteTrustedDeviceRepository,
};

impl SqliteRepositoryProvider {
    /// Open a pool for `database_url`, creating the database file if missing.
    ///
    /// In-memory URLs are limited to one connection: each extra connection
    /// would otherwise see its own empty database.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true);

        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };

        let pool: SqlitePool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to database");
                StorageError::Connection(e.to_string())
            })?;

        Ok(Self::new(pool))
    }
}
