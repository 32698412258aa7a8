use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use warden_core::{
    Error,
    error::{StorageError, utilities::DatabaseResultExt},
    fingerprint::Fingerprint,
    repositories::TrustedDeviceRepository,
    storage::{IdentityId, TrustedDevice},
};

use super::{from_millis, to_millis};

pub struct SqliteTrustedDeviceRepository {
    pool: SqlitePool,
}

impl SqliteTrustedDeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteTrustedDevice {
    identity: String,
    fingerprint: String,
    trusted_at: i64,
}

impl TryFrom<SqliteTrustedDevice> for TrustedDevice {
    type Error = Error;

    fn try_from(row: SqliteTrustedDevice) -> Result<Self, Self::Error> {
        let fingerprint: Fingerprint = row
            .fingerprint
            .parse()
            .map_err(|e| StorageError::Database(format!("Corrupt device fingerprint: {e}")))?;

        Ok(TrustedDevice {
            identity: IdentityId::from(row.identity),
            fingerprint,
            trusted_at: from_millis(row.trusted_at)?,
        })
    }
}

#[async_trait]
impl TrustedDeviceRepository for SqliteTrustedDeviceRepository {
    async fn upsert(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
        trusted_at: DateTime<Utc>,
    ) -> Result<TrustedDevice, Error> {
        // Re-trusting keeps the original trusted_at
        sqlx::query(
            r#"
            INSERT INTO trusted_devices (identity, fingerprint, trusted_at)
            VALUES (?, ?, ?)
            ON CONFLICT (identity, fingerprint) DO NOTHING
            "#,
        )
        .bind(identity.as_str())
        .bind(fingerprint.to_string())
        .bind(to_millis(trusted_at))
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to trust device")?;

        let row = sqlx::query_as::<_, SqliteTrustedDevice>(
            r#"
            SELECT identity, fingerprint, trusted_at
            FROM trusted_devices
            WHERE identity = ? AND fingerprint = ?
            "#,
        )
        .bind(identity.as_str())
        .bind(fingerprint.to_string())
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to load trusted device")?;

        row.try_into()
    }

    async fn is_trusted(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM trusted_devices WHERE identity = ? AND fingerprint = ?)",
        )
        .bind(identity.as_str())
        .bind(fingerprint.to_string())
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to check trusted device")?;

        Ok(exists)
    }

    async fn list(&self, identity: &IdentityId) -> Result<Vec<TrustedDevice>, Error> {
        let rows = sqlx::query_as::<_, SqliteTrustedDevice>(
            r#"
            SELECT identity, fingerprint, trusted_at
            FROM trusted_devices
            WHERE identity = ?
            ORDER BY trusted_at ASC
            "#,
        )
        .bind(identity.as_str())
        .fetch_all(&self.pool)
        .await
        .map_db_err_with_context("Failed to list trusted devices")?;

        rows.into_iter().map(TrustedDevice::try_from).collect()
    }

    async fn remove(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, Error> {
        let result =
            sqlx::query("DELETE FROM trusted_devices WHERE identity = ? AND fingerprint = ?")
                .bind(identity.as_str())
                .bind(fingerprint.to_string())
                .execute(&self.pool)
                .await
                .map_db_err_with_context("Failed to remove trusted device")?;

        Ok(result.rows_affected() > 0)
    }
}
