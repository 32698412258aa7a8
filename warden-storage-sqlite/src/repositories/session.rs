use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use warden_core::{
    Error,
    error::{StorageError, utilities::DatabaseResultExt},
    fingerprint::Fingerprint,
    repositories::DeviceSessionRepository,
    storage::{DeviceSession, IdentityId, SessionId},
};

use super::{from_millis, to_millis};

const SESSION_COLUMNS: &str =
    "id, identity, fingerprint, user_agent, is_trusted, created_at, last_active_at, revoked_at";

pub struct SqliteDeviceSessionRepository {
    pool: SqlitePool,
}

impl SqliteDeviceSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteDeviceSession {
    id: String,
    identity: String,
    fingerprint: String,
    user_agent: Option<String>,
    is_trusted: bool,
    created_at: i64,
    last_active_at: i64,
    revoked_at: Option<i64>,
}

impl TryFrom<SqliteDeviceSession> for DeviceSession {
    type Error = Error;

    fn try_from(row: SqliteDeviceSession) -> Result<Self, Self::Error> {
        let fingerprint: Fingerprint = row
            .fingerprint
            .parse()
            .map_err(|e| StorageError::Database(format!("Corrupt session fingerprint: {e}")))?;

        Ok(DeviceSession {
            id: SessionId::from(row.id),
            identity: IdentityId::from(row.identity),
            fingerprint,
            user_agent: row.user_agent,
            is_trusted: row.is_trusted,
            created_at: from_millis(row.created_at)?,
            last_active_at: from_millis(row.last_active_at)?,
            revoked_at: row.revoked_at.map(from_millis).transpose()?,
        })
    }
}

#[async_trait]
impl DeviceSessionRepository for SqliteDeviceSessionRepository {
    async fn create(&self, session: DeviceSession) -> Result<DeviceSession, Error> {
        let row = sqlx::query_as::<_, SqliteDeviceSession>(&format!(
            r#"
            INSERT INTO device_sessions (id, identity, fingerprint, user_agent, is_trusted,
                                         created_at, last_active_at, revoked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.id.as_str())
        .bind(session.identity.as_str())
        .bind(session.fingerprint.to_string())
        .bind(&session.user_agent)
        .bind(session.is_trusted)
        .bind(to_millis(session.created_at))
        .bind(to_millis(session.last_active_at))
        .bind(session.revoked_at.map(to_millis))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Storage(StorageError::Constraint("session id already exists".to_string()))
            }
            e => Error::Storage(StorageError::Database(format!(
                "Failed to create session: {e}"
            ))),
        })?;

        row.try_into()
    }

    async fn find(&self, id: &SessionId) -> Result<Option<DeviceSession>, Error> {
        let row = sqlx::query_as::<_, SqliteDeviceSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM device_sessions WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to find session")?;

        row.map(DeviceSession::try_from).transpose()
    }

    async fn has_any(&self, identity: &IdentityId) -> Result<bool, Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM device_sessions WHERE identity = ?)",
        )
        .bind(identity.as_str())
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to check sessions")?;

        Ok(exists)
    }

    async fn list(&self, identity: &IdentityId) -> Result<Vec<DeviceSession>, Error> {
        let rows = sqlx::query_as::<_, SqliteDeviceSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM device_sessions
            WHERE identity = ?
            ORDER BY last_active_at DESC
            "#
        ))
        .bind(identity.as_str())
        .fetch_all(&self.pool)
        .await
        .map_db_err_with_context("Failed to list sessions")?;

        rows.into_iter().map(DeviceSession::try_from).collect()
    }

    async fn revoke(
        &self,
        identity: &IdentityId,
        id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE device_sessions
            SET revoked_at = ?
            WHERE id = ? AND identity = ? AND revoked_at IS NULL
            "#,
        )
        .bind(to_millis(now))
        .bind(id.as_str())
        .bind(identity.as_str())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to revoke session")?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_except(
        &self,
        identity: &IdentityId,
        keep: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE device_sessions
            SET revoked_at = ?
            WHERE identity = ? AND id != ? AND revoked_at IS NULL
            "#,
        )
        .bind(to_millis(now))
        .bind(identity.as_str())
        .bind(keep.as_str())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to revoke sessions")?;

        Ok(result.rows_affected())
    }

    async fn touch(&self, id: &SessionId, now: DateTime<Utc>) -> Result<bool, Error> {
        let result = sqlx::query(
            "UPDATE device_sessions SET last_active_at = ? WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(to_millis(now))
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to touch session")?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::tests::setup_test_db;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn session(identity: &str, created_at: DateTime<Utc>) -> DeviceSession {
        DeviceSession {
            id: SessionId::new_random(),
            identity: IdentityId::new(identity),
            fingerprint: "Firefox/Linux/Desktop".parse().unwrap(),
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/125.0".to_string()),
            is_trusted: true,
            created_at,
            last_active_at: created_at,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_find_and_has_any() {
        let repo = SqliteDeviceSessionRepository::new(setup_test_db().await);
        let identity = IdentityId::new("u1");
        assert!(!repo.has_any(&identity).await.unwrap());

        let created = repo.create(session("u1", t0())).await.unwrap();
        assert!(repo.has_any(&identity).await.unwrap());
        assert_eq!(repo.find(&created.id).await.unwrap(), Some(created.clone()));

        let duplicate = repo.create(created.clone()).await;
        assert!(matches!(
            duplicate,
            Err(Error::Storage(StorageError::Constraint(_)))
        ));

        // Revoked sessions still count as history
        repo.revoke(&identity, &created.id, t0()).await.unwrap();
        assert!(repo.has_any(&identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_is_scoped_to_identity() {
        let repo = SqliteDeviceSessionRepository::new(setup_test_db().await);
        let created = repo.create(session("u1", t0())).await.unwrap();

        let later = t0() + Duration::minutes(1);
        assert!(
            !repo
                .revoke(&IdentityId::new("u2"), &created.id, later)
                .await
                .unwrap()
        );
        assert!(
            repo.revoke(&IdentityId::new("u1"), &created.id, later)
                .await
                .unwrap()
        );
        assert!(
            !repo
                .revoke(&IdentityId::new("u1"), &created.id, later)
                .await
                .unwrap()
        );

        let found = repo.find(&created.id).await.unwrap().unwrap();
        assert_eq!(found.revoked_at, Some(later));
        assert!(!repo.touch(&created.id, later).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_orders_by_activity_and_revoke_others() {
        let repo = SqliteDeviceSessionRepository::new(setup_test_db().await);
        let identity = IdentityId::new("u1");
        let old = repo.create(session("u1", t0())).await.unwrap();
        let current = repo
            .create(session("u1", t0() + Duration::hours(1)))
            .await
            .unwrap();
        repo.create(session("u2", t0())).await.unwrap();

        assert!(
            repo.touch(&old.id, t0() + Duration::hours(2))
                .await
                .unwrap()
        );
        let listed = repo.list(&identity).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, old.id);

        assert_eq!(
            repo.revoke_all_except(&identity, &current.id, t0() + Duration::hours(3))
                .await
                .unwrap(),
            1
        );
        assert!(repo.find(&current.id).await.unwrap().unwrap().is_active());
        assert!(!repo.find(&old.id).await.unwrap().unwrap().is_active());
        assert!(repo.has_any(&IdentityId::new("u2")).await.unwrap());
    }
}
