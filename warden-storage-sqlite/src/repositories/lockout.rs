//! SQLite implementation of the attempt ledger and lockout repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use warden_core::{
    Error,
    error::StorageError,
    repositories::LockoutRepository,
    storage::{AttemptStats, FailedAttempt, FailureReason, Lockout, NewLockout},
};

use super::{from_millis, to_millis};

const LOCKOUT_COLUMNS: &str = "id, identifier, reason, failed_attempts, created_at, unlock_at, \
     is_manually_unlocked, unlocked_at, unlocked_by";

/// SQLite repository for failed attempts and lockouts.
pub struct SqliteLockoutRepository {
    pool: SqlitePool,
}

impl SqliteLockoutRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteFailedAttempt {
    id: i64,
    identifier: String,
    reason: String,
    attempted_at: i64,
}

impl TryFrom<SqliteFailedAttempt> for FailedAttempt {
    type Error = Error;

    fn try_from(row: SqliteFailedAttempt) -> Result<Self, Self::Error> {
        Ok(FailedAttempt {
            id: row.id,
            identifier: row.identifier,
            reason: FailureReason::from(row.reason.as_str()),
            attempted_at: from_millis(row.attempted_at)?,
        })
    }
}

/// Internal struct for attempt stats query
#[derive(Debug, sqlx::FromRow)]
struct SqliteAttemptStats {
    count: i64,
    latest_at: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteLockout {
    id: String,
    identifier: String,
    reason: String,
    failed_attempts: i64,
    created_at: i64,
    unlock_at: i64,
    is_manually_unlocked: bool,
    unlocked_at: Option<i64>,
    unlocked_by: Option<String>,
}

impl TryFrom<SqliteLockout> for Lockout {
    type Error = Error;

    fn try_from(row: SqliteLockout) -> Result<Self, Self::Error> {
        Ok(Lockout {
            id: row.id,
            identifier: row.identifier,
            reason: row.reason,
            failed_attempts: row.failed_attempts as u32,
            created_at: from_millis(row.created_at)?,
            unlock_at: from_millis(row.unlock_at)?,
            is_manually_unlocked: row.is_manually_unlocked,
            unlocked_at: row.unlocked_at.map(from_millis).transpose()?,
            unlocked_by: row.unlocked_by,
        })
    }
}

#[async_trait]
impl LockoutRepository for SqliteLockoutRepository {
    async fn record_failure(
        &self,
        identifier: &str,
        reason: &FailureReason,
        attempted_at: DateTime<Utc>,
    ) -> Result<FailedAttempt, Error> {
        let row = sqlx::query_as::<_, SqliteFailedAttempt>(
            r#"
            INSERT INTO failed_attempts (identifier, reason, attempted_at)
            VALUES (?, ?, ?)
            RETURNING id, identifier, reason, attempted_at
            "#,
        )
        .bind(identifier)
        .bind(reason.as_str())
        .bind(to_millis(attempted_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to record failed attempt");
            StorageError::Database("Failed to record failed attempt".to_string())
        })?;

        row.try_into()
    }

    async fn get_attempt_stats(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error> {
        let row = sqlx::query_as::<_, SqliteAttemptStats>(
            r#"
            SELECT
                COUNT(*) as count,
                MAX(attempted_at) as latest_at
            FROM failed_attempts
            WHERE identifier = ? AND attempted_at >= ?
            "#,
        )
        .bind(identifier)
        .bind(to_millis(since))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get attempt stats");
            StorageError::Database("Failed to get attempt stats".to_string())
        })?;

        Ok(AttemptStats {
            count: row.count as u32,
            latest_at: row.latest_at.map(from_millis).transpose()?,
        })
    }

    async fn create_lockout_if_none_active(
        &self,
        lockout: NewLockout,
    ) -> Result<(Lockout, bool), Error> {
        // A single statement: SQLite serializes writers, so the existence
        // check and the insert cannot interleave with another crossing.
        let created = sqlx::query_as::<_, SqliteLockout>(&format!(
            r#"
            INSERT INTO lockouts (id, identifier, reason, failed_attempts, created_at, unlock_at)
            SELECT ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM lockouts
                WHERE identifier = ? AND is_manually_unlocked = 0 AND unlock_at > ?
            )
            RETURNING {LOCKOUT_COLUMNS}
            "#
        ))
        .bind(&lockout.id)
        .bind(&lockout.identifier)
        .bind(&lockout.reason)
        .bind(lockout.failed_attempts as i64)
        .bind(to_millis(lockout.created_at))
        .bind(to_millis(lockout.unlock_at))
        .bind(&lockout.identifier)
        .bind(to_millis(lockout.created_at))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create lockout");
            StorageError::Database("Failed to create lockout".to_string())
        })?;

        if let Some(row) = created {
            return Ok((row.try_into()?, true));
        }

        match self
            .find_active_lockout(&lockout.identifier, lockout.created_at)
            .await?
        {
            Some(existing) => Ok((existing, false)),
            // The blocking lockout was released between the two statements.
            None => Err(StorageError::Constraint(
                "Lockout changed concurrently, retry".to_string(),
            )
            .into()),
        }
    }

    async fn find_active_lockout(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Lockout>, Error> {
        let row = sqlx::query_as::<_, SqliteLockout>(&format!(
            r#"
            SELECT {LOCKOUT_COLUMNS}
            FROM lockouts
            WHERE identifier = ? AND is_manually_unlocked = 0 AND unlock_at > ?
            ORDER BY unlock_at DESC
            LIMIT 1
            "#
        ))
        .bind(identifier)
        .bind(to_millis(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to find active lockout");
            StorageError::Database("Failed to find active lockout".to_string())
        })?;

        row.map(Lockout::try_from).transpose()
    }

    async fn find_latest_lockout(&self, identifier: &str) -> Result<Option<Lockout>, Error> {
        let row = sqlx::query_as::<_, SqliteLockout>(&format!(
            r#"
            SELECT {LOCKOUT_COLUMNS}
            FROM lockouts
            WHERE identifier = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to find latest lockout");
            StorageError::Database("Failed to find latest lockout".to_string())
        })?;

        row.map(Lockout::try_from).transpose()
    }

    async fn manual_unlock(
        &self,
        identifier: &str,
        unlocked_by: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE lockouts
            SET is_manually_unlocked = 1, unlocked_at = ?, unlocked_by = ?
            WHERE identifier = ? AND is_manually_unlocked = 0 AND unlock_at > ?
            "#,
        )
        .bind(to_millis(now))
        .bind(unlocked_by)
        .bind(identifier)
        .bind(to_millis(now))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to unlock account");
            StorageError::Database("Failed to unlock account".to_string())
        })?;

        Ok(result.rows_affected())
    }

    async fn list_lockouts(&self, identifier: &str) -> Result<Vec<Lockout>, Error> {
        let rows = sqlx::query_as::<_, SqliteLockout>(&format!(
            r#"
            SELECT {LOCKOUT_COLUMNS}
            FROM lockouts
            WHERE identifier = ?
            ORDER BY created_at DESC
            "#
        ))
        .bind(identifier)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list lockouts");
            StorageError::Database("Failed to list lockouts".to_string())
        })?;

        rows.into_iter().map(Lockout::try_from).collect()
    }

    async fn list_active_lockouts(&self, now: DateTime<Utc>) -> Result<Vec<Lockout>, Error> {
        let rows = sqlx::query_as::<_, SqliteLockout>(&format!(
            r#"
            SELECT {LOCKOUT_COLUMNS}
            FROM lockouts
            WHERE is_manually_unlocked = 0 AND unlock_at > ?
            ORDER BY unlock_at ASC
            "#
        ))
        .bind(to_millis(now))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list active lockouts");
            StorageError::Database("Failed to list active lockouts".to_string())
        })?;

        rows.into_iter().map(Lockout::try_from).collect()
    }

    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM failed_attempts WHERE attempted_at < ?")
            .bind(to_millis(before))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to cleanup old attempts");
                StorageError::Database("Failed to cleanup old attempts".to_string())
            })?;

        Ok(result.rows_affected())
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

    #[tokio::test]
    async fn test_corrupt_unlock_time_is_an_error_not_an_unlock() {
        let pool = setup_test_db().await;
        sqlx::query(
            "INSERT INTO lockouts (id, identifier, reason, failed_attempts, created_at, unlock_at) \
             VALUES ('l1', 'bob@x.com', 'too many failures', 5, ?, ?)",
        )
        .bind(to_millis(t0()))
        .bind(i64::MAX)
        .execute(&pool)
        .await
        .unwrap();
        let repo = SqliteLockoutRepository::new(pool);

        assert!(matches!(
            repo.find_active_lockout("bob@x.com", t0()).await,
            Err(Error::Storage(StorageError::Database(_)))
        ));
    }

    #[tokio::test]
    async fn test_record_failure_and_stats() {
        let repo = SqliteLockoutRepository::new(setup_test_db().await);

        let attempt = repo
            .record_failure("bob@x.com", &FailureReason::InvalidCredentials, t0())
            .await
            .unwrap();
        assert!(attempt.id > 0);
        assert_eq!(attempt.reason, FailureReason::InvalidCredentials);
        assert_eq!(attempt.attempted_at, t0());

        for minutes in [10, 20] {
            repo.record_failure(
                "bob@x.com",
                &FailureReason::InvalidCredentials,
                t0() + Duration::minutes(minutes),
            )
            .await
            .unwrap();
        }

        let stats = repo
            .get_attempt_stats("bob@x.com", t0() + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.latest_at, Some(t0() + Duration::minutes(20)));

        let empty = repo.get_attempt_stats("eve@x.com", t0()).await.unwrap();
        assert_eq!(empty, AttemptStats::default());
    }

    #[tokio::test]
    async fn test_second_lockout_while_active_is_not_created() {
        let repo = SqliteLockoutRepository::new(setup_test_db().await);

        let (first, created) = repo
            .create_lockout_if_none_active(NewLockout::new(
                "bob@x.com",
                5,
                t0(),
                Duration::minutes(30),
            ))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(first.unlock_at, t0() + Duration::minutes(30));

        let (second, created) = repo
            .create_lockout_if_none_active(NewLockout::new(
                "bob@x.com",
                6,
                t0() + Duration::minutes(1),
                Duration::minutes(30),
            ))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);

        // After expiry a new episode may lock again
        let (third, created) = repo
            .create_lockout_if_none_active(NewLockout::new(
                "bob@x.com",
                5,
                t0() + Duration::minutes(30),
                Duration::minutes(30),
            ))
            .await
            .unwrap();
        assert!(created);
        assert_ne!(third.id, first.id);

        let history = repo.list_lockouts("bob@x.com").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, third.id);
    }

    #[tokio::test]
    async fn test_manual_unlock_records_audit_trail() {
        let repo = SqliteLockoutRepository::new(setup_test_db().await);
        repo.create_lockout_if_none_active(NewLockout::new(
            "bob@x.com",
            5,
            t0(),
            Duration::minutes(30),
        ))
        .await
        .unwrap();

        let now = t0() + Duration::minutes(5);
        assert_eq!(repo.list_active_lockouts(now).await.unwrap().len(), 1);
        assert_eq!(repo.manual_unlock("bob@x.com", "admin", now).await.unwrap(), 1);
        assert_eq!(repo.manual_unlock("bob@x.com", "admin", now).await.unwrap(), 0);

        assert!(repo.find_active_lockout("bob@x.com", now).await.unwrap().is_none());
        assert!(repo.list_active_lockouts(now).await.unwrap().is_empty());

        let latest = repo.find_latest_lockout("bob@x.com").await.unwrap().unwrap();
        assert!(latest.is_manually_unlocked);
        assert_eq!(latest.unlocked_at, Some(now));
        assert_eq!(latest.unlocked_by.as_deref(), Some("admin"));
        assert_eq!(latest.released_at(), now);
    }

    #[tokio::test]
    async fn test_cleanup_old_attempts_keeps_lockouts() {
        let repo = SqliteLockoutRepository::new(setup_test_db().await);
        repo.record_failure("bob@x.com", &FailureReason::InvalidCredentials, t0())
            .await
            .unwrap();
        repo.record_failure(
            "bob@x.com",
            &FailureReason::Other("verifier_rejected".to_string()),
            t0() + Duration::days(40),
        )
        .await
        .unwrap();
        repo.create_lockout_if_none_active(NewLockout::new(
            "bob@x.com",
            5,
            t0(),
            Duration::minutes(30),
        ))
        .await
        .unwrap();

        let deleted = repo
            .cleanup_old_attempts(t0() + Duration::days(10))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.get_attempt_stats("bob@x.com", t0()).await.unwrap().count, 1);
        assert_eq!(repo.list_lockouts("bob@x.com").await.unwrap().len(), 1);
    }
}
