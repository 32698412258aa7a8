use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use warden_core::{
    Error,
    error::StorageError,
    fingerprint::Fingerprint,
    repositories::ChallengeRepository,
    storage::{Challenge, IdentityId},
};

use super::{from_millis, to_millis};

const CHALLENGE_COLUMNS: &str = "token_hash, identity, destination, fingerprint, code_hash, \
     created_at, expires_at, last_sent_at, verified_at, failed_attempts";

pub struct SqliteChallengeRepository {
    pool: SqlitePool,
}

impl SqliteChallengeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteChallenge {
    token_hash: String,
    identity: String,
    destination: String,
    fingerprint: String,
    code_hash: String,
    created_at: i64,
    expires_at: i64,
    last_sent_at: i64,
    verified_at: Option<i64>,
    failed_attempts: i64,
}

impl TryFrom<SqliteChallenge> for Challenge {
    type Error = Error;

    fn try_from(row: SqliteChallenge) -> Result<Self, Self::Error> {
        let fingerprint: Fingerprint = row.fingerprint.parse().map_err(|e| {
            StorageError::Database(format!("Corrupt challenge fingerprint: {e}"))
        })?;

        Ok(Challenge {
            token_hash: row.token_hash,
            identity: IdentityId::from(row.identity),
            destination: row.destination,
            fingerprint,
            code_hash: row.code_hash,
            created_at: from_millis(row.created_at)?,
            expires_at: from_millis(row.expires_at)?,
            last_sent_at: from_millis(row.last_sent_at)?,
            verified_at: row.verified_at.map(from_millis).transpose()?,
            failed_attempts: row.failed_attempts as u32,
        })
    }
}

fn into_challenge(row: Option<SqliteChallenge>) -> Result<Option<Challenge>, Error> {
    row.map(Challenge::try_from).transpose()
}

#[async_trait]
impl ChallengeRepository for SqliteChallengeRepository {
    async fn create(&self, challenge: Challenge) -> Result<Challenge, Error> {
        let row = sqlx::query_as::<_, SqliteChallenge>(&format!(
            r#"
            INSERT INTO challenges (token_hash, identity, destination, fingerprint, code_hash,
                                    created_at, expires_at, last_sent_at, verified_at, failed_attempts)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {CHALLENGE_COLUMNS}
            "#
        ))
        .bind(&challenge.token_hash)
        .bind(challenge.identity.as_str())
        .bind(&challenge.destination)
        .bind(challenge.fingerprint.to_string())
        .bind(&challenge.code_hash)
        .bind(to_millis(challenge.created_at))
        .bind(to_millis(challenge.expires_at))
        .bind(to_millis(challenge.last_sent_at))
        .bind(challenge.verified_at.map(to_millis))
        .bind(challenge.failed_attempts as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Constraint("challenge token already exists".to_string())
            }
            e => {
                tracing::error!(error = %e, "Failed to create challenge");
                StorageError::Database("Failed to create challenge".to_string())
            }
        })?;

        row.try_into()
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Challenge>, Error> {
        let row = sqlx::query_as::<_, SqliteChallenge>(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE token_hash = ?"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to find challenge");
            StorageError::Database("Failed to find challenge".to_string())
        })?;

        into_challenge(row)
    }

    async fn replace_code(
        &self,
        token_hash: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        sent_before: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<Challenge>, Error> {
        let now = to_millis(now);
        let row = sqlx::query_as::<_, SqliteChallenge>(&format!(
            r#"
            UPDATE challenges
            SET code_hash = ?, expires_at = ?, last_sent_at = ?
            WHERE token_hash = ?
              AND verified_at IS NULL
              AND expires_at > ?
              AND (? = 0 OR failed_attempts < ?)
              AND last_sent_at <= ?
            RETURNING {CHALLENGE_COLUMNS}
            "#
        ))
        .bind(code_hash)
        .bind(to_millis(expires_at))
        .bind(now)
        .bind(token_hash)
        .bind(now)
        .bind(max_attempts as i64)
        .bind(max_attempts as i64)
        .bind(to_millis(sent_before))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to replace challenge code");
            StorageError::Database("Failed to replace challenge code".to_string())
        })?;

        into_challenge(row)
    }

    async fn mark_verified(
        &self,
        token_hash: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<Challenge>, Error> {
        let now = to_millis(now);
        // The conditional update is the single-use guarantee: of two racing
        // verifications only one can see verified_at IS NULL.
        let row = sqlx::query_as::<_, SqliteChallenge>(&format!(
            r#"
            UPDATE challenges
            SET verified_at = ?
            WHERE token_hash = ?
              AND verified_at IS NULL
              AND code_hash = ?
              AND expires_at > ?
              AND (? = 0 OR failed_attempts < ?)
            RETURNING {CHALLENGE_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(token_hash)
        .bind(code_hash)
        .bind(now)
        .bind(max_attempts as i64)
        .bind(max_attempts as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to verify challenge");
            StorageError::Database("Failed to verify challenge".to_string())
        })?;

        into_challenge(row)
    }

    async fn record_failed_verification(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<u32>, Error> {
        let failures: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE challenges
            SET failed_attempts = failed_attempts + 1
            WHERE token_hash = ?
              AND verified_at IS NULL
              AND expires_at > ?
              AND (? = 0 OR failed_attempts < ?)
            RETURNING failed_attempts
            "#,
        )
        .bind(token_hash)
        .bind(to_millis(now))
        .bind(max_attempts as i64)
        .bind(max_attempts as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to record failed verification");
            StorageError::Database("Failed to record failed verification".to_string())
        })?;

        Ok(failures.map(|n| n as u32))
    }

    async fn list_for_identity(&self, identity: &IdentityId) -> Result<Vec<Challenge>, Error> {
        let rows = sqlx::query_as::<_, SqliteChallenge>(&format!(
            r#"
            SELECT {CHALLENGE_COLUMNS}
            FROM challenges
            WHERE identity = ?
            ORDER BY created_at DESC
            "#
        ))
        .bind(identity.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list challenges");
            StorageError::Database("Failed to list challenges".to_string())
        })?;

        rows.into_iter().map(Challenge::try_from).collect()
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM challenges WHERE expires_at < ?")
            .bind(to_millis(before))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to cleanup expired challenges");
                StorageError::Database("Failed to cleanup expired challenges".to_string())
            })?;

        Ok(result.rows_affected())
    }
}
