//! Versioned schema migrations for the SQLite backend.
//!
//! Applied migrations are tracked in `_warden_migrations`. Each migration
//! runs in its own transaction together with its tracking row.
//!
//! Timestamps are stored as integer milliseconds since the Unix epoch.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Database, Sqlite, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[async_trait]
pub trait Migration<DB: Database>: Send + Sync {
    /// Execute the migration
    async fn up<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Rollback the migration
    async fn down<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Unique version number for ordering migrations
    fn version(&self) -> i64;

    /// Human readable name of the migration
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: i64,
}

#[async_trait]
pub trait MigrationManager<DB: Database>: Send + Sync {
    fn get_migration_table_name(&self) -> &str {
        "_warden_migrations"
    }

    /// Initialize migration tracking table
    async fn initialize(&self) -> Result<()>;

    /// Apply pending migrations
    async fn up(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// Rollback migrations
    async fn down(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// Get list of applied migrations
    async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>>;

    /// Check if specific migration was applied
    async fn is_applied(&self, version: i64) -> Result<bool>;
}

/// Every migration of the schema, in version order.
pub fn all() -> Vec<Box<dyn Migration<Sqlite>>> {
    vec![
        Box::new(CreateFailedAttemptsTable),
        Box::new(CreateLockoutsTable),
        Box::new(CreateChallengesTable),
        Box::new(CreateTrustedDevicesTable),
        Box::new(CreateDeviceSessionsTable),
        Box::new(CreateIndexes),
    ]
}

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationManager<Sqlite> for SqliteMigrationManager {
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            format!(
                r#"
            CREATE TABLE IF NOT EXISTS {} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            );"#,
                self.get_migration_table_name()
            )
            .as_str(),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn up(&self, migrations: &[Box<dyn Migration<Sqlite>>]) -> Result<()> {
        for migration in migrations {
            if !self.is_applied(migration.version()).await? {
                let mut tx = self.pool.begin().await?;

                tracing::info!(
                    version = migration.version(),
                    name = migration.name(),
                    "Applying migration"
                );

                migration
                    .up(&mut *tx as &mut <Sqlite as Database>::Connection)
                    .await?;

                sqlx::query(
                    format!(
                        "INSERT INTO {} (version, name, applied_at) VALUES (?, ?, ?)",
                        self.get_migration_table_name()
                    )
                    .as_str(),
                )
                .bind(migration.version())
                .bind(migration.name())
                .bind(Utc::now().timestamp_millis())
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn down(&self, migrations: &[Box<dyn Migration<Sqlite>>]) -> Result<()> {
        for migration in migrations.iter().rev() {
            if self.is_applied(migration.version()).await? {
                let mut tx = self.pool.begin().await?;

                tracing::info!(
                    version = migration.version(),
                    name = migration.name(),
                    "Rolling back migration"
                );

                migration
                    .down(&mut *tx as &mut <Sqlite as Database>::Connection)
                    .await?;

                sqlx::query(
                    format!(
                        "DELETE FROM {} WHERE version = ?",
                        self.get_migration_table_name()
                    )
                    .as_str(),
                )
                .bind(migration.version())
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>> {
        let records = sqlx::query_as::<_, MigrationRecord>(
            format!(
                "SELECT version, name, applied_at FROM {} ORDER BY version",
                self.get_migration_table_name()
            )
            .as_str(),
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn is_applied(&self, version: i64) -> Result<bool> {
        let result: bool = sqlx::query_scalar(
            format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE version = ?)",
                self.get_migration_table_name()
            )
            .as_str(),
        )
        .bind(version)
        .fetch_one(&self.pool)
        .await?;
        Ok(result)
    }
}

pub struct CreateFailedAttemptsTable;

#[async_trait]
impl Migration<Sqlite> for CreateFailedAttemptsTable {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &str {
        "CreateFailedAttemptsTable"
    }

    async fn up<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS failed_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identifier TEXT NOT NULL,
                reason TEXT NOT NULL,
                attempted_at INTEGER NOT NULL
            );"#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS failed_attempts")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateLockoutsTable;

#[async_trait]
impl Migration<Sqlite> for CreateLockoutsTable {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &str {
        "CreateLockoutsTable"
    }

    async fn up<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lockouts (
                id TEXT PRIMARY KEY,
                identifier TEXT NOT NULL,
                reason TEXT NOT NULL,
                failed_attempts INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                unlock_at INTEGER NOT NULL,
                is_manually_unlocked INTEGER NOT NULL DEFAULT 0,
                unlocked_at INTEGER,
                unlocked_by TEXT
            );"#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS lockouts")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateChallengesTable;

#[async_trait]
impl Migration<Sqlite> for CreateChallengesTable {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "CreateChallengesTable"
    }

    async fn up<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS challenges (
                token_hash TEXT PRIMARY KEY,
                identity TEXT NOT NULL,
                destination TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                code_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                last_sent_at INTEGER NOT NULL,
                verified_at INTEGER,
                failed_attempts INTEGER NOT NULL DEFAULT 0
            );"#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS challenges")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateTrustedDevicesTable;

#[async_trait]
impl Migration<Sqlite> for CreateTrustedDevicesTable {
    fn version(&self) -> i64 {
        4
    }

    fn name(&self) -> &str {
        "CreateTrustedDevicesTable"
    }

    async fn up<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trusted_devices (
                identity TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                trusted_at INTEGER NOT NULL,
                UNIQUE(identity, fingerprint)
            );"#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS trusted_devices")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateDeviceSessionsTable;

#[async_trait]
impl Migration<Sqlite> for CreateDeviceSessionsTable {
    fn version(&self) -> i64 {
        5
    }

    fn name(&self) -> &str {
        "CreateDeviceSessionsTable"
    }

    async fn up<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_sessions (
                id TEXT PRIMARY KEY,
                identity TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                user_agent TEXT,
                is_trusted INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                last_active_at INTEGER NOT NULL,
                revoked_at INTEGER
            );"#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS device_sessions")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateIndexes;

const INDEXES: [&str; 6] = [
    "idx_failed_attempts_identifier_time",
    "idx_failed_attempts_time",
    "idx_lockouts_identifier",
    "idx_challenges_identity",
    "idx_challenges_expires_at",
    "idx_device_sessions_identity",
];

#[async_trait]
impl Migration<Sqlite> for CreateIndexes {
    fn version(&self) -> i64 {
        6
    }

    fn name(&self) -> &str {
        "CreateIndexes"
    }

    async fn up<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_failed_attempts_identifier_time ON failed_attempts(identifier, attempted_at)",
            "CREATE INDEX IF NOT EXISTS idx_failed_attempts_time ON failed_attempts(attempted_at)",
            "CREATE INDEX IF NOT EXISTS idx_lockouts_identifier ON lockouts(identifier, unlock_at)",
            "CREATE INDEX IF NOT EXISTS idx_challenges_identity ON challenges(identity)",
            "CREATE INDEX IF NOT EXISTS idx_challenges_expires_at ON challenges(expires_at)",
            "CREATE INDEX IF NOT EXISTS idx_device_sessions_identity ON device_sessions(identity)",
        ] {
            sqlx::query(statement).execute(&mut *conn).await?;
        }
        Ok(())
    }

    async fn down<'a>(&'a self, conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
        for index in INDEXES {
            sqlx::query(&format!("DROP INDEX IF EXISTS {index}"))
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}
