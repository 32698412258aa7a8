//! Builder pattern for constructing Warden instances
//!
//! This module provides a type-safe builder for creating [`Warden`] instances with
//! compile-time validation of storage configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden::{WardenBuilder, WardenConfig};
//! # use warden::{CredentialError, CredentialVerifier, VerifiedIdentity};
//! # struct MyVerifier;
//! # #[async_trait::async_trait]
//! # impl CredentialVerifier for MyVerifier {
//! #     async fn verify(&self, _: &str, _: &str) -> Result<Option<VerifiedIdentity>, CredentialError> {
//! #         Ok(None)
//! #     }
//! # }
//! # use warden::{Notification, Notifier, NotifierError};
//! # struct MyMailer;
//! # #[async_trait::async_trait]
//! # impl Notifier for MyMailer {
//! #     async fn send(&self, _: &str, _: &Notification) -> Result<(), NotifierError> {
//! #         Ok(())
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warden = WardenBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .with_verifier(Arc::new(MyVerifier))
//!         .with_notifier(Arc::new(MyMailer))
//!         .with_config(WardenConfig::from_env()?)
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use warden_core::{error::utilities::RequiredFieldExt, repositories::RepositoryProvider};

use crate::{
    ChallengePolicy, Clock, CredentialVerifier, LockoutPolicy, Notifier, SystemClock, Warden,
    WardenConfig,
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when building a Warden instance.
#[derive(Debug, thiserror::Error)]
pub enum WardenBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

// ============================================================================
// Type-State Markers
// ============================================================================

/// Marker type indicating no storage has been configured yet.
///
/// This is the initial state of [`WardenBuilder`].
pub struct NoStorage;

/// Marker type indicating storage has been configured.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

// ============================================================================
// Builder Implementation
// ============================================================================

/// A type-safe builder for constructing [`Warden`] instances.
///
/// Storage must be configured before `build` is available. A credential
/// verifier and a notifier are required as well; building without either is
/// an [`WardenBuilderError::InvalidConfiguration`].
///
/// # Type States
///
/// - [`NoStorage`]: Initial state, storage must be configured
/// - [`WithStorage<R>`]: Storage configured, ready to build or add more configuration
pub struct WardenBuilder<Storage> {
    storage: Storage,
    config: WardenConfig,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Arc<dyn Clock>,
    apply_migrations: bool,
}

impl Default for WardenBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl WardenBuilder<NoStorage> {
    /// Create a new builder with default configuration.
    ///
    /// # Defaults
    ///
    /// - Lockout: 5 failures within an hour lock for 30 minutes
    /// - Challenge: 15 minute codes, 60 second resend cooldown, 5 tries per code
    /// - Clock: [`SystemClock`]
    /// - Apply migrations: false
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            config: WardenConfig::default(),
            verifier: None,
            notifier: None,
            clock: Arc::new(SystemClock),
            apply_migrations: false,
        }
    }

    /// Use any repository provider, e.g. the in-memory one.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> WardenBuilder<WithStorage<R>> {
        WardenBuilder {
            storage: WithStorage { repositories },
            config: self.config,
            verifier: self.verifier,
            notifier: self.notifier,
            clock: self.clock,
            apply_migrations: self.apply_migrations,
        }
    }
}

// ============================================================================
// Storage Configuration Methods (NoStorage -> WithStorage)
// ============================================================================

#[cfg(feature = "sqlite")]
impl WardenBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/db.sqlite")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<WardenBuilder<WithStorage<crate::sqlite::SqliteRepositoryProvider>>, WardenBuilderError>
    {
        let repositories = crate::sqlite::SqliteRepositoryProvider::connect(url)
            .await
            .map_err(|e| WardenBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_repositories(Arc::new(repositories)))
    }

    /// Configure SQLite storage with an existing connection pool.
    ///
    /// Use this when you already have a SQLite connection pool and want to
    /// share it with Warden.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> WardenBuilder<WithStorage<crate::sqlite::SqliteRepositoryProvider>> {
        let repositories = Arc::new(crate::sqlite::SqliteRepositoryProvider::new(pool));
        self.with_repositories(repositories)
    }
}

// ============================================================================
// Configuration Methods (available in any state)
// ============================================================================

impl<Storage> WardenBuilder<Storage> {
    /// Replace the whole configuration.
    pub fn with_config(mut self, config: WardenConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_lockout_policy(mut self, policy: LockoutPolicy) -> Self {
        self.config.lockout = policy;
        self
    }

    pub fn with_challenge_policy(mut self, policy: ChallengePolicy) -> Self {
        self.config.challenge = policy;
        self
    }

    /// The credential check for identifier and secret. Required.
    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Where verification codes and lockout alerts are sent. Required.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Override the time source. Tests use a [`crate::ManualClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set whether to automatically apply database migrations during build.
    ///
    /// Default: false
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }
}

impl<R: RepositoryProvider> WardenBuilder<WithStorage<R>> {
    /// Build the Warden instance.
    ///
    /// Validates the configuration, requires a verifier and a notifier and, if
    /// `apply_migrations(true)` was called, migrates the store.
    pub async fn build(self) -> Result<Warden<R>, WardenBuilderError> {
        self.config
            .validate()
            .map_err(|e| WardenBuilderError::InvalidConfiguration(e.to_string()))?;

        let verifier = self
            .verifier
            .require_field("Credential verifier")
            .map_err(|e| WardenBuilderError::InvalidConfiguration(e.to_string()))?;

        let notifier = self
            .notifier
            .require_field("Notifier")
            .map_err(|e| WardenBuilderError::InvalidConfiguration(e.to_string()))?;

        if self.apply_migrations {
            self.storage
                .repositories
                .migrate()
                .await
                .map_err(|e| WardenBuilderError::Migration(e.to_string()))?;
        }

        Ok(Warden::from_parts(
            self.storage.repositories,
            verifier,
            notifier,
            self.config,
            self.clock,
        ))
    }
}
