//! # Warden
//!
//! Warden protects the login flow of a Rust application against account
//! abuse. It sits between your credential check and your session layer and
//! decides, for every attempt, whether to allow it, refuse it, or ask the
//! user to prove ownership of their email address first.
//!
//! - Failed logins are recorded and an identifier is locked for a while once
//!   too many failures land inside a sliding window.
//! - Every device is reduced to a coarse fingerprint (browser, OS, device
//!   class). The first device an identity logs in from is trusted.
//! - Logins from any other device must enter a one-time code sent by email
//!   before they are allowed. A verified device is trusted from then on.
//!
//! Password storage and email delivery stay with the application: implement
//! [`CredentialVerifier`] and [`Notifier`] and hand them to the builder.
//!
//! ## Storage Support
//!
//! - SQLite (feature `sqlite`, enabled by default)
//! - In-memory, for tests and single-process tools
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden::{DeviceSignals, LoginOutcome, WardenBuilder};
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
//!         .with_sqlite("sqlite://warden.db?mode=rwc")
//!         .await?
//!         .with_verifier(Arc::new(MyVerifier))
//!         .with_notifier(Arc::new(MyMailer))
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     let signals = DeviceSignals::from_user_agent("Mozilla/5.0 (Windows NT 10.0) Chrome/124.0");
//!     match warden.attempt_login("bob@example.com", "hunter2", &signals).await? {
//!         LoginOutcome::Allowed { session, .. } => println!("welcome, session {}", session.id),
//!         outcome => println!("{}", outcome.message()),
//!     }
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use warden_core::{
    Error,
    repositories::{
        ChallengeRepositoryAdapter, DeviceSessionRepositoryAdapter, LockoutRepositoryAdapter,
        RepositoryProvider, TrustedDeviceRepositoryAdapter,
    },
    services::{ChallengeService, DeviceTrustService, LockoutService, LoginService, SessionRegistry},
};

pub mod builder;

pub use builder::{NoStorage, WardenBuilder, WardenBuilderError, WithStorage};

/// Re-export core types from warden_core
///
/// These types are commonly used when working with the Warden API.
pub use warden_core::{
    ChallengePolicy, ChallengeToken, Clock, CredentialError, CredentialVerifier, DeviceSession,
    DeviceSignals, Event, EventHandler, Fingerprint, IdentityId, Lockout, LockoutPolicy,
    LockoutStatus, LoginOutcome, ManualClock, Notification, Notifier, NotifierError,
    ResendOutcome, SessionId, SystemClock, TracingNotifier, TrustedDevice, VerifiedIdentity,
    VerifyOutcome, WardenConfig, repositories::InMemoryRepositoryProvider, storage::Challenge,
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use warden_storage_sqlite::SqliteRepositoryProvider;

#[cfg(feature = "sqlite")]
pub(crate) mod sqlite {
    pub use warden_storage_sqlite::SqliteRepositoryProvider;
}

/// Errors that can occur when using Warden.
///
/// Business outcomes such as a locked account or a wrong code are not
/// errors; they are variants of [`LoginOutcome`], [`VerifyOutcome`] and
/// [`ResendOutcome`]. These variants are infrastructure failures and bad
/// input.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// The caller supplied malformed input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Error when interacting with storage
    #[error("Storage error: {0}")]
    StorageError(String),
    /// The credential verifier could not answer
    #[error("Credential verifier error: {0}")]
    VerifierError(String),
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<Error> for WardenError {
    fn from(error: Error) -> Self {
        match error {
            Error::Validation(e) => WardenError::InvalidRequest(e.to_string()),
            Error::Credential(e) => WardenError::VerifierError(e.to_string()),
            Error::Config(e) => WardenError::ConfigError(e.to_string()),
            e @ (Error::Storage(_) | Error::Notifier(_) | Error::Event(_)) => {
                WardenError::StorageError(e.to_string())
            }
        }
    }
}

/// What one cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub attempts_deleted: u64,
    pub challenges_deleted: u64,
}

type Lockouts<R> = LockoutService<LockoutRepositoryAdapter<R>>;
type Registry<R> =
    SessionRegistry<TrustedDeviceRepositoryAdapter<R>, DeviceSessionRepositoryAdapter<R>>;
type Challenges<R> = ChallengeService<
    ChallengeRepositoryAdapter<R>,
    TrustedDeviceRepositoryAdapter<R>,
    DeviceSessionRepositoryAdapter<R>,
>;
type Logins<R> = LoginService<
    LockoutRepositoryAdapter<R>,
    ChallengeRepositoryAdapter<R>,
    TrustedDeviceRepositoryAdapter<R>,
    DeviceSessionRepositoryAdapter<R>,
>;

/// The coordinator that owns the services and their storage.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use warden::{InMemoryRepositoryProvider, Warden};
/// # use warden::{CredentialError, CredentialVerifier, VerifiedIdentity};
/// # struct MyVerifier;
/// # #[async_trait::async_trait]
/// # impl CredentialVerifier for MyVerifier {
/// #     async fn verify(&self, _: &str, _: &str) -> Result<Option<VerifiedIdentity>, CredentialError> {
/// #         Ok(None)
/// #     }
/// # }
/// # use warden::{Notification, Notifier, NotifierError};
/// # struct MyMailer;
/// # #[async_trait::async_trait]
/// # impl Notifier for MyMailer {
/// #     async fn send(&self, _: &str, _: &Notification) -> Result<(), NotifierError> {
/// #         Ok(())
/// #     }
/// # }
///
/// # async fn example() -> Result<(), warden::WardenError> {
/// let repositories = Arc::new(InMemoryRepositoryProvider::new());
/// let warden = Warden::new(repositories, Arc::new(MyVerifier), Arc::new(MyMailer));
///
/// let status = warden.check_lockout("bob@example.com").await?;
/// assert!(!status.locked);
/// # Ok(())
/// # }
/// ```
pub struct Warden<R: RepositoryProvider> {
    repositories: Arc<R>,
    config: WardenConfig,
    clock: Arc<dyn Clock>,
    events: warden_core::EventBus,
    lockout_service: Arc<Lockouts<R>>,
    session_registry: Arc<Registry<R>>,
    challenge_service: Arc<Challenges<R>>,
    login_service: Arc<Logins<R>>,
}

impl<R: RepositoryProvider> Warden<R> {
    /// Create a Warden with default policy and the system clock.
    pub fn new(
        repositories: Arc<R>,
        verifier: Arc<dyn CredentialVerifier>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::from_parts(
            repositories,
            verifier,
            notifier,
            WardenConfig::default(),
            Arc::new(SystemClock),
        )
    }

    pub(crate) fn from_parts(
        repositories: Arc<R>,
        verifier: Arc<dyn CredentialVerifier>,
        notifier: Arc<dyn Notifier>,
        config: WardenConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = warden_core::EventBus::new();

        let lockout_repo = Arc::new(LockoutRepositoryAdapter::new(repositories.clone()));
        let challenge_repo = Arc::new(ChallengeRepositoryAdapter::new(repositories.clone()));
        let device_repo = Arc::new(TrustedDeviceRepositoryAdapter::new(repositories.clone()));
        let session_repo = Arc::new(DeviceSessionRepositoryAdapter::new(repositories.clone()));

        let lockout_service = Arc::new(LockoutService::new(
            lockout_repo,
            config.lockout.clone(),
            clock.clone(),
            events.clone(),
        ));
        let session_registry = Arc::new(SessionRegistry::new(
            device_repo.clone(),
            session_repo.clone(),
            clock.clone(),
            events.clone(),
        ));
        let device_service = Arc::new(DeviceTrustService::new(device_repo, session_repo));
        let challenge_service = Arc::new(ChallengeService::new(
            challenge_repo,
            session_registry.clone(),
            notifier.clone(),
            config.challenge.clone(),
            clock.clone(),
            events.clone(),
        ));
        let login_service = Arc::new(LoginService::new(
            lockout_service.clone(),
            device_service,
            challenge_service.clone(),
            session_registry.clone(),
            verifier,
            notifier,
            clock.clone(),
            events.clone(),
        ));

        Self {
            repositories,
            config,
            clock,
            events,
            lockout_service,
            session_registry,
            challenge_service,
            login_service,
        }
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// The current time on the clock this Warden decides with.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), WardenError> {
        self.repositories
            .migrate()
            .await
            .map_err(|e| WardenError::StorageError(e.to_string()))
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), WardenError> {
        self.repositories
            .health_check()
            .await
            .map_err(|e| WardenError::StorageError(e.to_string()))
    }

    /// Whether the identifier is locked right now.
    ///
    /// Read-only: checking never records an attempt.
    pub async fn check_lockout(&self, identifier: &str) -> Result<LockoutStatus, WardenError> {
        Ok(self.lockout_service.is_locked(identifier).await?)
    }

    /// Run one login attempt through lockout, credential and device checks.
    ///
    /// # Arguments
    ///
    /// * `identifier`: The login name, usually an email address
    /// * `secret`: The password, passed to the credential verifier untouched
    /// * `signals`: What the client reported about its device
    pub async fn attempt_login(
        &self,
        identifier: &str,
        secret: &str,
        signals: &DeviceSignals,
    ) -> Result<LoginOutcome, WardenError> {
        Ok(self
            .login_service
            .attempt_login(identifier, secret, signals)
            .await?)
    }

    /// Submit the code for a pending challenge.
    ///
    /// On success the device is trusted and a session is registered.
    pub async fn verify_challenge(
        &self,
        token: &ChallengeToken,
        code: &str,
    ) -> Result<VerifyOutcome, WardenError> {
        Ok(self.challenge_service.verify(token, code).await?)
    }

    /// Send a fresh code for a pending challenge. The previous code stops
    /// working.
    pub async fn resend_challenge(
        &self,
        token: &ChallengeToken,
    ) -> Result<ResendOutcome, WardenError> {
        Ok(self.challenge_service.resend(token).await?)
    }

    /// Release every active lockout of the identifier.
    ///
    /// # Returns
    ///
    /// The number of lockouts released; zero if it was not locked.
    pub async fn manual_unlock(
        &self,
        identifier: &str,
        unlocked_by: &str,
    ) -> Result<u64, WardenError> {
        Ok(self
            .lockout_service
            .manual_unlock(identifier, unlocked_by)
            .await?)
    }

    pub async fn list_lockouts(&self, identifier: &str) -> Result<Vec<Lockout>, WardenError> {
        Ok(self.lockout_service.list_lockouts(identifier).await?)
    }

    pub async fn list_active_lockouts(&self) -> Result<Vec<Lockout>, WardenError> {
        Ok(self.lockout_service.list_active_lockouts().await?)
    }

    pub async fn list_challenges(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<Challenge>, WardenError> {
        Ok(self.challenge_service.list_challenges(identity).await?)
    }

    pub async fn list_sessions(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<DeviceSession>, WardenError> {
        Ok(self.session_registry.list_sessions(identity).await?)
    }

    pub async fn list_trusted_devices(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<TrustedDevice>, WardenError> {
        Ok(self.session_registry.list_trusted_devices(identity).await?)
    }

    /// Revoke one of the identity's sessions.
    ///
    /// # Returns
    ///
    /// `false` if the session is unknown, belongs to someone else or was
    /// already revoked.
    pub async fn revoke_session(
        &self,
        identity: &IdentityId,
        session_id: &SessionId,
    ) -> Result<bool, WardenError> {
        Ok(self.session_registry.revoke(identity, session_id).await?)
    }

    /// Revoke every session of the identity except `current`.
    pub async fn revoke_other_sessions(
        &self,
        identity: &IdentityId,
        current: &SessionId,
    ) -> Result<u64, WardenError> {
        Ok(self
            .session_registry
            .revoke_all_except(identity, current)
            .await?)
    }

    /// Stop trusting a device. The next login from it is challenged.
    pub async fn forget_device(
        &self,
        identity: &IdentityId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, WardenError> {
        Ok(self
            .session_registry
            .forget_device(identity, fingerprint)
            .await?)
    }

    /// Record activity on a session.
    pub async fn touch_session(&self, session_id: &SessionId) -> Result<bool, WardenError> {
        Ok(self.session_registry.touch(session_id).await?)
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Register a handler that is awaited for every event.
    pub async fn register_event_handler(&self, handler: Arc<dyn EventHandler>) {
        self.events.register(handler).await;
    }

    /// Delete ledger rows past retention and challenges long expired.
    pub async fn cleanup(&self) -> Result<CleanupStats, WardenError> {
        Ok(CleanupStats {
            attempts_deleted: self.lockout_service.prune_attempts().await?,
            challenges_deleted: self.challenge_service.purge_expired().await?,
        })
    }

    /// Start the background cleanup task.
    ///
    /// This spawns a task that runs [`Warden::cleanup`] every
    /// `cleanup_interval`. Lockouts are never deleted.
    ///
    /// # Arguments
    ///
    /// * `shutdown` - A watch receiver that signals when to stop the task
    ///
    /// # Returns
    ///
    /// A `JoinHandle` for the spawned task.
    pub fn start_cleanup_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let lockouts = Arc::clone(&self.lockout_service);
        let challenges = Arc::clone(&self.challenge_service);
        let period = self
            .config
            .cleanup_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(3600));

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        if let Err(e) = lockouts.prune_attempts().await {
                            tracing::warn!(error = %e, "Failed to cleanup failed login attempt records");
                        }
                        if let Err(e) = challenges.purge_expired().await {
                            tracing::warn!(error = %e, "Failed to purge expired challenges");
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down warden cleanup task");
                        break;
                    }
                }
            }
        })
    }
}
