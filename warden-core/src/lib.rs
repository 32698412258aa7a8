//! Core functionality for the warden project
//!
//! This crate contains the account-abuse prevention and device trust logic:
//! the failed-login ledger and lockouts, device fingerprints, one-time-code
//! challenges for unrecognized devices and the session registry.
//!
//! It is storage agnostic. Storage backends implement the traits in
//! [`repositories`]; applications normally use the `warden` facade crate
//! rather than wiring the [`services`] by hand.
//!
//! See [`services::LoginService`] for the login decision, [`fingerprint::classify`]
//! for device classification and [`config::WardenConfig`] for tunable policy.
//!
pub mod clock;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod id;
pub mod notifier;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChallengePolicy, LockoutPolicy, WardenConfig};
pub use credentials::CredentialVerifier;
pub use error::{
    ConfigError, CredentialError, Error, EventError, NotifierError, StorageError, ValidationError,
};
pub use events::{Event, EventBus, EventHandler};
pub use fingerprint::{BrowserFamily, DeviceClass, DeviceSignals, Fingerprint, OsFamily, classify};
pub use notifier::{Notification, Notifier, TracingNotifier};
pub use services::{LoginOutcome, ResendOutcome, VerifyOutcome};
pub use storage::{
    ChallengeToken, DeviceSession, IdentityId, Lockout, LockoutStatus, SessionId, TrustedDevice,
    VerifiedIdentity,
};
