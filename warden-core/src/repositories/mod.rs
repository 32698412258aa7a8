//! Repository traits for data access layer
//!
//! This module defines the repository interfaces that services use to interact with storage.
//!
//! # Trait Hierarchy
//!
//! - Individual `*Repository` traits define the operations for each data domain
//! - Individual `*RepositoryProvider` traits provide access to each repository type
//! - [`RepositoryProvider`] is a supertrait combining all provider traits plus lifecycle methods
//!
//! Services are generic over the individual repository traits. The
//! `*RepositoryAdapter` types in [`adapter`] bridge a full provider to them.

pub mod adapter;
pub mod challenge;
pub mod device;
pub mod lockout;
pub mod memory;
pub mod session;

pub use adapter::{
    ChallengeRepositoryAdapter, DeviceSessionRepositoryAdapter, LockoutRepositoryAdapter,
    TrustedDeviceRepositoryAdapter,
};
pub use challenge::ChallengeRepository;
pub use device::TrustedDeviceRepository;
pub use lockout::LockoutRepository;
pub use memory::InMemoryRepositoryProvider;
pub use session::DeviceSessionRepository;

use async_trait::async_trait;

use crate::Error;

/// Provider trait for attempt ledger and lockout repository access.
pub trait LockoutRepositoryProvider: Send + Sync + 'static {
    type LockoutRepo: LockoutRepository;

    fn lockout(&self) -> &Self::LockoutRepo;
}

/// Provider trait for challenge repository access.
pub trait ChallengeRepositoryProvider: Send + Sync + 'static {
    type ChallengeRepo: ChallengeRepository;

    fn challenge(&self) -> &Self::ChallengeRepo;
}

/// Provider trait for trusted device repository access.
pub trait TrustedDeviceRepositoryProvider: Send + Sync + 'static {
    type TrustedDeviceRepo: TrustedDeviceRepository;

    fn trusted_device(&self) -> &Self::TrustedDeviceRepo;
}

/// Provider trait for device session repository access.
pub trait DeviceSessionRepositoryProvider: Send + Sync + 'static {
    type DeviceSessionRepo: DeviceSessionRepository;

    fn device_session(&self) -> &Self::DeviceSessionRepo;
}

/// Provider trait that storage implementations must implement to provide all repositories.
///
/// # Example
///
/// ```rust,ignore
/// use warden_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl LockoutRepositoryProvider for MyStorage {
///     type LockoutRepo = MyLockoutRepository;
///     fn lockout(&self) -> &Self::LockoutRepo { &self.lockout }
/// }
///
/// // ... implement other provider traits ...
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider:
    LockoutRepositoryProvider
    + ChallengeRepositoryProvider
    + TrustedDeviceRepositoryProvider
    + DeviceSessionRepositoryProvider
{
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
