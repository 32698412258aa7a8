//! Service layer for business logic
//!
//! Services are generic over the repository traits and take their clock and
//! event bus explicitly. None of them holds per-request state.

pub mod challenge;
pub mod device;
pub mod lockout;
pub mod login;
pub mod session;

pub use challenge::{ChallengeService, IssuedChallenge, ResendOutcome, VerifyOutcome};
pub use device::DeviceTrustService;
pub use lockout::LockoutService;
pub use login::{LoginOutcome, LoginService};
pub use session::SessionRegistry;
