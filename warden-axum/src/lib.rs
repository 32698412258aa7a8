//! # Warden Axum Integration
//!
//! Axum routes that expose a [`Warden`] over HTTP with JSON bodies.
//!
//! ## Routes
//!
//! [`routes`]:
//!
//! - `POST /login`: 200 allowed, 202 challenge required, 401 invalid credentials, 423 locked
//! - `POST /challenge/verify`: 200 verified, 400 wrong code, 410 expired or unknown token
//! - `POST /challenge/resend`: 200 resent, 429 too soon, 410 unknown token
//! - `GET /lockout/{identifier}`: whether the identifier is locked, and until when
//! - `GET /health`
//!
//! [`admin_routes`]:
//!
//! - `POST /lockout/{identifier}/unlock` with `{"by": "..."}`: release active lockouts
//!
//! The admin router carries no authentication of its own. Mount it behind
//! whatever protects your operator endpoints.
//!
//! Every non-2xx response has a body of the form
//! `{"error": "<slug>", "code": <status>, "message": "..."}`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::Router;
//! use warden::{InMemoryRepositoryProvider, WardenBuilder};
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
//! async fn main() {
//!     let warden = WardenBuilder::new()
//!         .with_repositories(Arc::new(InMemoryRepositoryProvider::new()))
//!         .with_verifier(Arc::new(MyVerifier))
//!         .with_notifier(Arc::new(MyMailer))
//!         .build()
//!         .await
//!         .unwrap();
//!     let warden = Arc::new(warden);
//!
//!     let app = Router::new()
//!         .nest("/auth", warden_axum::routes(warden.clone()))
//!         .nest("/admin", warden_axum::admin_routes(warden));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

mod error;
mod extractors;
mod routes;
mod types;

pub use error::{ApiError, Result};
pub use extractors::ClientUserAgent;
pub use routes::{WardenState, create_admin_router, create_router};
pub use types::{
    HealthResponse, LoginRequest, LoginResponse, ResendChallengeRequest, ResendChallengeResponse,
    UnlockRequest, UnlockResponse, VerifyChallengeRequest, VerifyChallengeResponse,
};

use axum::Router;
use std::sync::Arc;
use warden::Warden;
use warden_core::repositories::RepositoryProvider;

/// Create the login and challenge routes.
///
/// The router can be nested at any path (e.g. "/auth").
pub fn routes<R>(warden: Arc<Warden<R>>) -> Router
where
    R: RepositoryProvider + 'static,
{
    create_router(warden)
}

/// Create the operator routes.
pub fn admin_routes<R>(warden: Arc<Warden<R>>) -> Router
where
    R: RepositoryProvider + 'static,
{
    create_admin_router(warden)
}
