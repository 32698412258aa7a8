use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use warden::{ChallengeToken, LoginOutcome, ResendOutcome, VerifyOutcome, Warden};
use warden_core::repositories::RepositoryProvider;

use crate::{
    error::{ApiError, Result, seconds_until},
    extractors::ClientUserAgent,
    types::*,
};

pub struct WardenState<R: RepositoryProvider> {
    pub warden: Arc<Warden<R>>,
}

impl<R: RepositoryProvider> Clone for WardenState<R> {
    fn clone(&self) -> Self {
        Self {
            warden: self.warden.clone(),
        }
    }
}

pub fn create_router<R>(warden: Arc<Warden<R>>) -> Router
where
    R: RepositoryProvider + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/login", post(login_handler))
        .route("/challenge/verify", post(verify_challenge_handler))
        .route("/challenge/resend", post(resend_challenge_handler))
        .route("/lockout/{identifier}", get(lockout_status_handler))
        .with_state(WardenState { warden })
}

pub fn create_admin_router<R>(warden: Arc<Warden<R>>) -> Router
where
    R: RepositoryProvider + 'static,
{
    Router::new()
        .route("/lockout/{identifier}/unlock", post(unlock_handler))
        .with_state(WardenState { warden })
}

async fn health_handler<R>(State(state): State<WardenState<R>>) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state.warden.health_check().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn login_handler<R>(
    State(state): State<WardenState<R>>,
    ClientUserAgent(user_agent): ClientUserAgent,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let mut signals = payload.device.unwrap_or_default();
    if signals.user_agent.is_none() {
        signals.user_agent = user_agent;
    }

    let outcome = state
        .warden
        .attempt_login(&payload.identifier, &payload.password, &signals)
        .await?;
    let message = outcome.message();

    match outcome {
        LoginOutcome::Allowed {
            identity,
            session,
            fingerprint,
            first_login,
        } => Ok((
            StatusCode::OK,
            Json(LoginResponse::Allowed {
                identity,
                session,
                fingerprint,
                first_login,
                message,
            }),
        )),
        LoginOutcome::ChallengeRequired {
            token,
            expires_at,
            email_sent,
        } => Ok((
            StatusCode::ACCEPTED,
            Json(LoginResponse::ChallengeRequired {
                token,
                expires_at,
                email_sent,
                message,
            }),
        )),
        LoginOutcome::Locked { unlock_at } => Err(ApiError::Locked {
            unlock_at,
            retry_after_secs: seconds_until(unlock_at, state.warden.now()),
            message,
        }),
        LoginOutcome::InvalidCredentials { remaining } => {
            Err(ApiError::InvalidCredentials { remaining, message })
        }
    }
}

async fn verify_challenge_handler<R>(
    State(state): State<WardenState<R>>,
    Json(payload): Json<VerifyChallengeRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let token = ChallengeToken::new(&payload.token);
    let outcome = state
        .warden
        .verify_challenge(&token, &payload.code)
        .await?;
    let message = outcome.message();

    match outcome {
        VerifyOutcome::Verified {
            identity,
            fingerprint,
            session,
        } => Ok(Json(VerifyChallengeResponse {
            status: "verified",
            identity,
            fingerprint,
            session,
            message,
        })),
        VerifyOutcome::InvalidCode { attempts_remaining } => Err(ApiError::InvalidCode {
            attempts_remaining,
            message,
        }),
        VerifyOutcome::ExpiredOrInvalidToken => Err(ApiError::ExpiredOrInvalidToken(message)),
    }
}

async fn resend_challenge_handler<R>(
    State(state): State<WardenState<R>>,
    Json(payload): Json<ResendChallengeRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let token = ChallengeToken::new(&payload.token);
    let outcome = state.warden.resend_challenge(&token).await?;
    let message = outcome.message();

    match outcome {
        ResendOutcome::Resent {
            expires_at,
            email_sent,
        } => Ok(Json(ResendChallengeResponse {
            status: "resent",
            expires_at,
            email_sent,
            message,
        })),
        ResendOutcome::TooSoon { retry_after } => Err(ApiError::TooSoon {
            retry_after,
            retry_after_secs: seconds_until(retry_after, state.warden.now()),
            message,
        }),
        ResendOutcome::InvalidToken => Err(ApiError::InvalidToken(message)),
    }
}

async fn lockout_status_handler<R>(
    State(state): State<WardenState<R>>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    Ok(Json(state.warden.check_lockout(&identifier).await?))
}

async fn unlock_handler<R>(
    State(state): State<WardenState<R>>,
    Path(identifier): Path<String>,
    Json(payload): Json<UnlockRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    if payload.by.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "`by` must name who is unlocking".to_string(),
        ));
    }

    let released = state.warden.manual_unlock(&identifier, &payload.by).await?;

    Ok(Json(UnlockResponse {
        identifier,
        released,
    }))
}
