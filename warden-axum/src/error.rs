use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use warden::WardenError;

/// Every refusal the routes can answer with.
///
/// Each variant maps to one status code and a stable `error` slug, so clients
/// can branch on the slug and show `message` to the user.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Locked {
        unlock_at: DateTime<Utc>,
        retry_after_secs: i64,
        message: String,
    },

    #[error("{message}")]
    InvalidCredentials {
        remaining: Option<u32>,
        message: String,
    },

    #[error("{message}")]
    InvalidCode {
        attempts_remaining: Option<u32>,
        message: String,
    },

    #[error("{0}")]
    ExpiredOrInvalidToken(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("{message}")]
    TooSoon {
        retry_after: DateTime<Utc>,
        retry_after_secs: i64,
        message: String,
    },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Locked { .. } => StatusCode::LOCKED,
            ApiError::InvalidCredentials { .. } => StatusCode::UNAUTHORIZED,
            ApiError::InvalidCode { .. } | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ExpiredOrInvalidToken(_) | ApiError::InvalidToken(_) => StatusCode::GONE,
            ApiError::TooSoon { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Locked { .. } => "locked",
            ApiError::InvalidCredentials { .. } => "invalid_credentials",
            ApiError::InvalidCode { .. } => "invalid_code",
            ApiError::ExpiredOrInvalidToken(_) => "expired_or_invalid_token",
            ApiError::InvalidToken(_) => "invalid_token",
            ApiError::TooSoon { .. } => "too_soon",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unavailable(_) => "service_unavailable",
            ApiError::InternalError(_) => "internal_error",
        }
    }

    fn retry_after_seconds(&self) -> Option<i64> {
        match self {
            ApiError::Locked {
                retry_after_secs, ..
            }
            | ApiError::TooSoon {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Whole seconds from `now` until `until`, never less than one.
pub(crate) fn seconds_until(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (until - now).num_seconds().max(1)
}

impl From<WardenError> for ApiError {
    fn from(err: WardenError) -> Self {
        match err {
            WardenError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            WardenError::VerifierError(msg) => ApiError::Unavailable(msg),
            WardenError::StorageError(msg) | WardenError::ConfigError(msg) => {
                ApiError::InternalError(msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Infrastructure details stay in the logs
        let message = match &self {
            ApiError::Unavailable(detail) | ApiError::InternalError(detail) => {
                tracing::error!(error = %detail, status = status.as_u16(), "Request failed");
                "Sign-in is temporarily unavailable. Please try again later.".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "error": self.kind(),
            "code": status.as_u16(),
            "message": message,
        });
        let extra: Option<(&str, Value)> = match &self {
            ApiError::Locked { unlock_at, .. } => Some(("unlock_at", json!(unlock_at))),
            ApiError::InvalidCredentials { remaining, .. } => {
                Some(("remaining", json!(remaining)))
            }
            ApiError::InvalidCode {
                attempts_remaining, ..
            } => Some(("attempts_remaining", json!(attempts_remaining))),
            ApiError::TooSoon { retry_after, .. } => Some(("retry_after", json!(retry_after))),
            _ => None,
        };
        if let (Some((key, value)), Some(map)) = (extra, body.as_object_mut()) {
            map.insert(key.to_string(), value);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after_seconds() {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
