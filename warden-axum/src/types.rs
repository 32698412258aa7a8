use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden::{ChallengeToken, DeviceSession, DeviceSignals, Fingerprint, VerifiedIdentity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
    /// Optional hints; the `User-Agent` header fills in `user_agent`.
    #[serde(default)]
    pub device: Option<DeviceSignals>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyChallengeRequest {
    pub token: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendChallengeRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub by: String,
}

/// Body of a successful `POST /login`, tagged by `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    Allowed {
        identity: VerifiedIdentity,
        session: DeviceSession,
        fingerprint: Fingerprint,
        first_login: bool,
        message: String,
    },
    ChallengeRequired {
        token: ChallengeToken,
        expires_at: DateTime<Utc>,
        email_sent: bool,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyChallengeResponse {
    pub status: &'static str,
    pub identity: VerifiedIdentity,
    pub fingerprint: Fingerprint,
    pub session: DeviceSession,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResendChallengeResponse {
    pub status: &'static str,
    pub expires_at: DateTime<Utc>,
    pub email_sent: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnlockResponse {
    pub identifier: String,
    pub released: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
