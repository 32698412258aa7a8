//! Tunable policy for lockouts and challenges.
//!
//! Every threshold, window and lifetime the services use lives here so it
//! can be changed without a redeploy: construct in code, deserialize with
//! serde (durations are whole seconds), or read from `WARDEN_*` variables.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Failed-login lockout policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutPolicy {
    /// Failures inside `window` that trigger a lockout.
    pub threshold: u32,

    /// Trailing window failures are counted over.
    #[serde(with = "duration_secs")]
    pub window: Duration,

    /// How long a lockout lasts.
    #[serde(with = "duration_secs")]
    pub lock_duration: Duration,

    /// How long failed attempts are kept for audit before being pruned.
    #[serde(with = "duration_secs")]
    pub attempt_retention: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            window: Duration::hours(1),
            lock_duration: Duration::minutes(30),
            attempt_retention: Duration::days(30),
        }
    }
}

impl LockoutPolicy {
    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = lock_duration;
        self
    }

    pub fn attempt_retention(mut self, retention: Duration) -> Self {
        self.attempt_retention = retention;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold == 0 {
            return Err(ConfigError::InvalidPolicy(
                "lockout threshold must be at least 1".to_string(),
            ));
        }
        if self.window <= Duration::zero() || self.lock_duration <= Duration::zero() {
            return Err(ConfigError::InvalidPolicy(
                "lockout window and duration must be positive".to_string(),
            ));
        }
        if self.attempt_retention < self.window {
            return Err(ConfigError::InvalidPolicy(
                "attempt retention must cover the counting window".to_string(),
            ));
        }
        Ok(())
    }
}

/// One-time-code challenge policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengePolicy {
    /// Lifetime of a code, from issuance and from every resend.
    #[serde(with = "duration_secs")]
    pub code_ttl: Duration,

    /// Minimum time between two sends for the same token. Zero disables it.
    #[serde(with = "duration_secs")]
    pub resend_cooldown: Duration,

    /// Wrong codes accepted per token before it is burned. Zero disables it.
    pub max_verify_attempts: u32,

    /// How long expired challenges are kept before being purged.
    #[serde(with = "duration_secs")]
    pub retention: Duration,
}

impl Default for ChallengePolicy {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(15),
            resend_cooldown: Duration::seconds(60),
            max_verify_attempts: 5,
            retention: Duration::days(1),
        }
    }
}

impl ChallengePolicy {
    pub fn code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    pub fn resend_cooldown(mut self, cooldown: Duration) -> Self {
        self.resend_cooldown = cooldown;
        self
    }

    pub fn max_verify_attempts(mut self, attempts: u32) -> Self {
        self.max_verify_attempts = attempts;
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.code_ttl <= Duration::zero() {
            return Err(ConfigError::InvalidPolicy(
                "challenge code lifetime must be positive".to_string(),
            ));
        }
        if self.resend_cooldown < Duration::zero() || self.retention < Duration::zero() {
            return Err(ConfigError::InvalidPolicy(
                "challenge cooldown and retention cannot be negative".to_string(),
            ));
        }
        if self.resend_cooldown >= self.code_ttl {
            return Err(ConfigError::InvalidPolicy(
                "resend cooldown must be shorter than the code lifetime".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration for a warden instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub lockout: LockoutPolicy,
    pub challenge: ChallengePolicy,

    /// Period of the background retention task.
    #[serde(with = "duration_secs")]
    pub cleanup_interval: Duration,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            lockout: LockoutPolicy::default(),
            challenge: ChallengePolicy::default(),
            cleanup_interval: Duration::hours(1),
        }
    }
}

impl WardenConfig {
    /// Load configuration from `WARDEN_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var::<u32, _>(&lookup, "WARDEN_LOCKOUT_THRESHOLD")? {
            config.lockout.threshold = v;
        }
        if let Some(v) = parse_secs(&lookup, "WARDEN_LOCKOUT_WINDOW_SECS")? {
            config.lockout.window = v;
        }
        if let Some(v) = parse_secs(&lookup, "WARDEN_LOCKOUT_DURATION_SECS")? {
            config.lockout.lock_duration = v;
        }
        if let Some(v) = parse_secs(&lookup, "WARDEN_ATTEMPT_RETENTION_SECS")? {
            config.lockout.attempt_retention = v;
        }
        if let Some(v) = parse_secs(&lookup, "WARDEN_CHALLENGE_TTL_SECS")? {
            config.challenge.code_ttl = v;
        }
        if let Some(v) = parse_secs(&lookup, "WARDEN_CHALLENGE_RESEND_COOLDOWN_SECS")? {
            config.challenge.resend_cooldown = v;
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "WARDEN_CHALLENGE_MAX_ATTEMPTS")? {
            config.challenge.max_verify_attempts = v;
        }
        if let Some(v) = parse_secs(&lookup, "WARDEN_CHALLENGE_RETENTION_SECS")? {
            config.challenge.retention = v;
        }
        if let Some(v) = parse_secs(&lookup, "WARDEN_CLEANUP_INTERVAL_SECS")? {
            config.cleanup_interval = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lockout.validate()?;
        self.challenge.validate()?;
        if self.cleanup_interval <= Duration::zero() {
            return Err(ConfigError::InvalidPolicy(
                "cleanup interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<i64, _>(lookup, key)? {
        None => Ok(None),
        Some(secs) => Duration::try_seconds(secs)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                value: secs.to_string(),
            }),
    }
}

mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Duration::try_seconds(secs)
            .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {secs}s")))
    }
}
