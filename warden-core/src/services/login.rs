//! Login orchestration.
//!
//! Composes the other services into the login decision. It never writes to
//! a repository directly.
//!
//! 1. Refuse locked identifiers before the credential verifier runs.
//! 2. On rejected credentials, record the failure and evaluate the lockout.
//! 3. On accepted credentials, trust the very first device, allow known
//!    devices and challenge everything else.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    Error,
    clock::Clock,
    credentials::CredentialVerifier,
    events::{Event, EventBus},
    fingerprint::{DeviceSignals, Fingerprint, classify},
    notifier::{Notification, Notifier},
    repositories::{
        ChallengeRepository, DeviceSessionRepository, LockoutRepository, TrustedDeviceRepository,
    },
    services::{ChallengeService, DeviceTrustService, LockoutService, SessionRegistry},
    storage::{
        ChallengeToken, DeviceSession, FailureReason, Lockout, LockoutDecision, VerifiedIdentity,
    },
    validation::normalize_identifier,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Authenticated on a trusted device.
    Allowed {
        identity: VerifiedIdentity,
        session: DeviceSession,
        fingerprint: Fingerprint,
        /// The identity had never logged in before; this device is now trusted.
        first_login: bool,
    },
    /// Locked until `unlock_at`. The credentials were not checked or did not matter.
    Locked { unlock_at: DateTime<Utc> },
    /// `remaining` is the number of failures left before a lockout, when known.
    InvalidCredentials { remaining: Option<u32> },
    /// Credentials were correct but the device is not trusted yet.
    ChallengeRequired {
        token: ChallengeToken,
        expires_at: DateTime<Utc>,
        email_sent: bool,
    },
}

impl LoginOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LoginOutcome::Allowed { .. })
    }

    /// User-facing remediation text. Never says which credential was wrong.
    pub fn message(&self) -> String {
        match self {
            LoginOutcome::Allowed { .. } => "Signed in.".to_string(),
            LoginOutcome::Locked { unlock_at } => format!(
                "Too many failed sign-in attempts. Try again after {} UTC.",
                unlock_at.format("%Y-%m-%d %H:%M")
            ),
            LoginOutcome::InvalidCredentials { remaining: Some(1) } => {
                "Invalid credentials. One attempt remaining before your account is locked."
                    .to_string()
            }
            LoginOutcome::InvalidCredentials {
                remaining: Some(remaining),
            } => format!(
                "Invalid credentials. {remaining} attempts remaining before your account is locked."
            ),
            LoginOutcome::InvalidCredentials { remaining: None } => {
                "Invalid credentials.".to_string()
            }
            LoginOutcome::ChallengeRequired {
                email_sent: true, ..
            } => "New device detected. Enter the verification code we sent to your email."
                .to_string(),
            LoginOutcome::ChallengeRequired {
                email_sent: false,
                ..
            } => "New device detected. We could not send a verification code; request a resend."
                .to_string(),
        }
    }
}

pub struct LoginService<L, C, T, S>
where
    L: LockoutRepository,
    C: ChallengeRepository,
    T: TrustedDeviceRepository,
    S: DeviceSessionRepository,
{
    lockouts: Arc<LockoutService<L>>,
    devices: Arc<DeviceTrustService<T, S>>,
    challenges: Arc<ChallengeService<C, T, S>>,
    registry: Arc<SessionRegistry<T, S>>,
    verifier: Arc<dyn CredentialVerifier>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl<L, C, T, S> LoginService<L, C, T, S>
where
    L: LockoutRepository,
    C: ChallengeRepository,
    T: TrustedDeviceRepository,
    S: DeviceSessionRepository,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lockouts: Arc<LockoutService<L>>,
        devices: Arc<DeviceTrustService<T, S>>,
        challenges: Arc<ChallengeService<C, T, S>>,
        registry: Arc<SessionRegistry<T, S>>,
        verifier: Arc<dyn CredentialVerifier>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            lockouts,
            devices,
            challenges,
            registry,
            verifier,
            notifier,
            clock,
            events,
        }
    }

    /// Run one login attempt.
    ///
    /// Store and verifier errors are returned as `Err` and never turn into
    /// an unlock. The only exception is a failure to record a rejected
    /// attempt, which is logged and answered as plain invalid credentials.
    ///
    /// The normalized identifier keys the ledger and lockouts only; the
    /// verifier sees the identifier as submitted, minus surrounding spaces.
    pub async fn attempt_login(
        &self,
        identifier: &str,
        secret: &str,
        signals: &DeviceSignals,
    ) -> Result<LoginOutcome, Error> {
        let ledger_key = normalize_identifier(identifier)?;

        let status = self.lockouts.is_locked(&ledger_key).await?;
        if let (true, Some(unlock_at)) = (status.locked, status.unlock_at) {
            tracing::info!(identifier = %ledger_key, "Login refused, account locked");
            self.events
                .publish(Event::LoginBlocked {
                    identifier: ledger_key,
                    unlock_at,
                    timestamp: self.clock.now(),
                })
                .await;
            return Ok(LoginOutcome::Locked { unlock_at });
        }

        match self.verifier.verify(identifier.trim(), secret).await? {
            None => self.reject(&ledger_key).await,
            Some(identity) => self.admit(identity, signals).await,
        }
    }

    async fn reject(&self, identifier: &str) -> Result<LoginOutcome, Error> {
        let count = match self
            .lockouts
            .record_failure(identifier, FailureReason::InvalidCredentials)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    identifier = %identifier,
                    "Failed to record failed login attempt"
                );
                self.publish_failure(identifier, None).await;
                return Ok(LoginOutcome::InvalidCredentials { remaining: None });
            }
        };

        self.publish_failure(identifier, Some(count)).await;

        match self.lockouts.evaluate_lockout(identifier, count).await {
            Ok(LockoutDecision::NotLocked { remaining }) => Ok(LoginOutcome::InvalidCredentials {
                remaining: Some(remaining),
            }),
            Ok(LockoutDecision::Locked {
                lockout,
                newly_created,
            }) => {
                if newly_created {
                    self.send_lockout_alert(&lockout).await;
                }
                Ok(LoginOutcome::Locked {
                    unlock_at: lockout.unlock_at,
                })
            }
            Err(e) => {
                // The failure is in the ledger; the next attempt re-evaluates.
                tracing::warn!(
                    error = %e,
                    identifier = %identifier,
                    "Failed to evaluate lockout"
                );
                Ok(LoginOutcome::InvalidCredentials { remaining: None })
            }
        }
    }

    async fn admit(
        &self,
        identity: VerifiedIdentity,
        signals: &DeviceSignals,
    ) -> Result<LoginOutcome, Error> {
        let fingerprint = classify(signals);
        let user_agent = signals.user_agent.as_deref();

        let first_login = !self.devices.has_any_sessions(&identity.id).await?;
        if first_login {
            self.registry
                .upsert_trusted_device(&identity.id, &fingerprint)
                .await?;
        } else if !self.devices.is_known(&identity.id, &fingerprint).await? {
            let issued = self.challenges.issue(&identity, fingerprint).await?;
            return Ok(LoginOutcome::ChallengeRequired {
                token: issued.token,
                expires_at: issued.expires_at,
                email_sent: issued.email_sent,
            });
        }

        let session = self
            .registry
            .register_session(&identity.id, &fingerprint, user_agent, true)
            .await?;

        tracing::info!(
            identity = %identity.id,
            fingerprint = %fingerprint,
            first_login,
            "Login allowed"
        );
        self.events
            .publish(Event::LoginSucceeded {
                identity: identity.id.clone(),
                session_id: session.id.clone(),
                fingerprint,
                first_login,
                timestamp: session.created_at,
            })
            .await;

        Ok(LoginOutcome::Allowed {
            identity,
            session,
            fingerprint,
            first_login,
        })
    }

    async fn publish_failure(&self, identifier: &str, failed_attempts: Option<u32>) {
        self.events
            .publish(Event::LoginFailed {
                identifier: identifier.to_string(),
                failed_attempts,
                timestamp: self.clock.now(),
            })
            .await;
    }

    /// Alert the account owner when the identifier is an email address.
    async fn send_lockout_alert(&self, lockout: &Lockout) {
        if !lockout.identifier.contains('@') {
            return;
        }

        let notification = Notification::LockoutAlert {
            failed_attempts: lockout.failed_attempts,
            unlock_at: lockout.unlock_at,
        };
        if let Err(e) = self
            .notifier
            .send(&lockout.identifier, &notification)
            .await
        {
            tracing::warn!(
                error = %e,
                identifier = %lockout.identifier,
                "Failed to deliver lockout alert"
            );
        }
    }
}
