//! One-time-code challenges for logins from unrecognized devices.
//!
//! A challenge moves `PENDING -> VERIFIED` exactly once. Expiry, exhaustion
//! and "never existed" all look the same from the outside.
//!
//! The token is a bearer credential returned to the client; the code only
//! travels through the [`Notifier`]. Both are stored as SHA256 hashes.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    Error,
    clock::Clock,
    config::ChallengePolicy,
    crypto::{generate_challenge_token, generate_verification_code, hash_code},
    events::{Event, EventBus},
    fingerprint::Fingerprint,
    notifier::{Notification, Notifier},
    repositories::{ChallengeRepository, DeviceSessionRepository, TrustedDeviceRepository},
    services::SessionRegistry,
    storage::{Challenge, ChallengeToken, DeviceSession, IdentityId, VerifiedIdentity},
    validation::validate_verification_code,
};

/// A freshly issued challenge.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub token: ChallengeToken,
    pub expires_at: DateTime<Utc>,
    /// False when the notifier failed; the challenge still exists and can be resent.
    pub email_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResendOutcome {
    Resent {
        expires_at: DateTime<Utc>,
        email_sent: bool,
    },
    /// No live challenge for this token.
    InvalidToken,
    /// The previous code was sent too recently.
    TooSoon { retry_after: DateTime<Utc> },
}

impl ResendOutcome {
    pub fn message(&self) -> String {
        match self {
            ResendOutcome::Resent { email_sent: true, .. } => {
                "A new verification code has been sent. Check your email.".to_string()
            }
            ResendOutcome::Resent {
                email_sent: false, ..
            } => "We could not send the verification code. Request a resend in a moment."
                .to_string(),
            ResendOutcome::InvalidToken => {
                "This verification request has expired. Sign in again.".to_string()
            }
            ResendOutcome::TooSoon { retry_after } => format!(
                "A code was sent recently. You can request another after {} UTC.",
                retry_after.format("%H:%M:%S")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified {
        identity: IdentityId,
        fingerprint: Fingerprint,
        session: DeviceSession,
    },
    /// Wrong code for a live challenge. `None` when attempts are not capped.
    InvalidCode { attempts_remaining: Option<u32> },
    /// Unknown, expired, already used or exhausted token.
    ExpiredOrInvalidToken,
}

impl VerifyOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerifyOutcome::Verified { .. })
    }

    pub fn message(&self) -> String {
        match self {
            VerifyOutcome::Verified { .. } => "Device verified.".to_string(),
            VerifyOutcome::InvalidCode {
                attempts_remaining: Some(0),
            } => "Invalid verification code. This request is no longer valid; sign in again."
                .to_string(),
            VerifyOutcome::InvalidCode { .. } => {
                "Invalid verification code. Check your email for the latest code or request a resend."
                    .to_string()
            }
            VerifyOutcome::ExpiredOrInvalidToken => {
                "This verification request has expired or is invalid. Sign in again.".to_string()
            }
        }
    }
}

/// Issues, resends and verifies challenges.
///
/// Every state change is a single conditional write in the repository, so
/// concurrent verifies of one token produce at most one `Verified`, and a
/// verify racing a resend either sees the new code or reports `InvalidCode`.
pub struct ChallengeService<C, T, S>
where
    C: ChallengeRepository,
    T: TrustedDeviceRepository,
    S: DeviceSessionRepository,
{
    challenges: Arc<C>,
    registry: Arc<SessionRegistry<T, S>>,
    notifier: Arc<dyn Notifier>,
    policy: ChallengePolicy,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl<C, T, S> ChallengeService<C, T, S>
where
    C: ChallengeRepository,
    T: TrustedDeviceRepository,
    S: DeviceSessionRepository,
{
    pub fn new(
        challenges: Arc<C>,
        registry: Arc<SessionRegistry<T, S>>,
        notifier: Arc<dyn Notifier>,
        policy: ChallengePolicy,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            challenges,
            registry,
            notifier,
            policy,
            clock,
            events,
        }
    }

    pub fn policy(&self) -> &ChallengePolicy {
        &self.policy
    }

    /// Create a challenge for a login from `fingerprint` and send its code.
    pub async fn issue(
        &self,
        identity: &VerifiedIdentity,
        fingerprint: Fingerprint,
    ) -> Result<IssuedChallenge, Error> {
        let now = self.clock.now();
        let token = ChallengeToken::from(generate_challenge_token());
        let code = generate_verification_code();
        let expires_at = now + self.policy.code_ttl;

        self.challenges
            .create(Challenge {
                token_hash: token.hash(),
                identity: identity.id.clone(),
                destination: identity.email.clone(),
                fingerprint,
                code_hash: hash_code(token.as_str(), &code),
                created_at: now,
                expires_at,
                last_sent_at: now,
                verified_at: None,
                failed_attempts: 0,
            })
            .await?;

        let email_sent = self
            .deliver(&identity.email, code, &fingerprint, expires_at)
            .await;

        tracing::info!(
            identity = %identity.id,
            fingerprint = %fingerprint,
            email_sent,
            "Challenge issued for unrecognized device"
        );
        self.events
            .publish(Event::ChallengeIssued {
                identity: identity.id.clone(),
                fingerprint,
                expires_at,
                email_sent,
                timestamp: now,
            })
            .await;

        Ok(IssuedChallenge {
            token,
            expires_at,
            email_sent,
        })
    }

    /// Replace the code of a live challenge and send it again.
    ///
    /// The previous code stops verifying and the expiry restarts from now.
    pub async fn resend(&self, token: &ChallengeToken) -> Result<ResendOutcome, Error> {
        if !token.is_well_formed() {
            return Ok(ResendOutcome::InvalidToken);
        }

        let now = self.clock.now();
        let token_hash = token.hash();
        let max_attempts = self.policy.max_verify_attempts;
        let cooldown = self.policy.resend_cooldown;

        let Some(existing) = self.live_challenge(&token_hash, now).await? else {
            return Ok(ResendOutcome::InvalidToken);
        };

        let sent_before = now - cooldown;
        if existing.last_sent_at > sent_before {
            return Ok(ResendOutcome::TooSoon {
                retry_after: existing.last_sent_at + cooldown,
            });
        }

        let code = generate_verification_code();
        let expires_at = now + self.policy.code_ttl;

        let Some(updated) = self
            .challenges
            .replace_code(
                &token_hash,
                &hash_code(token.as_str(), &code),
                now,
                expires_at,
                sent_before,
                max_attempts,
            )
            .await?
        else {
            // Lost a race: another resend won, or the challenge was used up.
            return Ok(match self.live_challenge(&token_hash, now).await? {
                Some(current) => ResendOutcome::TooSoon {
                    retry_after: current.last_sent_at + cooldown,
                },
                None => ResendOutcome::InvalidToken,
            });
        };

        let email_sent = self
            .deliver(&updated.destination, code, &updated.fingerprint, expires_at)
            .await;

        tracing::info!(identity = %updated.identity, email_sent, "Verification code resent");
        self.events
            .publish(Event::ChallengeResent {
                identity: updated.identity,
                expires_at,
                email_sent,
                timestamp: now,
            })
            .await;

        Ok(ResendOutcome::Resent {
            expires_at,
            email_sent,
        })
    }

    /// Check a submitted code. On success the device becomes trusted and a
    /// trusted session is registered.
    pub async fn verify(&self, token: &ChallengeToken, code: &str) -> Result<VerifyOutcome, Error> {
        if !token.is_well_formed() {
            return Ok(VerifyOutcome::ExpiredOrInvalidToken);
        }

        let now = self.clock.now();
        let token_hash = token.hash();
        let max_attempts = self.policy.max_verify_attempts;

        if self.live_challenge(&token_hash, now).await?.is_none() {
            return Ok(VerifyOutcome::ExpiredOrInvalidToken);
        }

        // A malformed code is just a wrong code and counts against the cap.
        if let Ok(code) = validate_verification_code(code) {
            let code_hash = hash_code(token.as_str(), code);
            if let Some(challenge) = self
                .challenges
                .mark_verified(&token_hash, &code_hash, now, max_attempts)
                .await?
            {
                return self.promote(challenge).await;
            }
        }

        let Some(failures) = self
            .challenges
            .record_failed_verification(&token_hash, now, max_attempts)
            .await?
        else {
            return Ok(VerifyOutcome::ExpiredOrInvalidToken);
        };

        let attempts_remaining = (max_attempts > 0).then(|| max_attempts.saturating_sub(failures));
        if attempts_remaining == Some(0) {
            tracing::warn!("Challenge exhausted its verification attempts");
        }

        if let Some(challenge) = self.challenges.find_by_token_hash(&token_hash).await? {
            self.events
                .publish(Event::ChallengeFailed {
                    identity: challenge.identity,
                    attempts_remaining,
                    timestamp: now,
                })
                .await;
        }

        Ok(VerifyOutcome::InvalidCode { attempts_remaining })
    }

    /// All challenges for an identity, newest first.
    pub async fn list_challenges(&self, identity: &IdentityId) -> Result<Vec<Challenge>, Error> {
        self.challenges.list_for_identity(identity).await
    }

    /// Delete challenges that expired more than the retention period ago.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let before = self.clock.now() - self.policy.retention;
        let deleted = self.challenges.cleanup_expired(before).await?;
        if deleted > 0 {
            tracing::info!(count = deleted, "Purged expired challenges");
        }
        Ok(deleted)
    }

    async fn live_challenge(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Challenge>, Error> {
        Ok(self
            .challenges
            .find_by_token_hash(token_hash)
            .await?
            .filter(|c| c.is_live(now, self.policy.max_verify_attempts)))
    }

    async fn promote(&self, challenge: Challenge) -> Result<VerifyOutcome, Error> {
        self.registry
            .upsert_trusted_device(&challenge.identity, &challenge.fingerprint)
            .await?;
        let session = self
            .registry
            .register_session(&challenge.identity, &challenge.fingerprint, None, true)
            .await?;

        tracing::info!(
            identity = %challenge.identity,
            fingerprint = %challenge.fingerprint,
            "Challenge verified"
        );
        self.events
            .publish(Event::ChallengeVerified {
                identity: challenge.identity.clone(),
                fingerprint: challenge.fingerprint,
                session_id: session.id.clone(),
                timestamp: session.created_at,
            })
            .await;

        Ok(VerifyOutcome::Verified {
            identity: challenge.identity,
            fingerprint: challenge.fingerprint,
            session,
        })
    }

    async fn deliver(
        &self,
        destination: &str,
        code: String,
        fingerprint: &Fingerprint,
        expires_at: DateTime<Utc>,
    ) -> bool {
        let notification = Notification::VerificationCode {
            code,
            device_description: fingerprint.description(),
            expires_at,
        };

        match self.notifier.send(destination, &notification).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    destination = %destination,
                    "Failed to deliver verification code"
                );
                false
            }
        }
    }
}
