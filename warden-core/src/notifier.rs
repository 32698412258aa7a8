//! Outbound notifications for verification codes and lockout alerts.
//!
//! Delivery is an external concern. Implement [`Notifier`] over whatever
//! transport the application uses; a failed send never changes a security
//! decision, it only surfaces as `email_sent: false`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::NotifierError;

/// Payload handed to a [`Notifier`].
#[derive(Clone, PartialEq, Eq)]
pub enum Notification {
    VerificationCode {
        code: String,
        device_description: String,
        expires_at: DateTime<Utc>,
    },
    LockoutAlert {
        failed_attempts: u32,
        unlock_at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::VerificationCode { .. } => "verification_code",
            Notification::LockoutAlert { .. } => "lockout_alert",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Notification::VerificationCode { .. } => "Your verification code".to_string(),
            Notification::LockoutAlert { .. } => {
                "Your account has been temporarily locked".to_string()
            }
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notification::VerificationCode {
                code,
                device_description,
                expires_at,
            } => format!(
                "A sign-in was attempted from a new device: {device_description}.\n\n\
                 Your verification code is {code}. It expires at {} UTC.\n\n\
                 If this wasn't you, change your password.",
                expires_at.format("%Y-%m-%d %H:%M")
            ),
            Notification::LockoutAlert {
                failed_attempts,
                unlock_at,
            } => format!(
                "We locked sign-in to your account after {failed_attempts} failed attempts.\n\n\
                 You can try again after {} UTC.",
                unlock_at.format("%Y-%m-%d %H:%M")
            ),
        }
    }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notification::VerificationCode {
                device_description,
                expires_at,
                ..
            } => f
                .debug_struct("VerificationCode")
                .field("code", &"<redacted>")
                .field("device_description", device_description)
                .field("expires_at", expires_at)
                .finish(),
            Notification::LockoutAlert {
                failed_attempts,
                unlock_at,
            } => f
                .debug_struct("LockoutAlert")
                .field("failed_attempts", failed_attempts)
                .field("unlock_at", unlock_at)
                .finish(),
        }
    }
}

/// Delivers a [`Notification`] to a destination address.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, destination: &str, notification: &Notification)
    -> Result<(), NotifierError>;
}

/// Development notifier that records deliveries in the log.
///
/// It has no transport, so verification codes are reported as undelivered
/// and callers see `email_sent: false`. Codes are never written to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(
        &self,
        destination: &str,
        notification: &Notification,
    ) -> Result<(), NotifierError> {
        if let Notification::VerificationCode { .. } = notification {
            tracing::warn!(
                destination = %destination,
                kind = notification.kind(),
                "Verification code not delivered, no transport configured"
            );
            return Err(NotifierError::Delivery(
                "no transport configured for verification codes".to_string(),
            ));
        }

        tracing::info!(
            destination = %destination,
            kind = notification.kind(),
            subject = %notification.subject(),
            "Notification dispatched"
        );
        Ok(())
    }
}
