use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};

use crate::{
    error::EventError,
    fingerprint::Fingerprint,
    storage::{IdentityId, SessionId},
};

/// Capacity of the broadcast channel handed out by [`EventBus::subscribe`].
const BROADCAST_CAPACITY: usize = 256;

/// Domain events published by the warden services.
///
/// Events are for dashboards and audit sinks. They never carry challenge
/// tokens, verification codes or secrets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A credential check failed and was recorded in the ledger.
    LoginFailed {
        identifier: String,
        /// Failures in the current window, when the ledger write succeeded.
        failed_attempts: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    /// A login was refused because the identifier is locked.
    LoginBlocked {
        identifier: String,
        unlock_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// The failure threshold was crossed and a lockout was created.
    ///
    /// This is a security-critical event that should trigger alerts.
    LockoutCreated {
        identifier: String,
        failed_attempts: u32,
        unlock_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Active lockouts were released by an operator.
    AccountUnlocked {
        identifier: String,
        unlocked_by: String,
        released: u64,
        timestamp: DateTime<Utc>,
    },

    LoginSucceeded {
        identity: IdentityId,
        session_id: SessionId,
        fingerprint: Fingerprint,
        first_login: bool,
        timestamp: DateTime<Utc>,
    },

    ChallengeIssued {
        identity: IdentityId,
        fingerprint: Fingerprint,
        expires_at: DateTime<Utc>,
        email_sent: bool,
        timestamp: DateTime<Utc>,
    },

    ChallengeResent {
        identity: IdentityId,
        expires_at: DateTime<Utc>,
        email_sent: bool,
        timestamp: DateTime<Utc>,
    },

    ChallengeVerified {
        identity: IdentityId,
        fingerprint: Fingerprint,
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },

    /// A wrong code was submitted for a live challenge.
    ChallengeFailed {
        identity: IdentityId,
        attempts_remaining: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    DeviceTrusted {
        identity: IdentityId,
        fingerprint: Fingerprint,
        timestamp: DateTime<Utc>,
    },

    SessionRevoked {
        identity: IdentityId,
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
}

/// A trait for handling events emitted by the event bus
///
/// # Examples
///
/// ```
/// # use warden_core::events::{Event, EventHandler};
/// # use warden_core::error::EventError;
/// # use async_trait::async_trait;
/// struct AuditLog;
///
/// #[async_trait]
/// impl EventHandler for AuditLog {
///     async fn handle_event(&self, event: &Event) -> Result<(), EventError> {
///         println!("{event:?}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError>;
}

/// Event bus that fans events out to registered handlers and subscribers
///
/// Handlers are awaited in registration order. Subscribers receive events
/// over a bounded broadcast channel and may lag or drop without affecting
/// publishers.
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            sender,
        }
    }

    /// Register an event handler with the event bus
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Emit an event to all registered handlers and subscribers
    ///
    /// Returns the first handler error. Subscribers are always notified.
    pub async fn emit(&self, event: &Event) -> Result<(), EventError> {
        // No receivers is not an error.
        let _ = self.sender.send(event.clone());

        for handler in self.handlers.read().await.iter() {
            handler.handle_event(event).await?;
        }

        Ok(())
    }

    /// Emit an event, logging handler failures instead of returning them.
    ///
    /// Services use this so that no decision ever depends on a subscriber.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.emit(&event).await {
            tracing::warn!(error = %e, "Event handler failed");
        }
    }
}
