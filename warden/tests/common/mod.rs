#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use warden::{
    ChallengePolicy, CredentialError, CredentialVerifier, DeviceSignals, LockoutPolicy,
    ManualClock, Notification, Notifier, NotifierError, SqliteRepositoryProvider,
    VerifiedIdentity, Warden, WardenBuilder,
};

/// Accepts a fixed set of (identifier, password) pairs.
#[derive(Default)]
pub struct StaticVerifier {
    accounts: HashMap<String, (String, VerifiedIdentity)>,
    pub calls: AtomicUsize,
    pub down: AtomicBool,
}

impl StaticVerifier {
    pub fn with_account(mut self, identifier: &str, password: &str, id: &str) -> Self {
        self.accounts.insert(
            identifier.to_string(),
            (password.to_string(), VerifiedIdentity::new(id, identifier)),
        );
        self
    }
}

#[async_trait]
impl CredentialVerifier for StaticVerifier {
    async fn verify(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Option<VerifiedIdentity>, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(CredentialError::Unavailable("directory offline".to_string()));
        }
        Ok(self
            .accounts
            .get(identifier)
            .filter(|(password, _)| password == secret)
            .map(|(_, identity)| identity.clone()))
    }
}

/// Captures every notification instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, Notification)>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn codes(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, n)| match n {
                Notification::VerificationCode { code, .. } => Some(code.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_code(&self) -> String {
        self.codes().pop().expect("no verification code was sent")
    }

    pub fn lockout_alerts(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, n)| matches!(n, Notification::LockoutAlert { .. }))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        destination: &str,
        notification: &Notification,
    ) -> Result<(), NotifierError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifierError::Delivery("smtp unreachable".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), notification.clone()));
        Ok(())
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn chrome_windows() -> DeviceSignals {
    DeviceSignals::from_user_agent(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    )
}

pub fn firefox_mac() -> DeviceSignals {
    DeviceSignals::default()
        .with_browser("Firefox")
        .with_os("macOS")
        .with_device("Desktop")
}

pub struct Harness {
    pub warden: Arc<Warden<SqliteRepositoryProvider>>,
    pub verifier: Arc<StaticVerifier>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

pub async fn harness() -> Harness {
    harness_with(ChallengePolicy::default()).await
}

/// A warden on a fresh, migrated in-memory SQLite database with
/// threshold 5, a 1h window and 30 minute lockouts.
pub async fn harness_with(challenge: ChallengePolicy) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let verifier = Arc::new(
        StaticVerifier::default()
            .with_account("bob@x.com", "hunter2", "u1")
            .with_account("carol@x.com", "correct horse", "u2"),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(t0()));

    let warden = WardenBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .with_verifier(verifier.clone())
        .with_notifier(notifier.clone())
        .with_clock(clock.clone())
        .with_lockout_policy(
            LockoutPolicy::default()
                .threshold(5)
                .window(chrono::Duration::hours(1))
                .lock_duration(chrono::Duration::minutes(30)),
        )
        .with_challenge_policy(challenge)
        .apply_migrations(true)
        .build()
        .await
        .unwrap();

    Harness {
        warden: Arc::new(warden),
        verifier,
        notifier,
        clock,
    }
}
