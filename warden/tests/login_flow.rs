mod common;

use std::sync::atomic::Ordering;

use chrono::Duration;
use common::{chrome_windows, firefox_mac, harness, harness_with, t0};
use warden::{
    ChallengePolicy, Event, Fingerprint, LoginOutcome, ResendOutcome, VerifyOutcome, WardenError,
};

fn wrong_code(code: &str) -> &'static str {
    if code == "000000" { "111111" } else { "000000" }
}

#[tokio::test]
async fn test_fifth_failure_locks_for_thirty_minutes() {
    let h = harness().await;

    for minute in 0..4 {
        h.clock.set(t0() + Duration::minutes(minute));
        let outcome = h
            .warden
            .attempt_login("bob@x.com", "wrong", &chrome_windows())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            LoginOutcome::InvalidCredentials {
                remaining: Some(4 - minute as u32)
            }
        );
    }

    h.clock.set(t0() + Duration::minutes(4));
    let outcome = h
        .warden
        .attempt_login("bob@x.com", "wrong", &chrome_windows())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        LoginOutcome::Locked {
            unlock_at: t0() + Duration::minutes(34)
        }
    );
    assert_eq!(h.notifier.lockout_alerts(), 1);
}

#[tokio::test]
async fn test_locked_identifier_refuses_correct_password_without_verifying() {
    let h = harness().await;
    for _ in 0..5 {
        h.warden
            .attempt_login("bob@x.com", "wrong", &chrome_windows())
            .await
            .unwrap();
    }
    let calls = h.verifier.calls.load(Ordering::SeqCst);

    let outcome = h
        .warden
        .attempt_login("BOB@x.com ", "hunter2", &chrome_windows())
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Locked { .. }));
    assert_eq!(h.verifier.calls.load(Ordering::SeqCst), calls);

    // Still only one lockout and one alert
    assert_eq!(h.warden.list_lockouts("bob@x.com").await.unwrap().len(), 1);
    assert_eq!(h.notifier.lockout_alerts(), 1);
}

#[tokio::test]
async fn test_failures_outside_window_do_not_count() {
    let h = harness().await;
    for _ in 0..4 {
        h.warden
            .attempt_login("bob@x.com", "wrong", &chrome_windows())
            .await
            .unwrap();
    }

    h.clock.set(t0() + Duration::hours(2));
    let outcome = h
        .warden
        .attempt_login("bob@x.com", "wrong", &chrome_windows())
        .await
        .unwrap();
    assert_eq!(outcome, LoginOutcome::InvalidCredentials { remaining: Some(4) });
    assert!(!h.warden.check_lockout("bob@x.com").await.unwrap().locked);
}

#[tokio::test]
async fn test_lockout_expires_exactly_at_unlock_at() {
    let h = harness().await;
    for _ in 0..5 {
        h.warden
            .attempt_login("bob@x.com", "wrong", &chrome_windows())
            .await
            .unwrap();
    }
    let unlock_at = t0() + Duration::minutes(30);

    h.clock.set(unlock_at - Duration::milliseconds(1));
    let status = h.warden.check_lockout("bob@x.com").await.unwrap();
    assert!(status.locked);
    assert_eq!(status.unlock_at, Some(unlock_at));

    h.clock.set(unlock_at);
    let status = h.warden.check_lockout("bob@x.com").await.unwrap();
    assert!(!status.locked);
    assert_eq!(status.unlock_at, None);

    let outcome = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();
    assert!(outcome.is_allowed());
}

#[tokio::test]
async fn test_manual_unlock_is_immediate_and_restarts_counting() {
    let h = harness().await;
    let mut events = h.warden.subscribe();
    for _ in 0..5 {
        h.warden
            .attempt_login("bob@x.com", "wrong", &chrome_windows())
            .await
            .unwrap();
    }

    h.clock.advance(Duration::minutes(1));
    assert_eq!(h.warden.manual_unlock("bob@x.com", "support").await.unwrap(), 1);
    assert_eq!(h.warden.manual_unlock("bob@x.com", "support").await.unwrap(), 0);
    assert!(!h.warden.check_lockout("bob@x.com").await.unwrap().locked);
    assert!(h.warden.list_active_lockouts().await.unwrap().is_empty());

    // The five failures that caused the lockout no longer count
    let outcome = h
        .warden
        .attempt_login("bob@x.com", "wrong", &chrome_windows())
        .await
        .unwrap();
    assert_eq!(outcome, LoginOutcome::InvalidCredentials { remaining: Some(4) });

    let history = h.warden.list_lockouts("bob@x.com").await.unwrap();
    assert_eq!(history[0].unlocked_by.as_deref(), Some("support"));

    let mut saw_created = false;
    let mut saw_unlocked = false;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::LockoutCreated { .. } => saw_created = true,
            Event::AccountUnlocked { released, .. } => {
                assert_eq!(released, 1);
                saw_unlocked = true;
            }
            _ => {}
        }
    }
    assert!(saw_created && saw_unlocked);
}

#[tokio::test]
async fn test_new_device_challenge_then_trusted() {
    let h = harness().await;

    // First login ever: trusted implicitly
    let outcome = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();
    let LoginOutcome::Allowed {
        first_login,
        fingerprint,
        identity,
        ..
    } = outcome
    else {
        panic!("expected Allowed, got {outcome:?}");
    };
    assert!(first_login);
    assert_eq!(fingerprint.to_string(), "Chrome/Windows/Desktop");
    let trusted = h.warden.list_trusted_devices(&identity.id).await.unwrap();
    assert_eq!(trusted.len(), 1);

    // Same device again: allowed without a challenge
    let outcome = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        LoginOutcome::Allowed {
            first_login: false,
            ..
        }
    ));

    // Another device: challenged
    let outcome = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &firefox_mac())
        .await
        .unwrap();
    let LoginOutcome::ChallengeRequired {
        token,
        expires_at,
        email_sent,
    } = outcome
    else {
        panic!("expected ChallengeRequired, got {outcome:?}");
    };
    assert!(email_sent);
    assert_eq!(expires_at, t0() + Duration::minutes(15));

    let code = h.notifier.last_code();
    let outcome = h
        .warden
        .verify_challenge(&token, wrong_code(&code))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        VerifyOutcome::InvalidCode {
            attempts_remaining: Some(4)
        }
    );

    let outcome = h.warden.verify_challenge(&token, &code).await.unwrap();
    let VerifyOutcome::Verified {
        fingerprint,
        session,
        ..
    } = outcome
    else {
        panic!("expected Verified, got {outcome:?}");
    };
    assert_eq!(fingerprint.to_string(), "Firefox/macOS/Desktop");
    assert!(session.is_trusted);

    // Single use
    let again = h.warden.verify_challenge(&token, &code).await.unwrap();
    assert_eq!(again, VerifyOutcome::ExpiredOrInvalidToken);

    let outcome = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &firefox_mac())
        .await
        .unwrap();
    assert!(outcome.is_allowed());
    assert_eq!(
        h.warden.list_trusted_devices(&identity.id).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_code_expires() {
    let h = harness().await;
    h.warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();
    let LoginOutcome::ChallengeRequired { token, .. } = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &firefox_mac())
        .await
        .unwrap()
    else {
        panic!("expected a challenge");
    };

    h.clock.advance(Duration::minutes(15));
    let outcome = h
        .warden
        .verify_challenge(&token, &h.notifier.last_code())
        .await
        .unwrap();
    assert_eq!(outcome, VerifyOutcome::ExpiredOrInvalidToken);

    let resend = h.warden.resend_challenge(&token).await.unwrap();
    assert_eq!(resend, ResendOutcome::InvalidToken);
}

#[tokio::test]
async fn test_resend_invalidates_previous_code_without_cooldown() {
    let h = harness_with(ChallengePolicy::default().resend_cooldown(Duration::zero())).await;
    h.warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();
    let LoginOutcome::ChallengeRequired { token, .. } = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &firefox_mac())
        .await
        .unwrap()
    else {
        panic!("expected a challenge");
    };
    let issued_code = h.notifier.last_code();

    assert!(matches!(
        h.warden.resend_challenge(&token).await.unwrap(),
        ResendOutcome::Resent {
            email_sent: true,
            ..
        }
    ));
    let first_resend = h.notifier.last_code();

    h.clock.advance(Duration::seconds(5));
    let ResendOutcome::Resent { expires_at, .. } = h.warden.resend_challenge(&token).await.unwrap()
    else {
        panic!("second resend should succeed without a cooldown");
    };
    assert_eq!(expires_at, t0() + Duration::seconds(5) + Duration::minutes(15));
    let newest = h.notifier.last_code();
    assert_eq!(h.notifier.codes().len(), 3);

    for stale in [&issued_code, &first_resend] {
        if stale != &newest {
            assert!(matches!(
                h.warden.verify_challenge(&token, stale).await.unwrap(),
                VerifyOutcome::InvalidCode { .. }
            ));
        }
    }
    assert!(
        h.warden
            .verify_challenge(&token, &newest)
            .await
            .unwrap()
            .is_verified()
    );
}

#[tokio::test]
async fn test_resend_cooldown() {
    let h = harness().await;
    h.warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();
    let LoginOutcome::ChallengeRequired { token, .. } = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &firefox_mac())
        .await
        .unwrap()
    else {
        panic!("expected a challenge");
    };
    let issued_code = h.notifier.last_code();

    assert_eq!(
        h.warden.resend_challenge(&token).await.unwrap(),
        ResendOutcome::TooSoon {
            retry_after: t0() + Duration::seconds(60)
        }
    );
    assert_eq!(h.notifier.codes().len(), 1);

    h.clock.advance(Duration::seconds(60));
    assert!(matches!(
        h.warden.resend_challenge(&token).await.unwrap(),
        ResendOutcome::Resent { .. }
    ));

    h.clock.advance(Duration::seconds(5));
    assert!(matches!(
        h.warden.resend_challenge(&token).await.unwrap(),
        ResendOutcome::TooSoon { .. }
    ));

    let newest = h.notifier.last_code();
    if issued_code != newest {
        assert!(matches!(
            h.warden.verify_challenge(&token, &issued_code).await.unwrap(),
            VerifyOutcome::InvalidCode { .. }
        ));
    }
    assert!(
        h.warden
            .verify_challenge(&token, &newest)
            .await
            .unwrap()
            .is_verified()
    );
}

#[tokio::test]
async fn test_rapid_resends_under_default_cooldown_keep_issued_code() {
    let h = harness().await;
    h.warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();
    let LoginOutcome::ChallengeRequired { token, .. } = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &firefox_mac())
        .await
        .unwrap()
    else {
        panic!("expected a challenge");
    };
    let issued_code = h.notifier.last_code();

    for _ in 0..2 {
        assert!(matches!(
            h.warden.resend_challenge(&token).await.unwrap(),
            ResendOutcome::TooSoon { .. }
        ));
        h.clock.advance(Duration::seconds(5));
    }
    assert_eq!(h.notifier.codes().len(), 1);

    assert!(
        h.warden
            .verify_challenge(&token, &issued_code)
            .await
            .unwrap()
            .is_verified()
    );
}

#[tokio::test]
async fn test_attempt_cap_burns_challenge() {
    let h = harness_with(ChallengePolicy::default().max_verify_attempts(3)).await;
    h.warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();
    let LoginOutcome::ChallengeRequired { token, .. } = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &firefox_mac())
        .await
        .unwrap()
    else {
        panic!("expected a challenge");
    };
    let code = h.notifier.last_code();

    for remaining in [2, 1, 0] {
        assert_eq!(
            h.warden
                .verify_challenge(&token, wrong_code(&code))
                .await
                .unwrap(),
            VerifyOutcome::InvalidCode {
                attempts_remaining: Some(remaining)
            }
        );
    }
    assert_eq!(
        h.warden.verify_challenge(&token, &code).await.unwrap(),
        VerifyOutcome::ExpiredOrInvalidToken
    );
}

#[tokio::test]
async fn test_notifier_failure_leaves_resendable_challenge() {
    let h = harness().await;
    h.warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();

    h.notifier.fail.store(true, Ordering::SeqCst);
    let outcome = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &firefox_mac())
        .await
        .unwrap();
    let LoginOutcome::ChallengeRequired {
        ref token,
        email_sent: false,
        ..
    } = outcome
    else {
        panic!("expected an unsent challenge, got {outcome:?}");
    };
    assert!(outcome.message().contains("resend"));

    h.notifier.fail.store(false, Ordering::SeqCst);
    h.clock.advance(Duration::seconds(60));
    assert!(matches!(
        h.warden.resend_challenge(token).await.unwrap(),
        ResendOutcome::Resent {
            email_sent: true,
            ..
        }
    ));
    assert!(
        h.warden
            .verify_challenge(token, &h.notifier.last_code())
            .await
            .unwrap()
            .is_verified()
    );
}

#[tokio::test]
async fn test_verifier_outage_is_an_error_and_not_a_failure() {
    let h = harness().await;
    h.verifier.down.store(true, Ordering::SeqCst);

    let result = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await;
    assert!(matches!(result, Err(WardenError::VerifierError(_))));

    h.verifier.down.store(false, Ordering::SeqCst);
    let outcome = h
        .warden
        .attempt_login("bob@x.com", "wrong", &chrome_windows())
        .await
        .unwrap();
    assert_eq!(outcome, LoginOutcome::InvalidCredentials { remaining: Some(4) });
}

#[tokio::test]
async fn test_messages_do_not_reveal_which_credential_was_wrong() {
    let h = harness().await;
    let unknown_user = h
        .warden
        .attempt_login("nobody@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();
    let wrong_password = h
        .warden
        .attempt_login("bob@x.com", "nope", &chrome_windows())
        .await
        .unwrap();
    assert_eq!(unknown_user, wrong_password);
    assert_eq!(unknown_user.message(), wrong_password.message());
}

#[tokio::test]
async fn test_session_management() {
    let h = harness().await;
    let LoginOutcome::Allowed {
        identity,
        session: first,
        ..
    } = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap()
    else {
        panic!("expected Allowed");
    };
    let LoginOutcome::Allowed {
        session: current, ..
    } = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap()
    else {
        panic!("expected Allowed");
    };

    h.clock.advance(Duration::minutes(1));
    assert!(h.warden.touch_session(&current.id).await.unwrap());
    assert_eq!(h.warden.list_sessions(&identity.id).await.unwrap().len(), 2);

    assert_eq!(
        h.warden
            .revoke_other_sessions(&identity.id, &current.id)
            .await
            .unwrap(),
        1
    );
    assert!(!h.warden.revoke_session(&identity.id, &first.id).await.unwrap());
    assert!(h.warden.revoke_session(&identity.id, &current.id).await.unwrap());

    // Forgetting the only trusted device means the next login is challenged,
    // since the identity has logged in before.
    let chrome: Fingerprint = "Chrome/Windows/Desktop".parse().unwrap();
    assert!(h.warden.forget_device(&identity.id, &chrome).await.unwrap());
    let outcome = h
        .warden
        .attempt_login("bob@x.com", "hunter2", &chrome_windows())
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::ChallengeRequired { .. }));
    assert_eq!(h.warden.list_challenges(&identity.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cleanup_prunes_old_rows_but_keeps_lockouts() {
    let h = harness().await;
    for _ in 0..5 {
        h.warden
            .attempt_login("bob@x.com", "wrong", &chrome_windows())
            .await
            .unwrap();
    }

    h.clock.advance(Duration::days(31));
    let stats = h.warden.cleanup().await.unwrap();
    assert_eq!(stats.attempts_deleted, 5);
    assert_eq!(stats.challenges_deleted, 0);
    assert_eq!(h.warden.list_lockouts("bob@x.com").await.unwrap().len(), 1);
}
