//! Login, password change and password reset against live sessions

mod support;

use admin::{
    AdminError,
    models::{AuditLogFilters, LoginCredentials, UpdateUser},
};
use serde_json::json;
use support::{Harness, PASSWORD};

fn login(email: &str, password: &str) -> LoginCredentials {
    LoginCredentials {
        email: email.to_string(),
        password: password.to_string(),
    }
}

fn token_from(body: &str) -> String {
    let start = body.find("token=").expect("reset link in body") + "token=".len();
    body[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect()
}

#[tokio::test]
async fn login_issues_a_valid_session() {
    let h = Harness::new().await;
    let user = h.user("login@aurora.dev").await;

    let outcome = h
        .core
        .credentials
        .login(
            login("LOGIN@aurora.dev ", PASSWORD),
            Some("203.0.113.5".into()),
            Some("Mozilla/5.0".into()),
        )
        .await
        .unwrap();
    assert_eq!(outcome.user.id, user.id);
    assert!(
        h.core
            .sessions
            .is_valid(&outcome.session.session_token)
            .await
            .unwrap()
    );
    assert_eq!(outcome.session.ip_address.as_deref(), Some("203.0.113.5"));

    let page = h
        .core
        .audit
        .query(&AuditLogFilters {
            action: Some("login".into()),
            user_id: Some(user.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].user_agent.as_deref(), Some("Mozilla/5.0"));
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let h = Harness::new().await;
    h.user("known@aurora.dev").await;

    let wrong_password = h
        .core
        .credentials
        .login(login("known@aurora.dev", "Wr0ng!Pass"), None, None)
        .await
        .unwrap_err();
    let unknown_email = h
        .core
        .credentials
        .login(login("ghost@aurora.dev", PASSWORD), None, None)
        .await
        .unwrap_err();

    assert!(matches!(wrong_password, AdminError::Unauthenticated));
    assert!(matches!(unknown_email, AdminError::Unauthenticated));
}

#[tokio::test]
async fn password_change_revokes_every_session() {
    let h = Harness::new().await;
    let user = h.user("rotate@aurora.dev").await;
    for _ in 0..3 {
        h.core
            .credentials
            .login(login("rotate@aurora.dev", PASSWORD), None, None)
            .await
            .unwrap();
    }
    assert_eq!(h.core.sessions.count_active(user.id).await.unwrap(), 3);

    h.core
        .credentials
        .change_password(user.id, PASSWORD, "N3w!Secret")
        .await
        .unwrap();

    assert_eq!(h.core.sessions.count_active(user.id).await.unwrap(), 0);
    assert!(
        h.core
            .credentials
            .login(login("rotate@aurora.dev", PASSWORD), None, None)
            .await
            .is_err()
    );
    assert!(
        h.core
            .credentials
            .login(login("rotate@aurora.dev", "N3w!Secret"), None, None)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn password_change_checks_current_and_policy() {
    let h = Harness::new().await;
    let user = h.user("policy@aurora.dev").await;
    let session = h
        .core
        .credentials
        .login(login("policy@aurora.dev", PASSWORD), None, None)
        .await
        .unwrap()
        .session;

    let err = h
        .core
        .credentials
        .change_password(user.id, "Wr0ng!Pass", "N3w!Secret")
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::Validation(_)));

    let err = h
        .core
        .credentials
        .change_password(user.id, PASSWORD, "short")
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::Validation(_)));

    // Rejected changes leave sessions alone
    assert!(
        h.core
            .sessions
            .is_valid(&session.session_token)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn logout_ends_only_that_session() {
    let h = Harness::new().await;
    let user = h.user("logout@aurora.dev").await;
    let first = h
        .core
        .credentials
        .login(login("logout@aurora.dev", PASSWORD), None, None)
        .await
        .unwrap()
        .session;
    let second = h
        .core
        .credentials
        .login(login("logout@aurora.dev", PASSWORD), None, None)
        .await
        .unwrap()
        .session;

    h.core.credentials.logout(&first.session_token).await.unwrap();
    h.core.credentials.logout(&first.session_token).await.unwrap();

    assert!(
        !h.core
            .sessions
            .is_valid(&first.session_token)
            .await
            .unwrap()
    );
    assert!(
        h.core
            .sessions
            .is_valid(&second.session_token)
            .await
            .unwrap()
    );
    assert_eq!(h.core.sessions.count_active(user.id).await.unwrap(), 1);
}

#[tokio::test]
async fn revoking_other_sessions_keeps_the_caller() {
    let h = Harness::new().await;
    let user = h.user("elsewhere@aurora.dev").await;
    let mut sessions = Vec::new();
    for _ in 0..3 {
        let outcome = h
            .core
            .credentials
            .login(login("elsewhere@aurora.dev", PASSWORD), None, None)
            .await
            .unwrap();
        sessions.push(outcome.session);
    }

    let removed = h
        .core
        .credentials
        .revoke_other_sessions(user.id, &sessions[0].session_token)
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(
        h.core
            .sessions
            .is_valid(&sessions[0].session_token)
            .await
            .unwrap()
    );
    for revoked in &sessions[1..] {
        assert!(
            !h.core
                .sessions
                .is_valid(&revoked.session_token)
                .await
                .unwrap()
        );
    }

    let page = h
        .core
        .audit
        .query(&AuditLogFilters {
            action: Some("sessions_revoked".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    let metadata = page.entries[0].metadata.as_ref().unwrap();
    assert_eq!(metadata["revoked"], json!(2));
}

#[tokio::test]
async fn reset_request_does_not_reveal_accounts() {
    let h = Harness::new().await;
    assert!(
        h.core
            .password_resets
            .request_reset("nobody@aurora.dev")
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn reset_token_is_single_use_and_revokes_sessions() {
    let mut h = Harness::new().await;
    let user = h.user("forgot@aurora.dev").await;
    h.core
        .credentials
        .login(login("forgot@aurora.dev", PASSWORD), None, None)
        .await
        .unwrap();

    h.core
        .password_resets
        .request_reset("forgot@aurora.dev")
        .await
        .unwrap();
    let mail = h.mail_to("forgot@aurora.dev").await;
    assert!(mail.body.contains("http://localhost:3000/reset-password?token="));
    let token = token_from(&mail.body);
    assert_eq!(token.len(), 64);

    assert_eq!(
        h.core.password_resets.validate_token(&token).await.unwrap(),
        Some(user.id)
    );

    h.core
        .password_resets
        .reset_password(&token, "R3set!Done")
        .await
        .unwrap();
    assert_eq!(h.core.sessions.count_active(user.id).await.unwrap(), 0);
    assert!(
        h.core
            .credentials
            .login(login("forgot@aurora.dev", "R3set!Done"), None, None)
            .await
            .is_ok()
    );

    let err = h
        .core
        .password_resets
        .reset_password(&token, "Again!N0pe")
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resets_with_one_token_succeed_once() {
    let mut h = Harness::new().await;
    h.user("race@aurora.dev").await;
    h.core
        .password_resets
        .request_reset("race@aurora.dev")
        .await
        .unwrap();
    let token = token_from(&h.mail_to("race@aurora.dev").await.body);

    let attempts: Vec<_> = (0..4)
        .map(|i| {
            let resets = h.core.password_resets.clone();
            let token = token.clone();
            tokio::spawn(async move {
                resets
                    .reset_password(&token, &format!("R4ce!Pass{}", i))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(err) => assert!(matches!(err, AdminError::Validation(_))),
        }
    }
    assert_eq!(succeeded, 1);

    let page = h
        .core
        .audit
        .query(&AuditLogFilters {
            action: Some("password_reset".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn newer_reset_request_supersedes_older_token() {
    let mut h = Harness::new().await;
    h.user("twice@aurora.dev").await;

    h.core
        .password_resets
        .request_reset("twice@aurora.dev")
        .await
        .unwrap();
    let first = token_from(&h.mail_to("twice@aurora.dev").await.body);
    h.core
        .password_resets
        .request_reset("twice@aurora.dev")
        .await
        .unwrap();
    let second = token_from(&h.mail_to("twice@aurora.dev").await.body);

    assert_eq!(
        h.core.password_resets.validate_token(&first).await.unwrap(),
        None
    );
    assert!(
        h.core
            .password_resets
            .validate_token(&second)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn duplicate_email_registration_conflicts() {
    let h = Harness::new().await;
    h.user("dup@aurora.dev").await;

    let err = h
        .core
        .users
        .register(
            admin::models::NewUser {
                email: "Dup@Aurora.dev".into(),
                name: None,
                first_name: None,
                last_name: None,
                password: PASSWORD.into(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::Conflict(_)));
}

#[tokio::test]
async fn deleting_a_user_keeps_their_audit_trail() {
    let h = Harness::new().await;
    let user = h.user("leaver@aurora.dev").await;
    h.core
        .users
        .update_profile(
            user.id,
            UpdateUser {
                name: Some("Leaver".into()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    h.core
        .credentials
        .login(login("leaver@aurora.dev", PASSWORD), None, None)
        .await
        .unwrap();

    h.core.users.delete(user.id, None).await.unwrap();

    assert!(
        h.core
            .users
            .find_by_email("leaver@aurora.dev")
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(h.core.sessions.count_active(user.id).await.unwrap(), 0);

    let page = h
        .core
        .audit
        .query(&AuditLogFilters {
            entity_id: Some(user.id.to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let actions: Vec<&str> = page
        .entries
        .iter()
        .map(|e| e.action.as_str())
        .collect();
    assert!(actions.contains(&"user_created"));
    assert!(actions.contains(&"user_updated"));
    assert!(actions.contains(&"user_deleted"));
    assert!(page.entries.iter().all(|e| e.user_id.is_none()));
}
