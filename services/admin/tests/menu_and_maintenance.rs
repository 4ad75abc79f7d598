//! Stored menu visibility, audit paging and the expiry sweeps

mod support;

use admin::maintenance::SweepReport;
use admin::models::{AuditLogFilters, AuditLogInput, MenuItem, NewSession, PasswordResetToken};
use chrono::{Duration, Utc};
use serde_json::json;
use support::Harness;
use uuid::Uuid;

fn menu_item(
    label: &str,
    href: Option<&str>,
    permission: Option<&str>,
    parent: Option<Uuid>,
    order: i32,
) -> MenuItem {
    MenuItem {
        id: Uuid::new_v4(),
        label: label.to_string(),
        href: href.map(str::to_string),
        icon: None,
        permission_id: permission.map(str::to_string),
        is_active: true,
        order,
        parent_id: parent,
    }
}

#[tokio::test]
async fn visible_menu_follows_current_grants() {
    let h = Harness::new().await;
    let user = h.user("menu@aurora.dev").await;
    let role = h.role("menu-reader", &["audit:read"]).await;

    let dashboard = menu_item("Dashboard", Some("/"), None, None, 0);
    let admin_group = menu_item("Administration", None, None, None, 1);
    let audit = menu_item(
        "Audit",
        Some("/admin/audit"),
        Some("audit:read"),
        Some(admin_group.id),
        0,
    );
    let users = menu_item(
        "Users",
        Some("/admin/users"),
        Some("user:read"),
        Some(admin_group.id),
        1,
    );
    for item in [&dashboard, &admin_group, &audit, &users] {
        h.core.store.insert_menu_item(item).await.unwrap();
    }

    let menu = h.core.menu.visible_menu(user.id).await.unwrap();
    let labels: Vec<&str> = menu.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, vec!["Dashboard"]);

    h.core.roles.assign_role(user.id, role.id, None).await.unwrap();
    let menu = h.core.menu.visible_menu(user.id).await.unwrap();
    assert_eq!(menu.len(), 2);
    assert_eq!(menu[1].label, "Administration");
    assert_eq!(menu[1].children.len(), 1);
    assert_eq!(menu[1].children[0].label, "Audit");

    h.core.roles.revoke_role(user.id, role.id, None).await.unwrap();
    assert_eq!(h.core.menu.visible_menu(user.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn audit_pages_report_totals() {
    let h = Harness::new().await;
    for i in 0..13 {
        h.core
            .audit
            .log(AuditLogInput::new("export", "reports").metadata(json!({ "run": i })))
            .await;
    }

    let first = h
        .core
        .audit
        .query(&AuditLogFilters {
            module: Some("reports".into()),
            limit: Some(10),
            offset: Some(0),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(first.total, 13);
    assert_eq!(first.count, 10);
    assert!(first.has_more);

    let second = h
        .core
        .audit
        .query(&AuditLogFilters {
            module: Some("reports".into()),
            limit: Some(10),
            offset: Some(10),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.count, 3);
    assert!(!second.has_more);

    let seen: std::collections::HashSet<Uuid> = first
        .entries
        .iter()
        .chain(second.entries.iter())
        .map(|e| e.id)
        .collect();
    assert_eq!(seen.len(), 13);
}

#[tokio::test]
async fn sweep_clears_expired_sessions_and_reset_tokens() {
    let h = Harness::new().await;
    let user = h.user("sweep@aurora.dev").await;
    let now = Utc::now();

    let sessions = [
        ("gone-1", -Duration::hours(2)),
        ("gone-2", -Duration::seconds(1)),
        ("kept", Duration::hours(1)),
    ];
    for (token, offset) in sessions {
        h.core
            .sessions
            .create(NewSession {
                session_token: token.to_string(),
                user_id: user.id,
                expires: now + offset,
                ip_address: None,
                user_agent: None,
            })
            .await
            .unwrap();
    }
    h.core
        .store
        .replace_reset_token(&PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: "0".repeat(64),
            expires_at: now - Duration::minutes(1),
            created_at: now - Duration::minutes(31),
        })
        .await
        .unwrap();

    let maintenance = h.core.maintenance();
    assert_eq!(
        maintenance.run_once().await,
        SweepReport {
            sessions: 2,
            reset_tokens: 1,
        }
    );
    assert_eq!(maintenance.run_once().await, SweepReport::default());
    assert!(h.core.sessions.is_valid("kept").await.unwrap());
}

#[tokio::test]
async fn expired_reset_token_is_dropped_on_validation() {
    let h = Harness::new().await;
    let user = h.user("late@aurora.dev").await;
    let now = Utc::now();
    let plaintext = "f".repeat(64);

    h.core
        .store
        .replace_reset_token(&PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: admin::secrets::hash_token(&plaintext),
            expires_at: now - Duration::seconds(1),
            created_at: now - Duration::minutes(30),
        })
        .await
        .unwrap();

    assert_eq!(
        h.core
            .password_resets
            .validate_token(&plaintext)
            .await
            .unwrap(),
        None
    );
    assert_eq!(h.core.password_resets.sweep_expired().await.unwrap(), 0);
}
