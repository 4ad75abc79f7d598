//! Audit log service
//!
//! Appends immutable entries describing who did what, when and from where,
//! and answers filtered, paginated queries over them.
//!
//! Writing an entry never fails the audited operation: [`AuditLog::log`]
//! reports store failures through `tracing` and returns normally. Role
//! assignment and revocation instead build their entry with
//! [`AuditLog::prepare`] and commit it in the same transaction as the
//! mutation.

use chrono::Utc;
use serde_json::{Value, json};
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{AdminError, AdminResult};
use crate::models::{AuditLogEntry, AuditLogFilters, AuditLogInput, AuditLogPage};
use crate::store::SharedStore;

/// Well-known audit actions
pub mod actions {
    pub const ROLE_ASSIGNED: &str = "role_assigned";
    pub const ROLE_REMOVED: &str = "role_removed";
    pub const ROLE_CREATED: &str = "role_created";
    pub const ROLE_UPDATED: &str = "role_updated";
    pub const ROLE_DELETED: &str = "role_deleted";
    pub const ROLE_PERMISSIONS_UPDATED: &str = "role_permissions_updated";
    pub const USER_CREATED: &str = "user_created";
    pub const USER_UPDATED: &str = "user_updated";
    pub const USER_DELETED: &str = "user_deleted";
    pub const LOGIN: &str = "login";
    pub const LOGOUT: &str = "logout";
    pub const SESSIONS_REVOKED: &str = "sessions_revoked";
    pub const PASSWORD_CHANGED: &str = "password_changed";
    pub const PASSWORD_RESET_REQUESTED: &str = "password_reset_requested";
    pub const PASSWORD_RESET: &str = "password_reset";
}

/// Audit pagination bounds
#[derive(Debug, Clone, Copy)]
pub struct AuditConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
        }
    }
}

/// Audit log service
#[derive(Clone)]
pub struct AuditLog {
    store: SharedStore,
    config: AuditConfig,
}

impl AuditLog {
    pub fn new(store: SharedStore, config: AuditConfig) -> Self {
        Self { store, config }
    }

    /// Turn caller input into a complete entry, filling request details
    /// from the ambient request context where the caller left them empty.
    pub fn prepare(&self, input: AuditLogInput) -> AuditLogEntry {
        let context = RequestContext::current();
        if context.is_none() && input.request_id.is_none() {
            warn!(
                action = %input.action,
                module = %input.module,
                "No request context available for audit entry"
            );
        }
        let context = context.unwrap_or_default();

        AuditLogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: input.user_id,
            action: input.action,
            module: input.module,
            area: input.area.map(|a| a.as_str().to_string()),
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            old_values: input.old_values,
            new_values: input.new_values,
            ip_address: input.ip_address.or(context.ip_address),
            user_agent: input.user_agent.or(context.user_agent),
            request_id: input
                .request_id
                .or(context.request_id)
                .or_else(|| Some(Uuid::new_v4().to_string())),
            metadata: input.metadata,
        }
    }

    /// Append one entry. Failures are logged, never returned.
    pub async fn log(&self, input: AuditLogInput) {
        let entry = self.prepare(input);
        match self.store.insert_audit_entry(&entry).await {
            Ok(()) => debug!("Audit entry {} recorded: {}", entry.id, entry.action),
            Err(e) => warn!(
                action = %entry.action,
                module = %entry.module,
                "Failed to write audit entry: {}",
                e
            ),
        }
    }

    /// Record a before/after snapshot of an update
    pub async fn log_entity_change(
        &self,
        input: AuditLogInput,
        old_values: Value,
        new_values: Value,
    ) {
        self.log(input.old_values(old_values).new_values(new_values))
            .await;
    }

    /// Run `operation`, then record its outcome and wall-clock duration.
    ///
    /// The operation's own result is returned unchanged, errors included.
    pub async fn wrap_operation<T, E, F, Fut>(
        &self,
        input: AuditLogInput,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let started = Instant::now();
        let result = operation().await;
        let duration = started.elapsed().as_millis() as u64;

        let mut metadata = match input.metadata.clone() {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        metadata.insert("duration".to_string(), json!(duration));
        match &result {
            Ok(_) => {
                metadata.insert("success".to_string(), json!(true));
            }
            Err(e) => {
                metadata.insert("success".to_string(), json!(false));
                metadata.insert("error".to_string(), json!(e.to_string()));
            }
        }

        self.log(input.metadata(Value::Object(metadata))).await;
        result
    }

    /// Filtered, paginated view of the trail, newest first
    pub async fn query(&self, filters: &AuditLogFilters) -> AdminResult<AuditLogPage> {
        if let (Some(start), Some(end)) = (filters.start_date, filters.end_date) {
            if start > end {
                return Err(AdminError::Validation(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }

        let limit = filters
            .limit
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit)
            .max(1) as i64;
        let offset = filters.offset.unwrap_or(0) as i64;

        let (entries, total) = self
            .store
            .query_audit_entries(filters, limit, offset)
            .await?;
        let count = entries.len() as i64;

        Ok(AuditLogPage {
            entries,
            total,
            count,
            limit,
            offset,
            has_more: offset + count < total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Area, User};
    use crate::store::{MemoryStore, UserStore};
    use std::sync::Arc;

    fn audit_log() -> AuditLog {
        AuditLog::new(Arc::new(MemoryStore::new()), AuditConfig::default())
    }

    async fn audit_log_with_user() -> (AuditLog, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "auditor@aurora.dev".into(),
            name: None,
            first_name: None,
            last_name: None,
            email_verified_at: None,
            image: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_user(&user, None).await.unwrap();
        (AuditLog::new(store, AuditConfig::default()), user.id)
    }

    #[tokio::test]
    async fn paginates_newest_first() {
        let audit = audit_log();
        for i in 0..25 {
            audit
                .log(AuditLogInput::new("user_updated", "users").entity("User", i))
                .await;
        }

        let page = audit
            .query(&AuditLogFilters {
                limit: Some(10),
                offset: Some(0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.count, 10);
        assert!(page.has_more);
        assert!(
            page.entries
                .windows(2)
                .all(|w| w[0].timestamp >= w[1].timestamp)
        );

        let last = audit
            .query(&AuditLogFilters {
                limit: Some(10),
                offset: Some(20),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(last.count, 5);
        assert!(!last.has_more);
    }

    #[tokio::test]
    async fn limit_defaults_and_caps() {
        let audit = audit_log();
        let page = audit.query(&AuditLogFilters::default()).await.unwrap();
        assert_eq!(page.limit, 50);
        assert_eq!(page.total, 0);
        assert!(!page.has_more);

        let page = audit
            .query(&AuditLogFilters {
                limit: Some(10_000),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.limit, 500);
    }

    #[tokio::test]
    async fn zero_max_limit_still_returns_a_page() {
        let audit = AuditLog::new(
            Arc::new(MemoryStore::new()),
            AuditConfig {
                default_limit: 50,
                max_limit: 0,
            },
        );
        audit.log(AuditLogInput::new("export", "reports")).await;

        let page = audit.query(&AuditLogFilters::default()).await.unwrap();
        assert_eq!(page.limit, 1);
        assert_eq!(page.count, 1);
    }

    #[tokio::test]
    async fn filters_combine_with_and() {
        let (audit, user) = audit_log_with_user().await;
        audit
            .log(
                AuditLogInput::new("login", "auth")
                    .user(Some(user))
                    .area(Area::Admin),
            )
            .await;
        audit
            .log(AuditLogInput::new("login", "auth").area(Area::Public))
            .await;
        audit
            .log(AuditLogInput::new("role_created", "roles").user(Some(user)))
            .await;

        let page = audit
            .query(&AuditLogFilters {
                user_id: Some(user),
                action: Some("login".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].area.as_deref(), Some("admin"));

        let page = audit
            .query(&AuditLogFilters {
                area: Some(Area::Public),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].user_id, None);
    }

    #[tokio::test]
    async fn entry_for_unknown_actor_is_dropped_without_failing() {
        let audit = audit_log();
        audit
            .log(AuditLogInput::new("login", "auth").user(Some(Uuid::new_v4())))
            .await;

        let page = audit.query(&AuditLogFilters::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn inverted_date_range_is_rejected() {
        let audit = audit_log();
        let now = Utc::now();
        let err = audit
            .query(&AuditLogFilters {
                start_date: Some(now),
                end_date: Some(now - chrono::Duration::hours(1)),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Validation(_)));
    }

    #[tokio::test]
    async fn entity_change_keeps_snapshots_verbatim() {
        let audit = audit_log();
        let old = json!({"name": "Editor", "tags": [1, 2]});
        let new = json!({"name": "Senior Editor", "tags": [1, 2, 3]});
        audit
            .log_entity_change(
                AuditLogInput::new("role_updated", "roles").entity("Role", "r-1"),
                old.clone(),
                new.clone(),
            )
            .await;

        let page = audit.query(&AuditLogFilters::default()).await.unwrap();
        assert_eq!(page.entries[0].old_values, Some(old));
        assert_eq!(page.entries[0].new_values, Some(new));
    }

    #[tokio::test]
    async fn wrap_operation_records_success() {
        let audit = audit_log();
        let value = audit
            .wrap_operation(AuditLogInput::new("export", "reports"), || async {
                Ok::<_, AdminError>(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let page = audit.query(&AuditLogFilters::default()).await.unwrap();
        let metadata = page.entries[0].metadata.as_ref().unwrap();
        assert_eq!(metadata["success"], json!(true));
        assert!(metadata["duration"].is_u64());
        assert!(metadata.get("error").is_none());
    }

    #[tokio::test]
    async fn wrap_operation_reraises_failure() {
        let audit = audit_log();
        let err = audit
            .wrap_operation(
                AuditLogInput::new("export", "reports").metadata(json!({"format": "csv"})),
                || async { Err::<(), _>(AdminError::Conflict("busy".into())) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Conflict(ref m) if m == "busy"));

        let page = audit.query(&AuditLogFilters::default()).await.unwrap();
        assert_eq!(page.total, 1);
        let metadata = page.entries[0].metadata.as_ref().unwrap();
        assert_eq!(metadata["success"], json!(false));
        assert_eq!(metadata["error"], json!("Conflict: busy"));
        assert_eq!(metadata["format"], json!("csv"));
    }

    #[tokio::test]
    async fn context_fills_missing_fields() {
        let audit = audit_log();
        let context = RequestContext {
            ip_address: Some("203.0.113.9".into()),
            user_agent: Some("curl/8".into()),
            request_id: Some("req-1".into()),
        };

        let entry = context
            .scope(async {
                let mut input = AuditLogInput::new("login", "auth");
                input.ip_address = Some("192.0.2.1".into());
                audit.prepare(input)
            })
            .await;

        assert_eq!(entry.ip_address.as_deref(), Some("192.0.2.1"));
        assert_eq!(entry.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(entry.request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn missing_context_still_gets_request_id() {
        let audit = audit_log();
        let entry = audit.prepare(AuditLogInput::new("sweep", "sessions"));
        assert!(entry.request_id.is_some());
        assert_eq!(entry.ip_address, None);
        assert_eq!(entry.user_agent, None);
    }
}
