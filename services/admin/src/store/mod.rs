//! Persistent store seams
//!
//! Each trait covers one aggregate of the admin data model. Both adapters
//! implement all of them: [`PgStore`] against PostgreSQL and [`MemoryStore`]
//! in-process. Services receive a [`SharedStore`] handle constructed by the
//! process entry point.
//!
//! Methods that must be atomic are single trait calls so each adapter can
//! run them in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AuditLogEntry, AuditLogFilters, Credentials, MenuItem, PasswordResetToken, Permission, Role,
    RoleWithPermissions, Session, User, UserRole,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Users and their credentials
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user and, when given, its credentials in one transaction
    async fn insert_user(&self, user: &User, credentials: Option<&Credentials>)
    -> DatabaseResult<()>;

    async fn find_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;

    async fn list_users(&self) -> DatabaseResult<Vec<User>>;

    /// Overwrite the profile columns of an existing user
    async fn update_user(&self, user: &User) -> DatabaseResult<()>;

    /// Delete a user with its credentials, sessions, role assignments and
    /// reset tokens. Audit entries survive with their user reference cleared.
    async fn delete_user(&self, id: Uuid) -> DatabaseResult<bool>;

    async fn find_credentials(&self, user_id: Uuid) -> DatabaseResult<Option<Credentials>>;

    /// Replace the password hash and delete every session of the user in
    /// one transaction. Returns the number of revoked sessions.
    async fn replace_password_and_revoke_sessions(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> DatabaseResult<u64>;
}

/// Roles, permissions and the joins between them and users
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn list_permissions(&self) -> DatabaseResult<Vec<Permission>>;

    async fn list_permissions_by_module(&self, module: &str) -> DatabaseResult<Vec<Permission>>;

    async fn permission_exists(&self, id: &str) -> DatabaseResult<bool>;

    /// Catalog seeding; existing ids are left as they are
    async fn upsert_permission(&self, permission: &Permission) -> DatabaseResult<()>;

    async fn insert_role(&self, role: &Role) -> DatabaseResult<()>;

    async fn find_role_by_id(&self, id: Uuid) -> DatabaseResult<Option<Role>>;

    async fn find_role_by_name(&self, name: &str) -> DatabaseResult<Option<Role>>;

    async fn list_roles(&self) -> DatabaseResult<Vec<Role>>;

    async fn update_role(&self, role: &Role) -> DatabaseResult<()>;

    /// Delete a role together with its permission links and assignments
    async fn delete_role(&self, id: Uuid) -> DatabaseResult<bool>;

    async fn role_permission_ids(&self, role_id: Uuid) -> DatabaseResult<BTreeSet<String>>;

    /// Replace the full permission set of a role in one transaction
    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[String],
    ) -> DatabaseResult<()>;

    /// Deduplicated union of permissions across every role of the user
    async fn user_permission_ids(&self, user_id: Uuid) -> DatabaseResult<BTreeSet<String>>;

    async fn user_has_permission(&self, user_id: Uuid, permission_id: &str)
    -> DatabaseResult<bool>;

    async fn user_has_any_permission(
        &self,
        user_id: Uuid,
        permission_ids: &[String],
    ) -> DatabaseResult<bool>;

    async fn user_roles_with_permissions(
        &self,
        user_id: Uuid,
    ) -> DatabaseResult<Vec<RoleWithPermissions>>;

    async fn find_user_role(&self, user_id: Uuid, role_id: Uuid)
    -> DatabaseResult<Option<UserRole>>;

    /// Insert the assignment and its audit entry in one transaction.
    /// A duplicate pair fails with a unique violation.
    async fn insert_user_role(
        &self,
        assignment: &UserRole,
        audit: &AuditLogEntry,
    ) -> DatabaseResult<()>;

    /// Delete the assignment and write its audit entry in one transaction.
    /// Returns false, writing nothing, when the pair does not exist.
    async fn delete_user_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        audit: &AuditLogEntry,
    ) -> DatabaseResult<bool>;
}

/// Server-tracked sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> DatabaseResult<()>;

    async fn find_session(&self, session_token: &str) -> DatabaseResult<Option<Session>>;

    /// Exists and `expires > now`
    async fn session_is_valid(&self, session_token: &str, now: DateTime<Utc>)
    -> DatabaseResult<bool>;

    async fn delete_session(&self, session_token: &str) -> DatabaseResult<bool>;

    /// Newest first
    async fn list_sessions_for_user(
        &self,
        user_id: Uuid,
        include_expired: bool,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Session>>;

    async fn delete_sessions_for_user_except(
        &self,
        user_id: Uuid,
        keep_token: &str,
    ) -> DatabaseResult<u64>;

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> DatabaseResult<u64>;

    /// Delete every session with `expires <= now`
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> DatabaseResult<u64>;

    async fn count_active_sessions(&self, user_id: Uuid, now: DateTime<Utc>)
    -> DatabaseResult<u64>;
}

/// Append-only audit trail
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit_entry(&self, entry: &AuditLogEntry) -> DatabaseResult<()>;

    /// Matching entries newest first, plus the total match count
    async fn query_audit_entries(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<(Vec<AuditLogEntry>, i64)>;
}

/// Navigation menu definition
#[async_trait]
pub trait MenuStore: Send + Sync {
    async fn list_menu_items(&self) -> DatabaseResult<Vec<MenuItem>>;

    async fn insert_menu_item(&self, item: &MenuItem) -> DatabaseResult<()>;
}

/// Password reset tokens
#[async_trait]
pub trait PasswordResetStore: Send + Sync {
    /// Drop the user's previous tokens and store the new one
    async fn replace_reset_token(&self, token: &PasswordResetToken) -> DatabaseResult<()>;

    async fn find_reset_token_by_hash(
        &self,
        token_hash: &str,
    ) -> DatabaseResult<Option<PasswordResetToken>>;

    async fn delete_reset_token(&self, id: Uuid) -> DatabaseResult<bool>;

    /// Consume the token `token_id` if it is still unexpired at `now`, then
    /// write the new password hash and delete all sessions and all reset
    /// tokens of its user, in one transaction.
    ///
    /// Returns the user and the number of revoked sessions, or `None` when
    /// the token was already used, replaced or expired. Of two concurrent
    /// calls with the same token at most one gets `Some`.
    async fn complete_password_reset(
        &self,
        token_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<(Uuid, u64)>>;

    async fn delete_expired_reset_tokens(&self, now: DateTime<Utc>) -> DatabaseResult<u64>;
}

/// Everything the admin services need from persistence
pub trait Store:
    UserStore + RbacStore + SessionStore + AuditStore + MenuStore + PasswordResetStore
{
}

impl<T> Store for T where
    T: UserStore + RbacStore + SessionStore + AuditStore + MenuStore + PasswordResetStore
{
}

/// Store handle passed to every service
pub type SharedStore = Arc<dyn Store>;
