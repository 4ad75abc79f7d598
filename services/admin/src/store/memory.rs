//! In-process store
//!
//! Keeps every table in one lock-guarded state value, so each trait call is
//! atomic. Enforces the same uniqueness, foreign-key and cascade rules as the
//! PostgreSQL schema, including that audit and assignment actors must be
//! existing users.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditStore, MenuStore, PasswordResetStore, RbacStore, SessionStore, UserStore};
use crate::models::{
    AuditLogEntry, AuditLogFilters, Credentials, MenuItem, PasswordResetToken, Permission, Role,
    RoleWithPermissions, Session, User, UserRole,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    credentials: HashMap<Uuid, Credentials>,
    roles: HashMap<Uuid, Role>,
    permissions: BTreeMap<String, Permission>,
    role_permissions: BTreeSet<(Uuid, String)>,
    user_roles: BTreeMap<(Uuid, Uuid), UserRole>,
    sessions: HashMap<String, Session>,
    audit: Vec<AuditLogEntry>,
    menu: Vec<MenuItem>,
    reset_tokens: HashMap<Uuid, PasswordResetToken>,
}

impl MemoryState {
    fn revoke_sessions_of(&mut self, user_id: Uuid) -> u64 {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        (before - self.sessions.len()) as u64
    }

    fn set_password(&mut self, user_id: Uuid, password_hash: &str) -> DatabaseResult<()> {
        if !self.users.contains_key(&user_id) {
            return Err(DatabaseError::NotFound(format!("user {}", user_id)));
        }
        self.credentials.insert(
            user_id,
            Credentials {
                user_id,
                password_hash: password_hash.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Foreign key from an optional actor column to `users`
    fn check_actor(&self, actor: Option<Uuid>) -> DatabaseResult<()> {
        match actor {
            Some(id) if !self.users.contains_key(&id) => {
                Err(DatabaseError::NotFound(format!("user {}", id)))
            }
            _ => Ok(()),
        }
    }

    fn permissions_of_role(&self, role_id: Uuid) -> BTreeSet<String> {
        self.role_permissions
            .iter()
            .filter(|(r, _)| *r == role_id)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn roles_of_user(&self, user_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.user_roles
            .keys()
            .filter(move |(u, _)| *u == user_id)
            .map(|(_, r)| *r)
    }
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(
        &self,
        user: &User,
        credentials: Option<&Credentials>,
    ) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::UniqueViolation("users_email_key".to_string()));
        }
        if state.users.contains_key(&user.id) {
            return Err(DatabaseError::UniqueViolation("users_pkey".to_string()));
        }
        state.users.insert(user.id, user.clone());
        if let Some(credentials) = credentials {
            state.credentials.insert(user.id, credentials.clone());
        }
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> DatabaseResult<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn update_user(&self, user: &User) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        match state.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(DatabaseError::NotFound(format!("user {}", user.id))),
        }
    }

    async fn delete_user(&self, id: Uuid) -> DatabaseResult<bool> {
        let mut state = self.state.write().await;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        state.credentials.remove(&id);
        state.revoke_sessions_of(id);
        state.user_roles.retain(|(u, _), _| *u != id);
        state.reset_tokens.retain(|_, t| t.user_id != id);
        for entry in state.audit.iter_mut().filter(|e| e.user_id == Some(id)) {
            entry.user_id = None;
        }
        Ok(true)
    }

    async fn find_credentials(&self, user_id: Uuid) -> DatabaseResult<Option<Credentials>> {
        Ok(self.state.read().await.credentials.get(&user_id).cloned())
    }

    async fn replace_password_and_revoke_sessions(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> DatabaseResult<u64> {
        let mut state = self.state.write().await;
        state.set_password(user_id, password_hash)?;
        Ok(state.revoke_sessions_of(user_id))
    }
}

#[async_trait]
impl RbacStore for MemoryStore {
    async fn list_permissions(&self) -> DatabaseResult<Vec<Permission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<Permission> =
            state.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.module.cmp(&b.module).then_with(|| a.id.cmp(&b.id)));
        Ok(permissions)
    }

    async fn list_permissions_by_module(&self, module: &str) -> DatabaseResult<Vec<Permission>> {
        let state = self.state.read().await;
        Ok(state
            .permissions
            .values()
            .filter(|p| p.module == module)
            .cloned()
            .collect())
    }

    async fn permission_exists(&self, id: &str) -> DatabaseResult<bool> {
        Ok(self.state.read().await.permissions.contains_key(id))
    }

    async fn upsert_permission(&self, permission: &Permission) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        state
            .permissions
            .entry(permission.id.clone())
            .or_insert_with(|| permission.clone());
        Ok(())
    }

    async fn insert_role(&self, role: &Role) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        if state.roles.values().any(|r| r.name == role.name) {
            return Err(DatabaseError::UniqueViolation("roles_name_key".to_string()));
        }
        state.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn find_role_by_id(&self, id: Uuid) -> DatabaseResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> DatabaseResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.name == name).cloned())
    }

    async fn list_roles(&self) -> DatabaseResult<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn update_role(&self, role: &Role) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        if state
            .roles
            .values()
            .any(|r| r.name == role.name && r.id != role.id)
        {
            return Err(DatabaseError::UniqueViolation("roles_name_key".to_string()));
        }
        match state.roles.get_mut(&role.id) {
            Some(existing) => {
                *existing = role.clone();
                Ok(())
            }
            None => Err(DatabaseError::NotFound(format!("role {}", role.id))),
        }
    }

    async fn delete_role(&self, id: Uuid) -> DatabaseResult<bool> {
        let mut state = self.state.write().await;
        if state.roles.remove(&id).is_none() {
            return Ok(false);
        }
        state.role_permissions.retain(|(r, _)| *r != id);
        state.user_roles.retain(|(_, r), _| *r != id);
        Ok(true)
    }

    async fn role_permission_ids(&self, role_id: Uuid) -> DatabaseResult<BTreeSet<String>> {
        Ok(self.state.read().await.permissions_of_role(role_id))
    }

    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[String],
    ) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&role_id) {
            return Err(DatabaseError::NotFound(format!("role {}", role_id)));
        }
        if let Some(unknown) = permission_ids
            .iter()
            .find(|id| !state.permissions.contains_key(id.as_str()))
        {
            return Err(DatabaseError::NotFound(format!("permission {}", unknown)));
        }
        state.role_permissions.retain(|(r, _)| *r != role_id);
        for id in permission_ids {
            state.role_permissions.insert((role_id, id.clone()));
        }
        Ok(())
    }

    async fn user_permission_ids(&self, user_id: Uuid) -> DatabaseResult<BTreeSet<String>> {
        let state = self.state.read().await;
        Ok(state
            .roles_of_user(user_id)
            .flat_map(|role_id| state.permissions_of_role(role_id))
            .collect())
    }

    async fn user_has_permission(
        &self,
        user_id: Uuid,
        permission_id: &str,
    ) -> DatabaseResult<bool> {
        let state = self.state.read().await;
        Ok(state.roles_of_user(user_id).any(|role_id| {
            state
                .role_permissions
                .contains(&(role_id, permission_id.to_string()))
        }))
    }

    async fn user_has_any_permission(
        &self,
        user_id: Uuid,
        permission_ids: &[String],
    ) -> DatabaseResult<bool> {
        let state = self.state.read().await;
        Ok(state.roles_of_user(user_id).any(|role_id| {
            permission_ids
                .iter()
                .any(|p| state.role_permissions.contains(&(role_id, p.clone())))
        }))
    }

    async fn user_roles_with_permissions(
        &self,
        user_id: Uuid,
    ) -> DatabaseResult<Vec<RoleWithPermissions>> {
        let state = self.state.read().await;
        let mut roles: Vec<RoleWithPermissions> = state
            .roles_of_user(user_id)
            .filter_map(|role_id| state.roles.get(&role_id))
            .map(|role| RoleWithPermissions {
                role_id: role.id,
                name: role.name.clone(),
                description: role.description.clone(),
                permissions: state.permissions_of_role(role.id),
            })
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn find_user_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
    ) -> DatabaseResult<Option<UserRole>> {
        Ok(self
            .state
            .read()
            .await
            .user_roles
            .get(&(user_id, role_id))
            .cloned())
    }

    async fn insert_user_role(
        &self,
        assignment: &UserRole,
        audit: &AuditLogEntry,
    ) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&assignment.user_id) {
            return Err(DatabaseError::NotFound(format!("user {}", assignment.user_id)));
        }
        if !state.roles.contains_key(&assignment.role_id) {
            return Err(DatabaseError::NotFound(format!("role {}", assignment.role_id)));
        }
        let key = (assignment.user_id, assignment.role_id);
        if state.user_roles.contains_key(&key) {
            return Err(DatabaseError::UniqueViolation("user_roles_pkey".to_string()));
        }
        state.check_actor(assignment.created_by)?;
        state.check_actor(audit.user_id)?;
        state.user_roles.insert(key, assignment.clone());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn delete_user_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        audit: &AuditLogEntry,
    ) -> DatabaseResult<bool> {
        let mut state = self.state.write().await;
        if !state.user_roles.contains_key(&(user_id, role_id)) {
            return Ok(false);
        }
        state.check_actor(audit.user_id)?;
        state.user_roles.remove(&(user_id, role_id));
        state.audit.push(audit.clone());
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&session.user_id) {
            return Err(DatabaseError::NotFound(format!("user {}", session.user_id)));
        }
        if state.sessions.contains_key(&session.session_token) {
            return Err(DatabaseError::UniqueViolation(
                "sessions_session_token_key".to_string(),
            ));
        }
        state
            .sessions
            .insert(session.session_token.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, session_token: &str) -> DatabaseResult<Option<Session>> {
        Ok(self.state.read().await.sessions.get(session_token).cloned())
    }

    async fn session_is_valid(
        &self,
        session_token: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(session_token)
            .is_some_and(|s| s.is_active_at(now)))
    }

    async fn delete_session(&self, session_token: &str) -> DatabaseResult<bool> {
        Ok(self
            .state
            .write()
            .await
            .sessions
            .remove(session_token)
            .is_some())
    }

    async fn list_sessions_for_user(
        &self,
        user_id: Uuid,
        include_expired: bool,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Session>> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && (include_expired || s.is_active_at(now)))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn delete_sessions_for_user_except(
        &self,
        user_id: Uuid,
        keep_token: &str,
    ) -> DatabaseResult<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state
            .sessions
            .retain(|token, s| s.user_id != user_id || token == keep_token);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> DatabaseResult<u64> {
        Ok(self.state.write().await.revoke_sessions_of(user_id))
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> DatabaseResult<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.is_active_at(now));
        Ok((before - state.sessions.len()) as u64)
    }

    async fn count_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> DatabaseResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active_at(now))
            .count() as u64)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_audit_entry(&self, entry: &AuditLogEntry) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        state.check_actor(entry.user_id)?;
        state.audit.push(entry.clone());
        Ok(())
    }

    async fn query_audit_entries(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<(Vec<AuditLogEntry>, i64)> {
        let state = self.state.read().await;
        // Later appends first among equal timestamps
        let mut matching: Vec<&AuditLogEntry> =
            state.audit.iter().rev().filter(|e| filters.matches(e)).collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total = matching.len() as i64;
        let entries = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((entries, total))
    }
}

#[async_trait]
impl MenuStore for MemoryStore {
    async fn list_menu_items(&self) -> DatabaseResult<Vec<MenuItem>> {
        Ok(self.state.read().await.menu.clone())
    }

    async fn insert_menu_item(&self, item: &MenuItem) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        if state.menu.iter().any(|m| m.id == item.id) {
            return Err(DatabaseError::UniqueViolation("menu_items_pkey".to_string()));
        }
        state.menu.push(item.clone());
        Ok(())
    }
}

#[async_trait]
impl PasswordResetStore for MemoryStore {
    async fn replace_reset_token(&self, token: &PasswordResetToken) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        state.reset_tokens.retain(|_, t| t.user_id != token.user_id);
        state.reset_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_reset_token_by_hash(
        &self,
        token_hash: &str,
    ) -> DatabaseResult<Option<PasswordResetToken>> {
        let state = self.state.read().await;
        Ok(state
            .reset_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn delete_reset_token(&self, id: Uuid) -> DatabaseResult<bool> {
        Ok(self.state.write().await.reset_tokens.remove(&id).is_some())
    }

    async fn complete_password_reset(
        &self,
        token_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<(Uuid, u64)>> {
        let mut state = self.state.write().await;
        let user_id = match state.reset_tokens.get(&token_id) {
            Some(token) if !token.is_expired_at(now) => token.user_id,
            _ => return Ok(None),
        };
        state.set_password(user_id, password_hash)?;
        state.reset_tokens.retain(|_, t| t.user_id != user_id);
        Ok(Some((user_id, state.revoke_sessions_of(user_id))))
    }

    async fn delete_expired_reset_tokens(&self, now: DateTime<Utc>) -> DatabaseResult<u64> {
        let mut state = self.state.write().await;
        let before = state.reset_tokens.len();
        state.reset_tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - state.reset_tokens.len()) as u64)
    }
}
