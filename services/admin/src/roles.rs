//! Role registry: role CRUD, role permission sets and role assignment

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditLog, actions};
use crate::error::{AdminError, AdminResult};
use crate::models::{Area, AuditLogInput, NewRole, Role, UpdateRole, UserRole};
use crate::store::SharedStore;
use crate::validation::{validate_permission_id, validate_role_name};

const MODULE: &str = "roles";

/// Mutating counterpart of the RBAC resolver
#[derive(Clone)]
pub struct RoleRegistry {
    store: SharedStore,
    audit: AuditLog,
}

impl RoleRegistry {
    pub fn new(store: SharedStore, audit: AuditLog) -> Self {
        Self { store, audit }
    }

    /// Create a role with a unique name
    pub async fn create_role(
        &self,
        new_role: NewRole,
        created_by: Option<Uuid>,
    ) -> AdminResult<Role> {
        validate_role_name(&new_role.name).map_err(AdminError::Validation)?;
        info!("Creating role: {}", new_role.name);

        let now = Utc::now();
        let role = Role {
            id: Uuid::new_v4(),
            name: new_role.name.trim().to_string(),
            description: new_role.description,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_role(&role).await.map_err(|e| {
            AdminError::conflict_on_unique(e, format!("Role '{}' already exists", role.name))
        })?;

        self.audit
            .log(
                AuditLogInput::new(actions::ROLE_CREATED, MODULE)
                    .user(created_by)
                    .area(Area::Admin)
                    .entity("Role", role.id)
                    .new_values(json!(role)),
            )
            .await;

        Ok(role)
    }

    pub async fn get_role(&self, role_id: Uuid) -> AdminResult<Role> {
        self.store
            .find_role_by_id(role_id)
            .await?
            .ok_or_else(|| AdminError::not_found("Role", role_id))
    }

    pub async fn find_role_by_name(&self, name: &str) -> AdminResult<Option<Role>> {
        Ok(self.store.find_role_by_name(name).await?)
    }

    pub async fn list_roles(&self) -> AdminResult<Vec<Role>> {
        Ok(self.store.list_roles().await?)
    }

    pub async fn update_role(
        &self,
        role_id: Uuid,
        update: UpdateRole,
        updated_by: Option<Uuid>,
    ) -> AdminResult<Role> {
        if let Some(name) = &update.name {
            validate_role_name(name).map_err(AdminError::Validation)?;
        }

        let existing = self.get_role(role_id).await?;
        let mut role = existing.clone();
        if let Some(name) = update.name {
            role.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            role.description = Some(description);
        }
        role.updated_at = Utc::now();

        self.store.update_role(&role).await.map_err(|e| {
            AdminError::conflict_on_unique(e, format!("Role '{}' already exists", role.name))
        })?;

        self.audit
            .log_entity_change(
                AuditLogInput::new(actions::ROLE_UPDATED, MODULE)
                    .user(updated_by)
                    .area(Area::Admin)
                    .entity("Role", role.id),
                json!(existing),
                json!(role),
            )
            .await;

        Ok(role)
    }

    /// Delete a role. Users holding it lose its permissions immediately.
    pub async fn delete_role(&self, role_id: Uuid, deleted_by: Option<Uuid>) -> AdminResult<()> {
        let existing = self.get_role(role_id).await?;
        let permissions = self.store.role_permission_ids(role_id).await?;

        if !self.store.delete_role(role_id).await? {
            return Err(AdminError::not_found("Role", role_id));
        }
        info!("Deleted role {} ({})", existing.name, role_id);

        self.audit
            .log(
                AuditLogInput::new(actions::ROLE_DELETED, MODULE)
                    .user(deleted_by)
                    .area(Area::Admin)
                    .entity("Role", role_id)
                    .old_values(json!({ "role": existing, "permissions": permissions })),
            )
            .await;

        Ok(())
    }

    /// Replace the permission set of a role. Every id must exist in the
    /// catalog; duplicates in the input collapse.
    pub async fn set_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[String],
        updated_by: Option<Uuid>,
    ) -> AdminResult<()> {
        for id in permission_ids {
            validate_permission_id(id).map_err(AdminError::Validation)?;
        }

        self.get_role(role_id).await?;

        let mut wanted: Vec<String> = permission_ids.to_vec();
        wanted.sort();
        wanted.dedup();

        for id in &wanted {
            if !self.store.permission_exists(id).await? {
                return Err(AdminError::Validation(format!("Unknown permission '{}'", id)));
            }
        }

        let previous = self.store.role_permission_ids(role_id).await?;
        self.store.replace_role_permissions(role_id, &wanted).await?;

        self.audit
            .log_entity_change(
                AuditLogInput::new(actions::ROLE_PERMISSIONS_UPDATED, MODULE)
                    .user(updated_by)
                    .area(Area::Admin)
                    .entity("Role", role_id),
                json!({ "permissions": previous }),
                json!({ "permissions": wanted }),
            )
            .await;

        Ok(())
    }

    /// Assign a role to a user.
    ///
    /// Fails with NotFound when the user or the role is missing (checked in
    /// that order), with Validation when `assigned_by` names no existing
    /// user, and with Conflict when the pair already exists. The assignment
    /// and its `role_assigned` entry commit together.
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> AdminResult<UserRole> {
        if self.store.find_user_by_id(user_id).await?.is_none() {
            return Err(AdminError::not_found("User", user_id));
        }
        let role = self.get_role(role_id).await?;
        self.ensure_actor(assigned_by).await?;

        if self.store.find_user_role(user_id, role_id).await?.is_some() {
            return Err(AdminError::Conflict(format!(
                "User {} already has role '{}'",
                user_id, role.name
            )));
        }

        let assignment = UserRole {
            user_id,
            role_id,
            created_at: Utc::now(),
            created_by: assigned_by,
        };
        let entry = self.audit.prepare(
            AuditLogInput::new(actions::ROLE_ASSIGNED, MODULE)
                .user(assigned_by)
                .area(Area::Admin)
                .entity("User", user_id)
                .new_values(json!({ "roleId": role_id, "roleName": role.name })),
        );

        // A concurrent duplicate slipping past the check above is caught here
        self.store
            .insert_user_role(&assignment, &entry)
            .await
            .map_err(|e| {
                AdminError::conflict_on_unique(
                    e,
                    format!("User {} already has role '{}'", user_id, role.name),
                )
            })?;

        info!("Assigned role {} to user {}", role.name, user_id);
        Ok(assignment)
    }

    /// Remove a role from a user. Takes effect on the next permission check.
    pub async fn revoke_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        revoked_by: Option<Uuid>,
    ) -> AdminResult<()> {
        let assignment = self
            .store
            .find_user_role(user_id, role_id)
            .await?
            .ok_or_else(|| {
                AdminError::not_found("RoleAssignment", format!("{}/{}", user_id, role_id))
            })?;
        self.ensure_actor(revoked_by).await?;

        let entry = self.audit.prepare(
            AuditLogInput::new(actions::ROLE_REMOVED, MODULE)
                .user(revoked_by)
                .area(Area::Admin)
                .entity("User", user_id)
                .old_values(json!(assignment)),
        );

        if !self.store.delete_user_role(user_id, role_id, &entry).await? {
            return Err(AdminError::not_found(
                "RoleAssignment",
                format!("{}/{}", user_id, role_id),
            ));
        }

        info!("Revoked role {} from user {}", role_id, user_id);
        Ok(())
    }

    /// Actors are recorded on assignments and audit entries, both of which
    /// reference `users`
    async fn ensure_actor(&self, actor: Option<Uuid>) -> AdminResult<()> {
        let Some(actor) = actor else {
            return Ok(());
        };
        if self.store.find_user_by_id(actor).await?.is_none() {
            return Err(AdminError::Validation(format!(
                "Acting user {} does not exist",
                actor
            )));
        }
        Ok(())
    }
}
