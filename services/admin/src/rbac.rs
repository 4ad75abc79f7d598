//! RBAC resolver
//!
//! Answers what a user may do by joining role assignments to role
//! permissions. Grants are additive: a permission held through any role is
//! held. Nothing is cached, every call reads the current store state, so a
//! revoked role stops granting on the very next check.

use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{AdminError, AdminResult};
use crate::models::{Permission, PermissionCheck, RoleWithPermissions};
use crate::store::SharedStore;

/// Read-only view over RBAC state
#[derive(Clone)]
pub struct RbacResolver {
    store: SharedStore,
}

impl RbacResolver {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Deduplicated union of the permissions of every role the user holds.
    /// Unknown users have no permissions.
    pub async fn effective_permissions(&self, user_id: Uuid) -> AdminResult<BTreeSet<String>> {
        Ok(self.store.user_permission_ids(user_id).await?)
    }

    pub async fn has_permission(&self, user_id: Uuid, permission_id: &str) -> AdminResult<bool> {
        Ok(self.store.user_has_permission(user_id, permission_id).await?)
    }

    /// False for an empty list: there is nothing to match.
    pub async fn has_any_permission(
        &self,
        user_id: Uuid,
        permission_ids: &[String],
    ) -> AdminResult<bool> {
        if permission_ids.is_empty() {
            return Ok(false);
        }
        Ok(self
            .store
            .user_has_any_permission(user_id, permission_ids)
            .await?)
    }

    /// `ok` with an empty `missing` set when every id is held. An empty
    /// list is trivially satisfied.
    pub async fn has_all_permissions(
        &self,
        user_id: Uuid,
        permission_ids: &[String],
    ) -> AdminResult<PermissionCheck> {
        if permission_ids.is_empty() {
            return Ok(PermissionCheck {
                ok: true,
                missing: BTreeSet::new(),
            });
        }

        let effective = self.effective_permissions(user_id).await?;
        let missing: BTreeSet<String> = permission_ids
            .iter()
            .filter(|id| !effective.contains(id.as_str()))
            .cloned()
            .collect();

        Ok(PermissionCheck {
            ok: missing.is_empty(),
            missing,
        })
    }

    /// Gate helper for the route layer
    pub async fn require_permission(&self, user_id: Uuid, permission_id: &str) -> AdminResult<()> {
        if self.has_permission(user_id, permission_id).await? {
            Ok(())
        } else {
            Err(AdminError::PermissionDenied {
                missing: vec![permission_id.to_string()],
            })
        }
    }

    /// Gate helper reporting every missing permission
    pub async fn require_all_permissions(
        &self,
        user_id: Uuid,
        permission_ids: &[String],
    ) -> AdminResult<()> {
        let check = self.has_all_permissions(user_id, permission_ids).await?;
        if check.ok {
            Ok(())
        } else {
            Err(AdminError::PermissionDenied {
                missing: check.missing.into_iter().collect(),
            })
        }
    }

    /// Per-role breakdown for display
    pub async fn roles_with_permissions(
        &self,
        user_id: Uuid,
    ) -> AdminResult<Vec<RoleWithPermissions>> {
        Ok(self.store.user_roles_with_permissions(user_id).await?)
    }

    pub async fn all_permissions(&self) -> AdminResult<Vec<Permission>> {
        Ok(self.store.list_permissions().await?)
    }

    pub async fn permissions_by_module(&self, module: &str) -> AdminResult<Vec<Permission>> {
        Ok(self.store.list_permissions_by_module(module).await?)
    }

    pub async fn permission_exists(&self, id: &str) -> AdminResult<bool> {
        Ok(self.store.permission_exists(id).await?)
    }
}
