//! Built-in permission catalog

use tracing::info;

use crate::error::AdminResult;
use crate::models::Permission;
use crate::store::SharedStore;

/// Permissions every installation knows about
pub const DEFAULT_PERMISSIONS: &[(&str, &str)] = &[
    ("user:create", "Create users"),
    ("user:read", "View users"),
    ("user:update", "Edit user profiles"),
    ("user:delete", "Delete users"),
    ("role:create", "Create roles"),
    ("role:read", "View roles"),
    ("role:update", "Edit roles and their permissions"),
    ("role:delete", "Delete roles"),
    ("role:assign", "Assign and revoke user roles"),
    ("permission:read", "View the permission catalog"),
    ("audit:read", "View the audit trail"),
    ("session:read", "View active sessions"),
    ("session:revoke", "Revoke sessions of other users"),
    ("menu:read", "View the navigation menu definition"),
];

/// Insert the built-in permissions, leaving existing rows untouched.
pub async fn seed_permissions(store: &SharedStore) -> AdminResult<usize> {
    for (id, description) in DEFAULT_PERMISSIONS {
        store
            .upsert_permission(&Permission::new(*id, Some(*description)))
            .await?;
    }
    info!(
        "Permission catalog holds {} built-in entries",
        DEFAULT_PERMISSIONS.len()
    );
    Ok(DEFAULT_PERMISSIONS.len())
}
