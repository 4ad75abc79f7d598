//! Role and permission models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Role entity: a named bag of permissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New role creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
}

/// Role update payload
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Permission catalog entry, identified by `module:action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: String,
    pub module: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    /// Build a catalog entry from its identifier, deriving the module
    /// from the part before the colon.
    pub fn new(id: impl Into<String>, description: Option<&str>) -> Self {
        let id = id.into();
        let module = id.split(':').next().unwrap_or_default().to_string();
        Self {
            id,
            module,
            description: description.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

/// User role association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Who made the assignment
    pub created_by: Option<Uuid>,
}

/// Per-role breakdown of a user's grants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleWithPermissions {
    pub role_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permissions: BTreeSet<String>,
}

/// Result of an all-of permission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionCheck {
    pub ok: bool,
    /// Requested permissions the user does not hold
    pub missing: BTreeSet<String>,
}
