//! Aurora Nova admin models

pub mod audit;
pub mod menu;
pub mod password_reset;
pub mod role;
pub mod session;
pub mod user;

// Re-export for convenience
pub use audit::{Area, AuditLogEntry, AuditLogFilters, AuditLogInput, AuditLogPage};
pub use menu::{MenuItem, MenuNode};
pub use password_reset::PasswordResetToken;
pub use role::{
    NewRole, Permission, PermissionCheck, Role, RoleWithPermissions, UpdateRole, UserRole,
};
pub use session::{NewSession, Session};
pub use user::{Credentials, LoginCredentials, NewUser, UpdateUser, User};
