//! Aurora Nova admin core
//!
//! Role-based access control, audit logging, server-side sessions and the
//! credential flows that must stay consistent with them. Every service works
//! against an injected [`store::SharedStore`], either PostgreSQL
//! ([`store::PgStore`]) or in-process ([`store::MemoryStore`]).
//!
//! ```no_run
//! use std::sync::Arc;
//! use admin::{AdminCore, mailer::LogMailer, settings::Settings, store::MemoryStore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let core = AdminCore::new(store, Arc::new(LogMailer), Settings::load()?);
//! let roles = core.roles.list_roles().await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod catalog;
pub mod context;
pub mod credentials;
pub mod error;
pub mod mailer;
pub mod maintenance;
pub mod menu;
pub mod models;
pub mod password_reset;
pub mod rate_limiter;
pub mod rbac;
pub mod roles;
pub mod secrets;
pub mod sessions;
pub mod settings;
pub mod store;
pub mod users;
pub mod validation;

use std::sync::Arc;

use crate::audit::{AuditConfig, AuditLog};
use crate::credentials::CredentialService;
use crate::mailer::Mailer;
use crate::maintenance::Maintenance;
use crate::menu::MenuService;
use crate::password_reset::PasswordResetService;
use crate::rate_limiter::RateLimiter;
use crate::rbac::RbacResolver;
use crate::roles::RoleRegistry;
use crate::sessions::SessionRegistry;
use crate::settings::Settings;
use crate::store::SharedStore;
use crate::users::UserDirectory;

pub use crate::error::{AdminError, AdminResult};

/// Every admin service wired to one store, shared across handlers
#[derive(Clone)]
pub struct AdminCore {
    pub store: SharedStore,
    pub settings: Settings,
    pub audit: AuditLog,
    pub rbac: RbacResolver,
    pub roles: RoleRegistry,
    pub menu: MenuService,
    pub sessions: SessionRegistry,
    pub users: UserDirectory,
    pub credentials: CredentialService,
    pub password_resets: PasswordResetService,
    pub rate_limiter: RateLimiter,
}

impl AdminCore {
    pub fn new(store: SharedStore, mailer: Arc<dyn Mailer>, settings: Settings) -> Self {
        let audit = AuditLog::new(
            store.clone(),
            AuditConfig {
                default_limit: settings.audit_default_limit,
                max_limit: settings.audit_max_limit,
            },
        );
        let rbac = RbacResolver::new(store.clone());
        let sessions = SessionRegistry::new(store.clone(), settings.session_ttl_seconds);

        Self {
            roles: RoleRegistry::new(store.clone(), audit.clone()),
            menu: MenuService::new(store.clone(), rbac.clone()),
            users: UserDirectory::new(store.clone(), audit.clone(), mailer.clone(), &settings),
            credentials: CredentialService::new(store.clone(), sessions.clone(), audit.clone()),
            password_resets: PasswordResetService::new(
                store.clone(),
                audit.clone(),
                mailer,
                &settings,
            ),
            rate_limiter: RateLimiter::new(settings.rate_limiter()),
            store,
            settings,
            audit,
            rbac,
            sessions,
        }
    }

    /// Expiry sweeps over this core's sessions and reset tokens
    pub fn maintenance(&self) -> Maintenance {
        Maintenance::new(self.sessions.clone(), self.password_resets.clone())
    }
}
