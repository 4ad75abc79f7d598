//! Password login and password change

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditLog, actions};
use crate::error::{AdminError, AdminResult};
use crate::models::{Area, AuditLogInput, LoginCredentials, Session, User};
use crate::secrets::{hash_password, verify_against_dummy, verify_password};
use crate::sessions::SessionRegistry;
use crate::store::SharedStore;
use crate::validation::validate_password;

const MODULE: &str = "auth";

/// Result of a successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user: User,
    pub session: Session,
}

/// Credential flows that touch sessions
#[derive(Clone)]
pub struct CredentialService {
    store: SharedStore,
    sessions: SessionRegistry,
    audit: AuditLog,
}

impl CredentialService {
    pub fn new(store: SharedStore, sessions: SessionRegistry, audit: AuditLog) -> Self {
        Self {
            store,
            sessions,
            audit,
        }
    }

    /// Check a password and open a session.
    ///
    /// Every failure reads the same to the caller so that account existence
    /// does not leak.
    pub async fn login(
        &self,
        credentials: LoginCredentials,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AdminResult<LoginOutcome> {
        let email = credentials.email.trim().to_lowercase();

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            verify_against_dummy(&credentials.password);
            warn!("Login attempt for unknown email");
            return Err(AdminError::Unauthenticated);
        };
        let Some(stored) = self.store.find_credentials(user.id).await? else {
            verify_against_dummy(&credentials.password);
            warn!(
                "Password login attempted for user {} without credentials",
                user.id
            );
            return Err(AdminError::Unauthenticated);
        };
        if !verify_password(&stored.password_hash, &credentials.password)? {
            warn!("Invalid password for user {}", user.id);
            return Err(AdminError::Unauthenticated);
        }

        let session = self
            .sessions
            .issue(user.id, ip_address.clone(), user_agent.clone())
            .await?;

        let mut input = AuditLogInput::new(actions::LOGIN, MODULE)
            .user(Some(user.id))
            .area(Area::Admin)
            .entity("User", user.id);
        input.ip_address = ip_address;
        input.user_agent = user_agent;
        self.audit.log(input).await;

        info!("User {} logged in", user.id);
        Ok(LoginOutcome { user, session })
    }

    /// End one session. Unknown tokens are not an error.
    pub async fn logout(&self, session_token: &str) -> AdminResult<()> {
        let Some(session) = self.sessions.get(session_token).await? else {
            return Ok(());
        };
        self.sessions.delete(session_token).await?;

        self.audit
            .log(
                AuditLogInput::new(actions::LOGOUT, MODULE)
                    .user(Some(session.user_id))
                    .area(Area::Admin)
                    .entity("User", session.user_id),
            )
            .await;
        Ok(())
    }

    /// Keep the caller's session and end every other one
    pub async fn revoke_other_sessions(
        &self,
        user_id: Uuid,
        keep_token: &str,
    ) -> AdminResult<u64> {
        let removed = self
            .sessions
            .delete_others_for_user(user_id, keep_token)
            .await?;

        self.audit
            .log(
                AuditLogInput::new(actions::SESSIONS_REVOKED, MODULE)
                    .user(Some(user_id))
                    .area(Area::Admin)
                    .entity("User", user_id)
                    .metadata(json!({ "revoked": removed })),
            )
            .await;
        Ok(removed)
    }

    /// Replace the user's password after checking the current one.
    ///
    /// The new hash and the revocation of every session commit together:
    /// afterwards the user has no active session anywhere.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AdminResult<()> {
        let stored = self
            .store
            .find_credentials(user_id)
            .await?
            .ok_or_else(|| AdminError::not_found("Credentials", user_id))?;

        if !verify_password(&stored.password_hash, current_password)? {
            return Err(AdminError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }
        validate_password(new_password).map_err(AdminError::Validation)?;

        let password_hash = hash_password(new_password)?;
        let revoked = self
            .store
            .replace_password_and_revoke_sessions(user_id, &password_hash)
            .await?;

        self.audit
            .log(
                AuditLogInput::new(actions::PASSWORD_CHANGED, MODULE)
                    .user(Some(user_id))
                    .area(Area::Admin)
                    .entity("User", user_id)
                    .metadata(json!({ "sessionsRevoked": revoked })),
            )
            .await;

        info!("Password changed for user {}, {} sessions revoked", user_id, revoked);
        Ok(())
    }
}
