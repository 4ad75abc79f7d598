//! Password reset by emailed single-use token
//!
//! Only the SHA-256 digest of a token is stored. Requesting a reset never
//! reveals whether the address belongs to an account.

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditLog, actions};
use crate::error::{AdminError, AdminResult};
use crate::mailer::{Mailer, dispatch};
use crate::models::{Area, AuditLogInput, PasswordResetToken};
use crate::secrets::{hash_password, hash_token, random_token};
use crate::settings::Settings;
use crate::store::SharedStore;
use crate::validation::validate_password;

const MODULE: &str = "auth";

#[derive(Clone)]
pub struct PasswordResetService {
    store: SharedStore,
    audit: AuditLog,
    mailer: Arc<dyn Mailer>,
    ttl: Duration,
    app_name: String,
    app_url: String,
}

impl PasswordResetService {
    pub fn new(
        store: SharedStore,
        audit: AuditLog,
        mailer: Arc<dyn Mailer>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            audit,
            mailer,
            ttl: settings.reset_token_ttl(),
            app_name: settings.app_name.clone(),
            app_url: settings.app_url.trim_end_matches('/').to_string(),
        }
    }

    /// Start a reset for `email`. Succeeds whether or not the account exists.
    pub async fn request_reset(&self, email: &str) -> AdminResult<()> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = random_token();
        let now = Utc::now();
        let record = PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: hash_token(&token),
            expires_at: now + self.ttl,
            created_at: now,
        };
        self.store.replace_reset_token(&record).await?;

        self.audit
            .log(
                AuditLogInput::new(actions::PASSWORD_RESET_REQUESTED, MODULE)
                    .user(Some(user.id))
                    .area(Area::Public)
                    .entity("User", user.id)
                    .metadata(json!({ "expiresAt": record.expires_at })),
            )
            .await;

        let link = format!("{}/reset-password?token={}", self.app_url, token);
        dispatch(
            self.mailer.clone(),
            user.email.clone(),
            format!("Reset your {} password", self.app_name),
            format!(
                "A password reset was requested for your account.\n\n\
                 Open the link below within {} minutes to choose a new password:\n{}\n\n\
                 If you did not request this, ignore this message.",
                self.ttl.num_minutes(),
                link
            ),
        );

        info!("Password reset token issued for user {}", user.id);
        Ok(())
    }

    /// The user a token belongs to, if it is known and unexpired.
    /// Expired tokens are removed on sight.
    pub async fn validate_token(&self, token: &str) -> AdminResult<Option<Uuid>> {
        Ok(self.live_token(token).await?.map(|record| record.user_id))
    }

    /// Set a new password with a reset token. The token, every other reset
    /// token of the user and every session are gone afterwards. A token
    /// completes at most one reset, even under concurrent use.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AdminResult<()> {
        let record = self
            .live_token(token)
            .await?
            .ok_or_else(invalid_token)?;
        validate_password(new_password).map_err(AdminError::Validation)?;

        let password_hash = hash_password(new_password)?;
        let (user_id, revoked) = self
            .store
            .complete_password_reset(record.id, &password_hash, Utc::now())
            .await?
            .ok_or_else(invalid_token)?;

        self.audit
            .log(
                AuditLogInput::new(actions::PASSWORD_RESET, MODULE)
                    .user(Some(user_id))
                    .area(Area::Public)
                    .entity("User", user_id)
                    .metadata(json!({ "sessionsRevoked": revoked })),
            )
            .await;

        info!("Password reset completed for user {}", user_id);
        Ok(())
    }

    async fn live_token(&self, token: &str) -> AdminResult<Option<PasswordResetToken>> {
        let Some(record) = self
            .store
            .find_reset_token_by_hash(&hash_token(token))
            .await?
        else {
            return Ok(None);
        };

        if record.is_expired_at(Utc::now()) {
            self.store.delete_reset_token(record.id).await?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    pub async fn sweep_expired(&self) -> AdminResult<u64> {
        let removed = self
            .store
            .delete_expired_reset_tokens(Utc::now())
            .await?;
        if removed > 0 {
            info!("Swept {} expired password reset tokens", removed);
        }
        Ok(removed)
    }
}

fn invalid_token() -> AdminError {
    AdminError::Validation("Invalid or expired reset token".to_string())
}
