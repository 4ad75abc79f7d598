//! User directory: registration, profile maintenance and removal

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditLog, actions};
use crate::error::{AdminError, AdminResult};
use crate::mailer::{Mailer, dispatch};
use crate::models::{Area, AuditLogInput, Credentials, NewUser, UpdateUser, User};
use crate::secrets::hash_password;
use crate::settings::Settings;
use crate::store::SharedStore;
use crate::validation::{validate_email, validate_password};

const MODULE: &str = "users";

/// User account management
#[derive(Clone)]
pub struct UserDirectory {
    store: SharedStore,
    audit: AuditLog,
    mailer: Arc<dyn Mailer>,
    app_name: String,
}

impl UserDirectory {
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
            app_name: settings.app_name.clone(),
        }
    }

    /// Register a user with a password. Emails are stored lowercased and
    /// must be unique.
    pub async fn register(
        &self,
        new_user: NewUser,
        created_by: Option<Uuid>,
    ) -> AdminResult<User> {
        let email = new_user.email.trim().to_lowercase();
        validate_email(&email).map_err(AdminError::Validation)?;
        validate_password(&new_user.password).map_err(AdminError::Validation)?;

        info!("Registering user: {}", email);

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            name: new_user.name,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email_verified_at: None,
            image: None,
            created_at: now,
            updated_at: now,
        };
        let credentials = Credentials {
            user_id: user.id,
            password_hash: hash_password(&new_user.password)?,
            updated_at: now,
        };

        self.store
            .insert_user(&user, Some(&credentials))
            .await
            .map_err(|e| {
                AdminError::conflict_on_unique(
                    e,
                    format!("Email '{}' is already registered", user.email),
                )
            })?;

        self.audit
            .log(
                AuditLogInput::new(actions::USER_CREATED, MODULE)
                    .user(created_by.or(Some(user.id)))
                    .area(Area::Admin)
                    .entity("User", user.id)
                    .new_values(json!(user)),
            )
            .await;

        let greeting = user.name.as_deref().unwrap_or(&user.email);
        dispatch(
            self.mailer.clone(),
            user.email.clone(),
            format!("Welcome to {}", self.app_name),
            format!("Hello {},\n\nYour {} account is ready.", greeting, self.app_name),
        );

        Ok(user)
    }

    pub async fn get(&self, user_id: Uuid) -> AdminResult<User> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AdminError::not_found("User", user_id))
    }

    pub async fn find_by_email(&self, email: &str) -> AdminResult<Option<User>> {
        Ok(self
            .store
            .find_user_by_email(&email.trim().to_lowercase())
            .await?)
    }

    pub async fn list(&self) -> AdminResult<Vec<User>> {
        Ok(self.store.list_users().await?)
    }

    /// Apply a partial profile update
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        update: UpdateUser,
        updated_by: Option<Uuid>,
    ) -> AdminResult<User> {
        let existing = self.get(user_id).await?;
        if update.is_empty() {
            return Ok(existing);
        }

        let mut user = existing.clone();
        if let Some(name) = update.name {
            user.name = Some(name);
        }
        if let Some(first_name) = update.first_name {
            user.first_name = Some(first_name);
        }
        if let Some(last_name) = update.last_name {
            user.last_name = Some(last_name);
        }
        if let Some(image) = update.image {
            user.image = Some(image);
        }
        user.updated_at = Utc::now();

        self.store.update_user(&user).await?;

        self.audit
            .log_entity_change(
                AuditLogInput::new(actions::USER_UPDATED, MODULE)
                    .user(updated_by.or(Some(user_id)))
                    .area(Area::Admin)
                    .entity("User", user_id),
                json!(existing),
                json!(user),
            )
            .await;

        Ok(user)
    }

    /// Delete a user with everything hanging off it. The audit trail about
    /// the user is kept.
    pub async fn delete(&self, user_id: Uuid, deleted_by: Option<Uuid>) -> AdminResult<()> {
        let existing = self.get(user_id).await?;

        if !self.store.delete_user(user_id).await? {
            return Err(AdminError::not_found("User", user_id));
        }
        info!("Deleted user {}", user_id);

        self.audit
            .log(
                AuditLogInput::new(actions::USER_DELETED, MODULE)
                    .user(deleted_by.filter(|id| *id != user_id))
                    .area(Area::Admin)
                    .entity("User", user_id)
                    .old_values(json!(existing)),
            )
            .await;

        Ok(())
    }
}
