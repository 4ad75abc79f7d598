//! Session registry
//!
//! Sessions are server-side rows keyed by an opaque token. A session is
//! valid while its expiry lies in the future; expired rows linger until a
//! sweep removes them but never validate.

use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AdminError, AdminResult};
use crate::models::{NewSession, Session};
use crate::secrets::random_token;
use crate::settings::session_ttl;
use crate::store::SharedStore;

/// Session lifecycle operations
#[derive(Clone)]
pub struct SessionRegistry {
    store: SharedStore,
    ttl: Duration,
}

impl SessionRegistry {
    /// `ttl_seconds` is capped at [`crate::settings::MAX_SESSION_TTL_SECONDS`]
    pub fn new(store: SharedStore, ttl_seconds: u64) -> Self {
        Self {
            store,
            ttl: session_ttl(ttl_seconds),
        }
    }

    /// Store a session exactly as given. The token must be unique.
    pub async fn create(&self, new_session: NewSession) -> AdminResult<Session> {
        let now = Utc::now();
        let session = Session {
            session_token: new_session.session_token,
            user_id: new_session.user_id,
            expires: new_session.expires,
            ip_address: new_session.ip_address,
            user_agent: new_session.user_agent,
            created_at: now,
            updated_at: now,
        };

        self.store
            .insert_session(&session)
            .await
            .map_err(|e| AdminError::conflict_on_unique(e, "Session token already in use"))?;

        debug!("Created session for user {}", session.user_id);
        Ok(session)
    }

    /// Mint a fresh token with the configured lifetime
    pub async fn issue(
        &self,
        user_id: Uuid,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AdminResult<Session> {
        self.create(NewSession {
            session_token: random_token(),
            user_id,
            expires: Utc::now() + self.ttl,
            ip_address,
            user_agent,
        })
        .await
    }

    pub async fn is_valid(&self, session_token: &str) -> AdminResult<bool> {
        Ok(self
            .store
            .session_is_valid(session_token, Utc::now())
            .await?)
    }

    /// Look a session up without checking its expiry
    pub async fn get(&self, session_token: &str) -> AdminResult<Option<Session>> {
        Ok(self.store.find_session(session_token).await?)
    }

    /// Returns whether a session was removed
    pub async fn delete(&self, session_token: &str) -> AdminResult<bool> {
        Ok(self.store.delete_session(session_token).await?)
    }

    /// Sessions of a user, newest first
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        include_expired: bool,
    ) -> AdminResult<Vec<Session>> {
        Ok(self
            .store
            .list_sessions_for_user(user_id, include_expired, Utc::now())
            .await?)
    }

    /// "Log out everywhere else"
    pub async fn delete_others_for_user(
        &self,
        user_id: Uuid,
        keep_token: &str,
    ) -> AdminResult<u64> {
        let removed = self
            .store
            .delete_sessions_for_user_except(user_id, keep_token)
            .await?;
        info!("Revoked {} other sessions of user {}", removed, user_id);
        Ok(removed)
    }

    pub async fn delete_all_for_user(&self, user_id: Uuid) -> AdminResult<u64> {
        let removed = self.store.delete_sessions_for_user(user_id).await?;
        info!("Revoked all {} sessions of user {}", removed, user_id);
        Ok(removed)
    }

    /// Remove every session whose expiry has passed
    pub async fn sweep_expired(&self) -> AdminResult<u64> {
        let removed = self.store.delete_expired_sessions(Utc::now()).await?;
        if removed > 0 {
            info!("Swept {} expired sessions", removed);
        }
        Ok(removed)
    }

    pub async fn count_active(&self, user_id: Uuid) -> AdminResult<u64> {
        Ok(self
            .store
            .count_active_sessions(user_id, Utc::now())
            .await?)
    }
}
