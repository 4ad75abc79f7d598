//! Session model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Server-tracked session backing a bearer token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub session_token: String,
    pub user_id: Uuid,
    pub expires: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A session is usable only while `expires` lies in the future.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires > now
    }
}

/// New session creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub session_token: String,
    pub user_id: Uuid,
    pub expires: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
