//! Error types for the admin core

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use std::fmt::Display;
use thiserror::Error;
use tracing::error;

/// Error kinds raised by the admin core
#[derive(Error, Debug)]
pub enum AdminError {
    /// A referenced record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Duplicate assignment or unique field
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed input, rejected before any store access
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Caller has no valid session or presented bad credentials
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Caller lacks the required permissions
    #[error("Permission denied, missing: {}", missing.join(", "))]
    PermissionDenied { missing: Vec<String> },

    /// The persistent store failed
    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),

    /// Failure outside the store, e.g. hashing
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdminError {
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        AdminError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Map a unique constraint violation to a conflict, keep everything else
    pub fn conflict_on_unique(err: DatabaseError, message: impl Into<String>) -> Self {
        if err.is_unique_violation() {
            AdminError::Conflict(message.into())
        } else {
            AdminError::Store(err)
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AdminError::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            AdminError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AdminError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AdminError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AdminError::PermissionDenied { .. } => (StatusCode::FORBIDDEN, self.to_string()),
            AdminError::Store(e) => {
                error!("Store failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AdminError::Internal(msg) => {
                error!("Internal failure: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for admin core results
pub type AdminResult<T> = Result<T, AdminError>;
