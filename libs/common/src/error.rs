//! Custom error types for the common library
//!
//! This module defines the storage error type shared by every store adapter
//! of the Aurora Nova services.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A row required by the statement does not exist
    #[error("Row not found: {0}")]
    NotFound(String),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

impl DatabaseError {
    /// Classify a query error, surfacing unique constraint violations
    /// so callers can map them to a conflict.
    pub fn from_query(err: SqlxError) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                let constraint = db_err
                    .constraint()
                    .map(str::to_string)
                    .unwrap_or_else(|| db_err.message().to_string());
                return DatabaseError::UniqueViolation(constraint);
            }
        }

        match err {
            SqlxError::RowNotFound => DatabaseError::NotFound("row not found".to_string()),
            other => DatabaseError::Query(other),
        }
    }

    /// True when the error is a unique constraint violation
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DatabaseError::UniqueViolation(_))
    }
}

impl From<SqlxError> for DatabaseError {
    fn from(err: SqlxError) -> Self {
        DatabaseError::from_query(err)
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
