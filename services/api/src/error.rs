//! services/api/src/error.rs
//!
//! Defines the primary error type for the portal service.

use axum::http::StatusCode;
use tracing::{error, warn};

use crate::config::ConfigError;
use training_portal_core::StoreError;

/// The primary error type for the `portal_api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error raised by the application store.
    #[error("Store Error: {0}")]
    Store(#[from] StoreError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying the embedded database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

//=========================================================================================
// HTTP Mapping
//=========================================================================================

/// The status code a store failure maps to at the HTTP boundary.
pub fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyUsed(_) => StatusCode::CONFLICT,
        StoreError::PasscodeRejected(_) | StoreError::NoSession => StatusCode::UNAUTHORIZED,
        StoreError::Remote(_) => StatusCode::BAD_GATEWAY,
        StoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Converts a store failure into the `(StatusCode, String)` rejection the handlers return.
pub fn store_rejection(err: StoreError) -> (StatusCode, String) {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Store operation failed: {:?}", err);
    } else {
        warn!("Store operation rejected: {}", err);
    }
    (status, err.to_string())
}
