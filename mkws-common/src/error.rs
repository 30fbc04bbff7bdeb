//! Common error types for MKWS

use thiserror::Error;

/// Common result type for MKWS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across MKWS services
///
/// Library layers return these structured values; service boundaries
/// (HTTP handlers, chat command handlers) translate them into
/// user-visible output.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation conflicts with current entity state, e.g. a bulk
    /// session that is no longer `open`.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The entity exists but its TTL has elapsed.
    #[error("Expired: {0}")]
    Expired(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry with backoff is worthwhile (transient storage
    /// contention, lost connections).
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db)) => {
                // SQLite: SQLITE_BUSY / SQLITE_LOCKED surface as code 5 / 6
                matches!(db.code().as_deref(), Some("5") | Some("6"))
            }
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            Error::Database(sqlx::Error::Io(_)) => true,
            _ => false,
        }
    }
}
