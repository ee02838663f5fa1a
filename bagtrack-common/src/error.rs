//! Common error types for bagtrack

use thiserror::Error;

/// Common result type for bagtrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across bagtrack services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backing store could not serve the request; safe to retry
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures a caller may retry without changing the request.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::StorageUnavailable(_) => true,
            Error::Database(db_err) => {
                let msg = db_err.to_string();
                msg.contains("database is locked") || matches!(db_err, sqlx::Error::PoolTimedOut)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_unavailable_is_retriable() {
        assert!(Error::StorageUnavailable("down".to_string()).is_retriable());
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_retriable());
    }

    #[test]
    fn test_not_found_is_not_retriable() {
        assert!(!Error::NotFound("flight".to_string()).is_retriable());
        assert!(!Error::InvalidInput("tag".to_string()).is_retriable());
    }
}
