/// Batchlite Error Module
///
/// This module defines the error types for the batchlite data-access layer.
/// It provides structured error handling with proper error propagation so
/// callers can react deterministically instead of inspecting sentinels.
use thiserror::Error;

/// Comprehensive error type for the batchlite crate.
///
/// This enum covers all error scenarios that can occur within batchlite:
/// - Connection handling (missing file, open failure)
/// - Bootstrap script execution
/// - Prepared statement lookup
/// - Statement execution against the driver
/// - Query construction and result shaping
/// - Configuration loading
#[derive(Error, Debug)]
pub enum BatchliteError {
    /// Connection-level failures: missing database file or open failure.
    /// Fatal for the Database instance that produced it.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Bootstrap script missing or failing during construction
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// A named statement or cached insert/update template is absent
    #[error("Statement not found: {0}")]
    StatementNotFound(String),

    /// Non-success driver state after executing a statement
    #[error("Execution error ({code}): {message}")]
    Execution { code: i32, message: String },

    /// Query construction or result-shaping errors
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors surfaced directly by the SQLite driver
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Type alias for Result to use BatchliteError as the error type.
///
/// This provides a consistent error type across the entire crate
/// instead of using `Result<T, String>` or mixed error types.
pub type Result<T> = std::result::Result<T, BatchliteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let conn_err = BatchliteError::Connection("cannot find file \"x.db\"".to_string());
        assert!(conn_err.to_string().contains("Connection error"));

        let exec_err = BatchliteError::Execution {
            code: 1,
            message: "no such table: t".to_string(),
        };
        assert!(exec_err.to_string().contains("Execution error (1)"));
        assert!(exec_err.to_string().contains("no such table"));

        let missing = BatchliteError::StatementNotFound("tracks.insert".to_string());
        assert!(missing.to_string().contains("tracks.insert"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BatchliteError = io_err.into();
        match err {
            BatchliteError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }

        let sql_err = rusqlite::Error::ExecuteReturnedResults;
        let err: BatchliteError = sql_err.into();
        match err {
            BatchliteError::Database(_) => {}
            _ => panic!("Expected Database error"),
        }
    }
}
