//! Error types for CLI operations

use thiserror::Error;

/// CLI errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(#[from] tollgate_auth::ConfigError),

    /// Verification or issuance failed
    #[error("{0}")]
    Auth(#[from] tollgate_auth::AuthError),

    /// Token could not be decoded
    #[error("Malformed token: {0}")]
    Token(#[from] tollgate_auth::TokenFormatError),

    /// No configuration file given
    #[error("No configuration file; pass --config or set TOLLGATE_CONFIG")]
    MissingConfig,

    /// Invalid command arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Logging could not be initialized
    #[error("Logging error: {0}")]
    Logging(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
