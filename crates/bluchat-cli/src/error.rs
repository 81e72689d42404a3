//! Error handling for the BluChat CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Chat(#[from] bluchat_core::ChatError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend initialization failed: {0}")]
    BackendInit(String),

    #[error("message cannot be empty")]
    EmptyMessage,

    #[error("{0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feature not available: {0}")]
    FeatureNotAvailable(String),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
