//! Error types for Tablio CLI
//!
//! This module provides user-friendly error types with clear, actionable messages
//! that help users understand what went wrong and how to fix it.

use tablio_engine::error::{
    CatalogError, ExportError, ImportError, PolicyError, StoreError,
};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Comprehensive error type for CLI operations
///
/// All errors are designed to be user-facing with clear messages and suggestions.
#[derive(Error, Debug)]
pub enum CliError {
    /// Required file is missing
    #[error("File not found: '{0}'. Verify the file path exists and you have read permissions.")]
    FileNotFound(String),

    /// Target table could not be resolved
    #[error("{0}. Run 'tablio schema <table>' to inspect a table.")]
    Catalog(#[from] CatalogError),

    /// Policy file or flags are invalid
    #[error("Invalid import policy: {0}")]
    Policy(#[from] PolicyError),

    /// Import run failed before finishing
    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    /// Export failed
    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    /// Database could not be read or written
    #[error("Database error: {0}. Check the --database path (or TABLIO_DATABASE).")]
    Store(#[from] StoreError),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// JSON rendering failed
    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV rendering failed
    #[error("Failed to render CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables or .env file.")]
    Config(String),

    /// Background task failed to complete
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a file-not-found error
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound(path.into())
    }
}
