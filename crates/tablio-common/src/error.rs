//! Error types for Tablio

use thiserror::Error;

use crate::types::ValueParseError;

/// Result type alias for Tablio operations
pub type Result<T> = std::result::Result<T, TablioError>;

/// Main error type shared across Tablio crates
#[derive(Error, Debug)]
pub enum TablioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("Input is not valid {encoding} text")]
    Decode { encoding: &'static str },

    #[error("Text cannot be represented in {encoding}")]
    Encode { encoding: &'static str },

    #[error("Parse error: {0}")]
    Parse(#[from] ValueParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}
