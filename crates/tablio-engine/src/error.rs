//! Error types for the import/export engine
//!
//! Row-level problems (bad cells, failed validation, unique conflicts) never
//! surface here: they are recorded in the audit log and counted against the
//! error tolerance. The enums below cover conditions that end an operation.

use tablio_common::TablioError;
use thiserror::Error;

/// Result type alias for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a storage backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated on '{table}': {message}")]
    UniqueViolation { table: String, message: String },

    #[error("Constraint violated on '{table}': {message}")]
    ConstraintViolation { table: String, message: String },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Stored value for '{table}.{column}' cannot be read: {message}")]
    CorruptValue {
        table: String,
        column: String,
        message: String,
    },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the failure concerns only the row being written.
    ///
    /// Constraint violations demote that row to an error entry; anything
    /// else means the store itself cannot be trusted for the rest of the run.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            StoreError::UniqueViolation { .. } | StoreError::ConstraintViolation { .. }
        )
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        StoreError::Unavailable(msg.into())
    }
}

/// Errors raised while resolving a table's schema
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Table '{table}' cannot be mapped: {reason}")]
    Unmapped { table: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised when building or loading a policy
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Invalid chunk size {0}: must be zero or positive")]
    InvalidChunkSize(i64),

    #[error("Invalid header row count {0}: must be zero or positive")]
    InvalidHeaderRows(i64),

    #[error("Invalid error tolerance rate {0}: must be between 0 and 100")]
    InvalidToleranceRate(i64),

    #[error("Invalid {name} format '{format}'")]
    InvalidFormat { name: &'static str, format: String },

    #[error("Invalid CSV dialect: {0}")]
    InvalidDialect(String),

    #[error("Column '{0}' is listed more than once")]
    DuplicateColumn(String),

    #[error(transparent)]
    Encoding(#[from] TablioError),

    #[error("Failed to parse policy file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a versioned write
#[derive(Error, Debug)]
pub enum GuardError {
    #[error(
        "Record in '{table}' was changed by another writer (expected version {expected}, found {found})"
    )]
    RaceCondition {
        table: String,
        expected: i64,
        found: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run-level import failures
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Permission denied: '{principal}' may not import into '{table}'")]
    PermissionDenied { principal: String, table: String },

    #[error("Unreadable input at row {row_number}: {message}")]
    Stream { row_number: u64, message: String },

    #[error("Import aborted: {error_count} rejected rows exceed the limit of {error_limit}")]
    ToleranceExceeded {
        batch_id: String,
        error_count: usize,
        error_limit: usize,
    },

    #[error("Import hook failed: {0}")]
    Hook(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ImportError {
    pub fn stream(row_number: u64, msg: impl Into<String>) -> Self {
        ImportError::Stream {
            row_number,
            message: msg.into(),
        }
    }

    pub fn hook(msg: impl Into<String>) -> Self {
        ImportError::Hook(msg.into())
    }
}

/// Run-level export failures
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Permission denied: '{principal}' may not export '{table}'")]
    PermissionDenied { principal: String, table: String },

    #[error("{headers} headers given for {fields} fields")]
    HeaderMismatch { fields: usize, headers: usize },

    #[error("Spreadsheet cannot hold {0}")]
    SheetLimit(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Encoding(#[from] TablioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_row_level_store_errors() {
        let unique = StoreError::UniqueViolation {
            table: "users".into(),
            message: "username".into(),
        };
        assert!(unique.is_row_level());
        assert!(!StoreError::unavailable("disk gone").is_row_level());
    }

    #[test]
    fn test_tolerance_message() {
        let err = ImportError::ToleranceExceeded {
            batch_id: "b".into(),
            error_count: 2,
            error_limit: 1,
        };
        assert_eq!(
            err.to_string(),
            "Import aborted: 2 rejected rows exceed the limit of 1"
        );
    }
}
