//! Tablio Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Tablio workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Tablio workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Encodings**: Text encodings accepted for CSV input and output
//! - **Logging**: `tracing` subscriber setup shared by binaries
//! - **Types**: Field kinds and typed field values
//!
//! # Example
//!
//! ```no_run
//! use tablio_common::{Result, TextEncoding};
//! use tablio_common::types::{FieldKind, FieldValue};
//!
//! fn parse_cell(raw: &[u8]) -> Result<FieldValue> {
//!     let text = TextEncoding::Utf8.decode(raw)?;
//!     let value = FieldValue::parse(&text, FieldKind::Integer, "%Y/%m/%d", "%Y/%m/%d %H:%M:%S")?;
//!     Ok(value)
//! }
//! ```

pub mod encoding;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use encoding::TextEncoding;
pub use error::{Result, TablioError};
pub use types::{FieldKind, FieldValue, ValueParseError};
