//! Tablio Engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Chunked CSV import into relational tables, and paged export back out.
//!
//! # Import
//!
//! An import run reads a byte stream in a configured encoding and dialect,
//! validates every row against the target [`TableSchema`], and commits rows
//! in chunks. Each chunk is one transaction; rows that fail validation or
//! lose a version race are logged and discarded without affecting the rest
//! of the chunk. When a full chunk leaves the run's cumulative error count
//! above the policy's limit, the run stops and earlier chunks stay
//! committed.
//!
//! Every data row produces one [`ImportLogEntry`] in the audit log, keyed
//! by batch, file and row number.
//!
//! # Export
//!
//! [`export_table`] pages through a table and writes CSV in any supported
//! encoding, or an xlsx workbook.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tablio_engine::{ChunkProcessor, ImportPolicy, RunContext, SchemaCatalog, SqliteDatabase};
//!
//! fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(SqliteDatabase::open("app.db")?);
//!     let schema = db.table("customers")?;
//!     let policy = ImportPolicy::builder().chunk_size(500).build()?;
//!     let processor = ChunkProcessor::new(db.clone(), db.clone());
//!
//!     let file = std::fs::File::open("customers.csv")?;
//!     let ctx = RunContext::new("alice");
//!     let summary = processor.run(file, "customers.csv", &schema, &policy, &ctx)?;
//!     println!("{} imported, {} discarded", summary.rows_imported, summary.rows_discarded);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod conflict;
pub mod context;
pub mod error;
pub mod export;
pub mod guard;
pub mod permission;
pub mod policy;
pub mod processor;
pub mod schema;
pub mod storage;
pub mod validator;

// Re-export commonly used types
pub use audit::{AuditLog, BatchReport, EditType, EntryLevel, ImportLogEntry, LogType, RowContent};
pub use context::RunContext;
pub use error::{CatalogError, ExportError, GuardError, ImportError, PolicyError, StoreError};
pub use export::{export_table, ExportFormat, ExportSummary, Exporter};
pub use permission::{Action, AllowAll, PermissionOracle};
pub use policy::{ExportPolicy, ImportPolicy, TextFormat};
pub use processor::{ChunkProcessor, ImportHooks, ImportOutcome, ImportSummary, NoHooks};
pub use schema::{FieldDef, SchemaCatalog, StaticCatalog, TableSchema};
pub use storage::{MemoryDatabase, Record, RecordStore, SqliteDatabase};
