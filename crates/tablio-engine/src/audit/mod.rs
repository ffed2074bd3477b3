//! Row-level import audit log
//!
//! Every data row of an import produces one [`ImportLogEntry`]. Entries are
//! appended in bulk when their chunk commits and never change afterwards.

pub mod types;

pub use types::{EditType, EntryLevel, FieldErrors, ImportLogEntry, LogType, RowContent};

use crate::error::StoreResult;

/// Durable store of import log entries
pub trait AuditLog: Send + Sync {
    /// Append entries in one transaction.
    ///
    /// `(batch_id, file_name, row_number)` is unique; appending a duplicate
    /// fails the whole call.
    fn append(&self, entries: &[ImportLogEntry]) -> StoreResult<()>;

    /// Every entry of a batch, ordered by file name then row number
    fn entries(&self, batch_id: &str) -> StoreResult<Vec<ImportLogEntry>>;
}

/// Entries of one batch split by outcome
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub imported: Vec<ImportLogEntry>,
    pub skipped: Vec<ImportLogEntry>,
    pub discarded: Vec<ImportLogEntry>,
}

impl BatchReport {
    pub fn load(log: &dyn AuditLog, batch_id: &str) -> StoreResult<Self> {
        Ok(Self::from_entries(log.entries(batch_id)?))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ImportLogEntry>) -> Self {
        let mut report = Self::default();
        for entry in entries {
            match entry.level {
                EntryLevel::Info => report.imported.push(entry),
                EntryLevel::Warn => report.skipped.push(entry),
                EntryLevel::Error => report.discarded.push(entry),
            }
        }
        for group in [&mut report.imported, &mut report.skipped, &mut report.discarded] {
            group.sort_by(|a, b| (&a.file_name, a.row_number).cmp(&(&b.file_name, b.row_number)));
        }
        report
    }

    /// Rows needing attention: rejected rows first, then skipped rows
    pub fn problems(&self) -> impl Iterator<Item = &ImportLogEntry> {
        self.discarded.iter().chain(self.skipped.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.discarded.is_empty() && self.skipped.is_empty()
    }
}
