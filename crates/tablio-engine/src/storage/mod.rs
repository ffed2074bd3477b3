//! Storage primitives
//!
//! The pipeline needs only a handful of operations from a backend: look a
//! record up by its unique key, insert, update by key (optionally only while
//! the stored version still matches), page through a table, and append to
//! the audit log. Two backends implement them:
//!
//! - [`MemoryDatabase`]: a process-local store for tests and dry runs
//! - [`SqliteDatabase`]: a SQLite file, with schemas read from the database

pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;

use tablio_common::FieldValue;

use crate::error::StoreResult;
use crate::schema::TableSchema;

pub use memory::MemoryDatabase;
pub use sqlite::SqliteDatabase;

/// A record as column name → typed value
pub type Record = BTreeMap<String, FieldValue>;

/// Unique-key column values in key order
pub type KeyValues = Vec<(String, FieldValue)>;

/// Extract the unique-key values of `record`.
///
/// Returns `None` when the table has no unique key or any key column is
/// null; such a record can never collide with an existing one.
pub fn key_values(schema: &TableSchema, record: &Record) -> Option<KeyValues> {
    if !schema.has_unique_key() {
        return None;
    }
    schema
        .unique_key
        .iter()
        .map(|field| match record.get(field) {
            Some(value) if !value.is_null() => Some((field.clone(), value.clone())),
            _ => None,
        })
        .collect()
}

/// Read access shared by stores and open transactions
pub trait RecordReader {
    /// Find the record whose unique-key columns equal `key`
    fn find_by_key(&self, schema: &TableSchema, key: &[(String, FieldValue)])
        -> StoreResult<Option<Record>>;
}

/// An open write transaction.
///
/// Dropping a transaction without calling [`StoreTransaction::commit`]
/// discards every write made through it.
pub trait StoreTransaction: RecordReader {
    fn insert(&mut self, schema: &TableSchema, record: &Record) -> StoreResult<()>;

    /// Overwrite the record matching `key` with the columns of `record`.
    ///
    /// With `expected_version` set, only a record still at that version is
    /// touched. Returns the number of records changed.
    fn update(
        &mut self,
        schema: &TableSchema,
        key: &[(String, FieldValue)],
        record: &Record,
        expected_version: Option<i64>,
    ) -> StoreResult<usize>;

    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// A store of target-table records
pub trait RecordStore: RecordReader + Send + Sync {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>>;

    /// Records in storage order, skipping `offset`; `limit` of `None` reads to the end
    fn fetch_page(
        &self,
        schema: &TableSchema,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Record>>;
}
