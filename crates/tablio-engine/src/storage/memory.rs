//! In-memory storage backend
//!
//! Holds tables and the audit log in process memory. Transactions work on a
//! copy of the tables and swap it in on commit, so an abandoned transaction
//! leaves no trace. Unique keys and required fields are enforced the way a
//! relational store enforces `UNIQUE` and `NOT NULL`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tablio_common::FieldValue;

use crate::audit::{AuditLog, ImportLogEntry};
use crate::error::{CatalogError, StoreError, StoreResult};
use crate::schema::{SchemaCatalog, StaticCatalog, TableSchema, VERSION_COLUMN};
use crate::storage::{key_values, Record, RecordReader, RecordStore, StoreTransaction};

type Tables = HashMap<String, Vec<Record>>;

/// Process-local record store, audit log and schema catalog
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    catalog: StaticCatalog,
    tables: Mutex<Tables>,
    log: Mutex<Vec<ImportLogEntry>>,
    /// Commits left before the store reports itself unavailable
    commit_budget: Mutex<Option<usize>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table schema
    pub fn with_table(mut self, schema: TableSchema) -> Result<Self, CatalogError> {
        self.catalog.register(schema)?;
        Ok(self)
    }

    /// Let `commits` more transactions commit, then fail every new one.
    ///
    /// Simulates the store going away in the middle of a run.
    pub fn fail_after_commits(&self, commits: usize) -> StoreResult<()> {
        *lock(&self.commit_budget)? = Some(commits);
        Ok(())
    }

    /// Every committed record of a table, in insertion order
    pub fn records(&self, table: &str) -> StoreResult<Vec<Record>> {
        Ok(lock(&self.tables)?.get(table).cloned().unwrap_or_default())
    }

    /// Seed a committed record directly, bypassing transactions
    pub fn seed(&self, table: &str, record: Record) -> StoreResult<()> {
        lock(&self.tables)?
            .entry(table.to_string())
            .or_default()
            .push(record);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::unavailable("memory store lock poisoned"))
}

fn matches_key(record: &Record, key: &[(String, FieldValue)]) -> bool {
    key.iter().all(|(column, value)| record.get(column) == Some(value))
}

fn find_in(tables: &Tables, schema: &TableSchema, key: &[(String, FieldValue)]) -> Option<Record> {
    tables
        .get(&schema.name)?
        .iter()
        .find(|record| matches_key(record, key))
        .cloned()
}

/// Keep only the columns the table actually has
fn storable(schema: &TableSchema, record: &Record) -> Record {
    schema
        .storage_columns()
        .into_iter()
        .filter_map(|(column, _)| {
            record
                .get(column)
                .map(|value| (column.to_string(), value.clone()))
        })
        .collect()
}

impl RecordReader for MemoryDatabase {
    fn find_by_key(
        &self,
        schema: &TableSchema,
        key: &[(String, FieldValue)],
    ) -> StoreResult<Option<Record>> {
        let tables = lock(&self.tables)?;
        Ok(find_in(&tables, schema, key))
    }
}

impl RecordStore for MemoryDatabase {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        if *lock(&self.commit_budget)? == Some(0) {
            return Err(StoreError::unavailable("memory store is offline"));
        }
        let tables = lock(&self.tables)?;
        let staged = tables.clone();
        Ok(Box::new(MemoryTransaction {
            db: self,
            tables,
            staged,
        }))
    }

    fn fetch_page(
        &self,
        schema: &TableSchema,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Record>> {
        let tables = lock(&self.tables)?;
        let rows = tables.get(&schema.name).map(Vec::as_slice).unwrap_or_default();
        let page = rows.iter().skip(offset);
        Ok(match limit {
            Some(limit) => page.take(limit).cloned().collect(),
            None => page.cloned().collect(),
        })
    }
}

impl SchemaCatalog for MemoryDatabase {
    fn table(&self, name: &str) -> Result<TableSchema, CatalogError> {
        self.catalog.table(name)
    }
}

impl AuditLog for MemoryDatabase {
    fn append(&self, entries: &[ImportLogEntry]) -> StoreResult<()> {
        let mut log = lock(&self.log)?;
        let mut next_id = i64::try_from(log.len()).unwrap_or(i64::MAX);
        let mut staged: Vec<ImportLogEntry> = Vec::with_capacity(entries.len());

        for entry in entries {
            let triple = (&entry.batch_id, &entry.file_name, entry.row_number);
            let duplicate = log
                .iter()
                .chain(staged.iter())
                .any(|e| (&e.batch_id, &e.file_name, e.row_number) == triple);
            if duplicate {
                return Err(StoreError::UniqueViolation {
                    table: "import_log".to_string(),
                    message: format!(
                        "row {} of '{}' already logged for batch {}",
                        entry.row_number, entry.file_name, entry.batch_id
                    ),
                });
            }
            next_id += 1;
            let mut entry = entry.clone();
            entry.id = Some(next_id);
            staged.push(entry);
        }

        log.extend(staged);
        Ok(())
    }

    fn entries(&self, batch_id: &str) -> StoreResult<Vec<ImportLogEntry>> {
        let mut entries: Vec<ImportLogEntry> = lock(&self.log)?
            .iter()
            .filter(|e| e.batch_id == batch_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| (&a.file_name, a.row_number).cmp(&(&b.file_name, b.row_number)));
        Ok(entries)
    }
}

struct MemoryTransaction<'a> {
    db: &'a MemoryDatabase,
    tables: MutexGuard<'a, Tables>,
    staged: Tables,
}

impl RecordReader for MemoryTransaction<'_> {
    fn find_by_key(
        &self,
        schema: &TableSchema,
        key: &[(String, FieldValue)],
    ) -> StoreResult<Option<Record>> {
        Ok(find_in(&self.staged, schema, key))
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn insert(&mut self, schema: &TableSchema, record: &Record) -> StoreResult<()> {
        for field in schema.fields.iter().filter(|f| f.required) {
            if record.get(&field.name).map_or(true, FieldValue::is_null) {
                return Err(StoreError::ConstraintViolation {
                    table: schema.name.clone(),
                    message: format!("NOT NULL constraint failed: {}.{}", schema.name, field.name),
                });
            }
        }
        if let Some(key) = key_values(schema, record) {
            if find_in(&self.staged, schema, &key).is_some() {
                return Err(StoreError::UniqueViolation {
                    table: schema.name.clone(),
                    message: format!(
                        "UNIQUE constraint failed: {}",
                        schema.unique_key.join(", ")
                    ),
                });
            }
        }

        self.staged
            .entry(schema.name.clone())
            .or_default()
            .push(storable(schema, record));
        Ok(())
    }

    fn update(
        &mut self,
        schema: &TableSchema,
        key: &[(String, FieldValue)],
        record: &Record,
        expected_version: Option<i64>,
    ) -> StoreResult<usize> {
        let Some(rows) = self.staged.get_mut(&schema.name) else {
            return Ok(0);
        };
        let changes = storable(schema, record);
        let mut affected = 0;
        for row in rows.iter_mut().filter(|row| matches_key(row, key)) {
            if let Some(expected) = expected_version {
                let current = row.get(VERSION_COLUMN).and_then(FieldValue::as_integer);
                if current != Some(expected) {
                    continue;
                }
            }
            row.extend(changes.clone());
            affected += 1;
        }
        Ok(affected)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            db,
            mut tables,
            staged,
        } = *self;
        {
            let mut budget = lock(&db.commit_budget)?;
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(StoreError::unavailable("memory store is offline"));
                }
                *remaining -= 1;
            }
        }
        *tables = staged;
        Ok(())
    }
}
