//! Optimistic concurrency for record writes
//!
//! A versioned record starts at version 1 and gains one per successful
//! update. An update names the version it was based on; if the stored record
//! has moved on, the write is refused with a race error and nothing changes.
//!
//! The check and the write are one statement: the update only matches a
//! record still at the expected version, and zero matched records is
//! reported as a race. Two writers that both read version `n` can therefore
//! never both succeed.

use chrono::Utc;
use tablio_common::FieldValue;
use tracing::debug;

use crate::audit::EditType;
use crate::context::RunContext;
use crate::error::GuardError;
use crate::schema::{
    TableSchema, CREATED_AT_COLUMN, CREATOR_COLUMN, UPDATED_AT_COLUMN, UPDATER_COLUMN,
    VERSION_COLUMN,
};
use crate::storage::{key_values, KeyValues, Record, StoreTransaction};

/// What a successful save did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedRecord {
    pub edit_type: EditType,
    /// Version now stored; `None` for tables without a version column
    pub version: Option<i64>,
}

/// Writes records through the version check
pub struct VersionGuard<'a> {
    schema: &'a TableSchema,
}

impl<'a> VersionGuard<'a> {
    pub fn new(schema: &'a TableSchema) -> Self {
        Self { schema }
    }

    /// Write `candidate` in `tx`: exactly one write, or none and an error.
    ///
    /// `edit_type` only matters for tables without a version column, where
    /// it selects between insert and update-by-key. Versioned tables decide
    /// from the candidate's version and the stored record.
    pub fn save(
        &self,
        tx: &mut dyn StoreTransaction,
        candidate: &Record,
        edit_type: EditType,
        ctx: &RunContext,
    ) -> Result<SavedRecord, GuardError> {
        let mut record = candidate.clone();
        if self.schema.stamped {
            stamp(&mut record, ctx);
        }

        let key = key_values(self.schema, &record);
        if !self.schema.versioned {
            return self.save_unversioned(tx, &record, key, edit_type);
        }

        let candidate_version = record.get(VERSION_COLUMN).and_then(FieldValue::as_integer);
        let Some(key) = key else {
            return self.insert_first(tx, record);
        };
        let Some(found) = tx.find_by_key(self.schema, &key)? else {
            // the record is gone; accept the row as new
            return self.insert_first(tx, record);
        };

        let found_version = found.get(VERSION_COLUMN).and_then(FieldValue::as_integer);
        let expected = match (candidate_version, found_version) {
            // the stored record never entered versioning; restart it at 1
            (_, None) => return self.restart_versioning(tx, &key, record),
            (None, Some(_)) => return self.insert_first(tx, record),
            (Some(expected), Some(found)) if expected == found => expected,
            (Some(expected), Some(found)) => {
                return Err(self.race(expected, Some(found.to_string())))
            }
        };

        let next = expected + 1;
        record.insert(VERSION_COLUMN.to_string(), FieldValue::Integer(next));
        if tx.update(self.schema, &key, &record, Some(expected))? == 0 {
            return Err(self.race(expected, None));
        }

        debug!(table = %self.schema.name, version = next, "Updated versioned record");
        Ok(SavedRecord {
            edit_type: EditType::Update,
            version: Some(next),
        })
    }

    fn insert_first(
        &self,
        tx: &mut dyn StoreTransaction,
        mut record: Record,
    ) -> Result<SavedRecord, GuardError> {
        record.insert(VERSION_COLUMN.to_string(), FieldValue::Integer(1));
        tx.insert(self.schema, &record)?;
        Ok(SavedRecord {
            edit_type: EditType::Insert,
            version: Some(1),
        })
    }

    fn restart_versioning(
        &self,
        tx: &mut dyn StoreTransaction,
        key: &KeyValues,
        mut record: Record,
    ) -> Result<SavedRecord, GuardError> {
        record.insert(VERSION_COLUMN.to_string(), FieldValue::Integer(1));
        if tx.update(self.schema, key, &record, None)? == 0 {
            return Err(self.race(1, None));
        }
        debug!(table = %self.schema.name, "Overwrote record without a stored version");
        Ok(SavedRecord {
            edit_type: EditType::Update,
            version: Some(1),
        })
    }

    fn save_unversioned(
        &self,
        tx: &mut dyn StoreTransaction,
        record: &Record,
        key: Option<KeyValues>,
        edit_type: EditType,
    ) -> Result<SavedRecord, GuardError> {
        if let (EditType::Update, Some(key)) = (edit_type, key) {
            if tx.update(self.schema, &key, record, None)? > 0 {
                return Ok(SavedRecord {
                    edit_type: EditType::Update,
                    version: None,
                });
            }
        }
        tx.insert(self.schema, record)?;
        Ok(SavedRecord {
            edit_type: EditType::Insert,
            version: None,
        })
    }

    fn race(&self, expected: i64, found: Option<String>) -> GuardError {
        GuardError::RaceCondition {
            table: self.schema.name.clone(),
            expected,
            found: found.unwrap_or_else(|| "a concurrent change".to_string()),
        }
    }
}

/// Fill the audit stamp columns of a stamped table
fn stamp(record: &mut Record, ctx: &RunContext) {
    let now = FieldValue::DateTime(Utc::now().naive_utc());
    let missing = |record: &Record, column: &str| {
        record
            .get(column)
            .map_or(true, |v| v.is_null() || v.as_text() == Some(""))
    };

    record.insert(UPDATED_AT_COLUMN.to_string(), now.clone());
    if missing(record, UPDATER_COLUMN) {
        record.insert(UPDATER_COLUMN.to_string(), ctx.principal.as_str().into());
    }
    if missing(record, CREATOR_COLUMN) {
        let updater = record.get(UPDATER_COLUMN).cloned().unwrap_or_default();
        record.insert(CREATOR_COLUMN.to_string(), updater);
    }
    if missing(record, CREATED_AT_COLUMN) {
        record.insert(CREATED_AT_COLUMN.to_string(), now);
    }
}
