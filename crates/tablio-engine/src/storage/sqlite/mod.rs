//! SQLite storage backend
//!
//! One connection behind a mutex serves reads, writes and the import log.
//! A write transaction holds the lock from `BEGIN IMMEDIATE` until it commits
//! or is dropped, which rolls it back.
//!
//! Values are stored with SQLite's natural types: integers and booleans as
//! `INTEGER`, text as `TEXT`, dates as `YYYY-MM-DD` and datetimes as
//! `YYYY-MM-DD HH:MM:SS` text.

mod catalog;
pub mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode};
use tablio_common::{FieldKind, FieldValue};
use tracing::{debug, warn};

use crate::audit::{AuditLog, ImportLogEntry, RowContent};
use crate::error::{StoreError, StoreResult};
use crate::schema::{TableSchema, VERSION_COLUMN};
use crate::storage::{Record, RecordReader, RecordStore, StoreTransaction};

pub use schema::IMPORT_LOG_TABLE;

const STORAGE_DATE_FORMAT: &str = "%Y-%m-%d";
const STORAGE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed record store, import log and schema catalog
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Open (or create) a database file and ensure the import log exists
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            StoreError::unavailable(format!("cannot open {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_connection(conn)
    }

    /// Create an in-memory database (useful for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run raw SQL, e.g. DDL creating target tables
    pub fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::unavailable("database connection lock poisoned"))
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Integer(i) => Value::Integer(*i),
        FieldValue::Boolean(b) => Value::Integer(i64::from(*b)),
        FieldValue::Date(d) => Value::Text(d.format(STORAGE_DATE_FORMAT).to_string()),
        FieldValue::DateTime(dt) => Value::Text(dt.format(STORAGE_DATETIME_FORMAT).to_string()),
    }
}

fn from_sql(
    schema: &TableSchema,
    column: &str,
    kind: FieldKind,
    value: ValueRef<'_>,
) -> StoreResult<FieldValue> {
    let corrupt = |message: String| StoreError::CorruptValue {
        table: schema.name.clone(),
        column: column.to_string(),
        message,
    };

    let text = match value {
        ValueRef::Null => return Ok(FieldValue::Null),
        ValueRef::Integer(i) => match kind {
            FieldKind::Integer => return Ok(FieldValue::Integer(i)),
            FieldKind::Boolean => return Ok(FieldValue::Boolean(i != 0)),
            _ => i.to_string(),
        },
        ValueRef::Real(f) => match kind {
            FieldKind::Integer if f.fract() == 0.0 => return Ok(FieldValue::Integer(f as i64)),
            _ => f.to_string(),
        },
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map_err(|e| corrupt(e.to_string()))?
            .to_string(),
        ValueRef::Blob(_) => return Err(corrupt("unexpected BLOB".to_string())),
    };

    match kind {
        FieldKind::Text => Ok(FieldValue::Text(text)),
        FieldKind::Integer | FieldKind::Boolean => {
            FieldValue::parse(&text, kind, STORAGE_DATE_FORMAT, STORAGE_DATETIME_FORMAT)
                .map_err(|e| corrupt(e.to_string()))
        }
        // tolerate a time part on DATE columns and a 'T' separator or
        // fractional seconds on DATETIME columns
        FieldKind::Date => text
            .get(..10)
            .and_then(|day| NaiveDate::parse_from_str(day, STORAGE_DATE_FORMAT).ok())
            .map(FieldValue::Date)
            .ok_or_else(|| corrupt(format!("'{}' is not a date", text))),
        FieldKind::DateTime => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(&text, fmt).ok())
            .map(FieldValue::DateTime)
            .ok_or_else(|| corrupt(format!("'{}' is not a datetime", text))),
    }
}

/// Map constraint failures to row-level errors and I/O failures to unavailability
fn classify(table: &str, err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(code, message) = &err {
        let message = message.clone().unwrap_or_else(|| code.to_string());
        match code.code {
            ErrorCode::ConstraintViolation => {
                let unique = code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY;
                let table = table.to_string();
                return if unique {
                    StoreError::UniqueViolation { table, message }
                } else {
                    StoreError::ConstraintViolation { table, message }
                };
            }
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::DiskFull
            | ErrorCode::SystemIoFailure
            | ErrorCode::ReadOnly
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt => return StoreError::Unavailable(message),
            _ => {}
        }
    }
    StoreError::Sqlite(err)
}

fn select_list(schema: &TableSchema) -> String {
    schema
        .storage_columns()
        .into_iter()
        .map(|(column, _)| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_record(schema: &TableSchema, row: &rusqlite::Row<'_>) -> StoreResult<Record> {
    let mut record = Record::new();
    for (idx, (column, kind)) in schema.storage_columns().into_iter().enumerate() {
        let value = from_sql(schema, column, kind, row.get_ref(idx)?)?;
        record.insert(column.to_string(), value);
    }
    Ok(record)
}

/// Columns of `record` that exist in the table, in storage order
fn writable<'r>(schema: &TableSchema, record: &'r Record) -> Vec<(String, &'r FieldValue)> {
    schema
        .storage_columns()
        .into_iter()
        .filter_map(|(column, _)| record.get(column).map(|value| (column.to_string(), value)))
        .collect()
}

fn find_by_key(
    conn: &Connection,
    schema: &TableSchema,
    key: &[(String, FieldValue)],
) -> StoreResult<Option<Record>> {
    if key.is_empty() {
        return Ok(None);
    }
    let predicate = key
        .iter()
        .map(|(column, _)| format!("{} = ?", quote_ident(column)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!(
        "SELECT {} FROM {} WHERE {} LIMIT 1",
        select_list(schema),
        quote_ident(&schema.name),
        predicate
    );

    let mut stmt = conn.prepare(&sql).map_err(|e| classify(&schema.name, e))?;
    let mut rows = stmt
        .query(params_from_iter(key.iter().map(|(_, value)| to_sql(value))))
        .map_err(|e| classify(&schema.name, e))?;
    match rows.next()? {
        Some(row) => Ok(Some(read_record(schema, row)?)),
        None => Ok(None),
    }
}

impl RecordReader for SqliteDatabase {
    fn find_by_key(
        &self,
        schema: &TableSchema,
        key: &[(String, FieldValue)],
    ) -> StoreResult<Option<Record>> {
        let conn = self.conn()?;
        find_by_key(&conn, schema, key)
    }
}

impl RecordStore for SqliteDatabase {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| classify("", e))?;
        Ok(Box::new(SqliteTransaction {
            conn,
            finished: false,
        }))
    }

    fn fetch_page(
        &self,
        schema: &TableSchema,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Record>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid LIMIT ?1 OFFSET ?2",
            select_list(schema),
            quote_ident(&schema.name)
        );
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare(&sql).map_err(|e| classify(&schema.name, e))?;
        let mut rows = stmt.query(params![limit, offset])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_record(schema, row)?);
        }
        Ok(records)
    }
}

struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl RecordReader for SqliteTransaction<'_> {
    fn find_by_key(
        &self,
        schema: &TableSchema,
        key: &[(String, FieldValue)],
    ) -> StoreResult<Option<Record>> {
        find_by_key(&self.conn, schema, key)
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn insert(&mut self, schema: &TableSchema, record: &Record) -> StoreResult<()> {
        let columns = writable(schema, record);
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&schema.name))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&schema.name),
                columns
                    .iter()
                    .map(|(c, _)| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", "),
                vec!["?"; columns.len()].join(", ")
            )
        };

        self.conn
            .execute(&sql, params_from_iter(columns.iter().map(|(_, v)| to_sql(v))))
            .map_err(|e| classify(&schema.name, e))?;
        Ok(())
    }

    fn update(
        &mut self,
        schema: &TableSchema,
        key: &[(String, FieldValue)],
        record: &Record,
        expected_version: Option<i64>,
    ) -> StoreResult<usize> {
        let columns = writable(schema, record);
        if columns.is_empty() || key.is_empty() {
            return Ok(0);
        }

        let mut sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(&schema.name),
            columns
                .iter()
                .map(|(c, _)| format!("{} = ?", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", "),
            key.iter()
                .map(|(c, _)| format!("{} = ?", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(" AND ")
        );
        let mut values: Vec<Value> = columns.iter().map(|(_, v)| to_sql(v)).collect();
        values.extend(key.iter().map(|(_, v)| to_sql(v)));
        if let Some(expected) = expected_version {
            sql.push_str(&format!(" AND {} = ?", quote_ident(VERSION_COLUMN)));
            values.push(Value::Integer(expected));
        }

        self.conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| classify(&schema.name, e))
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| classify("", e))?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        debug!("Rolling back uncommitted transaction");
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "Rollback failed");
        }
    }
}

impl AuditLog for SqliteDatabase {
    fn append(&self, entries: &[ImportLogEntry]) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(|e| classify(IMPORT_LOG_TABLE, e))?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO import_log (
                    batch_id, file_name, row_number, row_content,
                    log_level, log_type, edit_type, message, field_errors,
                    creator, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.batch_id,
                    entry.file_name,
                    i64::try_from(entry.row_number).unwrap_or(i64::MAX),
                    entry.row_content.to_json()?,
                    entry.level.as_str(),
                    entry.log_type.as_str(),
                    entry.edit_type.as_str(),
                    entry.message,
                    serde_json::to_string(&entry.field_errors)?,
                    entry.creator,
                    entry.created_at.to_rfc3339(),
                ])
                .map_err(|e| classify(IMPORT_LOG_TABLE, e))?;
            }
        }
        tx.commit().map_err(|e| classify(IMPORT_LOG_TABLE, e))?;
        Ok(())
    }

    fn entries(&self, batch_id: &str) -> StoreResult<Vec<ImportLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, batch_id, file_name, row_number, row_content,
                   log_level, log_type, edit_type, message, field_errors,
                   creator, created_at
            FROM import_log
            WHERE batch_id = ?1
            ORDER BY file_name, row_number
            "#,
        )?;

        let mut rows = stmt.query([batch_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let corrupt = |column: &str, message: String| StoreError::CorruptValue {
                table: IMPORT_LOG_TABLE.to_string(),
                column: column.to_string(),
                message,
            };

            let row_number: i64 = row.get(3)?;
            let row_content: String = row.get(4)?;
            let level: String = row.get(5)?;
            let log_type: String = row.get(6)?;
            let edit_type: String = row.get(7)?;
            let field_errors: String = row.get(9)?;
            let created_at: String = row.get(11)?;

            entries.push(ImportLogEntry {
                id: Some(row.get(0)?),
                batch_id: row.get(1)?,
                file_name: row.get(2)?,
                row_number: u64::try_from(row_number)
                    .map_err(|e| corrupt("row_number", e.to_string()))?,
                row_content: RowContent::from_json(&row_content)?,
                level: level.parse().map_err(|e| corrupt("log_level", e))?,
                log_type: log_type.parse().map_err(|e| corrupt("log_type", e))?,
                edit_type: edit_type.parse().map_err(|e| corrupt("edit_type", e))?,
                message: row.get(8)?,
                field_errors: serde_json::from_str(&field_errors)?,
                creator: row.get(10)?,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| corrupt("created_at", e.to_string()))?,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::audit::{EditType, EntryLevel, FieldErrors, LogType};
    use crate::schema::FieldDef;

    const USERS_DDL: &str = r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username VARCHAR(150) NOT NULL UNIQUE,
            email TEXT,
            joined DATE,
            version INTEGER NOT NULL DEFAULT 1
        );
    "#;

    fn schema() -> TableSchema {
        TableSchema::new("users")
            .field(FieldDef::text("username").required().max_length(150))
            .field(FieldDef::text("email"))
            .field(FieldDef::date("joined"))
            .unique_key(["username"])
            .versioned()
    }

    fn db() -> SqliteDatabase {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch(USERS_DDL).unwrap();
        db
    }

    fn user(name: &str, version: i64) -> Record {
        [
            ("username".to_string(), FieldValue::from(name)),
            (
                "joined".to_string(),
                FieldValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            ),
            ("version".to_string(), FieldValue::Integer(version)),
        ]
        .into_iter()
        .collect()
    }

    fn key(name: &str) -> Vec<(String, FieldValue)> {
        vec![("username".to_string(), FieldValue::from(name))]
    }

    #[test]
    fn test_insert_and_find_round_trips_types() {
        let db = db();
        let mut tx = db.begin().unwrap();
        tx.insert(&schema(), &user("alice", 1)).unwrap();
        tx.commit().unwrap();

        let found = db.find_by_key(&schema(), &key("alice")).unwrap().unwrap();
        assert_eq!(found["username"], FieldValue::from("alice"));
        assert_eq!(found["email"], FieldValue::Null);
        assert_eq!(
            found["joined"],
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(found["version"], FieldValue::Integer(1));
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let db = db();
        {
            let mut tx = db.begin().unwrap();
            tx.insert(&schema(), &user("alice", 1)).unwrap();
        }
        assert!(db.find_by_key(&schema(), &key("alice")).unwrap().is_none());
    }

    #[test]
    fn test_unique_violation_is_row_level() {
        let db = db();
        let mut tx = db.begin().unwrap();
        tx.insert(&schema(), &user("alice", 1)).unwrap();
        let err = tx.insert(&schema(), &user("alice", 1)).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));

        // the failed statement does not poison the transaction
        tx.insert(&schema(), &user("bob", 1)).unwrap();
        tx.commit().unwrap();
        assert_eq!(db.fetch_page(&schema(), 0, None).unwrap().len(), 2);
    }

    #[test]
    fn test_not_null_violation_is_row_level() {
        let db = db();
        let mut tx = db.begin().unwrap();
        let err = tx.insert(&schema(), &Record::new()).unwrap_err();
        assert!(err.is_row_level());
    }

    #[test]
    fn test_compare_and_swap_update() {
        let db = db();
        let mut tx = db.begin().unwrap();
        tx.insert(&schema(), &user("alice", 2)).unwrap();

        let stale = tx.update(&schema(), &key("alice"), &user("alice", 2), Some(1)).unwrap();
        assert_eq!(stale, 0);
        let fresh = tx.update(&schema(), &key("alice"), &user("alice", 3), Some(2)).unwrap();
        assert_eq!(fresh, 1);
        tx.commit().unwrap();

        let found = db.find_by_key(&schema(), &key("alice")).unwrap().unwrap();
        assert_eq!(found["version"], FieldValue::Integer(3));
    }

    #[test]
    fn test_fetch_page_in_rowid_order() {
        let db = db();
        let mut tx = db.begin().unwrap();
        for name in ["c", "a", "b"] {
            tx.insert(&schema(), &user(name, 1)).unwrap();
        }
        tx.commit().unwrap();

        let page = db.fetch_page(&schema(), 1, Some(5)).unwrap();
        let names: Vec<_> = page.iter().map(|r| r["username"].clone()).collect();
        assert_eq!(names, vec![FieldValue::from("a"), FieldValue::from("b")]);
    }

    #[test]
    fn test_audit_log_append_and_order() {
        let db = db();
        let entry = |row_number: u64, level: EntryLevel| ImportLogEntry {
            id: None,
            batch_id: "batch-1".into(),
            file_name: "users.csv".into(),
            row_number,
            row_content: [("username", "alice"), ("email", "")].into_iter().collect(),
            level,
            log_type: LogType::Upload,
            edit_type: EditType::Insert,
            message: "Newly imported row.".into(),
            field_errors: FieldErrors::new(),
            creator: "tester".into(),
            created_at: Utc::now(),
        };

        db.append(&[entry(3, EntryLevel::Error), entry(2, EntryLevel::Info)])
            .unwrap();

        let entries = db.entries("batch-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].row_number, 2);
        assert_eq!(entries[1].level, EntryLevel::Error);
        assert_eq!(entries[0].row_content.get("username"), Some("alice"));
        assert!(entries[0].id.is_some());

        let dup = db.append(&[entry(2, EntryLevel::Info)]).unwrap_err();
        assert!(matches!(dup, StoreError::UniqueViolation { .. }));
        assert!(db.entries("other").unwrap().is_empty());
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
