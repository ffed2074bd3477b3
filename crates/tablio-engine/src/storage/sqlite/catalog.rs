//! Table schemas read from SQLite's own metadata

use std::collections::HashSet;

use rusqlite::Connection;
use tablio_common::FieldKind;
use tracing::debug;

use super::{SqliteDatabase, IMPORT_LOG_TABLE};
use crate::error::{CatalogError, StoreResult};
use crate::schema::{FieldDef, SchemaCatalog, TableSchema, STAMP_COLUMNS, VERSION_COLUMN};

struct ColumnInfo {
    name: String,
    declared_type: String,
    not_null: bool,
    has_default: bool,
    primary_key: bool,
}

fn table_columns(conn: &Connection, table: &str) -> StoreResult<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#,
    )?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                declared_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                has_default: row.get::<_, Option<String>>(3)?.is_some(),
                primary_key: row.get::<_, i64>(4)? > 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Column lists of the table's unique indexes, oldest first, primary key excluded
fn unique_indexes(conn: &Connection, table: &str) -> StoreResult<Vec<Vec<String>>> {
    // index_list reports the newest index first
    let mut stmt = conn.prepare(
        r#"SELECT name FROM pragma_index_list(?1) WHERE "unique" = 1 AND origin != 'pk' ORDER BY seq DESC"#,
    )?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut indexes = Vec::new();
    for name in names {
        // expression indexes have no column name
        let columns = info
            .query_map([&name], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Option<Vec<_>>, _>>()?;
        if let Some(columns) = columns {
            indexes.push(columns);
        }
    }
    Ok(indexes)
}

/// Field kind implied by a declared column type
fn kind_for(declared_type: &str) -> FieldKind {
    let upper = declared_type.to_uppercase();
    if upper.contains("BOOL") {
        FieldKind::Boolean
    } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
        FieldKind::DateTime
    } else if upper.contains("DATE") {
        FieldKind::Date
    } else if upper.contains("INT") {
        FieldKind::Integer
    } else {
        FieldKind::Text
    }
}

/// `N` from a declared type such as `VARCHAR(N)`
fn max_length_for(declared_type: &str) -> Option<usize> {
    let upper = declared_type.to_uppercase();
    if !upper.contains("CHAR") {
        return None;
    }
    let open = upper.find('(')?;
    let close = upper[open..].find(')')? + open;
    upper[open + 1..close].trim().parse().ok()
}

impl SchemaCatalog for SqliteDatabase {
    fn table(&self, name: &str) -> Result<TableSchema, CatalogError> {
        if name == IMPORT_LOG_TABLE {
            return Err(CatalogError::Unmapped {
                table: name.to_string(),
                reason: "the import log is not an import target".to_string(),
            });
        }

        let conn = self.conn()?;
        let columns = table_columns(&conn, name)?;
        if columns.is_empty() {
            return Err(CatalogError::UnknownTable(name.to_string()));
        }

        let present: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let versioned = present.contains(VERSION_COLUMN);
        let stamped = STAMP_COLUMNS.iter().all(|(c, _)| present.contains(c));
        let is_system = |column: &str| {
            (versioned && column == VERSION_COLUMN)
                || (stamped && STAMP_COLUMNS.iter().any(|(c, _)| *c == column))
        };

        let mut schema = TableSchema::new(name);
        schema.versioned = versioned;
        schema.stamped = stamped;
        for column in columns.iter().filter(|c| !c.primary_key && !is_system(&c.name)) {
            let mut field = FieldDef::new(&column.name, kind_for(&column.declared_type));
            field.required = column.not_null && !column.has_default;
            field.max_length = max_length_for(&column.declared_type);
            schema.fields.push(field);
        }

        // the first unique index made only of importable fields
        schema.unique_key = unique_indexes(&conn, name)?
            .into_iter()
            .find(|index| index.iter().all(|c| schema.field_def(c).is_some()))
            .unwrap_or_default();

        debug!(
            table = name,
            fields = schema.fields.len(),
            unique_key = ?schema.unique_key,
            versioned,
            stamped,
            "Resolved table schema"
        );

        schema.validate()?;
        Ok(schema)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn db(ddl: &str) -> SqliteDatabase {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch(ddl).unwrap();
        db
    }

    #[test]
    fn test_kind_for_declared_types() {
        assert_eq!(kind_for("INTEGER"), FieldKind::Integer);
        assert_eq!(kind_for("bigint"), FieldKind::Integer);
        assert_eq!(kind_for("BOOLEAN"), FieldKind::Boolean);
        assert_eq!(kind_for("DATE"), FieldKind::Date);
        assert_eq!(kind_for("DATETIME"), FieldKind::DateTime);
        assert_eq!(kind_for("TIMESTAMP"), FieldKind::DateTime);
        assert_eq!(kind_for("VARCHAR(20)"), FieldKind::Text);
        assert_eq!(kind_for(""), FieldKind::Text);
    }

    #[test]
    fn test_max_length_for() {
        assert_eq!(max_length_for("VARCHAR(150)"), Some(150));
        assert_eq!(max_length_for("character( 8 )"), Some(8));
        assert_eq!(max_length_for("TEXT"), None);
        assert_eq!(max_length_for("DECIMAL(10,2)"), None);
    }

    #[test]
    fn test_introspects_versioned_stamped_table() {
        let db = db(r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                joined DATE,
                version INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME,
                creator TEXT,
                updated_at DATETIME,
                updater TEXT
            );
        "#);

        let schema = db.table("users").unwrap();
        assert!(schema.versioned);
        assert!(schema.stamped);
        assert_eq!(
            schema.field_names(),
            vec!["username", "email", "is_active", "joined"]
        );
        assert_eq!(schema.unique_key, vec!["username"]);

        let username = schema.field_def("username").unwrap();
        assert!(username.required);
        assert_eq!(username.max_length, Some(150));
        // NOT NULL with a default is not required from the file
        assert!(!schema.field_def("is_active").unwrap().required);
        assert_eq!(schema.field_def("joined").unwrap().kind, FieldKind::Date);
    }

    #[test]
    fn test_composite_unique_constraint() {
        let db = db(r#"
            CREATE TABLE prices (
                sku TEXT NOT NULL,
                region TEXT NOT NULL,
                amount INTEGER,
                UNIQUE (sku, region)
            );
        "#);

        let schema = db.table("prices").unwrap();
        assert!(!schema.versioned);
        assert_eq!(schema.unique_key, vec!["sku", "region"]);
        assert_eq!(
            db.field_kinds("prices").unwrap()[2],
            ("amount".to_string(), FieldKind::Integer)
        );
    }

    #[test]
    fn test_table_without_unique_key() {
        let db = db("CREATE TABLE notes (body TEXT);");
        assert!(db.unique_key_fields("notes").unwrap().is_empty());
    }

    #[test]
    fn test_partial_stamp_columns_stay_fields() {
        let db = db("CREATE TABLE t (name TEXT, created_at DATETIME);");
        let schema = db.table("t").unwrap();
        assert!(!schema.stamped);
        assert_eq!(schema.field_names(), vec!["name", "created_at"]);
    }

    #[test]
    fn test_unknown_and_unmapped_tables() {
        let db = db("CREATE TABLE only_id (id INTEGER PRIMARY KEY);");
        assert!(matches!(db.table("missing"), Err(CatalogError::UnknownTable(_))));
        assert!(matches!(db.table("only_id"), Err(CatalogError::Unmapped { .. })));
        assert!(matches!(db.table(IMPORT_LOG_TABLE), Err(CatalogError::Unmapped { .. })));
    }
}
