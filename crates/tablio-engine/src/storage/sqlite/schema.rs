//! SQLite schema for the import log

use rusqlite::Connection;

use crate::error::StoreResult;

pub const IMPORT_LOG_TABLE: &str = "import_log";

/// Create the import log table and its indexes if missing
pub fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS import_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,

            -- Where the row came from
            batch_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            row_number INTEGER NOT NULL,
            row_content TEXT NOT NULL,  -- JSON object, file column order

            -- Outcome
            log_level TEXT NOT NULL,
            log_type TEXT NOT NULL DEFAULT 'upload',
            edit_type TEXT NOT NULL DEFAULT 'insert',
            message TEXT NOT NULL,
            field_errors TEXT NOT NULL DEFAULT '{}',  -- JSON

            creator TEXT NOT NULL,
            created_at TEXT NOT NULL,

            UNIQUE (batch_id, file_name, row_number)
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_log_level ON import_log(batch_id, log_level)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_log_created_at ON import_log(created_at)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [IMPORT_LOG_TABLE],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
