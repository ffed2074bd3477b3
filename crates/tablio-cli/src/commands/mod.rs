//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod export;
pub mod import;
pub mod log;
pub mod schema;

use crate::config::Config;
use crate::error::{CliError, Result};
use tablio_engine::SqliteDatabase;

/// Open the configured database, which must already exist
pub(crate) fn open_database(config: &Config) -> Result<SqliteDatabase> {
    let path = config.database();
    if !path.exists() {
        return Err(CliError::file_not_found(path.display().to_string()));
    }
    Ok(SqliteDatabase::open(path)?)
}
