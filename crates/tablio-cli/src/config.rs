//! Configuration management for Tablio CLI
//!
//! Settings come from, in increasing precedence: built-in defaults, the
//! environment (optionally loaded from a `.env` file), and command-line flags.

use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// CLI Configuration Constants
// ============================================================================

/// Database file used when none is configured.
pub const DEFAULT_DATABASE: &str = "tablio.db";

/// Principal recorded when no user can be determined.
pub const DEFAULT_USER: &str = "tablio";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database holding the target tables and the import log
    pub database: PathBuf,

    /// Principal recorded in the import log
    pub user: String,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            user: DEFAULT_USER.to_string(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load config from environment variables
    ///
    /// - `TABLIO_DATABASE`: database file
    /// - `TABLIO_USER`, then `USER` / `USERNAME`: principal
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(database) = std::env::var("TABLIO_DATABASE") {
            config.database = PathBuf::from(database);
        }

        if let Some(user) = ["TABLIO_USER", "USER", "USERNAME"]
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
        {
            config.user = user;
        }

        Ok(config)
    }

    /// Apply command-line flags on top of the loaded settings
    pub fn with_overrides(
        mut self,
        database: Option<PathBuf>,
        user: Option<String>,
        verbose: bool,
    ) -> Result<Self> {
        if let Some(database) = database {
            self.database = database;
        }
        if let Some(user) = user {
            if user.trim().is_empty() {
                return Err(CliError::config("--user must not be empty"));
            }
            self.user = user;
        }
        self.verbose = verbose;
        Ok(self)
    }

    /// Get the database path
    pub fn database(&self) -> &Path {
        &self.database
    }

    /// Get the principal
    pub fn user(&self) -> &str {
        &self.user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database(), Path::new("tablio.db"));
        assert_eq!(config.user(), "tablio");
        assert!(!config.verbose);
    }

    #[test]
    fn test_flags_override_environment() {
        let config = Config::default()
            .with_overrides(Some(PathBuf::from("/tmp/other.db")), Some("ops".to_string()), true)
            .unwrap();
        assert_eq!(config.database(), Path::new("/tmp/other.db"));
        assert_eq!(config.user(), "ops");
        assert!(config.verbose);
    }

    #[test]
    fn test_blank_user_is_rejected() {
        let result = Config::default().with_overrides(None, Some("  ".to_string()), false);
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
