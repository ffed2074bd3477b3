//! Tablio CLI Library
//!
//! Command-line interface for importing CSV files into SQLite tables and
//! exporting them back out.
//!
//! # Overview
//!
//! - **Import**: Load a CSV file into a table in chunks (`tablio import`)
//! - **Export**: Write a table as CSV or xlsx (`tablio export`)
//! - **Import Log**: Review the per-row outcome of a run (`tablio log`)
//! - **Schema**: Show how a table is mapped for import (`tablio schema`)

pub mod commands;
pub mod config;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use config::Config;
pub use error::{CliError, Result};

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tablio_common::TextEncoding;
use tablio_engine::{EntryLevel, ExportFormat};

/// Tablio - chunked CSV import and export for SQLite tables
#[derive(Parser, Debug)]
#[command(name = "tablio")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// SQLite database file
    #[arg(long, env = "TABLIO_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// User recorded in the import log
    #[arg(long, env = "TABLIO_USER", global = true)]
    pub user: Option<String>,

    /// Print the command reference as Markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a CSV file into a table
    Import {
        /// Target table
        table: String,

        /// CSV file to read
        file: PathBuf,

        /// TOML import policy; flags below override it
        #[arg(short, long)]
        policy: Option<PathBuf>,

        /// Rows per transaction (0 commits the whole file at once)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Leading rows to skip
        #[arg(long)]
        header_rows: Option<usize>,

        /// Percentage of a chunk that may be rejected before the run aborts
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        tolerance: Option<u8>,

        /// Keep existing rows instead of overwriting them
        #[arg(long)]
        skip_existing: bool,

        /// Input encoding (utf-8, shift_jis, cp932)
        #[arg(short, long)]
        encoding: Option<TextEncoding>,

        /// Field delimiter
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Batch id to log under (generated when omitted)
        #[arg(long)]
        batch_id: Option<String>,

        /// Summary format
        #[arg(short, long, value_enum, default_value_t = SummaryFormat::Text)]
        output: SummaryFormat,
    },

    /// Export a table as CSV or xlsx
    Export {
        /// Table to export
        table: String,

        /// Output format (csv, xlsx)
        #[arg(short, long, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// Output file (defaults to stdout for CSV, <table>.xlsx for xlsx)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// TOML policy supplying encoding, dialect and date formats
        #[arg(short, long)]
        policy: Option<PathBuf>,

        /// Output encoding (utf-8, shift_jis, cp932)
        #[arg(short, long)]
        encoding: Option<TextEncoding>,

        /// Rows fetched per page
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Show the import log of a batch
    Log {
        /// Batch id printed by `tablio import`
        batch_id: String,

        /// Only show entries at this level (info, warn, error)
        #[arg(short, long)]
        level: Option<EntryLevel>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = LogFormat::Table)]
        output: LogFormat,
    },

    /// Show how a table is mapped for import
    Schema {
        /// Table to inspect
        table: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Output formats for the import summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryFormat {
    Text,
    Json,
}

/// Output formats for import log listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Table,
    Json,
    Csv,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import_flags() {
        let cli = Cli::parse_from([
            "tablio",
            "--database",
            "app.db",
            "import",
            "people",
            "people.csv",
            "--chunk-size",
            "10",
            "--tolerance",
            "5",
            "--skip-existing",
            "--encoding",
            "sjis",
        ]);
        assert_eq!(cli.database, Some(PathBuf::from("app.db")));
        match cli.command {
            Some(Commands::Import {
                table,
                chunk_size,
                tolerance,
                skip_existing,
                encoding,
                ..
            }) => {
                assert_eq!(table, "people");
                assert_eq!(chunk_size, Some(10));
                assert_eq!(tolerance, Some(5));
                assert!(skip_existing);
                assert_eq!(encoding, Some(TextEncoding::ShiftJis));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_tolerance_above_hundred_is_rejected() {
        let result = Cli::try_parse_from(["tablio", "import", "t", "f.csv", "--tolerance", "101"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_export_format() {
        let cli = Cli::parse_from(["tablio", "export", "people", "--format", "xlsx"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Export {
                format: ExportFormat::Excel,
                ..
            })
        ));
    }
}
