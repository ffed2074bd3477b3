//! `tablio export` command implementation
//!
//! Writes every importable column of a table. CSV goes to stdout unless an
//! output file is given; spreadsheets always go to a file.

use crate::commands::open_database;
use crate::config::Config;
use crate::error::Result;
use crate::progress::create_spinner;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tablio_common::TextEncoding;
use tablio_engine::{
    export_table, AllowAll, ExportFormat, ExportPolicy, ImportPolicy, RunContext, SchemaCatalog,
};
use tracing::info;

/// Options of one `tablio export` invocation
#[derive(Debug, Clone)]
pub struct ExportArgs {
    pub table: String,
    pub format: ExportFormat,
    pub output: Option<PathBuf>,
    pub policy: Option<PathBuf>,
    pub encoding: Option<TextEncoding>,
    pub chunk_size: Option<usize>,
}

pub async fn run(config: &Config, args: ExportArgs) -> Result<()> {
    let policy = build_policy(&args)?;
    let db = Arc::new(open_database(config)?);
    let schema = db.table(&args.table)?;
    let ctx = RunContext::new(config.user());

    let destination = match (&args.output, args.format) {
        (Some(path), _) => Some(path.clone()),
        (None, ExportFormat::Csv) => None,
        (None, ExportFormat::Excel) => Some(PathBuf::from(args.format.file_name(&args.table))),
    };
    info!(
        table = %args.table,
        format = %args.format,
        content_type = %args.format.content_type(policy.format().encoding),
        "Starting export"
    );

    // keep the spinner off the terminal while CSV streams to stdout
    let spinner = destination
        .as_ref()
        .map(|path| create_spinner(&format!("Exporting {} to {}", args.table, path.display())));
    let format = args.format;
    let target = destination.clone();
    let summary = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut out: Box<dyn Write> = match &target {
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
            None => Box::new(BufWriter::new(std::io::stdout().lock())),
        };
        let summary =
            export_table(db.as_ref(), &AllowAll, &schema, format, &policy, &ctx, &mut out)?;
        out.flush()?;
        Ok(summary)
    })
    .await??;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    if let Some(path) = destination {
        eprintln!(
            "{} Exported {} rows to {}",
            "✓".green(),
            summary.rows_written,
            path.display()
        );
    }
    Ok(())
}

/// Text format from the policy file (or defaults) with flag overrides
fn build_policy(args: &ExportArgs) -> Result<ExportPolicy> {
    let base = match &args.policy {
        Some(path) => ImportPolicy::from_file(path)?,
        None => ImportPolicy::default(),
    };
    let mut builder = base.to_builder();
    if let Some(encoding) = args.encoding {
        builder = builder.encoding(encoding);
    }
    if let Some(rows) = args.chunk_size {
        builder = builder.chunk_size(rows);
    }
    Ok(builder.build()?.export_policy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_encoding_and_chunk_size() {
        let args = ExportArgs {
            table: "people".to_string(),
            format: ExportFormat::Csv,
            output: None,
            policy: None,
            encoding: Some(TextEncoding::ShiftJis),
            chunk_size: Some(25),
        };
        let policy = build_policy(&args).unwrap();
        assert_eq!(policy.chunk_size(), 25);
        assert_eq!(policy.format().encoding, TextEncoding::ShiftJis);
    }
}
