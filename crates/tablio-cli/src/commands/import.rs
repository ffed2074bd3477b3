//! `tablio import` command implementation
//!
//! Runs one import and reports the outcome. Rows that were skipped or
//! rejected are listed after the summary, rejected rows first.

use crate::commands::open_database;
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::progress::create_spinner;
use crate::SummaryFormat;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde_json::json;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tablio_common::TextEncoding;
use tablio_engine::{
    BatchReport, ChunkProcessor, ImportOutcome, ImportPolicy, ImportSummary, RunContext,
    SchemaCatalog,
};
use tracing::info;

/// Options of one `tablio import` invocation
#[derive(Debug, Clone)]
pub struct ImportArgs {
    pub table: String,
    pub file: PathBuf,
    pub policy: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub header_rows: Option<usize>,
    pub tolerance: Option<u8>,
    pub skip_existing: bool,
    pub encoding: Option<TextEncoding>,
    pub delimiter: Option<char>,
    pub batch_id: Option<String>,
    pub output: SummaryFormat,
}

/// Import a file and print the summary. The caller decides the exit code
/// from [`ImportSummary::is_aborted`].
pub async fn run(config: &Config, args: ImportArgs) -> Result<ImportSummary> {
    if !args.file.exists() {
        return Err(CliError::file_not_found(args.file.display().to_string()));
    }
    let policy = build_policy(&args)?;
    let db = Arc::new(open_database(config)?);
    let schema = db.table(&args.table)?;

    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.file.display().to_string());
    let ctx = match &args.batch_id {
        Some(batch_id) => RunContext::with_batch_id(config.user(), batch_id),
        None => RunContext::new(config.user()),
    };
    info!(batch_id = %ctx.batch_id, table = %args.table, file = %file_name, "Starting import");

    let spinner = create_spinner(&format!("Importing {} into {}", file_name, args.table));
    let path = args.file.clone();
    let (summary, report) = tokio::task::spawn_blocking(move || -> Result<_> {
        let input = BufReader::new(File::open(&path)?);
        let processor = ChunkProcessor::new(db.clone(), db.clone());
        let summary = processor.run(input, &file_name, &schema, &policy, &ctx)?;
        let report = BatchReport::load(db.as_ref(), &summary.batch_id)?;
        Ok((summary, report))
    })
    .await??;
    spinner.finish_and_clear();

    match args.output {
        SummaryFormat::Text => print_text(&summary, &report),
        SummaryFormat::Json => print_json(&summary, &report)?,
    }
    Ok(summary)
}

/// Policy file (or defaults) with command-line overrides applied
fn build_policy(args: &ImportArgs) -> Result<ImportPolicy> {
    let base = match &args.policy {
        Some(path) => ImportPolicy::from_file(path)?,
        None => ImportPolicy::default(),
    };

    let mut builder = base.to_builder();
    if let Some(rows) = args.chunk_size {
        builder = builder.chunk_size(rows);
    }
    if let Some(rows) = args.header_rows {
        builder = builder.header_row_count(rows);
    }
    if let Some(rate) = args.tolerance {
        builder = builder.error_tolerance_rate(rate);
    }
    if args.skip_existing {
        builder = builder.overwrite_existing(false);
    }
    if let Some(encoding) = args.encoding {
        builder = builder.encoding(encoding);
    }
    if let Some(delimiter) = args.delimiter {
        builder = builder.delimiter(delimiter);
    }
    Ok(builder.build()?)
}

fn print_text(summary: &ImportSummary, report: &BatchReport) {
    println!("{} {}", "Batch:".cyan().bold(), summary.batch_id);
    println!("  Rows read:   {}", summary.rows_read);
    println!("  Header rows: {}", summary.header_rows);
    println!("  Blank rows:  {}", summary.blank_rows);
    println!("  Imported:    {}", summary.rows_imported.to_string().green());
    println!("  Skipped:     {}", summary.rows_skipped.to_string().yellow());
    println!("  Discarded:   {}", summary.rows_discarded.to_string().red());
    println!("  Chunks:      {}", summary.chunks);

    match summary.outcome {
        ImportOutcome::Completed => println!("{} Import completed", "✓".green()),
        ImportOutcome::Aborted {
            error_count,
            error_limit,
        } => println!(
            "{} Import aborted: {} rejected rows exceed the limit of {}",
            "✗".red(),
            error_count,
            error_limit
        ),
    }

    if report.is_clean() {
        return;
    }
    println!();
    println!("{}", "Rows needing attention:".cyan().bold());
    println!("{}", problems_table(report));
}

fn problems_table(report: &BatchReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Row", "Level", "File", "Message"]);

    for entry in report.problems() {
        table.add_row(vec![
            entry.row_number.to_string(),
            entry.level.to_string(),
            entry.file_name.clone(),
            entry.message.clone(),
        ]);
    }
    table
}

fn print_json(summary: &ImportSummary, report: &BatchReport) -> Result<()> {
    let problems: Vec<_> = report.problems().collect();
    let value = json!({
        "summary": summary,
        "problems": problems,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ImportArgs {
        ImportArgs {
            table: "people".to_string(),
            file: PathBuf::from("people.csv"),
            policy: None,
            chunk_size: None,
            header_rows: None,
            tolerance: None,
            skip_existing: false,
            encoding: None,
            delimiter: None,
            batch_id: None,
            output: SummaryFormat::Text,
        }
    }

    #[test]
    fn test_policy_defaults_without_flags() {
        assert_eq!(build_policy(&args()).unwrap(), ImportPolicy::default());
    }

    #[test]
    fn test_flags_override_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "chunk_size = 50\noverwrite_existing = true\n").unwrap();

        let mut args = args();
        args.policy = Some(path);
        args.tolerance = Some(0);
        args.skip_existing = true;
        args.encoding = Some(TextEncoding::Cp932);

        let policy = build_policy(&args).unwrap();
        assert_eq!(policy.chunk_size(), 50);
        assert_eq!(policy.error_tolerance_rate(), 0);
        assert!(!policy.overwrite_existing());
        assert_eq!(policy.format().encoding, TextEncoding::Cp932);
    }

    #[test]
    fn test_invalid_delimiter_is_a_policy_error() {
        let mut args = args();
        args.delimiter = Some('\n');
        assert!(matches!(build_policy(&args), Err(CliError::Policy(_))));
    }
}
