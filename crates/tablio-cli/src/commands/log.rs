//! `tablio log` command implementation
//!
//! Lists the import log of one batch, ordered by file and row number.

use crate::commands::open_database;
use crate::config::Config;
use crate::error::Result;
use crate::LogFormat;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use std::io::Write;
use tablio_engine::validator::render_errors;
use tablio_engine::{AuditLog, EntryLevel, ImportLogEntry};

/// Print the entries of `batch_id`, optionally only those at `level`
pub async fn run(
    config: &Config,
    batch_id: &str,
    level: Option<EntryLevel>,
    output: LogFormat,
) -> Result<()> {
    let db = open_database(config)?;
    let entries: Vec<ImportLogEntry> = db
        .entries(batch_id)?
        .into_iter()
        .filter(|entry| level.map_or(true, |level| entry.level == level))
        .collect();

    match output {
        LogFormat::Table => {
            if entries.is_empty() {
                println!("{} No log entries for batch {}", "→".cyan(), batch_id);
                return Ok(());
            }
            println!("{}", format_as_table(&entries));
            println!("{} entries", entries.len());
        }
        LogFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        LogFormat::Csv => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(&format_as_csv(&entries)?)?;
        }
    }
    Ok(())
}

fn level_cell(level: EntryLevel) -> Cell {
    let color = match level {
        EntryLevel::Info => Color::Green,
        EntryLevel::Warn => Color::Yellow,
        EntryLevel::Error => Color::Red,
    };
    Cell::new(level.as_str()).fg(color)
}

fn format_as_table(entries: &[ImportLogEntry]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Row", "Level", "Edit", "File", "Message", "Created"]);

    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.row_number),
            level_cell(entry.level),
            Cell::new(entry.edit_type.as_str()),
            Cell::new(&entry.file_name),
            Cell::new(&entry.message),
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    table
}

fn format_as_csv(entries: &[ImportLogEntry]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "batch_id",
        "file_name",
        "row_number",
        "level",
        "log_type",
        "edit_type",
        "message",
        "field_errors",
        "row_content",
        "creator",
        "created_at",
    ])?;
    for entry in entries {
        writer.write_record([
            entry.batch_id.clone(),
            entry.file_name.clone(),
            entry.row_number.to_string(),
            entry.level.to_string(),
            entry.log_type.as_str().to_string(),
            entry.edit_type.to_string(),
            entry.message.clone(),
            render_errors(&entry.field_errors),
            entry.row_content.to_json()?,
            entry.creator.clone(),
            entry.created_at.to_rfc3339(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| crate::error::CliError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tablio_engine::{EditType, LogType, RowContent};

    fn entry(row_number: u64, level: EntryLevel, message: &str) -> ImportLogEntry {
        ImportLogEntry {
            id: None,
            batch_id: "b1".to_string(),
            file_name: "people.csv".to_string(),
            row_number,
            row_content: [("name", "Ann, B.")].into_iter().collect::<RowContent>(),
            level,
            log_type: LogType::Upload,
            edit_type: EditType::Insert,
            message: message.to_string(),
            field_errors: Default::default(),
            creator: "tester".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_csv_listing_quotes_and_orders_columns() {
        let csv = format_as_csv(&[entry(2, EntryLevel::Info, "Newly imported row.")]).unwrap();
        let text = String::from_utf8(csv).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("batch_id,file_name,row_number,level"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("b1,people.csv,2,info,upload,insert,Newly imported row.,"));
        assert!(row.contains(r#""{""name"":""Ann, B.""}""#));
    }

    #[test]
    fn test_table_lists_every_entry() {
        let table = format_as_table(&[
            entry(2, EntryLevel::Info, "Newly imported row."),
            entry(3, EntryLevel::Error, "name: This field is required."),
        ]);
        let rendered = table.to_string();
        assert!(rendered.contains("Newly imported row."));
        assert!(rendered.contains("This field is required."));
    }
}
