//! Spreadsheet (xlsx) exporter

use std::io::Write;

use rust_xlsxwriter::{Workbook, Worksheet};
use tablio_common::FieldValue;
use tracing::debug;

use super::{check_headers, for_each_page, ExportFormat, ExportSummary, Exporter, RecordCursor};
use crate::error::ExportError;
use crate::policy::{ExportPolicy, TextFormat};

const MAX_ROWS: u32 = 1_048_576;
const MAX_COLUMNS: u16 = 16_384;
const MAX_SHEET_NAME: usize = 31;
/// Largest integer an xlsx number cell holds exactly
const MAX_EXACT_NUMBER: u64 = 1 << 53;

/// Writes one worksheet. Integers and booleans become typed cells, dates are
/// written as text in the policy's formats, nulls are left empty.
///
/// The worksheet runs in constant-memory mode: each row is flushed to a
/// temporary file once the next row starts, so only the finished archive is
/// held in memory.
#[derive(Debug, Clone)]
pub struct ExcelExporter {
    sheet_name: String,
}

impl ExcelExporter {
    pub fn new(sheet_name: &str) -> Self {
        Self {
            sheet_name: sheet_name_for(sheet_name),
        }
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }
}

impl Default for ExcelExporter {
    fn default() -> Self {
        Self::new("Sheet1")
    }
}

impl Exporter for ExcelExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Excel
    }

    fn export(
        &self,
        cursor: &mut dyn RecordCursor,
        fields: &[String],
        headers: &[String],
        policy: &ExportPolicy,
        out: &mut dyn Write,
    ) -> Result<ExportSummary, ExportError> {
        check_headers(fields, headers)?;
        if fields.len() > usize::from(MAX_COLUMNS) {
            return Err(ExportError::SheetLimit(format!("{} columns", fields.len())));
        }

        let format = policy.format();
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet_with_constant_memory();
        sheet.set_name(&self.sheet_name)?;

        let mut row: u32 = 0;
        if !headers.is_empty() {
            for (col, header) in (0u16..).zip(headers) {
                sheet.write_string(row, col, header)?;
            }
            row += 1;
        }

        let mut rows_written = 0u64;
        let pages = for_each_page(cursor, policy.chunk_size(), |page| {
            for record in &page {
                if row >= MAX_ROWS {
                    return Err(ExportError::SheetLimit(format!("more than {} rows", MAX_ROWS)));
                }
                for (col, field) in (0u16..).zip(fields) {
                    if let Some(value) = record.get(field) {
                        write_cell(sheet, row, col, value, format)?;
                    }
                }
                row += 1;
                rows_written += 1;
            }
            debug!(rows = page.len(), "Wrote worksheet chunk");
            Ok(())
        })?;

        let bytes = workbook.save_to_buffer()?;
        out.write_all(&bytes)?;
        out.flush()?;

        Ok(ExportSummary {
            rows_written,
            pages,
        })
    }
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &FieldValue,
    format: &TextFormat,
) -> Result<(), ExportError> {
    match value {
        FieldValue::Null => {}
        FieldValue::Boolean(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        FieldValue::Integer(i) if i.unsigned_abs() <= MAX_EXACT_NUMBER => {
            sheet.write_number(row, col, *i as f64)?;
        }
        other => {
            let text = other.render(&format.date_format, &format.datetime_format);
            sheet.write_string(row, col, text)?;
        }
    }
    Ok(())
}

/// A valid worksheet name: at most 31 characters, none of `[]:*?/\`
fn sheet_name_for(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME)
        .collect();
    let cleaned = cleaned.trim_matches('\'').to_string();
    if cleaned.is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::StoreResult;
    use crate::storage::Record;

    #[test]
    fn test_sheet_names_are_sanitized() {
        assert_eq!(sheet_name_for("users"), "users");
        assert_eq!(sheet_name_for("a/b:c"), "a_b_c");
        assert_eq!(sheet_name_for("''"), "Sheet1");
        assert_eq!(sheet_name_for(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn test_writes_xlsx_archive() {
        let data: Vec<Record> = (0..3)
            .map(|i| {
                [
                    ("name".to_string(), FieldValue::from(format!("user{}", i).as_str())),
                    ("age".to_string(), FieldValue::Integer(20 + i)),
                    ("active".to_string(), FieldValue::Boolean(i % 2 == 0)),
                ]
                .into_iter()
                .collect()
            })
            .collect();
        let mut cursor = |offset: usize, limit: Option<usize>| -> StoreResult<Vec<Record>> {
            let rest = data.iter().skip(offset).cloned();
            Ok(match limit {
                Some(l) => rest.take(l).collect(),
                None => rest.collect(),
            })
        };
        let fields = vec!["name".to_string(), "age".to_string(), "active".to_string()];
        let policy = ExportPolicy::new(2, TextFormat::default()).unwrap();

        let mut out = Vec::new();
        let summary = ExcelExporter::new("users")
            .export(&mut cursor, &fields, &fields, &policy, &mut out)
            .unwrap();

        assert_eq!(summary, ExportSummary { rows_written: 3, pages: 2 });
        // xlsx files are zip archives
        assert!(out.starts_with(b"PK"));
    }

    #[test]
    fn test_streams_rows_across_many_pages() {
        let mut served = 0usize;
        let mut cursor = |offset: usize, limit: Option<usize>| -> StoreResult<Vec<Record>> {
            let end = offset.saturating_add(limit.unwrap_or(usize::MAX)).min(2_500);
            let page: Vec<Record> = (offset..end)
                .map(|i| {
                    [("id".to_string(), FieldValue::Integer(i as i64))]
                        .into_iter()
                        .collect()
                })
                .collect();
            served += page.len();
            Ok(page)
        };
        let fields = vec!["id".to_string()];
        let policy = ExportPolicy::new(1_000, TextFormat::default()).unwrap();

        let mut out = Vec::new();
        let summary = ExcelExporter::default()
            .export(&mut cursor, &fields, &[], &policy, &mut out)
            .unwrap();

        assert_eq!(summary, ExportSummary { rows_written: 2_500, pages: 3 });
        assert_eq!(served, 2_500);
        assert!(out.starts_with(b"PK"));
    }
}
