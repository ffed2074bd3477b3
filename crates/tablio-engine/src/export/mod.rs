//! Table export to CSV and spreadsheets
//!
//! Exporters read records through a [`RecordCursor`] one page at a time,
//! `chunk_size` records per page, so only one page is held in memory while
//! CSV output is written. A chunk size of zero reads everything in one page.

mod csv;
mod excel;

use std::io::Write;

use tablio_common::TextEncoding;
use tracing::{info, info_span, warn};

use crate::context::RunContext;
use crate::error::{ExportError, StoreResult};
use crate::permission::PermissionOracle;
use crate::policy::ExportPolicy;
use crate::schema::TableSchema;
use crate::storage::{Record, RecordStore};

pub use self::csv::CsvExporter;
pub use self::excel::ExcelExporter;

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
        }
    }

    /// `Content-Type` of the download
    pub fn content_type(&self, encoding: TextEncoding) -> String {
        match self {
            ExportFormat::Csv => format!("text/csv; charset={}", encoding.label()),
            ExportFormat::Excel => "application/vnd.ms-excel".to_string(),
        }
    }

    pub fn file_name(&self, table: &str) -> String {
        format!("{}.{}", table, self.extension())
    }

    /// `Content-Disposition` of the download, file name percent-encoded
    pub fn content_disposition(&self, table: &str) -> String {
        format!(
            "attachment; filename={}",
            urlencoding::encode(&self.file_name(table))
        )
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" | "excel" => Ok(ExportFormat::Excel),
            _ => Err(format!("Unknown export format: {} (expected csv or xlsx)", s)),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Paged access to the records being exported
pub trait RecordCursor {
    /// Records after skipping `offset`; `limit` of `None` reads to the end
    fn fetch(&mut self, offset: usize, limit: Option<usize>) -> StoreResult<Vec<Record>>;
}

impl<F> RecordCursor for F
where
    F: FnMut(usize, Option<usize>) -> StoreResult<Vec<Record>>,
{
    fn fetch(&mut self, offset: usize, limit: Option<usize>) -> StoreResult<Vec<Record>> {
        self(offset, limit)
    }
}

/// Cursor over every record of one table
pub struct TableCursor<'a> {
    store: &'a dyn RecordStore,
    schema: &'a TableSchema,
}

impl<'a> TableCursor<'a> {
    pub fn new(store: &'a dyn RecordStore, schema: &'a TableSchema) -> Self {
        Self { store, schema }
    }
}

impl RecordCursor for TableCursor<'_> {
    fn fetch(&mut self, offset: usize, limit: Option<usize>) -> StoreResult<Vec<Record>> {
        self.store.fetch_page(self.schema, offset, limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub rows_written: u64,
    pub pages: usize,
}

/// Writes records in one output format
pub trait Exporter {
    fn format(&self) -> ExportFormat;

    /// Write `fields` of every record to `out`, preceded by `headers` unless
    /// `headers` is empty
    fn export(
        &self,
        cursor: &mut dyn RecordCursor,
        fields: &[String],
        headers: &[String],
        policy: &ExportPolicy,
        out: &mut dyn Write,
    ) -> Result<ExportSummary, ExportError>;
}

pub fn exporter_for(format: ExportFormat, sheet_name: &str) -> Box<dyn Exporter> {
    match format {
        ExportFormat::Csv => Box::new(CsvExporter),
        ExportFormat::Excel => Box::new(ExcelExporter::new(sheet_name)),
    }
}

fn check_headers(fields: &[String], headers: &[String]) -> Result<(), ExportError> {
    if !headers.is_empty() && headers.len() != fields.len() {
        return Err(ExportError::HeaderMismatch {
            fields: fields.len(),
            headers: headers.len(),
        });
    }
    Ok(())
}

/// Feed the cursor's pages to `write`. Returns the number of pages read.
fn for_each_page<F>(
    cursor: &mut dyn RecordCursor,
    chunk_size: usize,
    mut write: F,
) -> Result<usize, ExportError>
where
    F: FnMut(Vec<Record>) -> Result<(), ExportError>,
{
    let limit = (chunk_size > 0).then_some(chunk_size);
    let mut offset = 0;
    let mut pages = 0;
    loop {
        let page = cursor.fetch(offset, limit)?;
        if page.is_empty() {
            break;
        }
        let len = page.len();
        pages += 1;
        write(page)?;
        match limit {
            Some(limit) if len >= limit => offset += len,
            _ => break,
        }
    }
    Ok(pages)
}

/// Export every importable field of `schema`'s table, with the field names
/// as the header row
pub fn export_table(
    store: &dyn RecordStore,
    permissions: &dyn PermissionOracle,
    schema: &TableSchema,
    format: ExportFormat,
    policy: &ExportPolicy,
    ctx: &RunContext,
    out: &mut dyn Write,
) -> Result<ExportSummary, ExportError> {
    let span = info_span!(
        "export",
        batch_id = %ctx.batch_id,
        principal = %ctx.principal,
        table = %schema.name,
        format = %format,
    );
    let _enter = span.enter();

    if !permissions.can_export(&ctx.principal, schema) {
        warn!("Export permission denied");
        return Err(ExportError::PermissionDenied {
            principal: ctx.principal.clone(),
            table: schema.name.clone(),
        });
    }

    info!(chunk_size = policy.chunk_size(), "Export started");
    let fields = schema.field_names();
    let mut cursor = TableCursor::new(store, schema);
    let summary = exporter_for(format, &schema.name).export(&mut cursor, &fields, &fields, policy, out)?;
    info!(rows = summary.rows_written, pages = summary.pages, "Export finished");
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_headers() {
        assert_eq!(
            ExportFormat::Csv.content_type(TextEncoding::ShiftJis),
            "text/csv; charset=shift_jis"
        );
        assert_eq!(
            ExportFormat::Excel.content_type(TextEncoding::Utf8),
            "application/vnd.ms-excel"
        );
        assert_eq!(ExportFormat::Excel.file_name("users"), "users.xlsx");
        assert_eq!(
            ExportFormat::Csv.content_disposition("顧客 list"),
            "attachment; filename=%E9%A1%A7%E5%AE%A2%20list.csv"
        );
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("XLSX".parse::<ExportFormat>().unwrap(), ExportFormat::Excel);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_paging_windows() {
        let data: Vec<Record> = (0..5).map(|_| Record::new()).collect();
        let mut calls = Vec::new();
        let mut cursor = |offset: usize, limit: Option<usize>| -> StoreResult<Vec<Record>> {
            calls.push((offset, limit));
            let rest = data.iter().skip(offset);
            Ok(match limit {
                Some(l) => rest.take(l).cloned().collect(),
                None => rest.cloned().collect(),
            })
        };

        let mut sizes = Vec::new();
        let pages = for_each_page(&mut cursor, 2, |page| {
            sizes.push(page.len());
            Ok(())
        })
        .unwrap();
        assert_eq!(pages, 3);
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(calls, vec![(0, Some(2)), (2, Some(2)), (4, Some(2))]);
    }

    #[test]
    fn test_zero_chunk_size_reads_once() {
        let mut calls = 0;
        let mut cursor = |_: usize, limit: Option<usize>| -> StoreResult<Vec<Record>> {
            calls += 1;
            assert_eq!(limit, None);
            Ok(vec![Record::new(); 3])
        };
        let pages = for_each_page(&mut cursor, 0, |_| Ok(())).unwrap();
        assert_eq!(pages, 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_header_count_must_match_fields() {
        let fields = vec!["a".to_string(), "b".to_string()];
        assert!(check_headers(&fields, &[]).is_ok());
        assert!(check_headers(&fields, &["A".to_string()]).is_err());
    }
}
