//! CSV exporter

use std::io::{self, Write};

use ::csv::{Terminator, WriterBuilder};
use tablio_common::TextEncoding;
use tracing::debug;

use super::{check_headers, for_each_page, ExportFormat, ExportSummary, Exporter, RecordCursor};
use crate::error::ExportError;
use crate::policy::{ExportPolicy, TextFormat};
use crate::storage::Record;

/// Writes delimited text in the policy's dialect and encoding, one encoded
/// chunk per page, with CRLF line endings
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter;

impl Exporter for CsvExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
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
        let format = policy.format();
        let mut builder = WriterBuilder::new();
        builder
            .delimiter(format.dialect.delimiter_byte())
            .quote(format.dialect.quote_byte())
            .terminator(Terminator::CRLF);

        if !headers.is_empty() {
            write_chunk(&builder, std::iter::once(headers.to_vec()), format.encoding, out)?;
        }

        let mut rows_written = 0u64;
        let pages = for_each_page(cursor, policy.chunk_size(), |page| {
            rows_written += page.len() as u64;
            let rows = page.iter().map(|record| render_row(record, fields, format));
            write_chunk(&builder, rows, format.encoding, out)?;
            debug!(rows = page.len(), "Wrote CSV chunk");
            Ok(())
        })?;
        out.flush()?;

        Ok(ExportSummary {
            rows_written,
            pages,
        })
    }
}

fn render_row(record: &Record, fields: &[String], format: &TextFormat) -> Vec<String> {
    fields
        .iter()
        .map(|field| {
            record
                .get(field)
                .map(|value| value.render(&format.date_format, &format.datetime_format))
                .unwrap_or_default()
        })
        .collect()
}

fn write_chunk<I>(
    builder: &WriterBuilder,
    rows: I,
    encoding: TextEncoding,
    out: &mut dyn Write,
) -> Result<(), ExportError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = builder.from_writer(Vec::new());
    for row in rows {
        writer.write_record(&row)?;
    }
    let bytes = writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))?;
    let text =
        std::str::from_utf8(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    out.write_all(&encoding.encode(text)?)?;
    Ok(())
}
