//! The chunked import loop
//!
//! Rows are pulled from the input one at a time, validated, and buffered.
//! When the buffer holds `chunk_size` rows it is committed:
//!
//! 1. every accepted row is written through the [`VersionGuard`] in one
//!    transaction; a row whose write hits a constraint or a version race is
//!    demoted to an error entry
//! 2. every entry of the chunk is appended to the audit log in a second
//!    transaction
//! 3. rows of the chunk that were not written are added to the run's error
//!    count
//!
//! After each full chunk the error count is compared with the policy's error
//! limit; exceeding it aborts the run. Committed chunks stay committed. The
//! final partial chunk is committed without a limit check.

use std::io::Read;
use std::sync::Arc;

use serde::Serialize;
use tablio_common::TextEncoding;
use tracing::{debug, info, info_span, warn};

use crate::audit::{AuditLog, EntryLevel, ImportLogEntry, RowContent};
use crate::context::RunContext;
use crate::error::{GuardError, ImportError};
use crate::guard::VersionGuard;
use crate::permission::{AllowAll, PermissionOracle};
use crate::policy::ImportPolicy;
use crate::schema::TableSchema;
use crate::storage::RecordStore;
use crate::validator::{RowValidator, ValidatedRow};

/// Caller extension points around an import run
pub trait ImportHooks: Send + Sync {
    /// Runs after the permission check, before the first row is read
    fn before_import(&self, _schema: &TableSchema, _ctx: &RunContext) -> Result<(), ImportError> {
        Ok(())
    }

    /// Reshape a raw row before validation
    fn map_row(&self, row: RowContent) -> RowContent {
        row
    }

    /// Runs once the run has finished, aborted or not
    fn after_import(&self, _schema: &TableSchema, _ctx: &RunContext, _summary: &ImportSummary) {}
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ImportHooks for NoHooks {}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImportOutcome {
    Completed,
    Aborted {
        error_count: usize,
        error_limit: usize,
    },
}

/// Counters of one import run.
///
/// `rows_imported + rows_skipped + rows_discarded + header_rows + blank_rows`
/// always equals `rows_read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub batch_id: String,
    pub rows_read: u64,
    pub header_rows: u64,
    pub blank_rows: u64,
    pub rows_imported: u64,
    pub rows_skipped: u64,
    pub rows_discarded: u64,
    pub chunks: usize,
    pub outcome: ImportOutcome,
}

impl ImportSummary {
    fn new(batch_id: &str) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            rows_read: 0,
            header_rows: 0,
            blank_rows: 0,
            rows_imported: 0,
            rows_skipped: 0,
            rows_discarded: 0,
            chunks: 0,
            outcome: ImportOutcome::Completed,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, ImportOutcome::Aborted { .. })
    }

    /// Turn an aborted run into an error
    pub fn ensure_completed(self) -> Result<Self, ImportError> {
        match self.outcome {
            ImportOutcome::Completed => Ok(self),
            ImportOutcome::Aborted {
                error_count,
                error_limit,
            } => Err(ImportError::ToleranceExceeded {
                batch_id: self.batch_id,
                error_count,
                error_limit,
            }),
        }
    }

    fn tally(&mut self, entries: &[ImportLogEntry]) {
        for entry in entries {
            match entry.level {
                EntryLevel::Info => self.rows_imported += 1,
                EntryLevel::Warn => self.rows_skipped += 1,
                EntryLevel::Error => self.rows_discarded += 1,
            }
        }
    }
}

/// Runs imports against a record store and audit log
pub struct ChunkProcessor {
    store: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLog>,
    permissions: Arc<dyn PermissionOracle>,
    hooks: Arc<dyn ImportHooks>,
}

impl ChunkProcessor {
    pub fn new(store: Arc<dyn RecordStore>, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            store,
            audit,
            permissions: Arc::new(AllowAll),
            hooks: Arc::new(NoHooks),
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionOracle>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ImportHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Import one CSV stream into `schema`'s table.
    ///
    /// Row-level failures end up in the audit log and the summary. Errors are
    /// returned only for conditions that stop the run: permission denial,
    /// unreadable input, or an unusable store. Crossing the error limit is
    /// not an error here; see [`ImportSummary::ensure_completed`].
    pub fn run<R: Read>(
        &self,
        input: R,
        file_name: &str,
        schema: &TableSchema,
        policy: &ImportPolicy,
        ctx: &RunContext,
    ) -> Result<ImportSummary, ImportError> {
        let span = info_span!(
            "import",
            batch_id = %ctx.batch_id,
            principal = %ctx.principal,
            table = %schema.name,
            file = file_name,
        );
        let _enter = span.enter();

        if !self.permissions.can_import(&ctx.principal, schema) {
            warn!("Import permission denied");
            return Err(ImportError::PermissionDenied {
                principal: ctx.principal.clone(),
                table: schema.name.clone(),
            });
        }
        self.hooks.before_import(schema, ctx)?;

        let columns: Vec<String> = match policy.columns() {
            Some(columns) => columns.to_vec(),
            None => schema.field_names(),
        };
        let format = policy.format();
        let chunk_size = policy.chunk_size();
        let error_limit = policy.error_limit();
        info!(
            chunk_size,
            error_limit,
            overwrite = policy.overwrite_existing(),
            encoding = %format.encoding,
            "Import started"
        );

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(format.dialect.delimiter_byte())
            .quote(format.dialect.quote_byte())
            .from_reader(input);

        let validator = RowValidator::new(schema, policy);
        let mut summary = ImportSummary::new(&ctx.batch_id);
        let mut chunk: Vec<ValidatedRow> = Vec::new();
        let mut error_count = 0usize;
        let mut record = csv::ByteRecord::new();

        loop {
            let row_number = summary.rows_read + 1;
            let more = reader
                .read_byte_record(&mut record)
                .map_err(|e| ImportError::stream(row_number, e.to_string()))?;
            if !more {
                break;
            }
            summary.rows_read = row_number;

            if row_number <= policy.header_row_count() as u64 {
                summary.header_rows += 1;
                continue;
            }
            if record.iter().all(|cell| cell.is_empty()) {
                summary.blank_rows += 1;
                continue;
            }

            let raw = decode_row(&record, &columns, format.encoding, row_number)?;
            let raw = self.hooks.map_row(raw);
            chunk.push(validator.validate(self.store.as_ref(), raw, file_name, row_number, ctx)?);

            if chunk_size > 0 && chunk.len() >= chunk_size {
                error_count += self.commit_chunk(&mut chunk, schema, ctx, &mut summary)?;
                if error_count > error_limit {
                    warn!(error_count, error_limit, "Too many rejected rows, aborting import");
                    summary.outcome = ImportOutcome::Aborted {
                        error_count,
                        error_limit,
                    };
                    break;
                }
            }
        }

        if !chunk.is_empty() {
            self.commit_chunk(&mut chunk, schema, ctx, &mut summary)?;
        }

        info!(
            rows_read = summary.rows_read,
            imported = summary.rows_imported,
            skipped = summary.rows_skipped,
            discarded = summary.rows_discarded,
            aborted = summary.is_aborted(),
            "Import finished"
        );
        self.hooks.after_import(schema, ctx, &summary);
        Ok(summary)
    }

    /// Persist one chunk and log it. Returns the number of rows not written.
    fn commit_chunk(
        &self,
        chunk: &mut Vec<ValidatedRow>,
        schema: &TableSchema,
        ctx: &RunContext,
        summary: &mut ImportSummary,
    ) -> Result<usize, ImportError> {
        let guard = VersionGuard::new(schema);
        let mut persisted = 0usize;

        let mut tx = self.store.begin()?;
        for row in chunk.iter_mut() {
            let Some(record) = row.record.take() else {
                continue;
            };
            match guard.save(tx.as_mut(), &record, row.entry.edit_type, ctx) {
                Ok(saved) => {
                    row.entry.edit_type = saved.edit_type;
                    persisted += 1;
                }
                Err(GuardError::Store(e)) if !e.is_row_level() => return Err(e.into()),
                Err(e) => {
                    debug!(row = row.entry.row_number, error = %e, "Write rejected");
                    row.entry.demote(e.to_string());
                }
            }
        }
        tx.commit()?;

        let entries: Vec<ImportLogEntry> = chunk.drain(..).map(|row| row.entry).collect();
        self.audit.append(&entries)?;

        summary.chunks += 1;
        summary.tally(&entries);
        let rejected = entries.len() - persisted;
        info!(
            chunk = summary.chunks,
            rows = entries.len(),
            persisted,
            rejected,
            "Chunk committed"
        );
        Ok(rejected)
    }
}

/// Decode every cell strictly and pair the leading cells with `columns`
fn decode_row(
    record: &csv::ByteRecord,
    columns: &[String],
    encoding: TextEncoding,
    row_number: u64,
) -> Result<RowContent, ImportError> {
    let mut row = RowContent::new();
    for (idx, bytes) in record.iter().enumerate() {
        let bytes = if row_number == 1 && idx == 0 {
            encoding.strip_bom(bytes)
        } else {
            bytes
        };
        let text = encoding
            .decode(bytes)
            .map_err(|e| ImportError::stream(row_number, e.to_string()))?;
        if let Some(column) = columns.get(idx) {
            row.insert(column.clone(), text.into_owned());
        }
    }
    Ok(row)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;
    use crate::storage::MemoryDatabase;
    use tablio_common::FieldValue;

    fn schema() -> TableSchema {
        TableSchema::new("users")
            .field(FieldDef::text("username").required())
            .field(FieldDef::text("email"))
            .unique_key(["username"])
            .versioned()
    }

    fn setup() -> (Arc<MemoryDatabase>, ChunkProcessor) {
        let db = Arc::new(MemoryDatabase::new().with_table(schema()).unwrap());
        let processor = ChunkProcessor::new(db.clone(), db.clone());
        (db, processor)
    }

    fn run(processor: &ChunkProcessor, csv: &str, policy: &ImportPolicy) -> ImportSummary {
        let ctx = RunContext::new("tester");
        processor
            .run(csv.as_bytes(), "users.csv", &schema(), policy, &ctx)
            .unwrap()
    }

    #[test]
    fn test_missing_username_is_one_error_entry() {
        let (db, processor) = setup();
        let ctx = RunContext::new("tester");
        let summary = processor
            .run(
                "username,email\n,test@x.com\n".as_bytes(),
                "users.csv",
                &schema(),
                &ImportPolicy::default(),
                &ctx,
            )
            .unwrap();

        assert_eq!(summary.rows_imported, 0);
        assert_eq!(summary.rows_discarded, 1);
        let entries = db.entries(&ctx.batch_id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, EntryLevel::Error);
        assert_eq!(entries[0].row_number, 2);
    }

    #[test]
    fn test_header_and_blank_rows_are_counted_not_logged() {
        let (_db, processor) = setup();
        let summary = run(
            &processor,
            "username,email\nalice,a@x.com\n,\nbob,b@x.com\n",
            &ImportPolicy::default(),
        );
        assert_eq!(summary.rows_read, 4);
        assert_eq!(summary.header_rows, 1);
        assert_eq!(summary.blank_rows, 1);
        assert_eq!(summary.rows_imported, 2);
    }

    #[test]
    fn test_chunks_commit_in_order() {
        let (db, processor) = setup();
        let policy = ImportPolicy::builder().chunk_size(2).build().unwrap();
        let summary = run(&processor, "h,h\na,1\nb,2\nc,3\nd,4\ne,5\n", &policy);
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.rows_imported, 5);
        let names: Vec<FieldValue> = db
            .records("users")
            .unwrap()
            .into_iter()
            .map(|r| r["username"].clone())
            .collect();
        assert_eq!(names.len(), 5);
        assert_eq!(names[0], FieldValue::from("a"));
    }

    #[test]
    fn test_zero_chunk_size_is_one_chunk() {
        let (_db, processor) = setup();
        let policy = ImportPolicy::builder().chunk_size(0).build().unwrap();
        let summary = run(&processor, "h\na\n\nb\nc\n", &policy);
        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.rows_imported, 3);
    }

    #[test]
    fn test_malformed_encoding_is_fatal_and_drops_chunk() {
        let (db, processor) = setup();
        let ctx = RunContext::new("tester");
        let mut input = b"username,email\nalice,a@x.com\n".to_vec();
        input.extend_from_slice(b"b\xffb,b@x.com\n");

        let err = processor
            .run(input.as_slice(), "users.csv", &schema(), &ImportPolicy::default(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ImportError::Stream { row_number: 3, .. }));
        assert!(db.records("users").unwrap().is_empty());
        assert!(db.entries(&ctx.batch_id).unwrap().is_empty());
    }

    #[test]
    fn test_bom_is_stripped_from_first_cell() {
        let (db, processor) = setup();
        let policy = ImportPolicy::builder().header_row_count(0).build().unwrap();
        run(&processor, "\u{feff}alice,a@x.com\n", &policy);
        assert_eq!(db.records("users").unwrap()[0]["username"], FieldValue::from("alice"));
    }

    #[test]
    fn test_permission_denied_before_reading() {
        let (db, processor) = setup();
        let processor = processor.with_permissions(Arc::new(
            |_: &str, _: crate::permission::Action, _: &TableSchema| false,
        ));
        let ctx = RunContext::new("guest");
        let err = processor
            .run("h\nalice\n".as_bytes(), "users.csv", &schema(), &ImportPolicy::default(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ImportError::PermissionDenied { .. }));
        assert!(db.records("users").unwrap().is_empty());
    }

    #[test]
    fn test_hooks_map_rows() {
        struct Lowercase;
        impl ImportHooks for Lowercase {
            fn map_row(&self, row: RowContent) -> RowContent {
                row.iter().map(|(c, v)| (c, v.to_lowercase())).collect()
            }
        }

        let (db, processor) = setup();
        let processor = processor.with_hooks(Arc::new(Lowercase));
        run(&processor, "h\nALICE,A@X.COM\n", &ImportPolicy::default());
        let stored = &db.records("users").unwrap()[0];
        assert_eq!(stored["username"], FieldValue::from("alice"));
        assert_eq!(stored["email"], FieldValue::from("a@x.com"));
    }

    #[test]
    fn test_ensure_completed() {
        let mut summary = ImportSummary::new("b");
        assert!(summary.clone().ensure_completed().is_ok());
        summary.outcome = ImportOutcome::Aborted {
            error_count: 3,
            error_limit: 1,
        };
        assert!(matches!(
            summary.ensure_completed(),
            Err(ImportError::ToleranceExceeded { error_count: 3, .. })
        ));
    }
}
