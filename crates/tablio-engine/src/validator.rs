//! Row validation and classification
//!
//! A raw row goes through four steps:
//!
//! 1. cells are parsed with the kinds of their columns; any parse failure
//!    rejects the row without further checks
//! 2. default values fill columns the row does not carry
//! 3. required fields and text lengths are checked
//! 4. the conflict resolver decides insert, update or skip
//!
//! Columns the table does not have are ignored. A row that fails only
//! because its unique key already exists is an update or a skip, never an
//! error; any other failure is an error regardless of policy.

use std::collections::BTreeMap;

use chrono::Utc;
use tablio_common::FieldValue;

use crate::audit::{EditType, EntryLevel, FieldErrors, ImportLogEntry, LogType, RowContent};
use crate::conflict::{ConflictResolver, Resolution};
use crate::context::RunContext;
use crate::error::StoreResult;
use crate::policy::ImportPolicy;
use crate::schema::{TableSchema, UPDATER_COLUMN, VERSION_COLUMN};
use crate::storage::{Record, RecordReader};

pub const MSG_INSERTED: &str = "Newly imported row.";
pub const MSG_UPDATED: &str = "Update existing row.";
const MSG_REQUIRED: &str = "This field is required.";

/// Key used for errors that belong to no single field
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Result of the structural checks of one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid(Record),
    Invalid(FieldErrors),
}

/// A classified row: its audit entry, plus the record to write for accepted rows
#[derive(Debug, Clone)]
pub struct ValidatedRow {
    pub entry: ImportLogEntry,
    pub record: Option<Record>,
}

pub struct RowValidator<'a> {
    schema: &'a TableSchema,
    policy: &'a ImportPolicy,
    resolver: ConflictResolver<'a>,
}

impl<'a> RowValidator<'a> {
    pub fn new(schema: &'a TableSchema, policy: &'a ImportPolicy) -> Self {
        Self {
            schema,
            policy,
            resolver: ConflictResolver::new(schema),
        }
    }

    /// Steps 1 to 3: parse, apply defaults, check fields
    pub fn check(&self, raw: &RowContent, ctx: &RunContext) -> Validation {
        let format = self.policy.format();
        let parse = |column: &str, text: &str| {
            self.schema.column_kind(column).map(|kind| {
                FieldValue::parse(text, kind, &format.date_format, &format.datetime_format)
                    .map_err(|e| e.to_string())
            })
        };

        let mut record = Record::new();
        let mut errors = FieldErrors::new();
        for (column, text) in raw.iter() {
            match parse(column, text) {
                Some(Ok(FieldValue::Null)) if column == VERSION_COLUMN => {}
                Some(Ok(value)) => {
                    record.insert(column.to_string(), value);
                }
                Some(Err(message)) => push(&mut errors, column, message),
                None => {}
            }
        }
        if !errors.is_empty() {
            return Validation::Invalid(errors);
        }

        for (column, text) in self.policy.default_values() {
            if record.contains_key(column) {
                continue;
            }
            match parse(column.as_str(), text.as_str()) {
                Some(Ok(value)) => {
                    record.insert(column.clone(), value);
                }
                Some(Err(message)) => push(&mut errors, column, message),
                None => {}
            }
        }
        if self.schema.stamped && !record.contains_key(UPDATER_COLUMN) {
            record.insert(UPDATER_COLUMN.to_string(), ctx.principal.as_str().into());
        }

        for field in &self.schema.fields {
            match record.get(&field.name) {
                Some(FieldValue::Null) if field.required => {
                    push(&mut errors, &field.name, MSG_REQUIRED.to_string())
                }
                Some(FieldValue::Text(text)) => {
                    let length = text.chars().count();
                    if let Some(max) = field.max_length.filter(|max| length > *max) {
                        push(
                            &mut errors,
                            &field.name,
                            format!(
                                "Ensure this value has at most {} characters (it has {}).",
                                max, length
                            ),
                        );
                    }
                }
                _ => {}
            }
        }

        if errors.is_empty() {
            Validation::Valid(record)
        } else {
            Validation::Invalid(errors)
        }
    }

    /// All four steps, producing the row's audit entry
    pub fn validate(
        &self,
        reader: &dyn RecordReader,
        raw: RowContent,
        file_name: &str,
        row_number: u64,
        ctx: &RunContext,
    ) -> StoreResult<ValidatedRow> {
        let mut entry = ImportLogEntry {
            id: None,
            batch_id: ctx.batch_id.clone(),
            file_name: file_name.to_string(),
            row_number,
            row_content: RowContent::new(),
            level: EntryLevel::Info,
            log_type: LogType::Upload,
            edit_type: EditType::Insert,
            message: String::new(),
            field_errors: FieldErrors::new(),
            creator: ctx.principal.clone(),
            created_at: Utc::now(),
        };

        let record = match self.check(&raw, ctx) {
            Validation::Invalid(errors) => {
                reject(&mut entry, errors);
                None
            }
            Validation::Valid(record) => {
                match self
                    .resolver
                    .resolve(reader, &record, self.policy.overwrite_existing())?
                {
                    Resolution::Insert => {
                        let missing = self.missing_required(&record);
                        if missing.is_empty() {
                            entry.message = MSG_INSERTED.to_string();
                            Some(record)
                        } else {
                            reject(&mut entry, missing);
                            None
                        }
                    }
                    Resolution::UpdateExisting(merged) => {
                        entry.edit_type = EditType::Update;
                        entry.message = MSG_UPDATED.to_string();
                        Some(merged)
                    }
                    Resolution::SkipExisting(_) => {
                        let message = self.resolver.duplicate_message();
                        let field = match self.schema.unique_key.as_slice() {
                            [single] => single.as_str(),
                            _ => NON_FIELD_ERRORS,
                        };
                        push(&mut entry.field_errors, field, message.clone());
                        entry.level = EntryLevel::Warn;
                        entry.message = message;
                        None
                    }
                }
            }
        };

        entry.row_content = raw;
        Ok(ValidatedRow { entry, record })
    }

    /// Required fields a new record would lack entirely
    fn missing_required(&self, record: &Record) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for field in self.schema.fields.iter().filter(|f| f.required) {
            if !record.contains_key(&field.name) {
                push(&mut errors, &field.name, MSG_REQUIRED.to_string());
            }
        }
        errors
    }
}

fn push(errors: &mut FieldErrors, field: &str, message: String) {
    errors.entry(field.to_string()).or_default().push(message);
}

fn reject(entry: &mut ImportLogEntry, errors: FieldErrors) {
    entry.level = EntryLevel::Error;
    entry.message = render_errors(&errors);
    entry.field_errors = errors;
}

/// `field: message message`, fields separated by `; `
pub fn render_errors(errors: &BTreeMap<String, Vec<String>>) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}
