//! Import and export policies
//!
//! A policy is plain configuration: how big a chunk is, how many header rows
//! to skip, how many rejected rows a chunk may contain before the run is
//! aborted, and how cells are encoded and formatted. Every field has a
//! default, and every construction path (builder or TOML file) validates.
//!
//! ```toml
//! chunk_size = 500
//! error_tolerance_rate = 5
//! overwrite_existing = false
//! encoding = "sjis"
//! columns = ["username", "email"]
//!
//! [default_values]
//! is_active = "true"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use tablio_common::TextEncoding;

use crate::error::PolicyError;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_HEADER_ROWS: usize = 1;
pub const DEFAULT_TOLERANCE_RATE: u8 = 10;
pub const DEFAULT_DATE_FORMAT: &str = "%Y/%m/%d";
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Delimiter and quote characters of a CSV file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvDialect {
    pub delimiter: char,
    pub quote: char,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
        }
    }
}

impl CsvDialect {
    fn validate(&self) -> Result<(), PolicyError> {
        for (name, c) in [("delimiter", self.delimiter), ("quote", self.quote)] {
            if !c.is_ascii() || c == '\n' || c == '\r' {
                return Err(PolicyError::InvalidDialect(format!(
                    "{} must be a single ASCII character other than a line break, got {:?}",
                    name, c
                )));
            }
        }
        if self.delimiter == self.quote {
            return Err(PolicyError::InvalidDialect(
                "delimiter and quote must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    pub fn quote_byte(&self) -> u8 {
        self.quote as u8
    }
}

/// How cells are encoded and how temporal values are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFormat {
    pub encoding: TextEncoding,
    pub dialect: CsvDialect,
    pub date_format: String,
    pub datetime_format: String,
}

impl Default for TextFormat {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            dialect: CsvDialect::default(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
        }
    }
}

impl TextFormat {
    fn validate(&self) -> Result<(), PolicyError> {
        self.dialect.validate()?;
        check_format("date", &self.date_format)?;
        check_format("datetime", &self.datetime_format)
    }
}

fn check_format(name: &'static str, format: &str) -> Result<(), PolicyError> {
    if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(PolicyError::InvalidFormat {
            name,
            format: format.to_string(),
        });
    }
    Ok(())
}

/// Import configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ImportPolicyFile", into = "ImportPolicyFile")]
pub struct ImportPolicy {
    chunk_size: usize,
    header_row_count: usize,
    error_tolerance_rate: u8,
    overwrite_existing: bool,
    format: TextFormat,
    columns: Option<Vec<String>>,
    default_values: BTreeMap<String, String>,
}

impl Default for ImportPolicy {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            header_row_count: DEFAULT_HEADER_ROWS,
            error_tolerance_rate: DEFAULT_TOLERANCE_RATE,
            overwrite_existing: true,
            format: TextFormat::default(),
            columns: None,
            default_values: BTreeMap::new(),
        }
    }
}

impl ImportPolicy {
    pub fn builder() -> ImportPolicyBuilder {
        ImportPolicyBuilder::default()
    }

    /// A builder starting from this policy, for layering overrides
    pub fn to_builder(&self) -> ImportPolicyBuilder {
        ImportPolicyBuilder {
            file: ImportPolicyFile::from(self.clone()),
        }
    }

    /// Parse and validate a TOML policy
    pub fn from_toml_str(text: &str) -> Result<Self, PolicyError> {
        let file: ImportPolicyFile = toml::from_str(text)?;
        Self::try_from(file)
    }

    /// Read and validate a TOML policy file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Rows per transaction; 0 commits the whole file at once
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn header_row_count(&self) -> usize {
        self.header_row_count
    }

    pub fn error_tolerance_rate(&self) -> u8 {
        self.error_tolerance_rate
    }

    pub fn overwrite_existing(&self) -> bool {
        self.overwrite_existing
    }

    pub fn format(&self) -> &TextFormat {
        &self.format
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn default_values(&self) -> &BTreeMap<String, String> {
        &self.default_values
    }

    /// Rejected rows tolerated before a run aborts.
    ///
    /// Derived from the chunk size, not from the rows actually read, so a
    /// zero chunk size tolerates nothing.
    pub fn error_limit(&self) -> usize {
        self.chunk_size * usize::from(self.error_tolerance_rate) / 100
    }

    /// The export side of this policy (same chunking and text format)
    pub fn export_policy(&self) -> ExportPolicy {
        ExportPolicy {
            chunk_size: self.chunk_size,
            format: self.format.clone(),
        }
    }
}

/// On-disk shape of an import policy, validated into [`ImportPolicy`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ImportPolicyFile {
    chunk_size: i64,
    header_row_count: i64,
    error_tolerance_rate: i64,
    overwrite_existing: bool,
    encoding: TextEncoding,
    delimiter: char,
    quote: char,
    date_format: String,
    datetime_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    columns: Option<Vec<String>>,
    default_values: BTreeMap<String, String>,
}

impl Default for ImportPolicyFile {
    fn default() -> Self {
        ImportPolicy::default().into()
    }
}

impl TryFrom<ImportPolicyFile> for ImportPolicy {
    type Error = PolicyError;

    fn try_from(file: ImportPolicyFile) -> Result<Self, Self::Error> {
        let chunk_size =
            usize::try_from(file.chunk_size).map_err(|_| PolicyError::InvalidChunkSize(file.chunk_size))?;
        let header_row_count = usize::try_from(file.header_row_count)
            .map_err(|_| PolicyError::InvalidHeaderRows(file.header_row_count))?;
        let error_tolerance_rate = u8::try_from(file.error_tolerance_rate)
            .ok()
            .filter(|rate| *rate <= 100)
            .ok_or(PolicyError::InvalidToleranceRate(file.error_tolerance_rate))?;

        let format = TextFormat {
            encoding: file.encoding,
            dialect: CsvDialect {
                delimiter: file.delimiter,
                quote: file.quote,
            },
            date_format: file.date_format,
            datetime_format: file.datetime_format,
        };
        format.validate()?;

        if let Some(columns) = &file.columns {
            let mut seen = HashSet::new();
            for column in columns {
                if !seen.insert(column.as_str()) {
                    return Err(PolicyError::DuplicateColumn(column.clone()));
                }
            }
        }

        Ok(ImportPolicy {
            chunk_size,
            header_row_count,
            error_tolerance_rate,
            overwrite_existing: file.overwrite_existing,
            format,
            columns: file.columns,
            default_values: file.default_values,
        })
    }
}

impl From<ImportPolicy> for ImportPolicyFile {
    fn from(policy: ImportPolicy) -> Self {
        Self {
            chunk_size: i64::try_from(policy.chunk_size).unwrap_or(i64::MAX),
            header_row_count: i64::try_from(policy.header_row_count).unwrap_or(i64::MAX),
            error_tolerance_rate: i64::from(policy.error_tolerance_rate),
            overwrite_existing: policy.overwrite_existing,
            encoding: policy.format.encoding,
            delimiter: policy.format.dialect.delimiter,
            quote: policy.format.dialect.quote,
            date_format: policy.format.date_format,
            datetime_format: policy.format.datetime_format,
            columns: policy.columns,
            default_values: policy.default_values,
        }
    }
}

/// Builder for ImportPolicy
#[derive(Default)]
pub struct ImportPolicyBuilder {
    file: ImportPolicyFile,
}

impl ImportPolicyBuilder {
    pub fn chunk_size(mut self, rows: usize) -> Self {
        self.file.chunk_size = i64::try_from(rows).unwrap_or(i64::MAX);
        self
    }

    pub fn header_row_count(mut self, rows: usize) -> Self {
        self.file.header_row_count = i64::try_from(rows).unwrap_or(i64::MAX);
        self
    }

    pub fn error_tolerance_rate(mut self, percent: u8) -> Self {
        self.file.error_tolerance_rate = i64::from(percent);
        self
    }

    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.file.overwrite_existing = overwrite;
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.file.encoding = encoding;
        self
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.file.delimiter = delimiter;
        self
    }

    pub fn quote(mut self, quote: char) -> Self {
        self.file.quote = quote;
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.file.date_format = format.into();
        self
    }

    pub fn datetime_format(mut self, format: impl Into<String>) -> Self {
        self.file.datetime_format = format.into();
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_value(mut self, field: impl Into<String>, raw: impl Into<String>) -> Self {
        self.file.default_values.insert(field.into(), raw.into());
        self
    }

    pub fn build(self) -> Result<ImportPolicy, PolicyError> {
        ImportPolicy::try_from(self.file)
    }
}

/// Export configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPolicy {
    chunk_size: usize,
    format: TextFormat,
}

impl Default for ExportPolicy {
    fn default() -> Self {
        ImportPolicy::default().export_policy()
    }
}

impl ExportPolicy {
    /// Build an export policy, validating the text format
    pub fn new(chunk_size: usize, format: TextFormat) -> Result<Self, PolicyError> {
        format.validate()?;
        Ok(Self { chunk_size, format })
    }

    /// Records fetched per page; 0 reads everything in one page
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn format(&self) -> &TextFormat {
        &self.format
    }
}
