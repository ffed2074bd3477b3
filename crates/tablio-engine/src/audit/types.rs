//! Import log entry types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Outcome level of one imported row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryLevel {
    /// Row was written
    Info,
    /// Row was skipped because a matching record exists
    Warn,
    /// Row was rejected
    Error,
}

impl EntryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryLevel::Info => "info",
            EntryLevel::Warn => "warn",
            EntryLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for EntryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(EntryLevel::Info),
            "warn" | "warning" => Ok(EntryLevel::Warn),
            "error" => Ok(EntryLevel::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

impl std::fmt::Display for EntryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the row created or changed a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EditType {
    #[default]
    Insert,
    Update,
}

impl EditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditType::Insert => "insert",
            EditType::Update => "update",
        }
    }
}

impl std::str::FromStr for EditType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(EditType::Insert),
            "update" => Ok(EditType::Update),
            _ => Err(format!("Unknown edit type: {}", s)),
        }
    }
}

impl std::fmt::Display for EditType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of the transfer that produced the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    #[default]
    Upload,
    Download,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Upload => "upload",
            LogType::Download => "download",
        }
    }
}

impl std::str::FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upload" => Ok(LogType::Upload),
            "download" => Ok(LogType::Download),
            _ => Err(format!("Unknown log type: {}", s)),
        }
    }
}

/// Raw cells of one row, keyed by column name in file order.
///
/// Serializes as a JSON object whose key order follows the file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowContent(Vec<(String, String)>);

impl RowContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a cell, replacing an earlier cell of the same column
    pub fn insert(&mut self, column: impl Into<String>, raw: impl Into<String>) {
        let column = column.into();
        let raw = raw.into();
        match self.0.iter_mut().find(|(c, _)| *c == column) {
            Some(cell) => cell.1 = raw,
            None => self.0.push((column, raw)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl<C, V> FromIterator<(C, V)> for RowContent
where
    C: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        let mut row = RowContent::new();
        for (column, raw) in iter {
            row.insert(column, raw);
        }
        row
    }
}

impl Serialize for RowContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, raw) in &self.0 {
            map.serialize_entry(column, raw)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RowContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = RowContent;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a JSON object of column name to cell text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RowContent, A::Error> {
                let mut row = RowContent::new();
                while let Some((column, raw)) = access.next_entry::<String, String>()? {
                    row.insert(column, raw);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// Per-field validation messages
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// One row-level audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportLogEntry {
    /// Assigned by the store on append
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub batch_id: String,
    pub file_name: String,
    /// 1-based, counting header rows
    pub row_number: u64,
    pub row_content: RowContent,
    pub level: EntryLevel,
    pub log_type: LogType,
    pub edit_type: EditType,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: FieldErrors,
    pub creator: String,
    pub created_at: DateTime<Utc>,
}

impl ImportLogEntry {
    /// Turn an accepted row into a rejected one after its write failed
    pub fn demote(&mut self, message: impl Into<String>) {
        self.level = EntryLevel::Error;
        self.message = message.into();
    }

    pub fn is_accepted(&self) -> bool {
        self.level == EntryLevel::Info
    }
}
