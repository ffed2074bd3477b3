//! Table schemas and the catalog that resolves them
//!
//! A [`TableSchema`] is everything the pipeline needs to know about a target
//! table: its importable fields and their kinds, the unique key used to
//! detect existing records, and whether the table carries a `version`
//! column or audit stamp columns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tablio_common::FieldKind;

use crate::error::CatalogError;

/// Optimistic-lock column on versioned tables
pub const VERSION_COLUMN: &str = "version";

/// Stamp columns filled by the write path on stamped tables
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const CREATOR_COLUMN: &str = "creator";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
pub const UPDATER_COLUMN: &str = "updater";

pub const STAMP_COLUMNS: [(&str, FieldKind); 4] = [
    (CREATED_AT_COLUMN, FieldKind::DateTime),
    (CREATOR_COLUMN, FieldKind::Text),
    (UPDATED_AT_COLUMN, FieldKind::DateTime),
    (UPDATER_COLUMN, FieldKind::Text),
];

/// One importable field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub max_length: Option<usize>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            max_length: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }
}

/// Target table description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Ordered field names of the unique key; empty when the table has none
    pub unique_key: Vec<String>,
    pub versioned: bool,
    pub stamped: bool,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            unique_key: Vec::new(),
            versioned: false,
            stamped: false,
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unique_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }

    pub fn stamped(mut self) -> Self {
        self.stamped = true;
        self
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Importable field names in declaration order
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Every column the storage layer reads and writes, in order:
    /// importable fields, then `version`, then the stamp columns.
    pub fn storage_columns(&self) -> Vec<(&str, FieldKind)> {
        let mut columns: Vec<(&str, FieldKind)> =
            self.fields.iter().map(|f| (f.name.as_str(), f.kind)).collect();
        if self.versioned {
            columns.push((VERSION_COLUMN, FieldKind::Integer));
        }
        if self.stamped {
            columns.extend(STAMP_COLUMNS);
        }
        columns
    }

    /// Kind of any storage column, importable or not
    pub fn column_kind(&self, name: &str) -> Option<FieldKind> {
        self.storage_columns()
            .into_iter()
            .find(|(column, _)| *column == name)
            .map(|(_, kind)| kind)
    }

    pub fn has_unique_key(&self) -> bool {
        !self.unique_key.is_empty()
    }

    /// Check internal consistency: the unique key must name real fields
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.fields.is_empty() {
            return Err(CatalogError::Unmapped {
                table: self.name.clone(),
                reason: "no importable fields".to_string(),
            });
        }
        for key in &self.unique_key {
            if self.field_def(key).is_none() {
                return Err(CatalogError::Unmapped {
                    table: self.name.clone(),
                    reason: format!("unique key field '{}' is not a field", key),
                });
            }
        }
        Ok(())
    }
}

/// Read-only source of table schemas
pub trait SchemaCatalog: Send + Sync {
    fn table(&self, name: &str) -> Result<TableSchema, CatalogError>;

    /// Ordered field name → kind for a table
    fn field_kinds(&self, name: &str) -> Result<Vec<(String, FieldKind)>, CatalogError> {
        Ok(self
            .table(name)?
            .fields
            .into_iter()
            .map(|f| (f.name, f.kind))
            .collect())
    }

    /// Ordered unique-key field names for a table, empty when it has none
    fn unique_key_fields(&self, name: &str) -> Result<Vec<String>, CatalogError> {
        Ok(self.table(name)?.unique_key)
    }
}

/// Catalog over a fixed set of schemas
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tables: BTreeMap<String, TableSchema>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any schema of the same name
    pub fn register(&mut self, schema: TableSchema) -> Result<(), CatalogError> {
        schema.validate()?;
        self.tables.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl SchemaCatalog for StaticCatalog {
    fn table(&self, name: &str) -> Result<TableSchema, CatalogError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn users() -> TableSchema {
        TableSchema::new("users")
            .field(FieldDef::text("username").required().max_length(150))
            .field(FieldDef::text("email"))
            .field(FieldDef::boolean("is_active"))
            .unique_key(["username"])
            .versioned()
            .stamped()
    }

    #[test]
    fn test_storage_columns_order() {
        let schema = users();
        let names: Vec<&str> = schema.storage_columns().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "username",
                "email",
                "is_active",
                "version",
                "created_at",
                "creator",
                "updated_at",
                "updater"
            ]
        );
        assert_eq!(schema.column_kind("updated_at"), Some(FieldKind::DateTime));
        assert_eq!(schema.column_kind("nope"), None);
    }

    #[test]
    fn test_static_catalog_lookup() {
        let mut catalog = StaticCatalog::new();
        catalog.register(users()).unwrap();

        let kinds = catalog.field_kinds("users").unwrap();
        assert_eq!(kinds[0], ("username".to_string(), FieldKind::Text));
        assert_eq!(kinds[2], ("is_active".to_string(), FieldKind::Boolean));
        assert_eq!(catalog.unique_key_fields("users").unwrap(), vec!["username"]);
    }

    #[test]
    fn test_unknown_table_is_an_error() {
        let catalog = StaticCatalog::new();
        assert!(matches!(
            catalog.table("ghosts"),
            Err(CatalogError::UnknownTable(name)) if name == "ghosts"
        ));
    }

    #[test]
    fn test_unique_key_must_name_a_field() {
        let mut catalog = StaticCatalog::new();
        let bad = TableSchema::new("t")
            .field(FieldDef::text("a"))
            .unique_key(["b"]);
        assert!(matches!(catalog.register(bad), Err(CatalogError::Unmapped { .. })));
    }
}
