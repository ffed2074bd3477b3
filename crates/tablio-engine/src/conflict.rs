//! Conflict resolution between incoming rows and stored records

use crate::error::StoreResult;
use crate::schema::{TableSchema, VERSION_COLUMN};
use crate::storage::{key_values, Record, RecordReader};

/// What to do with a valid candidate row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No stored record shares the unique key
    Insert,
    /// Overwrite the stored record; holds the merged record to write
    UpdateExisting(Record),
    /// Leave the stored record alone; holds the stored record
    SkipExisting(Record),
}

/// Decides insert, update or skip from the table's unique key
pub struct ConflictResolver<'a> {
    schema: &'a TableSchema,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(schema: &'a TableSchema) -> Self {
        Self { schema }
    }

    /// Resolve `candidate` against the stored records.
    ///
    /// Tables without a unique key, and candidates with a null key column,
    /// never conflict.
    pub fn resolve(
        &self,
        reader: &dyn RecordReader,
        candidate: &Record,
        overwrite_existing: bool,
    ) -> StoreResult<Resolution> {
        let Some(key) = key_values(self.schema, candidate) else {
            return Ok(Resolution::Insert);
        };

        Ok(match reader.find_by_key(self.schema, &key)? {
            None => Resolution::Insert,
            Some(existing) if overwrite_existing => {
                Resolution::UpdateExisting(merge(existing, candidate))
            }
            Some(existing) => Resolution::SkipExisting(existing),
        })
    }

    /// Message for a row skipped because its key already exists
    pub fn duplicate_message(&self) -> String {
        format!(
            "{} with this {} already exists.",
            self.schema.name,
            self.schema.unique_key.join(" and ")
        )
    }
}

/// Candidate fields laid over the stored record.
///
/// The stored version is kept unless the candidate names its own, so the
/// write is checked against the version that was read.
fn merge(existing: Record, candidate: &Record) -> Record {
    let mut merged = existing;
    let stored_version = merged.get(VERSION_COLUMN).cloned();
    merged.extend(candidate.iter().map(|(k, v)| (k.clone(), v.clone())));
    let names_version = candidate
        .get(VERSION_COLUMN)
        .is_some_and(|v| !v.is_null());
    if let (false, Some(version)) = (names_version, stored_version) {
        merged.insert(VERSION_COLUMN.to_string(), version);
    }
    merged
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tablio_common::FieldValue;
    use crate::schema::FieldDef;
    use crate::storage::MemoryDatabase;

    fn schema() -> TableSchema {
        TableSchema::new("users")
            .field(FieldDef::text("username"))
            .field(FieldDef::text("email"))
            .field(FieldDef::text("phone"))
            .unique_key(["username"])
            .versioned()
    }

    fn row(pairs: &[(&str, FieldValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn db() -> MemoryDatabase {
        let db = MemoryDatabase::new().with_table(schema()).unwrap();
        db.seed(
            "users",
            row(&[
                ("username", "alice".into()),
                ("email", "old@x.com".into()),
                ("phone", "555".into()),
                ("version", FieldValue::Integer(4)),
            ]),
        )
        .unwrap();
        db
    }

    #[test]
    fn test_no_match_inserts() {
        let schema = schema();
        let resolver = ConflictResolver::new(&schema);
        let candidate = row(&[("username", "bob".into())]);
        assert_eq!(resolver.resolve(&db(), &candidate, true).unwrap(), Resolution::Insert);
    }

    #[test]
    fn test_match_with_overwrite_merges_and_keeps_version() {
        let schema = schema();
        let resolver = ConflictResolver::new(&schema);
        let candidate = row(&[("username", "alice".into()), ("email", "new@x.com".into())]);

        let Resolution::UpdateExisting(merged) = resolver.resolve(&db(), &candidate, true).unwrap()
        else {
            panic!("expected an update");
        };
        assert_eq!(merged["email"], FieldValue::from("new@x.com"));
        assert_eq!(merged["phone"], FieldValue::from("555"));
        assert_eq!(merged["version"], FieldValue::Integer(4));
    }

    #[test]
    fn test_candidate_version_wins_over_stored() {
        let schema = schema();
        let resolver = ConflictResolver::new(&schema);
        let candidate = row(&[("username", "alice".into()), ("version", FieldValue::Integer(2))]);

        let Resolution::UpdateExisting(merged) = resolver.resolve(&db(), &candidate, true).unwrap()
        else {
            panic!("expected an update");
        };
        assert_eq!(merged["version"], FieldValue::Integer(2));
    }

    #[test]
    fn test_match_without_overwrite_skips() {
        let schema = schema();
        let resolver = ConflictResolver::new(&schema);
        let candidate = row(&[("username", "alice".into())]);
        assert!(matches!(
            resolver.resolve(&db(), &candidate, false).unwrap(),
            Resolution::SkipExisting(_)
        ));
        assert_eq!(resolver.duplicate_message(), "users with this username already exists.");
    }

    #[test]
    fn test_table_without_unique_key_never_conflicts() {
        let schema = TableSchema::new("users").field(FieldDef::text("username"));
        let resolver = ConflictResolver::new(&schema);
        let candidate = row(&[("username", "alice".into())]);
        assert_eq!(resolver.resolve(&db(), &candidate, false).unwrap(), Resolution::Insert);
    }
}
