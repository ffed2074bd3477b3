//! Import/export permission checks
//!
//! The engine does not model roles. It asks a single yes/no question of the
//! caller before any row is read or written.

use crate::schema::TableSchema;

/// What the principal is about to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Import,
    Export,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Import => "import",
            Action::Export => "export",
        }
    }
}

/// Decides whether a principal may import into or export from a table
pub trait PermissionOracle: Send + Sync {
    fn allows(&self, principal: &str, action: Action, schema: &TableSchema) -> bool;

    fn can_import(&self, principal: &str, schema: &TableSchema) -> bool {
        self.allows(principal, Action::Import, schema)
    }

    fn can_export(&self, principal: &str, schema: &TableSchema) -> bool {
        self.allows(principal, Action::Export, schema)
    }
}

/// Grants everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionOracle for AllowAll {
    fn allows(&self, _principal: &str, _action: Action, _schema: &TableSchema) -> bool {
        true
    }
}

impl<F> PermissionOracle for F
where
    F: Fn(&str, Action, &TableSchema) -> bool + Send + Sync,
{
    fn allows(&self, principal: &str, action: Action, schema: &TableSchema) -> bool {
        self(principal, action, schema)
    }
}
