//! Per-run context
//!
//! Every component receives the run context explicitly instead of reading
//! it from ambient state: who is acting, which batch the audit entries
//! belong to, and when the run began.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// Opaque identity of the acting operator
    pub principal: String,
    /// Groups every audit entry written by this run
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Start a new run with a fresh batch id
    pub fn new(principal: impl Into<String>) -> Self {
        Self::with_batch_id(principal, Uuid::new_v4().to_string())
    }

    pub fn with_batch_id(principal: impl Into<String>, batch_id: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            batch_id: batch_id.into(),
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_runs_get_distinct_batches() {
        let a = RunContext::new("alice");
        let b = RunContext::new("alice");
        assert_ne!(a.batch_id, b.batch_id);
        assert!(Uuid::parse_str(&a.batch_id).is_ok());
    }
}
