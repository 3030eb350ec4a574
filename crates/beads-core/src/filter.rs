//! Filter types for querying issues.
//!
//! Filters derive serde so they can travel over the daemon RPC unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{IssueType, Status};

/// Filter for issue search/list queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueFilter {
    pub status: Option<Status>,
    pub priority: Option<i32>,
    pub issue_type: Option<IssueType>,
    pub assignee: Option<String>,

    /// AND semantics: issue must carry ALL these labels.
    pub labels: Vec<String>,

    /// Case-insensitive substring over title/description/notes.
    pub text: Option<String>,

    /// Filter by ephemeral flag (None = any).
    pub ephemeral: Option<bool>,

    /// Filter by pinned flag (None = any).
    pub pinned: Option<bool>,

    /// Only issues closed before this instant.
    pub closed_before: Option<DateTime<Utc>>,

    /// Tombstones are hidden unless explicitly requested.
    pub include_tombstones: bool,

    pub limit: Option<usize>,
}

/// Filter for the ready-work queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkFilter {
    pub assignee: Option<String>,
    pub issue_type: Option<IssueType>,
    pub priority: Option<i32>,

    /// AND semantics over labels.
    pub labels: Vec<String>,

    /// If true, include issues whose defer_until is still in the future.
    pub include_deferred: bool,

    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_open() {
        let f = IssueFilter::default();
        assert!(f.status.is_none());
        assert!(!f.include_tombstones);
        assert!(f.labels.is_empty());

        let w = WorkFilter::default();
        assert!(w.limit.is_none());
        assert!(!w.include_deferred);
    }
}
