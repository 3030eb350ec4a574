//! Storage and Transaction traits -- the public API for issue persistence.
//!
//! Consumers depend on these traits rather than on concrete implementations
//! so that alternative backends (SQLite, in-memory, proxies) can be
//! substituted. The JSONL projector, deletion manifest and daemon all work
//! above this interface.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use beads_core::comment::{Comment, Event};
use beads_core::dependency::Dependency;
use beads_core::enums::{IssueType, Status};
use beads_core::filter::{IssueFilter, WorkFilter};
use beads_core::issue::Issue;

use crate::error::Result;

// ---------------------------------------------------------------------------
// View / helper types
// ---------------------------------------------------------------------------

/// Typed partial-update struct for issues.
///
/// Only `Some` fields are applied; `None` fields are left unchanged. Fields
/// with `Option<Option<T>>` distinguish "leave alone" from "clear".
/// Immutable columns (`id`, `created_at`) are not representable here; the
/// CLI maps attempts to touch them to `ReadOnlyField` before reaching the
/// store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub design: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub notes: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<i32>,
    pub issue_type: Option<IssueType>,
    pub assignee: Option<String>,
    pub sender: Option<String>,
    pub external_ref: Option<Option<String>>,
    pub source_system: Option<String>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub defer_until: Option<Option<DateTime<Utc>>>,
    pub estimated_minutes: Option<Option<i32>>,
    pub close_reason: Option<String>,
    pub spec_id: Option<String>,
    pub metadata: Option<Option<String>>,
    pub ephemeral: Option<bool>,
    pub pinned: Option<bool>,
    pub await_type: Option<String>,
    pub timeout: Option<Option<std::time::Duration>>,
    pub replies_to: Option<String>,
}

impl IssuePatch {
    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.design.is_none()
            && self.acceptance_criteria.is_none()
            && self.notes.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.issue_type.is_none()
            && self.assignee.is_none()
            && self.sender.is_none()
            && self.external_ref.is_none()
            && self.source_system.is_none()
            && self.due_at.is_none()
            && self.defer_until.is_none()
            && self.estimated_minutes.is_none()
            && self.close_reason.is_none()
            && self.spec_id.is_none()
            && self.metadata.is_none()
            && self.ephemeral.is_none()
            && self.pinned.is_none()
            && self.await_type.is_none()
            && self.timeout.is_none()
            && self.replies_to.is_none()
    }

    /// Returns `true` if `field` names an immutable column.
    pub fn is_read_only_field(field: &str) -> bool {
        matches!(field, "id" | "created_at")
    }
}

/// An issue that is blocked, with the ids of its open blockers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedIssue {
    /// The blocked issue.
    pub issue: Issue,
    /// Ids of the open `blocks` dependencies holding it back.
    pub open_blockers: Vec<String>,
}

/// Aggregate statistics about the issue database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_issues: i64,
    pub open_issues: i64,
    pub in_progress_issues: i64,
    pub blocked_issues: i64,
    pub closed_issues: i64,
    pub tombstone_issues: i64,

    /// Breakdown by issue type: `(type_name, count)`.
    pub by_type: Vec<(String, i64)>,
    /// Breakdown by priority: `(priority, count)`.
    pub by_priority: Vec<(i32, i64)>,
    /// Breakdown by assignee: `(assignee, count)`.
    pub by_assignee: Vec<(String, i64)>,
}

/// What a single imported record did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportAction {
    Created,
    Updated,
    Skipped,
    Tombstoned,
}

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Primary storage interface for issue persistence.
///
/// All methods are `&self`; implementations guard interior state and must be
/// safe to share across the daemon's per-request threads.
pub trait Storage: Send + Sync {
    // -- Issue CRUD ----------------------------------------------------------

    /// Creates a new issue and emits a "created" event.
    ///
    /// The id must already be assigned; fails with `Duplicate` on collision.
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()>;

    /// Retrieves an issue with labels, comments, and the dependency edges
    /// touching it in either direction.
    fn get_issue(&self, id: &str) -> Result<Issue>;

    /// Searches issues by free text and filter, without deep relations.
    /// Tombstones are excluded unless the filter asks for them.
    fn search_issues(&self, query: &str, filter: &IssueFilter) -> Result<Vec<Issue>>;

    /// Applies partial updates, bumps `updated_at`, and emits one "updated"
    /// event per changed field.
    fn update_issue(&self, id: &str, patch: &IssuePatch, actor: &str) -> Result<Issue>;

    /// Sets status=closed, `closed_at`=now and the close reason.
    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()>;

    /// Reopens a closed issue (status=open, `closed_at` cleared).
    fn reopen_issue(&self, id: &str, actor: &str) -> Result<()>;

    /// Tombstones an issue: strips labels/comments/events and every incident
    /// edge in one transaction. With `cascade`, children (parent-child
    /// dependents) are deleted too. Returns all tombstoned ids so the caller
    /// can append them to the deletion manifest.
    fn delete_issue(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        cascade: bool,
    ) -> Result<Vec<String>>;

    /// Renames an issue, rewriting every inbound reference (edges in both
    /// directions, `replies_to`) in one transaction.
    fn rename_issue(&self, old_id: &str, new_id: &str, actor: &str) -> Result<()>;

    // -- Dependencies --------------------------------------------------------

    /// Adds a dependency edge; refuses cycles through blocking types.
    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()>;

    /// Removes a dependency edge.
    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()>;

    /// Returns the issues that the given issue depends on.
    fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>>;

    /// Returns the issues that depend on the given issue.
    fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>>;

    /// Returns every edge where the issue is either endpoint.
    fn get_edges_touching(&self, issue_id: &str) -> Result<Vec<Dependency>>;

    // -- Labels --------------------------------------------------------------

    /// Adds a label; returns `false` if it was already present.
    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool>;

    /// Removes a label; returns `false` if it was not present.
    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool>;

    /// Returns all labels for an issue, sorted.
    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>>;

    /// Batch label lookup for multiple issues.
    fn get_labels_for_issues(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>>;

    // -- Comments and events -------------------------------------------------

    /// Appends a comment and returns it with its assigned row id.
    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment>;

    /// Returns comments in chronological order (insert order tiebreak).
    fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>>;

    /// Returns the most recent events for an issue.
    fn get_events(&self, issue_id: &str, limit: usize) -> Result<Vec<Event>>;

    // -- Work queries --------------------------------------------------------

    /// Returns open/in-progress issues whose blocking dependencies are all
    /// closed, ordered by ascending priority.
    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>>;

    /// Returns open issues with at least one open `blocks` dependency.
    fn get_blocked_issues(&self) -> Result<Vec<BlockedIssue>>;

    // -- Configuration -------------------------------------------------------

    /// Gets a configuration value, `None` if unset.
    fn get_config(&self, key: &str) -> Result<Option<String>>;

    /// Sets a configuration key-value pair.
    fn set_config(&self, key: &str, value: &str) -> Result<()>;

    /// Returns all configuration key-value pairs.
    fn get_all_config(&self) -> Result<HashMap<String, String>>;

    /// Returns the configured custom issue types, consulted live at
    /// validation time.
    fn get_custom_types(&self) -> Result<Vec<String>>;

    // -- Statistics & identity ----------------------------------------------

    /// Returns aggregate statistics.
    fn get_statistics(&self) -> Result<Statistics>;

    /// Returns `true` if an issue row with this id exists (any status).
    fn id_exists(&self, id: &str) -> Result<bool>;

    /// Returns every issue id, sorted.
    fn all_ids(&self) -> Result<Vec<String>>;

    // -- Projection & reconciliation ----------------------------------------

    /// Returns every issue hydrated with labels, outgoing dependency edges
    /// and comments, for the JSONL projector. Includes tombstones; the
    /// projector decides what to omit.
    fn get_issues_for_export(&self) -> Result<Vec<Issue>>;

    /// Applies one imported record in a single transaction: create when the
    /// id is unknown, update scalars when the incoming `updated_at` is
    /// strictly newer, tombstone on incoming tombstone status, and
    /// reconcile satellites (labels set-replace, comments append-missing,
    /// outgoing dependencies set-replace).
    fn apply_import_record(&self, incoming: &Issue) -> Result<ImportAction>;

    /// Tombstones an id without the full delete path, used when the
    /// deletion manifest overrides an incoming record. Returns `false` if
    /// the issue was already a tombstone or does not exist.
    fn tombstone_issue(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Deletes tombstone rows older than `older_than_days`; returns the
    /// pruned ids. Pinned issues are never pruned.
    fn prune_tombstones(&self, older_than_days: u64) -> Result<Vec<String>>;

    // -- Transactions --------------------------------------------------------

    /// Executes a closure within a database transaction.
    ///
    /// If the closure returns `Ok`, the transaction is committed.
    /// If it returns `Err` or panics, the transaction is rolled back.
    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Transaction trait
// ---------------------------------------------------------------------------

/// Subset of [`Storage`] methods available inside a transaction.
///
/// All operations share a single connection and commit or roll back
/// atomically.
pub trait Transaction {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()>;
    fn get_issue(&self, id: &str) -> Result<Issue>;
    fn update_issue(&self, id: &str, patch: &IssuePatch, actor: &str) -> Result<Issue>;
    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()>;

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()>;
    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()>;

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool>;
    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool>;
    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>>;

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment>;

    /// Inserts a comment preserving its original timestamp (import path).
    fn import_comment(
        &self,
        issue_id: &str,
        author: &str,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Comment>;

    fn get_config(&self, key: &str) -> Result<Option<String>>;
    fn set_config(&self, key: &str, value: &str) -> Result<()>;
}
