//! Storage backends for the beads system.
//!
//! Provides the [`Storage`] trait, the SQLite implementation
//! ([`SqliteStore`]) used by real workspaces, and an in-memory
//! implementation ([`MemoryStore`]) for tests. Everything above this crate
//! (projector, manifest, daemon, CLI) depends only on the trait.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience.
pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{BlockedIssue, ImportAction, IssuePatch, Statistics, Storage, Transaction};

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use beads_core::comment::{Comment, Event};
use beads_core::dependency::Dependency;
use beads_core::filter::{IssueFilter, WorkFilter};
use beads_core::idgen;
use beads_core::issue::Issue;

// ---------------------------------------------------------------------------
// ID allocation against a live store
// ---------------------------------------------------------------------------

/// Allocates a fresh collision-free issue id.
///
/// Retries with increasing nonces against [`Storage::id_exists`]; fails with
/// [`StorageError::IdExhausted`] after the nonce budget. The hash length
/// adapts to the current issue count.
pub fn generate_issue_id(
    store: &dyn Storage,
    prefix: &str,
    title: &str,
    creator: &str,
) -> Result<String> {
    let count = store.all_ids()?.len();
    let length = idgen::compute_adaptive_length(count, idgen::MAX_COLLISION_PROB);
    let now = Utc::now();

    for nonce in 0..idgen::MAX_ATTEMPTS {
        let candidate = idgen::generate_hash_id(prefix, title, creator, now, length, nonce);
        if !store.id_exists(&candidate)? {
            return Ok(candidate);
        }
    }
    Err(StorageError::IdExhausted {
        attempts: idgen::MAX_ATTEMPTS,
    })
}

/// Allocates a child id `<parent>.<N>` with the lowest free `N`.
pub fn generate_child_id(store: &dyn Storage, parent: &str) -> Result<String> {
    let existing = store.all_ids()?;
    Ok(idgen::next_child_id(parent, &existing))
}

// ---------------------------------------------------------------------------
// Storage trait implementation for SqliteStore
// ---------------------------------------------------------------------------

impl Storage for SqliteStore {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        self.create_issue_impl(issue, actor)
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        self.get_issue_impl(id)
    }

    fn search_issues(&self, query: &str, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.search_issues_impl(query, filter)
    }

    fn update_issue(&self, id: &str, patch: &IssuePatch, actor: &str) -> Result<Issue> {
        self.update_issue_impl(id, patch, actor)
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        self.close_issue_impl(id, reason, actor)
    }

    fn reopen_issue(&self, id: &str, actor: &str) -> Result<()> {
        self.reopen_issue_impl(id, actor)
    }

    fn delete_issue(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        cascade: bool,
    ) -> Result<Vec<String>> {
        self.delete_issue_impl(id, actor, reason, cascade)
    }

    fn rename_issue(&self, old_id: &str, new_id: &str, actor: &str) -> Result<()> {
        self.rename_issue_impl(old_id, new_id, actor)
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        self.add_dependency_impl(dep, actor)
    }

    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()> {
        self.remove_dependency_impl(issue_id, depends_on_id, actor)
    }

    fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>> {
        self.get_dependencies_impl(issue_id)
    }

    fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>> {
        self.get_dependents_impl(issue_id)
    }

    fn get_edges_touching(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        self.get_edges_touching_impl(issue_id)
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        self.add_label_impl(issue_id, label, actor)
    }

    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        self.remove_label_impl(issue_id, label, actor)
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        self.get_labels_impl(issue_id)
    }

    fn get_labels_for_issues(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        self.get_labels_for_issues_impl(ids)
    }

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        self.add_comment_impl(issue_id, author, text)
    }

    fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        self.get_comments_impl(issue_id)
    }

    fn get_events(&self, issue_id: &str, limit: usize) -> Result<Vec<Event>> {
        self.get_events_impl(issue_id, limit)
    }

    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>> {
        self.get_ready_work_impl(filter)
    }

    fn get_blocked_issues(&self) -> Result<Vec<BlockedIssue>> {
        self.get_blocked_issues_impl()
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        self.get_config_impl(key)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.set_config_impl(key, value)
    }

    fn get_all_config(&self) -> Result<HashMap<String, String>> {
        self.get_all_config_impl()
    }

    fn get_custom_types(&self) -> Result<Vec<String>> {
        self.get_custom_types_impl()
    }

    fn get_statistics(&self) -> Result<Statistics> {
        self.get_statistics_impl()
    }

    fn id_exists(&self, id: &str) -> Result<bool> {
        self.id_exists_impl(id)
    }

    fn all_ids(&self) -> Result<Vec<String>> {
        self.all_ids_impl()
    }

    fn get_issues_for_export(&self) -> Result<Vec<Issue>> {
        self.get_issues_for_export_impl()
    }

    fn apply_import_record(&self, incoming: &Issue) -> Result<ImportAction> {
        self.apply_import_record_impl(incoming)
    }

    fn tombstone_issue(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.tombstone_issue_impl(id, actor, reason, deleted_at)
    }

    fn prune_tombstones(&self, older_than_days: u64) -> Result<Vec<String>> {
        self.prune_tombstones_impl(older_than_days)
    }

    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()> {
        self.run_in_transaction_impl(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    #[test]
    fn generate_id_avoids_collisions() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = generate_issue_id(&store, "bd", "First", "alice").unwrap();
        assert!(id.starts_with("bd-"));

        store
            .create_issue(&IssueBuilder::new("First").id(&id).build(), "alice")
            .unwrap();
        // A second allocation with identical inputs must dodge the taken id.
        let id2 = generate_issue_id(&store, "bd", "First", "alice").unwrap();
        assert_ne!(id, id2);
    }

    #[test]
    fn generate_child_id_increments() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create_issue(&IssueBuilder::new("P").id("bd-aa11").build(), "a")
            .unwrap();
        let child = generate_child_id(&store, "bd-aa11").unwrap();
        assert_eq!(child, "bd-aa11.1");

        store
            .create_issue(&IssueBuilder::new("C").id(&child).build(), "a")
            .unwrap();
        assert_eq!(generate_child_id(&store, "bd-aa11").unwrap(), "bd-aa11.2");
    }
}
