//! Transaction wrapper for [`SqliteStore`].

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use beads_core::comment::Comment;
use beads_core::dependency::Dependency;
use beads_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::sqlite::store::SqliteStore;
use crate::sqlite::{comments, config, dependencies, issues, labels};
use crate::traits::{IssuePatch, Transaction};

/// A thin wrapper around a connection with an active transaction.
///
/// Implements [`Transaction`] by delegating to the same connection-level
/// helpers the store methods use.
pub(crate) struct SqliteTx<'a> {
    pub(crate) conn: &'a Connection,
}

impl Transaction for SqliteTx<'_> {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        issues::insert_issue(self.conn, issue, actor)
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        let mut issue = issues::get_issue_row(self.conn, id)?;
        issue.labels = labels::get_labels_on_conn(self.conn, id)?;
        issue.comments = comments::get_comments_on_conn(self.conn, id)?;
        issue.dependencies = dependencies::get_edges_touching_on_conn(self.conn, id)?;
        Ok(issue)
    }

    fn update_issue(&self, id: &str, patch: &IssuePatch, actor: &str) -> Result<Issue> {
        issues::update_issue_on_conn(self.conn, id, patch, actor)
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        issues::close_issue_on_conn(self.conn, id, reason, actor)
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        dependencies::add_dependency_on_conn(self.conn, dep, actor)
    }

    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()> {
        dependencies::remove_dependency_on_conn(self.conn, issue_id, depends_on_id, actor)
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        labels::add_label_on_conn(self.conn, issue_id, label, actor)
    }

    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        labels::remove_label_on_conn(self.conn, issue_id, label, actor)
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        labels::get_labels_on_conn(self.conn, issue_id)
    }

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        comments::add_comment_on_conn(self.conn, issue_id, author, text)
    }

    fn import_comment(
        &self,
        issue_id: &str,
        author: &str,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Comment> {
        comments::import_comment_on_conn(self.conn, issue_id, author, text, created_at)
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        config::get_config_on_conn(self.conn, key)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        config::set_config_on_conn(self.conn, key, value)
    }
}

impl SqliteStore {
    /// Runs a closure inside a database transaction.
    ///
    /// Commits on `Ok`; the transaction rolls back on `Err` or if the
    /// closure unwinds (drop runs the rollback).
    pub fn run_in_transaction_impl(
        &self,
        f: &dyn Fn(&dyn Transaction) -> Result<()>,
    ) -> Result<()> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StorageError::Internal(format!("failed to begin: {e}")))?;

        let sqlite_tx = SqliteTx { conn: &tx };
        match f(&sqlite_tx) {
            Ok(()) => tx
                .commit()
                .map_err(|e| StorageError::Internal(format!("failed to commit: {e}"))),
            Err(e) => Err(e),
        }
    }
}
