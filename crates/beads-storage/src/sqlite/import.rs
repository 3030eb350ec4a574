//! Import reconciliation for [`SqliteStore`].
//!
//! Each incoming JSONL record is applied in its own transaction so a bad
//! record never poisons the rest of the file.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use beads_core::enums::{DependencyType, Status};
use beads_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::sqlite::comments::merge_comments_on_conn;
use crate::sqlite::dependencies::{replace_outgoing_edges_on_conn, upsert_edge_on_conn};
use crate::sqlite::issues::{format_datetime, get_issue_row, insert_issue_raw};
use crate::sqlite::labels::{add_label_on_conn, set_labels_on_conn};
use crate::sqlite::store::SqliteStore;
use crate::traits::ImportAction;

impl SqliteStore {
    /// Applies one imported record atomically.
    ///
    /// - Unknown id: create with satellites.
    /// - Known id, incoming `updated_at` strictly newer: overwrite scalars,
    ///   set-replace labels and outgoing dependencies, append missing
    ///   comments. `updated_at` never moves backwards.
    /// - Known id, incoming older or equal: keep local scalars and
    ///   dependencies, union labels, append missing comments.
    /// - Incoming tombstone: tombstone locally unless already tombstoned.
    pub fn apply_import_record_impl(&self, incoming: &Issue) -> Result<ImportAction> {
        if incoming.id.is_empty() {
            return Err(StorageError::validation("imported record has no id"));
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StorageError::Internal(format!("failed to begin: {e}")))?;

        let existing = match get_issue_row(&tx, &incoming.id) {
            Ok(row) => Some(row),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let action = if incoming.status == Status::Tombstone {
            match existing {
                Some(ref row) if row.status == Status::Tombstone => ImportAction::Skipped,
                Some(_) => {
                    tombstone_on_conn(
                        &tx,
                        &incoming.id,
                        "import",
                        "tombstoned in remote clone",
                        incoming.updated_at,
                    )?;
                    ImportAction::Tombstoned
                }
                None => {
                    // Keep the tombstone row so re-export still blocks
                    // resurrection on other clones.
                    let mut tomb = incoming.clone().without_satellites();
                    tomb.deleted_at = Some(incoming.updated_at);
                    insert_issue_raw(&tx, &tomb, "import")?;
                    ImportAction::Tombstoned
                }
            }
        } else {
            match existing {
                None => {
                    insert_issue_raw(&tx, incoming, "import")?;
                    apply_satellites(&tx, incoming, true)?;
                    ImportAction::Created
                }
                Some(local) if incoming.updated_at > local.updated_at => {
                    overwrite_scalars(&tx, incoming)?;
                    apply_satellites(&tx, incoming, true)?;
                    ImportAction::Updated
                }
                Some(_) => {
                    apply_satellites(&tx, incoming, false)?;
                    ImportAction::Skipped
                }
            }
        };

        tx.commit()
            .map_err(|e| StorageError::Internal(format!("failed to commit: {e}")))?;
        Ok(action)
    }

    /// Tombstones an id directly (deletion-manifest enforcement).
    ///
    /// Returns `false` if the issue does not exist or is already a
    /// tombstone.
    pub fn tombstone_issue_impl(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StorageError::Internal(format!("failed to begin: {e}")))?;

        let existing = match get_issue_row(&tx, id) {
            Ok(row) => row,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        if existing.status == Status::Tombstone {
            return Ok(false);
        }

        tombstone_on_conn(&tx, id, actor, reason, deleted_at)?;
        tx.commit()
            .map_err(|e| StorageError::Internal(format!("failed to commit: {e}")))?;
        Ok(true)
    }
}

/// Marks a row tombstone and strips its satellites and incident edges.
fn tombstone_on_conn(
    conn: &Connection,
    id: &str,
    actor: &str,
    reason: &str,
    deleted_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute("DELETE FROM labels WHERE issue_id = ?1", params![id])?;
    conn.execute("DELETE FROM comments WHERE issue_id = ?1", params![id])?;
    conn.execute("DELETE FROM events WHERE issue_id = ?1", params![id])?;
    conn.execute(
        "DELETE FROM dependencies WHERE issue_id = ?1 OR depends_on_id = ?1",
        params![id],
    )?;
    let at_str = format_datetime(&deleted_at);
    conn.execute(
        "UPDATE issues SET status = 'tombstone', deleted_at = ?1, deleted_by = ?2,
                delete_reason = ?3, updated_at = ?1
         WHERE id = ?4",
        params![at_str, actor, reason, id],
    )?;
    Ok(())
}

/// Overwrites every scalar column from the incoming record (`created_at`
/// included; the record is authoritative when strictly newer).
fn overwrite_scalars(conn: &Connection, incoming: &Issue) -> Result<()> {
    conn.execute(
        "UPDATE issues SET
            content_hash = ?1, title = ?2, description = ?3, design = ?4,
            acceptance_criteria = ?5, notes = ?6, spec_id = ?7,
            status = ?8, priority = ?9, issue_type = ?10,
            assignee = ?11, created_by = ?12, sender = ?13,
            external_ref = ?14, source_system = ?15,
            created_at = ?16, updated_at = ?17, closed_at = ?18,
            due_at = ?19, defer_until = ?20,
            estimated_minutes = ?21, close_reason = ?22, metadata = ?23,
            ephemeral = ?24, pinned = ?25,
            await_type = ?26, timeout_secs = ?27, replies_to = ?28
         WHERE id = ?29",
        params![
            incoming.compute_content_hash(),
            incoming.title,
            incoming.description,
            incoming.design,
            incoming.acceptance_criteria,
            incoming.notes,
            incoming.spec_id,
            incoming.status.as_str(),
            incoming.priority,
            incoming.issue_type.as_str(),
            incoming.assignee,
            incoming.created_by,
            incoming.sender,
            incoming.external_ref,
            incoming.source_system,
            format_datetime(&incoming.created_at),
            format_datetime(&incoming.updated_at),
            incoming.closed_at.as_ref().map(format_datetime),
            incoming.due_at.as_ref().map(format_datetime),
            incoming.defer_until.as_ref().map(format_datetime),
            incoming.estimated_minutes,
            incoming.close_reason,
            incoming.metadata,
            incoming.ephemeral as i32,
            incoming.pinned as i32,
            incoming.await_type,
            incoming.timeout.map(|d| d.as_secs() as i64),
            incoming.replies_to,
            incoming.id,
        ],
    )?;
    Ok(())
}

/// Reconciles satellites for an applied record.
///
/// `authoritative` selects between the newer-side rules (labels and
/// outgoing dependencies set-replace) and the older-side rules (labels
/// union, dependencies untouched). Comments always append-missing.
/// Mirrored parent-child edges whose source is another issue are upserted
/// so a partial import still reconstructs the tree.
fn apply_satellites(conn: &Connection, incoming: &Issue, authoritative: bool) -> Result<()> {
    if authoritative {
        set_labels_on_conn(conn, &incoming.id, &incoming.labels)?;
        replace_outgoing_edges_on_conn(conn, &incoming.id, &incoming.dependencies)?;
    } else {
        for label in &incoming.labels {
            add_label_on_conn(conn, &incoming.id, label, "import")?;
        }
    }

    merge_comments_on_conn(conn, &incoming.id, &incoming.comments)?;

    for dep in &incoming.dependencies {
        if dep.issue_id != incoming.id && dep.dep_type == DependencyType::ParentChild {
            upsert_edge_on_conn(conn, dep)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::dependency::Dependency;
    use beads_core::issue::IssueBuilder;
    use pretty_assertions::assert_eq;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_unknown_record_with_satellites() {
        let store = test_store();
        let mut incoming = IssueBuilder::new("New").id("bd-n1").build();
        incoming.labels = vec!["a".into(), "b".into()];
        incoming.comments = vec![beads_core::comment::Comment {
            id: 0,
            issue_id: "bd-n1".into(),
            author: "alice".into(),
            text: "hi".into(),
            created_at: Utc::now(),
        }];

        let action = store.apply_import_record_impl(&incoming).unwrap();
        assert_eq!(action, ImportAction::Created);

        let got = store.get_issue_impl("bd-n1").unwrap();
        assert_eq!(got.labels, vec!["a", "b"]);
        assert_eq!(got.comments.len(), 1);
    }

    #[test]
    fn newer_record_overwrites_scalars_and_labels() {
        let store = test_store();
        let local = IssueBuilder::new("Old title").id("bd-u1").build();
        store.create_issue_impl(&local, "t").unwrap();
        store.add_label_impl("bd-u1", "local-only", "t").unwrap();

        let mut incoming = IssueBuilder::new("New title")
            .id("bd-u1")
            .updated_at(Utc::now() + chrono::Duration::seconds(10))
            .build();
        incoming.labels = vec!["remote".into()];

        let action = store.apply_import_record_impl(&incoming).unwrap();
        assert_eq!(action, ImportAction::Updated);

        let got = store.get_issue_impl("bd-u1").unwrap();
        assert_eq!(got.title, "New title");
        assert_eq!(got.labels, vec!["remote"]);
    }

    #[test]
    fn older_record_unions_labels_keeps_scalars() {
        let store = test_store();
        let local = IssueBuilder::new("Local title").id("bd-o1").build();
        store.create_issue_impl(&local, "t").unwrap();
        store.add_label_impl("bd-o1", "local", "t").unwrap();

        let mut incoming = IssueBuilder::new("Stale title")
            .id("bd-o1")
            .updated_at(Utc::now() - chrono::Duration::hours(1))
            .build();
        incoming.labels = vec!["remote".into()];

        let action = store.apply_import_record_impl(&incoming).unwrap();
        assert_eq!(action, ImportAction::Skipped);

        let got = store.get_issue_impl("bd-o1").unwrap();
        assert_eq!(got.title, "Local title");
        assert_eq!(got.labels, vec!["local", "remote"]);
    }

    #[test]
    fn incoming_tombstone_applies_locally() {
        let store = test_store();
        let local = IssueBuilder::new("Alive").id("bd-t1").build();
        store.create_issue_impl(&local, "t").unwrap();
        store.add_label_impl("bd-t1", "x", "t").unwrap();

        let incoming = IssueBuilder::new("Alive")
            .id("bd-t1")
            .status(Status::Tombstone)
            .updated_at(Utc::now() + chrono::Duration::seconds(5))
            .build();
        let action = store.apply_import_record_impl(&incoming).unwrap();
        assert_eq!(action, ImportAction::Tombstoned);

        let got = store.get_issue_impl("bd-t1").unwrap();
        assert_eq!(got.status, Status::Tombstone);
        assert!(got.labels.is_empty());

        // Applying again is a no-op.
        let again = store.apply_import_record_impl(&incoming).unwrap();
        assert_eq!(again, ImportAction::Skipped);
    }

    #[test]
    fn unknown_tombstone_record_is_kept() {
        let store = test_store();
        let incoming = IssueBuilder::new("Ghost")
            .id("bd-g1")
            .status(Status::Tombstone)
            .build();
        let action = store.apply_import_record_impl(&incoming).unwrap();
        assert_eq!(action, ImportAction::Tombstoned);
        assert!(store.id_exists_impl("bd-g1").unwrap());
    }

    #[test]
    fn mirrored_parent_child_edge_reconstructs_tree() {
        let store = test_store();
        // The parent's record carries the child's edge.
        let mut parent = IssueBuilder::new("Parent").id("bd-p1").build();
        parent.dependencies = vec![Dependency::new(
            "bd-p1.1",
            "bd-p1",
            DependencyType::ParentChild,
            "t",
        )];
        let child = IssueBuilder::new("Child").id("bd-p1.1").build();

        store.apply_import_record_impl(&child).unwrap();
        store.apply_import_record_impl(&parent).unwrap();

        let got = store.get_issue_impl("bd-p1.1").unwrap();
        assert_eq!(got.dependencies.len(), 1);
        assert_eq!(got.dependencies[0].depends_on_id, "bd-p1");
    }

    #[test]
    fn manifest_tombstone_overrides() {
        let store = test_store();
        let local = IssueBuilder::new("Doomed").id("bd-d1").build();
        store.create_issue_impl(&local, "t").unwrap();

        let deleted_at = Utc::now();
        assert!(store
            .tombstone_issue_impl("bd-d1", "manifest", "deleted in clone A", deleted_at)
            .unwrap());
        assert!(!store
            .tombstone_issue_impl("bd-d1", "manifest", "again", deleted_at)
            .unwrap());
        assert!(!store
            .tombstone_issue_impl("bd-nope", "manifest", "missing", deleted_at)
            .unwrap());

        let got = store.get_issue_impl("bd-d1").unwrap();
        assert_eq!(got.status, Status::Tombstone);
    }
}
