//! Label operations for [`SqliteStore`].

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, params};

use beads_core::enums::EventType;

use crate::error::{Result, StorageError};
use crate::sqlite::issues::{emit_event, format_datetime};
use crate::sqlite::store::SqliteStore;

// ---------------------------------------------------------------------------
// Connection-level helpers (shared with Transaction)
// ---------------------------------------------------------------------------

/// Adds a label; returns `false` if it was already present. Idempotent.
pub(crate) fn add_label_on_conn(
    conn: &Connection,
    issue_id: &str,
    label: &str,
    actor: &str,
) -> Result<bool> {
    ensure_issue_exists(conn, issue_id)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?1, ?2)",
        params![issue_id, label],
    )?;
    if inserted > 0 {
        emit_event(
            conn,
            issue_id,
            EventType::LabelAdded,
            actor,
            None,
            Some(label),
            &format_datetime(&Utc::now()),
        )?;
    }
    Ok(inserted > 0)
}

/// Removes a label; returns `false` if it was not present.
pub(crate) fn remove_label_on_conn(
    conn: &Connection,
    issue_id: &str,
    label: &str,
    actor: &str,
) -> Result<bool> {
    ensure_issue_exists(conn, issue_id)?;
    let removed = conn.execute(
        "DELETE FROM labels WHERE issue_id = ?1 AND label = ?2",
        params![issue_id, label],
    )?;
    if removed > 0 {
        emit_event(
            conn,
            issue_id,
            EventType::LabelRemoved,
            actor,
            Some(label),
            None,
            &format_datetime(&Utc::now()),
        )?;
    }
    Ok(removed > 0)
}

/// Returns all labels for an issue, sorted.
pub(crate) fn get_labels_on_conn(conn: &Connection, issue_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT label FROM labels WHERE issue_id = ?1 ORDER BY label")?;
    let rows = stmt.query_map(params![issue_id], |row| row.get::<_, String>(0))?;
    let mut labels = Vec::new();
    for row in rows {
        labels.push(row?);
    }
    Ok(labels)
}

/// Set-replaces the labels of an issue (import reconciliation).
pub(crate) fn set_labels_on_conn(
    conn: &Connection,
    issue_id: &str,
    labels: &[String],
) -> Result<()> {
    conn.execute("DELETE FROM labels WHERE issue_id = ?1", params![issue_id])?;
    for label in labels {
        conn.execute(
            "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?1, ?2)",
            params![issue_id, label],
        )?;
    }
    Ok(())
}

fn ensure_issue_exists(conn: &Connection, issue_id: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM issues WHERE id = ?1)",
        params![issue_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StorageError::not_found("issue", issue_id))
    }
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Adds a label to an issue.
    pub fn add_label_impl(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        self.retry_on_busy(|conn| add_label_on_conn(conn, issue_id, label, actor))
    }

    /// Removes a label from an issue.
    pub fn remove_label_impl(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        self.retry_on_busy(|conn| remove_label_on_conn(conn, issue_id, label, actor))
    }

    /// Returns all labels for an issue.
    pub fn get_labels_impl(&self, issue_id: &str) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        get_labels_on_conn(&conn, issue_id)
    }

    /// Batch label lookup keyed by issue id.
    pub fn get_labels_for_issues_impl(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        let conn = self.lock_conn()?;
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        if ids.is_empty() {
            return Ok(map);
        }
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT issue_id, label FROM labels WHERE issue_id IN ({})
             ORDER BY issue_id, label",
            placeholders.join(",")
        );
        let value_refs: Vec<&dyn rusqlite::types::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(value_refs.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (id, label) = row?;
            map.entry(id).or_default().push(label);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use pretty_assertions::assert_eq;

    fn test_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create_issue_impl(&IssueBuilder::new("X").id("bd-l1").build(), "a")
            .unwrap();
        store
    }

    #[test]
    fn add_is_idempotent() {
        let store = test_store();
        assert!(store.add_label_impl("bd-l1", "urgent", "a").unwrap());
        assert!(!store.add_label_impl("bd-l1", "urgent", "a").unwrap());
        assert_eq!(store.get_labels_impl("bd-l1").unwrap(), vec!["urgent"]);
    }

    #[test]
    fn remove_reports_presence() {
        let store = test_store();
        store.add_label_impl("bd-l1", "tag", "a").unwrap();
        assert!(store.remove_label_impl("bd-l1", "tag", "a").unwrap());
        assert!(!store.remove_label_impl("bd-l1", "tag", "a").unwrap());
    }

    #[test]
    fn labels_come_back_sorted() {
        let store = test_store();
        for label in ["zeta", "alpha", "mid"] {
            store.add_label_impl("bd-l1", label, "a").unwrap();
        }
        assert_eq!(
            store.get_labels_impl("bd-l1").unwrap(),
            vec!["alpha", "mid", "zeta"]
        );
    }

    #[test]
    fn missing_issue_rejected() {
        let store = test_store();
        assert!(store.add_label_impl("bd-ghost", "x", "a").is_err());
    }

    #[test]
    fn batch_lookup() {
        let store = test_store();
        store
            .create_issue_impl(&IssueBuilder::new("Y").id("bd-l2").build(), "a")
            .unwrap();
        store.add_label_impl("bd-l1", "one", "a").unwrap();
        store.add_label_impl("bd-l2", "two", "a").unwrap();

        let map = store
            .get_labels_for_issues_impl(&["bd-l1".into(), "bd-l2".into()])
            .unwrap();
        assert_eq!(map["bd-l1"], vec!["one"]);
        assert_eq!(map["bd-l2"], vec!["two"]);
    }
}
