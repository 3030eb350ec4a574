//! Issue CRUD operations for [`SqliteStore`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use beads_core::enums::{EventType, IssueType, Status};
use beads_core::filter::IssueFilter;
use beads_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::sqlite::store::SqliteStore;
use crate::traits::IssuePatch;

// ---------------------------------------------------------------------------
// Column list (shared between INSERT and SELECT)
// ---------------------------------------------------------------------------

/// All issue columns in a deterministic order for SELECT queries.
pub(crate) const ISSUE_COLUMNS: &str = r#"
    id, content_hash, title, description, design, acceptance_criteria, notes, spec_id,
    status, priority, issue_type,
    assignee, created_by, sender,
    external_ref, source_system,
    created_at, updated_at, closed_at, due_at, defer_until,
    estimated_minutes, close_reason, metadata,
    ephemeral, pinned,
    await_type, timeout_secs, replies_to,
    deleted_at, deleted_by, delete_reason
"#;

// ---------------------------------------------------------------------------
// Row scanning
// ---------------------------------------------------------------------------

/// Deserialises a row into an [`Issue`].
///
/// The column set MUST match [`ISSUE_COLUMNS`].
pub(crate) fn scan_issue(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let status_str: String = row.get("status")?;
    let issue_type_str: String = row.get("issue_type")?;

    let created_at_str: String = row.get("created_at")?;
    let updated_at_str: String = row.get("updated_at")?;
    let closed_at_str: Option<String> = row.get("closed_at")?;
    let due_at_str: Option<String> = row.get("due_at")?;
    let defer_until_str: Option<String> = row.get("defer_until")?;
    let deleted_at_str: Option<String> = row.get("deleted_at")?;

    let ephemeral_int: i32 = row.get("ephemeral")?;
    let pinned_int: i32 = row.get("pinned")?;
    let timeout_secs: Option<i64> = row.get("timeout_secs")?;

    Ok(Issue {
        id: row.get("id")?,
        content_hash: row.get("content_hash")?,
        title: row.get("title")?,
        description: row.get("description")?,
        design: row.get("design")?,
        acceptance_criteria: row.get("acceptance_criteria")?,
        notes: row.get("notes")?,
        spec_id: row.get("spec_id")?,
        status: status_str.parse().unwrap_or(Status::Open),
        priority: row.get("priority")?,
        issue_type: IssueType::from(issue_type_str),
        assignee: row.get("assignee")?,
        created_by: row.get("created_by")?,
        sender: row.get("sender")?,
        external_ref: row.get("external_ref")?,
        source_system: row.get("source_system")?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
        closed_at: closed_at_str.as_deref().map(parse_datetime),
        due_at: due_at_str.as_deref().map(parse_datetime),
        defer_until: defer_until_str.as_deref().map(parse_datetime),
        estimated_minutes: row.get("estimated_minutes")?,
        close_reason: row.get("close_reason")?,
        metadata: row.get("metadata")?,
        ephemeral: ephemeral_int != 0,
        pinned: pinned_int != 0,
        await_type: row.get("await_type")?,
        timeout: timeout_secs
            .filter(|s| *s > 0)
            .map(|s| std::time::Duration::from_secs(s as u64)),
        replies_to: row.get("replies_to")?,
        deleted_at: deleted_at_str.as_deref().map(parse_datetime),
        deleted_by: row.get("deleted_by")?,
        delete_reason: row.get("delete_reason")?,
        // Satellites are hydrated separately.
        labels: Vec::new(),
        dependencies: Vec::new(),
        comments: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Datetime helpers
// ---------------------------------------------------------------------------

/// Formats a `DateTime<Utc>` as ISO 8601 TEXT for SQLite.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Parses an ISO 8601 TEXT string from SQLite into a `DateTime<Utc>`.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>().unwrap_or_else(|_| {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            .map(|ndt| ndt.and_utc())
            .unwrap_or_else(|_| Utc::now())
    })
}

// ---------------------------------------------------------------------------
// Connection-level helpers (shared with Transaction)
// ---------------------------------------------------------------------------

/// Inserts a single issue using the provided connection.
///
/// Fails with [`StorageError::Duplicate`] when the id is taken and with
/// [`StorageError::InvalidType`] when the type is neither builtin nor
/// configured.
pub(crate) fn insert_issue(conn: &Connection, issue: &Issue, actor: &str) -> Result<()> {
    validate_type_on_conn(conn, &issue.issue_type)?;
    insert_issue_raw(conn, issue, actor)
}

/// Inserts without type validation. The import path uses this: a record
/// from a clone with different custom types must still apply.
pub(crate) fn insert_issue_raw(conn: &Connection, issue: &Issue, actor: &str) -> Result<()> {
    if issue.id.is_empty() {
        return Err(StorageError::validation("issue id must be assigned"));
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM issues WHERE id = ?1)",
        params![issue.id],
        |row| row.get(0),
    )?;
    if exists {
        return Err(StorageError::Duplicate {
            id: issue.id.clone(),
        });
    }

    let now_str = format_datetime(&Utc::now());
    let content_hash = issue.compute_content_hash();

    conn.execute(
        &format!(
            "INSERT INTO issues ({ISSUE_COLUMNS}) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?13, ?14,
                ?15, ?16,
                ?17, ?18, ?19, ?20, ?21,
                ?22, ?23, ?24,
                ?25, ?26,
                ?27, ?28, ?29,
                ?30, ?31, ?32
            )"
        ),
        params![
            issue.id,                                              // 1
            content_hash,                                          // 2
            issue.title,                                           // 3
            issue.description,                                     // 4
            issue.design,                                          // 5
            issue.acceptance_criteria,                             // 6
            issue.notes,                                           // 7
            issue.spec_id,                                         // 8
            issue.status.as_str(),                                 // 9
            issue.priority,                                        // 10
            issue.issue_type.as_str(),                             // 11
            issue.assignee,                                        // 12
            issue.created_by,                                      // 13
            issue.sender,                                          // 14
            issue.external_ref,                                    // 15
            issue.source_system,                                   // 16
            format_datetime(&issue.created_at),                    // 17
            format_datetime(&issue.updated_at),                    // 18
            issue.closed_at.as_ref().map(format_datetime),         // 19
            issue.due_at.as_ref().map(format_datetime),            // 20
            issue.defer_until.as_ref().map(format_datetime),       // 21
            issue.estimated_minutes,                               // 22
            issue.close_reason,                                    // 23
            issue.metadata,                                        // 24
            issue.ephemeral as i32,                                // 25
            issue.pinned as i32,                                   // 26
            issue.await_type,                                      // 27
            issue.timeout.map(|d| d.as_secs() as i64),             // 28
            issue.replies_to,                                      // 29
            issue.deleted_at.as_ref().map(format_datetime),        // 30
            issue.deleted_by,                                      // 31
            issue.delete_reason,                                   // 32
        ],
    )?;

    emit_event(conn, &issue.id, EventType::Created, actor, None, None, &now_str)?;
    Ok(())
}

/// Validates an issue type against the builtin set plus the live
/// `types.custom` config row.
pub(crate) fn validate_type_on_conn(conn: &Connection, issue_type: &IssueType) -> Result<()> {
    if issue_type.is_builtin() {
        return Ok(());
    }
    let custom: String = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'types.custom'",
            [],
            |row| row.get(0),
        )
        .unwrap_or_default();
    let configured: Vec<String> = custom
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if issue_type.is_valid_with_custom(&configured) {
        Ok(())
    } else {
        Err(StorageError::InvalidType {
            value: issue_type.as_str().to_owned(),
        })
    }
}

/// Emits an event row into the events table.
pub(crate) fn emit_event(
    conn: &Connection,
    issue_id: &str,
    event_type: EventType,
    actor: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO events (issue_id, event_type, actor, old_value, new_value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![issue_id, event_type.as_str(), actor, old_value, new_value, at],
    )?;
    Ok(())
}

/// Fetches a bare issue row (no satellites) on the given connection.
pub(crate) fn get_issue_row(conn: &Connection, id: &str) -> Result<Issue> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_issue)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("issue", id),
            other => StorageError::Query(other),
        })
}

/// Applies a patch on the given connection, emitting one event per changed
/// field. Returns the updated row.
pub(crate) fn update_issue_on_conn(
    conn: &Connection,
    id: &str,
    patch: &IssuePatch,
    actor: &str,
) -> Result<Issue> {
    let current = get_issue_row(conn, id)?;
    if patch.is_empty() {
        return Ok(current);
    }
    if let Some(ref t) = patch.issue_type {
        validate_type_on_conn(conn, t)?;
    }

    let now = Utc::now();
    let now_str = format_datetime(&now);

    // (column, old, new) for every changed field, applied below in one UPDATE.
    let mut changes: Vec<(&str, String, String)> = Vec::new();
    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1;

    macro_rules! set_col {
        ($col:expr, $old:expr, $new:expr, $sql_value:expr) => {
            if $old != $new {
                changes.push(($col, $old.to_string(), $new.to_string()));
                sets.push(format!("{} = ?{}", $col, idx));
                values.push(Box::new($sql_value));
                idx += 1;
            }
        };
    }

    if let Some(ref v) = patch.title {
        set_col!("title", current.title, *v, v.clone());
    }
    if let Some(ref v) = patch.description {
        set_col!("description", current.description, *v, v.clone());
    }
    if let Some(ref v) = patch.design {
        set_col!("design", current.design, *v, v.clone());
    }
    if let Some(ref v) = patch.acceptance_criteria {
        set_col!(
            "acceptance_criteria",
            current.acceptance_criteria,
            *v,
            v.clone()
        );
    }
    if let Some(ref v) = patch.notes {
        set_col!("notes", current.notes, *v, v.clone());
    }
    if let Some(ref v) = patch.spec_id {
        set_col!("spec_id", current.spec_id, *v, v.clone());
    }
    if let Some(v) = patch.status {
        if current.status != v {
            changes.push(("status", current.status.to_string(), v.to_string()));
            sets.push(format!("status = ?{idx}"));
            values.push(Box::new(v.as_str().to_owned()));
            idx += 1;
            // closed_at is set iff status is closed.
            if v == Status::Closed {
                sets.push(format!("closed_at = ?{idx}"));
                values.push(Box::new(now_str.clone()));
                idx += 1;
            } else if current.status == Status::Closed {
                sets.push("closed_at = NULL".to_string());
            }
        }
    }
    if let Some(v) = patch.priority {
        if !(0..=4).contains(&v) {
            return Err(StorageError::validation(format!(
                "priority must be 0-4, got {v}"
            )));
        }
        set_col!("priority", current.priority, v, v);
    }
    if let Some(ref v) = patch.issue_type {
        set_col!(
            "issue_type",
            current.issue_type.as_str(),
            v.as_str(),
            v.as_str().to_owned()
        );
    }
    if let Some(ref v) = patch.assignee {
        set_col!("assignee", current.assignee, *v, v.clone());
    }
    if let Some(ref v) = patch.sender {
        set_col!("sender", current.sender, *v, v.clone());
    }
    if let Some(ref v) = patch.external_ref {
        let old = current.external_ref.clone().unwrap_or_default();
        let new = v.clone().unwrap_or_default();
        set_col!("external_ref", old, new, v.clone());
    }
    if let Some(ref v) = patch.source_system {
        set_col!("source_system", current.source_system, *v, v.clone());
    }
    if let Some(ref v) = patch.due_at {
        let old = current.due_at.map(|d| format_datetime(&d)).unwrap_or_default();
        let new = v.map(|d| format_datetime(&d)).unwrap_or_default();
        set_col!("due_at", old, new, v.map(|d| format_datetime(&d)));
    }
    if let Some(ref v) = patch.defer_until {
        let old = current
            .defer_until
            .map(|d| format_datetime(&d))
            .unwrap_or_default();
        let new = v.map(|d| format_datetime(&d)).unwrap_or_default();
        set_col!("defer_until", old, new, v.map(|d| format_datetime(&d)));
    }
    if let Some(ref v) = patch.estimated_minutes {
        let old = current.estimated_minutes.unwrap_or_default();
        let new = v.unwrap_or_default();
        set_col!("estimated_minutes", old, new, *v);
    }
    if let Some(ref v) = patch.close_reason {
        set_col!("close_reason", current.close_reason, *v, v.clone());
    }
    if let Some(ref v) = patch.metadata {
        let old = current.metadata.clone().unwrap_or_default();
        let new = v.clone().unwrap_or_default();
        set_col!("metadata", old, new, v.clone());
    }
    if let Some(v) = patch.ephemeral {
        set_col!("ephemeral", current.ephemeral, v, v as i32);
    }
    if let Some(v) = patch.pinned {
        set_col!("pinned", current.pinned, v, v as i32);
    }
    if let Some(ref v) = patch.await_type {
        set_col!("await_type", current.await_type, *v, v.clone());
    }
    if let Some(ref v) = patch.timeout {
        let old = current.timeout.map(|d| d.as_secs()).unwrap_or_default();
        let new = v.map(|d| d.as_secs()).unwrap_or_default();
        set_col!("timeout_secs", old, new, v.map(|d| d.as_secs() as i64));
    }
    if let Some(ref v) = patch.replies_to {
        set_col!("replies_to", current.replies_to, *v, v.clone());
    }

    if changes.is_empty() {
        return Ok(current);
    }

    // updated_at always advances on a real change.
    sets.push(format!("updated_at = ?{idx}"));
    values.push(Box::new(now_str.clone()));
    idx += 1;

    let sql = format!("UPDATE issues SET {} WHERE id = ?{idx}", sets.join(", "));
    values.push(Box::new(id.to_owned()));

    let value_refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&sql, value_refs.as_slice())?;

    for (field, old, new) in &changes {
        let event_type = if *field == "status" {
            EventType::StatusChanged
        } else {
            EventType::Updated
        };
        emit_event(
            conn,
            id,
            event_type,
            actor,
            Some(&format!("{field}={old}")),
            Some(&format!("{field}={new}")),
            &now_str,
        )?;
    }

    // Refresh the content hash to reflect the new scalar state.
    let updated = get_issue_row(conn, id)?;
    conn.execute(
        "UPDATE issues SET content_hash = ?1 WHERE id = ?2",
        params![updated.compute_content_hash(), id],
    )?;

    get_issue_row(conn, id)
}

/// Closes an issue on the given connection.
pub(crate) fn close_issue_on_conn(
    conn: &Connection,
    id: &str,
    reason: &str,
    actor: &str,
) -> Result<()> {
    let current = get_issue_row(conn, id)?;
    if current.status == Status::Closed {
        return Ok(());
    }

    let now_str = format_datetime(&Utc::now());
    conn.execute(
        "UPDATE issues SET status = 'closed', closed_at = ?1, close_reason = ?2, updated_at = ?1
         WHERE id = ?3",
        params![now_str, reason, id],
    )?;
    emit_event(
        conn,
        id,
        EventType::StatusChanged,
        actor,
        Some(current.status.as_str()),
        Some("closed"),
        &now_str,
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Creates a new issue.
    pub fn create_issue_impl(&self, issue: &Issue, actor: &str) -> Result<()> {
        self.retry_on_busy(|conn| insert_issue(conn, issue, actor))
    }

    /// Retrieves a hydrated issue: labels, comments, and every edge touching
    /// it in either direction.
    pub fn get_issue_impl(&self, id: &str) -> Result<Issue> {
        let conn = self.lock_conn()?;
        let mut issue = get_issue_row(&conn, id)?;
        issue.labels = crate::sqlite::labels::get_labels_on_conn(&conn, id)?;
        issue.comments = crate::sqlite::comments::get_comments_on_conn(&conn, id)?;
        issue.dependencies = crate::sqlite::dependencies::get_edges_touching_on_conn(&conn, id)?;
        Ok(issue)
    }

    /// Searches issues by free text and filter, without deep relations.
    pub fn search_issues_impl(&self, query: &str, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;

        let mut where_clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut idx = 1;

        if !filter.include_tombstones {
            where_clauses.push("status != 'tombstone'".to_string());
        }
        if let Some(status) = filter.status {
            where_clauses.push(format!("status = ?{idx}"));
            values.push(Box::new(status.as_str().to_owned()));
            idx += 1;
        }
        if let Some(priority) = filter.priority {
            where_clauses.push(format!("priority = ?{idx}"));
            values.push(Box::new(priority));
            idx += 1;
        }
        if let Some(ref issue_type) = filter.issue_type {
            where_clauses.push(format!("issue_type = ?{idx}"));
            values.push(Box::new(issue_type.as_str().to_owned()));
            idx += 1;
        }
        if let Some(ref assignee) = filter.assignee {
            where_clauses.push(format!("assignee = ?{idx}"));
            values.push(Box::new(assignee.clone()));
            idx += 1;
        }
        if let Some(ephemeral) = filter.ephemeral {
            where_clauses.push(format!("ephemeral = ?{idx}"));
            values.push(Box::new(ephemeral as i32));
            idx += 1;
        }
        if let Some(pinned) = filter.pinned {
            where_clauses.push(format!("pinned = ?{idx}"));
            values.push(Box::new(pinned as i32));
            idx += 1;
        }
        if let Some(closed_before) = filter.closed_before {
            where_clauses.push(format!("closed_at IS NOT NULL AND closed_at < ?{idx}"));
            values.push(Box::new(format_datetime(&closed_before)));
            idx += 1;
        }
        for label in &filter.labels {
            where_clauses.push(format!(
                "EXISTS (SELECT 1 FROM labels WHERE labels.issue_id = issues.id AND labels.label = ?{idx})"
            ));
            values.push(Box::new(label.clone()));
            idx += 1;
        }
        let text = if query.is_empty() {
            filter.text.clone().unwrap_or_default()
        } else {
            query.to_owned()
        };
        if !text.is_empty() {
            where_clauses.push(format!(
                "(title LIKE ?{idx} OR description LIKE ?{idx} OR notes LIKE ?{idx})"
            ));
            values.push(Box::new(format!("%{text}%")));
            idx += 1;
        }

        let where_sql = if where_clauses.is_empty() {
            "1=1".to_string()
        } else {
            where_clauses.join(" AND ")
        };
        let limit_sql = filter
            .limit
            .map(|l| format!(" LIMIT {l}"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE {where_sql}
             ORDER BY priority ASC, created_at ASC, id ASC{limit_sql}"
        );

        let value_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(value_refs.as_slice(), scan_issue)?;

        let mut issues = Vec::new();
        for row in rows {
            issues.push(row?);
        }
        let _ = idx;
        Ok(issues)
    }

    /// Applies partial updates to an issue.
    pub fn update_issue_impl(&self, id: &str, patch: &IssuePatch, actor: &str) -> Result<Issue> {
        self.retry_on_busy(|conn| update_issue_on_conn(conn, id, patch, actor))
    }

    /// Closes an issue.
    pub fn close_issue_impl(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        self.retry_on_busy(|conn| close_issue_on_conn(conn, id, reason, actor))
    }

    /// Reopens a closed issue.
    pub fn reopen_issue_impl(&self, id: &str, actor: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let current = get_issue_row(&conn, id)?;
        if current.status != Status::Closed {
            return Err(StorageError::validation(format!(
                "issue {id} is not closed (status: {})",
                current.status
            )));
        }
        let now_str = format_datetime(&Utc::now());
        conn.execute(
            "UPDATE issues SET status = 'open', closed_at = NULL, close_reason = '', updated_at = ?1
             WHERE id = ?2",
            params![now_str, id],
        )?;
        emit_event(
            &conn,
            id,
            EventType::StatusChanged,
            actor,
            Some("closed"),
            Some("open"),
            &now_str,
        )?;
        Ok(())
    }

    /// Tombstones an issue (optionally cascading to parent-child children)
    /// and strips its satellites in a single transaction.
    ///
    /// Returns every tombstoned id.
    pub fn delete_issue_impl(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        cascade: bool,
    ) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StorageError::Internal(format!("failed to begin: {e}")))?;

        // Confirm the root exists before collecting the cascade set.
        let root = get_issue_row(&tx, id)?;
        if root.status == Status::Tombstone {
            return Ok(Vec::new());
        }

        let mut targets = vec![id.to_owned()];
        if cascade {
            // Children are dependents via parent-child edges (child -> parent).
            let mut frontier = vec![id.to_owned()];
            while let Some(parent) = frontier.pop() {
                let mut stmt = tx.prepare(
                    "SELECT issue_id FROM dependencies
                     WHERE depends_on_id = ?1 AND type = 'parent-child'",
                )?;
                let children: Vec<String> = stmt
                    .query_map(params![parent], |row| row.get(0))?
                    .filter_map(|r| r.ok())
                    .collect();
                for child in children {
                    if !targets.contains(&child) {
                        targets.push(child.clone());
                        frontier.push(child);
                    }
                }
            }
        }

        let now = Utc::now();
        let now_str = format_datetime(&now);
        for target in &targets {
            tx.execute("DELETE FROM labels WHERE issue_id = ?1", params![target])?;
            tx.execute("DELETE FROM comments WHERE issue_id = ?1", params![target])?;
            tx.execute("DELETE FROM events WHERE issue_id = ?1", params![target])?;
            tx.execute(
                "DELETE FROM dependencies WHERE issue_id = ?1 OR depends_on_id = ?1",
                params![target],
            )?;
            tx.execute(
                "UPDATE issues SET status = 'tombstone', deleted_at = ?1, deleted_by = ?2,
                        delete_reason = ?3, updated_at = ?1
                 WHERE id = ?4",
                params![now_str, actor, reason, target],
            )?;
        }

        tx.commit()
            .map_err(|e| StorageError::Internal(format!("failed to commit: {e}")))?;
        Ok(targets)
    }

    /// Renames an issue, rewriting every inbound reference atomically.
    pub fn rename_issue_impl(&self, old_id: &str, new_id: &str, actor: &str) -> Result<()> {
        if old_id == new_id {
            return Ok(());
        }
        let conn = self.lock_conn()?;

        get_issue_row(&conn, old_id)?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM issues WHERE id = ?1)",
            params![new_id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StorageError::Duplicate {
                id: new_id.to_owned(),
            });
        }

        // Child tables reference issues(id); defer enforcement until commit
        // so the rewrite order does not matter.
        conn.execute_batch("PRAGMA defer_foreign_keys = ON;")?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StorageError::Internal(format!("failed to begin: {e}")))?;

        let now_str = format_datetime(&Utc::now());
        tx.execute(
            "UPDATE issues SET id = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_id, now_str, old_id],
        )?;
        tx.execute(
            "UPDATE labels SET issue_id = ?1 WHERE issue_id = ?2",
            params![new_id, old_id],
        )?;
        tx.execute(
            "UPDATE comments SET issue_id = ?1 WHERE issue_id = ?2",
            params![new_id, old_id],
        )?;
        tx.execute(
            "UPDATE events SET issue_id = ?1 WHERE issue_id = ?2",
            params![new_id, old_id],
        )?;
        tx.execute(
            "UPDATE dependencies SET issue_id = ?1 WHERE issue_id = ?2",
            params![new_id, old_id],
        )?;
        tx.execute(
            "UPDATE dependencies SET depends_on_id = ?1 WHERE depends_on_id = ?2",
            params![new_id, old_id],
        )?;
        tx.execute(
            "UPDATE issues SET replies_to = ?1 WHERE replies_to = ?2",
            params![new_id, old_id],
        )?;
        emit_event(
            &tx,
            new_id,
            EventType::Renamed,
            actor,
            Some(old_id),
            Some(new_id),
            &now_str,
        )?;

        tx.commit()
            .map_err(|e| StorageError::Internal(format!("failed to commit: {e}")))?;
        Ok(())
    }

    /// Returns `true` if an issue row with this id exists (any status).
    pub fn id_exists_impl(&self, id: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM issues WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Returns every issue id, sorted.
    pub fn all_ids_impl(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT id FROM issues ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Returns every issue hydrated with labels, outgoing edges and comments,
    /// sorted by id, for the projector.
    pub fn get_issues_for_export_impl(&self) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], scan_issue)?;

        let mut issues = Vec::new();
        for row in rows {
            let mut issue: Issue = row?;
            issue.labels = crate::sqlite::labels::get_labels_on_conn(&conn, &issue.id)?;
            issue.comments = crate::sqlite::comments::get_comments_on_conn(&conn, &issue.id)?;
            issue.dependencies =
                crate::sqlite::dependencies::get_outgoing_edges_on_conn(&conn, &issue.id)?;
            issues.push(issue);
        }
        Ok(issues)
    }

    /// Deletes tombstone rows older than `older_than_days`.
    pub fn prune_tombstones_impl(&self, older_than_days: u64) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let days = i64::try_from(older_than_days).unwrap_or(i64::MAX).min(3_650_000);
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let cutoff_str = format_datetime(&cutoff);

        let mut stmt = conn.prepare(
            "SELECT id FROM issues
             WHERE status = 'tombstone' AND pinned = 0
               AND COALESCE(deleted_at, updated_at) < ?1",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![cutoff_str], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        for id in &ids {
            conn.execute("DELETE FROM issues WHERE id = ?1", params![id])?;
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use pretty_assertions::assert_eq;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_and_get() {
        let store = test_store();
        let issue = IssueBuilder::new("Hello").id("bd-ab12").priority(1).build();
        store.create_issue_impl(&issue, "alice").unwrap();

        let got = store.get_issue_impl("bd-ab12").unwrap();
        assert_eq!(got.title, "Hello");
        assert_eq!(got.priority, 1);
        assert!(!got.content_hash.is_empty());
    }

    #[test]
    fn create_duplicate_fails() {
        let store = test_store();
        let issue = IssueBuilder::new("One").id("bd-dup1").build();
        store.create_issue_impl(&issue, "alice").unwrap();
        let err = store.create_issue_impl(&issue, "alice").unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { .. }));
    }

    #[test]
    fn create_unknown_custom_type_fails() {
        let store = test_store();
        let issue = IssueBuilder::new("X")
            .id("bd-ct1")
            .issue_type(IssueType::Custom("gate".into()))
            .build();
        let err = store.create_issue_impl(&issue, "alice").unwrap_err();
        assert!(matches!(err, StorageError::InvalidType { .. }));

        // Configuring the type makes it valid without reopening the store.
        store.set_config_impl("types.custom", "gate").unwrap();
        let issue2 = IssueBuilder::new("Y")
            .id("bd-ct2")
            .issue_type(IssueType::Custom("gate".into()))
            .build();
        store.create_issue_impl(&issue2, "alice").unwrap();
    }

    #[test]
    fn update_bumps_updated_at_and_emits_events() {
        let store = test_store();
        let issue = IssueBuilder::new("Before").id("bd-up1").build();
        store.create_issue_impl(&issue, "alice").unwrap();
        let before = store.get_issue_impl("bd-up1").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let patch = IssuePatch {
            title: Some("After".into()),
            priority: Some(0),
            ..Default::default()
        };
        let updated = store.update_issue_impl("bd-up1", &patch, "bob").unwrap();
        assert_eq!(updated.title, "After");
        assert_eq!(updated.priority, 0);
        assert!(updated.updated_at > before.updated_at);

        let events = store.get_events_impl("bd-up1", 10).unwrap();
        // created + title + priority
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn update_invalid_priority_rejected() {
        let store = test_store();
        let issue = IssueBuilder::new("X").id("bd-pr1").build();
        store.create_issue_impl(&issue, "alice").unwrap();
        let patch = IssuePatch {
            priority: Some(9),
            ..Default::default()
        };
        assert!(store.update_issue_impl("bd-pr1", &patch, "alice").is_err());
    }

    #[test]
    fn close_sets_closed_at_and_reopen_clears() {
        let store = test_store();
        let issue = IssueBuilder::new("X").id("bd-cl1").build();
        store.create_issue_impl(&issue, "alice").unwrap();

        store.close_issue_impl("bd-cl1", "done", "alice").unwrap();
        let closed = store.get_issue_impl("bd-cl1").unwrap();
        assert_eq!(closed.status, Status::Closed);
        assert!(closed.closed_at.is_some());
        assert_eq!(closed.close_reason, "done");

        store.reopen_issue_impl("bd-cl1", "alice").unwrap();
        let reopened = store.get_issue_impl("bd-cl1").unwrap();
        assert_eq!(reopened.status, Status::Open);
        assert!(reopened.closed_at.is_none());
    }

    #[test]
    fn status_patch_maintains_closed_at_invariant() {
        let store = test_store();
        let issue = IssueBuilder::new("X").id("bd-st9").build();
        store.create_issue_impl(&issue, "alice").unwrap();

        let close = IssuePatch {
            status: Some(Status::Closed),
            ..Default::default()
        };
        store.update_issue_impl("bd-st9", &close, "alice").unwrap();
        assert!(store.get_issue_impl("bd-st9").unwrap().closed_at.is_some());

        let open = IssuePatch {
            status: Some(Status::Open),
            ..Default::default()
        };
        store.update_issue_impl("bd-st9", &open, "alice").unwrap();
        assert!(store.get_issue_impl("bd-st9").unwrap().closed_at.is_none());
    }

    #[test]
    fn delete_tombstones_and_strips_satellites() {
        let store = test_store();
        let a = IssueBuilder::new("A").id("bd-da1").build();
        let b = IssueBuilder::new("B").id("bd-db1").build();
        store.create_issue_impl(&a, "alice").unwrap();
        store.create_issue_impl(&b, "alice").unwrap();
        store.add_label_impl("bd-da1", "keep", "alice").unwrap();
        store.add_comment_impl("bd-da1", "alice", "hi").unwrap();
        let dep = beads_core::dependency::Dependency::new(
            "bd-db1",
            "bd-da1",
            beads_core::enums::DependencyType::Blocks,
            "alice",
        );
        store.add_dependency_impl(&dep, "alice").unwrap();

        let deleted = store
            .delete_issue_impl("bd-da1", "alice", "obsolete", false)
            .unwrap();
        assert_eq!(deleted, vec!["bd-da1"]);

        let tomb = store.get_issue_impl("bd-da1").unwrap();
        assert_eq!(tomb.status, Status::Tombstone);
        assert!(tomb.labels.is_empty());
        assert!(tomb.comments.is_empty());
        assert!(tomb.dependencies.is_empty());

        // No surviving issue's edges mention the deleted id.
        let b_after = store.get_issue_impl("bd-db1").unwrap();
        assert!(b_after.dependencies.iter().all(|d| !d.touches("bd-da1")));
    }

    #[test]
    fn delete_cascades_to_children() {
        let store = test_store();
        let parent = IssueBuilder::new("Parent").id("bd-par1").build();
        let child = IssueBuilder::new("Child").id("bd-par1.1").build();
        store.create_issue_impl(&parent, "alice").unwrap();
        store.create_issue_impl(&child, "alice").unwrap();
        let dep = beads_core::dependency::Dependency::new(
            "bd-par1.1",
            "bd-par1",
            beads_core::enums::DependencyType::ParentChild,
            "alice",
        );
        store.add_dependency_impl(&dep, "alice").unwrap();

        let mut deleted = store
            .delete_issue_impl("bd-par1", "alice", "", true)
            .unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["bd-par1", "bd-par1.1"]);
        assert_eq!(
            store.get_issue_impl("bd-par1.1").unwrap().status,
            Status::Tombstone
        );
    }

    #[test]
    fn rename_rewrites_references() {
        let store = test_store();
        let a = IssueBuilder::new("A").id("bd-old1").build();
        let b = IssueBuilder::new("B").id("bd-ref1").replies_to("bd-old1").build();
        store.create_issue_impl(&a, "alice").unwrap();
        store.create_issue_impl(&b, "alice").unwrap();
        store.add_label_impl("bd-old1", "tag", "alice").unwrap();
        let dep = beads_core::dependency::Dependency::new(
            "bd-ref1",
            "bd-old1",
            beads_core::enums::DependencyType::Blocks,
            "alice",
        );
        store.add_dependency_impl(&dep, "alice").unwrap();

        store.rename_issue_impl("bd-old1", "bd-new1", "alice").unwrap();

        assert!(store.get_issue_impl("bd-old1").is_err());
        let renamed = store.get_issue_impl("bd-new1").unwrap();
        assert_eq!(renamed.labels, vec!["tag"]);

        let b_after = store.get_issue_impl("bd-ref1").unwrap();
        assert_eq!(b_after.replies_to, "bd-new1");
        assert_eq!(b_after.dependencies[0].depends_on_id, "bd-new1");
    }

    #[test]
    fn rename_to_existing_id_fails() {
        let store = test_store();
        store
            .create_issue_impl(&IssueBuilder::new("A").id("bd-x1").build(), "a")
            .unwrap();
        store
            .create_issue_impl(&IssueBuilder::new("B").id("bd-x2").build(), "a")
            .unwrap();
        let err = store.rename_issue_impl("bd-x1", "bd-x2", "a").unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { .. }));
    }

    #[test]
    fn search_excludes_tombstones_by_default() {
        let store = test_store();
        store
            .create_issue_impl(&IssueBuilder::new("Alive").id("bd-al1").build(), "a")
            .unwrap();
        store
            .create_issue_impl(&IssueBuilder::new("Dead").id("bd-de1").build(), "a")
            .unwrap();
        store.delete_issue_impl("bd-de1", "a", "", false).unwrap();

        let found = store
            .search_issues_impl("", &IssueFilter::default())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "bd-al1");

        let with_tombs = store
            .search_issues_impl(
                "",
                &IssueFilter {
                    include_tombstones: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(with_tombs.len(), 2);
    }

    #[test]
    fn prune_tombstones_respects_ttl_and_pinned() {
        let store = test_store();
        store
            .create_issue_impl(&IssueBuilder::new("Old").id("bd-ot1").build(), "a")
            .unwrap();
        store.delete_issue_impl("bd-ot1", "a", "", false).unwrap();

        // Backdate the tombstone.
        {
            let conn = store.lock_conn().unwrap();
            let old = format_datetime(&(Utc::now() - chrono::Duration::days(60)));
            conn.execute(
                "UPDATE issues SET deleted_at = ?1 WHERE id = 'bd-ot1'",
                params![old],
            )
            .unwrap();
        }

        let pruned = store.prune_tombstones_impl(30).unwrap();
        assert_eq!(pruned, vec!["bd-ot1"]);
        assert!(!store.id_exists_impl("bd-ot1").unwrap());
    }
}
