//! Comment and event operations for [`SqliteStore`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use beads_core::comment::{Comment, Event};
use beads_core::enums::EventType;

use crate::error::{Result, StorageError};
use crate::sqlite::issues::{emit_event, format_datetime, parse_datetime};
use crate::sqlite::store::SqliteStore;

// ---------------------------------------------------------------------------
// Connection-level helpers (shared with Transaction)
// ---------------------------------------------------------------------------

/// Appends a comment with the current timestamp and emits a "commented"
/// event.
pub(crate) fn add_comment_on_conn(
    conn: &Connection,
    issue_id: &str,
    author: &str,
    text: &str,
) -> Result<Comment> {
    let now = Utc::now();
    let comment = insert_comment(conn, issue_id, author, text, now)?;
    emit_event(
        conn,
        issue_id,
        EventType::Commented,
        author,
        None,
        None,
        &format_datetime(&now),
    )?;
    Ok(comment)
}

/// Inserts a comment preserving its original timestamp (import path, no
/// event).
pub(crate) fn import_comment_on_conn(
    conn: &Connection,
    issue_id: &str,
    author: &str,
    text: &str,
    created_at: DateTime<Utc>,
) -> Result<Comment> {
    insert_comment(conn, issue_id, author, text, created_at)
}

fn insert_comment(
    conn: &Connection,
    issue_id: &str,
    author: &str,
    text: &str,
    created_at: DateTime<Utc>,
) -> Result<Comment> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM issues WHERE id = ?1)",
        params![issue_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StorageError::not_found("issue", issue_id));
    }

    conn.execute(
        "INSERT INTO comments (issue_id, author, text, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![issue_id, author, text, format_datetime(&created_at)],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Comment {
        id,
        issue_id: issue_id.to_owned(),
        author: author.to_owned(),
        text: text.to_owned(),
        created_at,
    })
}

/// Returns comments in chronological order with insert-order tiebreak.
pub(crate) fn get_comments_on_conn(conn: &Connection, issue_id: &str) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT id, issue_id, author, text, created_at
         FROM comments WHERE issue_id = ?1
         ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![issue_id], |row| {
        Ok(Comment {
            id: row.get(0)?,
            issue_id: row.get(1)?,
            author: row.get(2)?,
            text: row.get(3)?,
            created_at: parse_datetime(&row.get::<_, String>(4)?),
        })
    })?;
    let mut comments = Vec::new();
    for row in rows {
        comments.push(row?);
    }
    Ok(comments)
}

/// Appends comments that are missing by `(author, created_at)` key (import
/// reconciliation). Returns the number inserted.
pub(crate) fn merge_comments_on_conn(
    conn: &Connection,
    issue_id: &str,
    incoming: &[Comment],
) -> Result<usize> {
    let existing = get_comments_on_conn(conn, issue_id)?;
    let mut inserted = 0;
    for comment in incoming {
        let present = existing.iter().any(|c| c.key() == comment.key());
        if !present {
            insert_comment(conn, issue_id, &comment.author, &comment.text, comment.created_at)?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Adds a comment to an issue.
    pub fn add_comment_impl(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        self.retry_on_busy(|conn| add_comment_on_conn(conn, issue_id, author, text))
    }

    /// Returns all comments for an issue.
    pub fn get_comments_impl(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let conn = self.lock_conn()?;
        get_comments_on_conn(&conn, issue_id)
    }

    /// Returns the most recent events for an issue, newest first.
    pub fn get_events_impl(&self, issue_id: &str, limit: usize) -> Result<Vec<Event>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, issue_id, event_type, actor, old_value, new_value, created_at
             FROM events WHERE issue_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![issue_id, limit as i64], |row| {
            let event_type: String = row.get(2)?;
            Ok(Event {
                id: row.get(0)?,
                issue_id: row.get(1)?,
                event_type: EventType::from(event_type.as_str()),
                actor: row.get(3)?,
                old_value: row.get(4)?,
                new_value: row.get(5)?,
                created_at: parse_datetime(&row.get::<_, String>(6)?),
            })
        })?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}
