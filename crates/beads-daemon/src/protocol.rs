//! RPC protocol between the CLI and the daemon.
//!
//! Messages are JSON with length-prefixed framing: 4 bytes of big-endian
//! message length followed by the payload. The request surface mirrors the
//! [`beads_storage::Storage`] trait plus daemon lifecycle and journal
//! operations, so the client can stand in as a store backend.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use beads_core::comment::{Comment, Event};
use beads_core::dependency::Dependency;
use beads_core::filter::{IssueFilter, WorkFilter};
use beads_core::issue::Issue;
use beads_storage::{BlockedIssue, ImportAction, IssuePatch, Statistics};

use crate::journal::MutationEvent;

/// Request sent from CLI to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Liveness check.
    Ping,
    /// Graceful shutdown (flushes pending state first).
    Shutdown,

    // -- Issue CRUD ----------------------------------------------------------
    Create { issue: Issue, actor: String },
    Get { id: String },
    Search { query: String, filter: IssueFilter },
    Update { id: String, patch: IssuePatch, actor: String },
    Close { id: String, reason: String, actor: String },
    Reopen { id: String, actor: String },
    Delete { id: String, actor: String, reason: String, cascade: bool },
    Rename { old_id: String, new_id: String, actor: String },

    // -- Dependencies --------------------------------------------------------
    DepAdd { dep: Dependency, actor: String },
    DepRemove { issue_id: String, depends_on_id: String, actor: String },
    Dependencies { id: String },
    Dependents { id: String },
    EdgesTouching { id: String },

    // -- Labels --------------------------------------------------------------
    LabelAdd { id: String, label: String, actor: String },
    LabelRemove { id: String, label: String, actor: String },
    Labels { id: String },
    LabelsBatch { ids: Vec<String> },

    // -- Comments and events -------------------------------------------------
    CommentAdd { id: String, author: String, text: String },
    Comments { id: String },
    Events { id: String, limit: usize },

    // -- Work queries --------------------------------------------------------
    Ready { filter: WorkFilter },
    Blocked,

    // -- Config & stats ------------------------------------------------------
    ConfigGet { key: String },
    ConfigSet { key: String, value: String },
    ConfigAll,
    Types,
    Stats,

    // -- Identity ------------------------------------------------------------
    IdExists { id: String },
    AllIds,

    // -- Projection & reconciliation ----------------------------------------
    ExportSnapshot,
    ApplyImport { issue: Issue },
    Tombstone {
        id: String,
        actor: String,
        reason: String,
        deleted_at: DateTime<Utc>,
    },
    PruneTombstones { older_than_days: u64 },

    // -- Flush & journal -----------------------------------------------------
    Flush { force: bool },
    GetMutations { since: DateTime<Utc> },
}

/// Response sent from daemon to CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Pong { pid: u32 },
    ShuttingDown,
    Bool { value: bool },
    Ids { ids: Vec<String> },
    Issue { issue: Box<Issue> },
    Issues { issues: Vec<Issue> },
    Edges { edges: Vec<Dependency> },
    Blocked { blocked: Vec<BlockedIssue> },
    Labels { labels: Vec<String> },
    LabelsBatch { labels: HashMap<String, Vec<String>> },
    Comment { comment: Comment },
    Comments { comments: Vec<Comment> },
    Events { events: Vec<Event> },
    Types { types: Vec<String> },
    Config { value: Option<String> },
    ConfigMap { entries: HashMap<String, String> },
    Stats { stats: Box<Statistics> },
    ImportOutcome { action: ImportAction },
    Flushed { exported: usize },
    Mutations { mutations: Vec<MutationEvent> },
    Error { message: String, user_error: bool },
}

impl Response {
    /// Wraps a storage error, preserving its user/engine classification.
    pub fn from_error(e: &beads_storage::StorageError) -> Self {
        Self::Error {
            message: e.to_string(),
            user_error: e.is_user_error(),
        }
    }
}

/// Message framing: 4-byte big-endian length + JSON payload.
pub mod framing {
    use std::io::{Read, Write};

    use serde::Serialize;
    use serde::de::DeserializeOwned;

    /// Cap on a single message so a torn stream cannot wedge a reader.
    pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

    /// Writes one framed message.
    pub fn write_message<W: Write, T: Serialize>(
        writer: &mut W,
        message: &T,
    ) -> std::io::Result<()> {
        let json = serde_json::to_vec(message)
            .map_err(|e| std::io::Error::other(format!("serialize error: {e}")))?;
        let len =
            u32::try_from(json.len()).map_err(|_| std::io::Error::other("message too large"))?;
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(&json)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads one framed message.
    pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> std::io::Result<T> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(std::io::Error::other(format!(
                "message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"
            )));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        serde_json::from_slice(&buf)
            .map_err(|e| std::io::Error::other(format!("deserialize error: {e}")))
    }
}
