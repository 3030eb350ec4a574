//! RPC client: the daemon-backed [`Storage`] implementation.
//!
//! The CLI talks to a running daemon through this type; because it
//! implements the same `Storage` trait as the direct backends, command
//! handlers never know which mode they are in. Every call opens a short-
//! lived connection -- UNIX sockets make that cheap and it keeps the
//! client free of connection state.

#![cfg(unix)]

use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use beads_core::comment::{Comment, Event};
use beads_core::dependency::Dependency;
use beads_core::filter::{IssueFilter, WorkFilter};
use beads_core::issue::Issue;
use beads_storage::{
    BlockedIssue, ImportAction, IssuePatch, Result, Statistics, Storage, StorageError, Transaction,
};

use crate::journal::MutationEvent;
use crate::protocol::{Request, Response, framing};

/// I/O timeout on daemon calls.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Client handle bound to a daemon socket path.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Creates a client for the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// The socket this client talks to.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sends one request and reads one response.
    pub fn call(&self, request: &Request) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket_path)
            .map_err(|e| StorageError::DaemonUnavailable(e.to_string()))?;
        stream
            .set_read_timeout(Some(CALL_TIMEOUT))
            .and_then(|()| stream.set_write_timeout(Some(CALL_TIMEOUT)))
            .map_err(|e| StorageError::DaemonUnavailable(e.to_string()))?;

        let mut writer = BufWriter::new(
            stream
                .try_clone()
                .map_err(|e| StorageError::DaemonUnavailable(e.to_string()))?,
        );
        let mut reader = BufReader::new(stream);

        framing::write_message(&mut writer, request)
            .map_err(|e| StorageError::DaemonUnavailable(e.to_string()))?;
        framing::read_message(&mut reader)
            .map_err(|e| StorageError::DaemonUnavailable(e.to_string()))
    }

    /// Liveness probe: `Some(pid)` when a daemon answers.
    pub fn ping(&self) -> Option<u32> {
        match self.call(&Request::Ping) {
            Ok(Response::Pong { pid }) => Some(pid),
            _ => None,
        }
    }

    /// Asks the daemon to flush; returns the exported record count.
    pub fn flush(&self, force: bool) -> Result<usize> {
        match self.call(&Request::Flush { force })? {
            Response::Flushed { exported } => Ok(exported),
            other => Err(unexpected(other)),
        }
    }

    /// Asks the daemon to exit gracefully.
    pub fn shutdown(&self) -> Result<()> {
        match self.call(&Request::Shutdown)? {
            Response::ShuttingDown => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Mutations newer than `since` from the daemon's journal.
    pub fn get_mutations(&self, since: DateTime<Utc>) -> Result<Vec<MutationEvent>> {
        match self.call(&Request::GetMutations { since })? {
            Response::Mutations { mutations } => Ok(mutations),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> StorageError {
    match response {
        Response::Error {
            message,
            user_error,
        } => StorageError::Remote {
            message,
            user_error,
        },
        other => StorageError::Internal(format!("unexpected daemon response: {other:?}")),
    }
}

macro_rules! expect {
    ($self:expr, $request:expr, $variant:ident { $($field:ident),+ } => $out:expr) => {
        match $self.call(&$request)? {
            Response::$variant { $($field),+ } => Ok($out),
            other => Err(unexpected(other)),
        }
    };
}

impl Storage for DaemonClient {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        match self.call(&Request::Create {
            issue: issue.clone(),
            actor: actor.to_owned(),
        })? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        expect!(self, Request::Get { id: id.to_owned() }, Issue { issue } => *issue)
    }

    fn search_issues(&self, query: &str, filter: &IssueFilter) -> Result<Vec<Issue>> {
        expect!(
            self,
            Request::Search {
                query: query.to_owned(),
                filter: filter.clone(),
            },
            Issues { issues } => issues
        )
    }

    fn update_issue(&self, id: &str, patch: &IssuePatch, actor: &str) -> Result<Issue> {
        expect!(
            self,
            Request::Update {
                id: id.to_owned(),
                patch: patch.clone(),
                actor: actor.to_owned(),
            },
            Issue { issue } => *issue
        )
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        match self.call(&Request::Close {
            id: id.to_owned(),
            reason: reason.to_owned(),
            actor: actor.to_owned(),
        })? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn reopen_issue(&self, id: &str, actor: &str) -> Result<()> {
        match self.call(&Request::Reopen {
            id: id.to_owned(),
            actor: actor.to_owned(),
        })? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn delete_issue(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        cascade: bool,
    ) -> Result<Vec<String>> {
        expect!(
            self,
            Request::Delete {
                id: id.to_owned(),
                actor: actor.to_owned(),
                reason: reason.to_owned(),
                cascade,
            },
            Ids { ids } => ids
        )
    }

    fn rename_issue(&self, old_id: &str, new_id: &str, actor: &str) -> Result<()> {
        match self.call(&Request::Rename {
            old_id: old_id.to_owned(),
            new_id: new_id.to_owned(),
            actor: actor.to_owned(),
        })? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        match self.call(&Request::DepAdd {
            dep: dep.clone(),
            actor: actor.to_owned(),
        })? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()> {
        match self.call(&Request::DepRemove {
            issue_id: issue_id.to_owned(),
            depends_on_id: depends_on_id.to_owned(),
            actor: actor.to_owned(),
        })? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>> {
        expect!(self, Request::Dependencies { id: issue_id.to_owned() }, Issues { issues } => issues)
    }

    fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>> {
        expect!(self, Request::Dependents { id: issue_id.to_owned() }, Issues { issues } => issues)
    }

    fn get_edges_touching(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        expect!(self, Request::EdgesTouching { id: issue_id.to_owned() }, Edges { edges } => edges)
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        expect!(
            self,
            Request::LabelAdd {
                id: issue_id.to_owned(),
                label: label.to_owned(),
                actor: actor.to_owned(),
            },
            Bool { value } => value
        )
    }

    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        expect!(
            self,
            Request::LabelRemove {
                id: issue_id.to_owned(),
                label: label.to_owned(),
                actor: actor.to_owned(),
            },
            Bool { value } => value
        )
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        expect!(self, Request::Labels { id: issue_id.to_owned() }, Labels { labels } => labels)
    }

    fn get_labels_for_issues(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        expect!(
            self,
            Request::LabelsBatch { ids: ids.to_vec() },
            LabelsBatch { labels } => labels
        )
    }

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        expect!(
            self,
            Request::CommentAdd {
                id: issue_id.to_owned(),
                author: author.to_owned(),
                text: text.to_owned(),
            },
            Comment { comment } => comment
        )
    }

    fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        expect!(self, Request::Comments { id: issue_id.to_owned() }, Comments { comments } => comments)
    }

    fn get_events(&self, issue_id: &str, limit: usize) -> Result<Vec<Event>> {
        expect!(
            self,
            Request::Events {
                id: issue_id.to_owned(),
                limit,
            },
            Events { events } => events
        )
    }

    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>> {
        expect!(
            self,
            Request::Ready {
                filter: filter.clone(),
            },
            Issues { issues } => issues
        )
    }

    fn get_blocked_issues(&self) -> Result<Vec<BlockedIssue>> {
        expect!(self, Request::Blocked, Blocked { blocked } => blocked)
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        expect!(self, Request::ConfigGet { key: key.to_owned() }, Config { value } => value)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        match self.call(&Request::ConfigSet {
            key: key.to_owned(),
            value: value.to_owned(),
        })? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn get_all_config(&self) -> Result<HashMap<String, String>> {
        expect!(self, Request::ConfigAll, ConfigMap { entries } => entries)
    }

    fn get_custom_types(&self) -> Result<Vec<String>> {
        expect!(self, Request::Types, Types { types } => types)
    }

    fn get_statistics(&self) -> Result<Statistics> {
        expect!(self, Request::Stats, Stats { stats } => *stats)
    }

    fn id_exists(&self, id: &str) -> Result<bool> {
        expect!(self, Request::IdExists { id: id.to_owned() }, Bool { value } => value)
    }

    fn all_ids(&self) -> Result<Vec<String>> {
        expect!(self, Request::AllIds, Ids { ids } => ids)
    }

    fn get_issues_for_export(&self) -> Result<Vec<Issue>> {
        expect!(self, Request::ExportSnapshot, Issues { issues } => issues)
    }

    fn apply_import_record(&self, incoming: &Issue) -> Result<ImportAction> {
        expect!(
            self,
            Request::ApplyImport {
                issue: incoming.clone(),
            },
            ImportOutcome { action } => action
        )
    }

    fn tombstone_issue(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool> {
        expect!(
            self,
            Request::Tombstone {
                id: id.to_owned(),
                actor: actor.to_owned(),
                reason: reason.to_owned(),
                deleted_at,
            },
            Bool { value } => value
        )
    }

    fn prune_tombstones(&self, older_than_days: u64) -> Result<Vec<String>> {
        expect!(
            self,
            Request::PruneTombstones { older_than_days },
            Ids { ids } => ids
        )
    }

    fn run_in_transaction(&self, _f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()> {
        // Closures cannot cross the RPC boundary; callers needing batch
        // atomicity use direct mode.
        Err(StorageError::Internal(
            "transactions are not available over the daemon RPC".into(),
        ))
    }
}
