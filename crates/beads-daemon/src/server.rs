//! The daemon: owns the store handle, the flush manager and the mutation
//! journal, and serves RPC requests over a UNIX-domain socket.
//!
//! Each accepted connection gets its own thread; the store's internal
//! locking serializes writes, so request handlers stay straight-line code.
//! The accept loop doubles as the flush scheduler: between accepts it
//! services expired debounce deadlines and honors the shutdown flag.

#![cfg(unix)]

use std::io::{BufReader, BufWriter};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use beads_storage::Storage;
use beads_sync::{DeletionManifest, FlushManager, FlushRequest};

use crate::journal::MutationJournal;
use crate::lifecycle::{DaemonPaths, LifecycleError, PidGuard};
use crate::protocol::{Request, Response, framing};

/// Poll interval for the accept/flush loop.
const TICK: Duration = Duration::from_millis(20);

/// Errors from running the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("failed to bind socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sync(#[from] beads_sync::SyncError),
}

/// The long-lived per-workspace daemon.
#[derive(Clone)]
pub struct Daemon {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn Storage>,
    flush: FlushManager,
    manifest: DeletionManifest,
    journal: MutationJournal,
    shutdown: AtomicBool,
}

impl Daemon {
    /// Builds a daemon around an open store.
    pub fn new(store: Arc<dyn Storage>, flush: FlushManager, manifest: DeletionManifest) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                flush,
                manifest,
                journal: MutationJournal::default(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// The mutation journal (observers poll through RPC; tests poke it
    /// directly).
    pub fn journal(&self) -> &MutationJournal {
        &self.inner.journal
    }

    /// Requests a graceful stop; `run` notices within one tick.
    pub fn request_shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once shutdown has been requested.
    pub fn shutting_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Binds the socket, records liveness, and serves until shutdown.
    ///
    /// Pending dirty state is flushed before the liveness files are
    /// removed.
    pub fn run(&self, paths: &DaemonPaths) -> Result<(), ServeError> {
        let _guard = PidGuard::acquire(paths)?;

        let listener =
            UnixListener::bind(&paths.socket_path).map_err(|source| ServeError::Bind {
                path: paths.socket_path.clone(),
                source,
            })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ServeError::Bind {
                path: paths.socket_path.clone(),
                source,
            })?;
        info!(socket = %paths.socket_path.display(), "daemon listening");

        while !self.shutting_down() {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    let daemon = self.clone();
                    std::thread::spawn(move || daemon.serve_connection(stream));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    self.service_flush_deadline();
                    std::thread::sleep(TICK);
                }
                Err(e) => {
                    error!(%e, "accept failed");
                    break;
                }
            }
        }

        info!("daemon shutting down, flushing pending state");
        if let Err(e) = self.inner.flush.shutdown_flush(self.inner.store.as_ref()) {
            warn!(%e, "final flush failed");
        }
        Ok(())
    }

    /// Runs an expired debounce flush, if one is due.
    fn service_flush_deadline(&self) {
        if self.inner.flush.due() {
            if let Err(e) = self
                .inner
                .flush
                .flush_now(self.inner.store.as_ref(), &FlushRequest::default())
            {
                warn!(%e, "scheduled flush failed");
            }
        }
    }

    fn serve_connection(&self, stream: UnixStream) {
        // The listener is non-blocking; per-connection I/O must not be.
        let _ = stream.set_nonblocking(false);
        let _ = stream.set_read_timeout(Some(Duration::from_secs(30)));
        let mut reader = BufReader::new(match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                warn!(%e, "failed to clone connection");
                return;
            }
        });
        let mut writer = BufWriter::new(stream);

        loop {
            let request: Request = match framing::read_message(&mut reader) {
                Ok(request) => request,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return,
                Err(e) => {
                    debug!(%e, "connection read failed");
                    return;
                }
            };

            let response = self.handle(request);
            let closing = matches!(response, Response::ShuttingDown);
            if let Err(e) = framing::write_message(&mut writer, &response) {
                debug!(%e, "connection write failed");
                return;
            }
            if closing {
                return;
            }
        }
    }

    /// Dispatches one request.
    pub fn handle(&self, request: Request) -> Response {
        let store = self.inner.store.as_ref();

        // The pull half of git sync: pick up a merged canonical file before
        // any mutation reads stale state.
        if request_mutates(&request) {
            if let Err(e) = self.inner.flush.maybe_auto_import(store, &self.inner.manifest) {
                warn!(%e, "auto-import before mutation failed");
            }
        }

        match request {
            Request::Ping => Response::Pong {
                pid: std::process::id(),
            },
            Request::Shutdown => {
                self.request_shutdown();
                Response::ShuttingDown
            }

            Request::Create { issue, actor } => match store.create_issue(&issue, &actor) {
                Ok(()) => {
                    self.record("create", &issue.id, &actor, None);
                    Response::Ok
                }
                Err(e) => Response::from_error(&e),
            },
            Request::Get { id } => match store.get_issue(&id) {
                Ok(issue) => Response::Issue {
                    issue: Box::new(issue),
                },
                Err(e) => Response::from_error(&e),
            },
            Request::Search { query, filter } => match store.search_issues(&query, &filter) {
                Ok(issues) => Response::Issues { issues },
                Err(e) => Response::from_error(&e),
            },
            Request::Update { id, patch, actor } => {
                match store.update_issue(&id, &patch, &actor) {
                    Ok(issue) => {
                        self.record("update", &id, &actor, None);
                        Response::Issue {
                            issue: Box::new(issue),
                        }
                    }
                    Err(e) => Response::from_error(&e),
                }
            }
            Request::Close { id, reason, actor } => {
                match store.close_issue(&id, &reason, &actor) {
                    Ok(()) => {
                        self.record("close", &id, &actor, Some(format!("{{\"reason\":{}}}", serde_json::json!(reason))));
                        Response::Ok
                    }
                    Err(e) => Response::from_error(&e),
                }
            }
            Request::Reopen { id, actor } => match store.reopen_issue(&id, &actor) {
                Ok(()) => {
                    self.record("reopen", &id, &actor, None);
                    Response::Ok
                }
                Err(e) => Response::from_error(&e),
            },
            Request::Delete {
                id,
                actor,
                reason,
                cascade,
            } => match store.delete_issue(&id, &actor, &reason, cascade) {
                Ok(ids) => {
                    for deleted in &ids {
                        self.record("delete", deleted, &actor, None);
                    }
                    Response::Ids { ids }
                }
                Err(e) => Response::from_error(&e),
            },
            Request::Rename {
                old_id,
                new_id,
                actor,
            } => match store.rename_issue(&old_id, &new_id, &actor) {
                Ok(()) => {
                    self.record("rename", &new_id, &actor, Some(format!("{{\"from\":{}}}", serde_json::json!(old_id))));
                    Response::Ok
                }
                Err(e) => Response::from_error(&e),
            },

            Request::DepAdd { dep, actor } => match store.add_dependency(&dep, &actor) {
                Ok(()) => {
                    self.record("dep_add", &dep.issue_id, &actor, None);
                    Response::Ok
                }
                Err(e) => Response::from_error(&e),
            },
            Request::DepRemove {
                issue_id,
                depends_on_id,
                actor,
            } => match store.remove_dependency(&issue_id, &depends_on_id, &actor) {
                Ok(()) => {
                    self.record("dep_remove", &issue_id, &actor, None);
                    Response::Ok
                }
                Err(e) => Response::from_error(&e),
            },
            Request::Dependencies { id } => match store.get_dependencies(&id) {
                Ok(issues) => Response::Issues { issues },
                Err(e) => Response::from_error(&e),
            },
            Request::Dependents { id } => match store.get_dependents(&id) {
                Ok(issues) => Response::Issues { issues },
                Err(e) => Response::from_error(&e),
            },
            Request::EdgesTouching { id } => match store.get_edges_touching(&id) {
                Ok(edges) => Response::Edges { edges },
                Err(e) => Response::from_error(&e),
            },

            Request::LabelAdd { id, label, actor } => {
                match store.add_label(&id, &label, &actor) {
                    Ok(value) => {
                        self.record("label_add", &id, &actor, None);
                        Response::Bool { value }
                    }
                    Err(e) => Response::from_error(&e),
                }
            }
            Request::LabelRemove { id, label, actor } => {
                match store.remove_label(&id, &label, &actor) {
                    Ok(value) => {
                        self.record("label_remove", &id, &actor, None);
                        Response::Bool { value }
                    }
                    Err(e) => Response::from_error(&e),
                }
            }
            Request::Labels { id } => match store.get_labels(&id) {
                Ok(labels) => Response::Labels { labels },
                Err(e) => Response::from_error(&e),
            },
            Request::LabelsBatch { ids } => match store.get_labels_for_issues(&ids) {
                Ok(labels) => Response::LabelsBatch { labels },
                Err(e) => Response::from_error(&e),
            },

            Request::CommentAdd { id, author, text } => {
                match store.add_comment(&id, &author, &text) {
                    Ok(comment) => {
                        self.record("comment", &id, &author, None);
                        Response::Comment { comment }
                    }
                    Err(e) => Response::from_error(&e),
                }
            }
            Request::Comments { id } => match store.get_comments(&id) {
                Ok(comments) => Response::Comments { comments },
                Err(e) => Response::from_error(&e),
            },
            Request::Events { id, limit } => match store.get_events(&id, limit) {
                Ok(events) => Response::Events { events },
                Err(e) => Response::from_error(&e),
            },

            Request::Ready { filter } => match store.get_ready_work(&filter) {
                Ok(issues) => Response::Issues { issues },
                Err(e) => Response::from_error(&e),
            },
            Request::Blocked => match store.get_blocked_issues() {
                Ok(blocked) => Response::Blocked { blocked },
                Err(e) => Response::from_error(&e),
            },

            Request::ConfigGet { key } => match store.get_config(&key) {
                Ok(value) => Response::Config { value },
                Err(e) => Response::from_error(&e),
            },
            Request::ConfigSet { key, value } => match store.set_config(&key, &value) {
                Ok(()) => Response::Ok,
                Err(e) => Response::from_error(&e),
            },
            Request::ConfigAll => match store.get_all_config() {
                Ok(entries) => Response::ConfigMap { entries },
                Err(e) => Response::from_error(&e),
            },
            Request::Types => match store.get_custom_types() {
                Ok(types) => Response::Types { types },
                Err(e) => Response::from_error(&e),
            },
            Request::Stats => match store.get_statistics() {
                Ok(stats) => Response::Stats {
                    stats: Box::new(stats),
                },
                Err(e) => Response::from_error(&e),
            },

            Request::IdExists { id } => match store.id_exists(&id) {
                Ok(value) => Response::Bool { value },
                Err(e) => Response::from_error(&e),
            },
            Request::AllIds => match store.all_ids() {
                Ok(ids) => Response::Ids { ids },
                Err(e) => Response::from_error(&e),
            },

            Request::ExportSnapshot => match store.get_issues_for_export() {
                Ok(issues) => Response::Issues { issues },
                Err(e) => Response::from_error(&e),
            },
            Request::ApplyImport { issue } => match store.apply_import_record(&issue) {
                Ok(action) => {
                    self.record("import", &issue.id, "import", None);
                    Response::ImportOutcome { action }
                }
                Err(e) => Response::from_error(&e),
            },
            Request::Tombstone {
                id,
                actor,
                reason,
                deleted_at,
            } => match store.tombstone_issue(&id, &actor, &reason, deleted_at) {
                Ok(value) => {
                    if value {
                        self.record("tombstone", &id, &actor, None);
                    }
                    Response::Bool { value }
                }
                Err(e) => Response::from_error(&e),
            },
            Request::PruneTombstones { older_than_days } => {
                match store.prune_tombstones(older_than_days) {
                    Ok(ids) => Response::Ids { ids },
                    Err(e) => Response::from_error(&e),
                }
            }

            Request::Flush { force } => {
                let request = FlushRequest {
                    force,
                    target: None,
                };
                match self.inner.flush.flush_now(store, &request) {
                    Ok(stats) => Response::Flushed {
                        exported: stats.map_or(0, |s| s.exported),
                    },
                    Err(e) => Response::Error {
                        message: e.to_string(),
                        user_error: false,
                    },
                }
            }
            Request::GetMutations { since } => Response::Mutations {
                mutations: self.inner.journal.get_since(since),
            },
        }
    }

    fn record(&self, kind: &str, issue_id: &str, actor: &str, payload: Option<String>) {
        self.inner.journal.record(kind, issue_id, actor, payload);
        self.inner.flush.mark_dirty(false);
    }
}

/// Whether a request writes to the store (and so needs a fresh view of the
/// canonical file first).
fn request_mutates(request: &Request) -> bool {
    matches!(
        request,
        Request::Create { .. }
            | Request::Update { .. }
            | Request::Close { .. }
            | Request::Reopen { .. }
            | Request::Delete { .. }
            | Request::Rename { .. }
            | Request::DepAdd { .. }
            | Request::DepRemove { .. }
            | Request::LabelAdd { .. }
            | Request::LabelRemove { .. }
            | Request::CommentAdd { .. }
            | Request::ApplyImport { .. }
            | Request::Tombstone { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::MemoryStore;
    use beads_sync::ExportOptions;
    use pretty_assertions::assert_eq;

    fn daemon_in(dir: &std::path::Path) -> Daemon {
        let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        let flush = FlushManager::new(
            dir.join("issues.jsonl"),
            dir.join("flush.lock"),
            Duration::from_millis(50),
            ExportOptions::default(),
        );
        let manifest = DeletionManifest::new(dir.join("deletions.log"));
        Daemon::new(store, flush, manifest)
    }

    #[test]
    fn ping_pongs_with_pid() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = daemon_in(dir.path());
        match daemon.handle(Request::Ping) {
            Response::Pong { pid } => assert_eq!(pid, std::process::id()),
            other => panic!("wrong response: {other:?}"),
        }
    }

    #[test]
    fn create_records_mutation_and_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = daemon_in(dir.path());
        let since = chrono::Utc::now() - chrono::Duration::seconds(1);

        let issue = IssueBuilder::new("Via RPC").id("bd-rpc1").build();
        let response = daemon.handle(Request::Create {
            issue,
            actor: "alice".into(),
        });
        assert!(matches!(response, Response::Ok));

        match daemon.handle(Request::GetMutations { since }) {
            Response::Mutations { mutations } => {
                assert_eq!(mutations.len(), 1);
                assert_eq!(mutations[0].kind, "create");
                assert_eq!(mutations[0].actor, "alice");
            }
            other => panic!("wrong response: {other:?}"),
        }
    }

    #[test]
    fn errors_keep_classification() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = daemon_in(dir.path());
        match daemon.handle(Request::Get {
            id: "bd-missing".into(),
        }) {
            Response::Error {
                user_error,
                message,
            } => {
                assert!(user_error);
                assert!(message.contains("not found"));
            }
            other => panic!("wrong response: {other:?}"),
        }
    }

    #[test]
    fn flush_rpc_exports() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = daemon_in(dir.path());
        daemon.handle(Request::Create {
            issue: IssueBuilder::new("X").id("bd-f1").build(),
            actor: "a".into(),
        });

        match daemon.handle(Request::Flush { force: false }) {
            Response::Flushed { exported } => assert_eq!(exported, 1),
            other => panic!("wrong response: {other:?}"),
        }
        assert!(dir.path().join("issues.jsonl").exists());
    }

    #[test]
    fn shutdown_request_sets_flag() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = daemon_in(dir.path());
        assert!(!daemon.shutting_down());
        assert!(matches!(
            daemon.handle(Request::Shutdown),
            Response::ShuttingDown
        ));
        assert!(daemon.shutting_down());
    }
}
