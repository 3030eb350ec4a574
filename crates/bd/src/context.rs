//! Runtime context for command execution.
//!
//! [`CommandContext`] is built once in `main` after CLI parsing and threaded
//! through every handler: resolved workspace, configuration, actor identity
//! and global flags. [`Backend`] is the opened issue store -- daemon-backed
//! or direct -- together with the flush manager and deletion manifest, and
//! guarantees the flush-before-exit contract via [`Backend::finish`].

use std::env;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};

use beads_config::{BeadsConfig, Workspace, load_config};
use beads_daemon::{DaemonClient, DaemonPaths};
use beads_storage::{MemoryStore, SqliteStore, Storage};
use beads_sync::{
    DeletionManifest, ExportOptions, FlushManager, FlushRequest, import_from_path,
};

use crate::cli::GlobalArgs;

/// Environment variable that forces direct (non-daemon) store access.
pub const NO_DAEMON_ENV: &str = "BEADS_NO_DAEMON";

/// Runtime context passed to every command handler.
#[derive(Debug)]
pub struct CommandContext {
    /// The resolved workspace, if one was found.
    pub workspace: Option<Workspace>,

    /// Loaded workspace configuration (defaults when no workspace).
    pub config: BeadsConfig,

    /// Actor name for the audit trail.
    pub actor: String,

    /// Whether to produce JSON output.
    pub json: bool,

    /// Read-only mode: block write operations.
    pub readonly: bool,

    /// JSONL-only mode: no database file.
    pub no_db: bool,

    /// Sandbox mode: never touch the daemon.
    pub sandbox: bool,

    /// Verbose output.
    pub verbose: bool,
}

impl CommandContext {
    /// Builds the context from parsed global arguments.
    pub fn from_global_args(global: &GlobalArgs) -> Self {
        let workspace = match &global.db {
            Some(dir) => Some(Workspace::at(PathBuf::from(dir))),
            None => Workspace::discover_from_cwd(),
        };
        let config = workspace
            .as_ref()
            .and_then(|ws| load_config(ws.root()).ok())
            .unwrap_or_default();

        let actor = resolve_actor(global.actor.as_deref(), config.actor.as_deref());
        let json = global.json || config.json;
        let no_db = global.no_db || config.no_db;

        Self {
            workspace,
            config,
            actor,
            json,
            readonly: global.readonly,
            no_db,
            sandbox: global.sandbox,
            verbose: global.verbose,
        }
    }

    /// The workspace, or a user error telling the caller to run `bd init`.
    pub fn require_workspace(&self) -> Result<&Workspace> {
        self.workspace
            .as_ref()
            .context("no beads workspace found\nhint: run 'bd init' to create one")
    }

    /// Refuses write operations in read-only mode.
    pub fn require_writable(&self) -> Result<()> {
        if self.readonly {
            bail!("workspace opened read-only; drop --readonly to mutate");
        }
        Ok(())
    }

    /// Opens the issue store for this invocation.
    ///
    /// A live daemon wins unless the caller opted out (`BEADS_NO_DAEMON`,
    /// `--sandbox`, daemon disabled in config) or the operation is
    /// ephemeral-only. Without a daemon, the store opens directly and this
    /// process owns flushing.
    pub fn open_backend(&self) -> Result<Backend> {
        self.open_backend_inner(false)
    }

    /// Opens a direct backend even when a daemon is running (ephemeral
    /// operations never touch JSONL, so the daemon's flush ownership is
    /// irrelevant to them).
    pub fn open_backend_bypassing_daemon(&self) -> Result<Backend> {
        self.open_backend_inner(true)
    }

    fn open_backend_inner(&self, bypass_daemon: bool) -> Result<Backend> {
        let workspace = self.require_workspace()?.clone();
        let manifest = DeletionManifest::new(workspace.deletions_path());
        let retention_days = self.config.retention.tombstone_days;
        let options = ExportOptions { retention_days };
        let debounce = Duration::from_millis(self.config.flush.debounce_ms);

        let no_daemon = bypass_daemon
            || self.sandbox
            || !self.config.daemon.enabled
            || env::var(NO_DAEMON_ENV).is_ok_and(|v| !v.is_empty() && v != "0");

        let daemon_paths = DaemonPaths::in_dir(workspace.root());
        let live_daemon = daemon_paths.live_pid().is_some();

        if live_daemon && !no_daemon {
            let client = DaemonClient::new(&daemon_paths.socket_path);
            if client.ping().is_some() {
                return Ok(Backend {
                    store: Arc::new(client),
                    mode: StoreMode::Daemon,
                    flush: None,
                    manifest,
                    workspace,
                });
            }
            // Socket present but dead; fall through to direct mode.
        }
        if live_daemon && no_daemon && !bypass_daemon {
            // Two live read-write holders of the same store are forbidden.
            bail!(
                "a daemon is running for this workspace (pid file present); \
                 stop it with 'bd daemon stop' or drop {NO_DAEMON_ENV}"
            );
        }

        let flush = FlushManager::new(
            workspace.jsonl_path(),
            workspace.lock_path(),
            debounce,
            options,
        );

        let store: Arc<dyn Storage> = if self.no_db {
            // JSONL-only mode: hydrate an in-memory store from the
            // canonical file; finish() projects it back out.
            let store = MemoryStore::new();
            if workspace.jsonl_path().exists() {
                let deletions = manifest.load()?;
                import_from_path(&store, &workspace.jsonl_path(), &deletions)?;
            }
            Arc::new(store)
        } else {
            Arc::new(SqliteStore::open(workspace.db_path())?)
        };

        let backend = Backend {
            store,
            mode: StoreMode::Direct,
            flush: Some(flush),
            manifest,
            workspace,
        };
        // Pick up changes a merge may have landed while no process was
        // watching.
        backend.auto_import()?;
        Ok(backend)
    }
}

/// Whether the store handle belongs to this process or a daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Direct,
    Daemon,
}

/// An opened issue store plus its durability companions.
pub struct Backend {
    store: Arc<dyn Storage>,
    mode: StoreMode,
    flush: Option<FlushManager>,
    manifest: DeletionManifest,
    workspace: Workspace,
}

impl Backend {
    /// The issue store (daemon client or direct backend).
    pub fn store(&self) -> &dyn Storage {
        self.store.as_ref()
    }

    /// The deletion manifest companion file.
    pub fn manifest(&self) -> &DeletionManifest {
        &self.manifest
    }

    /// The workspace this backend is bound to.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Which mode the store opened in.
    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Marks the workspace dirty after a mutation.
    ///
    /// In daemon mode the daemon tracked its own dirty state when it
    /// executed the mutation; nothing to do here.
    pub fn mark_dirty(&self) {
        if let Some(flush) = &self.flush {
            flush.mark_dirty(false);
        }
    }

    /// Re-imports the canonical file if it changed on disk (direct mode).
    pub fn auto_import(&self) -> Result<()> {
        if let Some(flush) = &self.flush {
            flush.maybe_auto_import(self.store.as_ref(), &self.manifest)?;
        }
        Ok(())
    }

    /// Forces a synchronous export regardless of dirty state.
    pub fn flush_now(&self, target: Option<PathBuf>) -> Result<usize> {
        match (&self.flush, self.mode) {
            (Some(flush), _) => {
                let stats = flush.flush_now(
                    self.store.as_ref(),
                    &FlushRequest {
                        force: true,
                        target,
                    },
                )?;
                Ok(stats.map_or(0, |s| s.exported))
            }
            (None, StoreMode::Daemon) => {
                let client = self.daemon_client()?;
                Ok(client.flush(true)?)
            }
            (None, StoreMode::Direct) => unreachable!("direct mode always owns a flush manager"),
        }
    }

    /// Flush-before-exit: every mutating command calls this last.
    ///
    /// Direct mode exports synchronously when dirty; daemon mode already
    /// has the mutation committed and queued on the daemon's debounce
    /// timer, which satisfies the exit contract.
    pub fn finish(&self) -> Result<()> {
        if let Some(flush) = &self.flush {
            flush.shutdown_flush(self.store.as_ref())?;
        }
        Ok(())
    }

    fn daemon_client(&self) -> Result<DaemonClient> {
        let paths = DaemonPaths::in_dir(self.workspace.root());
        Ok(DaemonClient::new(paths.socket_path))
    }
}

/// Resolves an issue id, accepting unique prefixes.
pub fn resolve_id(store: &dyn Storage, input: &str) -> Result<String> {
    if store.id_exists(input)? {
        return Ok(input.to_owned());
    }
    let candidates: Vec<String> = store
        .all_ids()?
        .into_iter()
        .filter(|id| id.starts_with(input))
        .collect();
    match candidates.len() {
        0 => bail!("issue not found: {input}\nhint: check the id with 'bd list'"),
        1 => Ok(candidates.into_iter().next().expect("len checked")),
        _ => bail!(
            "ambiguous id '{input}': matches {}\nhint: provide more characters",
            candidates.join(", ")
        ),
    }
}

/// Resolves the actor name using the priority chain: explicit flag,
/// workspace config, `git config user.name`, `$USER`, `"unknown"`.
fn resolve_actor(flag_value: Option<&str>, config_value: Option<&str>) -> String {
    if let Some(actor) = flag_value {
        if !actor.is_empty() {
            return actor.to_owned();
        }
    }
    if let Some(actor) = config_value {
        if !actor.is_empty() {
            return actor.to_owned();
        }
    }
    if let Ok(output) = Command::new("git").args(["config", "user.name"]).output() {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            if !name.is_empty() {
                return name;
            }
        }
    }
    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        if !user.is_empty() {
            return user;
        }
    }
    "unknown".to_owned()
}
