//! Auto-flush scheduling: dirty tracking, debounce, and auto-import.
//!
//! One manager exists per open workspace (owned by the daemon when running,
//! by the CLI process otherwise). Mutations mark it dirty; the flush either
//! happens on the debounce deadline, immediately for urgent marks, or
//! synchronously at shutdown. Exports serialize across processes through
//! the workspace lock.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info};

use beads_lockfile::WorkspaceLock;
use beads_storage::Storage;

use crate::error::{Result, SyncError};
use crate::export::{ExportOptions, ExportStats, export_to_path};
use crate::import::ImportReport;
use crate::manifest::DeletionManifest;

/// Default debounce window between a mutation and its export.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Observable scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushState {
    /// Uncommitted-to-JSONL mutations exist.
    pub dirty: bool,
    /// When the pending debounce flush is due, if one is scheduled.
    pub pending_deadline: Option<Instant>,
}

/// Parameters for a forced flush.
#[derive(Debug, Clone, Default)]
pub struct FlushRequest {
    /// Export even when the dirty flag is clear.
    pub force: bool,
    /// Write somewhere other than the canonical path.
    pub target: Option<PathBuf>,
}

/// Coordinates exports for one workspace.
pub struct FlushManager {
    jsonl_path: PathBuf,
    lock_path: PathBuf,
    debounce: Duration,
    options: ExportOptions,
    state: Mutex<FlushState>,
    /// Modification time of the canonical file as of our last export or
    /// import; anything newer on disk came from a merge.
    last_seen_mtime: Mutex<Option<SystemTime>>,
}

impl FlushManager {
    /// Creates a manager for the given canonical file and lock file.
    pub fn new(
        jsonl_path: impl Into<PathBuf>,
        lock_path: impl Into<PathBuf>,
        debounce: Duration,
        options: ExportOptions,
    ) -> Self {
        Self {
            jsonl_path: jsonl_path.into(),
            lock_path: lock_path.into(),
            debounce,
            options,
            state: Mutex::new(FlushState {
                dirty: false,
                pending_deadline: None,
            }),
            last_seen_mtime: Mutex::new(None),
        }
    }

    /// The canonical file this manager projects to.
    pub fn jsonl_path(&self) -> &Path {
        &self.jsonl_path
    }

    /// Marks the workspace dirty.
    ///
    /// Urgent marks schedule an immediate flush; otherwise the deadline is
    /// pushed `debounce` into the future, replacing any earlier timer so
    /// bursts of mutations coalesce into one export.
    pub fn mark_dirty(&self, urgent: bool) {
        let mut state = self.state.lock().expect("flush state poisoned");
        state.dirty = true;
        let deadline = if urgent {
            Instant::now()
        } else {
            Instant::now() + self.debounce
        };
        state.pending_deadline = Some(deadline);
        debug!(urgent, "marked dirty");
    }

    /// Snapshot of `(dirty, pending_deadline)`.
    pub fn state(&self) -> FlushState {
        *self.state.lock().expect("flush state poisoned")
    }

    /// Returns `true` if a scheduled flush is due.
    pub fn due(&self) -> bool {
        self.state()
            .pending_deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Performs a synchronous export if dirty (or forced).
    ///
    /// Takes the workspace lock for the duration so only one export is in
    /// flight per workspace. Returns `None` when there was nothing to do.
    pub fn flush_now(
        &self,
        store: &dyn Storage,
        request: &FlushRequest,
    ) -> Result<Option<ExportStats>> {
        {
            let state = self.state.lock().expect("flush state poisoned");
            if !state.dirty && !request.force {
                return Ok(None);
            }
        }

        let _lock = WorkspaceLock::acquire(&self.lock_path)?;
        let target = request.target.as_deref().unwrap_or(&self.jsonl_path);
        let stats = export_to_path(store, target, &self.options)?;

        let mut state = self.state.lock().expect("flush state poisoned");
        state.dirty = false;
        state.pending_deadline = None;
        drop(state);

        if target == self.jsonl_path {
            self.note_file_mtime();
        }
        info!(exported = stats.exported, "flush complete");
        Ok(Some(stats))
    }

    /// Final flush on process exit: exports synchronously iff dirty.
    pub fn shutdown_flush(&self, store: &dyn Storage) -> Result<Option<ExportStats>> {
        self.flush_now(store, &FlushRequest::default())
    }

    /// The "pull" half of git-mediated sync.
    ///
    /// If the canonical file changed on disk since we last wrote or read
    /// it (a merge landed), re-import it before the caller proceeds with a
    /// read-modify-write.
    pub fn maybe_auto_import(
        &self,
        store: &dyn Storage,
        manifest: &DeletionManifest,
    ) -> Result<Option<ImportReport>> {
        let disk_mtime = match std::fs::metadata(&self.jsonl_path) {
            Ok(meta) => meta.modified().map_err(|e| SyncError::io(&self.jsonl_path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::io(&self.jsonl_path, e)),
        };

        {
            let last = self.last_seen_mtime.lock().expect("mtime state poisoned");
            if last.is_some_and(|seen| disk_mtime <= seen) {
                return Ok(None);
            }
        }

        debug!(path = %self.jsonl_path.display(), "canonical file changed, auto-importing");
        let deletions = manifest.load()?;
        let report = crate::import::import_from_path(store, &self.jsonl_path, &deletions)?;
        self.note_file_mtime();
        Ok(Some(report))
    }

    fn note_file_mtime(&self) {
        let mtime = std::fs::metadata(&self.jsonl_path)
            .and_then(|m| m.modified())
            .ok();
        *self.last_seen_mtime.lock().expect("mtime state poisoned") = mtime;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::{MemoryStore, Storage};
    use pretty_assertions::assert_eq;

    fn setup() -> (tempfile::TempDir, FlushManager, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let manager = FlushManager::new(
            dir.path().join("issues.jsonl"),
            dir.path().join("flush.lock"),
            Duration::from_millis(100),
            ExportOptions::default(),
        );
        (dir, manager, MemoryStore::new())
    }

    #[test]
    fn clean_manager_skips_flush() {
        let (_dir, manager, store) = setup();
        assert_eq!(manager.state().dirty, false);
        assert!(manager
            .flush_now(&store, &FlushRequest::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn mark_dirty_schedules_and_flush_clears() {
        let (_dir, manager, store) = setup();
        store
            .create_issue(&IssueBuilder::new("X").id("bd-f1").build(), "t")
            .unwrap();
        manager.mark_dirty(false);

        let state = manager.state();
        assert!(state.dirty);
        assert!(state.pending_deadline.is_some());

        let stats = manager
            .flush_now(&store, &FlushRequest::default())
            .unwrap()
            .unwrap();
        assert_eq!(stats.exported, 1);

        let state = manager.state();
        assert!(!state.dirty);
        assert!(state.pending_deadline.is_none());
        assert!(manager.jsonl_path().exists());
    }

    #[test]
    fn later_mark_replaces_deadline() {
        let (_dir, manager, _store) = setup();
        manager.mark_dirty(false);
        let first = manager.state().pending_deadline.unwrap();
        std::thread::sleep(Duration::from_millis(20));
        manager.mark_dirty(false);
        let second = manager.state().pending_deadline.unwrap();
        assert!(second > first);
    }

    #[test]
    fn urgent_mark_is_immediately_due() {
        let (_dir, manager, _store) = setup();
        manager.mark_dirty(true);
        assert!(manager.due());
    }

    #[test]
    fn forced_flush_exports_clean_state() {
        let (_dir, manager, store) = setup();
        let stats = manager
            .flush_now(
                &store,
                &FlushRequest {
                    force: true,
                    target: None,
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(stats.exported, 0);
        assert!(manager.jsonl_path().exists());
    }

    #[test]
    fn auto_import_fires_once_per_change() {
        let (dir, manager, store) = setup();
        let manifest = DeletionManifest::new(dir.path().join("deletions.log"));

        // Simulate a merge writing the canonical file.
        let incoming = IssueBuilder::new("Merged").id("bd-m1").build();
        let line = beads_core::jsonl::to_canonical_line(&incoming).unwrap();
        std::fs::write(manager.jsonl_path(), format!("{line}\n")).unwrap();

        let report = manager.maybe_auto_import(&store, &manifest).unwrap().unwrap();
        assert_eq!(report.created, 1);
        assert!(store.id_exists("bd-m1").unwrap());

        // Unchanged file does not re-import.
        assert!(manager.maybe_auto_import(&store, &manifest).unwrap().is_none());
    }

    #[test]
    fn own_export_does_not_trigger_auto_import() {
        let (dir, manager, store) = setup();
        let manifest = DeletionManifest::new(dir.path().join("deletions.log"));
        store
            .create_issue(&IssueBuilder::new("Mine").id("bd-o1").build(), "t")
            .unwrap();
        manager.mark_dirty(true);
        manager.flush_now(&store, &FlushRequest::default()).unwrap();

        assert!(manager.maybe_auto_import(&store, &manifest).unwrap().is_none());
    }
}
