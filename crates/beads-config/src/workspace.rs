//! Workspace layout: the `.beads/` metadata directory and its discovery.

use std::env;
use std::path::{Path, PathBuf};

/// Directory name the engine owns inside a repository.
pub const BEADS_DIR_NAME: &str = ".beads";

/// Environment variable overriding workspace discovery.
pub const BEADS_DIR_ENV: &str = "BEADS_DIR";

/// Resolved paths inside a workspace's `.beads/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Wraps an explicit `.beads` directory path.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the workspace: `$BEADS_DIR` if set, otherwise walk up from
    /// `start` looking for a `.beads` directory.
    pub fn discover(start: &Path) -> Option<Self> {
        if let Ok(dir) = env::var(BEADS_DIR_ENV) {
            if !dir.is_empty() {
                return Some(Self::at(dir));
            }
        }
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(BEADS_DIR_NAME);
            if candidate.is_dir() {
                return Some(Self::at(candidate));
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Resolves from the current directory.
    pub fn discover_from_cwd() -> Option<Self> {
        Self::discover(&env::current_dir().ok()?)
    }

    /// The `.beads` directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `beads.db` -- the store.
    pub fn db_path(&self) -> PathBuf {
        self.root.join("beads.db")
    }

    /// `issues.jsonl` -- the canonical projection.
    pub fn jsonl_path(&self) -> PathBuf {
        self.root.join("issues.jsonl")
    }

    /// `deletions.log` -- the deletion manifest.
    pub fn deletions_path(&self) -> PathBuf {
        self.root.join("deletions.log")
    }

    /// `config.yaml` -- workspace configuration.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    /// `flush.lock` -- the workspace-exclusive export/import lock.
    pub fn lock_path(&self) -> PathBuf {
        self.root.join("flush.lock")
    }

    /// `daemon.sock` -- the daemon's listening socket.
    pub fn daemon_socket_path(&self) -> PathBuf {
        self.root.join("daemon.sock")
    }

    /// `daemon.pid` -- the daemon liveness file.
    pub fn daemon_pid_path(&self) -> PathBuf {
        self.root.join("daemon.pid")
    }

    /// `templates/` -- user-overridable text templates.
    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    /// `hooks/` -- user scripts invoked on events.
    pub fn hooks_dir(&self) -> PathBuf {
        self.root.join("hooks")
    }

    /// Creates the directory skeleton (root, templates/, hooks/).
    pub fn scaffold(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.templates_dir())?;
        std::fs::create_dir_all(self.hooks_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn paths_are_under_root() {
        let ws = Workspace::at("/repo/.beads");
        assert_eq!(ws.db_path(), PathBuf::from("/repo/.beads/beads.db"));
        assert_eq!(ws.jsonl_path(), PathBuf::from("/repo/.beads/issues.jsonl"));
        assert_eq!(
            ws.deletions_path(),
            PathBuf::from("/repo/.beads/deletions.log")
        );
        assert_eq!(
            ws.daemon_socket_path(),
            PathBuf::from("/repo/.beads/daemon.sock")
        );
    }

    #[test]
    fn discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let beads = dir.path().join(BEADS_DIR_NAME);
        std::fs::create_dir_all(&beads).unwrap();
        let nested = dir.path().join("src/deep/inside");
        std::fs::create_dir_all(&nested).unwrap();

        let found = Workspace::discover(&nested).unwrap();
        assert_eq!(found.root(), beads.as_path());
    }

    #[test]
    fn discover_misses_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        // No .beads anywhere beneath a fresh temp root (assuming the temp
        // parent chain has none, which holds in CI sandboxes).
        let found = Workspace::discover(dir.path());
        if let Some(ws) = found {
            assert!(!ws.root().starts_with(dir.path()));
        }
    }

    #[test]
    fn scaffold_creates_skeleton() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::at(dir.path().join(BEADS_DIR_NAME));
        ws.scaffold().unwrap();
        assert!(ws.root().is_dir());
        assert!(ws.templates_dir().is_dir());
        assert!(ws.hooks_dir().is_dir());
    }
}
