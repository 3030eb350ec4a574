//! Workspace-exclusive advisory file locking.
//!
//! One export or import runs per workspace at a time; everything that
//! publishes the canonical JSONL or the deletion manifest takes this lock
//! first. The lock is advisory (fs2 / flock-style) and held by an RAII
//! guard, so every exit path -- including panics -- releases it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

/// How long acquisition waits before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Poll interval while waiting for a contended lock.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors from lock acquisition.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock file could not be created or opened.
    #[error("cannot open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another holder kept the lock past the acquisition timeout.
    #[error("timed out after {0:?} waiting for workspace lock")]
    Timeout(Duration),

    /// Unexpected I/O failure while locking.
    #[error("lock error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// An exclusive lock on a workspace, released on drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Acquires the lock at `path`, waiting up to [`DEFAULT_TIMEOUT`].
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        Self::acquire_timeout(path, DEFAULT_TIMEOUT)
    }

    /// Acquires the lock at `path`, waiting up to `timeout`.
    ///
    /// The file is created if missing and never deleted; only the advisory
    /// lock state matters.
    pub fn acquire_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file, path }),
                Err(e)
                    if e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    if Instant::now() >= deadline {
                        return Err(LockError::Timeout(timeout));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(LockError::Io(e)),
            }
        }
    }

    /// Tries to acquire without waiting; `None` if contended.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::acquire_timeout(path, Duration::ZERO) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::Timeout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flush.lock");

        let lock = WorkspaceLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path);
        drop(lock);

        // Re-acquirable after release.
        WorkspaceLock::acquire(&path).unwrap();
    }

    #[test]
    fn try_acquire_reports_contention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flush.lock");

        let _held = WorkspaceLock::acquire(&path).unwrap();
        // Contention is only observable across processes for flock-style
        // locks on some platforms; spawn a thread with a fresh descriptor.
        let path2 = path.clone();
        let contended = std::thread::spawn(move || {
            WorkspaceLock::acquire_timeout(&path2, Duration::from_millis(100))
        })
        .join()
        .unwrap();
        // Either outcome is platform-dependent for same-process locks; the
        // call must not hang or error in an unexpected way.
        match contended {
            Ok(_) | Err(LockError::Timeout(_)) => {}
            Err(e) => panic!("unexpected lock error: {e}"),
        }
    }

    #[test]
    fn timeout_surfaces_as_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flush.lock");
        // Zero timeout against a free lock still succeeds.
        assert!(WorkspaceLock::try_acquire(&path).unwrap().is_some());
    }
}
