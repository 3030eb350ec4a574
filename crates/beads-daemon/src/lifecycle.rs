//! Daemon lifecycle: liveness files, stale-daemon reclaim, shutdown.
//!
//! One daemon runs per workspace. Its pid file is written with exclusive
//! create; a leftover pid file whose process is gone is reclaimed. The
//! socket and pid files are both removed on clean shutdown.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Errors from daemon lifecycle management.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// A live daemon already owns this workspace.
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning { pid: u32 },

    /// Filesystem failure around the liveness files.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Well-known daemon file locations inside the workspace metadata dir.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
}

impl DaemonPaths {
    /// Standard layout under a `.beads` directory.
    pub fn in_dir(beads_dir: &Path) -> Self {
        Self {
            socket_path: beads_dir.join("daemon.sock"),
            pid_path: beads_dir.join("daemon.pid"),
        }
    }

    /// Returns the pid recorded in the pid file, if any.
    pub fn recorded_pid(&self) -> Option<u32> {
        fs::read_to_string(&self.pid_path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Returns the pid of a live daemon, reclaiming stale files.
    pub fn live_pid(&self) -> Option<u32> {
        let pid = self.recorded_pid()?;
        if pid_alive(pid) {
            Some(pid)
        } else {
            warn!(pid, "reclaiming stale daemon files");
            let _ = fs::remove_file(&self.pid_path);
            let _ = fs::remove_file(&self.socket_path);
            None
        }
    }
}

/// Holds the pid file for the daemon's lifetime; removes the liveness
/// files on drop.
#[derive(Debug)]
pub struct PidGuard {
    paths: DaemonPaths,
}

impl PidGuard {
    /// Writes the pid file with exclusive create.
    ///
    /// Fails with [`LifecycleError::AlreadyRunning`] when another live
    /// daemon holds the workspace; stale files are reclaimed first.
    pub fn acquire(paths: &DaemonPaths) -> Result<Self> {
        if let Some(pid) = paths.live_pid() {
            return Err(LifecycleError::AlreadyRunning { pid });
        }
        if let Some(dir) = paths.pid_path.parent() {
            fs::create_dir_all(dir).map_err(|source| LifecycleError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&paths.pid_path)
            .map_err(|source| LifecycleError::Io {
                path: paths.pid_path.clone(),
                source,
            })?;
        write!(file, "{}", std::process::id()).map_err(|source| LifecycleError::Io {
            path: paths.pid_path.clone(),
            source,
        })?;

        info!(pid = std::process::id(), path = %paths.pid_path.display(), "daemon pid recorded");
        Ok(Self {
            paths: paths.clone(),
        })
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.paths.pid_path);
        let _ = fs::remove_file(&self.paths.socket_path);
    }
}

/// OS probe for whether a pid is alive.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    // Linux exposes /proc; elsewhere fall back to a signal-0 probe.
    if Path::new("/proc").is_dir() {
        return Path::new(&format!("/proc/{pid}")).exists();
    }
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    false
}
