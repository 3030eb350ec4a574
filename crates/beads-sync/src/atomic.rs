//! Atomic file publication.
//!
//! Everything the engine publishes (canonical JSONL, manifest rewrites)
//! goes through [`publish`]: write a temp file in the target directory,
//! fsync it, rename over the target, then best-effort fsync the directory.
//! A concurrent reader sees either the old bytes or the new bytes, never a
//! partial file.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, SyncError};

/// Per-process counter so concurrent publishes never share a temp name.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Atomically replaces `path` with `contents`.
pub fn publish(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| SyncError::Corruption {
            path: path.to_path_buf(),
            reason: "target has no parent directory".into(),
        })?;
    fs::create_dir_all(dir).map_err(|e| SyncError::io(dir, e))?;

    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("publish");
    let temp_path = dir.join(format!(
        ".{file_name}.tmp-{}-{seq}",
        std::process::id()
    ));

    let mut file = File::create(&temp_path).map_err(|e| SyncError::io(&temp_path, e))?;
    file.write_all(contents)
        .map_err(|e| SyncError::io(&temp_path, e))?;
    file.sync_all().map_err(|e| SyncError::io(&temp_path, e))?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(SyncError::io(path, e));
    }

    // Durability of the rename itself; failure here does not affect
    // atomicity as observed by readers.
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_creates_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("issues.jsonl");

        publish(&target, b"one\n").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"one\n");

        publish(&target, b"two\n").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two\n");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.jsonl");
        publish(&target, b"data\n").unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn creates_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/deep/out.jsonl");
        publish(&target, b"x\n").unwrap();
        assert!(target.exists());
    }
}
