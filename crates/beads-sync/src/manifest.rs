//! The deletion manifest (`deletions.log`).
//!
//! Append-only JSONL of deletion records. A git merge can resurrect a
//! deleted issue through the canonical file; the manifest is how every
//! clone learns the deletion happened and re-tombstones the record. Merged
//! copies of the manifest union by id, keeping the newest `deleted_at`.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::atomic::publish;
use crate::error::{Result, SyncError};

/// One recorded deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRecord {
    pub id: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    pub deleted_at: DateTime<Utc>,
}

impl DeletionRecord {
    /// Creates a record stamped now.
    pub fn new(id: impl Into<String>, actor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            actor: actor.into(),
            reason: reason.into(),
            deleted_at: Utc::now(),
        }
    }
}

/// Handle to a workspace's deletion manifest file.
#[derive(Debug, Clone)]
pub struct DeletionManifest {
    path: PathBuf,
}

impl DeletionManifest {
    /// Opens a manifest at the given path (the file may not exist yet).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The manifest file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the manifest, unioned by id keeping the newest `deleted_at`.
    ///
    /// Malformed lines are skipped with a warning; a merge can leave
    /// conflict markers or torn lines behind and the manifest must still
    /// protect every parseable deletion.
    pub fn load(&self) -> Result<HashMap<String, DeletionRecord>> {
        let mut map = HashMap::new();
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(map),
            Err(e) => return Err(SyncError::io(&self.path, e)),
        };

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| SyncError::io(&self.path, e))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<DeletionRecord>(trimmed) {
                Ok(record) => {
                    map.entry(record.id.clone())
                        .and_modify(|existing: &mut DeletionRecord| {
                            if record.deleted_at > existing.deleted_at {
                                *existing = record.clone();
                            }
                        })
                        .or_insert(record);
                }
                Err(e) => {
                    warn!(path = %self.path.display(), line = line_no + 1, %e,
                        "skipping malformed deletion record");
                }
            }
        }
        Ok(map)
    }

    /// Appends records with `O_APPEND` semantics.
    pub fn append(&self, records: &[DeletionRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| SyncError::io(dir, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SyncError::io(&self.path, e))?;
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())
            .map_err(|e| SyncError::io(&self.path, e))?;
        file.sync_all().map_err(|e| SyncError::io(&self.path, e))?;
        Ok(())
    }

    /// Rewrites the manifest union-by-key, dropping duplicate ids.
    ///
    /// Returns how many records survive.
    pub fn compact(&self) -> Result<usize> {
        let map = self.load()?;
        self.write_all(&map)?;
        Ok(map.len())
    }

    /// Drops records older than `ttl_days` and rewrites.
    ///
    /// A TTL of zero drops everything: the documented escape hatch that
    /// re-allows resurrection through old clones.
    pub fn prune(&self, ttl_days: u64) -> Result<Vec<String>> {
        let map = self.load()?;
        let now = Utc::now();
        let days = i64::try_from(ttl_days).unwrap_or(i64::MAX).min(3_650_000);
        let cutoff = now - chrono::Duration::days(days);

        let (kept, dropped): (HashMap<_, _>, HashMap<_, _>) = map
            .into_iter()
            .partition(|(_, record)| ttl_days != 0 && record.deleted_at >= cutoff);

        self.write_all(&kept)?;
        let mut dropped_ids: Vec<String> = dropped.into_keys().collect();
        dropped_ids.sort();
        Ok(dropped_ids)
    }

    fn write_all(&self, map: &HashMap<String, DeletionRecord>) -> Result<()> {
        let mut records: Vec<&DeletionRecord> = map.values().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        publish(&self.path, buf.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manifest() -> (tempfile::TempDir, DeletionManifest) {
        let dir = tempfile::tempdir().unwrap();
        let m = DeletionManifest::new(dir.path().join("deletions.log"));
        (dir, m)
    }

    #[test]
    fn missing_file_loads_empty() {
        let (_dir, m) = manifest();
        assert!(m.load().unwrap().is_empty());
    }

    #[test]
    fn append_and_load() {
        let (_dir, m) = manifest();
        m.append(&[DeletionRecord::new("bd-a", "alice", "stale")])
            .unwrap();
        m.append(&[DeletionRecord::new("bd-b", "bob", "")]).unwrap();

        let map = m.load().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["bd-a"].actor, "alice");
    }

    #[test]
    fn union_keeps_newest_per_id() {
        let (_dir, m) = manifest();
        let old = DeletionRecord {
            id: "bd-x".into(),
            actor: "old".into(),
            reason: String::new(),
            deleted_at: Utc::now() - chrono::Duration::days(2),
        };
        let new = DeletionRecord {
            id: "bd-x".into(),
            actor: "new".into(),
            reason: String::new(),
            deleted_at: Utc::now(),
        };
        m.append(&[new.clone()]).unwrap();
        m.append(&[old]).unwrap();

        let map = m.load().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["bd-x"].actor, "new");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (_dir, m) = manifest();
        m.append(&[DeletionRecord::new("bd-good", "a", "")]).unwrap();
        let mut file = OpenOptions::new().append(true).open(m.path()).unwrap();
        writeln!(file, "<<<<<<< not json").unwrap();

        let map = m.load().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("bd-good"));
    }

    #[test]
    fn compact_dedupes() {
        let (_dir, m) = manifest();
        let record = DeletionRecord::new("bd-dup", "a", "");
        m.append(&[record.clone()]).unwrap();
        m.append(&[record]).unwrap();

        assert_eq!(m.compact().unwrap(), 1);
        let raw = fs::read_to_string(m.path()).unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[test]
    fn prune_drops_old_records() {
        let (_dir, m) = manifest();
        let old = DeletionRecord {
            id: "bd-old".into(),
            actor: "a".into(),
            reason: String::new(),
            deleted_at: Utc::now() - chrono::Duration::days(45),
        };
        let fresh = DeletionRecord::new("bd-fresh", "a", "");
        m.append(&[old, fresh]).unwrap();

        let dropped = m.prune(30).unwrap();
        assert_eq!(dropped, vec!["bd-old"]);
        let map = m.load().unwrap();
        assert!(map.contains_key("bd-fresh"));
        assert!(!map.contains_key("bd-old"));
    }

    #[test]
    fn prune_zero_ttl_drops_everything() {
        let (_dir, m) = manifest();
        m.append(&[DeletionRecord::new("bd-x", "a", "")]).unwrap();
        let dropped = m.prune(0).unwrap();
        assert_eq!(dropped, vec!["bd-x"]);
        assert!(m.load().unwrap().is_empty());
    }
}
