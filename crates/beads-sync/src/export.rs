//! JSONL export: projecting the store to the canonical file.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use beads_core::enums::{DependencyType, Status};
use beads_core::issue::Issue;
use beads_core::jsonl::to_canonical_line;
use beads_storage::Storage;

use crate::atomic::publish;
use crate::error::{Result, SyncError};

/// Knobs for a single export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Tombstones older than this are omitted from the projection.
    pub retention_days: u64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

/// What an export did.
#[derive(Debug, Clone, Default)]
pub struct ExportStats {
    /// Records written to the file.
    pub exported: usize,
    /// Ephemeral issues left out of the projection.
    pub skipped_ephemeral: usize,
    /// Expired tombstones left out of the projection.
    pub skipped_expired: usize,
    /// SHA-256 over the serialized bytes.
    pub content_hash: String,
}

/// Builds the canonical projection of the store's current state.
///
/// Ephemeral issues and expired tombstones are omitted. Live tombstones are
/// projected bare (no satellites). Parent-child edges are mirrored onto the
/// parent's record so either endpoint alone carries the tree.
pub fn collect_records(store: &dyn Storage, options: &ExportOptions) -> Result<(Vec<Issue>, ExportStats)> {
    let now = Utc::now();
    let mut stats = ExportStats::default();

    let all = store.get_issues_for_export()?;
    let mut records: Vec<Issue> = Vec::with_capacity(all.len());
    for issue in all {
        if issue.ephemeral {
            stats.skipped_ephemeral += 1;
            continue;
        }
        if issue.is_expired_tombstone(options.retention_days, now) {
            stats.skipped_expired += 1;
            continue;
        }
        if issue.status == Status::Tombstone {
            records.push(issue.without_satellites());
        } else {
            records.push(issue);
        }
    }

    // Mirror parent-child edges onto the parent's record.
    let mut mirrored: HashMap<String, Vec<beads_core::dependency::Dependency>> = HashMap::new();
    for issue in &records {
        for dep in &issue.dependencies {
            if dep.dep_type == DependencyType::ParentChild && dep.issue_id == issue.id {
                mirrored
                    .entry(dep.depends_on_id.clone())
                    .or_default()
                    .push(dep.clone());
            }
        }
    }
    for issue in &mut records {
        if let Some(extra) = mirrored.remove(&issue.id) {
            for dep in extra {
                if !issue.dependencies.iter().any(|d| d.key() == dep.key()) {
                    issue.dependencies.push(dep);
                }
            }
        }
    }

    records.sort_by(|a, b| a.id.cmp(&b.id));
    stats.exported = records.len();
    Ok((records, stats))
}

/// Serializes records to the canonical byte form (one sorted-key JSON
/// object per line, trailing newline).
pub fn serialize_records(records: &[Issue]) -> Result<(Vec<u8>, String)> {
    let mut buf = Vec::new();
    let mut hasher = Sha256::new();
    for record in records {
        let line = to_canonical_line(record).map_err(|e| SyncError::Corruption {
            path: std::path::PathBuf::from("<export>"),
            reason: e.to_string(),
        })?;
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    Ok((buf, format!("{:x}", hasher.finalize())))
}

/// Exports the store's state to `path` atomically.
pub fn export_to_path(
    store: &dyn Storage,
    path: &Path,
    options: &ExportOptions,
) -> Result<ExportStats> {
    let (records, mut stats) = collect_records(store, options)?;
    let (bytes, hash) = serialize_records(&records)?;
    publish(path, &bytes)?;
    stats.content_hash = hash;

    info!(
        path = %path.display(),
        exported = stats.exported,
        skipped_ephemeral = stats.skipped_ephemeral,
        skipped_expired = stats.skipped_expired,
        "exported canonical JSONL"
    );
    Ok(stats)
}

/// Exports to an arbitrary writer (e.g. stdout).
pub fn export_to_writer<W: std::io::Write>(
    store: &dyn Storage,
    writer: &mut W,
    options: &ExportOptions,
) -> Result<ExportStats> {
    let (records, mut stats) = collect_records(store, options)?;
    let (bytes, hash) = serialize_records(&records)?;
    writer
        .write_all(&bytes)
        .map_err(|e| SyncError::io("<writer>", e))?;
    stats.content_hash = hash;
    debug!(exported = stats.exported, "exported to writer");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::dependency::Dependency;
    use beads_core::issue::IssueBuilder;
    use beads_storage::{MemoryStore, Storage};
    use pretty_assertions::assert_eq;

    fn store_with(issues: &[Issue]) -> MemoryStore {
        let store = MemoryStore::new();
        for issue in issues {
            store.create_issue(issue, "test").unwrap();
        }
        store
    }

    #[test]
    fn records_sorted_by_id_with_trailing_newline() {
        let store = store_with(&[
            IssueBuilder::new("Z").id("bd-zz").build(),
            IssueBuilder::new("A").id("bd-aa").build(),
        ]);
        let (records, stats) = collect_records(&store, &ExportOptions::default()).unwrap();
        assert_eq!(stats.exported, 2);
        assert_eq!(records[0].id, "bd-aa");
        assert_eq!(records[1].id, "bd-zz");

        let (bytes, _) = serialize_records(&records).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
    }

    #[test]
    fn ephemeral_issues_are_omitted() {
        let store = store_with(&[
            IssueBuilder::new("Keep").id("bd-k1").build(),
            IssueBuilder::new("Wisp").id("bd-w1").ephemeral(true).build(),
        ]);
        let (records, stats) = collect_records(&store, &ExportOptions::default()).unwrap();
        assert_eq!(stats.exported, 1);
        assert_eq!(stats.skipped_ephemeral, 1);
        assert!(records.iter().all(|r| r.id != "bd-w1"));
    }

    #[test]
    fn live_tombstones_projected_bare() {
        let store = store_with(&[IssueBuilder::new("Dead").id("bd-t1").build()]);
        store.add_label("bd-t1", "x", "t").unwrap();
        store.delete_issue("bd-t1", "t", "", false).unwrap();

        let (records, _) = collect_records(&store, &ExportOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Status::Tombstone);
        assert!(records[0].labels.is_empty());
    }

    #[test]
    fn parent_child_edge_appears_on_both_endpoints() {
        let store = store_with(&[
            IssueBuilder::new("Parent").id("bd-p").build(),
            IssueBuilder::new("Child").id("bd-p.1").build(),
        ]);
        store
            .add_dependency(
                &Dependency::new("bd-p.1", "bd-p", DependencyType::ParentChild, "t"),
                "t",
            )
            .unwrap();

        let (records, _) = collect_records(&store, &ExportOptions::default()).unwrap();
        let parent = records.iter().find(|r| r.id == "bd-p").unwrap();
        let child = records.iter().find(|r| r.id == "bd-p.1").unwrap();
        assert_eq!(child.dependencies.len(), 1);
        assert_eq!(parent.dependencies.len(), 1);
        assert_eq!(parent.dependencies[0].issue_id, "bd-p.1");
    }

    #[test]
    fn atomic_export_under_concurrent_readers() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        for i in 0..100 {
            store
                .create_issue(
                    &IssueBuilder::new(format!("Issue {i}"))
                        .id(format!("bd-{i:04}"))
                        .build(),
                    "t",
                )
                .unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("issues.jsonl"));
        export_to_path(store.as_ref(), &path, &ExportOptions::default()).unwrap();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let store = Arc::clone(&store);
            let path = Arc::clone(&path);
            handles.push(std::thread::spawn(move || {
                for _ in 0..20 {
                    export_to_path(store.as_ref(), &path, &ExportOptions::default()).unwrap();
                }
            }));
        }
        for _ in 0..5 {
            let path = Arc::clone(&path);
            handles.push(std::thread::spawn(move || {
                for _ in 0..40 {
                    // Two reads in quick succession; every successful read
                    // must be a complete, parseable file of exactly 100
                    // records ending in a newline.
                    for _ in 0..2 {
                        let bytes = std::fs::read(path.as_path()).unwrap();
                        assert_eq!(bytes.last(), Some(&b'\n'));
                        let count = bytes
                            .split(|b| *b == b'\n')
                            .filter(|line| !line.is_empty())
                            .map(|line| {
                                serde_json::from_slice::<serde_json::Value>(line)
                                    .expect("reader saw a torn line")
                            })
                            .count();
                        assert_eq!(count, 100);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn export_is_deterministic() {
        let store = store_with(&[
            IssueBuilder::new("One").id("bd-1").build(),
            IssueBuilder::new("Two").id("bd-2").build(),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");

        let first = export_to_path(&store, &path, &ExportOptions::default()).unwrap();
        let bytes1 = std::fs::read(&path).unwrap();
        let second = export_to_path(&store, &path, &ExportOptions::default()).unwrap();
        let bytes2 = std::fs::read(&path).unwrap();

        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(bytes1, bytes2);
    }
}
