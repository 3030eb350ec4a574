//! Three-way merge driver for the canonical JSONL file.
//!
//! Git hands us base, local and remote versions of `issues.jsonl`; we merge
//! by logical record (issue id), not by text line. Timestamps pick winners,
//! equal-timestamp divergence merges field-by-field against base, and the
//! deletion manifest tombstones anything it postdates.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use beads_core::issue::Issue;
use beads_core::jsonl::read_jsonl;

use crate::error::{Result, SyncError};
use crate::manifest::DeletionRecord;

/// Satellite keys that always union instead of conflicting.
const UNION_KEYS: &[&str] = &["labels", "comments", "dependencies"];

/// A scalar field that diverged on both sides with equal timestamps.
#[derive(Debug, Clone)]
pub struct MergeConflict {
    pub id: String,
    pub field: String,
}

/// Result of a three-way merge.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Surviving records, canonically sorted.
    pub merged: Vec<Issue>,
    /// Fields that could not be auto-resolved (kept local, noted in a
    /// synthetic comment on the record).
    pub conflicts: Vec<MergeConflict>,
    /// Ids the deletion manifest forced to tombstone.
    pub tombstoned: Vec<String>,
}

impl MergeOutcome {
    /// True when every record resolved cleanly.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Parses a JSONL file into an id-keyed map. Strict: a malformed line is a
/// [`SyncError::Corruption`] because silently dropping records in a merge
/// loses data.
fn parse_map(path: &Path) -> Result<HashMap<String, Issue>> {
    let file = File::open(path).map_err(|e| SyncError::io(path, e))?;
    let mut map = HashMap::new();
    for (line_no, parsed) in read_jsonl(BufReader::new(file)) {
        let issue = parsed.map_err(|e| SyncError::Corruption {
            path: path.to_path_buf(),
            reason: format!("line {line_no}: {e}"),
        })?;
        map.insert(issue.id.clone(), issue);
    }
    Ok(map)
}

/// Merges the three versions of the canonical file.
pub fn merge_files(
    base_path: &Path,
    local_path: &Path,
    remote_path: &Path,
    deletions: &HashMap<String, DeletionRecord>,
) -> Result<MergeOutcome> {
    let base = parse_map(base_path)?;
    let local = parse_map(local_path)?;
    let remote = parse_map(remote_path)?;

    let mut ids: BTreeSet<String> = BTreeSet::new();
    ids.extend(base.keys().cloned());
    ids.extend(local.keys().cloned());
    ids.extend(remote.keys().cloned());

    let mut outcome = MergeOutcome::default();
    for id in ids {
        let resolved = merge_record(
            base.get(&id),
            local.get(&id),
            remote.get(&id),
            &mut outcome.conflicts,
        )?;
        let Some(mut record) = resolved else {
            continue;
        };

        // The manifest wins over anything it postdates.
        if let Some(deletion) = deletions.get(&id) {
            if deletion.deleted_at > record.updated_at {
                record = tombstone_record(record, deletion);
                outcome.tombstoned.push(id.clone());
            }
        }
        outcome.merged.push(record);
    }

    outcome.merged.sort_by(|a, b| a.id.cmp(&b.id));
    info!(
        records = outcome.merged.len(),
        conflicts = outcome.conflicts.len(),
        tombstoned = outcome.tombstoned.len(),
        "merge resolved"
    );
    Ok(outcome)
}

/// Resolves one id across the three sides. `None` means the record is
/// dropped from the merged file.
fn merge_record(
    base: Option<&Issue>,
    local: Option<&Issue>,
    remote: Option<&Issue>,
    conflicts: &mut Vec<MergeConflict>,
) -> Result<Option<Issue>> {
    match (base, local, remote) {
        (_, None, None) => Ok(None),

        // Added on exactly one side.
        (None, Some(l), None) => Ok(Some(l.clone())),
        (None, None, Some(r)) => Ok(Some(r.clone())),

        // Deleted on one side: survives only if the other side touched it
        // after the base.
        (Some(b), Some(l), None) => Ok((l.updated_at > b.updated_at).then(|| l.clone())),
        (Some(b), None, Some(r)) => Ok((r.updated_at > b.updated_at).then(|| r.clone())),

        // Present on both sides.
        (b, Some(l), Some(r)) => {
            if l == r {
                return Ok(Some(l.clone()));
            }
            if l.updated_at > r.updated_at {
                debug!(id = %l.id, "local record newer, keeping it");
                return Ok(Some(l.clone()));
            }
            if r.updated_at > l.updated_at {
                debug!(id = %r.id, "remote record newer, keeping it");
                return Ok(Some(r.clone()));
            }
            merge_fields(b, l, r, conflicts).map(Some)
        }
    }
}

/// Equal-timestamp divergence: merge field-by-field against base.
///
/// Satellites union; a scalar changed on only one side takes that side;
/// changed on both sides is a conflict that keeps local and records both
/// values in a synthetic comment.
fn merge_fields(
    base: Option<&Issue>,
    local: &Issue,
    remote: &Issue,
    conflicts: &mut Vec<MergeConflict>,
) -> Result<Issue> {
    let base_map = match base {
        Some(b) => to_map(b)?,
        None => BTreeMap::new(),
    };
    let local_map = to_map(local)?;
    let remote_map = to_map(remote)?;

    let mut keys: BTreeSet<String> = BTreeSet::new();
    keys.extend(local_map.keys().cloned());
    keys.extend(remote_map.keys().cloned());

    let mut merged: BTreeMap<String, Value> = BTreeMap::new();
    let mut conflict_notes: Vec<String> = Vec::new();

    for key in keys {
        if UNION_KEYS.contains(&key.as_str()) {
            continue;
        }
        let lv = local_map.get(&key);
        let rv = remote_map.get(&key);
        let bv = base_map.get(&key);

        let chosen = if lv == rv {
            lv
        } else if lv == bv {
            rv
        } else if rv == bv {
            lv
        } else {
            conflicts.push(MergeConflict {
                id: local.id.clone(),
                field: key.clone(),
            });
            conflict_notes.push(format!(
                "{key}: local={} remote={}",
                lv.map_or_else(|| "(unset)".to_string(), Value::to_string),
                rv.map_or_else(|| "(unset)".to_string(), Value::to_string),
            ));
            lv
        };
        if let Some(value) = chosen {
            merged.insert(key, value.clone());
        }
    }

    let mut issue: Issue =
        serde_json::from_value(Value::Object(merged.into_iter().collect()))?;

    // Satellites: set union.
    let mut labels: BTreeSet<String> = local.labels.iter().cloned().collect();
    labels.extend(remote.labels.iter().cloned());
    issue.labels = labels.into_iter().collect();

    issue.comments = local.comments.clone();
    for comment in &remote.comments {
        if !issue.comments.iter().any(|c| c.key() == comment.key()) {
            issue.comments.push(comment.clone());
        }
    }
    issue
        .comments
        .sort_by(|a, b| a.created_at.cmp(&b.created_at));

    issue.dependencies = local.dependencies.clone();
    for dep in &remote.dependencies {
        if !issue.dependencies.iter().any(|d| d.key() == dep.key()) {
            issue.dependencies.push(dep.clone());
        }
    }
    issue
        .dependencies
        .sort_by(|a, b| a.key().cmp(&b.key()));

    if !conflict_notes.is_empty() {
        issue.comments.push(beads_core::comment::Comment {
            id: 0,
            issue_id: issue.id.clone(),
            author: "merge-driver".into(),
            text: format!("unresolved field conflicts: {}", conflict_notes.join("; ")),
            created_at: Utc::now(),
        });
    }
    Ok(issue)
}

fn to_map(issue: &Issue) -> Result<BTreeMap<String, Value>> {
    match serde_json::to_value(issue)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(SyncError::Corruption {
            path: "<record>".into(),
            reason: "issue did not serialize to an object".into(),
        }),
    }
}

fn tombstone_record(record: Issue, deletion: &DeletionRecord) -> Issue {
    let mut tomb = record.without_satellites();
    tomb.status = beads_core::enums::Status::Tombstone;
    tomb.updated_at = deletion.deleted_at;
    tomb.deleted_at = Some(deletion.deleted_at);
    tomb.deleted_by = deletion.actor.clone();
    tomb.delete_reason = deletion.reason.clone();
    tomb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::serialize_records;
    use beads_core::dependency::Dependency;
    use beads_core::enums::{DependencyType, Status};
    use beads_core::issue::{Issue, IssueBuilder};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn write_jsonl(dir: &Path, name: &str, issues: &[Issue]) -> std::path::PathBuf {
        let mut sorted = issues.to_vec();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        let (bytes, _) = serialize_records(&sorted).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
    }

    fn issue(id: &str, title: &str, updated: i64) -> Issue {
        IssueBuilder::new(title)
            .id(id)
            .created_at(at(0))
            .updated_at(at(updated))
            .build()
    }

    #[test]
    fn one_sided_addition_kept() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_jsonl(dir.path(), "base", &[]);
        let local = write_jsonl(dir.path(), "local", &[issue("bd-l", "local add", 1)]);
        let remote = write_jsonl(dir.path(), "remote", &[issue("bd-r", "remote add", 1)]);

        let outcome = merge_files(&base, &local, &remote, &HashMap::new()).unwrap();
        assert!(outcome.is_clean());
        let ids: Vec<&str> = outcome.merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["bd-l", "bd-r"]);
    }

    #[test]
    fn newer_updated_at_wins() {
        let dir = tempfile::tempdir().unwrap();
        let b = issue("bd-x", "original", 0);
        let l = issue("bd-x", "local edit", 10);
        let r = issue("bd-x", "remote edit", 20);
        let base = write_jsonl(dir.path(), "base", &[b]);
        let local = write_jsonl(dir.path(), "local", &[l]);
        let remote = write_jsonl(dir.path(), "remote", &[r]);

        let outcome = merge_files(&base, &local, &remote, &HashMap::new()).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.merged[0].title, "remote edit");
    }

    #[test]
    fn unmodified_deletion_stays_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let b = issue("bd-gone", "old", 0);
        let base = write_jsonl(dir.path(), "base", &[b.clone()]);
        let local = write_jsonl(dir.path(), "local", &[]);
        let remote = write_jsonl(dir.path(), "remote", &[b]);

        let outcome = merge_files(&base, &local, &remote, &HashMap::new()).unwrap();
        assert!(outcome.merged.is_empty());
    }

    #[test]
    fn modified_side_survives_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let b = issue("bd-keep", "old", 0);
        let r = issue("bd-keep", "edited after base", 5);
        let base = write_jsonl(dir.path(), "base", &[b]);
        let local = write_jsonl(dir.path(), "local", &[]);
        let remote = write_jsonl(dir.path(), "remote", &[r]);

        let outcome = merge_files(&base, &local, &remote, &HashMap::new()).unwrap();
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged[0].title, "edited after base");
    }

    #[test]
    fn equal_timestamps_merge_disjoint_fields() {
        let dir = tempfile::tempdir().unwrap();
        let b = issue("bd-m", "title", 0);
        let mut l = issue("bd-m", "title", 10);
        l.assignee = "alice".into();
        let mut r = issue("bd-m", "title", 10);
        r.notes = "remote notes".into();

        let base = write_jsonl(dir.path(), "base", &[b]);
        let local = write_jsonl(dir.path(), "local", &[l]);
        let remote = write_jsonl(dir.path(), "remote", &[r]);

        let outcome = merge_files(&base, &local, &remote, &HashMap::new()).unwrap();
        assert!(outcome.is_clean());
        let merged = &outcome.merged[0];
        assert_eq!(merged.assignee, "alice");
        assert_eq!(merged.notes, "remote notes");
    }

    #[test]
    fn equal_timestamps_both_changed_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let b = issue("bd-c", "original", 0);
        let l = issue("bd-c", "local title", 10);
        let r = issue("bd-c", "remote title", 10);

        let base = write_jsonl(dir.path(), "base", &[b]);
        let local = write_jsonl(dir.path(), "local", &[l]);
        let remote = write_jsonl(dir.path(), "remote", &[r]);

        let outcome = merge_files(&base, &local, &remote, &HashMap::new()).unwrap();
        assert!(!outcome.is_clean());
        assert_eq!(outcome.conflicts[0].field, "title");
        // Local wins, both values retained in a synthetic comment.
        let merged = &outcome.merged[0];
        assert_eq!(merged.title, "local title");
        assert!(merged
            .comments
            .iter()
            .any(|c| c.author == "merge-driver" && c.text.contains("remote title")));
    }

    #[test]
    fn satellites_union_on_equal_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let b = issue("bd-u", "t", 0);
        let mut l = issue("bd-u", "t", 10);
        l.labels = vec!["local".into()];
        l.dependencies = vec![Dependency {
            issue_id: "bd-u".into(),
            depends_on_id: "bd-dep1".into(),
            dep_type: DependencyType::Blocks,
            created_at: at(1),
            created_by: String::new(),
        }];
        let mut r = issue("bd-u", "t", 10);
        r.labels = vec!["remote".into(), "local".into()];
        r.dependencies = vec![Dependency {
            issue_id: "bd-u".into(),
            depends_on_id: "bd-dep2".into(),
            dep_type: DependencyType::Blocks,
            created_at: at(2),
            created_by: String::new(),
        }];

        let base = write_jsonl(dir.path(), "base", &[b]);
        let local = write_jsonl(dir.path(), "local", &[l]);
        let remote = write_jsonl(dir.path(), "remote", &[r]);

        let outcome = merge_files(&base, &local, &remote, &HashMap::new()).unwrap();
        let merged = &outcome.merged[0];
        assert_eq!(merged.labels, vec!["local", "remote"]);
        assert_eq!(merged.dependencies.len(), 2);
    }

    #[test]
    fn manifest_tombstones_resurrected_record() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_jsonl(dir.path(), "base", &[]);
        // Clone B still carries bd-z with an old timestamp.
        let stale = issue("bd-z", "zombie", 10);
        let local = write_jsonl(dir.path(), "local", &[]);
        let remote = write_jsonl(dir.path(), "remote", &[stale]);

        let mut deletions = HashMap::new();
        deletions.insert(
            "bd-z".to_string(),
            DeletionRecord {
                id: "bd-z".into(),
                actor: "cleaner".into(),
                reason: "done".into(),
                deleted_at: at(100),
            },
        );

        let outcome = merge_files(&base, &local, &remote, &deletions).unwrap();
        assert_eq!(outcome.tombstoned, vec!["bd-z"]);
        assert_eq!(outcome.merged[0].status, Status::Tombstone);
        assert!(outcome.merged[0].labels.is_empty());
    }

    #[test]
    fn malformed_input_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_jsonl(dir.path(), "base", &[]);
        let bad = dir.path().join("local");
        std::fs::write(&bad, "not json\n").unwrap();
        let remote = write_jsonl(dir.path(), "remote", &[]);

        let err = merge_files(&base, &bad, &remote, &HashMap::new()).unwrap_err();
        assert!(matches!(err, SyncError::Corruption { .. }));
    }
}
