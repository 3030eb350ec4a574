//! JSONL import: reconciling the canonical file back into the store.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{info, warn};

use beads_core::jsonl::read_jsonl;
use beads_storage::{ImportAction, Storage};

use crate::error::{Result, SyncError};
use crate::manifest::DeletionRecord;

/// A non-fatal problem with one line of the input.
#[derive(Debug, Clone)]
pub struct ImportError {
    pub line: usize,
    pub message: String,
}

/// Outcome of an import run.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub tombstoned: usize,
    /// Malformed or unappliable lines; the input file is left untouched.
    pub errors: Vec<ImportError>,
}

impl ImportReport {
    /// Total records applied in some form.
    pub fn applied(&self) -> usize {
        self.created + self.updated + self.tombstoned
    }
}

/// Imports `path` into the store, one transaction per record.
///
/// Malformed lines are collected into the report and do not stop the run.
/// Records overridden by the deletion manifest (a deletion newer than the
/// incoming `updated_at`) are re-tombstoned instead of applied.
pub fn import_from_path(
    store: &dyn Storage,
    path: &Path,
    deletions: &HashMap<String, DeletionRecord>,
) -> Result<ImportReport> {
    let file = File::open(path).map_err(|e| SyncError::io(path, e))?;
    let mut report = ImportReport::default();

    for (line_no, parsed) in read_jsonl(BufReader::new(file)) {
        let record = match parsed {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line_no, %e, "skipping malformed JSONL line");
                report.errors.push(ImportError {
                    line: line_no,
                    message: e.to_string(),
                });
                continue;
            }
        };

        // The manifest wins over any record it postdates.
        if let Some(deletion) = deletions.get(&record.id) {
            if deletion.deleted_at > record.updated_at {
                match store.tombstone_issue(
                    &record.id,
                    &deletion.actor,
                    &deletion.reason,
                    deletion.deleted_at,
                ) {
                    Ok(true) => {
                        report.tombstoned += 1;
                        continue;
                    }
                    Ok(false) => {
                        // Unknown locally or already tombstoned: nothing to
                        // apply, and nothing to resurrect.
                        report.skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        report.errors.push(ImportError {
                            line: line_no,
                            message: e.to_string(),
                        });
                        continue;
                    }
                }
            }
        }

        match store.apply_import_record(&record) {
            Ok(ImportAction::Created) => report.created += 1,
            Ok(ImportAction::Updated) => report.updated += 1,
            Ok(ImportAction::Skipped) => report.skipped += 1,
            Ok(ImportAction::Tombstoned) => report.tombstoned += 1,
            Err(e) => {
                warn!(line = line_no, id = %record.id, %e, "record failed to apply");
                report.errors.push(ImportError {
                    line: line_no,
                    message: format!("{}: {e}", record.id),
                });
            }
        }
    }

    info!(
        path = %path.display(),
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        tombstoned = report.tombstoned,
        errors = report.errors.len(),
        "import complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ExportOptions, export_to_path};
    use beads_core::enums::Status;
    use beads_core::issue::IssueBuilder;
    use beads_storage::{MemoryStore, Storage};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn export_import_roundtrip_is_identity() {
        let source = MemoryStore::new();
        source
            .create_issue(
                &IssueBuilder::new("One").id("bd-1").priority(1).build(),
                "t",
            )
            .unwrap();
        source.add_label("bd-1", "tag", "t").unwrap();
        source.add_comment("bd-1", "alice", "note").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        export_to_path(&source, &path, &ExportOptions::default()).unwrap();

        let fresh = MemoryStore::new();
        let report = import_from_path(&fresh, &path, &HashMap::new()).unwrap();
        assert_eq!(report.created, 1);
        assert!(report.errors.is_empty());

        // Re-export from the fresh store must be byte-identical.
        let path2 = dir.path().join("issues2.jsonl");
        export_to_path(&fresh, &path2, &ExportOptions::default()).unwrap();
        assert_eq!(
            std::fs::read(&path).unwrap(),
            std::fs::read(&path2).unwrap()
        );
    }

    #[test]
    fn malformed_lines_reported_not_fatal() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{{\"id\":\"bd-ok\",\"title\":\"fine\"}}").unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file, "{{\"id\":\"bd-ok2\",\"title\":\"also fine\"}}").unwrap();

        let report = import_from_path(&store, &path, &HashMap::new()).unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].line, 2);
    }

    #[test]
    fn manifest_overrides_incoming_record() {
        let store = MemoryStore::new();
        store
            .create_issue(&IssueBuilder::new("Doomed").id("bd-d").build(), "t")
            .unwrap();

        // A clone still carries the issue with an old updated_at.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        let stale = IssueBuilder::new("Doomed")
            .id("bd-d")
            .updated_at(Utc::now() - chrono::Duration::hours(1))
            .build();
        let line = beads_core::jsonl::to_canonical_line(&stale).unwrap();
        std::fs::write(&path, format!("{line}\n")).unwrap();

        let mut deletions = HashMap::new();
        deletions.insert(
            "bd-d".to_string(),
            DeletionRecord::new("bd-d", "cleaner", "obsolete"),
        );

        let report = import_from_path(&store, &path, &deletions).unwrap();
        assert_eq!(report.tombstoned, 1);
        assert_eq!(store.get_issue("bd-d").unwrap().status, Status::Tombstone);
    }

    #[test]
    fn newer_incoming_beats_manifest() {
        let store = MemoryStore::new();
        let mut deletions = HashMap::new();
        deletions.insert("bd-n".to_string(), {
            let mut record = DeletionRecord::new("bd-n", "cleaner", "");
            record.deleted_at = Utc::now() - chrono::Duration::hours(2);
            record
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        let fresh = IssueBuilder::new("Recreated").id("bd-n").build();
        let line = beads_core::jsonl::to_canonical_line(&fresh).unwrap();
        std::fs::write(&path, format!("{line}\n")).unwrap();

        let report = import_from_path(&store, &path, &deletions).unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(store.get_issue("bd-n").unwrap().status, Status::Open);
    }
}
