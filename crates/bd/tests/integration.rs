//! End-to-end CLI integration tests for the `bd` binary.
//!
//! Each test creates its own temporary directory, initializes a beads
//! workspace, and exercises the `bd` binary as a subprocess via
//! `assert_cmd`. The daemon never runs here, so every invocation opens the
//! store directly and flushes before exit.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a `Command` targeting the cargo-built `bd` binary.
fn bd() -> Command {
    Command::cargo_bin("bd").unwrap()
}

/// Initialize a fresh beads workspace in a temp directory.
fn init_workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    bd().args(["init", "--prefix", "t"])
        .current_dir(tmp.path())
        .assert()
        .success();
    tmp
}

/// Create an issue and return its id (parsed from `--json` output).
fn create_issue(tmp: &TempDir, title: &str, extra_args: &[&str]) -> String {
    let mut args = vec!["create", title, "--json"];
    args.extend_from_slice(extra_args);
    let output = bd().args(&args).current_dir(tmp.path()).output().unwrap();
    assert!(
        output.status.success(),
        "create failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    json["id"].as_str().unwrap().to_string()
}

/// Parse the canonical JSONL file into values keyed by id.
fn read_export(path: &Path) -> Vec<serde_json::Value> {
    let raw = std::fs::read_to_string(path).unwrap();
    assert!(
        raw.is_empty() || raw.ends_with('\n'),
        "export must end with a newline"
    );
    raw.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn record<'a>(records: &'a [serde_json::Value], id: &str) -> &'a serde_json::Value {
    records
        .iter()
        .find(|r| r["id"].as_str() == Some(id))
        .unwrap_or_else(|| panic!("no record for {id}"))
}

fn ready_ids(tmp: &TempDir) -> Vec<String> {
    let output = bd()
        .args(["ready", "--json"])
        .current_dir(tmp.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    json.as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Canonical wire format
// ---------------------------------------------------------------------------

/// The canonical line form is a wire contract: lexicographic keys, RFC 3339
/// UTC timestamps, stable field names. Pin it so drift is loud.
#[test]
fn canonical_record_wire_format() {
    use beads_core::issue::IssueBuilder;

    let at = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let issue = IssueBuilder::new("Snapshot")
        .id("bd-ab12")
        .priority(1)
        .created_at(at)
        .updated_at(at)
        .labels(vec!["one".into(), "two".into()])
        .build();

    let line = beads_core::jsonl::to_canonical_line(&issue).unwrap();
    insta::assert_snapshot!(line, @r#"{"created_at":"2026-01-01T00:00:00Z","id":"bd-ab12","issue_type":"task","labels":["one","two"],"priority":1,"status":"open","title":"Snapshot","updated_at":"2026-01-01T00:00:00Z"}"#);
}

// ---------------------------------------------------------------------------
// Lifecycle basics
// ---------------------------------------------------------------------------

#[test]
fn init_create_show_roundtrip() {
    let tmp = init_workspace();
    let id = create_issue(&tmp, "First issue", &["-t", "bug", "-p", "1"]);
    assert!(id.starts_with("t-"), "id should carry the prefix: {id}");

    let output = bd()
        .args(["show", &id, "--json"])
        .current_dir(tmp.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let issue: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(issue["id"].as_str().unwrap(), id);
    assert_eq!(issue["title"].as_str().unwrap(), "First issue");
    assert_eq!(issue["issue_type"].as_str().unwrap(), "bug");
    assert_eq!(issue["priority"].as_i64().unwrap(), 1);
}

#[test]
fn init_twice_needs_force() {
    let tmp = init_workspace();
    bd().args(["init", "--prefix", "t"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("already initialized"));

    bd().args(["init", "--prefix", "t", "--force"])
        .current_dir(tmp.path())
        .assert()
        .success();
}

#[test]
fn unknown_issue_is_user_error() {
    let tmp = init_workspace();
    bd().args(["show", "t-nope"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn readonly_blocks_mutations() {
    let tmp = init_workspace();
    bd().args(["--readonly", "create", "Nope"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("read-only"));
}

#[test]
fn mutating_command_flushes_before_exit() {
    let tmp = init_workspace();
    let id = create_issue(&tmp, "Flushed", &[]);

    // The canonical file already reflects the mutation by the time the
    // command returned.
    let records = read_export(&tmp.path().join(".beads/issues.jsonl"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"].as_str().unwrap(), id);
}

#[test]
fn custom_types_take_effect_without_restart() {
    let tmp = init_workspace();
    bd().args(["create", "Gate issue", "-t", "gate"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown type"));

    bd().args(["types", "add", "gate"])
        .current_dir(tmp.path())
        .assert()
        .success();

    create_issue(&tmp, "Gate issue", &["-t", "gate"]);
}

#[test]
fn update_rejects_immutable_fields() {
    let tmp = init_workspace();
    let id = create_issue(&tmp, "Immutable", &[]);
    bd().args(["update", &id, "--set", "id=t-other"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("read-only"));
}

#[test]
fn rename_rewrites_references() {
    let tmp = init_workspace();
    let a = create_issue(&tmp, "Renamed", &[]);
    let b = create_issue(&tmp, "Depends", &[]);
    bd().args(["dep", "add", &b, &a])
        .current_dir(tmp.path())
        .assert()
        .success();

    bd().args(["rename", &a, "t-fresh1"])
        .current_dir(tmp.path())
        .assert()
        .success();

    let output = bd()
        .args(["show", &b, "--json"])
        .current_dir(tmp.path())
        .output()
        .unwrap();
    let issue: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let deps = issue["dependencies"].as_array().unwrap();
    assert_eq!(deps[0]["depends_on_id"].as_str().unwrap(), "t-fresh1");
}

// ---------------------------------------------------------------------------
// Scenario: labels/deps/comments survive scalar updates
// ---------------------------------------------------------------------------

#[test]
fn satellites_survive_scalar_updates() {
    let tmp = init_workspace();
    let t2 = create_issue(&tmp, "Dependency target", &[]);
    let t1 = create_issue(
        &tmp,
        "Feature under churn",
        &["-t", "feature", "-l", "important,v2", "-l", "frontend"],
    );
    bd().args(["dep", "add", &t1, &t2])
        .current_dir(tmp.path())
        .assert()
        .success();
    for text in ["first comment", "second comment"] {
        bd().args(["comment", &t1, text])
            .current_dir(tmp.path())
            .assert()
            .success();
    }

    // Five scalar updates in sequence.
    for args in [
        vec!["update", t1.as_str(), "--title", "Retitled feature"],
        vec!["update", t1.as_str(), "-p", "0"],
        vec!["update", t1.as_str(), "-d", "new description"],
        vec!["update", t1.as_str(), "-a", "alice"],
        vec!["update", t1.as_str(), "--notes", "touched notes"],
    ] {
        bd().args(&args).current_dir(tmp.path()).assert().success();
    }

    bd().args(["export"]).current_dir(tmp.path()).assert().success();
    let records = read_export(&tmp.path().join(".beads/issues.jsonl"));
    let exported = record(&records, &t1);

    let labels: Vec<&str> = exported["labels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l.as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["frontend", "important", "v2"]);

    let deps = exported["dependencies"].as_array().unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0]["depends_on_id"].as_str().unwrap(), t2);

    let comments = exported["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["text"].as_str().unwrap(), "first comment");
    assert_eq!(comments[1]["text"].as_str().unwrap(), "second comment");

    // The scalar churn landed too.
    assert_eq!(exported["title"].as_str().unwrap(), "Retitled feature");
    assert_eq!(exported["priority"].as_i64().unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Scenario: closed blocker unblocks dependent
// ---------------------------------------------------------------------------

#[test]
fn closed_blocker_unblocks_dependent() {
    let tmp = init_workspace();
    let a = create_issue(&tmp, "Blocker a", &["-p", "1"]);
    let b = create_issue(&tmp, "Dependent b", &["-p", "2"]);
    bd().args(["dep", "add", &b, &a])
        .current_dir(tmp.path())
        .assert()
        .success();

    assert_eq!(ready_ids(&tmp), vec![a.clone()]);

    // And b shows up as blocked, annotated with a.
    let output = bd()
        .args(["blocked", "--json"])
        .current_dir(tmp.path())
        .output()
        .unwrap();
    let blocked: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(blocked[0]["issue"]["id"].as_str().unwrap(), b);
    assert_eq!(blocked[0]["open_blockers"][0].as_str().unwrap(), a);

    bd().args(["close", &a]).current_dir(tmp.path()).assert().success();

    assert_eq!(ready_ids(&tmp), vec![b]);
    bd().args(["blocked"])
        .current_dir(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing is blocked"));
}

// ---------------------------------------------------------------------------
// Scenario: diamond dependency
// ---------------------------------------------------------------------------

#[test]
fn diamond_dependency_opens_in_order() {
    let tmp = init_workspace();
    let a = create_issue(&tmp, "diamond a", &[]);
    let b = create_issue(&tmp, "diamond b", &[]);
    let c = create_issue(&tmp, "diamond c", &[]);
    let d = create_issue(&tmp, "diamond d", &[]);
    for (from, to) in [(&b, &a), (&c, &a), (&d, &b), (&d, &c)] {
        bd().args(["dep", "add", from, to])
            .current_dir(tmp.path())
            .assert()
            .success();
    }

    bd().args(["close", &a]).current_dir(tmp.path()).assert().success();
    let ready = ready_ids(&tmp);
    assert!(ready.contains(&b) && ready.contains(&c));
    assert!(!ready.contains(&d));

    bd().args(["close", &b]).current_dir(tmp.path()).assert().success();
    assert!(!ready_ids(&tmp).contains(&d));

    bd().args(["close", &c]).current_dir(tmp.path()).assert().success();
    assert!(ready_ids(&tmp).contains(&d));
}

#[test]
fn dependency_cycle_is_rejected() {
    let tmp = init_workspace();
    let a = create_issue(&tmp, "cycle a", &[]);
    let b = create_issue(&tmp, "cycle b", &[]);
    bd().args(["dep", "add", &a, &b])
        .current_dir(tmp.path())
        .assert()
        .success();
    bd().args(["dep", "add", &b, &a])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("constraint"));
}

// ---------------------------------------------------------------------------
// Scenario: parent-child round-trip through a fresh workspace
// ---------------------------------------------------------------------------

#[test]
fn parent_child_round_trip() {
    let tmp = init_workspace();
    let parent = create_issue(&tmp, "Epic parent", &["-t", "epic"]);
    let child = create_issue(&tmp, "Child task", &["--parent", &parent]);
    assert_eq!(child, format!("{parent}.1"), "child id is parent-suffixed");

    bd().args(["export"]).current_dir(tmp.path()).assert().success();
    let first_export = tmp.path().join(".beads/issues.jsonl");

    // Import into a fresh workspace, then re-export.
    let fresh = init_workspace();
    bd().args(["import", first_export.to_str().unwrap()])
        .current_dir(fresh.path())
        .assert()
        .success();
    bd().args(["export"]).current_dir(fresh.path()).assert().success();

    let records = read_export(&fresh.path().join(".beads/issues.jsonl"));
    let parent_record = record(&records, &parent);
    let child_record = record(&records, &child);

    // The edge appears on BOTH endpoints.
    let child_deps = child_record["dependencies"].as_array().unwrap();
    assert!(child_deps.iter().any(|d| {
        d["depends_on_id"].as_str() == Some(parent.as_str())
            && d["type"].as_str() == Some("parent-child")
    }));
    let parent_deps = parent_record["dependencies"].as_array().unwrap();
    assert!(parent_deps.iter().any(|d| {
        d["issue_id"].as_str() == Some(child.as_str())
            && d["type"].as_str() == Some("parent-child")
    }));
}

// ---------------------------------------------------------------------------
// Scenario: canonical round-trip is byte-identical
// ---------------------------------------------------------------------------

#[test]
fn export_import_export_is_byte_identical() {
    let tmp = init_workspace();
    let a = create_issue(&tmp, "Round trip", &["-l", "keep", "-p", "1"]);
    bd().args(["comment", &a, "note"])
        .current_dir(tmp.path())
        .assert()
        .success();
    bd().args(["export"]).current_dir(tmp.path()).assert().success();
    let first = std::fs::read(tmp.path().join(".beads/issues.jsonl")).unwrap();

    let fresh = init_workspace();
    bd().args([
        "import",
        tmp.path().join(".beads/issues.jsonl").to_str().unwrap(),
    ])
    .current_dir(fresh.path())
    .assert()
    .success();
    bd().args(["export"]).current_dir(fresh.path()).assert().success();
    let second = std::fs::read(fresh.path().join(".beads/issues.jsonl")).unwrap();

    assert_eq!(first, second, "round-tripped export must be byte-identical");
}

// ---------------------------------------------------------------------------
// Scenario: deletion survives a merge
// ---------------------------------------------------------------------------

#[test]
fn deletion_survives_merge() {
    // Clone A creates x and publishes it.
    let clone_a = init_workspace();
    let x = create_issue(&clone_a, "Doomed issue", &["--id", "t-doom1"]);
    bd().args(["export"]).current_dir(clone_a.path()).assert().success();
    let base = clone_a.path().join("base.jsonl");
    std::fs::copy(clone_a.path().join(".beads/issues.jsonl"), &base).unwrap();

    // Clone B picks it up and modifies the title.
    let clone_b = init_workspace();
    bd().args([
        "import",
        clone_a.path().join(".beads/issues.jsonl").to_str().unwrap(),
    ])
    .current_dir(clone_b.path())
    .assert()
    .success();
    std::thread::sleep(std::time::Duration::from_millis(20));
    bd().args(["update", &x, "--title", "Still alive?"])
        .current_dir(clone_b.path())
        .assert()
        .success();
    bd().args(["export"]).current_dir(clone_b.path()).assert().success();
    let remote = clone_b.path().join(".beads/issues.jsonl");

    // Clone A deletes x afterwards (the deletion is the newest fact).
    std::thread::sleep(std::time::Duration::from_millis(20));
    bd().args(["delete", &x, "-r", "obsolete"])
        .current_dir(clone_a.path())
        .assert()
        .success();
    let local = clone_a.path().join(".beads/issues.jsonl");

    // Git invokes the merge driver in clone A.
    let merged = clone_a.path().join("merged.jsonl");
    bd().args([
        "merge",
        base.to_str().unwrap(),
        local.to_str().unwrap(),
        remote.to_str().unwrap(),
        "-o",
        merged.to_str().unwrap(),
    ])
    .current_dir(clone_a.path())
    .assert()
    .success();

    let records = read_export(&merged);
    let x_record = record(&records, &x);
    assert_eq!(x_record["status"].as_str().unwrap(), "tombstone");

    // The store re-imports the merged file; x stays dead and a re-export
    // does not resurrect it.
    std::fs::copy(&merged, &local).unwrap();
    bd().args(["import"]).current_dir(clone_a.path()).assert().success();
    bd().args(["export"]).current_dir(clone_a.path()).assert().success();

    let final_records = read_export(&local);
    assert_eq!(
        record(&final_records, &x)["status"].as_str().unwrap(),
        "tombstone"
    );

    let output = bd()
        .args(["list", "--json"])
        .current_dir(clone_a.path())
        .output()
        .unwrap();
    let list: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(
        list.as_array().unwrap().is_empty(),
        "tombstones stay hidden from listings"
    );
}

// ---------------------------------------------------------------------------
// Deletion removes edges from surviving records
// ---------------------------------------------------------------------------

#[test]
fn delete_strips_edges_from_survivors() {
    let tmp = init_workspace();
    let a = create_issue(&tmp, "Doomed blocker", &[]);
    let b = create_issue(&tmp, "Survivor", &[]);
    bd().args(["dep", "add", &b, &a])
        .current_dir(tmp.path())
        .assert()
        .success();

    bd().args(["delete", &a]).current_dir(tmp.path()).assert().success();
    bd().args(["export"]).current_dir(tmp.path()).assert().success();

    let records = read_export(&tmp.path().join(".beads/issues.jsonl"));
    for r in &records {
        for dep in r["dependencies"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
            assert_ne!(dep["issue_id"].as_str(), Some(a.as_str()));
            assert_ne!(dep["depends_on_id"].as_str(), Some(a.as_str()));
        }
    }

    // And b is ready again: its only blocker is gone.
    assert!(ready_ids(&tmp).contains(&b));
}

// ---------------------------------------------------------------------------
// Refile moves an issue across workspaces
// ---------------------------------------------------------------------------

#[test]
fn refile_moves_issue_to_other_workspace() {
    let source = init_workspace();
    let target = init_workspace();
    let id = create_issue(&source, "Traveler", &["-l", "wander"]);

    bd().args([
        "refile",
        &id,
        "--to",
        target.path().join(".beads").to_str().unwrap(),
    ])
    .current_dir(source.path())
    .assert()
    .success();

    // Present in the target, with satellites.
    let output = bd()
        .args(["show", &id, "--json"])
        .current_dir(target.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let issue: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(issue["labels"][0].as_str().unwrap(), "wander");

    // Tombstoned at the source, recorded in its manifest.
    let output = bd()
        .args(["show", &id, "--json"])
        .current_dir(source.path())
        .output()
        .unwrap();
    let issue: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(issue["status"].as_str().unwrap(), "tombstone");
    let manifest = std::fs::read_to_string(source.path().join(".beads/deletions.log")).unwrap();
    assert!(manifest.contains(&id));
}

// ---------------------------------------------------------------------------
// Ephemeral issues stay out of the projection
// ---------------------------------------------------------------------------

#[test]
fn ephemeral_issue_never_reaches_jsonl() {
    let tmp = init_workspace();
    create_issue(&tmp, "Durable", &[]);
    let wisp = create_issue(&tmp, "Transient message", &["--ephemeral"]);

    bd().args(["export"]).current_dir(tmp.path()).assert().success();
    let records = read_export(&tmp.path().join(".beads/issues.jsonl"));
    assert_eq!(records.len(), 1);
    assert!(records.iter().all(|r| r["id"].as_str() != Some(wisp.as_str())));
}
