//! Output formatting helpers for the `bd` CLI.

use owo_colors::OwoColorize;
use serde::Serialize;

use beads_core::enums::Status;
use beads_core::issue::Issue;

/// Prints a value as pretty JSON on stdout.
pub fn output_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("error: failed to serialize output: {e}"),
    }
}

/// One-line issue summary: `id  [P2][task]  status  title`.
pub fn issue_line(issue: &Issue) -> String {
    let status = colored_status(issue.status);
    format!(
        "{}  [P{}][{}]  {}  {}",
        issue.id.bold(),
        issue.priority,
        issue.issue_type,
        status,
        issue.title
    )
}

/// Multi-line issue detail for `bd show`.
pub fn issue_detail(issue: &Issue) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}: {}\n", issue.id.bold(), issue.title));
    out.push_str(&format!(
        "  status: {}   priority: P{}   type: {}\n",
        colored_status(issue.status),
        issue.priority,
        issue.issue_type
    ));
    if !issue.assignee.is_empty() {
        out.push_str(&format!("  assignee: {}\n", issue.assignee));
    }
    if !issue.created_by.is_empty() {
        out.push_str(&format!("  created by: {}\n", issue.created_by));
    }
    out.push_str(&format!(
        "  created: {}   updated: {}\n",
        issue.created_at.format("%Y-%m-%d %H:%M"),
        issue.updated_at.format("%Y-%m-%d %H:%M")
    ));
    if let Some(closed_at) = issue.closed_at {
        out.push_str(&format!(
            "  closed: {}   reason: {}\n",
            closed_at.format("%Y-%m-%d %H:%M"),
            issue.close_reason
        ));
    }
    if !issue.description.is_empty() {
        out.push_str(&format!("\n  {}\n", issue.description.replace('\n', "\n  ")));
    }
    if !issue.labels.is_empty() {
        out.push_str(&format!("\n  labels: {}\n", issue.labels.join(", ")));
    }
    if !issue.dependencies.is_empty() {
        out.push_str("\n  dependencies:\n");
        for dep in &issue.dependencies {
            if dep.issue_id == issue.id {
                out.push_str(&format!(
                    "    -> {} ({})\n",
                    dep.depends_on_id, dep.dep_type
                ));
            } else {
                out.push_str(&format!("    <- {} ({})\n", dep.issue_id, dep.dep_type));
            }
        }
    }
    if !issue.comments.is_empty() {
        out.push_str("\n  comments:\n");
        for comment in &issue.comments {
            out.push_str(&format!(
                "    [{}] {}: {}\n",
                comment.created_at.format("%Y-%m-%d %H:%M"),
                comment.author,
                comment.text
            ));
        }
    }
    out
}

fn colored_status(status: Status) -> String {
    match status {
        Status::Open => status.as_str().green().to_string(),
        Status::InProgress => status.as_str().yellow().to_string(),
        Status::Blocked => status.as_str().red().to_string(),
        Status::Closed => status.as_str().dimmed().to_string(),
        Status::Tombstone => status.as_str().dimmed().to_string(),
    }
}
