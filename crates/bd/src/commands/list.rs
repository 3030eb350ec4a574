//! `bd list` -- filtered issue listing.

use anyhow::Result;

use beads_core::enums::{IssueType, Status};
use beads_core::filter::IssueFilter;

use crate::cli::ListArgs;
use crate::context::CommandContext;
use crate::output::{issue_line, output_json};

/// Execute the `bd list` command.
pub fn run(ctx: &CommandContext, args: &ListArgs) -> Result<()> {
    let backend = ctx.open_backend()?;
    let store = backend.store();

    let mut filter = IssueFilter {
        priority: args.priority,
        assignee: args.assignee.clone(),
        labels: args.labels.clone(),
        text: args.search.clone(),
        include_tombstones: args.include_tombstones,
        limit: args.limit,
        ..Default::default()
    };
    if let Some(status) = &args.status {
        filter.status = Some(status.parse::<Status>().map_err(|e| anyhow::anyhow!("{e}"))?);
    }
    if let Some(issue_type) = &args.issue_type {
        filter.issue_type = Some(IssueType::from(issue_type.as_str()));
    }

    let issues = store.search_issues("", &filter)?;

    if ctx.json {
        output_json(&issues);
    } else if issues.is_empty() {
        println!("No matching issues.");
    } else {
        for issue in &issues {
            println!("{}", issue_line(issue));
        }
        println!("\n{} issue(s)", issues.len());
    }
    Ok(())
}
