//! `bd ready` and `bd blocked` -- the dependency resolver views.

use anyhow::Result;

use beads_core::enums::IssueType;
use beads_core::filter::WorkFilter;

use crate::cli::ReadyArgs;
use crate::context::CommandContext;
use crate::output::{issue_line, output_json};

/// Execute the `bd ready` command.
pub fn run(ctx: &CommandContext, args: &ReadyArgs) -> Result<()> {
    let backend = ctx.open_backend()?;
    let store = backend.store();

    let filter = WorkFilter {
        assignee: args.assignee.clone(),
        issue_type: args
            .issue_type
            .as_deref()
            .map(IssueType::from),
        include_deferred: args.include_deferred,
        limit: args.limit,
        ..Default::default()
    };
    let issues = store.get_ready_work(&filter)?;

    if ctx.json {
        output_json(&issues);
    } else if issues.is_empty() {
        println!("No ready work.");
    } else {
        for issue in &issues {
            println!("{}", issue_line(issue));
        }
    }
    Ok(())
}

/// Execute the `bd blocked` command.
pub fn run_blocked(ctx: &CommandContext) -> Result<()> {
    let backend = ctx.open_backend()?;
    let blocked = backend.store().get_blocked_issues()?;

    if ctx.json {
        output_json(&blocked);
    } else if blocked.is_empty() {
        println!("Nothing is blocked.");
    } else {
        for entry in &blocked {
            println!(
                "{}  blocked by: {}",
                issue_line(&entry.issue),
                entry.open_blockers.join(", ")
            );
        }
    }
    Ok(())
}
