//! `bd stats` -- aggregate workspace statistics.

use anyhow::Result;

use crate::context::CommandContext;
use crate::output::output_json;

/// Execute the `bd stats` command.
pub fn run(ctx: &CommandContext) -> Result<()> {
    let backend = ctx.open_backend()?;
    let stats = backend.store().get_statistics()?;

    if ctx.json {
        output_json(&stats);
        return Ok(());
    }

    println!("Issues: {} total", stats.total_issues);
    println!(
        "  open: {}   in progress: {}   blocked: {}   closed: {}   tombstone: {}",
        stats.open_issues,
        stats.in_progress_issues,
        stats.blocked_issues,
        stats.closed_issues,
        stats.tombstone_issues
    );
    if !stats.by_type.is_empty() {
        println!("By type:");
        for (name, count) in &stats.by_type {
            println!("  {name}: {count}");
        }
    }
    if !stats.by_priority.is_empty() {
        println!("By priority:");
        for (priority, count) in &stats.by_priority {
            println!("  P{priority}: {count}");
        }
    }
    if !stats.by_assignee.is_empty() {
        println!("Open issues by assignee:");
        for (assignee, count) in &stats.by_assignee {
            println!("  {assignee}: {count}");
        }
    }
    Ok(())
}
