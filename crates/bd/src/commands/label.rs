//! `bd label` -- manage labels.

use anyhow::Result;

use crate::cli::{LabelArgs, LabelCommands};
use crate::context::{CommandContext, resolve_id};
use crate::output::output_json;

/// Execute the `bd label` command.
pub fn run(ctx: &CommandContext, args: &LabelArgs) -> Result<()> {
    match &args.command {
        LabelCommands::Add { issue, label } => mutate(ctx, issue, label, true),
        LabelCommands::Remove { issue, label } => mutate(ctx, issue, label, false),
        LabelCommands::List { issue } => list(ctx, issue),
    }
}

fn mutate(ctx: &CommandContext, issue: &str, label: &str, add: bool) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let store = backend.store();
    let issue = resolve_id(store, issue)?;

    let changed = if add {
        store.add_label(&issue, label, &ctx.actor)?
    } else {
        store.remove_label(&issue, label, &ctx.actor)?
    };
    if changed {
        backend.mark_dirty();
    }

    if ctx.json {
        output_json(&serde_json::json!({ "issue": issue, "label": label, "changed": changed }));
    } else if changed {
        println!(
            "{} label '{label}' {} {issue}",
            if add { "Added" } else { "Removed" },
            if add { "to" } else { "from" }
        );
    } else {
        println!(
            "Label '{label}' was already {} {issue}",
            if add { "on" } else { "absent from" }
        );
    }
    backend.finish()?;
    Ok(())
}

fn list(ctx: &CommandContext, issue: &str) -> Result<()> {
    let backend = ctx.open_backend()?;
    let store = backend.store();
    let issue = resolve_id(store, issue)?;
    let labels = store.get_labels(&issue)?;

    if ctx.json {
        output_json(&labels);
    } else if labels.is_empty() {
        println!("{issue} has no labels.");
    } else {
        println!("{}", labels.join(", "));
    }
    Ok(())
}
