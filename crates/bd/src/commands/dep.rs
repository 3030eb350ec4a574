//! `bd dep` -- manage dependency edges.

use anyhow::Result;

use beads_core::dependency::Dependency;
use beads_core::enums::DependencyType;

use crate::cli::{DepArgs, DepCommands};
use crate::context::{CommandContext, resolve_id};
use crate::output::{issue_line, output_json};

/// Execute the `bd dep` command.
pub fn run(ctx: &CommandContext, args: &DepArgs) -> Result<()> {
    match &args.command {
        DepCommands::Add {
            issue,
            target,
            dep_type,
        } => add(ctx, issue, target, dep_type),
        DepCommands::Remove { issue, target } => remove(ctx, issue, target),
        DepCommands::List { issue } => list(ctx, issue),
    }
}

fn add(ctx: &CommandContext, issue: &str, target: &str, dep_type: &str) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let store = backend.store();

    let dep_type: DependencyType = dep_type.parse().map_err(|e| anyhow::anyhow!("{e}"))?;
    let issue = resolve_id(store, issue)?;
    let target = resolve_id(store, target)?;

    store.add_dependency(
        &Dependency::new(&issue, &target, dep_type, &ctx.actor),
        &ctx.actor,
    )?;
    backend.mark_dirty();

    if ctx.json {
        output_json(&serde_json::json!({
            "issue_id": issue, "depends_on_id": target, "type": dep_type.as_str(),
        }));
    } else {
        println!("{issue} now depends on {target} ({dep_type})");
    }
    backend.finish()?;
    Ok(())
}

fn remove(ctx: &CommandContext, issue: &str, target: &str) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let store = backend.store();

    let issue = resolve_id(store, issue)?;
    let target = resolve_id(store, target)?;
    store.remove_dependency(&issue, &target, &ctx.actor)?;
    backend.mark_dirty();

    if ctx.json {
        output_json(&serde_json::json!({ "removed": [issue, target] }));
    } else {
        println!("Removed dependency {issue} -> {target}");
    }
    backend.finish()?;
    Ok(())
}

fn list(ctx: &CommandContext, issue: &str) -> Result<()> {
    let backend = ctx.open_backend()?;
    let store = backend.store();
    let issue = resolve_id(store, issue)?;

    let dependencies = store.get_dependencies(&issue)?;
    let dependents = store.get_dependents(&issue)?;

    if ctx.json {
        output_json(&serde_json::json!({
            "dependencies": dependencies,
            "dependents": dependents,
        }));
    } else {
        if dependencies.is_empty() && dependents.is_empty() {
            println!("{issue} has no dependencies.");
            return Ok(());
        }
        if !dependencies.is_empty() {
            println!("{issue} depends on:");
            for dep in &dependencies {
                println!("  {}", issue_line(dep));
            }
        }
        if !dependents.is_empty() {
            println!("depended on by:");
            for dep in &dependents {
                println!("  {}", issue_line(dep));
            }
        }
    }
    Ok(())
}
