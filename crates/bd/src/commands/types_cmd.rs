//! `bd types` -- show and manage the configured type vocabulary.

use anyhow::{Result, bail};

use beads_core::enums::IssueType;

use crate::cli::{TypesArgs, TypesCommands};
use crate::context::CommandContext;
use crate::output::output_json;

/// Execute the `bd types` command.
pub fn run(ctx: &CommandContext, args: &TypesArgs) -> Result<()> {
    match &args.command {
        None | Some(TypesCommands::List) => list(ctx),
        Some(TypesCommands::Add { name }) => add(ctx, name),
    }
}

fn list(ctx: &CommandContext) -> Result<()> {
    let backend = ctx.open_backend()?;
    let custom = backend.store().get_custom_types()?;

    if ctx.json {
        output_json(&serde_json::json!({
            "builtin": IssueType::builtins(),
            "custom": custom,
        }));
    } else {
        println!("builtin: {}", IssueType::builtins().join(", "));
        if custom.is_empty() {
            println!("custom: (none)");
        } else {
            println!("custom: {}", custom.join(", "));
        }
    }
    Ok(())
}

fn add(ctx: &CommandContext, name: &str) -> Result<()> {
    ctx.require_writable()?;
    let name = name.trim();
    if name.is_empty() || name.contains(',') {
        bail!("invalid type name '{name}'");
    }
    if IssueType::builtins().contains(&name) {
        bail!("'{name}' is already a builtin type");
    }

    let backend = ctx.open_backend()?;
    let store = backend.store();
    let mut custom = store.get_custom_types()?;
    if custom.iter().any(|t| t == name) {
        println!("'{name}' is already configured");
        return Ok(());
    }
    custom.push(name.to_owned());
    // The store row is authoritative; new types take effect immediately.
    store.set_config("types.custom", &custom.join(","))?;

    if ctx.json {
        output_json(&serde_json::json!({ "added": name, "custom": custom }));
    } else {
        println!("Added custom type '{name}'");
    }
    Ok(())
}
