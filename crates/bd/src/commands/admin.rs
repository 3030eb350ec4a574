//! `bd admin` -- maintenance: tombstone cleanup and manifest compaction.

use anyhow::Result;

use crate::cli::{AdminArgs, AdminCommands};
use crate::context::CommandContext;
use crate::output::output_json;

/// Execute the `bd admin` command.
pub fn run(ctx: &CommandContext, args: &AdminArgs) -> Result<()> {
    match &args.command {
        AdminCommands::Cleanup { older_than, hard } => cleanup(ctx, *older_than, *hard),
        AdminCommands::Compact => compact(ctx),
    }
}

fn cleanup(ctx: &CommandContext, older_than: Option<u64>, hard: bool) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;

    // --hard lowers the TTL to the caller's value (or zero), which is the
    // only way to make resurrection through old clones possible again.
    let ttl = if hard {
        older_than.unwrap_or(0)
    } else {
        older_than.unwrap_or(ctx.config.retention.tombstone_days)
    };

    let pruned_rows = backend.store().prune_tombstones(ttl)?;
    let pruned_manifest = backend.manifest().prune(ttl)?;
    if !pruned_rows.is_empty() {
        backend.mark_dirty();
    }

    if ctx.json {
        output_json(&serde_json::json!({
            "ttl_days": ttl,
            "pruned_tombstones": pruned_rows,
            "pruned_manifest": pruned_manifest,
        }));
    } else {
        println!(
            "Pruned {} tombstone(s) and {} manifest record(s) older than {ttl} day(s)",
            pruned_rows.len(),
            pruned_manifest.len()
        );
    }
    backend.finish()?;
    Ok(())
}

fn compact(ctx: &CommandContext) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let kept = backend.manifest().compact()?;

    if ctx.json {
        output_json(&serde_json::json!({ "manifest_records": kept }));
    } else {
        println!("Compacted deletion manifest: {kept} record(s)");
    }
    Ok(())
}
