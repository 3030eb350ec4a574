//! `bd rename` -- rename an issue id atomically.

use anyhow::Result;

use crate::cli::RenameArgs;
use crate::context::{CommandContext, resolve_id};
use crate::output::output_json;

/// Execute the `bd rename` command.
pub fn run(ctx: &CommandContext, args: &RenameArgs) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let store = backend.store();

    let old_id = resolve_id(store, &args.old_id)?;
    store.rename_issue(&old_id, &args.new_id, &ctx.actor)?;
    backend.mark_dirty();

    if ctx.json {
        output_json(&serde_json::json!({ "from": old_id, "to": args.new_id }));
    } else {
        println!("Renamed {old_id} -> {}", args.new_id);
    }
    backend.finish()?;
    Ok(())
}
