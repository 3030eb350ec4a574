//! `bd delete` -- tombstone issues and record them in the manifest.

use anyhow::Result;

use beads_sync::DeletionRecord;

use crate::cli::DeleteArgs;
use crate::context::{CommandContext, resolve_id};
use crate::output::output_json;

/// Execute the `bd delete` command.
pub fn run(ctx: &CommandContext, args: &DeleteArgs) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let store = backend.store();

    let mut deleted = Vec::new();
    for raw in &args.ids {
        let id = resolve_id(store, raw)?;
        let ids = store.delete_issue(&id, &ctx.actor, &args.reason, args.cascade)?;
        deleted.extend(ids);
    }

    // Every deletion goes to the manifest so no merge can resurrect it.
    let records: Vec<DeletionRecord> = deleted
        .iter()
        .map(|id| DeletionRecord::new(id.clone(), &ctx.actor, &args.reason))
        .collect();
    backend.manifest().append(&records)?;
    backend.mark_dirty();

    if ctx.json {
        output_json(&serde_json::json!({ "deleted": deleted }));
    } else {
        for id in &deleted {
            println!("Deleted {id}");
        }
    }
    backend.finish()?;
    Ok(())
}
