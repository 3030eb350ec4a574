//! `bd close` and `bd reopen` -- lifecycle transitions.

use anyhow::Result;

use crate::cli::{CloseArgs, ReopenArgs};
use crate::context::{CommandContext, resolve_id};
use crate::output::output_json;

/// Execute the `bd close` command.
pub fn run_close(ctx: &CommandContext, args: &CloseArgs) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let store = backend.store();

    let mut closed = Vec::new();
    for raw in &args.ids {
        let id = resolve_id(store, raw)?;
        store.close_issue(&id, &args.reason, &ctx.actor)?;
        closed.push(id);
    }
    backend.mark_dirty();

    if ctx.json {
        output_json(&serde_json::json!({ "closed": closed }));
    } else {
        for id in &closed {
            println!("Closed {id}");
        }
    }
    backend.finish()?;
    Ok(())
}

/// Execute the `bd reopen` command.
pub fn run_reopen(ctx: &CommandContext, args: &ReopenArgs) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let store = backend.store();

    let id = resolve_id(store, &args.id)?;
    store.reopen_issue(&id, &ctx.actor)?;
    backend.mark_dirty();

    if ctx.json {
        output_json(&serde_json::json!({ "reopened": id }));
    } else {
        println!("Reopened {id}");
    }
    backend.finish()?;
    Ok(())
}
