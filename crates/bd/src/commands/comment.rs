//! `bd comment` / `bd comments` -- append and list comments.

use anyhow::Result;

use crate::cli::{CommentArgs, CommentsArgs};
use crate::context::{CommandContext, resolve_id};
use crate::output::output_json;

/// Execute the `bd comment` command (append).
pub fn run_add(ctx: &CommandContext, args: &CommentArgs) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let store = backend.store();
    let id = resolve_id(store, &args.id)?;

    let comment = store.add_comment(&id, &ctx.actor, &args.text)?;
    backend.mark_dirty();

    if ctx.json {
        output_json(&comment);
    } else {
        println!("Commented on {id}");
    }
    backend.finish()?;
    Ok(())
}

/// Execute the `bd comments` command (list).
pub fn run_list(ctx: &CommandContext, args: &CommentsArgs) -> Result<()> {
    let backend = ctx.open_backend()?;
    let store = backend.store();
    let id = resolve_id(store, &args.id)?;
    let comments = store.get_comments(&id)?;

    if ctx.json {
        output_json(&comments);
    } else if comments.is_empty() {
        println!("{id} has no comments.");
    } else {
        for comment in &comments {
            println!(
                "[{}] {}: {}",
                comment.created_at.format("%Y-%m-%d %H:%M"),
                comment.author,
                comment.text
            );
        }
    }
    Ok(())
}
