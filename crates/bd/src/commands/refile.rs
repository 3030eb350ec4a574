//! `bd refile` -- move an issue into another workspace.

use std::path::PathBuf;

use anyhow::{Result, bail};

use beads_config::Workspace;
use beads_storage::{SqliteStore, Storage, StorageError};
use beads_sync::{DeletionRecord, ExportOptions, export_to_path};

use crate::cli::RefileArgs;
use crate::context::{CommandContext, resolve_id};
use crate::output::output_json;

/// Execute the `bd refile` command.
///
/// Copies the issue (with labels and comments) into the target workspace's
/// store, then tombstones it locally with a manifest record. Dependency
/// edges do not cross workspaces and are dropped.
pub fn run(ctx: &CommandContext, args: &RefileArgs) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let store = backend.store();
    let id = resolve_id(store, &args.id)?;
    let issue = store.get_issue(&id)?;

    if issue.ephemeral {
        bail!("ephemeral issues are transient and cannot be refiled");
    }

    let target_ws = Workspace::at(PathBuf::from(&args.to));
    if !target_ws.db_path().exists() {
        bail!(
            "no workspace at {}\nhint: run 'bd init' there first",
            target_ws.root().display()
        );
    }
    let target = SqliteStore::open(target_ws.db_path())?;
    if target.id_exists(&id)? {
        return Err(StorageError::Duplicate { id }.into());
    }

    let mut moved = issue;
    moved.dependencies.clear();
    target.apply_import_record(&moved)?;
    export_to_path(
        &target,
        &target_ws.jsonl_path(),
        &ExportOptions {
            retention_days: ctx.config.retention.tombstone_days,
        },
    )?;

    let reason = format!("refiled to {}", target_ws.root().display());
    store.delete_issue(&id, &ctx.actor, &reason, false)?;
    backend
        .manifest()
        .append(&[DeletionRecord::new(id.clone(), &ctx.actor, &reason)])?;
    backend.mark_dirty();

    if ctx.json {
        output_json(&serde_json::json!({
            "refiled": id,
            "to": target_ws.root(),
        }));
    } else {
        println!("Refiled {id} to {}", target_ws.root().display());
    }
    backend.finish()?;
    Ok(())
}
