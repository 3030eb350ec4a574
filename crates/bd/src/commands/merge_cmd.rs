//! `bd merge` -- three-way merge driver for issues.jsonl.
//!
//! Wired into git via `.gitattributes`:
//! `issues.jsonl merge=beads` with driver command
//! `bd merge %O %A %B -o %A`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use beads_sync::{DeletionManifest, SyncError, merge_files, publish};

use crate::cli::MergeArgs;
use crate::context::CommandContext;

/// Execute the `bd merge` command.
pub fn run(ctx: &CommandContext, args: &MergeArgs) -> Result<()> {
    // The manifest lives in the workspace, when one is discoverable; a bare
    // driver invocation outside any workspace still merges, minus deletion
    // enforcement.
    let deletions = match &ctx.workspace {
        Some(ws) => DeletionManifest::new(ws.deletions_path()).load()?,
        None => HashMap::new(),
    };

    let outcome = merge_files(
        Path::new(&args.base),
        Path::new(&args.local),
        Path::new(&args.remote),
        &deletions,
    )?;

    let (bytes, _) = beads_sync::export::serialize_records(&outcome.merged)?;
    let target = args
        .output
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&args.local));
    publish(&target, &bytes)?;

    if !ctx.json {
        eprintln!(
            "merged {} record(s), {} tombstoned by manifest",
            outcome.merged.len(),
            outcome.tombstoned.len()
        );
    }
    if !outcome.is_clean() {
        for conflict in &outcome.conflicts {
            eprintln!("conflict: {} field '{}'", conflict.id, conflict.field);
        }
        return Err(SyncError::ConflictUnresolved {
            count: outcome.conflicts.len(),
        }
        .into());
    }
    Ok(())
}
