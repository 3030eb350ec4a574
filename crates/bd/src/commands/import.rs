//! `bd import` -- reconcile a JSONL file into the store.

use std::path::PathBuf;

use anyhow::Result;

use beads_sync::import_from_path;

use crate::cli::ImportArgs;
use crate::context::CommandContext;
use crate::output::output_json;

/// Execute the `bd import` command.
pub fn run(ctx: &CommandContext, args: &ImportArgs) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;

    let input = args
        .input
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| backend.workspace().jsonl_path());

    let deletions = backend.manifest().load()?;
    let report = import_from_path(backend.store(), &input, &deletions)?;
    if report.applied() > 0 {
        backend.mark_dirty();
    }

    if ctx.json {
        output_json(&serde_json::json!({
            "created": report.created,
            "updated": report.updated,
            "skipped": report.skipped,
            "tombstoned": report.tombstoned,
            "errors": report.errors.len(),
        }));
    } else {
        println!(
            "Imported: {} created, {} updated, {} skipped, {} tombstoned",
            report.created, report.updated, report.skipped, report.tombstoned
        );
        for error in &report.errors {
            eprintln!("  line {}: {}", error.line, error.message);
        }
    }
    backend.finish()?;
    Ok(())
}
