//! `bd export` -- project the store to canonical JSONL.

use std::path::PathBuf;

use anyhow::Result;

use beads_sync::{ExportOptions, export_to_path, export_to_writer};

use crate::cli::ExportArgs;
use crate::context::CommandContext;
use crate::output::output_json;

/// Execute the `bd export` command.
pub fn run(ctx: &CommandContext, args: &ExportArgs) -> Result<()> {
    let backend = ctx.open_backend()?;
    let options = ExportOptions {
        retention_days: ctx.config.retention.tombstone_days,
    };

    let (target, exported) = match args.output.as_deref() {
        Some("-") => {
            let stats = export_to_writer(backend.store(), &mut std::io::stdout().lock(), &options)?;
            return report(ctx, "stdout", stats.exported);
        }
        Some(path) => {
            let stats = export_to_path(backend.store(), &PathBuf::from(path), &options)?;
            (path.to_owned(), stats.exported)
        }
        None => {
            let exported = backend.flush_now(None)?;
            (
                backend.workspace().jsonl_path().display().to_string(),
                exported,
            )
        }
    };
    report(ctx, &target, exported)
}

fn report(ctx: &CommandContext, target: &str, exported: usize) -> Result<()> {
    if ctx.json {
        output_json(&serde_json::json!({ "exported": exported, "target": target }));
    } else {
        println!("Exported {exported} issue(s) to {target}");
    }
    Ok(())
}
