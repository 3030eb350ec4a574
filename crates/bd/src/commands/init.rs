//! `bd init` -- scaffold a new workspace.

use anyhow::{Result, bail};

use beads_config::{BeadsConfig, Workspace, save_config};
use beads_storage::{SqliteStore, Storage};
use beads_sync::{ExportOptions, export_to_path};

use crate::cli::InitArgs;
use crate::context::CommandContext;

/// Execute the `bd init` command.
pub fn run(ctx: &CommandContext, args: &InitArgs) -> Result<()> {
    ctx.require_writable()?;

    let workspace = match &ctx.workspace {
        // An explicit --db always wins; otherwise init in the cwd even if
        // an enclosing workspace exists higher up.
        Some(ws) if ws.root().exists() && !args.force => {
            let cwd = std::env::current_dir()?;
            if ws.root() == cwd.join(beads_config::BEADS_DIR_NAME) {
                bail!(
                    "already initialized at {}\nhint: use --force to reinitialize",
                    ws.root().display()
                );
            }
            Workspace::at(cwd.join(beads_config::BEADS_DIR_NAME))
        }
        Some(ws) => ws.clone(),
        None => {
            let cwd = std::env::current_dir()?;
            Workspace::at(cwd.join(beads_config::BEADS_DIR_NAME))
        }
    };

    if workspace.db_path().exists() && !args.force {
        bail!(
            "already initialized at {}\nhint: use --force to reinitialize",
            workspace.root().display()
        );
    }

    workspace.scaffold()?;

    let mut config = BeadsConfig::default();
    config.prefix = Some(args.prefix.clone());
    save_config(workspace.root(), &config)?;

    let store = SqliteStore::open(workspace.db_path())?;
    store.set_config("issue_prefix", &args.prefix)?;
    store.set_config("bd_version", env!("CARGO_PKG_VERSION"))?;

    // Seed an empty canonical projection so git has something to track.
    export_to_path(&store, &workspace.jsonl_path(), &ExportOptions::default())?;

    if ctx.json {
        crate::output::output_json(&serde_json::json!({
            "initialized": workspace.root(),
            "prefix": args.prefix,
        }));
    } else {
        println!("Initialized beads workspace at {}", workspace.root().display());
        println!("  prefix: {}", args.prefix);
    }
    Ok(())
}
