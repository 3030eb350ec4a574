//! `bd daemon` -- control the per-workspace daemon.

use anyhow::Result;

use crate::cli::{DaemonArgs, DaemonCommands};
use crate::context::CommandContext;
use crate::output::output_json;

/// Execute the `bd daemon` command.
pub fn run(ctx: &CommandContext, args: &DaemonArgs) -> Result<()> {
    match &args.command {
        DaemonCommands::Start => start(ctx),
        DaemonCommands::Stop => stop(ctx),
        DaemonCommands::Status => status(ctx),
    }
}

#[cfg(unix)]
fn start(ctx: &CommandContext) -> Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use beads_daemon::{Daemon, DaemonPaths};
    use beads_storage::{SqliteStore, Storage};
    use beads_sync::{DeletionManifest, ExportOptions, FlushManager};

    ctx.require_writable()?;
    let workspace = ctx.require_workspace()?.clone();
    let paths = DaemonPaths::in_dir(workspace.root());

    let store: Arc<dyn Storage> = Arc::new(SqliteStore::open(workspace.db_path())?);
    let flush = FlushManager::new(
        workspace.jsonl_path(),
        workspace.lock_path(),
        Duration::from_millis(ctx.config.flush.debounce_ms),
        ExportOptions {
            retention_days: ctx.config.retention.tombstone_days,
        },
    );
    let manifest = DeletionManifest::new(workspace.deletions_path());
    let daemon = Daemon::new(store, flush, manifest);

    // SIGINT/SIGTERM exit cleanly, flushing pending state first.
    {
        let daemon = daemon.clone();
        ctrlc::set_handler(move || daemon.request_shutdown())?;
    }

    println!("daemon listening on {}", paths.socket_path.display());
    daemon.run(&paths)?;
    println!("daemon stopped");
    Ok(())
}

#[cfg(not(unix))]
fn start(_ctx: &CommandContext) -> Result<()> {
    anyhow::bail!("the daemon requires UNIX-domain sockets on this platform")
}

#[cfg(unix)]
fn stop(ctx: &CommandContext) -> Result<()> {
    let workspace = ctx.require_workspace()?;
    let paths = beads_daemon::DaemonPaths::in_dir(workspace.root());

    let client = beads_daemon::DaemonClient::new(&paths.socket_path);
    if client.ping().is_none() {
        println!("no daemon running");
        return Ok(());
    }
    client.shutdown()?;
    println!("daemon stopping");
    Ok(())
}

#[cfg(not(unix))]
fn stop(_ctx: &CommandContext) -> Result<()> {
    anyhow::bail!("the daemon requires UNIX-domain sockets on this platform")
}

fn status(ctx: &CommandContext) -> Result<()> {
    let workspace = ctx.require_workspace()?;
    let paths = beads_daemon::DaemonPaths::in_dir(workspace.root());
    let pid = paths.live_pid();

    if ctx.json {
        output_json(&serde_json::json!({ "running": pid.is_some(), "pid": pid }));
    } else {
        match pid {
            Some(pid) => println!("daemon running (pid {pid})"),
            None => println!("no daemon running"),
        }
    }
    Ok(())
}
