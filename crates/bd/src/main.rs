//! `bd` -- dependency-aware issue tracker CLI.
//!
//! Parses arguments with clap, builds the [`CommandContext`], and
//! dispatches to command handlers. Exit codes: 0 success, 1 user error,
//! 2 engine error.

mod cli;
mod commands;
mod context;
mod output;

use clap::Parser;

use beads_storage::StorageError;
use beads_sync::SyncError;

use cli::{Cli, Commands};
use context::CommandContext;

fn main() {
    let cli = Cli::parse();
    let ctx = CommandContext::from_global_args(&cli.global);

    if ctx.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("bd=debug,beads_storage=debug,beads_sync=debug,beads_daemon=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Some(Commands::Init(args)) => commands::init::run(&ctx, &args),
        Some(Commands::Create(args)) => commands::create::run(&ctx, &args),
        Some(Commands::Update(args)) => commands::update::run(&ctx, &args),
        Some(Commands::Show(args)) => commands::show::run(&ctx, &args),
        Some(Commands::List(args)) => commands::list::run(&ctx, &args),
        Some(Commands::Ready(args)) => commands::ready::run(&ctx, &args),
        Some(Commands::Blocked) => commands::ready::run_blocked(&ctx),
        Some(Commands::Close(args)) => commands::status_ops::run_close(&ctx, &args),
        Some(Commands::Reopen(args)) => commands::status_ops::run_reopen(&ctx, &args),
        Some(Commands::Delete(args)) => commands::delete::run(&ctx, &args),
        Some(Commands::Rename(args)) => commands::rename::run(&ctx, &args),
        Some(Commands::Refile(args)) => commands::refile::run(&ctx, &args),
        Some(Commands::Dep(args)) => commands::dep::run(&ctx, &args),
        Some(Commands::Label(args)) => commands::label::run(&ctx, &args),
        Some(Commands::Comment(args)) => commands::comment::run_add(&ctx, &args),
        Some(Commands::Comments(args)) => commands::comment::run_list(&ctx, &args),
        Some(Commands::Export(args)) => commands::export::run(&ctx, &args),
        Some(Commands::Import(args)) => commands::import::run(&ctx, &args),
        Some(Commands::Stats) => commands::stats::run(&ctx),
        Some(Commands::Types(args)) => commands::types_cmd::run(&ctx, &args),
        Some(Commands::Admin(args)) => commands::admin::run(&ctx, &args),
        Some(Commands::Daemon(args)) => commands::daemon_cmd::run(&ctx, &args),
        Some(Commands::Merge(args)) => commands::merge_cmd::run(&ctx, &args),
        Some(Commands::Completion(args)) => commands::completion::run(&ctx, &args),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        let code = exit_code_for(&e);
        if ctx.json {
            output::output_json(&serde_json::json!({
                "error": format!("{e:#}"),
            }));
        } else {
            eprintln!("error: {e}");
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            if let Some(hint) = hint_for(&e) {
                eprintln!("hint: {hint}");
            }
        }
        std::process::exit(code);
    }
}

/// Maps an error to the documented exit classes: 1 for user errors, 2 for
/// engine failures. Plain anyhow messages (usage problems raised by command
/// handlers) count as user errors.
fn exit_code_for(e: &anyhow::Error) -> i32 {
    if let Some(storage) = e.downcast_ref::<StorageError>() {
        return if storage.is_user_error() { 1 } else { 2 };
    }
    if let Some(sync) = e.downcast_ref::<SyncError>() {
        return match sync {
            SyncError::ConflictUnresolved { .. } => 1,
            SyncError::Storage(storage) if storage.is_user_error() => 1,
            _ => 2,
        };
    }
    if e.downcast_ref::<beads_lockfile::LockError>().is_some()
        || e.downcast_ref::<beads_daemon::LifecycleError>().is_some()
        || e.downcast_ref::<std::io::Error>().is_some()
    {
        return 2;
    }
    1
}

fn hint_for(e: &anyhow::Error) -> Option<&'static str> {
    e.downcast_ref::<StorageError>().and_then(|s| s.hint())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_classification() {
        let user: anyhow::Error = StorageError::not_found("issue", "bd-x").into();
        assert_eq!(exit_code_for(&user), 1);

        let engine: anyhow::Error = StorageError::LockTimeout.into();
        assert_eq!(exit_code_for(&engine), 2);

        let conflict: anyhow::Error = SyncError::ConflictUnresolved { count: 2 }.into();
        assert_eq!(exit_code_for(&conflict), 1);

        let usage = anyhow::anyhow!("title required");
        assert_eq!(exit_code_for(&usage), 1);
    }
}
