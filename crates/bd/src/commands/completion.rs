//! `bd completion` -- shell completion generation.

use anyhow::Result;
use clap::CommandFactory;

use crate::cli::{Cli, CompletionArgs};
use crate::context::CommandContext;

/// Execute the `bd completion` command.
pub fn run(_ctx: &CommandContext, args: &CompletionArgs) -> Result<()> {
    let mut command = Cli::command();
    clap_complete::generate(args.shell, &mut command, "bd", &mut std::io::stdout());
    Ok(())
}
