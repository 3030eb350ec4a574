//! `bd show` -- display one issue with its satellites.

use anyhow::Result;

use crate::cli::ShowArgs;
use crate::context::{CommandContext, resolve_id};
use crate::output::{issue_detail, output_json};

/// Execute the `bd show` command.
pub fn run(ctx: &CommandContext, args: &ShowArgs) -> Result<()> {
    let backend = ctx.open_backend()?;
    let store = backend.store();
    let id = resolve_id(store, &args.id)?;
    let issue = store.get_issue(&id)?;

    if ctx.json {
        output_json(&issue);
    } else {
        print!("{}", issue_detail(&issue));
    }
    Ok(())
}
