//! `bd create` -- create a new issue.

use anyhow::{Context as _, Result, bail};

use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, IssueType};
use beads_core::issue::IssueBuilder;
use beads_core::validation::validate_issue;
use beads_storage::{generate_child_id, generate_issue_id};

use crate::cli::CreateArgs;
use crate::context::{CommandContext, resolve_id};
use crate::output::output_json;

/// Execute the `bd create` command.
pub fn run(ctx: &CommandContext, args: &CreateArgs) -> Result<()> {
    ctx.require_writable()?;

    // Ephemeral issues never touch JSONL, so they always bypass the daemon.
    let backend = if args.ephemeral {
        ctx.open_backend_bypassing_daemon()?
    } else {
        ctx.open_backend()?
    };
    let store = backend.store();

    let priority = parse_priority(&args.priority)?;
    let issue_type = IssueType::from(args.issue_type.as_str());

    let prefix = store
        .get_config("issue_prefix")?
        .unwrap_or_else(|| ctx.config.prefix_or_default().to_owned());

    let parent = match &args.parent {
        Some(parent) => Some(resolve_id(store, parent)?),
        None => None,
    };

    let id = if let Some(explicit) = &args.id {
        explicit.clone()
    } else if let Some(parent) = &parent {
        generate_child_id(store, parent)?
    } else {
        generate_issue_id(store, &prefix, &args.title, &ctx.actor)?
    };

    let mut builder = IssueBuilder::new(&args.title)
        .id(&id)
        .priority(priority)
        .issue_type(issue_type)
        .created_by(&ctx.actor)
        .ephemeral(args.ephemeral)
        .pinned(args.pinned);
    if let Some(description) = &args.description {
        builder = builder.description(description);
    }
    if let Some(assignee) = &args.assignee {
        builder = builder.assignee(assignee);
    }
    let issue = builder.build();

    let problems = validate_issue(&issue, &store.get_custom_types()?);
    if let Some(first) = problems.first() {
        bail!("invalid issue: {first}");
    }

    store.create_issue(&issue, &ctx.actor)?;

    for label in flatten_labels(&args.labels) {
        store.add_label(&id, &label, &ctx.actor)?;
    }

    if let Some(parent) = &parent {
        store.add_dependency(
            &Dependency::new(&id, parent, DependencyType::ParentChild, &ctx.actor),
            &ctx.actor,
        )?;
    }
    for target in &args.deps {
        let target = resolve_id(store, target)
            .with_context(|| format!("dependency target '{target}'"))?;
        store.add_dependency(
            &Dependency::new(&id, &target, DependencyType::Blocks, &ctx.actor),
            &ctx.actor,
        )?;
    }

    if !args.ephemeral {
        backend.mark_dirty();
    }

    if ctx.json {
        let created = store.get_issue(&id)?;
        output_json(&created);
    } else if args.silent {
        println!("{id}");
    } else {
        println!("Created issue: {id}");
        println!("  Title: {}", args.title);
        println!("  Priority: P{priority}");
        if let Some(parent) = &parent {
            println!("  Parent: {parent}");
        }
    }

    backend.finish()?;
    Ok(())
}

/// Splits repeatable and comma-separated label arguments.
fn flatten_labels(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|chunk| chunk.split(','))
        .map(|l| l.trim().to_owned())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Parses "2" or "P2"/"p2" into a priority.
pub(crate) fn parse_priority(s: &str) -> Result<i32> {
    let s = s.trim();
    let digits = s.strip_prefix(['P', 'p']).unwrap_or(s);
    let p: i32 = digits
        .parse()
        .with_context(|| format!("invalid priority '{s}': expected 0-4 or P0-P4"))?;
    if !(0..=4).contains(&p) {
        bail!("priority must be between 0 and 4 (got {p})");
    }
    Ok(p)
}
