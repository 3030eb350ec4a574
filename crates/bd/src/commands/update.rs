//! `bd update` -- apply partial updates to an issue.

use anyhow::{Result, bail};

use beads_core::enums::{IssueType, Status};
use beads_storage::{IssuePatch, StorageError};

use crate::cli::UpdateArgs;
use crate::context::{CommandContext, resolve_id};
use crate::output::{issue_line, output_json};

/// Execute the `bd update` command.
pub fn run(ctx: &CommandContext, args: &UpdateArgs) -> Result<()> {
    ctx.require_writable()?;
    let backend = ctx.open_backend()?;
    let store = backend.store();
    let id = resolve_id(store, &args.id)?;

    let mut patch = IssuePatch {
        title: args.title.clone(),
        description: args.description.clone(),
        design: args.design.clone(),
        acceptance_criteria: args.acceptance_criteria.clone(),
        notes: args.notes.clone(),
        assignee: args.assignee.clone(),
        estimated_minutes: args.estimate.map(Some),
        ..Default::default()
    };
    if let Some(status) = &args.status {
        patch.status = Some(status.parse::<Status>().map_err(|e| anyhow::anyhow!("{e}"))?);
    }
    if let Some(priority) = &args.priority {
        patch.priority = Some(super::create::parse_priority(priority)?);
    }
    if let Some(issue_type) = &args.issue_type {
        patch.issue_type = Some(IssueType::from(issue_type.as_str()));
    }
    for pair in &args.set {
        apply_set(&mut patch, pair)?;
    }
    if patch.is_empty() {
        bail!("nothing to update\nhint: pass at least one field flag or --set");
    }

    let updated = store.update_issue(&id, &patch, &ctx.actor)?;
    backend.mark_dirty();

    if ctx.json {
        output_json(&updated);
    } else {
        println!("Updated {}", issue_line(&updated));
    }
    backend.finish()?;
    Ok(())
}

/// Applies one `--set field=value` pair to the patch.
///
/// Immutable columns surface as `ReadOnlyField`, unknown names as a user
/// error naming the valid set.
fn apply_set(patch: &mut IssuePatch, pair: &str) -> Result<()> {
    let Some((field, value)) = pair.split_once('=') else {
        bail!("invalid --set '{pair}': expected field=value");
    };
    let field = field.trim();
    let value = value.trim();

    if IssuePatch::is_read_only_field(field) {
        return Err(StorageError::ReadOnlyField {
            field: field.to_owned(),
        }
        .into());
    }

    match field {
        "title" => patch.title = Some(value.to_owned()),
        "description" => patch.description = Some(value.to_owned()),
        "design" => patch.design = Some(value.to_owned()),
        "acceptance_criteria" => patch.acceptance_criteria = Some(value.to_owned()),
        "notes" => patch.notes = Some(value.to_owned()),
        "status" => patch.status = Some(value.parse::<Status>().map_err(|e| anyhow::anyhow!("{e}"))?),
        "priority" => patch.priority = Some(super::create::parse_priority(value)?),
        "type" | "issue_type" => patch.issue_type = Some(IssueType::from(value)),
        "assignee" => patch.assignee = Some(value.to_owned()),
        "sender" => patch.sender = Some(value.to_owned()),
        "external_ref" => {
            patch.external_ref = Some(if value.is_empty() {
                None
            } else {
                Some(value.to_owned())
            });
        }
        "source_system" => patch.source_system = Some(value.to_owned()),
        "close_reason" => patch.close_reason = Some(value.to_owned()),
        "spec_id" => patch.spec_id = Some(value.to_owned()),
        "metadata" => {
            patch.metadata = Some(if value.is_empty() {
                None
            } else {
                Some(value.to_owned())
            });
        }
        "await_type" => patch.await_type = Some(value.to_owned()),
        "replies_to" => patch.replies_to = Some(value.to_owned()),
        "estimated_minutes" => {
            patch.estimated_minutes = Some(if value.is_empty() {
                None
            } else {
                Some(value.parse()?)
            });
        }
        "ephemeral" => patch.ephemeral = Some(value.parse()?),
        "pinned" => patch.pinned = Some(value.parse()?),
        other => bail!("unknown field '{other}'\nhint: see 'bd update --help' for valid fields"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_parses_fields() {
        let mut patch = IssuePatch::default();
        apply_set(&mut patch, "title=New title").unwrap();
        apply_set(&mut patch, "priority=P1").unwrap();
        apply_set(&mut patch, "status=in_progress").unwrap();
        assert_eq!(patch.title.as_deref(), Some("New title"));
        assert_eq!(patch.priority, Some(1));
        assert_eq!(patch.status, Some(Status::InProgress));
    }

    #[test]
    fn set_rejects_immutable_columns() {
        let mut patch = IssuePatch::default();
        let err = apply_set(&mut patch, "id=bd-new").unwrap_err();
        let storage = err.downcast_ref::<StorageError>().unwrap();
        assert!(matches!(storage, StorageError::ReadOnlyField { .. }));

        assert!(apply_set(&mut patch, "created_at=2026-01-01").is_err());
    }

    #[test]
    fn set_rejects_unknown_fields() {
        let mut patch = IssuePatch::default();
        let err = apply_set(&mut patch, "velocity=9000").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn set_clears_optionals_with_empty_value() {
        let mut patch = IssuePatch::default();
        apply_set(&mut patch, "external_ref=").unwrap();
        assert_eq!(patch.external_ref, Some(None));
    }
}
