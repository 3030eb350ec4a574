//! Field-level validation shared by create and update paths.

use crate::enums::IssueType;
use crate::issue::Issue;

/// Maximum accepted title length in characters.
pub const MAX_TITLE_LEN: usize = 500;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validates an issue against the workspace's configured custom types.
///
/// Returns every failure rather than stopping at the first one.
pub fn validate_issue(issue: &Issue, custom_types: &[String]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if issue.title.trim().is_empty() {
        errors.push(ValidationError {
            field: "title",
            message: "cannot be empty".into(),
        });
    } else if issue.title.chars().count() > MAX_TITLE_LEN {
        errors.push(ValidationError {
            field: "title",
            message: format!("longer than {MAX_TITLE_LEN} characters"),
        });
    }

    if !(0..=4).contains(&issue.priority) {
        errors.push(ValidationError {
            field: "priority",
            message: format!("must be 0-4, got {}", issue.priority),
        });
    }

    if !issue.issue_type.is_valid_with_custom(custom_types) {
        errors.push(ValidationError {
            field: "issue_type",
            message: format!(
                "unknown type '{}' (builtin: {})",
                issue.issue_type,
                IssueType::builtins().join(", ")
            ),
        });
    }

    errors
}
