//! Issue struct -- the central domain model for the beads system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::comment::Comment;
use crate::dependency::Dependency;
use crate::enums::{IssueType, Status};

/// Helper for `skip_serializing_if` on `bool` fields.
fn is_false(b: &bool) -> bool {
    !b
}

/// Helper for `skip_serializing_if` on `Vec` fields.
fn is_empty_vec<T>(v: &Vec<T>) -> bool {
    v.is_empty()
}

/// Represents a trackable work item.
///
/// Scalar fields serialize into the canonical JSONL record; `String` fields
/// that are empty and `None` options are omitted so the projection stays
/// compact and diff-stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    // ===== Identification =====
    #[serde(default)]
    pub id: String,

    /// SHA-256 of canonical scalar content -- internal, never exported.
    #[serde(skip)]
    pub content_hash: String,

    // ===== Content =====
    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub design: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub acceptance_criteria: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spec_id: String,

    // ===== Status & workflow =====
    #[serde(default)]
    pub status: Status,

    /// Priority 0-4, 0 is highest. Always serialized: 0 is meaningful.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub issue_type: IssueType,

    // ===== Actors =====
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub assignee: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,

    /// Sending actor for message-style issues.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender: String,

    // ===== External linkage =====
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_system: String,

    // ===== Timestamps =====
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defer_until: Option<DateTime<Utc>>,

    // ===== Sizing & closure =====
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<i32>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub close_reason: String,

    /// Arbitrary JSON payload for extension points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,

    // ===== Projection markers =====
    /// Transient issues are never projected to JSONL.
    #[serde(default, skip_serializing_if = "is_false")]
    pub ephemeral: bool,

    /// Pinned issues are excluded from cleanup sweeps.
    #[serde(default, skip_serializing_if = "is_false")]
    pub pinned: bool,

    // ===== Gate scheduling hints =====
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub await_type: String,

    /// Max wait before escalation, stored as whole seconds.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timeout_secs"
    )]
    pub timeout: Option<std::time::Duration>,

    /// Message-thread link to another issue id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replies_to: String,

    // ===== Tombstone bookkeeping (DB only, never exported) =====
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    pub deleted_by: String,

    #[serde(skip)]
    pub delete_reason: String,

    // ===== Relational satellites (hydrated for export/show) =====
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub labels: Vec<String>,

    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub dependencies: Vec<Dependency>,

    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub comments: Vec<Comment>,
}

/// Serde helper for `Option<std::time::Duration>` stored as whole seconds.
mod timeout_secs {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dur: &Option<std::time::Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dur {
            Some(d) => serializer.serialize_u64(d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<std::time::Duration>, D::Error> {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.filter(|s| *s > 0).map(std::time::Duration::from_secs))
    }
}

impl Default for Issue {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            content_hash: String::new(),
            title: String::new(),
            description: String::new(),
            design: String::new(),
            acceptance_criteria: String::new(),
            notes: String::new(),
            spec_id: String::new(),
            status: Status::Open,
            priority: 2,
            issue_type: IssueType::Task,
            assignee: String::new(),
            created_by: String::new(),
            sender: String::new(),
            external_ref: None,
            source_system: String::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            due_at: None,
            defer_until: None,
            estimated_minutes: None,
            close_reason: String::new(),
            metadata: None,
            ephemeral: false,
            pinned: false,
            await_type: String::new(),
            timeout: None,
            replies_to: String::new(),
            deleted_at: None,
            deleted_by: String::new(),
            delete_reason: String::new(),
            labels: Vec::new(),
            dependencies: Vec::new(),
            comments: Vec::new(),
        }
    }
}

impl Issue {
    /// Computes the SHA-256 content hash over canonical scalar content.
    ///
    /// Covers the fields a human would consider "the issue"; excludes id,
    /// timestamps, tombstone bookkeeping and relational satellites so that
    /// re-imports and renames do not change the hash.
    pub fn compute_content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let mut part = |s: &str| {
            hasher.update(s.as_bytes());
            hasher.update([0]);
        };
        part(&self.title);
        part(&self.description);
        part(&self.design);
        part(&self.acceptance_criteria);
        part(&self.notes);
        part(self.status.as_str());
        part(&self.priority.to_string());
        part(self.issue_type.as_str());
        part(&self.assignee);
        part(self.external_ref.as_deref().unwrap_or(""));
        part(&self.close_reason);
        part(if self.pinned { "true" } else { "false" });
        format!("{:x}", hasher.finalize())
    }

    /// Returns `true` if this is a tombstone older than `retention_days`.
    ///
    /// A tombstone with no recorded deletion time falls back to `updated_at`
    /// (the import path does not carry `deleted_at` across clones).
    pub fn is_expired_tombstone(&self, retention_days: u64, now: DateTime<Utc>) -> bool {
        if self.status != Status::Tombstone || retention_days == 0 {
            return false;
        }
        let anchor = self.deleted_at.unwrap_or(self.updated_at);
        // Clamped: chrono rejects spans near i64::MAX days.
        let days = i64::try_from(retention_days).unwrap_or(i64::MAX).min(3_650_000);
        now > anchor + chrono::Duration::days(days)
    }

    /// Strips relational satellites, for tombstone projection.
    pub fn without_satellites(mut self) -> Self {
        self.labels.clear();
        self.dependencies.clear();
        self.comments.clear();
        self
    }
}

/// Builder for constructing an [`Issue`] with a fluent API.
pub struct IssueBuilder {
    issue: Issue,
}

impl IssueBuilder {
    /// Creates a new builder with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        let mut issue = Issue::default();
        issue.title = title.into();
        Self { issue }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.issue.id = id.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.issue.description = description.into();
        self
    }

    pub fn design(mut self, design: impl Into<String>) -> Self {
        self.issue.design = design.into();
        self
    }

    pub fn acceptance_criteria(mut self, ac: impl Into<String>) -> Self {
        self.issue.acceptance_criteria = ac.into();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.issue.notes = notes.into();
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.issue.status = status;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.issue.priority = priority;
        self
    }

    pub fn issue_type(mut self, issue_type: IssueType) -> Self {
        self.issue.issue_type = issue_type;
        self
    }

    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.issue.assignee = assignee.into();
        self
    }

    pub fn created_by(mut self, by: impl Into<String>) -> Self {
        self.issue.created_by = by.into();
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.issue.sender = sender.into();
        self
    }

    pub fn external_ref(mut self, ext: impl Into<String>) -> Self {
        self.issue.external_ref = Some(ext.into());
        self
    }

    pub fn created_at(mut self, t: DateTime<Utc>) -> Self {
        self.issue.created_at = t;
        self
    }

    pub fn updated_at(mut self, t: DateTime<Utc>) -> Self {
        self.issue.updated_at = t;
        self
    }

    pub fn due_at(mut self, t: DateTime<Utc>) -> Self {
        self.issue.due_at = Some(t);
        self
    }

    pub fn defer_until(mut self, t: DateTime<Utc>) -> Self {
        self.issue.defer_until = Some(t);
        self
    }

    pub fn estimated_minutes(mut self, minutes: i32) -> Self {
        self.issue.estimated_minutes = Some(minutes);
        self
    }

    pub fn metadata(mut self, json: impl Into<String>) -> Self {
        self.issue.metadata = Some(json.into());
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.issue.ephemeral = ephemeral;
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.issue.pinned = pinned;
        self
    }

    pub fn await_type(mut self, t: impl Into<String>) -> Self {
        self.issue.await_type = t.into();
        self
    }

    pub fn timeout(mut self, d: std::time::Duration) -> Self {
        self.issue.timeout = Some(d);
        self
    }

    pub fn replies_to(mut self, id: impl Into<String>) -> Self {
        self.issue.replies_to = id.into();
        self
    }

    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.issue.labels = labels;
        self
    }

    /// Consumes the builder and returns the constructed [`Issue`].
    pub fn build(self) -> Issue {
        self.issue
    }
}
