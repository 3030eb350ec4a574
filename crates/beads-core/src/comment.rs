//! Comments and audit events attached to issues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::EventType;

/// A comment on an issue.
///
/// The JSONL projection carries only `(author, text, created_at)`; the row id
/// and owning issue are implied by position and never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(skip)]
    pub id: i64,

    #[serde(skip)]
    pub issue_id: String,

    pub author: String,

    pub text: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// The identity key used when appending missing comments on import.
    pub fn key(&self) -> (String, DateTime<Utc>) {
        (self.author.clone(), self.created_at)
    }
}

/// An audit record for a single mutation on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub issue_id: String,
    pub event_type: EventType,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_serializes_without_row_ids() {
        let comment = Comment {
            id: 7,
            issue_id: "bd-x".into(),
            author: "alice".into(),
            text: "looks good".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&comment).unwrap();
        assert!(json.contains("\"author\":\"alice\""));
        assert!(!json.contains("issue_id"));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = Event {
            id: 1,
            issue_id: "bd-x".into(),
            event_type: EventType::StatusChanged,
            actor: "bot".into(),
            old_value: Some("open".into()),
            new_value: Some("closed".into()),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"status_changed\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, EventType::StatusChanged);
    }
}
