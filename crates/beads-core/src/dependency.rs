//! Dependency edges -- directed relationships between issues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::DependencyType;

/// A directed edge `issue_id -> depends_on_id`.
///
/// Stored once per edge; the export projection mirrors `parent-child` edges
/// onto both endpoints so either side alone reconstructs the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub issue_id: String,

    pub depends_on_id: String,

    /// Edge type (serialized as "type").
    #[serde(rename = "type")]
    pub dep_type: DependencyType,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,
}

impl Dependency {
    /// Creates an edge with the current timestamp.
    pub fn new(
        issue_id: impl Into<String>,
        depends_on_id: impl Into<String>,
        dep_type: DependencyType,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            depends_on_id: depends_on_id.into(),
            dep_type,
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }

    /// The identity key used for set-union semantics during merge/import.
    pub fn key(&self) -> (String, String, DependencyType) {
        (
            self.issue_id.clone(),
            self.depends_on_id.clone(),
            self.dep_type,
        )
    }

    /// Returns `true` if `id` is either endpoint.
    pub fn touches(&self, id: &str) -> bool {
        self.issue_id == id || self.depends_on_id == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serde_uses_type_key() {
        let dep = Dependency::new("bd-a", "bd-b", DependencyType::Blocks, "alice");
        let json = serde_json::to_string(&dep).unwrap();
        assert!(json.contains(r#""type":"blocks""#));

        let back: Dependency = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dep_type, DependencyType::Blocks);
        assert_eq!(back.issue_id, "bd-a");
    }

    #[test]
    fn touches_either_endpoint() {
        let dep = Dependency::new("bd-a", "bd-b", DependencyType::Related, "");
        assert!(dep.touches("bd-a"));
        assert!(dep.touches("bd-b"));
        assert!(!dep.touches("bd-c"));
    }
}
