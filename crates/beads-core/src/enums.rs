//! Enum types for the beads system.
//!
//! `Status` and `DependencyType` are closed sets: the wire format fixes their
//! vocabulary and unknown strings are parse errors. `IssueType` and
//! `EventType` carry a `Custom(String)` fallback so workspace-configured
//! types and future event kinds round-trip without schema changes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing a closed enum from an unknown string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    /// Which enum was being parsed (e.g. "status").
    pub kind: &'static str,
    /// The offending input.
    pub value: String,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Issue lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Closed,
    /// Retained solely to block resurrection across merges.
    Tombstone,
}

impl Status {
    /// Returns the string representation used in storage and JSONL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
            Self::Tombstone => "tombstone",
        }
    }

    /// Open or in-progress: eligible for the ready queue.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }

    /// Closed or tombstoned.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Tombstone)
    }

    /// All valid status strings, for error messages.
    pub fn all() -> &'static [&'static str] {
        &["open", "in_progress", "blocked", "closed", "tombstone"]
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "closed" => Ok(Self::Closed),
            "tombstone" => Ok(Self::Tombstone),
            other => Err(UnknownVariant {
                kind: "status",
                value: other.to_owned(),
            }),
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// IssueType
// ---------------------------------------------------------------------------

/// Issue type category.
///
/// The builtin set is always valid; additional types come from the workspace
/// `types.custom` config and parse into [`IssueType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum IssueType {
    #[default]
    Task,
    Bug,
    Feature,
    Chore,
    Epic,
    Custom(String),
}

impl IssueType {
    /// Returns the string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Chore => "chore",
            Self::Epic => "epic",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Returns `true` if this is a builtin (non-custom) type.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Returns `true` if this type is builtin or appears in `custom_types`.
    pub fn is_valid_with_custom(&self, custom_types: &[String]) -> bool {
        match self {
            Self::Custom(s) => custom_types.iter().any(|c| c == s),
            _ => true,
        }
    }

    /// The builtin type names, for error messages.
    pub fn builtins() -> &'static [&'static str] {
        &["task", "bug", "feature", "chore", "epic"]
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for IssueType {
    fn from(s: &str) -> Self {
        match s {
            "task" => Self::Task,
            "bug" => Self::Bug,
            "feature" => Self::Feature,
            "chore" => Self::Chore,
            "epic" => Self::Epic,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl From<String> for IssueType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "task" => Self::Task,
            "bug" => Self::Bug,
            "feature" => Self::Feature,
            "chore" => Self::Chore,
            "epic" => Self::Epic,
            _ => Self::Custom(s),
        }
    }
}

impl Serialize for IssueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IssueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

// ---------------------------------------------------------------------------
// DependencyType
// ---------------------------------------------------------------------------

/// Directed relationship type between issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyType {
    Blocks,
    ParentChild,
    Related,
    Duplicates,
    DiscoveredFrom,
}

impl DependencyType {
    /// Returns the kebab-case string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::ParentChild => "parent-child",
            Self::Related => "related",
            Self::Duplicates => "duplicates",
            Self::DiscoveredFrom => "discovered-from",
        }
    }

    /// Edge types that gate the ready queue and participate in cycle checks.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocks | Self::ParentChild)
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocks" => Ok(Self::Blocks),
            "parent-child" => Ok(Self::ParentChild),
            "related" => Ok(Self::Related),
            "duplicates" => Ok(Self::Duplicates),
            "discovered-from" => Ok(Self::DiscoveredFrom),
            other => Err(UnknownVariant {
                kind: "dependency type",
                value: other.to_owned(),
            }),
        }
    }
}

impl Serialize for DependencyType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DependencyType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Audit event kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Updated,
    StatusChanged,
    DependencyAdded,
    DependencyRemoved,
    LabelAdded,
    LabelRemoved,
    Commented,
    Renamed,
    Tombstoned,
    Resurrected,
    Custom(String),
}

impl EventType {
    /// Returns the string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::StatusChanged => "status_changed",
            Self::DependencyAdded => "dependency_added",
            Self::DependencyRemoved => "dependency_removed",
            Self::LabelAdded => "label_added",
            Self::LabelRemoved => "label_removed",
            Self::Commented => "commented",
            Self::Renamed => "renamed",
            Self::Tombstoned => "tombstoned",
            Self::Resurrected => "resurrected",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "updated" => Self::Updated,
            "status_changed" => Self::StatusChanged,
            "dependency_added" => Self::DependencyAdded,
            "dependency_removed" => Self::DependencyRemoved,
            "label_added" => Self::LabelAdded,
            "label_removed" => Self::LabelRemoved,
            "commented" => Self::Commented,
            "renamed" => Self::Renamed,
            "tombstoned" => Self::Tombstoned,
            "resurrected" => Self::Resurrected,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_roundtrip() {
        for s in Status::all() {
            let parsed: Status = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("deferred".parse::<Status>().is_err());
    }

    #[test]
    fn status_serde_rejects_unknown() {
        let ok: Status = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(ok, Status::InProgress);
        assert!(serde_json::from_str::<Status>("\"bogus\"").is_err());
    }

    #[test]
    fn issue_type_custom_fallback() {
        let t = IssueType::from("molecule");
        assert_eq!(t, IssueType::Custom("molecule".into()));
        assert!(!t.is_builtin());
        assert!(t.is_valid_with_custom(&["molecule".into()]));
        assert!(!t.is_valid_with_custom(&[]));
    }

    #[test]
    fn dependency_type_kebab_case() {
        let d: DependencyType = serde_json::from_str("\"parent-child\"").unwrap();
        assert_eq!(d, DependencyType::ParentChild);
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"parent-child\"");
        assert!(DependencyType::ParentChild.is_blocking());
        assert!(!DependencyType::Related.is_blocking());
    }

    #[test]
    fn event_type_custom_roundtrip() {
        let e = EventType::from("refiled");
        assert_eq!(serde_json::to_string(&e).unwrap(), "\"refiled\"");
    }
}
