//! In-memory storage backend.
//!
//! Table-per-map rendition of the SQLite schema, used by tests and anywhere
//! a throwaway store is cheaper than a database file. Transactions are
//! copy-on-write: the closure runs against a clone of the state which only
//! replaces the live state on success.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use beads_core::comment::{Comment, Event};
use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, EventType, Status};
use beads_core::filter::{IssueFilter, WorkFilter};
use beads_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::traits::{
    BlockedIssue, ImportAction, IssuePatch, Statistics, Storage, Transaction,
};

/// All tables, cloneable for copy-on-write transactions.
#[derive(Debug, Clone, Default)]
struct Inner {
    issues: HashMap<String, Issue>,
    labels: HashMap<String, BTreeSet<String>>,
    comments: HashMap<String, Vec<Comment>>,
    events: HashMap<String, Vec<Event>>,
    deps: Vec<Dependency>,
    config: HashMap<String, String>,
    next_comment_id: i64,
    next_event_id: i64,
}

/// In-memory implementation of the [`Storage`] trait.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with the same config defaults as the SQLite
    /// backend.
    pub fn new() -> Self {
        let mut inner = Inner {
            next_comment_id: 1,
            next_event_id: 1,
            ..Default::default()
        };
        for &(key, value) in crate::sqlite::DEFAULT_CONFIG {
            inner.config.insert(key.to_owned(), value.to_owned());
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("mutex poisoned: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Table-level operations (shared between store and transaction views)
// ---------------------------------------------------------------------------

impl Inner {
    fn ensure_exists(&self, id: &str) -> Result<()> {
        if self.issues.contains_key(id) {
            Ok(())
        } else {
            Err(StorageError::not_found("issue", id))
        }
    }

    fn emit(&mut self, issue_id: &str, event_type: EventType, actor: &str, old: Option<String>, new: Option<String>) {
        let event = Event {
            id: self.next_event_id,
            issue_id: issue_id.to_owned(),
            event_type,
            actor: actor.to_owned(),
            old_value: old,
            new_value: new,
            created_at: Utc::now(),
        };
        self.next_event_id += 1;
        self.events.entry(issue_id.to_owned()).or_default().push(event);
    }

    fn custom_types(&self) -> Vec<String> {
        self.config
            .get("types.custom")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate_type(&self, issue: &Issue) -> Result<()> {
        if issue.issue_type.is_valid_with_custom(&self.custom_types()) {
            Ok(())
        } else {
            Err(StorageError::InvalidType {
                value: issue.issue_type.as_str().to_owned(),
            })
        }
    }

    fn create(&mut self, issue: &Issue, actor: &str, validate: bool) -> Result<()> {
        if issue.id.is_empty() {
            return Err(StorageError::validation("issue id must be assigned"));
        }
        if validate {
            self.validate_type(issue)?;
        }
        if self.issues.contains_key(&issue.id) {
            return Err(StorageError::Duplicate {
                id: issue.id.clone(),
            });
        }
        let mut row = issue.clone();
        row.content_hash = row.compute_content_hash();
        let labels: BTreeSet<String> = row.labels.drain(..).collect();
        let comments: Vec<Comment> = row.comments.drain(..).collect();
        row.dependencies.clear();
        if !labels.is_empty() {
            self.labels.insert(row.id.clone(), labels);
        }
        for mut comment in comments {
            comment.id = self.next_comment_id;
            comment.issue_id = row.id.clone();
            self.next_comment_id += 1;
            self.comments.entry(row.id.clone()).or_default().push(comment);
        }
        let id = row.id.clone();
        self.issues.insert(id.clone(), row);
        self.emit(&id, EventType::Created, actor, None, None);
        Ok(())
    }

    fn get_hydrated(&self, id: &str) -> Result<Issue> {
        let mut issue = self
            .issues
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("issue", id))?;
        issue.labels = self
            .labels
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        issue.comments = self.sorted_comments(id);
        issue.dependencies = self
            .deps
            .iter()
            .filter(|d| d.touches(id))
            .cloned()
            .collect();
        Ok(issue)
    }

    fn sorted_comments(&self, id: &str) -> Vec<Comment> {
        let mut comments = self.comments.get(id).cloned().unwrap_or_default();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        comments
    }

    fn update(&mut self, id: &str, patch: &IssuePatch, actor: &str) -> Result<Issue> {
        self.ensure_exists(id)?;
        if let Some(ref t) = patch.issue_type {
            let probe = Issue {
                issue_type: t.clone(),
                ..Default::default()
            };
            self.validate_type(&probe)?;
        }
        if let Some(p) = patch.priority {
            if !(0..=4).contains(&p) {
                return Err(StorageError::validation(format!(
                    "priority must be 0-4, got {p}"
                )));
            }
        }

        let now = Utc::now();
        let mut changes: Vec<(&str, String, String)> = Vec::new();
        {
            let issue = self.issues.get_mut(id).expect("checked above");

            macro_rules! apply {
                ($field:ident, $col:expr) => {
                    if let Some(ref v) = patch.$field {
                        if issue.$field != *v {
                            changes.push(($col, format!("{:?}", issue.$field), format!("{v:?}")));
                            issue.$field = v.clone();
                        }
                    }
                };
            }

            apply!(title, "title");
            apply!(description, "description");
            apply!(design, "design");
            apply!(acceptance_criteria, "acceptance_criteria");
            apply!(notes, "notes");
            apply!(spec_id, "spec_id");
            apply!(assignee, "assignee");
            apply!(sender, "sender");
            apply!(source_system, "source_system");
            apply!(close_reason, "close_reason");
            apply!(await_type, "await_type");
            apply!(replies_to, "replies_to");

            if let Some(v) = patch.status {
                if issue.status != v {
                    changes.push(("status", issue.status.to_string(), v.to_string()));
                    issue.status = v;
                    if v == Status::Closed {
                        issue.closed_at = Some(now);
                    } else {
                        issue.closed_at = None;
                    }
                }
            }
            if let Some(v) = patch.priority {
                if issue.priority != v {
                    changes.push(("priority", issue.priority.to_string(), v.to_string()));
                    issue.priority = v;
                }
            }
            if let Some(ref v) = patch.issue_type {
                if issue.issue_type != *v {
                    changes.push((
                        "issue_type",
                        issue.issue_type.as_str().to_owned(),
                        v.as_str().to_owned(),
                    ));
                    issue.issue_type = v.clone();
                }
            }
            if let Some(ref v) = patch.external_ref {
                if issue.external_ref != *v {
                    changes.push(("external_ref", String::new(), String::new()));
                    issue.external_ref = v.clone();
                }
            }
            if let Some(ref v) = patch.due_at {
                if issue.due_at != *v {
                    changes.push(("due_at", String::new(), String::new()));
                    issue.due_at = *v;
                }
            }
            if let Some(ref v) = patch.defer_until {
                if issue.defer_until != *v {
                    changes.push(("defer_until", String::new(), String::new()));
                    issue.defer_until = *v;
                }
            }
            if let Some(ref v) = patch.estimated_minutes {
                if issue.estimated_minutes != *v {
                    changes.push(("estimated_minutes", String::new(), String::new()));
                    issue.estimated_minutes = *v;
                }
            }
            if let Some(ref v) = patch.metadata {
                if issue.metadata != *v {
                    changes.push(("metadata", String::new(), String::new()));
                    issue.metadata = v.clone();
                }
            }
            if let Some(v) = patch.ephemeral {
                if issue.ephemeral != v {
                    changes.push(("ephemeral", issue.ephemeral.to_string(), v.to_string()));
                    issue.ephemeral = v;
                }
            }
            if let Some(v) = patch.pinned {
                if issue.pinned != v {
                    changes.push(("pinned", issue.pinned.to_string(), v.to_string()));
                    issue.pinned = v;
                }
            }
            if let Some(ref v) = patch.timeout {
                if issue.timeout != *v {
                    changes.push(("timeout", String::new(), String::new()));
                    issue.timeout = *v;
                }
            }

            if !changes.is_empty() {
                issue.updated_at = now;
                issue.content_hash = issue.compute_content_hash();
            }
        }

        for (field, old, new) in &changes {
            let event_type = if *field == "status" {
                EventType::StatusChanged
            } else {
                EventType::Updated
            };
            self.emit(
                id,
                event_type,
                actor,
                Some(format!("{field}={old}")),
                Some(format!("{field}={new}")),
            );
        }
        self.get_hydrated(id)
    }

    fn close(&mut self, id: &str, reason: &str, actor: &str) -> Result<()> {
        self.ensure_exists(id)?;
        let old_status;
        {
            let issue = self.issues.get_mut(id).expect("checked above");
            if issue.status == Status::Closed {
                return Ok(());
            }
            old_status = issue.status;
            let now = Utc::now();
            issue.status = Status::Closed;
            issue.closed_at = Some(now);
            issue.close_reason = reason.to_owned();
            issue.updated_at = now;
        }
        self.emit(
            id,
            EventType::StatusChanged,
            actor,
            Some(old_status.as_str().to_owned()),
            Some("closed".to_owned()),
        );
        Ok(())
    }

    fn tombstone(&mut self, id: &str, actor: &str, reason: &str, at: DateTime<Utc>) {
        self.labels.remove(id);
        self.comments.remove(id);
        self.events.remove(id);
        self.deps.retain(|d| !d.touches(id));
        if let Some(issue) = self.issues.get_mut(id) {
            issue.status = Status::Tombstone;
            issue.deleted_at = Some(at);
            issue.deleted_by = actor.to_owned();
            issue.delete_reason = reason.to_owned();
            issue.updated_at = at;
        }
    }

    fn add_dependency(&mut self, dep: &Dependency, actor: &str) -> Result<()> {
        if dep.issue_id == dep.depends_on_id {
            return Err(StorageError::constraint(format!(
                "self-loop on {}",
                dep.issue_id
            )));
        }
        self.ensure_exists(&dep.issue_id)?;
        self.ensure_exists(&dep.depends_on_id)?;
        if dep.dep_type.is_blocking() {
            self.detect_cycle(&dep.issue_id, &dep.depends_on_id)?;
        }
        self.deps.retain(|d| d.key() != dep.key());
        self.deps.push(dep.clone());
        self.emit(
            &dep.issue_id,
            EventType::DependencyAdded,
            actor,
            None,
            Some(format!("{} ({})", dep.depends_on_id, dep.dep_type)),
        );
        Ok(())
    }

    fn detect_cycle(&self, issue_id: &str, depends_on_id: &str) -> Result<()> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![depends_on_id];
        while let Some(current) = stack.pop() {
            if current == issue_id {
                return Err(StorageError::constraint(format!(
                    "cycle via {issue_id} -> {depends_on_id}"
                )));
            }
            if !visited.insert(current) {
                continue;
            }
            for dep in &self.deps {
                if dep.issue_id == current && dep.dep_type.is_blocking() {
                    stack.push(&dep.depends_on_id);
                }
            }
        }
        Ok(())
    }

    fn is_blocked(&self, id: &str) -> bool {
        self.deps.iter().any(|d| {
            d.issue_id == id
                && d.dep_type.is_blocking()
                && self
                    .issues
                    .get(&d.depends_on_id)
                    .is_some_and(|b| b.status != Status::Closed)
        })
    }

    fn sorted_for_work(&self, mut issues: Vec<Issue>) -> Vec<Issue> {
        issues.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        issues
    }
}

// ---------------------------------------------------------------------------
// Storage implementation
// ---------------------------------------------------------------------------

impl Storage for MemoryStore {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        self.lock()?.create(issue, actor, true)
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        self.lock()?.get_hydrated(id)
    }

    fn search_issues(&self, query: &str, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let inner = self.lock()?;
        let text = if query.is_empty() {
            filter.text.clone().unwrap_or_default()
        } else {
            query.to_owned()
        };
        let text_lower = text.to_lowercase();
        let mut matched: Vec<Issue> = inner
            .issues
            .values()
            .filter(|i| filter.include_tombstones || i.status != Status::Tombstone)
            .filter(|i| filter.status.is_none_or(|s| i.status == s))
            .filter(|i| filter.priority.is_none_or(|p| i.priority == p))
            .filter(|i| {
                filter
                    .issue_type
                    .as_ref()
                    .is_none_or(|t| i.issue_type == *t)
            })
            .filter(|i| filter.assignee.as_deref().is_none_or(|a| i.assignee == a))
            .filter(|i| filter.ephemeral.is_none_or(|e| i.ephemeral == e))
            .filter(|i| filter.pinned.is_none_or(|p| i.pinned == p))
            .filter(|i| {
                filter
                    .closed_before
                    .is_none_or(|cutoff| i.closed_at.is_some_and(|c| c < cutoff))
            })
            .filter(|i| {
                filter.labels.iter().all(|l| {
                    inner
                        .labels
                        .get(&i.id)
                        .is_some_and(|set| set.contains(l))
                })
            })
            .filter(|i| {
                text_lower.is_empty()
                    || i.title.to_lowercase().contains(&text_lower)
                    || i.description.to_lowercase().contains(&text_lower)
                    || i.notes.to_lowercase().contains(&text_lower)
            })
            .cloned()
            .collect();
        matched = inner.sorted_for_work(matched);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn update_issue(&self, id: &str, patch: &IssuePatch, actor: &str) -> Result<Issue> {
        self.lock()?.update(id, patch, actor)
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        self.lock()?.close(id, reason, actor)
    }

    fn reopen_issue(&self, id: &str, actor: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ensure_exists(id)?;
        {
            let issue = inner.issues.get_mut(id).expect("checked above");
            if issue.status != Status::Closed {
                return Err(StorageError::validation(format!(
                    "issue {id} is not closed (status: {})",
                    issue.status
                )));
            }
            issue.status = Status::Open;
            issue.closed_at = None;
            issue.close_reason = String::new();
            issue.updated_at = Utc::now();
        }
        inner.emit(
            id,
            EventType::StatusChanged,
            actor,
            Some("closed".into()),
            Some("open".into()),
        );
        Ok(())
    }

    fn delete_issue(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        cascade: bool,
    ) -> Result<Vec<String>> {
        let mut inner = self.lock()?;
        inner.ensure_exists(id)?;
        if inner.issues[id].status == Status::Tombstone {
            return Ok(Vec::new());
        }

        let mut targets = vec![id.to_owned()];
        if cascade {
            let mut frontier = vec![id.to_owned()];
            while let Some(parent) = frontier.pop() {
                let children: Vec<String> = inner
                    .deps
                    .iter()
                    .filter(|d| {
                        d.depends_on_id == parent && d.dep_type == DependencyType::ParentChild
                    })
                    .map(|d| d.issue_id.clone())
                    .collect();
                for child in children {
                    if !targets.contains(&child) {
                        targets.push(child.clone());
                        frontier.push(child);
                    }
                }
            }
        }

        let now = Utc::now();
        for target in &targets {
            inner.tombstone(target, actor, reason, now);
        }
        Ok(targets)
    }

    fn rename_issue(&self, old_id: &str, new_id: &str, actor: &str) -> Result<()> {
        if old_id == new_id {
            return Ok(());
        }
        let mut inner = self.lock()?;
        inner.ensure_exists(old_id)?;
        if inner.issues.contains_key(new_id) {
            return Err(StorageError::Duplicate {
                id: new_id.to_owned(),
            });
        }

        let mut issue = inner.issues.remove(old_id).expect("checked above");
        issue.id = new_id.to_owned();
        issue.updated_at = Utc::now();
        inner.issues.insert(new_id.to_owned(), issue);

        if let Some(labels) = inner.labels.remove(old_id) {
            inner.labels.insert(new_id.to_owned(), labels);
        }
        if let Some(mut comments) = inner.comments.remove(old_id) {
            for c in &mut comments {
                c.issue_id = new_id.to_owned();
            }
            inner.comments.insert(new_id.to_owned(), comments);
        }
        if let Some(mut events) = inner.events.remove(old_id) {
            for e in &mut events {
                e.issue_id = new_id.to_owned();
            }
            inner.events.insert(new_id.to_owned(), events);
        }
        for dep in &mut inner.deps {
            if dep.issue_id == old_id {
                dep.issue_id = new_id.to_owned();
            }
            if dep.depends_on_id == old_id {
                dep.depends_on_id = new_id.to_owned();
            }
        }
        let referrers: Vec<String> = inner
            .issues
            .values()
            .filter(|i| i.replies_to == old_id)
            .map(|i| i.id.clone())
            .collect();
        for rid in referrers {
            if let Some(r) = inner.issues.get_mut(&rid) {
                r.replies_to = new_id.to_owned();
            }
        }
        inner.emit(
            new_id,
            EventType::Renamed,
            actor,
            Some(old_id.to_owned()),
            Some(new_id.to_owned()),
        );
        Ok(())
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        self.lock()?.add_dependency(dep, actor)
    }

    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let before = inner.deps.len();
        inner
            .deps
            .retain(|d| !(d.issue_id == issue_id && d.depends_on_id == depends_on_id));
        if inner.deps.len() == before {
            return Err(StorageError::not_found(
                "dependency",
                format!("{issue_id} -> {depends_on_id}"),
            ));
        }
        inner.emit(
            issue_id,
            EventType::DependencyRemoved,
            actor,
            Some(depends_on_id.to_owned()),
            None,
        );
        Ok(())
    }

    fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let inner = self.lock()?;
        let mut out: Vec<Issue> = inner
            .deps
            .iter()
            .filter(|d| d.issue_id == issue_id)
            .filter_map(|d| inner.issues.get(&d.depends_on_id).cloned())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out.dedup_by(|a, b| a.id == b.id);
        Ok(out)
    }

    fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let inner = self.lock()?;
        let mut out: Vec<Issue> = inner
            .deps
            .iter()
            .filter(|d| d.depends_on_id == issue_id)
            .filter_map(|d| inner.issues.get(&d.issue_id).cloned())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out.dedup_by(|a, b| a.id == b.id);
        Ok(out)
    }

    fn get_edges_touching(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        let inner = self.lock()?;
        let mut edges: Vec<Dependency> = inner
            .deps
            .iter()
            .filter(|d| d.touches(issue_id))
            .cloned()
            .collect();
        edges.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(edges)
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        inner.ensure_exists(issue_id)?;
        let inserted = inner
            .labels
            .entry(issue_id.to_owned())
            .or_default()
            .insert(label.to_owned());
        if inserted {
            inner.emit(
                issue_id,
                EventType::LabelAdded,
                actor,
                None,
                Some(label.to_owned()),
            );
        }
        Ok(inserted)
    }

    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        inner.ensure_exists(issue_id)?;
        let removed = inner
            .labels
            .get_mut(issue_id)
            .is_some_and(|set| set.remove(label));
        if removed {
            inner.emit(
                issue_id,
                EventType::LabelRemoved,
                actor,
                Some(label.to_owned()),
                None,
            );
        }
        Ok(removed)
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        let inner = self.lock()?;
        Ok(inner
            .labels
            .get(issue_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn get_labels_for_issues(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let inner = self.lock()?;
        let mut map = HashMap::new();
        for id in ids {
            if let Some(set) = inner.labels.get(id) {
                map.insert(id.clone(), set.iter().cloned().collect());
            }
        }
        Ok(map)
    }

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        let mut inner = self.lock()?;
        inner.ensure_exists(issue_id)?;
        let comment = Comment {
            id: inner.next_comment_id,
            issue_id: issue_id.to_owned(),
            author: author.to_owned(),
            text: text.to_owned(),
            created_at: Utc::now(),
        };
        inner.next_comment_id += 1;
        inner
            .comments
            .entry(issue_id.to_owned())
            .or_default()
            .push(comment.clone());
        inner.emit(issue_id, EventType::Commented, author, None, None);
        Ok(comment)
    }

    fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        Ok(self.lock()?.sorted_comments(issue_id))
    }

    fn get_events(&self, issue_id: &str, limit: usize) -> Result<Vec<Event>> {
        let inner = self.lock()?;
        let mut events = inner.events.get(issue_id).cloned().unwrap_or_default();
        events.sort_by(|a, b| b.id.cmp(&a.id));
        events.truncate(limit);
        Ok(events)
    }

    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>> {
        let inner = self.lock()?;
        let now = Utc::now();
        let mut ready: Vec<Issue> = inner
            .issues
            .values()
            .filter(|i| i.status.is_active() && !i.ephemeral)
            .filter(|i| {
                filter.include_deferred || i.defer_until.is_none_or(|d| d <= now)
            })
            .filter(|i| {
                filter
                    .issue_type
                    .as_ref()
                    .is_none_or(|t| i.issue_type == *t)
            })
            .filter(|i| filter.priority.is_none_or(|p| i.priority == p))
            .filter(|i| filter.assignee.as_deref().is_none_or(|a| i.assignee == a))
            .filter(|i| {
                filter.labels.iter().all(|l| {
                    inner
                        .labels
                        .get(&i.id)
                        .is_some_and(|set| set.contains(l))
                })
            })
            .filter(|i| !inner.is_blocked(&i.id))
            .cloned()
            .collect();
        ready = inner.sorted_for_work(ready);
        if let Some(limit) = filter.limit {
            ready.truncate(limit);
        }
        Ok(ready)
    }

    fn get_blocked_issues(&self) -> Result<Vec<BlockedIssue>> {
        let inner = self.lock()?;
        let mut blocked = Vec::new();
        let mut candidates: Vec<&Issue> = inner
            .issues
            .values()
            .filter(|i| i.status.is_active())
            .collect();
        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        for issue in candidates {
            let mut open_blockers: Vec<String> = inner
                .deps
                .iter()
                .filter(|d| d.issue_id == issue.id && d.dep_type == DependencyType::Blocks)
                .filter(|d| {
                    inner
                        .issues
                        .get(&d.depends_on_id)
                        .is_some_and(|b| b.status != Status::Closed)
                })
                .map(|d| d.depends_on_id.clone())
                .collect();
            if !open_blockers.is_empty() {
                open_blockers.sort();
                blocked.push(BlockedIssue {
                    issue: issue.clone(),
                    open_blockers,
                });
            }
        }
        Ok(blocked)
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.config.get(key).cloned())
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.config.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn get_all_config(&self) -> Result<HashMap<String, String>> {
        Ok(self.lock()?.config.clone())
    }

    fn get_custom_types(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.custom_types())
    }

    fn get_statistics(&self) -> Result<Statistics> {
        let inner = self.lock()?;
        let mut stats = Statistics::default();
        let mut by_type: HashMap<String, i64> = HashMap::new();
        let mut by_priority: HashMap<i32, i64> = HashMap::new();
        let mut by_assignee: HashMap<String, i64> = HashMap::new();
        for issue in inner.issues.values() {
            stats.total_issues += 1;
            match issue.status {
                Status::Open => stats.open_issues += 1,
                Status::InProgress => stats.in_progress_issues += 1,
                Status::Blocked => stats.blocked_issues += 1,
                Status::Closed => stats.closed_issues += 1,
                Status::Tombstone => stats.tombstone_issues += 1,
            }
            if issue.status != Status::Tombstone {
                *by_type.entry(issue.issue_type.as_str().to_owned()).or_default() += 1;
                *by_priority.entry(issue.priority).or_default() += 1;
                if !issue.status.is_terminal() {
                    let who = if issue.assignee.is_empty() {
                        "(unassigned)".to_owned()
                    } else {
                        issue.assignee.clone()
                    };
                    *by_assignee.entry(who).or_default() += 1;
                }
            }
        }
        stats.by_type = by_type.into_iter().collect();
        stats.by_type.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        stats.by_priority = by_priority.into_iter().collect();
        stats.by_priority.sort_by_key(|(p, _)| *p);
        stats.by_assignee = by_assignee.into_iter().collect();
        stats
            .by_assignee
            .sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(stats)
    }

    fn id_exists(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.issues.contains_key(id))
    }

    fn all_ids(&self) -> Result<Vec<String>> {
        let inner = self.lock()?;
        let mut ids: Vec<String> = inner.issues.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn get_issues_for_export(&self) -> Result<Vec<Issue>> {
        let inner = self.lock()?;
        let mut ids: Vec<String> = inner.issues.keys().cloned().collect();
        ids.sort();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let mut issue = inner.get_hydrated(&id)?;
            // Export carries only outgoing edges; mirroring happens above.
            issue.dependencies.retain(|d| d.issue_id == id);
            out.push(issue);
        }
        Ok(out)
    }

    fn apply_import_record(&self, incoming: &Issue) -> Result<ImportAction> {
        if incoming.id.is_empty() {
            return Err(StorageError::validation("imported record has no id"));
        }
        let mut inner = self.lock()?;

        let action = if incoming.status == Status::Tombstone {
            match inner.issues.get(&incoming.id) {
                Some(row) if row.status == Status::Tombstone => ImportAction::Skipped,
                Some(_) => {
                    inner.tombstone(
                        &incoming.id,
                        "import",
                        "tombstoned in remote clone",
                        incoming.updated_at,
                    );
                    ImportAction::Tombstoned
                }
                None => {
                    let mut tomb = incoming.clone().without_satellites();
                    tomb.deleted_at = Some(incoming.updated_at);
                    inner.create(&tomb, "import", false)?;
                    ImportAction::Tombstoned
                }
            }
        } else {
            match inner.issues.get(&incoming.id).cloned() {
                None => {
                    inner.create(incoming, "import", false)?;
                    apply_satellites_mem(&mut inner, incoming, true);
                    ImportAction::Created
                }
                Some(local) if incoming.updated_at > local.updated_at => {
                    let mut row = incoming.clone().without_satellites();
                    row.content_hash = row.compute_content_hash();
                    inner.issues.insert(row.id.clone(), row);
                    apply_satellites_mem(&mut inner, incoming, true);
                    ImportAction::Updated
                }
                Some(_) => {
                    apply_satellites_mem(&mut inner, incoming, false);
                    ImportAction::Skipped
                }
            }
        };
        Ok(action)
    }

    fn tombstone_issue(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.issues.get(id) {
            None => Ok(false),
            Some(row) if row.status == Status::Tombstone => Ok(false),
            Some(_) => {
                inner.tombstone(id, actor, reason, deleted_at);
                Ok(true)
            }
        }
    }

    fn prune_tombstones(&self, older_than_days: u64) -> Result<Vec<String>> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let pruned: Vec<String> = inner
            .issues
            .values()
            .filter(|i| !i.pinned)
            .filter(|i| {
                // TTL zero prunes every tombstone immediately.
                if older_than_days == 0 {
                    i.status == Status::Tombstone
                } else {
                    i.is_expired_tombstone(older_than_days, now)
                }
            })
            .map(|i| i.id.clone())
            .collect();
        for id in &pruned {
            inner.issues.remove(id);
        }
        Ok(pruned)
    }

    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()> {
        let mut inner = self.lock()?;
        let snapshot = inner.clone();
        let tx = MemoryTx {
            inner: RefCell::new(snapshot),
        };
        f(&tx)?;
        *inner = tx.inner.into_inner();
        Ok(())
    }
}

fn apply_satellites_mem(inner: &mut Inner, incoming: &Issue, authoritative: bool) {
    if authoritative {
        inner.labels.insert(
            incoming.id.clone(),
            incoming.labels.iter().cloned().collect(),
        );
        inner
            .deps
            .retain(|d| d.issue_id != incoming.id);
        let mut seen = HashSet::new();
        for dep in &incoming.dependencies {
            if dep.issue_id == incoming.id && seen.insert(dep.key()) {
                inner.deps.push(dep.clone());
            }
        }
    } else {
        let set = inner.labels.entry(incoming.id.clone()).or_default();
        for label in &incoming.labels {
            set.insert(label.clone());
        }
    }

    let existing = inner.sorted_comments(&incoming.id);
    for comment in &incoming.comments {
        if !existing.iter().any(|c| c.key() == comment.key()) {
            let mut fresh = comment.clone();
            fresh.id = inner.next_comment_id;
            fresh.issue_id = incoming.id.clone();
            inner.next_comment_id += 1;
            inner
                .comments
                .entry(incoming.id.clone())
                .or_default()
                .push(fresh);
        }
    }

    for dep in &incoming.dependencies {
        if dep.issue_id != incoming.id && dep.dep_type == DependencyType::ParentChild {
            inner.deps.retain(|d| d.key() != dep.key());
            inner.deps.push(dep.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Copy-on-write transaction view
// ---------------------------------------------------------------------------

struct MemoryTx {
    inner: RefCell<Inner>,
}

impl Transaction for MemoryTx {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        self.inner.borrow_mut().create(issue, actor, true)
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        self.inner.borrow().get_hydrated(id)
    }

    fn update_issue(&self, id: &str, patch: &IssuePatch, actor: &str) -> Result<Issue> {
        self.inner.borrow_mut().update(id, patch, actor)
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        self.inner.borrow_mut().close(id, reason, actor)
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        self.inner.borrow_mut().add_dependency(dep, actor)
    }

    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let before = inner.deps.len();
        inner
            .deps
            .retain(|d| !(d.issue_id == issue_id && d.depends_on_id == depends_on_id));
        if inner.deps.len() == before {
            return Err(StorageError::not_found(
                "dependency",
                format!("{issue_id} -> {depends_on_id}"),
            ));
        }
        inner.emit(
            issue_id,
            EventType::DependencyRemoved,
            actor,
            Some(depends_on_id.to_owned()),
            None,
        );
        Ok(())
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_exists(issue_id)?;
        let inserted = inner
            .labels
            .entry(issue_id.to_owned())
            .or_default()
            .insert(label.to_owned());
        if inserted {
            inner.emit(
                issue_id,
                EventType::LabelAdded,
                actor,
                None,
                Some(label.to_owned()),
            );
        }
        Ok(inserted)
    }

    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_exists(issue_id)?;
        let removed = inner
            .labels
            .get_mut(issue_id)
            .is_some_and(|set| set.remove(label));
        if removed {
            inner.emit(
                issue_id,
                EventType::LabelRemoved,
                actor,
                Some(label.to_owned()),
                None,
            );
        }
        Ok(removed)
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .borrow()
            .labels
            .get(issue_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_exists(issue_id)?;
        let comment = Comment {
            id: inner.next_comment_id,
            issue_id: issue_id.to_owned(),
            author: author.to_owned(),
            text: text.to_owned(),
            created_at: Utc::now(),
        };
        inner.next_comment_id += 1;
        inner
            .comments
            .entry(issue_id.to_owned())
            .or_default()
            .push(comment.clone());
        inner.emit(issue_id, EventType::Commented, author, None, None);
        Ok(comment)
    }

    fn import_comment(
        &self,
        issue_id: &str,
        author: &str,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Comment> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_exists(issue_id)?;
        let comment = Comment {
            id: inner.next_comment_id,
            issue_id: issue_id.to_owned(),
            author: author.to_owned(),
            text: text.to_owned(),
            created_at,
        };
        inner.next_comment_id += 1;
        inner
            .comments
            .entry(issue_id.to_owned())
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.borrow().config.get(key).cloned())
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .borrow_mut()
            .config
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
