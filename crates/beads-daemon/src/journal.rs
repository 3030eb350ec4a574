//! In-memory mutation journal.
//!
//! A bounded ring of recent mutations, appended in commit order and polled
//! by observers (monitor, hook dispatchers) via `get_mutations(since)`. The
//! journal lives only as long as the daemon; restarts discard it.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 1000;

/// One observed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEvent {
    /// Monotone sequence number assigned on append.
    pub seq: u64,
    /// Operation name (e.g. "create", "close", "dep_add").
    pub kind: String,
    /// The mutated issue.
    pub issue_id: String,
    /// Who caused it.
    pub actor: String,
    /// When the journal recorded it.
    pub at: DateTime<Utc>,
    /// Optional operation payload (JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// Bounded ring of [`MutationEvent`]s behind a short-held mutex.
pub struct MutationJournal {
    inner: Mutex<Ring>,
}

struct Ring {
    events: VecDeque<MutationEvent>,
    capacity: usize,
    next_seq: u64,
}

impl Default for MutationJournal {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MutationJournal {
    /// Creates a journal holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Ring {
                events: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
                next_seq: 1,
            }),
        }
    }

    /// Appends a mutation, evicting the oldest entry when full.
    pub fn record(&self, kind: &str, issue_id: &str, actor: &str, payload: Option<String>) {
        let mut ring = self.inner.lock().expect("journal mutex poisoned");
        let event = MutationEvent {
            seq: ring.next_seq,
            kind: kind.to_owned(),
            issue_id: issue_id.to_owned(),
            actor: actor.to_owned(),
            at: Utc::now(),
            payload,
        };
        ring.next_seq += 1;
        if ring.events.len() == ring.capacity {
            ring.events.pop_front();
        }
        ring.events.push_back(event);
    }

    /// Snapshot of events strictly newer than `since`.
    pub fn get_since(&self, since: DateTime<Utc>) -> Vec<MutationEvent> {
        let ring = self.inner.lock().expect("journal mutex poisoned");
        ring.events
            .iter()
            .filter(|e| e.at > since)
            .cloned()
            .collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("journal mutex poisoned").events.len()
    }

    /// True when nothing has been recorded (or everything was evicted).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_and_poll() {
        let journal = MutationJournal::new(10);
        let before = Utc::now() - chrono::Duration::seconds(1);
        journal.record("create", "bd-1", "alice", None);
        journal.record("close", "bd-1", "bob", Some("{\"reason\":\"done\"}".into()));

        let events = journal.get_since(before);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, "create");
        assert_eq!(events[1].kind, "close");
        assert!(events[0].seq < events[1].seq);
    }

    #[test]
    fn since_filters_older_events() {
        let journal = MutationJournal::new(10);
        journal.record("create", "bd-1", "a", None);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let cutoff = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        journal.record("update", "bd-1", "a", None);

        let events = journal.get_since(cutoff);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "update");
    }

    #[test]
    fn ring_evicts_oldest() {
        let journal = MutationJournal::new(3);
        for i in 0..5 {
            journal.record("create", &format!("bd-{i}"), "a", None);
        }
        assert_eq!(journal.len(), 3);
        let events = journal.get_since(Utc::now() - chrono::Duration::hours(1));
        assert_eq!(events[0].issue_id, "bd-2");
        assert_eq!(events[2].issue_id, "bd-4");
        // Sequence numbers keep counting across evictions.
        assert_eq!(events[2].seq, 5);
    }
}
