//! The reconciliation store: a keyed, ordered collection of reports fed by
//! snapshot and upsert messages.
//!
//! Single-threaded by construction: the session loop is the only writer, so
//! no mutation ever observes another mid-flight. Listeners are invoked
//! synchronously, exactly once per applied change, after the mutation is
//! complete.

use std::collections::HashSet;

use crate::types::Report;

pub type SubscriptionId = u64;

type Listener = Box<dyn FnMut(&[Report]) + Send>;

/// Result of applying a full snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    /// Store size after the replace.
    pub len: usize,
    /// Rows discarded because an earlier row in the same snapshot carried
    /// the same id. First occurrence wins.
    pub duplicates_dropped: usize,
}

/// Result of applying a single-entity upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New id, inserted at the front (most-recent-first).
    Inserted,
    /// Known id, replaced in place with display position preserved.
    Replaced,
    /// Known id with identical fields: idempotent re-delivery, nothing to do.
    Unchanged,
}

impl UpsertOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Keyed, ordered report collection with synchronous change notification.
#[derive(Default)]
pub struct ReportStore {
    reports: Vec<Report>,
    version: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the entire collection, preserving the input order
    /// as display order. Duplicate ids within the input keep the first
    /// occurrence so the uniqueness invariant holds unconditionally.
    pub fn apply_snapshot(&mut self, reports: Vec<Report>) -> SnapshotOutcome {
        let mut seen = HashSet::with_capacity(reports.len());
        let mut deduped = Vec::with_capacity(reports.len());
        let mut duplicates_dropped = 0;
        for report in reports {
            if seen.insert(report.id) {
                deduped.push(report);
            } else {
                duplicates_dropped += 1;
            }
        }
        self.reports = deduped;
        self.version += 1;
        self.notify();
        SnapshotOutcome {
            len: self.reports.len(),
            duplicates_dropped,
        }
    }

    /// Insert or replace one report.
    ///
    /// An existing id is replaced in place (full field replacement, never a
    /// partial merge) without moving its display position, so updates do
    /// not reshuffle a list the user is scanning. An unknown id is inserted
    /// at the front so new reports surface immediately. Re-applying an
    /// identical report is a no-op and does not notify.
    pub fn apply_upsert(&mut self, report: Report) -> UpsertOutcome {
        match self.reports.iter().position(|r| r.id == report.id) {
            Some(idx) => {
                if self.reports[idx] == report {
                    return UpsertOutcome::Unchanged;
                }
                self.reports[idx] = report;
                self.version += 1;
                self.notify();
                UpsertOutcome::Replaced
            }
            None => {
                self.reports.insert(0, report);
                self.version += 1;
                self.notify();
                UpsertOutcome::Inserted
            }
        }
    }

    /// Register a listener called synchronously after every applied change
    /// with the post-mutation contents. Listeners must not mutate the store.
    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Remove a listener. Returns false if the id was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    fn notify(&mut self) {
        // Listeners are detached during the fan-out so a listener registered
        // mid-notify is not invoked with state it never observed changing.
        let mut active = std::mem::take(&mut self.listeners);
        for (_, listener) in &mut active {
            listener(&self.reports);
        }
        active.append(&mut self.listeners);
        self.listeners = active;
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn get(&self, id: i64) -> Option<&Report> {
        self.reports.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Monotonic counter bumped once per applied change.
    pub fn version(&self) -> u64 {
        self.version
    }
}
