//! Event debouncing for file watching.
//!
//! Coalesces raw filesystem events per path and releases them as a single
//! batch once the filesystem has been quiet for the debounce duration, so an
//! editor save that touches several files produces one batch.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::change::ChangeKind;

/// Pending event waiting to be released.
struct PendingEvent {
    kind: ChangeKind,
    /// Arrival order of the first event seen for this path.
    seq: u64,
}

/// Batch-oriented event debouncer.
///
/// Owned by the watch loop, so no locking is needed.
pub(crate) struct EventDebouncer {
    pending: HashMap<PathBuf, PendingEvent>,
    next_seq: u64,
    debounce: Duration,
    max_wait: Duration,
    first_event: Option<Instant>,
    last_event: Option<Instant>,
}

impl EventDebouncer {
    /// Create a new debouncer.
    ///
    /// A batch is released after `debounce` without new events, or once the
    /// oldest pending event has waited `max_wait`.
    pub fn new(debounce: Duration, max_wait: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            next_seq: 0,
            debounce,
            max_wait,
            first_event: None,
            last_event: None,
        }
    }

    /// Record an event observed now.
    pub fn record(&mut self, path: PathBuf, kind: ChangeKind) {
        self.record_at(path, kind, Instant::now());
    }

    pub(crate) fn record_at(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        self.first_event.get_or_insert(now);
        self.last_event = Some(now);

        match self.pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(PendingEvent {
                    kind,
                    seq: self.next_seq,
                });
                self.next_seq += 1;
            }
            Entry::Occupied(mut entry) => {
                if let Some(coalesced) = Self::coalesce(entry.get().kind, kind) {
                    entry.get_mut().kind = coalesced;
                } else {
                    // Added + Deleted: the file never existed for us
                    entry.remove();
                }
            }
        }
    }

    /// Coalesce two event kinds for the same path.
    ///
    /// Returns `None` if both events should be discarded.
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: ChangeKind, new: ChangeKind) -> Option<ChangeKind> {
        use ChangeKind::{Added, Deleted, Modified};

        match (existing, new) {
            (Added, Added) => Some(Added),
            (Added, Modified) => Some(Added), // Content included in create
            (Added, Deleted) => None,

            (Modified, Added) => Some(Added), // File was recreated
            (Modified, Modified) => Some(Modified),
            (Modified, Deleted) => Some(Deleted),

            (Deleted, Added) => Some(Modified), // File was replaced (atomic save)
            (Deleted, Modified) => Some(Deleted),
            (Deleted, Deleted) => Some(Deleted),
        }
    }

    /// Release the pending batch if the filesystem has settled.
    pub fn drain_settled(&mut self) -> Vec<(ChangeKind, PathBuf)> {
        self.drain_settled_at(Instant::now())
    }

    pub(crate) fn drain_settled_at(&mut self, now: Instant) -> Vec<(ChangeKind, PathBuf)> {
        if self.pending.is_empty() {
            self.reset_window();
            return Vec::new();
        }
        if self.next_deadline().is_some_and(|deadline| deadline > now) {
            return Vec::new();
        }

        let mut batch: Vec<_> = self.pending.drain().collect();
        batch.sort_by_key(|(_, event)| event.seq);
        self.reset_window();

        batch
            .into_iter()
            .map(|(path, event)| (event.kind, path))
            .collect()
    }

    /// When the pending batch will be released, for timer scheduling.
    ///
    /// Returns `None` when nothing is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        let quiet = self.last_event? + self.debounce;
        let capped = self.first_event? + self.max_wait;
        Some(quiet.min(capped))
    }

    fn reset_window(&mut self) {
        self.first_event = None;
        self.last_event = None;
    }
}
