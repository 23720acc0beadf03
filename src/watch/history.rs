//! Recent-event history and the pre-classification filter.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use amur_common::paths::is_temporary;
use parking_lot::Mutex;

use super::event::{EventOp, FileEvent};

/// Bounded ring buffer of recent file events.
#[derive(Debug)]
pub struct EventHistory {
    entries: VecDeque<(PathBuf, EventOp, Instant)>,
    capacity: usize,
    window: Duration,
}

impl EventHistory {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            window,
        }
    }

    /// Append an event at its observation time, evicting the oldest entry
    /// when full.
    pub fn record(&mut self, event: &FileEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries
            .push_back((event.path.clone(), event.op, event.observed_at));
    }

    /// Most recent operation on `path` inside the window ending at `now`.
    pub fn last_op_at(&self, path: &Path, now: Instant) -> Option<EventOp> {
        self.entries
            .iter()
            .rev()
            .take_while(|(_, _, at)| now.saturating_duration_since(*at) <= self.window)
            .find(|(p, _, _)| p == path)
            .map(|(_, op, _)| *op)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// History shared between the watcher and its event handler.
pub type SharedHistory = Arc<Mutex<EventHistory>>;

/// Decides which file events reach the classifier.
#[derive(Debug, Clone)]
pub struct EventFilter {
    history: SharedHistory,
}

impl EventFilter {
    pub fn new(history: SharedHistory) -> Self {
        Self { history }
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    /// Record the event and return whether it should be classified.
    ///
    /// In-progress `.part` paths never pass. A chmod passes only when the
    /// previous event for the same path was a remove. Removes are recorded
    /// but never pass.
    pub fn admit(&self, event: &FileEvent) -> bool {
        if is_temporary(&event.path) {
            return false;
        }

        let previous = {
            let mut history = self.history.lock();
            let previous = history.last_op_at(&event.path, event.observed_at);
            history.record(event);
            previous
        };

        match event.op {
            EventOp::Remove => false,
            EventOp::Chmod => previous == Some(EventOp::Remove),
            _ => true,
        }
    }
}
