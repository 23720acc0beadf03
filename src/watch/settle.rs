//! Holds changed files back until they stop changing.
//!
//! Uploads arrive as a burst of create and write events, possibly with pauses
//! between chunks. A path is handed on only after no event has touched it for
//! the settle window and its size matches the size seen at the last event.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Pending {
    changed_at: Instant,
    len: Option<u64>,
}

/// Tracks files that changed recently and reports the ones that settled.
#[derive(Debug)]
pub struct SettleTracker {
    pending: HashMap<PathBuf, Pending>,
    settle: Duration,
}

impl SettleTracker {
    pub fn new(settle: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            settle,
        }
    }

    /// Note a change to `path` observed at `at`.
    pub fn file_changed(&mut self, path: PathBuf, at: Instant) {
        let len = file_len(&path);
        self.pending.insert(path, Pending { changed_at: at, len });
    }

    /// Stop tracking a path that went away.
    pub fn remove(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every path quiet for the settle window as of `now`.
    ///
    /// A path whose size moved without an event restarts its window. Paths
    /// that vanished are dropped.
    pub fn take_settled(&mut self, now: Instant) -> Vec<PathBuf> {
        let settle = self.settle;
        let mut settled = Vec::new();

        self.pending.retain(|path, entry| {
            if now.saturating_duration_since(entry.changed_at) < settle {
                return true;
            }
            match file_len(path) {
                None => false,
                Some(len) if Some(len) == entry.len => {
                    settled.push(path.clone());
                    false
                }
                len => {
                    tracing::trace!(path = %path.display(), "Size changed without an event");
                    *entry = Pending {
                        changed_at: now,
                        len,
                    };
                    true
                }
            }
        });

        settled.sort();
        settled
    }
}

fn file_len(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}
