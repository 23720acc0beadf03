//! Live filesystem watching for the public folder.
//!
//! Every directory under the root gets its own non-recursive registration,
//! and directories created later are registered as their `create` events
//! arrive. Events pass through an [`EventFilter`], wait in a
//! [`SettleTracker`] until the file stops changing, and only then go through
//! the content classifier to the [`Dispatcher`].

pub mod event;
pub mod history;
pub mod settle;

pub use event::{map_event, EventOp, FileEvent};
pub use history::{EventFilter, EventHistory, SharedHistory};
pub use settle::SettleTracker;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use amur_common::paths::{is_hls_package, is_inside_hls_package, is_temporary};
use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::classify::classify_path;
use crate::config::WatchConfig;
use crate::dispatch::Dispatcher;

/// Backend events buffered between the notify thread and the event loop.
const EVENT_BUFFER: usize = 1024;

/// Shortest interval between settle checks.
const MIN_SETTLE_TICK: Duration = Duration::from_millis(25);

/// Watches the public folder and feeds changed media to the dispatcher.
pub struct FileWatcher {
    root: PathBuf,
    filter: EventFilter,
    settle: Duration,
}

impl FileWatcher {
    pub fn new(root: impl Into<PathBuf>, config: &WatchConfig) -> Self {
        let history = EventHistory::new(
            config.history_size,
            Duration::from_secs(config.history_window_secs),
        );
        Self {
            root: root.into(),
            filter: EventFilter::new(Arc::new(Mutex::new(history))),
            settle: Duration::from_millis(config.settle_millis),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Register the tree and spawn the event loop.
    ///
    /// Fails only if the backend cannot be created or the root itself cannot
    /// be watched; unreadable subdirectories are logged and skipped.
    pub fn start(
        self,
        dispatcher: Arc<Dispatcher>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>(EVENT_BUFFER);

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.blocking_send(res);
        })
        .context("Failed to create file watcher")?;

        let mut registry = Registry {
            watcher,
            watched: HashSet::new(),
        };
        registry
            .watcher
            .watch(&self.root, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", self.root.display()))?;
        registry.watched.insert(self.root.clone());
        registry.register_tree(&self.root);

        tracing::info!(
            root = %self.root.display(),
            directories = registry.watched.len(),
            "Watching public folder"
        );

        Ok(tokio::spawn(self.run(registry, event_rx, dispatcher, cancel)))
    }

    async fn run(
        self,
        mut registry: Registry,
        mut events: mpsc::Receiver<notify::Result<Event>>,
        dispatcher: Arc<Dispatcher>,
        cancel: CancellationToken,
    ) {
        let mut pending = SettleTracker::new(self.settle);
        let mut tick = tokio::time::interval((self.settle / 4).max(MIN_SETTLE_TICK));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                res = events.recv() => match res {
                    Some(Ok(event)) => {
                        for file_event in map_event(&event) {
                            self.handle(&mut registry, &mut pending, file_event);
                        }
                    }
                    Some(Err(e)) => tracing::warn!(error = %e, "File watcher error"),
                    None => break,
                },
                _ = tick.tick() => {
                    for path in pending.take_settled(Instant::now()) {
                        dispatch_settled(&path, &dispatcher).await;
                    }
                }
            }
        }

        tracing::info!(unsettled = pending.len(), "File watcher stopped");
    }

    fn handle(&self, registry: &mut Registry, pending: &mut SettleTracker, event: FileEvent) {
        tracing::trace!(path = %event.path.display(), op = ?event.op, "File event");

        if event.op == EventOp::Create && event.path.is_dir() {
            for file in registry.register_tree(&event.path) {
                let found = FileEvent::create(file).observed(event.observed_at);
                self.track(pending, found);
            }
            return;
        }

        if matches!(event.op, EventOp::Remove | EventOp::Rename) {
            registry.forget(&event.path);
            pending.remove(&event.path);
        }

        self.track(pending, event);
    }

    fn track(&self, pending: &mut SettleTracker, event: FileEvent) {
        if !self.filter.admit(&event) {
            return;
        }
        if !event.path.is_file() {
            return;
        }
        pending.file_changed(event.path, event.observed_at);
    }
}

/// Classify a file that stopped changing and hand it to the dispatcher.
async fn dispatch_settled(path: &Path, dispatcher: &Dispatcher) {
    if !path.is_file() {
        return;
    }
    let kind = classify_path(path);
    tracing::debug!(path = %path.display(), ?kind, "Classified settled file");
    dispatcher.dispatch(path, kind).await;
}

/// The notify backend plus the set of directories registered with it.
struct Registry {
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl Registry {
    /// Register `dir` and every directory below it.
    ///
    /// Returns the regular files found along the way.
    fn register_tree(&mut self, dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if !watchable(dir) {
            return files;
        }

        let walker = WalkDir::new(dir)
            .into_iter()
            .filter_entry(|e| !e.file_type().is_dir() || watchable(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable entry while registering watches");
                    continue;
                }
            };

            if entry.file_type().is_file() {
                files.push(entry.into_path());
                continue;
            }
            if !entry.file_type().is_dir() || self.watched.contains(entry.path()) {
                continue;
            }

            match self.watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
                Ok(()) => {
                    tracing::debug!(dir = %entry.path().display(), "Watching directory");
                    self.watched.insert(entry.into_path());
                }
                Err(e) => {
                    tracing::warn!(dir = %entry.path().display(), error = %e, "Failed to watch directory");
                }
            }
        }

        files
    }

    /// Drop bookkeeping for a directory that went away.
    fn forget(&mut self, path: &Path) {
        if self.watched.remove(path) {
            // The backend usually drops the watch itself.
            let _ = self.watcher.unwatch(path);
            tracing::debug!(dir = %path.display(), "Stopped watching directory");
        }
    }
}

/// Staging directories and HLS packages hold only derived output.
fn watchable(dir: &Path) -> bool {
    !is_temporary(dir) && !is_hls_package(dir) && !is_inside_hls_package(dir)
}
