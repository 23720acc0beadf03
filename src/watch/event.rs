//! Mapping from `notify` events to pipeline file events.

use std::path::{Path, PathBuf};
use std::time::Instant;

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// The operation a file event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventOp {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
}

/// A single change to a single path.
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub op: EventOp,
    /// When the backend reported the change.
    pub observed_at: Instant,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, op: EventOp) -> Self {
        Self {
            path: path.into(),
            op,
            observed_at: Instant::now(),
        }
    }

    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EventOp::Create)
    }

    pub fn observed(mut self, at: Instant) -> Self {
        self.observed_at = at;
        self
    }
}

/// Translate one backend event into zero or more file events.
///
/// Access events are ignored, except close-after-write which marks the end
/// of an upload and is reported as a write.
pub fn map_event(event: &Event) -> Vec<FileEvent> {
    let observed_at = Instant::now();
    let each = |op: EventOp| -> Vec<FileEvent> {
        event
            .paths
            .iter()
            .map(|p| FileEvent::new(p.clone(), op))
            .collect()
    };

    let events = match event.kind {
        EventKind::Create(_) => each(EventOp::Create),
        EventKind::Remove(_) => each(EventOp::Remove),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            each(EventOp::Write)
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => each(EventOp::Chmod),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(EventOp::Rename),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(EventOp::Create),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to, ..] => vec![
                FileEvent::new(from.clone(), EventOp::Rename),
                FileEvent::create(to.clone()),
            ],
            _ => Vec::new(),
        },
        // Backends that cannot tell the two sides of a rename apart.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| FileEvent::new(p.clone(), rename_side(p)))
            .collect(),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => each(EventOp::Write),
        _ => Vec::new(),
    };

    events
        .into_iter()
        .map(|e| e.observed(observed_at))
        .collect()
}

fn rename_side(path: &Path) -> EventOp {
    if path.exists() {
        EventOp::Create
    } else {
        EventOp::Rename
    }
}
