//! File system event types, notify translation and batching.

#![allow(clippy::missing_const_for_fn)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};

/// Whether a changed path was new or already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
}

/// Normalized file system event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// File appeared.
    Created(PathBuf),
    /// File content or metadata changed.
    Modified(PathBuf),
    /// File was deleted.
    Deleted(PathBuf),
    /// File was renamed from old path to new path.
    Renamed { from: PathBuf, to: PathBuf },
}

impl FileEvent {
    /// Get the primary path associated with this event.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => p,
            Self::Renamed { to, .. } => to,
        }
    }
}

/// Events coalesced over one debounce window.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EventBatch {
    /// Paths to (re)hash, with the first kind seen for each.
    pub changed: Vec<(PathBuf, ChangeKind)>,
    /// Paths that disappeared.
    pub deleted: Vec<PathBuf>,
    /// Moves, in arrival order.
    pub renamed: Vec<(PathBuf, PathBuf)>,
}

impl EventBatch {
    /// Create a new empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event to the batch.
    pub fn add(&mut self, event: FileEvent) {
        match event {
            FileEvent::Created(path) => self.add_change(path, ChangeKind::Created),
            FileEvent::Modified(path) => self.add_change(path, ChangeKind::Modified),
            FileEvent::Deleted(path) => {
                self.changed.retain(|(p, _)| p != &path);
                if !self.deleted.contains(&path) {
                    self.deleted.push(path);
                }
            }
            FileEvent::Renamed { from, to } => {
                self.changed.retain(|(p, _)| p != &from);
                self.deleted.retain(|p| p != &to);
                self.renamed.push((from, to));
            }
        }
    }

    fn add_change(&mut self, path: PathBuf, kind: ChangeKind) {
        // Deleted and written again in the same window: the file was replaced.
        if let Some(pos) = self.deleted.iter().position(|p| p == &path) {
            self.deleted.remove(pos);
            self.changed.retain(|(p, _)| p != &path);
            self.changed.push((path, ChangeKind::Modified));
            return;
        }

        if !self.changed.iter().any(|(p, _)| p == &path) {
            self.changed.push((path, kind));
        }
    }

    /// Check if batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty() && self.renamed.is_empty()
    }

    /// Get total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changed.len() + self.deleted.len() + self.renamed.len()
    }

    /// Keep only events under one of the given roots.
    pub fn retain_under(&mut self, roots: &[PathBuf]) {
        self.changed.retain(|(p, _)| is_under(roots, p));
        self.deleted.retain(|p| is_under(roots, p));
        self.renamed
            .retain(|(from, to)| is_under(roots, from) || is_under(roots, to));
    }
}

/// Check if a path is under any of the roots.
fn is_under(roots: &[PathBuf], path: &Path) -> bool {
    roots.iter().any(|root| path.starts_with(root))
}

/// Turns raw notify events into [`FileEvent`]s.
///
/// Backends that report a rename as two halves tag both with the same
/// tracker cookie. The "from" half is held until its "to" half arrives; if
/// none arrives within the rename window the file was moved out of the
/// watched tree and reads as deleted. A "to" half with no partner was moved
/// in and reads as created.
#[derive(Debug)]
pub struct EventTranslator {
    rename_window: Duration,
    pending: HashMap<usize, (PathBuf, Instant)>,
    paired: HashMap<usize, Instant>,
}

impl EventTranslator {
    #[must_use]
    pub fn new(rename_window: Duration) -> Self {
        Self {
            rename_window,
            pending: HashMap::new(),
            paired: HashMap::new(),
        }
    }

    /// Whether a rename half is waiting for its partner.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Translate one raw event received at `now`.
    pub fn translate(&mut self, event: Event, now: Instant) -> Vec<FileEvent> {
        let tracker = event.attrs.tracker();
        let mut paths = event.paths;

        match event.kind {
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
                Vec::new()
            }
            EventKind::Create(_) => paths.into_iter().map(FileEvent::Created).collect(),
            EventKind::Remove(_) => paths.into_iter().map(FileEvent::Deleted).collect(),

            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                let Some(from) = paths.pop() else {
                    return Vec::new();
                };
                match tracker {
                    Some(cookie) => {
                        self.pending.insert(cookie, (from, now));
                        Vec::new()
                    }
                    None => vec![FileEvent::Deleted(from)],
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let Some(to) = paths.pop() else {
                    return Vec::new();
                };
                match tracker.and_then(|cookie| self.take_pending(cookie, now)) {
                    Some(from) => renamed(from, to),
                    None if to.is_dir() => Vec::new(),
                    None => vec![FileEvent::Created(to)],
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if tracker.is_some_and(|cookie| self.paired.remove(&cookie).is_some()) {
                    return Vec::new();
                }
                if let Some(cookie) = tracker {
                    self.pending.remove(&cookie);
                }
                if paths.len() < 2 {
                    return Vec::new();
                }
                let to = paths.swap_remove(1);
                let from = paths.swap_remove(0);
                renamed(from, to)
            }
            EventKind::Modify(ModifyKind::Name(_)) => paths
                .into_iter()
                .map(|p| {
                    if p.exists() {
                        FileEvent::Modified(p)
                    } else {
                        FileEvent::Deleted(p)
                    }
                })
                .collect(),

            // Permission and timestamp changes do not touch content.
            EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
            EventKind::Modify(_) => paths.into_iter().map(FileEvent::Modified).collect(),

            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }

    /// Turn "from" halves older than the rename window into deletes.
    ///
    /// Also forgets paired cookies whose combined event never came.
    pub fn expire(&mut self, now: Instant) -> Vec<FileEvent> {
        let window = self.rename_window;
        self.paired
            .retain(|_, at| now.duration_since(*at) < window);

        let expired: Vec<usize> = self
            .pending
            .iter()
            .filter(|(_, (_, at))| now.duration_since(*at) >= window)
            .map(|(cookie, _)| *cookie)
            .collect();

        expired
            .into_iter()
            .filter_map(|cookie| self.pending.remove(&cookie))
            .map(|(from, _)| FileEvent::Deleted(from))
            .collect()
    }

    fn take_pending(&mut self, cookie: usize, now: Instant) -> Option<PathBuf> {
        let (from, _) = self.pending.remove(&cookie)?;
        self.paired.insert(cookie, now);
        Some(from)
    }
}

fn renamed(from: PathBuf, to: PathBuf) -> Vec<FileEvent> {
    if to.is_dir() {
        return Vec::new();
    }
    vec![FileEvent::Renamed { from, to }]
}
