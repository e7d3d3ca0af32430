//! Translation of raw watch-source events into the observations a watch node
//! acts on.

use notify::{Event, EventKind};
use std::path::PathBuf;

/// A created or modified path reported by a watch subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// What a node learns from one raw event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notice {
    /// A path appeared or changed.
    Changed(FileEvent),
    /// A path was removed. Only meaningful when it names the node's own
    /// directory.
    Removed(PathBuf),
}

/// Split a raw event into per-path notices.
///
/// Access events carry no information about new content and are dropped.
/// Every other kind, including the catch-all kinds some backends emit, is
/// treated as a change and left to the filesystem query to classify.
pub(crate) fn notices(event: Event) -> Vec<Notice> {
    match event.kind {
        EventKind::Access(_) => vec![],
        EventKind::Remove(_) => event.paths.into_iter().map(Notice::Removed).collect(),
        _ => event
            .paths
            .into_iter()
            .map(|path| Notice::Changed(FileEvent { path }))
            .collect(),
    }
}
