//! Metadata file detection for file events.

use super::event::FileEvent;
use crate::metadata::{extract_repository, Extraction};
use crate::session::Session;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Callback invoked with every successful extraction.
pub type ReportCallback = Arc<dyn Fn(Extraction) + Send + Sync + 'static>;

/// Result of running one event through the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The path does not name a metadata file.
    Ignored,
    /// The metadata file was parsed and reported.
    Extracted(Extraction),
    /// The metadata file was parsed but the same URL was already reported
    /// for this path. Writers emit several events per file.
    AlreadyReported(Extraction),
    /// The metadata file could not be opened or decoded.
    Failed,
}

/// Decides whether a file event names the metadata file and, if so, parses it.
pub struct FileEventFilter {
    suffix: String,
    session: Session,
    on_report: ReportCallback,
    reported: Mutex<HashMap<PathBuf, String>>,
    extractions: AtomicUsize,
    failures: AtomicUsize,
}

impl FileEventFilter {
    /// Create a filter matching file names that end in `suffix`.
    pub fn new(suffix: impl Into<String>, session: Session, on_report: ReportCallback) -> Self {
        Self {
            suffix: suffix.into(),
            session,
            on_report,
            reported: Mutex::new(HashMap::new()),
            extractions: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Case-sensitive suffix match on the final path component.
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(self.suffix.as_str()))
    }

    /// Run one file event through the filter.
    ///
    /// A match holds one unit of pending work for the duration of the parse,
    /// released whether or not the parse succeeds. Parse failures are logged
    /// and never propagated.
    pub async fn handle(&self, event: &FileEvent) -> FilterOutcome {
        debug!("file found: {}", event.path.display());
        if !self.matches(&event.path) {
            return FilterOutcome::Ignored;
        }

        let _work = self.session.acquire();
        let path = event.path.clone();
        let parsed = tokio::task::spawn_blocking(move || extract_repository(&path)).await;

        match parsed {
            Ok(Ok(extraction)) => {
                if !self.first_report(&extraction) {
                    debug!("already reported {}", extraction.path.display());
                    return FilterOutcome::AlreadyReported(extraction);
                }
                info!(
                    "repository of {}: {:?}",
                    extraction.path.display(),
                    extraction.repository_url
                );
                self.extractions.fetch_add(1, Ordering::Relaxed);
                (self.on_report)(extraction.clone());
                FilterOutcome::Extracted(extraction)
            }
            Ok(Err(e)) => {
                warn!("failed to read {}: {}", event.path.display(), e);
                self.failures.fetch_add(1, Ordering::Relaxed);
                FilterOutcome::Failed
            }
            Err(e) => {
                warn!("metadata parse task for {} failed: {}", event.path.display(), e);
                self.failures.fetch_add(1, Ordering::Relaxed);
                FilterOutcome::Failed
            }
        }
    }

    /// Remember `extraction`, returning false if this path already reported
    /// the same URL.
    fn first_report(&self, extraction: &Extraction) -> bool {
        let mut reported = self.reported.lock().unwrap_or_else(PoisonError::into_inner);
        match reported.get(&extraction.path) {
            Some(url) if *url == extraction.repository_url => false,
            _ => {
                reported.insert(extraction.path.clone(), extraction.repository_url.clone());
                true
            }
        }
    }

    /// Number of successful extractions so far.
    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::Relaxed)
    }

    /// Number of matching files that could not be parsed.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }
}
