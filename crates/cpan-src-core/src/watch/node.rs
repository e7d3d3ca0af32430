//! A watch subscription on a single directory and the loop that consumes it.
//!
//! Subscriptions are non-recursive. When a node sees a new directory it
//! establishes a child node on it, so the tree of nodes grows with whatever
//! the installer creates. A subscription that cannot be established is fatal
//! for the whole session and is reported on the fatal channel.
//!
//! Anything written before a child's subscription exists never produces an
//! event, so a new child scans its directory once before entering its loop.
//! Events still inside the watch source at shutdown are lost as well, so every
//! node sweeps its directory again on close.

use super::event::{notices, FileEvent, Notice};
use super::filter::FileEventFilter;
use super::registry::WatchRegistry;
use crate::error::{CpanSrcError, Result};
use crate::session::{Session, WorkGuard};
use crate::shutdown::ShutdownSignal;
use futures::future::{BoxFuture, FutureExt};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Filesystem timestamps lag the wall clock by up to a scheduler tick.
const MTIME_SLACK: Duration = Duration::from_secs(1);

/// State shared by every node in one watch tree.
#[derive(Clone)]
pub(crate) struct NodeContext {
    pub session: Session,
    pub registry: WatchRegistry,
    pub filter: Arc<FileEventFilter>,
    pub shutdown: ShutdownSignal,
    pub fatal: mpsc::UnboundedSender<CpanSrcError>,
    /// When the tree started. The root's closing sweep ignores entries
    /// older than this.
    pub since: SystemTime,
}

/// One live watch subscription.
pub struct WatchNode {
    path: PathBuf,
    watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<Event>,
    errors: mpsc::UnboundedReceiver<notify::Error>,
}

enum Step {
    Shutdown,
    Event(Option<Event>),
    Error(notify::Error),
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

impl WatchNode {
    /// Establish a non-recursive subscription on `path`.
    pub fn subscribe(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => {
                    let _ = error_tx.send(e);
                }
            },
            Config::default(),
        )
        .map_err(|e| CpanSrcError::subscription(e, &path))?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| CpanSrcError::subscription(e, &path))?;

        Ok(Self {
            path,
            watcher,
            events,
            errors,
        })
    }

    /// The watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the event loop until shutdown or until the directory is removed.
    ///
    /// `establishing` is set for child nodes: the directory is new, so its
    /// current contents are scanned while that unit of pending work is still
    /// held. The root passes `None` and is never scanned on start.
    ///
    /// Boxed because child loops are spawned from inside this future.
    pub(crate) fn run(
        mut self,
        ctx: NodeContext,
        establishing: Option<WorkGuard>,
    ) -> BoxFuture<'static, ()> {
        async move {
            let is_new = establishing.is_some();
            if let Some(work) = establishing {
                scan(&self.path, &ctx).await;
                drop(work);
            }

            loop {
                let step = tokio::select! {
                    biased;
                    _ = ctx.shutdown.triggered() => Step::Shutdown,
                    event = self.events.recv() => Step::Event(event),
                    Some(err) = self.errors.recv() => Step::Error(err),
                };

                match step {
                    Step::Shutdown | Step::Event(None) => break,
                    Step::Event(Some(event)) => {
                        if dispatch(&self.path, event, &ctx).await == Flow::Stop {
                            info!("watched directory removed: {}", self.path.display());
                            break;
                        }
                    }
                    Step::Error(err) => {
                        warn!("{} on {}", CpanSrcError::WatchSource(err), self.path.display());
                    }
                }
            }

            self.close(&ctx, is_new).await;
        }
        .boxed()
    }

    /// Release the subscription, handle whatever was already queued, then
    /// sweep the directory for files whose events never arrived.
    ///
    /// Files still go through the filter. Directories are not followed with
    /// new nodes because shutdown refuses them; the sweep descends into them
    /// instead. A new directory is swept in full, the root only for entries
    /// modified since the tree started.
    async fn close(self, ctx: &NodeContext, is_new: bool) {
        let WatchNode {
            path,
            watcher,
            mut events,
            errors: _,
        } = self;
        drop(watcher);

        let mut drained = 0usize;
        while let Ok(event) = events.try_recv() {
            for notice in notices(event) {
                if let Notice::Changed(file_event) = notice {
                    drained += 1;
                    match tokio::fs::metadata(&file_event.path).await {
                        Ok(metadata) if metadata.is_file() => {
                            ctx.filter.handle(&file_event).await;
                        }
                        Ok(_) => {}
                        Err(e) => warn!(
                            "failed to retrieve file info for {}: {}",
                            file_event.path.display(),
                            e
                        ),
                    }
                }
            }
        }
        if drained > 0 {
            debug!("drained {} queued events for {}", drained, path.display());
        }

        let since = if is_new { None } else { Some(ctx.since) };
        sweep(&path, ctx, since).await;

        ctx.registry.release(&path);
        debug!("stopped watching: {}", path.display());
    }
}

async fn dispatch(own_path: &Path, event: Event, ctx: &NodeContext) -> Flow {
    for notice in notices(event) {
        match notice {
            Notice::Changed(file_event) => handle_change(file_event, ctx).await,
            Notice::Removed(path) if path == own_path => return Flow::Stop,
            Notice::Removed(path) => debug!("ignoring removal of {}", path.display()),
        }
    }
    Flow::Continue
}

/// Classify the event subject and either follow it or filter it.
///
/// Holds a unit of pending work from before the filesystem query until the
/// child node, if any, owns its own.
async fn handle_change(event: FileEvent, ctx: &NodeContext) {
    let _work = ctx.session.acquire();
    let metadata = match tokio::fs::metadata(&event.path).await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("failed to retrieve file info for {}: {}", event.path.display(), e);
            return;
        }
    };

    if metadata.is_dir() {
        spawn_child(event.path, ctx);
    } else {
        ctx.filter.handle(&event).await;
    }
}

/// Feed every entry already in a freshly watched directory through
/// [`handle_change`].
async fn scan(dir: &Path, ctx: &NodeContext) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("failed to scan {}: {}", dir.display(), e);
            return;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => handle_change(FileEvent::new(entry.path()), ctx).await,
            Ok(None) => break,
            Err(e) => {
                warn!("failed to scan {}: {}", dir.display(), e);
                break;
            }
        }
    }
}

/// Run every file under `dir` through the filter, descending into
/// directories that have no node of their own.
///
/// With `since`, top-level entries last modified before that time are
/// skipped.
async fn sweep(dir: &Path, ctx: &NodeContext, since: Option<SystemTime>) {
    let registry = ctx.registry.clone();
    let root = dir.to_path_buf();
    let files = tokio::task::spawn_blocking(move || {
        WalkDir::new(&root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 1 {
                    if let Some(since) = since {
                        let recent = e
                            .metadata()
                            .ok()
                            .and_then(|meta| meta.modified().ok())
                            .is_some_and(|modified| modified + MTIME_SLACK >= since);
                        if !recent {
                            return false;
                        }
                    }
                }
                !(e.file_type().is_dir() && registry.contains(e.path()))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect::<Vec<_>>()
    })
    .await;

    let files = match files {
        Ok(files) => files,
        Err(e) => {
            warn!("sweep of {} failed: {}", dir.display(), e);
            return;
        }
    };
    for path in files {
        ctx.filter.handle(&FileEvent::new(path)).await;
    }
}

/// Establish and start a child node on `path`.
///
/// The new node holds a unit of pending work until its initial scan is done,
/// so the coordinator cannot shut down before the directory's current
/// contents have been seen.
pub(crate) fn spawn_child(path: PathBuf, ctx: &NodeContext) {
    if ctx.shutdown.is_triggered() {
        debug!("shutting down, not following {}", path.display());
        return;
    }
    if !ctx.registry.claim(&path) {
        debug!("already watching {}", path.display());
        return;
    }

    let work = ctx.session.acquire();
    match WatchNode::subscribe(&path) {
        Ok(node) => {
            info!("started watching: {}", path.display());
            let handle = tokio::spawn(node.run(ctx.clone(), Some(work)));
            ctx.registry.attach(&path, handle);
        }
        Err(e) => {
            ctx.registry.release(&path);
            error!("{}", e);
            let _ = ctx.fatal.send(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Extraction;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Harness {
        ctx: NodeContext,
        fatal_rx: mpsc::UnboundedReceiver<CpanSrcError>,
        reports: Arc<Mutex<Vec<Extraction>>>,
    }

    fn harness() -> Harness {
        let session = Session::new();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let filter = FileEventFilter::new(
            "MYMETA.json",
            session.clone(),
            Arc::new(move |extraction| sink.lock().unwrap().push(extraction)),
        );
        let (fatal, fatal_rx) = mpsc::unbounded_channel();

        Harness {
            ctx: NodeContext {
                session,
                registry: WatchRegistry::new(),
                filter: Arc::new(filter),
                shutdown: ShutdownSignal::new(),
                fatal,
                since: SystemTime::now(),
            },
            fatal_rx,
            reports,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    #[test]
    fn test_subscribe_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = WatchNode::subscribe(temp_dir.path().join("missing"))
            .err()
            .expect("subscription should fail");
        assert!(matches!(err, CpanSrcError::WatchSubscription { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_spawn_child_refuses_duplicate_path() {
        let temp_dir = TempDir::new().unwrap();
        let h = harness();

        spawn_child(temp_dir.path().to_path_buf(), &h.ctx);
        spawn_child(temp_dir.path().to_path_buf(), &h.ctx);

        assert_eq!(h.ctx.registry.len(), 1);
        assert_eq!(h.ctx.registry.established(), 1);
        wait_until(|| h.ctx.session.pending() == 0).await;

        h.ctx.shutdown.trigger();
        wait_until(|| h.ctx.registry.is_empty()).await;
    }

    #[tokio::test]
    async fn test_spawn_child_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness();
        let missing = temp_dir.path().join("missing");

        spawn_child(missing.clone(), &h.ctx);

        let err = h.fatal_rx.try_recv().expect("fatal error expected");
        assert!(matches!(err, CpanSrcError::WatchSubscription { ref path, .. } if *path == missing));
        assert!(h.ctx.registry.is_empty());
        assert_eq!(h.ctx.session.pending(), 0);
    }

    #[tokio::test]
    async fn test_spawn_child_after_shutdown_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let h = harness();
        h.ctx.shutdown.trigger();

        spawn_child(temp_dir.path().to_path_buf(), &h.ctx);
        assert!(h.ctx.registry.is_empty());
        assert_eq!(h.ctx.registry.established(), 0);
    }

    #[tokio::test]
    async fn test_cascade_follows_new_directories() {
        let temp_dir = TempDir::new().unwrap();
        let h = harness();
        let root = temp_dir.path().to_path_buf();

        spawn_child(root.clone(), &h.ctx);

        let dist = root.join("Foo-Bar-1.0");
        std::fs::create_dir(&dist).unwrap();
        wait_until(|| h.ctx.registry.contains(&dist)).await;

        let nested = dist.join("lib");
        std::fs::create_dir(&nested).unwrap();
        wait_until(|| h.ctx.registry.contains(&nested)).await;

        std::fs::write(
            dist.join("MYMETA.json"),
            r#"{"resources":{"repository":{"url":"https://example.com/foo-bar.git"}}}"#,
        )
        .unwrap();
        wait_until(|| !h.reports.lock().unwrap().is_empty()).await;

        assert_eq!(h.ctx.registry.established(), 3);
        assert_eq!(
            h.reports.lock().unwrap()[0].repository_url,
            "https://example.com/foo-bar.git"
        );

        h.ctx.shutdown.trigger();
        wait_until(|| h.ctx.registry.is_empty()).await;
    }

    #[tokio::test]
    async fn test_node_stops_when_directory_removed() {
        let temp_dir = TempDir::new().unwrap();
        let h = harness();
        let root = temp_dir.path().to_path_buf();
        spawn_child(root.clone(), &h.ctx);

        let dist = root.join("Foo-Bar-1.0");
        std::fs::create_dir(&dist).unwrap();
        wait_until(|| h.ctx.registry.contains(&dist)).await;

        std::fs::remove_dir(&dist).unwrap();
        wait_until(|| !h.ctx.registry.contains(&dist)).await;
        assert!(h.ctx.registry.contains(&root));

        h.ctx.shutdown.trigger();
        wait_until(|| h.ctx.registry.is_empty()).await;
    }

    const FOO_BAR: &str = r#"{"resources":{"repository":{"url":"https://example.com/foo-bar.git"}}}"#;

    #[tokio::test]
    async fn test_new_child_scans_existing_contents() {
        let temp_dir = TempDir::new().unwrap();
        let h = harness();
        let dist = temp_dir.path().join("Foo-Bar-1.0");
        let nested = dist.join("lib").join("Foo");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dist.join("MYMETA.json"), FOO_BAR).unwrap();

        spawn_child(dist.clone(), &h.ctx);

        wait_until(|| h.ctx.registry.contains(&nested)).await;
        wait_until(|| h.ctx.session.pending() == 0).await;
        assert_eq!(h.ctx.registry.established(), 3);
        assert_eq!(h.reports.lock().unwrap().len(), 1);

        h.ctx.shutdown.trigger();
        wait_until(|| h.ctx.registry.is_empty()).await;
    }

    #[tokio::test]
    async fn test_close_sweeps_files_written_before_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let h = harness();
        let dist = temp_dir.path().join("Foo-Bar-1.0");
        std::fs::create_dir(&dist).unwrap();
        spawn_child(dist.clone(), &h.ctx);
        wait_until(|| h.ctx.session.pending() == 0).await;

        // Nested directory and file land together, then shutdown fires at once.
        let nested = dist.join("sub");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("MYMETA.json"), FOO_BAR).unwrap();
        h.ctx.shutdown.trigger();

        wait_until(|| h.ctx.registry.is_empty()).await;
        let reports = h.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].path, nested.join("MYMETA.json"));
    }

    #[tokio::test]
    async fn test_root_sweep_skips_entries_older_than_tree() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness();
        let root = temp_dir.path().to_path_buf();
        let old = root.join("Old-0.1");
        std::fs::create_dir(&old).unwrap();
        std::fs::write(old.join("MYMETA.json"), FOO_BAR).unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        h.ctx.since = SystemTime::now();

        assert!(h.ctx.registry.claim(&root));
        let node = WatchNode::subscribe(&root).unwrap();
        let handle = tokio::spawn(node.run(h.ctx.clone(), None));
        h.ctx.registry.attach(&root, handle);

        let new = root.join("New-1.0");
        std::fs::create_dir(&new).unwrap();
        std::fs::write(new.join("MYMETA.json"), FOO_BAR).unwrap();
        h.ctx.shutdown.trigger();

        wait_until(|| h.ctx.registry.is_empty()).await;
        let reports = h.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].path, new.join("MYMETA.json"));
    }

    #[tokio::test]
    async fn test_directory_event_holds_work_while_classified() {
        let temp_dir = TempDir::new().unwrap();
        let h = harness();
        let dist = temp_dir.path().join("Foo-Bar-1.0");
        std::fs::create_dir(&dist).unwrap();

        let ctx = h.ctx.clone();
        let event = FileEvent::new(dist.clone());
        let task = tokio::spawn(async move { handle_change(event, &ctx).await });
        tokio::task::yield_now().await;
        assert!(h.ctx.session.pending() >= 1);

        task.await.unwrap();
        assert!(h.ctx.registry.contains(&dist));
        wait_until(|| h.ctx.session.pending() == 0).await;

        h.ctx.shutdown.trigger();
        wait_until(|| h.ctx.registry.is_empty()).await;
    }
}
