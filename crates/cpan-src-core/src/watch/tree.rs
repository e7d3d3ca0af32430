//! Lifecycle anchor for the watch cascade.
//!
//! [`WatchTree`] establishes the root node, waits for the session's pending
//! work to drain, and then shuts every node down. It does no event
//! processing of its own.

use super::filter::FileEventFilter;
use super::node::{NodeContext, WatchNode};
use super::registry::WatchRegistry;
use crate::error::{CpanSrcError, Result};
use crate::session::Session;
use crate::shutdown::ShutdownSignal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Counters collected over the lifetime of a watch tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
    /// Watch nodes established, including the root.
    pub nodes_established: usize,
    /// Metadata files parsed and reported.
    pub extractions: usize,
    /// Metadata files that could not be opened or decoded.
    pub parse_failures: usize,
}

/// The root watch node plus everything needed to shut the cascade down.
pub struct WatchTree {
    root: PathBuf,
    ctx: NodeContext,
    fatal_rx: mpsc::UnboundedReceiver<CpanSrcError>,
}

impl WatchTree {
    /// Prepare a tree rooted at `root`. Nothing is watched until [`start`].
    ///
    /// [`start`]: WatchTree::start
    pub fn new(root: impl AsRef<Path>, session: Session, filter: FileEventFilter) -> Self {
        let (fatal, fatal_rx) = mpsc::unbounded_channel();
        Self {
            root: root.as_ref().to_path_buf(),
            ctx: NodeContext {
                session,
                registry: WatchRegistry::new(),
                filter: Arc::new(filter),
                shutdown: ShutdownSignal::new(),
                fatal,
                since: SystemTime::now(),
            },
            fatal_rx,
        }
    }

    /// The watched root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The session whose pending work this tree waits on.
    pub fn session(&self) -> &Session {
        &self.ctx.session
    }

    /// Directories currently under watch.
    pub fn live_nodes(&self) -> Vec<PathBuf> {
        self.ctx.registry.live_paths()
    }

    /// Establish the root subscription and start its loop.
    ///
    /// Failure here is fatal; the caller must not start the installer.
    pub fn start(&self) -> Result<()> {
        if !self.ctx.registry.claim(&self.root) {
            return Err(CpanSrcError::Other(format!(
                "already watching {}",
                self.root.display()
            )));
        }

        let node = match WatchNode::subscribe(&self.root) {
            Ok(node) => node,
            Err(e) => {
                self.ctx.registry.release(&self.root);
                return Err(e);
            }
        };

        info!("started watching: {}", node.path().display());
        let handle = tokio::spawn(node.run(self.ctx.clone(), None));
        self.ctx.registry.attach(&self.root, handle);
        Ok(())
    }

    /// Block until pending work drains or a watch cannot be established,
    /// then close every node.
    ///
    /// Returns the fatal error if one was raised. Nodes are closed in both
    /// cases.
    pub async fn wait(mut self) -> Result<TreeSummary> {
        let fatal = tokio::select! {
            biased;
            Some(err) = self.fatal_rx.recv() => Some(err),
            _ = self.ctx.session.wait_idle() => self.fatal_rx.try_recv().ok(),
        };

        if fatal.is_none() {
            debug!("pending work drained");
        }
        self.shutdown().await;

        match fatal {
            Some(err) => Err(err),
            None => Ok(self.summary()),
        }
    }

    /// Fire the shutdown signal and join every node loop.
    async fn shutdown(&self) {
        self.ctx.shutdown.trigger();

        loop {
            let handles = self.ctx.registry.take_handles();
            if handles.is_empty() {
                if self.ctx.registry.is_empty() {
                    break;
                }
                // A node claimed its path before the signal and has not
                // attached its handle yet.
                tokio::task::yield_now().await;
                continue;
            }

            for (path, handle) in handles {
                if let Err(e) = handle.await {
                    // The loop never reached its own release.
                    warn!("watch node for {} failed: {}", path.display(), e);
                    self.ctx.registry.release(&path);
                }
            }
        }

        info!(
            "closed all watches ({} established)",
            self.ctx.registry.established()
        );
    }

    fn summary(&self) -> TreeSummary {
        TreeSummary {
            nodes_established: self.ctx.registry.established(),
            extractions: self.ctx.filter.extractions(),
            parse_failures: self.ctx.filter.failures(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Extraction;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn tree(root: &Path) -> (WatchTree, Session, Arc<Mutex<Vec<Extraction>>>) {
        let session = Session::new();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let filter = FileEventFilter::new(
            "MYMETA.json",
            session.clone(),
            Arc::new(move |extraction| sink.lock().unwrap().push(extraction)),
        );
        (WatchTree::new(root, session.clone(), filter), session, reports)
    }

    #[tokio::test]
    async fn test_start_fails_for_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let (tree, _, _) = tree(&temp_dir.path().join("missing"));

        let err = tree.start().unwrap_err();
        assert!(err.is_fatal());
        assert!(tree.live_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let (tree, _, _) = tree(temp_dir.path());

        tree.start().unwrap();
        assert!(tree.start().is_err());
        assert_eq!(tree.live_nodes(), vec![temp_dir.path().to_path_buf()]);

        let summary = tree.wait().await.unwrap();
        assert_eq!(summary.nodes_established, 1);
    }

    #[tokio::test]
    async fn test_wait_returns_once_work_drains() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let (tree, session, reports) = tree(&root);
        tree.start().unwrap();

        let installer = session.acquire();
        let writer = tokio::spawn(async move {
            let dist = root.join("Foo-Bar-1.0");
            tokio::time::sleep(Duration::from_millis(200)).await;
            std::fs::create_dir(&dist).unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            std::fs::write(
                dist.join("MYMETA.json"),
                r#"{"resources":{"repository":{"url":"https://example.com/foo-bar.git"}}}"#,
            )
            .unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(installer);
        });

        let summary = tokio::time::timeout(Duration::from_secs(10), tree.wait())
            .await
            .expect("tree should shut down")
            .unwrap();
        writer.await.unwrap();

        assert_eq!(summary.nodes_established, 2);
        assert_eq!(summary.extractions, 1);
        assert_eq!(
            reports.lock().unwrap()[0].repository_url,
            "https://example.com/foo-bar.git"
        );
        assert_eq!(session.pending(), 0);
    }

    #[tokio::test]
    async fn test_wait_closes_every_node() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let (tree, session, _) = tree(&root);
        tree.start().unwrap();

        let installer = session.acquire();
        let a = root.join("a");
        std::fs::create_dir(&a).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::create_dir(a.join("b")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let registry = tree.ctx.registry.clone();
        assert_eq!(registry.len(), 3);

        drop(installer);
        let summary = tokio::time::timeout(Duration::from_secs(10), tree.wait())
            .await
            .expect("tree should shut down")
            .unwrap();

        assert_eq!(summary.nodes_established, 3);
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_survives_a_panicking_node() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let session = Session::new();
        let filter = FileEventFilter::new(
            "MYMETA.json",
            session.clone(),
            Arc::new(|_: Extraction| panic!("report sink failed")),
        );
        let tree = WatchTree::new(&root, session.clone(), filter);
        tree.start().unwrap();
        let registry = tree.ctx.registry.clone();

        let installer = session.acquire();
        std::fs::write(
            root.join("MYMETA.json"),
            r#"{"resources":{"repository":{"url":"https://example.com/foo-bar.git"}}}"#,
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(installer);

        tokio::time::timeout(Duration::from_secs(5), tree.wait())
            .await
            .expect("shutdown should not hang on a failed node")
            .unwrap();
        assert!(registry.is_empty());
    }
}
