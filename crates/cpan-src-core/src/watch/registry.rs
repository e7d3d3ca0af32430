//! Registry of live watch nodes.
//!
//! Events are never routed through the registry. It exists so that a path is
//! watched by at most one node at a time, and so the coordinator can find and
//! join every node loop at shutdown.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct RegistryState {
    /// Live paths and, once spawned, the handle of their node loop.
    live: HashMap<PathBuf, Option<JoinHandle<()>>>,
    /// Nodes established over the whole session.
    established: usize,
}

/// Set of directories currently under watch.
#[derive(Debug, Clone, Default)]
pub struct WatchRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Entries stay consistent even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve `path` for a new node. Returns false if it is already watched.
    pub fn claim(&self, path: &Path) -> bool {
        let mut state = self.lock();
        if state.live.contains_key(path) {
            return false;
        }
        state.live.insert(path.to_path_buf(), None);
        true
    }

    /// Record the loop handle for a claimed path.
    ///
    /// If the node already exited and released its claim, the handle is
    /// dropped and the finished task is left detached.
    pub fn attach(&self, path: &Path, handle: JoinHandle<()>) {
        let mut state = self.lock();
        state.established += 1;
        if let Some(slot) = state.live.get_mut(path) {
            *slot = Some(handle);
        }
    }

    /// Drop the claim on `path`.
    pub fn release(&self, path: &Path) {
        self.lock().live.remove(path);
    }

    /// Whether `path` is currently watched or being set up.
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().live.contains_key(path)
    }

    /// Paths currently watched, sorted.
    pub fn live_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.lock().live.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().live.is_empty()
    }

    /// Number of nodes established over the session, including closed ones.
    pub fn established(&self) -> usize {
        self.lock().established
    }

    /// Take every attached loop handle with its path, leaving the claims in
    /// place.
    pub(crate) fn take_handles(&self) -> Vec<(PathBuf, JoinHandle<()>)> {
        self.lock()
            .live
            .iter_mut()
            .filter_map(|(path, slot)| slot.take().map(|handle| (path.clone(), handle)))
            .collect()
    }
}
