//! Pending-work counter shared by every task in an install session.
//!
//! The installer holds a [`WorkGuard`] until it exits. So does every in-flight
//! metadata parse, every directory event being classified, and every new
//! watch node until its initial scan is done. The coordinator blocks on
//! [`Session::wait_idle`] until the count drains to zero. Dropping a guard is
//! the only way to release a unit, so a parse that fails or a task that
//! returns early still releases its unit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

/// Shared count of not-yet-complete work with a wait-for-zero join point.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Counter>,
}

#[derive(Debug, Default)]
struct Counter {
    pending: AtomicUsize,
    idle: Notify,
}

impl Session {
    /// Create a session with no pending work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one unit of work. The unit is released when the guard drops.
    pub fn acquire(&self) -> WorkGuard {
        let pending = self.inner.pending.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("pending work: {}", pending);
        WorkGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Current number of pending units.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Wait until the pending count is zero.
    ///
    /// Returns immediately when nothing is pending, so callers register their
    /// first unit of work before waiting.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// One registered unit of pending work.
#[derive(Debug)]
#[must_use = "dropping the guard releases the unit of work immediately"]
pub struct WorkGuard {
    inner: Arc<Counter>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        let previous = self.inner.pending.fetch_sub(1, Ordering::AcqRel);
        trace!("pending work: {}", previous - 1);
        if previous == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
