//! Bounded pool for fire-and-forget work.
//!
//! Audit submission, blob reclamation and edge firewall calls never block the
//! caller. Each job gets its own task, but only `max_concurrency` of them may
//! be talking to the outside world at once, so a bulk purge cannot fan out
//! into thousands of concurrent object-store calls.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};
use tracing::{debug, Instrument};

#[derive(Clone)]
pub struct BackgroundPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    permits: Arc<Semaphore>,
    /// Jobs queued or running
    pending: AtomicUsize,
    idle: Notify,
    max_concurrency: usize,
}

/// Decrements the pending count even if the job panics.
struct PendingGuard(Arc<PoolInner>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl BackgroundPool {
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(max_concurrency)),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                max_concurrency,
            }),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Detaches `job`. There is no join handle and no cancellation.
    pub fn spawn<F>(&self, name: &'static str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(
            async move {
                let _guard = PendingGuard(Arc::clone(&inner));
                // The semaphore is never closed, acquire only fails if it were.
                let Ok(_permit) = Arc::clone(&inner.permits).acquire_owned().await else {
                    return;
                };
                job.await;
                debug!(job = name, "background job finished");
            }
            .in_current_span(),
        );
    }

    /// Resolves once nothing is queued or running.
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

impl std::fmt::Debug for BackgroundPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundPool")
            .field("max_concurrency", &self.inner.max_concurrency)
            .field("pending", &self.pending())
            .finish()
    }
}
