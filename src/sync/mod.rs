//! Admission control and the shared search-path lock.
//!
//! One [`ConcurrencyController`] is built per manager and handed to every
//! lifecycle operation. It bounds how many plugin operations run at once and
//! owns the search path behind a mutex so no two plugins interleave their
//! read-modify-write of it.

mod search_path;

pub use search_path::SearchPath;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, MutexGuard, Semaphore, SemaphorePermit};

struct ControllerInner {
    permits: Semaphore,
    limit: usize,
    search_path: Mutex<SearchPath>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl std::fmt::Debug for ControllerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerInner")
            .field("limit", &self.limit)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .field("peak", &self.peak.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Counting semaphore plus search-path mutex, cheap to clone.
#[derive(Debug, Clone)]
pub struct ConcurrencyController(Arc<ControllerInner>);

impl ConcurrencyController {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self(Arc::new(ControllerInner {
            permits: Semaphore::new(limit),
            limit,
            search_path: Mutex::new(SearchPath::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }))
    }

    /// Controller that runs one operation at a time.
    pub fn serial() -> Self {
        Self::new(1)
    }

    pub fn limit(&self) -> usize {
        self.0.limit
    }

    /// Waits for an operation slot. Waiters are served in FIFO order.
    pub async fn acquire(&self) -> OperationPermit<'_> {
        let permit = self
            .0
            .permits
            .acquire()
            .await
            .expect("semaphore should not be closed");
        let current = self.0.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.0.peak.fetch_max(current, Ordering::AcqRel);
        OperationPermit {
            permit,
            in_flight: &self.0.in_flight,
        }
    }

    pub fn try_acquire(&self) -> Option<OperationPermit<'_>> {
        self.0.permits.try_acquire().ok().map(|permit| {
            let current = self.0.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
            self.0.peak.fetch_max(current, Ordering::AcqRel);
            OperationPermit {
                permit,
                in_flight: &self.0.in_flight,
            }
        })
    }

    /// Enters the search-path critical section.
    pub async fn lock_search_path(&self) -> MutexGuard<'_, SearchPath> {
        self.0.search_path.lock().await
    }

    pub async fn search_path(&self) -> SearchPath {
        self.0.search_path.lock().await.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.0.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of permits held at once since construction.
    pub fn peak(&self) -> usize {
        self.0.peak.load(Ordering::Acquire)
    }
}

impl Default for ConcurrencyController {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONCURRENCY)
    }
}

/// Held for the duration of one plugin operation.
pub struct OperationPermit<'a> {
    #[allow(dead_code)]
    permit: SemaphorePermit<'a>,
    in_flight: &'a AtomicUsize,
}

impl Drop for OperationPermit<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_limit_is_clamped() {
        assert_eq!(ConcurrencyController::new(0).limit(), 1);
        assert_eq!(ConcurrencyController::default().limit(), 8);
    }

    #[tokio::test]
    async fn test_permits_are_bounded() {
        let controller = ConcurrencyController::new(2);
        let a = controller.acquire().await;
        let b = controller.acquire().await;
        assert_eq!(controller.in_flight(), 2);
        assert!(controller.try_acquire().is_none());

        drop(a);
        assert_eq!(controller.in_flight(), 1);
        let c = controller.try_acquire();
        assert!(c.is_some());
        drop(b);
        drop(c);
        assert_eq!(controller.in_flight(), 0);
        assert_eq!(controller.peak(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_tasks_never_exceed_limit() {
        let controller = ConcurrencyController::new(3);
        let tasks = (0..10).map(|_| {
            let controller = controller.clone();
            async move {
                let _permit = controller.acquire().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        futures::future::join_all(tasks).await;

        assert_eq!(controller.in_flight(), 0);
        assert_eq!(controller.peak(), 3);
    }

    #[tokio::test]
    async fn test_search_path_is_shared_between_clones() {
        let controller = ConcurrencyController::serial();
        let other = controller.clone();
        controller.lock_search_path().await.insert("/p/a");
        other.lock_search_path().await.insert("/p/a");
        other.lock_search_path().await.insert("/p/b");

        assert_eq!(controller.search_path().await.len(), 2);
    }
}
