//! Batch-completion counters.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Inner {
    value: AtomicUsize,
}

/// Tracks how many jobs of a batch are still outstanding.
///
/// A counter is armed to the batch size by
/// [`run_jobs`](crate::JobSystem::run_jobs) before any of the batch's jobs
/// can run, and decremented by exactly one as each job completes. Those two
/// sites — plus wait evaluation — are the only places the value changes;
/// callers observe it through [`Self::value`] and wait on it through
/// [`JobContext::wait_for_counter`](crate::JobContext::wait_for_counter).
///
/// Cloning is cheap and shares the same underlying value. A counter may be
/// reused for a new batch once the previous batch has fully completed.
/// Submitting a new batch while the previous one is still outstanding makes
/// the wake conditions of both batches meaningless and must be avoided by
/// the caller.
#[derive(Clone)]
pub struct Counter {
    inner: Arc<Inner>,
}

impl Counter {
    /// Creates a counter with no outstanding jobs.
    pub fn new() -> Self {
        Counter {
            inner: Arc::new(Inner {
                value: AtomicUsize::new(0),
            }),
        }
    }

    /// Current number of outstanding jobs.
    pub fn value(&self) -> usize {
        self.inner.value.load(Ordering::Acquire)
    }

    /// True once every job of the current batch has completed.
    pub fn is_complete(&self) -> bool {
        self.value() == 0
    }

    /// Arms the counter for a batch of `n` jobs. Runs strictly before the
    /// batch is enqueued so no job can complete against a stale size.
    pub(crate) fn set(&self, n: usize) {
        self.inner.value.store(n, Ordering::Release);
    }

    /// Records one job completion and returns the new value.
    pub(crate) fn decrement(&self) -> usize {
        let old = self.inner.value.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old != 0, "counter decremented below zero");
        old - 1
    }

    /// Identity of the shared value, used to key the waiting registry.
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl Default for Counter {
    fn default() -> Self {
        Counter::new()
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("value", &self.value())
            .finish()
    }
}
