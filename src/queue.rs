//! Thread-safe FIFO storage for pending jobs and ready continuations.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// An unbounded multi-producer/multi-consumer FIFO.
///
/// Mutual exclusion is a single exclusive lock per queue instance. The
/// scheduler keeps one queue per thread class per kind (pending jobs, ready
/// continuations), so contention is bounded to a class.
pub(crate) struct Queue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Queue<T> {
    pub(crate) fn new() -> Self {
        Queue {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends an item. Never blocks beyond the lock, never fails.
    pub(crate) fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
    }

    /// Appends a whole batch under one lock acquisition.
    pub(crate) fn enqueue_batch<I>(&self, batch: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.items.lock().extend(batch);
    }

    /// Removes the oldest item, or `None` if the queue is empty. Never
    /// blocks waiting for an item to arrive.
    pub(crate) fn dequeue(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Best-effort emptiness hint. The answer can be stale the moment this
    /// returns; callers that need the item must go through
    /// [`Self::dequeue`] and check the `Option`.
    pub(crate) fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
