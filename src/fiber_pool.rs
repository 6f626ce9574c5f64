//! The fixed pool of pre-allocated fibers.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::fiber::Fiber;
use crate::queue::Queue;

/// A fixed set of fibers behind a free-list queue.
///
/// Every fiber is allocated up front at scheduler creation; the pool never
/// grows. The free list hands out exclusive ownership, which is what keeps
/// a fiber bound to at most one thread at a time. If every fiber is in
/// flight, `acquire` spins until one is released — sizing the pool to the
/// peak number of concurrently parked jobs is a construction-time contract.
pub(crate) struct FiberPool {
    free: Queue<Box<Fiber>>,
}

impl FiberPool {
    pub(crate) fn new(fiber_count: usize, stack_size: usize) -> Self {
        let free = Queue::new();
        free.enqueue_batch((0..fiber_count).map(|_| Box::new(Fiber::new(stack_size))));
        FiberPool { free }
    }

    /// Takes a free fiber, spinning until one is available. Returns `None`
    /// once `quit` is observed so shutdown cannot hang here.
    pub(crate) fn acquire(&self, quit: &AtomicBool) -> Option<Box<Fiber>> {
        loop {
            if let Some(fiber) = self.free.dequeue() {
                return Some(fiber);
            }
            if quit.load(Ordering::Acquire) {
                return None;
            }
            std::hint::spin_loop();
        }
    }

    pub(crate) fn release(&self, fiber: Box<Fiber>) {
        self.free.enqueue(fiber);
    }
}
