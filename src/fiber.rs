//! Stackful continuations and the park/claim handoff between workers.
//!
//! A fiber is a reusable suspendable execution context built on `corosensei`.
//! Each fiber runs a trampoline: execute one job per activation, then yield
//! a completion marker and wait for the next job, so the coroutine and its
//! stack are recycled instead of re-created.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult};
use parking_lot::Mutex;

use crate::context::JobContext;
use crate::counter::Counter;
use crate::job::JobData;
use crate::job_system::Core;

/// What a worker feeds into a fiber when switching into it.
pub(crate) enum FiberInput {
    /// Begin a fresh job on this fiber.
    Start(JobData, Arc<Core>),
    /// Continue a parked job from its suspension point.
    Resume,
}

/// What a fiber hands back when it switches away.
pub(crate) enum FiberYield {
    /// The job parked on a counter. The hosting worker must deposit the
    /// fiber into the ticket once the switch has committed.
    Park(Arc<ParkTicket>),
    /// The job ran to completion; the fiber is ready for reuse.
    Complete,
}

/// Outcome of a single activation, as seen by the worker loop.
pub(crate) enum FiberState {
    Parked(Arc<ParkTicket>),
    Complete,
    Panicked(Box<dyn Any + Send>),
}

/// Rendezvous between the worker that parks a continuation and the worker
/// that later wakes it.
///
/// The waiting registry learns about the ticket *before* the fiber has
/// actually switched away; a completer that finds the entry satisfied must
/// therefore spin on `resumable` until the parking worker has deposited the
/// fiber. Without this, two threads could run the same stack at once.
pub(crate) struct ParkTicket {
    slot: Mutex<Option<Box<Fiber>>>,
    resumable: AtomicBool,
}

impl ParkTicket {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(ParkTicket {
            slot: Mutex::new(None),
            resumable: AtomicBool::new(false),
        })
    }

    /// Called by the parking worker after `resume` has returned, i.e. after
    /// the switch off this stack has fully committed.
    pub(crate) fn deposit(&self, fiber: Box<Fiber>) {
        *self.slot.lock() = Some(fiber);
        self.resumable.store(true, Ordering::Release);
    }

    /// Called by the completing worker. Spins until the parking worker has
    /// deposited the fiber, then takes ownership of it.
    pub(crate) fn claim(&self) -> Box<Fiber> {
        while !self.resumable.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
        self.slot
            .lock()
            .take()
            .expect("parked fiber claimed twice")
    }
}

/// Decrements the job's counter and wakes satisfied waiters when the job
/// ends — including by panic, in which case this runs during unwinding so
/// the batch still completes.
struct CompletionGuard<'a> {
    core: &'a Core,
    counter: Option<Counter>,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if let Some(counter) = self.counter.take() {
            self.core.finish_job(&counter);
        }
    }
}

/// A reusable stackful execution context.
///
/// The coroutine borrows the boxed stack for as long as it exists; fields
/// drop in declaration order, coroutine first, which is what makes the
/// `'static` lifetime extension below sound.
pub(crate) struct Fiber {
    coroutine: Option<Coroutine<FiberInput, FiberYield, (), &'static mut DefaultStack>>,
    #[allow(dead_code)]
    stack: Box<DefaultStack>,
}

// SAFETY: a fiber only crosses threads while suspended, and it is never
// referenced by more than one thread at a time (the free list, the ready
// queues and the park tickets each hand out exclusive ownership of the
// `Box`). Everything a suspended stack can hold originated from `Send` job
// closures and `Send` scheduler state.
unsafe impl Send for Fiber {}

impl Fiber {
    /// Creates a fiber with a stack of `stack_size` bytes. Stack allocation
    /// failure is fatal: the pool is sized once, at scheduler creation.
    pub(crate) fn new(stack_size: usize) -> Self {
        let mut stack =
            Box::new(DefaultStack::new(stack_size).expect("failed to allocate fiber stack"));

        // SAFETY: the coroutine is dropped before the stack (field order),
        // and the stack box never moves its heap allocation, so extending
        // the borrow to 'static cannot outlive the stack itself.
        let stack_ref = unsafe {
            std::mem::transmute::<&mut DefaultStack, &'static mut DefaultStack>(stack.as_mut())
        };

        let coroutine = Coroutine::with_stack(stack_ref, move |yielder, mut input: FiberInput| {
            loop {
                if let FiberInput::Start(job, core) = input {
                    let JobData {
                        decl,
                        counter,
                        name,
                        index,
                        class,
                    } = job;
                    // Completion must be reported exactly once per job even
                    // if the entry point panics; the panic itself unwinds
                    // out through `resume` on the hosting worker.
                    let _completion = CompletionGuard {
                        core: &core,
                        counter,
                    };
                    let ctx = JobContext::new(&core, yielder, index, class, name.as_ref());
                    (decl.entry)(&ctx);
                }

                // Job done, hand the fiber back for reuse and wait for the
                // next activation.
                input = yielder.suspend(FiberYield::Complete);
            }
        });

        Fiber {
            coroutine: Some(coroutine),
            stack,
        }
    }

    /// Switches into the fiber and runs it until it suspends again.
    ///
    /// A panic raised by the job body propagates across the coroutine
    /// boundary and is captured here; the coroutine is finished afterwards
    /// and the fiber must be discarded.
    pub(crate) fn resume(&mut self, input: FiberInput) -> FiberState {
        let Some(coroutine) = self.coroutine.as_mut() else {
            return FiberState::Complete;
        };

        match catch_unwind(AssertUnwindSafe(|| coroutine.resume(input))) {
            Ok(CoroutineResult::Yield(FiberYield::Complete)) => FiberState::Complete,
            Ok(CoroutineResult::Yield(FiberYield::Park(ticket))) => FiberState::Parked(ticket),
            // The trampoline loops forever; a return can only mean the
            // coroutine was unwound.
            Ok(CoroutineResult::Return(())) => FiberState::Complete,
            Err(payload) => {
                self.coroutine = None;
                FiberState::Panicked(payload)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_roundtrip() {
        let ticket = ParkTicket::new();
        ticket.deposit(Box::new(Fiber::new(64 * 1024)));
        let fiber = ticket.claim();
        drop(fiber);
    }
}
