//! Worker threads: the continuation-resumption loop.
//!
//! Each worker thread permanently hosts the scheduling loop for one thread
//! class. Ready continuations take priority over fresh jobs; when a class
//! has neither, non-dedicated workers fall back to the general-purpose
//! queues. An idle worker busy-spins — the scheduler trades CPU for resume
//! latency, which is the intended posture for a real-time frame loop.

use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::fiber::{Fiber, FiberInput, FiberState};
use crate::job::ThreadClass;
use crate::job_system::Core;

/// Spawns one worker thread serving `class`.
pub(crate) fn spawn(id: usize, class: ThreadClass, core: Arc<Core>) -> JoinHandle<()> {
    let label = match class {
        ThreadClass::Platform => format!("weft-platform-{id}"),
        ThreadClass::Worker => format!("weft-worker-{id}"),
    };
    thread::Builder::new()
        .name(label)
        .spawn(move || run(id, class, core))
        .expect("failed to spawn worker thread")
}

fn run(id: usize, class: ThreadClass, core: Arc<Core>) {
    tracing::debug!(id, ?class, "worker online");

    loop {
        if core.quit.load(Ordering::Acquire) {
            break;
        }

        if step(&core, class) {
            continue;
        }
        // Dedicated classes serve only themselves; everyone else helps the
        // general class when their own queues are dry.
        if !class.is_dedicated()
            && class != ThreadClass::Worker
            && step(&core, ThreadClass::Worker)
        {
            continue;
        }

        std::hint::spin_loop();
    }

    tracing::debug!(id, ?class, "worker offline");
}

/// Serves one item from `class`'s queues. Returns false if both were empty.
fn step(core: &Arc<Core>, class: ThreadClass) -> bool {
    if let Some(fiber) = core.ready[class.index()].dequeue() {
        resume_fiber(core, fiber, FiberInput::Resume);
        return true;
    }

    if let Some(job) = core.pending[class.index()].dequeue() {
        tracing::trace!(job = %job.name, index = job.index, "starting job");
        let Some(fiber) = core.fibers.acquire(&core.quit) else {
            // Quit raced the acquire; the job is discarded with the rest of
            // the pending queue.
            return true;
        };
        resume_fiber(core, fiber, FiberInput::Start(job, Arc::clone(core)));
        return true;
    }

    false
}

fn resume_fiber(core: &Arc<Core>, mut fiber: Box<Fiber>, input: FiberInput) {
    match fiber.resume(input) {
        FiberState::Complete => core.fibers.release(fiber),
        FiberState::Parked(ticket) => {
            // `resume` returning means the switch off this stack has
            // committed; only now may another thread take the continuation.
            ticket.deposit(fiber);
        }
        FiberState::Panicked(payload) => {
            // The job's counter was already decremented during unwinding.
            // The coroutine is unusable; replace it to keep the pool at its
            // fixed size.
            tracing::error!(panic = panic_message(payload.as_ref()), "job panicked");
            drop(fiber);
            core.fibers
                .release(Box::new(Fiber::new(core.config.stack_size)));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
