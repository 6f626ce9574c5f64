//! The capability handle jobs use to reach the scheduler.

use std::sync::Arc;

use corosensei::Yielder;

use crate::counter::Counter;
use crate::fiber::{FiberInput, FiberYield};
use crate::job::{JobDecl, ThreadClass};
use crate::job_system::Core;

/// Handed to every job entry point.
///
/// Carries the job's batch bookkeeping and the only route to the
/// cooperative wait: because [`Self::wait_for_counter`] needs a live
/// continuation to park, it exists only here — calling it outside a running
/// job is unrepresentable rather than a runtime error.
pub struct JobContext<'a> {
    core: &'a Core,
    yielder: &'a Yielder<FiberInput, FiberYield>,
    index: usize,
    class: ThreadClass,
    name: &'a str,
}

impl<'a> JobContext<'a> {
    pub(crate) fn new(
        core: &'a Core,
        yielder: &'a Yielder<FiberInput, FiberYield>,
        index: usize,
        class: ThreadClass,
        name: &'a str,
    ) -> Self {
        JobContext {
            core,
            yielder,
            index,
            class,
            name,
        }
    }

    /// Index of this job within its batch (`0..N`).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Diagnostic name the batch was submitted under.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Class this job was routed to.
    pub fn class(&self) -> ThreadClass {
        self.class
    }

    /// Submits a batch from inside a job. Identical to
    /// [`JobSystem::run_jobs`](crate::JobSystem::run_jobs); does not block.
    pub fn run_jobs(
        &self,
        name: &str,
        jobs: Vec<JobDecl>,
        counter: Option<&Counter>,
        class: ThreadClass,
    ) {
        self.core.run_jobs(name, jobs, counter, class);
    }

    /// Parks this job until `counter` drops to `target` or below, yielding
    /// the OS thread to other work in the meantime.
    ///
    /// Returns immediately, without a continuation switch, if the target is
    /// already met. Otherwise the continuation suspends here and resumes —
    /// possibly on a different worker thread of the same class — strictly
    /// after the counter reached the target. At most one waiter may be
    /// parked per counter; a second concurrent waiter panics.
    pub fn wait_for_counter(&self, counter: &Counter, target: usize) {
        if counter.value() <= target {
            return;
        }

        let Some(ticket) =
            self.core
                .waitlist
                .park(counter, target, self.class, Arc::from(self.name))
        else {
            // Satisfied during the registry re-check; no park happened.
            return;
        };

        // The suspension point. Control comes back when a completing worker
        // has moved this continuation through the ready queue.
        match self.yielder.suspend(FiberYield::Park(ticket)) {
            FiberInput::Resume => {}
            FiberInput::Start(..) => unreachable!("parked continuation resumed with a fresh job"),
        }

        debug_assert!(counter.value() <= target);
    }

    /// Runs a single job on the given class and waits for it.
    ///
    /// Looks synchronous at the call site while the calling continuation
    /// cooperatively yields; the job itself is guaranteed to execute on a
    /// thread of `class`. Used for platform work that must happen on the
    /// thread owning the window handle.
    pub fn wait_single_job<F>(&self, name: &str, class: ThreadClass, job: F)
    where
        F: FnOnce(&JobContext<'_>) + Send + 'static,
    {
        let counter = Counter::new();
        self.run_jobs(name, vec![JobDecl::new(job)], Some(&counter), class);
        self.wait_for_counter(&counter, 0);
    }
}
