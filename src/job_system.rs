//! The scheduler handle: construction, submission and shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_utils::Backoff;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::counter::Counter;
use crate::fiber::Fiber;
use crate::fiber_pool::FiberPool;
use crate::job::{JobData, JobDecl, ThreadClass};
use crate::queue::Queue;
use crate::waitlist::WaitList;
use crate::worker;

/// Construction parameters. Everything is fixed at creation time; there is
/// no dynamic resizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// General-purpose worker threads.
    pub worker_threads: usize,
    /// Dedicated platform-class threads.
    pub platform_threads: usize,
    /// Fibers pre-allocated in the shared pool. Must cover the peak number
    /// of concurrently running plus parked jobs.
    pub fiber_count: usize,
    /// Stack size per fiber, in bytes.
    pub stack_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            worker_threads: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            platform_threads: 1,
            fiber_count: 128,
            stack_size: 512 * 1024,
        }
    }
}

impl SchedulerConfig {
    fn threads_for(&self, class: ThreadClass) -> usize {
        match class {
            ThreadClass::Platform => self.platform_threads,
            ThreadClass::Worker => self.worker_threads,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{0} worker thread(s) panicked")]
    WorkersPanicked(usize),
}

/// State shared by the handle, every worker thread and every running fiber.
pub(crate) struct Core {
    /// Pending jobs, one queue per thread class.
    pub(crate) pending: [Queue<JobData>; ThreadClass::COUNT],
    /// Woken continuations awaiting a worker, one queue per thread class.
    pub(crate) ready: [Queue<Box<Fiber>>; ThreadClass::COUNT],
    pub(crate) fibers: FiberPool,
    pub(crate) waitlist: WaitList,
    pub(crate) quit: AtomicBool,
    pub(crate) config: SchedulerConfig,
}

impl Core {
    pub(crate) fn new(config: SchedulerConfig) -> Self {
        Core {
            pending: std::array::from_fn(|_| Queue::new()),
            ready: std::array::from_fn(|_| Queue::new()),
            fibers: FiberPool::new(config.fiber_count, config.stack_size),
            waitlist: WaitList::new(),
            quit: AtomicBool::new(false),
            config,
        }
    }

    /// Batch submission; shared by the handle and by [`crate::JobContext`].
    pub(crate) fn run_jobs(
        &self,
        name: &str,
        jobs: Vec<JobDecl>,
        counter: Option<&Counter>,
        class: ThreadClass,
    ) {
        // The counter must read N before any job of the batch can run; a
        // fast job finishing against a partially recorded batch size would
        // wake its waiter early.
        if let Some(counter) = counter {
            counter.set(jobs.len());
        }

        let name: Arc<str> = Arc::from(name);
        let count = jobs.len();
        let batch = jobs.into_iter().enumerate().map(|(index, decl)| JobData {
            decl,
            counter: counter.cloned(),
            name: Arc::clone(&name),
            index,
            class,
        });
        self.pending[class.index()].enqueue_batch(batch);

        tracing::trace!(batch = %name, count, ?class, "submitted");
    }

    /// Completion protocol: decrement, then wake the counter's waiter if
    /// its target is now met. Runs on the finishing job's own fiber, before
    /// that fiber yields back to its worker.
    pub(crate) fn finish_job(&self, counter: &Counter) {
        let value = counter.decrement();
        if let Some((class, fiber)) = self.waitlist.claim_satisfied(counter, value) {
            self.ready[class.index()].enqueue(fiber);
        }
    }
}

/// The fiber-based job scheduler.
///
/// Owns the worker threads, the fiber pool, the per-class queues and the
/// waiting registry. Submission fans a batch out across the workers of one
/// thread class; jobs block on other jobs through counters without holding
/// an OS thread. Shutdown is global and terminal: [`Self::quit`] stops the
/// workers, and there is no per-job or per-wait cancellation.
///
/// ```no_run
/// use weft::{JobDecl, JobSystem, Counter, ThreadClass};
///
/// let jobs = JobSystem::new(4);
/// let counter = Counter::new();
/// jobs.run_jobs(
///     "hello",
///     vec![JobDecl::new(|ctx| println!("job {} says hi", ctx.index()))],
///     Some(&counter),
///     ThreadClass::Worker,
/// );
/// jobs.wait_for_counter_blocking(&counter, 0);
/// jobs.shutdown().expect("shutdown failed");
/// ```
pub struct JobSystem {
    core: Arc<Core>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobSystem {
    /// Creates a scheduler with `worker_threads` general workers and the
    /// default configuration otherwise (one platform thread, 128 fibers of
    /// 512 KiB).
    pub fn new(worker_threads: usize) -> Self {
        JobSystem::with_config(SchedulerConfig {
            worker_threads,
            ..SchedulerConfig::default()
        })
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let core = Arc::new(Core::new(config));

        let mut workers = Vec::new();
        for class in ThreadClass::ALL {
            for id in 0..core.config.threads_for(class) {
                workers.push(worker::spawn(id, class, Arc::clone(&core)));
            }
        }
        tracing::debug!(
            workers = workers.len(),
            fibers = core.config.fiber_count,
            "job system online"
        );

        JobSystem {
            core,
            workers: Mutex::new(workers),
        }
    }

    /// Submits a batch of jobs to `class`'s pending queue and returns
    /// without blocking.
    ///
    /// If `counter` is given it is armed to the batch size before anything
    /// is enqueued, and each job decrements it by one on completion. The
    /// jobs of one batch run concurrently and in no particular order,
    /// though a single class's queue dispatches them in submission order.
    pub fn run_jobs(
        &self,
        name: &str,
        jobs: Vec<JobDecl>,
        counter: Option<&Counter>,
        class: ThreadClass,
    ) {
        self.core.run_jobs(name, jobs, counter, class);
    }

    /// Convenience: submits one general-class job and returns a fresh
    /// counter tracking it.
    pub fn run<F>(&self, name: &str, job: F) -> Counter
    where
        F: FnOnce(&crate::JobContext<'_>) + Send + 'static,
    {
        let counter = Counter::new();
        self.run_jobs(
            name,
            vec![JobDecl::new(job)],
            Some(&counter),
            ThreadClass::Worker,
        );
        counter
    }

    /// Blocks a **non-worker** thread until `counter` drops to `target`.
    ///
    /// This is the rendezvous for the embedding application's own threads;
    /// it sleeps with backoff rather than spinning. Jobs must instead use
    /// the cooperative [`JobContext::wait_for_counter`](crate::JobContext::wait_for_counter),
    /// which parks the continuation without holding the OS thread.
    pub fn wait_for_counter_blocking(&self, counter: &Counter, target: usize) {
        let backoff = Backoff::new();
        while counter.value() > target {
            backoff.snooze();
        }
    }

    /// Signals every worker to exit after its current job or continuation
    /// switch. Pending jobs that no worker has dequeued yet are discarded
    /// unexecuted — their counters are never decremented. Cancellation is
    /// global and terminal; there is no per-job or per-wait variant.
    pub fn quit(&self) {
        self.core.quit.store(true, Ordering::Release);
    }

    /// Blocks the calling (non-worker) thread until every worker thread
    /// has exited. Call [`Self::quit`] first; without it the workers never
    /// stop. Returns an error if any worker thread panicked.
    pub fn wait_for_completion(&self) -> Result<(), SchedulerError> {
        let handles = std::mem::take(&mut *self.workers.lock());
        let mut panicked = 0;
        for handle in handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(SchedulerError::WorkersPanicked(panicked));
        }
        Ok(())
    }

    /// Convenience: [`Self::quit`] followed by [`Self::wait_for_completion`].
    pub fn shutdown(self) -> Result<(), SchedulerError> {
        self.quit();
        self.wait_for_completion()
    }

    /// Total number of worker threads across all classes.
    pub fn num_workers(&self) -> usize {
        ThreadClass::ALL
            .iter()
            .map(|&class| self.core.config.threads_for(class))
            .sum()
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.quit();
        if let Err(err) = self.wait_for_completion() {
            tracing::error!(%err, "during scheduler teardown");
        }

        // Continuations still parked here waited on counters that never
        // completed. Unwinding one runs its completion guard, which finds
        // the registry already drained, so no wakes cascade into the ready
        // queues while they are emptied below.
        for (name, fiber) in self.core.waitlist.drain() {
            tracing::warn!(waiter = %name, "continuation never satisfied; unwinding at shutdown");
            drop(fiber);
        }
        for class in ThreadClass::ALL {
            while let Some(fiber) = self.core.ready[class.index()].dequeue() {
                drop(fiber);
            }
        }
    }
}
