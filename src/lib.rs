//! # weft — fiber-based job scheduler
//!
//! A user-space job scheduler in the style of fiber-driven game engines:
//! many short jobs run across a fixed pool of worker threads, and a job can
//! block on the completion of other jobs without consuming its OS thread.
//!
//! ## Architecture
//!
//! The system multiplexes suspendable execution contexts (fibers) onto a
//! fixed set of worker threads partitioned into [`ThreadClass`]es:
//!
//! - **Fibers**: pre-allocated stackful continuations that can be parked
//!   mid-call-stack and resumed later, possibly on another thread
//! - **Queues**: per-class FIFOs of pending jobs and ready continuations
//! - **Counters**: atomic batch-completion counters jobs can wait on
//! - **Waiting registry**: parked continuations keyed by counter, woken by
//!   whichever worker completes the last outstanding job
//!
//! ## Example
//!
//! ```no_run
//! use weft::{Counter, JobDecl, JobSystem, ThreadClass};
//!
//! let jobs = JobSystem::new(4); // 4 general worker threads
//!
//! let counter = Counter::new();
//! let batch: Vec<JobDecl> = (0..8)
//!     .map(|_| JobDecl::new(|ctx| println!("job {} running", ctx.index())))
//!     .collect();
//! jobs.run_jobs("demo", batch, Some(&counter), ThreadClass::Worker);
//!
//! jobs.wait_for_counter_blocking(&counter, 0);
//! jobs.shutdown().expect("shutdown failed");
//! ```
//!
//! Inside a job, use [`JobContext::wait_for_counter`] instead: it parks the
//! job's continuation and lets the worker thread run other work until the
//! counter is satisfied.

pub mod context;
pub mod counter;
pub mod job;
pub mod job_system;

mod fiber;
mod fiber_pool;
mod queue;
mod waitlist;
mod worker;

pub use context::JobContext;
pub use counter::Counter;
pub use job::{JobDecl, ThreadClass};
pub use job_system::{JobSystem, SchedulerConfig, SchedulerError};

#[cfg(test)]
mod tests;
