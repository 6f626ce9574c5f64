//! Job declarations and the queue entries built from them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::JobContext;
use crate::counter::Counter;

/// Partition of the worker threads into disjoint service classes.
///
/// A batch is routed to exactly one class's queues. `Platform` is a
/// dedicated class: its threads serve nothing else and its jobs never run
/// anywhere else, which is what makes it safe for work that must stay on
/// the thread owning a window handle or message pump. `Worker` is the
/// general class the rest of the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ThreadClass {
    /// Platform/message-pump threads. Dedicated: serve only their own queues.
    Platform,
    /// General-purpose worker threads.
    #[default]
    Worker,
}

impl ThreadClass {
    /// Number of classes; sizes the per-class queue arrays.
    pub const COUNT: usize = 2;

    pub(crate) const ALL: [ThreadClass; Self::COUNT] =
        [ThreadClass::Platform, ThreadClass::Worker];

    pub fn index(self) -> usize {
        match self {
            ThreadClass::Platform => 0,
            ThreadClass::Worker => 1,
        }
    }

    /// A dedicated class never falls back to other classes' queues.
    pub(crate) fn is_dedicated(self) -> bool {
        matches!(self, ThreadClass::Platform)
    }
}

/// A single unit of work: an entry point plus whatever state it captured.
///
/// The closure owns its captured data, which keeps that data alive until
/// the job has executed. Submission transfers the declaration to the
/// scheduler; it is immutable from then on.
pub struct JobDecl {
    pub(crate) entry: Box<dyn FnOnce(&JobContext<'_>) + Send + 'static>,
}

impl JobDecl {
    pub fn new<F>(entry: F) -> Self
    where
        F: FnOnce(&JobContext<'_>) + Send + 'static,
    {
        JobDecl {
            entry: Box::new(entry),
        }
    }
}

impl fmt::Debug for JobDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDecl").finish_non_exhaustive()
    }
}

/// One pending-queue entry: a declaration plus the batch bookkeeping the
/// scheduler attached at submission time.
pub(crate) struct JobData {
    pub(crate) decl: JobDecl,
    /// Counter this job reports to on completion, if any.
    pub(crate) counter: Option<Counter>,
    /// Display name of the batch, for diagnostics.
    pub(crate) name: Arc<str>,
    /// Index of this job within its batch (`0..N`).
    pub(crate) index: usize,
    /// Class the batch was submitted under. A continuation that parks keeps
    /// resuming on this class.
    pub(crate) class: ThreadClass,
}
