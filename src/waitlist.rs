//! The waiting registry: parked continuations keyed by counter identity.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::counter::Counter;
use crate::fiber::{Fiber, ParkTicket};
use crate::job::ThreadClass;

/// One parked continuation.
struct WaitEntry {
    /// Resume once the counter value is `<= target`.
    target: usize,
    /// Class whose ready queue the woken fiber goes back to, so a batch
    /// keeps its class affinity across suspension points.
    class: ThreadClass,
    /// Diagnostic name of the waiting job.
    name: Arc<str>,
    ticket: Arc<ParkTicket>,
}

/// Registry of counters with a parked waiter.
///
/// One exclusive lock protects the whole map. At most one waiter may be
/// parked per counter instance: independent pieces of logic that both need
/// to block must use distinct counters. A second concurrent waiter is a
/// programming error and panics.
pub(crate) struct WaitList {
    entries: Mutex<HashMap<usize, WaitEntry>>,
}

impl WaitList {
    pub(crate) fn new() -> Self {
        WaitList {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a waiter for `counter`, unless the target is already met.
    ///
    /// The counter is re-checked under the registry lock. A completer
    /// decrements first and scans the registry second, so any decrement
    /// that this check misses will find the freshly inserted entry when it
    /// reaches the lock — the lost-wakeup window is closed.
    ///
    /// Returns the ticket the caller must carry through its suspension, or
    /// `None` if the wait is already satisfied and no park happened.
    pub(crate) fn park(
        &self,
        counter: &Counter,
        target: usize,
        class: ThreadClass,
        name: Arc<str>,
    ) -> Option<Arc<ParkTicket>> {
        let mut entries = self.entries.lock();
        if counter.value() <= target {
            return None;
        }

        let ticket = ParkTicket::new();
        let previous = entries.insert(
            counter.key(),
            WaitEntry {
                target,
                class,
                name,
                ticket: Arc::clone(&ticket),
            },
        );
        if let Some(previous) = previous {
            panic!(
                "counter already has a parked waiter ({}); use one counter per wait",
                previous.name
            );
        }
        Some(ticket)
    }

    /// After a decrement brought `counter` to `value`, removes and returns
    /// the waiter if its target is now met.
    ///
    /// Spins on the ticket's resumable flag while holding the registry
    /// lock: the parking worker may not have finished switching off the
    /// continuation yet, and handing it out before then would let two
    /// threads run the same stack.
    pub(crate) fn claim_satisfied(
        &self,
        counter: &Counter,
        value: usize,
    ) -> Option<(ThreadClass, Box<Fiber>)> {
        let mut entries = self.entries.lock();
        let satisfied = entries
            .get(&counter.key())
            .is_some_and(|entry| value <= entry.target);
        if !satisfied {
            return None;
        }

        let entry = entries
            .remove(&counter.key())
            .expect("wait entry vanished under the registry lock");
        tracing::trace!(waiter = %entry.name, value, "waking parked continuation");
        let fiber = entry.ticket.claim();
        Some((entry.class, fiber))
    }

    /// Empties the registry, claiming every parked fiber. Only used during
    /// scheduler teardown, after all workers have exited (so every ticket
    /// has been deposited).
    pub(crate) fn drain(&self) -> Vec<(Arc<str>, Box<Fiber>)> {
        let mut entries = self.entries.lock();
        entries
            .drain()
            .map(|(_, entry)| (entry.name, entry.ticket.claim()))
            .collect()
    }
}
