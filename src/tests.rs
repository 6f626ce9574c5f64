//! Crate-internal tests for the park/wake protocol, driven deterministically
//! on a single thread by resuming fibers by hand.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::fiber::{Fiber, FiberInput, FiberState};
use crate::job::{JobData, JobDecl, ThreadClass};
use crate::job_system::{Core, SchedulerConfig};
use crate::Counter;

fn test_core() -> Arc<Core> {
    // No worker threads: tests act as the worker by resuming fibers by hand.
    Arc::new(Core::new(SchedulerConfig {
        worker_threads: 0,
        platform_threads: 0,
        fiber_count: 4,
        stack_size: 128 * 1024,
    }))
}

fn job(core: &Arc<Core>, name: &str, index: usize, counter: Option<&Counter>, decl: JobDecl) -> FiberInput {
    FiberInput::Start(
        JobData {
            decl,
            counter: counter.cloned(),
            name: Arc::from(name),
            index,
            class: ThreadClass::Worker,
        },
        Arc::clone(core),
    )
}

#[test]
fn trampoline_runs_job_and_recycles_fiber() {
    let core = test_core();
    let ran = Arc::new(AtomicUsize::new(0));
    let mut fiber = Box::new(Fiber::new(128 * 1024));

    for round in 0..3 {
        let ran_in_job = Arc::clone(&ran);
        let decl = JobDecl::new(move |ctx| {
            assert_eq!(ctx.index(), round);
            ran_in_job.fetch_add(1, Ordering::SeqCst);
        });
        // The same fiber object serves job after job.
        match fiber.resume(job(&core, "recycle", round, None, decl)) {
            FiberState::Complete => {}
            _ => panic!("job should run to completion"),
        }
    }

    assert_eq!(ran.load(Ordering::SeqCst), 3);
}

#[test]
fn completed_job_decrements_its_counter() {
    let core = test_core();
    let counter = Counter::new();
    counter.set(1);

    let mut fiber = Box::new(Fiber::new(128 * 1024));
    let state = fiber.resume(job(&core, "report", 0, Some(&counter), JobDecl::new(|_| {})));
    assert!(matches!(state, FiberState::Complete));
    assert!(counter.is_complete());
}

#[test]
fn park_wake_resume_roundtrip() {
    let core = test_core();
    let gate = Counter::new();
    gate.set(1);

    let resumed = Arc::new(AtomicBool::new(false));
    let resumed_in_job = Arc::clone(&resumed);
    let gate_in_job = gate.clone();
    let decl = JobDecl::new(move |ctx| {
        ctx.wait_for_counter(&gate_in_job, 0);
        resumed_in_job.store(true, Ordering::SeqCst);
    });

    // Acting as the first worker: start the job; it parks on the gate.
    let mut fiber = Box::new(Fiber::new(128 * 1024));
    let ticket = match fiber.resume(job(&core, "waiter", 0, None, decl)) {
        FiberState::Parked(ticket) => ticket,
        _ => panic!("job should park on the unsatisfied gate"),
    };
    assert!(!resumed.load(Ordering::SeqCst));
    ticket.deposit(fiber);

    // Acting as the completing worker: the final decrement moves the parked
    // continuation to its class's ready queue.
    core.finish_job(&gate);
    let mut woken = core.ready[ThreadClass::Worker.index()]
        .dequeue()
        .expect("waiter should be ready");

    // Acting as whichever worker picks it up: resuming finishes the job.
    match woken.resume(FiberInput::Resume) {
        FiberState::Complete => {}
        _ => panic!("woken job should run to completion"),
    }
    assert!(resumed.load(Ordering::SeqCst));
}

#[test]
fn wait_on_satisfied_counter_never_parks() {
    let core = test_core();
    let gate = Counter::new(); // already at zero

    let mut fiber = Box::new(Fiber::new(128 * 1024));
    let gate_in_job = gate.clone();
    let state = fiber.resume(job(
        &core,
        "fast-path",
        0,
        None,
        JobDecl::new(move |ctx| ctx.wait_for_counter(&gate_in_job, 0)),
    ));

    // The fast path returns without a continuation switch.
    assert!(matches!(state, FiberState::Complete));
}

#[test]
fn waiter_target_above_zero() {
    let core = test_core();
    let gate = Counter::new();
    gate.set(3);

    let gate_in_job = gate.clone();
    let decl = JobDecl::new(move |ctx| ctx.wait_for_counter(&gate_in_job, 1));

    let mut fiber = Box::new(Fiber::new(128 * 1024));
    let ticket = match fiber.resume(job(&core, "threshold", 0, None, decl)) {
        FiberState::Parked(ticket) => ticket,
        _ => panic!("target 1 against value 3 should park"),
    };
    ticket.deposit(fiber);

    // 3 -> 2 leaves the target unmet; 2 -> 1 wakes.
    core.finish_job(&gate);
    assert!(core.ready[ThreadClass::Worker.index()].is_empty());
    core.finish_job(&gate);

    let mut woken = core.ready[ThreadClass::Worker.index()]
        .dequeue()
        .expect("threshold reached");
    assert!(matches!(woken.resume(FiberInput::Resume), FiberState::Complete));
}

#[test]
fn parked_platform_job_wakes_on_platform_queue() {
    let core = test_core();
    let gate = Counter::new();
    gate.set(1);

    let gate_in_job = gate.clone();
    let decl = JobDecl::new(move |ctx| ctx.wait_for_counter(&gate_in_job, 0));
    let input = FiberInput::Start(
        JobData {
            decl,
            counter: None,
            name: Arc::from("platform-waiter"),
            index: 0,
            class: ThreadClass::Platform,
        },
        Arc::clone(&core),
    );

    let mut fiber = Box::new(Fiber::new(128 * 1024));
    let ticket = match fiber.resume(input) {
        FiberState::Parked(ticket) => ticket,
        _ => panic!("should park"),
    };
    ticket.deposit(fiber);

    core.finish_job(&gate);
    // Class affinity survives the suspension: the continuation comes back
    // on the platform ready queue, not the general one.
    assert!(core.ready[ThreadClass::Worker.index()].is_empty());
    let mut woken = core.ready[ThreadClass::Platform.index()]
        .dequeue()
        .expect("waiter should be ready on its home class");
    assert!(matches!(woken.resume(FiberInput::Resume), FiberState::Complete));
}
