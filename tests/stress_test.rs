//! Concurrent submitters, nested waits and a canary that would trip if any
//! continuation were ever resumed by two threads at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use weft::{Counter, JobDecl, JobSystem, SchedulerConfig, ThreadClass};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[test]
fn concurrent_submitters_with_nested_waits() {
    init_tracing();

    let jobs = Arc::new(JobSystem::with_config(SchedulerConfig {
        worker_threads: 4,
        platform_threads: 1,
        fiber_count: 64,
        stack_size: 256 * 1024,
    }));
    let violations = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..3)
        .map(|s| {
            let jobs = Arc::clone(&jobs);
            let violations = Arc::clone(&violations);
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                for round in 0..10 {
                    let batch_counter = Counter::new();
                    let batch: Vec<JobDecl> = (0..4)
                        .map(|_| {
                            let violations = Arc::clone(&violations);
                            let completed = Arc::clone(&completed);
                            JobDecl::new(move |ctx| {
                                // The canary records where this continuation
                                // has been: 0 = fresh, 1 = before the park,
                                // 2 = after the resume. A double resume
                                // would replay a stage and trip a check.
                                let canary = AtomicUsize::new(0);

                                let dep = Counter::new();
                                let leaves: Vec<JobDecl> = (0..2)
                                    .map(|_| JobDecl::new(|_ctx| {}))
                                    .collect();
                                ctx.run_jobs("leaves", leaves, Some(&dep), ThreadClass::Worker);

                                if canary.swap(1, Ordering::SeqCst) != 0 {
                                    violations.fetch_add(1, Ordering::SeqCst);
                                }
                                ctx.wait_for_counter(&dep, 0);
                                if canary.swap(2, Ordering::SeqCst) != 1 {
                                    violations.fetch_add(1, Ordering::SeqCst);
                                }
                                completed.fetch_add(1, Ordering::SeqCst);
                            })
                        })
                        .collect();

                    jobs.run_jobs(
                        &format!("stress-{s}-{round}"),
                        batch,
                        Some(&batch_counter),
                        ThreadClass::Worker,
                    );
                    jobs.wait_for_counter_blocking(&batch_counter, 0);
                }
            })
        })
        .collect();

    for submitter in submitters {
        submitter.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(completed.load(Ordering::SeqCst), 3 * 10 * 4);

    Arc::into_inner(jobs)
        .expect("all clones joined")
        .shutdown()
        .expect("shutdown failed");
}

#[test]
fn mixed_class_stress() {
    init_tracing();

    let jobs = JobSystem::with_config(SchedulerConfig {
        worker_threads: 4,
        platform_threads: 1,
        fiber_count: 64,
        stack_size: 256 * 1024,
    });
    let platform_runs = Arc::new(AtomicUsize::new(0));
    let worker_runs = Arc::new(AtomicUsize::new(0));
    let top = Counter::new();

    let batch: Vec<JobDecl> = (0..24)
        .map(|i| {
            let platform_runs = Arc::clone(&platform_runs);
            let worker_runs = Arc::clone(&worker_runs);
            JobDecl::new(move |ctx| {
                worker_runs.fetch_add(1, Ordering::SeqCst);
                if i % 3 == 0 {
                    let platform_runs = Arc::clone(&platform_runs);
                    ctx.wait_single_job("pump", ThreadClass::Platform, move |_ctx| {
                        platform_runs.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();
    jobs.run_jobs("mixed", batch, Some(&top), ThreadClass::Worker);
    jobs.wait_for_counter_blocking(&top, 0);

    assert_eq!(worker_runs.load(Ordering::SeqCst), 24);
    assert_eq!(platform_runs.load(Ordering::SeqCst), 8);
    jobs.shutdown().expect("shutdown failed");
}
