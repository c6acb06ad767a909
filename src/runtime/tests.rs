use super::tracker::{self, Method};
use crate::ops::{combine, done, parallel, spawn, spawn_splitable};
use crate::reference::Dependencies;
use crate::runtime::{Builder, WorkerPool};
use crate::task::kinds;
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

assert_impl_all!(WorkerPool: Send, Sync);

fn none() -> Dependencies {
    Dependencies::none()
}

#[test]
fn pool_has_at_least_one_worker() {
    let pool = WorkerPool::global();
    assert!(pool.num_workers() >= 1);
}

#[test]
fn private_pools_shut_down_cleanly() {
    let pool = Builder::new().worker_threads(3).build().unwrap();
    assert_eq!(pool.num_workers(), 3);

    pool.shutdown().unwrap();
    // A second shutdown is a no-op.
    pool.shutdown().unwrap();
}

#[test]
fn single_worker_pools_run_everything_inline() {
    let pool = Builder::new().worker_threads(1).build().unwrap();
    assert_eq!(pool.num_workers(), 1);

    let counter = Arc::new(AtomicUsize::new(0));
    let tasks = (0..16)
        .map(|_| {
            let counter = Arc::clone(&counter);
            spawn(none(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    parallel(none(), tasks).rooted().get();
    assert_eq!(counter.load(Ordering::SeqCst), 16);
    pool.shutdown().unwrap();
}

#[rstest]
#[case::two_workers(2)]
#[case::four_workers(4)]
fn work_spreads_beyond_the_releasing_worker(#[case] workers: usize) {
    let pool = Builder::new().worker_threads(workers).build().unwrap();

    let t = combine(
        none(),
        spawn(none(), || {
            std::thread::sleep(Duration::from_millis(10));
            20u64
        }),
        spawn(none(), || {
            std::thread::sleep(Duration::from_millis(10));
            22u64
        }),
        |a, b| a + b,
        true,
    )
    .rooted()
    .release();

    let family = t.task_reference().family().id();
    assert_eq!(t.get(), 42);

    // Either a second worker ran part of the tree, or the releasing
    // worker had to steal back work it had spread out; both prove the
    // tasks left the spawning worker.
    let runs = tracker::calls_for_family(Method::Run, family);
    let distinct: std::collections::HashSet<_> = runs.iter().map(|c| c.worker).collect();
    let steals = tracker::calls_for_family(Method::Steal, family);
    assert!(
        distinct.len() >= 2 || !steals.is_empty(),
        "work never left the releasing worker: runs {runs:?}"
    );

    pool.shutdown().unwrap();
}

#[test]
fn an_idle_worker_steals_from_the_back() {
    let pool = Builder::new().worker_threads(2).build().unwrap();

    // Take worker 1's thread out of the picture so this test is the only
    // thing driving it.
    pool.retire_worker(1);

    let (task, out) = kinds::simple_task(|| 42);

    // Released from this thread (worker 0), so it lands in worker 0's
    // queue.
    task.start();
    assert!(!task.is_done());

    // Worker 1 has nothing local; the only way its step can make
    // progress is by stealing from worker 0.
    assert!(pool.worker(1).schedule_step());
    assert!(task.is_done());
    assert_eq!(out.take(), 42);

    pool.shutdown().unwrap();
}

/// Builds a rooted tree whose only splitable leaf sits below the eager
/// split depth, so the dequeue-time gate alone decides.
fn deep_splitable_tree(out_op: i32, out_split: i32) -> crate::UnreleasedTreeture<i32> {
    let mut tree = spawn_splitable(none(), move || out_op, move || done(out_split));
    for _ in 0..crate::runtime::SPREAD_DEPTH {
        tree = combine(none(), tree, done(0), |a, _| a, true);
    }
    tree
}

#[test]
fn below_threshold_splitable_tasks_run_whole() {
    let pool = Builder::new().worker_threads(2).build().unwrap();

    // Nothing trained the predictors: estimates are zero, the gate stays
    // closed.
    let t = deep_splitable_tree(7, 42).rooted().release();
    let family = t.task_reference().family().id();
    assert_eq!(t.get(), 7);

    assert!(tracker::calls_for_family(Method::Split, family).is_empty());
    pool.shutdown().unwrap();
}

#[test]
fn above_threshold_splitable_tasks_split_exactly_once() {
    let pool = Builder::new().worker_threads(2).build().unwrap();

    // Teach every worker that tasks at the leaf's depth run long.
    for id in 0..pool.num_workers() {
        pool.worker(id)
            .train_predictor(crate::runtime::SPREAD_DEPTH, Duration::from_millis(50));
    }

    let t = deep_splitable_tree(7, 42).rooted().release();
    let family = t.task_reference().family().id();
    assert_eq!(t.get(), 42);

    let splits = tracker::calls_for_family(Method::Split, family);
    assert_eq!(splits.len(), 1, "split should be one-shot: {splits:?}");

    pool.shutdown().unwrap();
}

#[test]
fn dump_state_renders_every_worker() {
    let pool = Builder::new().worker_threads(2).build().unwrap();

    let mut out = Vec::new();
    pool.dump_state(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("Worker 0:"));
    assert!(text.contains("Worker 1:"));

    pool.shutdown().unwrap();
}
