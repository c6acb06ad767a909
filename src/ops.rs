//! Operators composing task graphs.
//!
//! All operators build *orphan* graphs lazily; nothing runs until the
//! resulting [`UnreleasedTreeture`] is released. Rooting a graph
//! ([`UnreleasedTreeture::rooted`]) before release gives it a task family
//! so subtrees can be synchronized on by reference.

use crate::reference::Dependencies;
use crate::task::kinds;
use crate::treeture::UnreleasedTreeture;

/// An already-completed computation with the given value.
pub fn done<T>(value: T) -> UnreleasedTreeture<T>
where
    T: Send + 'static,
{
    let (task, out) = kinds::done_task(value);
    UnreleasedTreeture::new(task, out)
}

/// A leaf task computing a value once its dependencies are done.
pub fn spawn<F, T>(deps: Dependencies, op: F) -> UnreleasedTreeture<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (task, out) = kinds::simple_task(op);
    task.add_dependencies(&deps);
    UnreleasedTreeture::new(task, out)
}

/// A leaf task the runtime may decompose: under queue pressure `op` runs
/// as-is, otherwise `decompose` replaces it by a finer-grained subtree
/// producing the same value.
pub fn spawn_splitable<F, S, T>(deps: Dependencies, op: F, decompose: S) -> UnreleasedTreeture<T>
where
    F: FnOnce() -> T + Send + 'static,
    S: FnOnce() -> UnreleasedTreeture<T> + Send + 'static,
    T: Send + 'static,
{
    let (task, out) = kinds::splitable_task(op, decompose);
    task.add_dependencies(&deps);
    UnreleasedTreeture::new(task, out)
}

/// Combines two computations into one whose value is `merge` applied to
/// both results. With `parallel` the children may run concurrently;
/// without it the left child runs to completion first.
pub fn combine<A, B, T, M>(
    deps: Dependencies,
    a: UnreleasedTreeture<A>,
    b: UnreleasedTreeture<B>,
    merge: M,
    parallel: bool,
) -> UnreleasedTreeture<T>
where
    A: Send + 'static,
    B: Send + 'static,
    T: Send + 'static,
    M: FnOnce(A, B) -> T + Send + 'static,
{
    let (task, out) = kinds::split_task(a.into_parts(), b.into_parts(), merge, parallel);
    task.add_dependencies(&deps);
    UnreleasedTreeture::new(task, out)
}

/// Runs the given tasks one after the other, left to right. An empty list
/// completes immediately.
pub fn sequential(
    deps: Dependencies,
    tasks: Vec<UnreleasedTreeture<()>>,
) -> UnreleasedTreeture<()> {
    fold_binary(deps, tasks, false)
}

/// Runs the given tasks concurrently. An empty list completes
/// immediately.
pub fn parallel(deps: Dependencies, tasks: Vec<UnreleasedTreeture<()>>) -> UnreleasedTreeture<()> {
    fold_binary(deps, tasks, true)
}

/// Right-folds a task list into nested binary split tasks; `deps` attach
/// to the outermost node only.
fn fold_binary(
    deps: Dependencies,
    mut tasks: Vec<UnreleasedTreeture<()>>,
    parallel: bool,
) -> UnreleasedTreeture<()> {
    match tasks.len() {
        0 => {
            if deps.is_empty() {
                done(())
            } else {
                // A completed task cannot carry dependencies; an inert
                // leaf task can.
                spawn(deps, || ())
            }
        }
        1 => combine(deps, tasks.pop().unwrap(), done(()), |_, _| (), parallel),
        2 => {
            let b = tasks.pop().unwrap();
            let a = tasks.pop().unwrap();
            combine(deps, a, b, |_, _| (), parallel)
        }
        _ => {
            let rest = tasks.split_off(1);
            let first = tasks.pop().unwrap();
            combine(
                deps,
                first,
                fold_binary(Dependencies::none(), rest, parallel),
                |_, _| (),
                parallel,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::after;
    use parking_lot::Mutex;
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn none() -> Dependencies {
        Dependencies::none()
    }

    #[test]
    fn done_round_trips_its_value() {
        assert_eq!(done(5).get(), 5);
        assert_eq!(done("five").get(), "five");
        done(()).get();
    }

    #[test]
    fn spawn_computes_on_release() {
        assert_eq!(spawn(none(), || 6 * 7).get(), 42);
    }

    #[test]
    fn combine_merges_done_children() {
        let t = combine(none(), done(40), done(2), |a, b| a + b, true);
        assert_eq!(t.get(), 42);
    }

    #[test]
    fn combine_is_sequential_when_asked() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (Arc::clone(&log), Arc::clone(&log));

        let t = combine(
            none(),
            spawn(none(), move || l1.lock().push(1)),
            spawn(none(), move || l2.lock().push(2)),
            |_, _| (),
            false,
        );
        t.get();

        assert_eq!(*log.lock(), vec![1, 2]);
    }

    #[test]
    fn waiting_twice_observes_the_same_state() {
        let t = spawn(none(), || 9).release();
        t.wait();
        t.wait();
        assert_eq!(t.get(), 9);
    }

    #[test]
    fn empty_compositions_complete_immediately() {
        sequential(none(), Vec::new()).get();
        parallel(none(), Vec::new()).get();
    }

    #[test]
    fn single_element_compositions_run_their_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        sequential(none(), vec![spawn(none(), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })])
        .get();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sequential_side_effects_happen_in_order() {
        let log = Arc::new(Mutex::new(String::new()));

        let tasks = ["a", "b", "c"]
            .map(|s| {
                let log = Arc::clone(&log);
                spawn(none(), move || log.lock().push_str(s))
            })
            .into_iter()
            .collect();

        sequential(none(), tasks).get();
        assert_eq!(*log.lock(), "abc");
    }

    #[test]
    fn parallel_side_effects_all_happen() {
        let counter = Arc::new(AtomicUsize::new(0));

        let tasks = (0..10)
            .map(|_| {
                let counter = Arc::clone(&counter);
                spawn(none(), move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        parallel(none(), tasks).get();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    fn fib(n: u64, executed: &Arc<AtomicUsize>) -> u64 {
        if n < 2 {
            return n;
        }
        let (ca, cb) = (Arc::clone(executed), Arc::clone(executed));
        combine(
            none(),
            spawn(none(), move || {
                ca.fetch_add(1, Ordering::Relaxed);
                fib(n - 1, &ca)
            }),
            spawn(none(), move || {
                cb.fetch_add(1, Ordering::Relaxed);
                fib(n - 2, &cb)
            }),
            |a, b| a + b,
            true,
        )
        .get()
    }

    fn fib_seq(n: u64) -> u64 {
        let (mut a, mut b) = (0u64, 1u64);
        for _ in 0..n {
            (a, b) = (b, a + b);
        }
        a
    }

    #[rstest]
    #[case::n_10(10, 55)]
    #[case::n_20(20, 6765)]
    fn fib_recursion_produces_the_right_value(#[case] n: u64, #[case] expected: u64) {
        let executed = Arc::new(AtomicUsize::new(0));
        assert_eq!(fib(n, &executed), expected);

        // Two leaf computations per inner node of the call tree.
        let bound = 2 * fib_seq(n + 1) as usize;
        assert!(executed.load(Ordering::Relaxed) <= bound);
    }

    #[test]
    fn rooted_splitable_tasks_decompose_eagerly() {
        // Depth 0 of a family splits at release, so the decomposed value
        // wins over the whole-task operator.
        let t = spawn_splitable(none(), || 7, || done(42)).rooted();
        assert_eq!(t.get(), 42);
    }

    #[test]
    fn references_narrow_into_the_computation() {
        let t = combine(
            none(),
            spawn(none(), || 1),
            spawn(none(), || 2),
            |a, b| a + b,
            true,
        )
        .rooted()
        .release();

        let left = t.left();
        let right_of_left = t.task_reference().left().right();

        t.wait();
        assert!(left.is_done());
        // Completion covers paths below the materialized tree as well.
        right_of_left.wait();
        assert!(right_of_left.is_done());

        assert_eq!(t.get(), 3);
    }

    #[test]
    fn narrowed_references_complete_after_the_root() {
        let t = spawn(none(), || {
            std::thread::sleep(Duration::from_millis(50));
            1
        })
        .rooted()
        .release();

        let mut r = t.task_reference();
        r.descend_left().descend_right();

        r.wait();
        assert!(r.is_done());
        assert_eq!(t.get(), 1);
    }

    #[test]
    fn completion_broadcasts_to_every_waiter() {
        let root = spawn(none(), || {
            std::thread::sleep(Duration::from_millis(50));
        })
        .rooted()
        .release();

        let woken = Arc::new(AtomicUsize::new(0));
        let dependents: Vec<_> = (0..100)
            .map(|_| {
                let woken = Arc::clone(&woken);
                spawn(after([root.task_reference()]), move || {
                    woken.fetch_add(1, Ordering::SeqCst);
                })
                .release()
            })
            .collect();

        for dependent in &dependents {
            dependent.wait();
        }

        assert_eq!(woken.load(Ordering::SeqCst), 100);
        assert!(root.task_reference().is_done());
    }

    #[test]
    fn trees_deeper_than_the_tracked_depth_still_complete() {
        let mut tree = spawn(none(), || 7);
        for _ in 0..8 {
            tree = combine(none(), tree, done(0), |a, _| a, true);
        }

        let t = tree.rooted().release();

        // Narrow below the dependency table's resolution.
        let mut r = t.task_reference();
        for _ in 0..8 {
            r.descend_left();
        }
        r.wait();
        assert!(r.is_done());

        assert_eq!(t.get(), 7);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "dropped without being released")]
    fn dropping_an_unreleased_treeture_panics() {
        let _ = spawn(none(), || 1);
    }
}

