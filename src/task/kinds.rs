//! Concrete task kinds and the slots their values travel through.

use super::{State, TaskCore, TaskHandle, TaskObj};
use crate::treeture::UnreleasedTreeture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Shared slot a task's result is produced into and consumed from.
///
/// Handing slots around (rather than downcasting task objects) is what
/// lets the runtime treat every task as a plain `dyn TaskObj` while
/// treetures and aggregating parents keep typed access to the values.
pub(crate) struct ValueSlot<T> {
    cell: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for ValueSlot<T> {
    fn clone(&self) -> Self {
        ValueSlot {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> ValueSlot<T> {
    fn empty() -> Self {
        ValueSlot {
            cell: Arc::new(Mutex::new(None)),
        }
    }

    fn filled(value: T) -> Self {
        ValueSlot {
            cell: Arc::new(Mutex::new(Some(value))),
        }
    }

    pub(crate) fn put(&self, value: T) {
        let prev = self.cell.lock().replace(value);
        debug_assert!(prev.is_none(), "task value produced twice");
    }

    /// Moves the value out. The completion protocol guarantees the
    /// producer ran first; consuming twice is a bug.
    pub(crate) fn take(&self) -> T {
        self.cell
            .lock()
            .take()
            .expect("task value consumed before it was produced")
    }
}

/// A task born completed; its value sits in the slot from the start.
struct DoneTask {
    core: TaskCore,
}

impl TaskObj for DoneTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn execute(&self) {
        unreachable!("completed tasks never run");
    }

    fn aggregate(&self) {}
}

pub(crate) fn done_task<T: Send + 'static>(value: T) -> (TaskHandle, ValueSlot<T>) {
    let task = Arc::new(DoneTask {
        core: TaskCore::new_leaf(true, false),
    });
    (TaskHandle::from_arc(task), ValueSlot::filled(value))
}

/// A leaf computation.
struct SimpleTask<F, T> {
    core: TaskCore,
    op: Mutex<Option<F>>,
    out: ValueSlot<T>,
}

impl<F, T> TaskObj for SimpleTask<F, T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn execute(&self) {
        let op = self.op.lock().take().expect("task executed twice");
        self.out.put(op());
    }

    fn aggregate(&self) {}
}

pub(crate) fn simple_task<F, T>(op: F) -> (TaskHandle, ValueSlot<T>)
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let out = ValueSlot::empty();
    let task = Arc::new(SimpleTask {
        core: TaskCore::new_leaf(false, false),
        op: Mutex::new(Some(op)),
        out: out.clone(),
    });
    (TaskHandle::from_arc(task), out)
}

/// A leaf computation that can alternatively be decomposed into a finer
/// subtree. Splitting is one-shot; afterwards the task mirrors its
/// substitute.
struct SplitableTask<F, S, T> {
    core: TaskCore,
    op: Mutex<Option<F>>,
    decompose: Mutex<Option<S>>,
    substitute_out: Mutex<Option<ValueSlot<T>>>,
    out: ValueSlot<T>,
}

impl<F, S, T> TaskObj for SplitableTask<F, S, T>
where
    F: FnOnce() -> T + Send + 'static,
    S: FnOnce() -> UnreleasedTreeture<T> + Send + 'static,
    T: Send + 'static,
{
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn execute(&self) {
        debug_assert!(
            self.substitute_out.lock().is_none(),
            "split task executed directly"
        );
        let op = self.op.lock().take().expect("task executed twice");
        self.out.put(op());
    }

    fn aggregate(&self) {
        // Harvest the substitute's value if the task was decomposed;
        // otherwise `execute` already produced it.
        if let Some(sub_out) = self.substitute_out.lock().take() {
            self.out.put(sub_out.take());
        }
    }

    fn split(self: Arc<Self>) {
        let state = self.core.state.load();
        debug_assert!(
            matches!(state, State::Blocked | State::Ready),
            "split in state {state}"
        );

        let decompose = self
            .decompose
            .lock()
            .take()
            .expect("split operator already consumed");

        let (sub, sub_out) = decompose().into_parts();
        *self.substitute_out.lock() = Some(sub_out);

        let me = TaskHandle::from_arc(self.clone());
        me.set_substitute(sub);

        self.core.splitable.store(false, Ordering::Release);
    }
}

pub(crate) fn splitable_task<F, S, T>(op: F, decompose: S) -> (TaskHandle, ValueSlot<T>)
where
    F: FnOnce() -> T + Send + 'static,
    S: FnOnce() -> UnreleasedTreeture<T> + Send + 'static,
    T: Send + 'static,
{
    let out = ValueSlot::empty();
    let task = Arc::new(SplitableTask {
        core: TaskCore::new_leaf(false, true),
        op: Mutex::new(Some(op)),
        decompose: Mutex::new(Some(decompose)),
        substitute_out: Mutex::new(None),
        out: out.clone(),
    });
    (TaskHandle::from_arc(task), out)
}

/// An inner node whose value is the merge of its two children's values.
struct SplitTask<A, B, T, M> {
    core: TaskCore,
    left_out: ValueSlot<A>,
    right_out: ValueSlot<B>,
    merge: Mutex<Option<M>>,
    out: ValueSlot<T>,
}

impl<A, B, T, M> TaskObj for SplitTask<A, B, T, M>
where
    A: Send + 'static,
    B: Send + 'static,
    T: Send + 'static,
    M: FnOnce(A, B) -> T + Send + 'static,
{
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn execute(&self) {
        unreachable!("split tasks aggregate their children instead of executing");
    }

    fn aggregate(&self) {
        let merge = self.merge.lock().take().expect("task aggregated twice");
        self.out.put(merge(self.left_out.take(), self.right_out.take()));
    }
}

#[allow(clippy::type_complexity)]
pub(crate) fn split_task<A, B, T, M>(
    left: (TaskHandle, ValueSlot<A>),
    right: (TaskHandle, ValueSlot<B>),
    merge: M,
    parallel: bool,
) -> (TaskHandle, ValueSlot<T>)
where
    A: Send + 'static,
    B: Send + 'static,
    T: Send + 'static,
    M: FnOnce(A, B) -> T + Send + 'static,
{
    let (left, left_out) = left;
    let (right, right_out) = right;
    let out = ValueSlot::empty();
    let task = Arc::new(SplitTask {
        core: TaskCore::new_split(left, right, parallel),
        left_out,
        right_out,
        merge: Mutex::new(Some(merge)),
        out: out.clone(),
    });
    (TaskHandle::from_arc(task), out)
}
