use crate::family::create_family;
use crate::path::TaskPath;
use crate::reference::TaskReference;
use crate::task::TaskHandle;
use crate::task::kinds::ValueSlot;
use std::fmt;

/// A tree-structured future: a handle on a released computation and,
/// eventually, its value.
///
/// Unlike a flat future, a treeture can hand out [`TaskReference`]s into
/// any subtree of the computation, so downstream work can wait on exactly
/// the part it needs.
pub struct Treeture<T> {
    task: TaskHandle,
    out: ValueSlot<T>,
}

impl<T> Treeture<T> {
    /// Cooperatively waits until the computation is complete. Waiting
    /// twice is a no-op the second time.
    pub fn wait(&self) {
        self.task.wait();
    }

    /// Waits for completion and moves the value out.
    pub fn get(self) -> T {
        self.task.wait();
        self.out.take()
    }

    /// A reference to the whole computation.
    ///
    /// Panics if the underlying graph was not rooted in a family.
    pub fn task_reference(&self) -> TaskReference {
        TaskReference::from_task(&self.task)
    }

    /// A reference narrowed to the left subtree.
    pub fn left(&self) -> TaskReference {
        self.task_reference().left()
    }

    /// A reference narrowed to the right subtree.
    pub fn right(&self) -> TaskReference {
        self.task_reference().right()
    }
}

impl<T> fmt::Debug for Treeture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Treeture({:?})", self.task)
    }
}

/// A task graph that has been composed but not yet handed to the runtime.
///
/// Releasing moves the root through its lifecycle; dropping an unreleased
/// treeture without releasing it is a programming error and trips a debug
/// assertion.
pub struct UnreleasedTreeture<T> {
    task: Option<TaskHandle>,
    out: Option<ValueSlot<T>>,
}

impl<T> UnreleasedTreeture<T> {
    pub(crate) fn new(task: TaskHandle, out: ValueSlot<T>) -> Self {
        UnreleasedTreeture {
            task: Some(task),
            out: Some(out),
        }
    }

    pub(crate) fn into_parts(mut self) -> (TaskHandle, ValueSlot<T>) {
        (
            self.task.take().expect("treeture already consumed"),
            self.out.take().expect("treeture already consumed"),
        )
    }

    /// Adopts the graph into a freshly created task family, making every
    /// node in it addressable through task references after release.
    pub fn rooted(self) -> Self {
        let (task, out) = self.into_parts();
        task.adopt(&create_family(), TaskPath::root());
        UnreleasedTreeture::new(task, out)
    }

    /// Hands the graph to the runtime for execution.
    pub fn release(self) -> Treeture<T> {
        let (task, out) = self.into_parts();
        if !task.is_done() {
            task.start();
        }
        Treeture { task, out }
    }

    /// Releases and waits for the value in one step.
    pub fn get(self) -> T {
        self.release().get()
    }
}

impl<T> Drop for UnreleasedTreeture<T> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            debug_assert!(
                !task.is_new(),
                "unreleased treeture dropped without being released: {task}"
            );
        }
    }
}

impl<T> fmt::Debug for UnreleasedTreeture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task {
            Some(task) => write!(f, "UnreleasedTreeture({:?})", task),
            None => write!(f, "UnreleasedTreeture(<consumed>)"),
        }
    }
}
