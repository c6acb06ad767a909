use crate::deps::{self, TaskDependencyManager};
use crate::path::TaskPath;
use crate::task::TaskHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A task family is the set of tasks descending from one top-level release,
/// sharing a path-indexed dependency table.
///
/// Tasks created through composition start out as orphans; they join a
/// family when the root of their graph is adopted (on a rooted release or
/// as the result of a split). Every member task and every outstanding
/// [`TaskReference`](crate::TaskReference) holds a share of the family.
pub(crate) struct TaskFamily {
    id: u64,
    dependencies: TaskDependencyManager<TaskHandle>,
}

impl TaskFamily {
    /// Family ids are unique over the process lifetime; 0 is reserved for
    /// "no family".
    fn next_id() -> u64 {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Tests whether the subtree at `path` has completed.
    pub(crate) fn is_complete(&self, path: &TaskPath) -> bool {
        self.dependencies.is_complete(path)
    }

    /// Registers `waiter` as depending on the completion of `path`.
    pub(crate) fn add_dependency(&self, waiter: &TaskHandle, path: &TaskPath) {
        self.dependencies.add_dependency(waiter, path);
    }

    /// Marks the subtree at `path` as finished, waking its waiters.
    pub(crate) fn mark_done(&self, path: &TaskPath) {
        self.dependencies.mark_complete(path);
    }
}

pub(crate) fn create_family() -> Arc<TaskFamily> {
    Arc::new(TaskFamily {
        id: TaskFamily::next_id(),
        dependencies: TaskDependencyManager::new(deps::MAX_DEPTH),
    })
}
