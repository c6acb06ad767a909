use crate::family::TaskFamily;
use crate::monitor::{self, EventKind};
use crate::path::{TaskId, TaskPath};
use crate::runtime;
use crate::task::TaskHandle;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// A reference to a task (or any subtree of it) for synchronization.
///
/// References address tasks by family and path rather than by pointer, so
/// they remain valid across splits and substitutions: a reference into a
/// subtree reports done as soon as the covering ancestor completes, even
/// if the referenced node itself was never materialized.
///
/// Only members of a family can be referenced; orphan tasks have no
/// synchronization identity.
#[derive(Clone)]
pub struct TaskReference {
    family: Arc<TaskFamily>,
    path: TaskPath,
}

impl TaskReference {
    pub(crate) fn from_task(task: &TaskHandle) -> Self {
        let family = task
            .family()
            .expect("unable to reference an orphan task");
        TaskReference {
            family,
            path: task.path(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.family.is_complete(&self.path)
    }

    /// Cooperatively waits for the referenced subtree to complete,
    /// helping the scheduler along instead of blocking.
    pub fn wait(&self) {
        let _action = monitor::scoped(EventKind::DependencyWait, || {
            TaskId::new(self.family.id(), self.path)
        });

        while !self.is_done() {
            runtime::current_worker().schedule_step();
        }
    }

    /// Reference to the left subtree of the referenced task.
    pub fn left(&self) -> TaskReference {
        TaskReference {
            family: Arc::clone(&self.family),
            path: self.path.left_child(),
        }
    }

    /// Reference to the right subtree of the referenced task.
    pub fn right(&self) -> TaskReference {
        TaskReference {
            family: Arc::clone(&self.family),
            path: self.path.right_child(),
        }
    }

    /// Narrows this reference to its left subtree in place.
    pub fn descend_left(&mut self) -> &mut Self {
        self.path = self.path.left_child();
        self
    }

    /// Narrows this reference to its right subtree in place.
    pub fn descend_right(&mut self) -> &mut Self {
        self.path = self.path.right_child();
        self
    }

    pub(crate) fn family(&self) -> &Arc<TaskFamily> {
        &self.family
    }

    pub(crate) fn path(&self) -> TaskPath {
        self.path
    }
}

impl fmt::Debug for TaskReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskReference({}.{})", self.family.id(), self.path)
    }
}

/// Stack-resident up to this many references; the common dependency list
/// is a handful of entries.
type RefList = SmallVec<[TaskReference; 4]>;

/// An ordered collection of task references a new task should wait on.
///
/// The no-dependencies marker and an emptied-out list behave identically;
/// both exist because callers that never touch dependencies should not pay
/// for an allocation.
#[derive(Default)]
pub struct Dependencies {
    list: Option<RefList>,
}

impl Dependencies {
    /// The "no dependencies" marker.
    pub fn none() -> Self {
        Dependencies { list: None }
    }

    pub fn is_empty(&self) -> bool {
        self.list.as_ref().is_none_or(|l| l.is_empty())
    }

    pub fn len(&self) -> usize {
        self.list.as_ref().map_or(0, |l| l.len())
    }

    /// Appends one more reference. Valid until the collection is consumed
    /// by a task constructor.
    pub fn add(&mut self, reference: TaskReference) {
        self.list.get_or_insert_with(RefList::new).push(reference);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &TaskReference> {
        self.list.iter().flatten()
    }
}

/// Collects task references into a dependency set: `after([a, b])`.
/// `after([])` is equivalent to [`Dependencies::none`].
pub fn after<I>(references: I) -> Dependencies
where
    I: IntoIterator<Item = TaskReference>,
{
    let list: RefList = references.into_iter().collect();
    if list.is_empty() {
        Dependencies::none()
    } else {
        Dependencies { list: Some(list) }
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter())
            .finish()
    }
}
