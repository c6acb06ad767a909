//! The task graph and its lifecycle state machine.
//!
//! Tasks live behind [`TaskHandle`]s, shared references into a graph of
//! parent/child/substitute links. The handle carries every state
//! transition; the concrete task kinds in [`kinds`] only contribute how a
//! value is computed and how results are aggregated.

use crate::deps::DependencyWaiter;
use crate::family::TaskFamily;
use crate::monitor::{self, EventKind};
use crate::path::{TaskId, TaskPath};
use crate::reference::Dependencies;
use crate::runtime::{self, SPREAD_DEPTH};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};

pub(crate) mod kinds;
mod state;

pub(crate) use state::{AtomicState, State};

#[cfg(test)]
mod tests;

/// State shared by every task kind: lifecycle, dependency accounting and
/// the links into the surrounding task graph.
///
/// The atomics are racy by design (dependency completion arrives from any
/// worker); everything else is only written by whichever worker currently
/// owns the task's state transition, and sits behind a mutex so that
/// ownership handovers need no further discipline.
pub(crate) struct TaskCore {
    family: Mutex<Option<Arc<TaskFamily>>>,
    path: Mutex<TaskPath>,

    state: AtomicState,

    /// Pending dependencies plus the one artificial release dependency
    /// every computing task is constructed with.
    active_deps: AtomicI32,

    /// Whether a decompose operator was supplied and not yet consumed.
    splitable: AtomicBool,

    /// Children of a split task; both present or both absent, cleared
    /// when the task aggregates.
    left: Mutex<Option<TaskHandle>>,
    right: Mutex<Option<TaskHandle>>,

    /// Whether the children run concurrently or left-then-right.
    parallel: bool,

    /// Non-owning back-link used solely for completion callbacks.
    parent: Mutex<Option<WeakTaskHandle>>,

    /// Children not yet reported done (parallel split tasks only).
    alive_children: AtomicI32,

    /// Replacement subtree of a split-off leaf; cleared when aggregated.
    substitute: Mutex<Option<TaskHandle>>,

    /// Sticky record that a substitute was installed, outliving the link.
    substituted: AtomicBool,
}

impl TaskCore {
    /// Core of a leaf task. Already-done tasks carry no release
    /// dependency; computing tasks start with the artificial one.
    pub(crate) fn new_leaf(done: bool, splitable: bool) -> Self {
        TaskCore {
            family: Mutex::new(None),
            path: Mutex::new(TaskPath::root()),
            state: AtomicState::new(if done { State::Done } else { State::New }),
            active_deps: AtomicI32::new(if done { 0 } else { 1 }),
            splitable: AtomicBool::new(splitable),
            left: Mutex::new(None),
            right: Mutex::new(None),
            parallel: false,
            parent: Mutex::new(None),
            alive_children: AtomicI32::new(0),
            substitute: Mutex::new(None),
            substituted: AtomicBool::new(false),
        }
    }

    /// Core of a split task over two child tasks.
    pub(crate) fn new_split(left: TaskHandle, right: TaskHandle, parallel: bool) -> Self {
        TaskCore {
            family: Mutex::new(None),
            path: Mutex::new(TaskPath::root()),
            state: AtomicState::new(State::New),
            active_deps: AtomicI32::new(1),
            splitable: AtomicBool::new(false),
            left: Mutex::new(Some(left)),
            right: Mutex::new(Some(right)),
            parallel,
            parent: Mutex::new(None),
            alive_children: AtomicI32::new(0),
            substitute: Mutex::new(None),
            substituted: AtomicBool::new(false),
        }
    }
}

/// A task's behavior: the hooks each concrete kind fills in.
///
/// `execute` is only invoked for non-split tasks; `aggregate` runs on
/// every completion path and is where child or substitute results are
/// collected.
pub(crate) trait TaskObj: Send + Sync + 'static {
    fn core(&self) -> &TaskCore;

    fn execute(&self);

    fn aggregate(&self);

    /// Replaces this task by a decomposed subtree. Only splitable leaf
    /// tasks support this.
    fn split(self: Arc<Self>) {
        unreachable!("task is not splitable");
    }
}

/// Shared handle to a task in the graph.
#[derive(Clone)]
pub(crate) struct TaskHandle {
    raw: Arc<dyn TaskObj>,
}

pub(crate) struct WeakTaskHandle {
    raw: Weak<dyn TaskObj>,
}

impl WeakTaskHandle {
    fn upgrade(&self) -> Option<TaskHandle> {
        self.raw.upgrade().map(|raw| TaskHandle { raw })
    }
}

impl TaskHandle {
    pub(crate) fn from_arc(raw: Arc<dyn TaskObj>) -> Self {
        TaskHandle { raw }
    }

    fn core(&self) -> &TaskCore {
        self.raw.core()
    }

    fn downgrade(&self) -> WeakTaskHandle {
        WeakTaskHandle {
            raw: Arc::downgrade(&self.raw),
        }
    }

    fn same_task(&self, other: &TaskHandle) -> bool {
        // Compare data pointers; the vtable halves may differ for the
        // same object.
        std::ptr::addr_eq(Arc::as_ptr(&self.raw), Arc::as_ptr(&other.raw))
    }

    // -- observers --

    pub(crate) fn family(&self) -> Option<Arc<TaskFamily>> {
        self.core().family.lock().clone()
    }

    pub(crate) fn path(&self) -> TaskPath {
        *self.core().path.lock()
    }

    pub(crate) fn id(&self) -> TaskId {
        match self.family() {
            Some(family) => TaskId::new(family.id(), self.path()),
            None => TaskId::orphan(),
        }
    }

    pub(crate) fn is_orphan(&self) -> bool {
        self.core().family.lock().is_none()
    }

    pub(crate) fn depth(&self) -> u32 {
        self.path().len()
    }

    fn state(&self) -> State {
        self.core().state.load()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state() == State::Done
    }

    pub(crate) fn is_new(&self) -> bool {
        self.state() == State::New
    }

    pub(crate) fn is_splitable(&self) -> bool {
        self.core().splitable.load(Ordering::Acquire)
    }

    pub(crate) fn is_substituted(&self) -> bool {
        self.core().substituted.load(Ordering::Acquire)
    }

    /// A substitute takes over the observable shape of the task it
    /// replaced.
    pub(crate) fn is_split(&self) -> bool {
        if let Some(sub) = self.substitute() {
            return sub.is_split();
        }
        self.core().left.lock().is_some()
    }

    pub(crate) fn is_ready(&self) -> bool {
        if let Some(sub) = self.substitute() {
            return sub.is_ready();
        }
        self.state() == State::Ready
    }

    pub(crate) fn left(&self) -> Option<TaskHandle> {
        if let Some(sub) = self.substitute() {
            return sub.left();
        }
        self.core().left.lock().clone()
    }

    pub(crate) fn right(&self) -> Option<TaskHandle> {
        if let Some(sub) = self.substitute() {
            return sub.right();
        }
        self.core().right.lock().clone()
    }

    fn substitute(&self) -> Option<TaskHandle> {
        self.core().substitute.lock().clone()
    }

    // -- mutators --

    /// Adds dependencies to a task that has not been released yet. Already
    /// completed references are consumed on the spot.
    pub(crate) fn add_dependencies(&self, deps: &Dependencies) {
        if deps.is_empty() {
            return;
        }

        assert_eq!(
            self.state(),
            State::New,
            "dependencies can only be added before release"
        );

        self.core()
            .active_deps
            .fetch_add(deps.len() as i32, Ordering::AcqRel);

        for dep in deps.iter() {
            if dep.is_done() {
                self.dependency_done();
            } else {
                dep.family().add_dependency(self, &dep.path());
            }
        }
    }

    /// Joins `family` at `path`, recursively bringing any children or
    /// substitute along on the corresponding child paths.
    pub(crate) fn adopt(&self, family: &Arc<TaskFamily>, path: TaskPath) {
        assert!(self.is_orphan(), "cannot adopt a member of another family");

        *self.core().family.lock() = Some(Arc::clone(family));
        *self.core().path.lock() = path;

        if self.is_done() {
            family.mark_done(&path);
        }

        if let Some(sub) = self.substitute() {
            sub.adopt(family, path);
        }
        if let Some(left) = self.core().left.lock().clone() {
            left.adopt(family, path.left_child());
        }
        if let Some(right) = self.core().right.lock().clone() {
            right.adopt(family, path.right_child());
        }
    }

    /// Releases the task into the runtime: `New → Blocked`, eagerly
    /// splitting shallow splitable family members, then dropping the
    /// artificial release dependency.
    pub(crate) fn start(&self) {
        assert_eq!(self.state(), State::New, "task released twice");
        self.core().state.advance(State::Blocked);

        // Split shallow tasks right away to populate the queues.
        if self.is_splitable() && !self.is_orphan() && self.depth() < SPREAD_DEPTH {
            self.split();
            if self.is_done() {
                return;
            }
        }

        self.dependency_done();
    }

    pub(crate) fn split(&self) {
        if !self.is_splitable() {
            return;
        }
        let _action = monitor::scoped(EventKind::Split, || self.id());
        Arc::clone(&self.raw).split();
    }

    /// One dependency of this task completed. The transition to `Ready`
    /// (and the scheduling decision) happens on whichever thread drops the
    /// counter to zero.
    pub(crate) fn dependency_done(&self) {
        let old = self.core().active_deps.fetch_sub(1, Ordering::AcqRel);

        if old < 0 {
            // Substitution already wiped the remaining dependencies.
            debug_assert!(self.is_substituted());
            self.core().active_deps.store(0, Ordering::Release);
            return;
        }

        if old != 1 {
            return;
        }

        debug_assert_ne!(
            self.state(),
            State::New,
            "a task must not lose its last dependency before release"
        );
        debug_assert_eq!(self.state(), State::Blocked);
        self.core().state.advance(State::Ready);

        // Spread shallow family tasks across workers by their path bits;
        // everything else stays on the scheduling worker.
        let depth = self.depth();
        if !self.is_orphan() && depth < SPREAD_DEPTH {
            let pool = runtime::current_pool();
            let num_workers = pool.num_workers();
            let target = if depth == 0 {
                0
            } else {
                (self.path().bits() as usize * num_workers) >> depth
            };
            pool.worker(target).schedule(self.clone());
        } else {
            runtime::current_worker().schedule(self.clone());
        }
    }

    /// Processes a `Ready` task to completion: `Running`, then either the
    /// leaf computation or the split-children protocol, finishing into
    /// `Done`. Substituted tasks only wait for their substitute's
    /// completion callback.
    pub(crate) fn run(&self) {
        let _action = monitor::scoped(EventKind::Run, || self.id());

        if self.is_substituted() {
            self.wait();
            debug_assert_eq!(self.state(), State::Done);
            debug_assert!(self.substitute().is_none());
            return;
        }

        assert_eq!(self.state(), State::Ready, "task run before it was ready");
        debug_assert_eq!(self.core().active_deps.load(Ordering::Acquire), 0);

        self.core().state.advance(State::Running);

        let Some(left) = self.core().left.lock().clone() else {
            self.raw.execute();
            self.finish();
            return;
        };
        let right = self
            .core()
            .right
            .lock()
            .clone()
            .expect("split task without right child");

        debug_assert!(matches!(left.state(), State::New | State::Done));
        debug_assert!(matches!(right.state(), State::New | State::Done));

        if !self.core().parallel {
            if left.state() == State::New {
                left.start();
            }
            left.wait();
            if right.state() == State::New {
                right.start();
            }
            right.wait();
            self.finish();
            return;
        }

        let left_is_new = left.state() == State::New;
        let right_is_new = right.state() == State::New;
        let children = left_is_new as i32 + right_is_new as i32;

        if children == 0 {
            // Both already done, aggregate right away.
            self.finish();
            return;
        }

        debug_assert_eq!(self.core().alive_children.load(Ordering::Acquire), 0);
        self.core()
            .alive_children
            .store(children, Ordering::Release);

        if left_is_new {
            *left.core().parent.lock() = Some(self.downgrade());
            left.start();
        }
        if right_is_new {
            *right.core().parent.lock() = Some(self.downgrade());
            right.start();
        }

        // The last child's completion callback finishes this task.
        self.wait();
        debug_assert!(self.is_done());
    }

    /// Installs `sub` as the replacement of this task. Called by splitable
    /// kinds from their `split` hook.
    pub(crate) fn set_substitute(&self, sub: TaskHandle) {
        let state = self.state();
        assert!(
            matches!(state, State::Blocked | State::Ready),
            "substitution in state {state}"
        );
        debug_assert!(self.substitute().is_none(), "task substituted twice");
        debug_assert!(matches!(sub.state(), State::New | State::Done));

        if let Some(family) = self.family() {
            sub.adopt(&family, self.path());
        }
        *sub.core().parent.lock() = Some(self.downgrade());

        *self.core().substitute.lock() = Some(sub.clone());
        self.core().substituted.store(true, Ordering::Release);

        // Remaining dependencies are the substitute's problem now.
        self.core().active_deps.store(0, Ordering::Release);

        if state == State::Blocked {
            self.core().state.advance(State::Ready);
        }
        // The substitute may complete at any moment from here on.
        self.core().state.advance(State::Running);

        if sub.is_done() {
            self.finish();
            debug_assert_eq!(self.state(), State::Done);
            debug_assert!(self.substitute().is_none());
        } else {
            sub.start();
        }
    }

    /// Completion callback from a child or substitute.
    fn child_done(&self, child: &TaskHandle) {
        let is_substitute = self
            .substitute()
            .is_some_and(|sub| sub.same_task(child));

        if is_substitute {
            debug_assert!(matches!(self.state(), State::Ready | State::Running));
            self.finish();
            return;
        }

        debug_assert_eq!(self.state(), State::Running);

        let old = self.core().alive_children.fetch_sub(1, Ordering::AcqRel);
        if old != 1 {
            return;
        }

        // Last child finished.
        self.finish();
    }

    /// `Running → Aggregating → Done`: collect results, cut the graph
    /// links, publish completion to the family and the parent.
    fn finish(&self) {
        debug_assert_eq!(self.state(), State::Running);
        self.core().state.advance(State::Aggregating);

        self.raw.aggregate();

        *self.core().left.lock() = None;
        *self.core().right.lock() = None;
        *self.core().substitute.lock() = None;

        self.core().state.advance(State::Done);

        if let Some(family) = self.family() {
            family.mark_done(&self.path());
        }

        if let Some(parent) = self.core().parent.lock().take() {
            if let Some(parent) = parent.upgrade() {
                parent.child_done(self);
            }
        }
    }

    /// Cooperatively waits for this task: pumps scheduling steps on the
    /// current worker instead of blocking, so completion can depend on
    /// this very thread.
    pub(crate) fn wait(&self) {
        let _action = monitor::scoped(EventKind::Wait, || self.id());

        debug_assert!(self.state() > State::New, "waiting on an unreleased task");

        while !self.is_done() {
            runtime::current_worker().schedule_step();
        }
    }
}

impl DependencyWaiter for TaskHandle {
    fn dependency_done(&self) {
        TaskHandle::dependency_done(self);
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({} : {})", self.id(), self.state())
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sub) = self.substitute() {
            return write!(f, "{} -> {}", self.id(), sub);
        }
        if let (Some(left), Some(right)) = (
            self.core().left.lock().clone(),
            self.core().right.lock().clone(),
        ) {
            return write!(f, "{} : {} = [{},{}]", self.id(), self.state(), left, right);
        }
        write!(f, "{} : {}", self.id(), self.state())
    }
}
