//! Per-thread event stacks for debugging dumps.
//!
//! Every scheduling-relevant operation pushes a scoped event onto the
//! calling thread's stack; a crash dump of all stacks shows what every
//! thread was in the middle of. Compiled to no-ops unless the
//! `monitoring` cargo feature is enabled.

use crate::path::TaskId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::io;
use std::sync::{Arc, LazyLock};
use std::thread::{self, ThreadId};

pub(crate) const ENABLED: bool = cfg!(feature = "monitoring");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    /// Processing a task.
    Run,
    /// Decomposing a task into a substitute subtree.
    Split,
    /// Cooperatively waiting for a task.
    Wait,
    /// Cooperatively waiting for a referenced subtree.
    DependencyWait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Event {
    kind: EventKind,
    task: TaskId,
}

struct ThreadState {
    thread: ThreadId,
    stack: Mutex<Vec<Event>>,
}

impl ThreadState {
    fn push(&self, event: Event) {
        self.stack.lock().push(event);
    }

    fn pop(&self, event: Event) {
        let top = self.stack.lock().pop();
        debug_assert_eq!(top, Some(event), "unbalanced monitoring scopes");
    }

    fn dump(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let stack = self.stack.lock();
        writeln!(out, "\nThread {:?}:", self.thread)?;
        writeln!(out, "\tStack:")?;
        for event in stack.iter() {
            writeln!(out, "\t\t{:?} {}", event.kind, event.task)?;
        }
        writeln!(out, "\t\t-- top of stack --")
    }
}

static STATES: LazyLock<DashMap<ThreadId, Arc<ThreadState>>> = LazyLock::new(DashMap::new);

fn current_state() -> Arc<ThreadState> {
    let id = thread::current().id();
    STATES
        .entry(id)
        .or_insert_with(|| {
            Arc::new(ThreadState {
                thread: id,
                stack: Mutex::new(Vec::new()),
            })
        })
        .clone()
}

/// RAII handle for one stack entry; popping happens on scope exit.
pub(crate) struct Action {
    entry: Option<(Arc<ThreadState>, Event)>,
}

impl Drop for Action {
    fn drop(&mut self) {
        if let Some((state, event)) = self.entry.take() {
            state.pop(event);
        }
    }
}

/// Records `kind` on the current thread's event stack for the duration of
/// the returned guard's scope. The task id is only computed when
/// monitoring is compiled in.
pub(crate) fn scoped(kind: EventKind, task: impl FnOnce() -> TaskId) -> Action {
    if !ENABLED {
        return Action { entry: None };
    }

    let state = current_state();
    let event = Event { kind, task: task() };
    state.push(event);
    Action {
        entry: Some((state, event)),
    }
}

/// Writes every registered thread's event stack.
pub(crate) fn dump_states(out: &mut dyn io::Write) -> io::Result<()> {
    if STATES.is_empty() {
        write!(out, "No thread states recorded.")?;
        if !ENABLED {
            write!(out, " Enable the `monitoring` feature to record them.")?;
        }
        return writeln!(out);
    }

    for entry in STATES.iter() {
        entry.value().dump(out)?;
    }
    Ok(())
}
