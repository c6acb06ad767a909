//! Thread ↔ worker association.
//!
//! Worker threads register themselves here; any other thread that touches
//! the runtime (typically the thread releasing a root graph or waiting on
//! a treeture) acts on behalf of worker 0 of the process-wide pool, which
//! never owns a thread of its own.

use crate::runtime::pool::WorkerPool;
use crate::runtime::worker::Worker;
use std::cell::RefCell;
use std::sync::{Arc, Weak};

thread_local! {
    static CURRENT_WORKER: RefCell<Weak<Worker>> = const { RefCell::new(Weak::new()) };
}

pub(crate) fn set_current_worker(worker: &Arc<Worker>) {
    CURRENT_WORKER.with(|cell| *cell.borrow_mut() = Arc::downgrade(worker));
}

/// The worker this thread acts as: its own if it is a worker thread, the
/// global pool's worker 0 otherwise.
pub(crate) fn current_worker() -> Arc<Worker> {
    CURRENT_WORKER
        .with(|cell| cell.borrow().upgrade())
        .unwrap_or_else(|| Arc::clone(WorkerPool::global().worker(0)))
}

/// The pool the current worker belongs to.
pub(crate) fn current_pool() -> Arc<WorkerPool> {
    CURRENT_WORKER
        .with(|cell| cell.borrow().upgrade())
        .and_then(|worker| worker.pool())
        .unwrap_or_else(|| Arc::clone(WorkerPool::global()))
}
