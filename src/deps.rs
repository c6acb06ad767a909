use crate::path::TaskPath;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Depth down to which completion is tracked per-path. Deeper paths share
/// the cell of their ancestor at this depth, which bounds the table to
/// `2^(MAX_DEPTH+1)` cells per family.
pub(crate) const MAX_DEPTH: u32 = 6;

/// Something that can be told that one of its dependencies completed.
///
/// Implemented by the task handle; tests substitute a counting stub to
/// exercise the registration/completion races in isolation.
pub(crate) trait DependencyWaiter: Clone {
    fn dependency_done(&self);
}

/// Per-family table recording, for every tracked tree path, either the set
/// of tasks waiting on that subtree or the fact that the subtree has
/// completed.
///
/// Each cell is a lock-free singly-linked list of waiters. Completion is a
/// one-way transition encoded by tagging the low bit of the list head;
/// once a cell is done it never holds waiters again, so registrations that
/// lose the race are notified on the spot.
pub(crate) struct TaskDependencyManager<W> {
    max_depth: u32,
    cells: Box<[AtomicPtr<Waiter<W>>]>,
}

struct Waiter<W> {
    task: W,
    next: *mut Waiter<W>,
}

/// Sentinel stored in a completed cell. Real nodes come out of `Box` and
/// are at least pointer-aligned, so their low bit is always clear.
const DONE_TAG: usize = 0x1;

fn is_done<W>(ptr: *mut Waiter<W>) -> bool {
    ptr as usize & DONE_TAG != 0
}

fn done_sentinel<W>() -> *mut Waiter<W> {
    DONE_TAG as *mut Waiter<W>
}

// Safety: cells only hand nodes across threads through the atomic head;
// a node is owned by exactly one side of every CAS/swap outcome.
unsafe impl<W: Send> Send for TaskDependencyManager<W> {}
unsafe impl<W: Send + Sync> Sync for TaskDependencyManager<W> {}

impl<W: DependencyWaiter> TaskDependencyManager<W> {
    pub(crate) fn new(max_depth: u32) -> Self {
        let num_entries = 1usize << (max_depth + 1);
        let mut cells = Vec::with_capacity(num_entries);
        cells.resize_with(num_entries, || AtomicPtr::new(std::ptr::null_mut()));
        TaskDependencyManager {
            max_depth,
            cells: cells.into_boxed_slice(),
        }
    }

    /// Table index of the cell tracking `path`. Paths deeper than
    /// `max_depth` clamp to the deepest tracked ancestor.
    fn position(&self, path: &TaskPath) -> usize {
        let num_entries = self.cells.len();
        let mut pos = 1usize;
        for dir in path.dirs() {
            pos = pos * 2 + dir as usize;
            if pos >= num_entries {
                return pos / 2;
            }
        }
        pos
    }

    /// Registers `waiter` to be notified once the subtree at `path` is
    /// complete. If it already is, the notification fires immediately;
    /// either way the waiter sees exactly one `dependency_done` for this
    /// registration.
    pub(crate) fn add_dependency(&self, waiter: &W, path: &TaskPath) {
        let cell = &self.cells[self.position(path)];

        let mut head = cell.load(Ordering::Acquire);
        if is_done(head) {
            waiter.dependency_done();
            return;
        }

        let entry = Box::into_raw(Box::new(Waiter {
            task: waiter.clone(),
            next: head,
        }));

        loop {
            match cell.compare_exchange_weak(head, entry, Ordering::Release, Ordering::Acquire) {
                Ok(_) => return,
                Err(observed) => {
                    if is_done(observed) {
                        // Lost the race against completion: reclaim the
                        // node and notify directly.
                        // Safety: the entry was never published.
                        drop(unsafe { Box::from_raw(entry) });
                        waiter.dependency_done();
                        return;
                    }
                    head = observed;
                    // Safety: still exclusively ours until the CAS succeeds.
                    unsafe { (*entry).next = observed };
                }
            }
        }
    }

    /// Marks the subtree at `path` complete, notifying every registered
    /// waiter in it exactly once. Idempotent; a second call finds the done
    /// sentinel and stops.
    ///
    /// Completion descends into both children so that references into
    /// split-off or substituted descendants report done even though those
    /// descendants never registered themselves.
    pub(crate) fn mark_complete(&self, path: &TaskPath) {
        // A too-deep path maps onto an ancestor's cell; completing that
        // cell here would falsely complete the whole ancestor subtree.
        if path.len() > self.max_depth {
            return;
        }

        let pos = self.position(path);
        let mut cur = self.cells[pos].swap(done_sentinel(), Ordering::AcqRel);

        // Someone else already completed this cell (substitutes can finish
        // the same path twice); the list was drained then.
        if is_done(cur) {
            return;
        }

        while !cur.is_null() {
            // Safety: the swap made this thread the exclusive owner of the
            // whole chain.
            let entry = unsafe { Box::from_raw(cur) };
            entry.task.dependency_done();
            cur = entry.next;
        }

        // Bottom row has no tracked children.
        if pos >= self.cells.len() / 2 {
            return;
        }
        self.mark_complete(&path.left_child());
        self.mark_complete(&path.right_child());
    }

    /// True iff the subtree at `path` has been marked complete.
    pub(crate) fn is_complete(&self, path: &TaskPath) -> bool {
        is_done(self.cells[self.position(path)].load(Ordering::Acquire))
    }
}

impl<W> Drop for TaskDependencyManager<W> {
    fn drop(&mut self) {
        for cell in self.cells.iter_mut() {
            let mut cur = *cell.get_mut();
            if is_done(cur) {
                continue;
            }
            while !cur.is_null() {
                // Safety: &mut self, nobody else can touch the chain.
                let entry = unsafe { Box::from_raw(cur) };
                cur = entry.next;
            }
        }
    }
}
