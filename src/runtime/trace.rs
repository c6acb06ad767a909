//! Fire-and-forget profiling events.
//!
//! Scheduling emits these as `tracing` events; with no subscriber
//! installed they cost a branch. Nothing in the runtime ever waits on
//! them.

use crate::path::TaskId;

pub(crate) fn worker_created(id: usize) {
    tracing::trace!(target: "treeture::worker", worker = id, "worker created");
}

pub(crate) fn worker_suspended(id: usize) {
    tracing::trace!(target: "treeture::worker", worker = id, "worker suspended");
}

pub(crate) fn worker_resumed(id: usize) {
    tracing::trace!(target: "treeture::worker", worker = id, "worker resumed");
}

pub(crate) fn worker_destroyed(id: usize) {
    tracing::trace!(target: "treeture::worker", worker = id, "worker destroyed");
}

pub(crate) fn task_started(task: TaskId) {
    tracing::trace!(target: "treeture::task", task = %task, "task started");
}

pub(crate) fn task_ended(task: TaskId) {
    tracing::trace!(target: "treeture::task", task = %task, "task ended");
}

pub(crate) fn task_stolen(task: TaskId) {
    tracing::trace!(target: "treeture::task", task = %task, "task stolen");
}
