//! Tree-structured futures.
//!
//! A treeture is a future whose computation is a binary tree of tasks:
//! leaves compute, inner nodes merge their children's results, and any
//! subtree can be synchronized on through a path-addressed reference,
//! including subtrees that only come into existence when the runtime
//! decides to decompose a coarse task into finer ones.
//!
//! Graphs are composed lazily with the operators in [`ops`] and handed to
//! a fixed pool of pinned workers on release. Scheduling is cooperative:
//! waiting threads pump the scheduler instead of blocking, work is stolen
//! from the back of random victims' queues, and coarse tasks are split
//! on demand, guided by per-depth run-time estimates.
//!
//! ```no_run
//! use treeture::{combine, spawn, Dependencies};
//!
//! fn fib(n: u64) -> u64 {
//!     if n < 2 {
//!         return n;
//!     }
//!     combine(
//!         Dependencies::none(),
//!         spawn(Dependencies::none(), move || fib(n - 1)),
//!         spawn(Dependencies::none(), move || fib(n - 2)),
//!         |a, b| a + b,
//!         true,
//!     )
//!     .get()
//! }
//!
//! assert_eq!(fib(10), 55);
//! ```

mod deps;
mod family;
mod monitor;
mod ops;
mod path;
mod reference;
mod treeture;

pub(crate) mod task;

pub mod runtime;

pub use ops::{combine, done, parallel, sequential, spawn, spawn_splitable};
pub use path::{TaskId, TaskPath};
pub use reference::{Dependencies, TaskReference, after};
pub use runtime::{Builder, WorkerPool};
pub use treeture::{Treeture, UnreleasedTreeture};

use std::io;

/// Dumps all thread event stacks and all worker queues of the global pool
/// as human-readable text, for crash diagnostics.
pub fn dump_runtime_state(out: &mut dyn io::Write) -> io::Result<()> {
    writeln!(out, "\n------------------- Runtime State Dump -------------------")?;
    monitor::dump_states(out)?;
    WorkerPool::global().dump_state(out)?;
    writeln!(out, "-----------------------------------------------------------")
}
