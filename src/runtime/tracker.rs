//! Test-only introspection of scheduler decisions.
//!
//! Scenario tests need to observe *how* a graph was executed (which
//! worker ran what, whether a steal or a split happened), not just the
//! result. Workers record their calls here; tests filter by family id so
//! concurrently running tests do not see each other.

use crate::path::TaskId;
use dashmap::DashMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Run,
    Steal,
    Split,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Call {
    pub(crate) worker: usize,
    pub(crate) task: TaskId,
}

static CALLS: LazyLock<DashMap<Method, Vec<Call>>> = LazyLock::new(DashMap::new);

pub(crate) fn record(method: Method, worker: usize, task: TaskId) {
    CALLS.entry(method).or_default().push(Call { worker, task });
}

/// All recorded calls of `method` belonging to `family`.
pub(crate) fn calls_for_family(method: Method, family: u64) -> Vec<Call> {
    CALLS
        .get(&method)
        .map(|calls| {
            calls
                .iter()
                .filter(|call| call.task.family() == family)
                .copied()
                .collect()
        })
        .unwrap_or_default()
}
