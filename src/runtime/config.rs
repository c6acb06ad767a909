use crate::runtime::WorkerPool;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::thread;

/// Environment variable overriding the worker count. Unparsable or zero
/// values are ignored.
pub(crate) const NUM_WORKERS_ENV: &str = "NUM_WORKERS";

/// Targeted maximum length of a worker's ready queue. More of a guideline
/// than a limit; high demand may exceed it.
const DEFAULT_MAX_QUEUE_LENGTH: usize = 8;

/// Configures and builds a [`WorkerPool`].
///
/// The process-wide pool is built from the environment; tests and embedders
/// that need a specific shape build their own.
#[derive(Debug)]
pub struct Builder {
    worker_threads: Option<usize>,
    max_queue_length: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            worker_threads: None,
            max_queue_length: DEFAULT_MAX_QUEUE_LENGTH,
        }
    }

    /// Sets the number of workers, overriding `NUM_WORKERS` and the
    /// hardware default.
    #[track_caller]
    pub fn worker_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "worker threads cannot be set to 0");
        self.worker_threads = Some(val);
        self
    }

    /// Sets the per-worker queue length target that drives splitting and
    /// inline execution.
    #[track_caller]
    pub fn max_queue_length(mut self, val: usize) -> Self {
        assert!(val > 0, "max queue length cannot be set to 0");
        self.max_queue_length = val;
        self
    }

    /// Builds the pool, spawning its worker threads. The calling thread
    /// becomes worker 0.
    pub fn build(self) -> Result<Arc<WorkerPool>> {
        let cfg = RuntimeConfig::try_from(self)?;
        Ok(WorkerPool::from_config(cfg))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) worker_threads: usize,
    pub(crate) max_queue_length: usize,
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self> {
        let worker_threads = builder
            .worker_threads
            .unwrap_or_else(default_worker_count);

        if builder.max_queue_length == 0 {
            return Err(anyhow!("max queue length must be greater than 0"));
        }

        Ok(RuntimeConfig {
            worker_threads,
            max_queue_length: builder.max_queue_length,
        })
    }
}

/// Worker count from `NUM_WORKERS` if set and usable, otherwise the
/// hardware concurrency; always at least 1.
fn default_worker_count() -> usize {
    let mut count = thread::available_parallelism().map_or(1, |n| n.get()) as i64;

    if let Ok(val) = std::env::var(NUM_WORKERS_ENV) {
        match val.trim().parse::<i64>() {
            Ok(user) if user != 0 => count = user,
            _ => {}
        }
    }

    count.max(1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_are_positive() {
        let cfg = RuntimeConfig::try_from(Builder::new()).unwrap();
        assert!(cfg.worker_threads >= 1);
        assert_eq!(cfg.max_queue_length, DEFAULT_MAX_QUEUE_LENGTH);
    }

    #[test]
    fn explicit_worker_count_wins() {
        let cfg = RuntimeConfig::try_from(Builder::new().worker_threads(3)).unwrap();
        assert_eq!(cfg.worker_threads, 3);
    }
}
