use crate::runtime::config::{Builder, RuntimeConfig};
use crate::runtime::worker::Worker;
use crate::runtime::{affinity, context};
use anyhow::{Result, anyhow};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::{Arc, OnceLock, Weak};

/// The fixed set of workers a process schedules treetures over.
///
/// The pool that most code uses is the lazily initialized process-wide
/// one ([`WorkerPool::global`]), sized from `NUM_WORKERS` or the hardware.
/// Tests and embedders can build private pools through [`Builder`].
///
/// Worker 0 belongs to the thread that built the pool (it participates by
/// pumping the scheduler whenever it waits); workers 1.. each own a
/// pinned OS thread.
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,

    /// Sleep/wake plumbing for starved workers: a broadcast-only condvar.
    /// Poisoning happens under the lock so a parking worker cannot miss
    /// the shutdown wakeup.
    sleep: Mutex<()>,
    work_available: Condvar,
}

impl WorkerPool {
    pub(crate) fn from_config(cfg: RuntimeConfig) -> Arc<WorkerPool> {
        let pool = Arc::new_cyclic(|weak: &Weak<WorkerPool>| {
            let workers = (0..cfg.worker_threads)
                .map(|id| Arc::new(Worker::new(id, weak.clone(), &cfg)))
                .collect();

            WorkerPool {
                workers,
                sleep: Mutex::new(()),
                work_available: Condvar::new(),
            }
        });

        for worker in pool.workers.iter().skip(1) {
            worker.start_thread();
        }

        // The building thread acts as worker 0.
        context::set_current_worker(&pool.workers[0]);
        affinity::pin_current_thread(0);

        pool
    }

    /// The process-wide pool, built on first use.
    pub fn global() -> &'static Arc<WorkerPool> {
        static POOL: OnceLock<Arc<WorkerPool>> = OnceLock::new();
        POOL.get_or_init(|| {
            Builder::new()
                .build()
                .expect("failed to build the global worker pool")
        })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn worker(&self, id: usize) -> &Arc<Worker> {
        &self.workers[id]
    }

    /// Parks the calling worker until work is signaled. Returns without
    /// parking if the worker was poisoned meanwhile.
    pub(crate) fn wait_for_work(&self, worker: &Worker) {
        let mut guard = self.sleep.lock();
        if !worker.is_alive() {
            return;
        }
        self.work_available.wait(&mut guard);
    }

    /// Wakes every parked worker.
    pub(crate) fn work_available(&self) {
        self.work_available.notify_all();
    }

    /// Stops all workers and joins their threads. Safe to call more than
    /// once; the pool is unusable afterwards.
    pub fn shutdown(&self) -> Result<()> {
        {
            let _guard = self.sleep.lock();
            for worker in &self.workers {
                worker.poison();
            }
        }
        self.work_available.notify_all();

        let panicked = self
            .workers
            .iter()
            .skip(1)
            .filter(|worker| worker.join().is_err())
            .count();

        if panicked == 0 {
            Ok(())
        } else {
            Err(anyhow!("{panicked} worker thread(s) panicked"))
        }
    }

    /// Stops a single worker's thread, leaving its queue and identity in
    /// place so a test can drive it by hand.
    #[cfg(test)]
    pub(crate) fn retire_worker(&self, id: usize) {
        {
            let _guard = self.sleep.lock();
            self.workers[id].poison();
        }
        self.work_available.notify_all();
        self.workers[id].join().expect("worker thread panicked");
    }

    /// Writes every worker's queue for diagnostics.
    pub fn dump_state(&self, out: &mut dyn io::Write) -> io::Result<()> {
        for worker in &self.workers {
            worker.dump_state(out)?;
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}
