use crate::runtime::config::RuntimeConfig;
use crate::runtime::pool::WorkerPool;
use crate::runtime::predictor::RuntimePredictor;
use crate::runtime::{affinity, context, trace};
use crate::task::TaskHandle;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Consecutive failed scheduling steps before a worker parks itself on
/// the pool's wake signal.
const IDLE_STEPS_BEFORE_SLEEP: u32 = 100_000;

/// Estimated run time above which a dequeued splitable task is split
/// rather than executed whole (on the order of 3 million cycles).
const SPLIT_TIME_THRESHOLD: Duration = Duration::from_millis(1);

/// A worker's queue of ready tasks.
///
/// Three access patterns share it: any thread pushes to the back (the
/// release path spreads shallow tasks across workers), the owner pops
/// from the front, and thieves pop from the back so they touch the
/// opposite end from a front-popping victim.
pub(crate) struct WorkQueue {
    inner: Mutex<VecDeque<TaskHandle>>,
}

impl WorkQueue {
    fn new() -> Self {
        WorkQueue {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    fn push_back(&self, task: TaskHandle) {
        self.inner.lock().push_back(task);
    }

    fn pop_front(&self) -> Option<TaskHandle> {
        self.inner.lock().pop_front()
    }

    fn pop_back(&self) -> Option<TaskHandle> {
        self.inner.lock().pop_back()
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn snapshot(&self) -> Vec<TaskHandle> {
        self.inner.lock().iter().cloned().collect()
    }
}

/// One scheduling unit of the pool.
///
/// Worker 0 never owns a thread; it is driven by whichever thread waits
/// on the runtime. All other workers run [`Worker::run`] on their own
/// pinned OS thread until poisoned.
pub(crate) struct Worker {
    id: usize,

    pool: Weak<WorkerPool>,

    alive: AtomicBool,

    queue: WorkQueue,

    max_queue_length: usize,

    /// Run-time estimates feeding the split gate. Behind a mutex because
    /// foreign threads may run tasks on this worker's behalf when its
    /// queue overflows.
    predictor: Mutex<RuntimePredictor>,

    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Worker {
    pub(crate) fn new(id: usize, pool: Weak<WorkerPool>, cfg: &RuntimeConfig) -> Self {
        Worker {
            id,
            pool,
            alive: AtomicBool::new(true),
            queue: WorkQueue::new(),
            max_queue_length: cfg.max_queue_length,
            predictor: Mutex::new(RuntimePredictor::new()),
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn pool(&self) -> Option<Arc<WorkerPool>> {
        self.pool.upgrade()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn poison(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub(crate) fn start_thread(self: &Arc<Self>) {
        let worker = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("treeture-worker-{}", self.id))
            .spawn(move || worker.run())
            .expect("failed to spawn worker thread");
        *self.thread.lock() = Some(handle);
    }

    pub(crate) fn join(&self) -> thread::Result<()> {
        match self.thread.lock().take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    /// The scheduling loop of a non-main worker: step until poisoned,
    /// parking after a long dry stretch.
    fn run(self: &Arc<Self>) {
        context::set_current_worker(self);
        trace::worker_created(self.id);
        affinity::pin_current_thread(self.id);

        while self.is_alive() {
            let mut idle_steps = 0u32;

            while self.is_alive() && !self.schedule_step() {
                idle_steps += 1;
                std::hint::spin_loop();

                if idle_steps > IDLE_STEPS_BEFORE_SLEEP {
                    trace::worker_suspended(self.id);
                    if let Some(pool) = self.pool() {
                        pool.wait_for_work(self);
                    }
                    trace::worker_resumed(self.id);
                    idle_steps = 0;
                }
            }
        }

        trace::worker_destroyed(self.id);
    }

    /// Enqueues a ready task on this worker.
    ///
    /// Single-worker pools execute on the spot, as do overflowing queues;
    /// in the latter case split tasks are exempt, since running one inline
    /// requires its children to get through this very thread while the
    /// queue is already backed up.
    pub(crate) fn schedule(&self, task: TaskHandle) {
        assert!(task.is_ready(), "scheduled task has unfinished dependencies");

        let single_worker = self.pool().is_none_or(|p| p.num_workers() == 1);

        if single_worker || (self.queue.len() > self.max_queue_length && !task.is_split()) {
            self.run_task(&task);
            return;
        }

        self.queue.push_back(task);

        if self.queue.len() > self.max_queue_length / 2 {
            if let Some(pool) = self.pool() {
                pool.work_available();
            }
        }
    }

    /// Makes one unit of progress: own queue first, then a random steal.
    /// Returns whether a task was processed.
    pub(crate) fn schedule_step(&self) -> bool {
        if let Some(task) = self.queue.pop_front() {
            // An underfed queue is the signal to refine coarse tasks.
            if self.queue.len() < self.max_queue_length * 3 / 4 {
                self.split_task(&task);
            }
            self.run_task(&task);
            return true;
        }

        let Some(pool) = self.pool() else {
            return false;
        };

        let num_workers = pool.num_workers();
        if num_workers <= 1 {
            return false;
        }

        let victim = loop {
            let candidate = fastrand::usize(..num_workers);
            if candidate != self.id {
                break candidate;
            }
        };

        if let Some(task) = pool.worker(victim).queue.pop_back() {
            trace::task_stolen(task.id());

            #[cfg(test)]
            crate::runtime::tracker::record(crate::runtime::tracker::Method::Steal, self.id, task.id());

            // The victim's queue was not enough to feed it and us; refine.
            self.split_task(&task);
            self.run_task(&task);
            return true;
        }

        std::hint::spin_loop();
        false
    }

    /// Splits a dequeued task if it is worth it: top-level tasks always,
    /// deeper ones only when the predictor expects them to run long.
    fn split_task(&self, task: &TaskHandle) {
        if !task.is_splitable() {
            return;
        }

        if task.depth() == 0 || self.estimate_runtime(task) > SPLIT_TIME_THRESHOLD {
            #[cfg(test)]
            crate::runtime::tracker::record(crate::runtime::tracker::Method::Split, self.id, task.id());

            task.split();
        }
    }

    fn estimate_runtime(&self, task: &TaskHandle) -> Duration {
        self.predictor.lock().predict(task.depth())
    }

    /// Feeds a synthetic run-time sample into this worker's predictor.
    #[cfg(test)]
    pub(crate) fn train_predictor(&self, depth: u32, time: Duration) {
        self.predictor.lock().record(depth, time);
    }

    /// Runs a task, sampling the run time of profiled leaves into the
    /// predictor.
    pub(crate) fn run_task(&self, task: &TaskHandle) {
        // Splitting may leave behind an already-done substitute.
        if task.is_done() {
            return;
        }

        #[cfg(test)]
        crate::runtime::tracker::record(crate::runtime::tracker::Method::Run, self.id, task.id());

        if task.is_split() {
            task.run();
            return;
        }

        trace::task_started(task.id());

        let depth = task.depth();
        if depth == 0 {
            // Top-level tasks (and orphans) are not sampled.
            task.run();
        } else {
            let start = Instant::now();
            task.run();
            self.predictor.lock().record(depth, start.elapsed());
        }

        trace::task_ended(task.id());
    }

    pub(crate) fn dump_state(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "Worker {}:", self.id)?;
        writeln!(out, "\tQueue:")?;
        for task in self.queue.snapshot() {
            writeln!(out, "\t\t{task}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("queue_len", &self.queue.len())
            .finish()
    }
}
