//! Bounded work-stealing pool for per-agent tasks
//!
//! A fixed set of OS threads pull jobs from a global injector, keep a local
//! FIFO deque each, and steal from one another when they run dry. The pool is
//! sized to the available parallelism minus one so the coordinator thread
//! always has a core of its own.
//!
//! # Architecture
//!
//! ```text
//!               run_batch(items) ── one job per item ──┐
//!                                                      ▼
//!                                               [Global Injector]
//!                                                      │
//! Worker 0        Worker 1        Worker 2        Worker 3
//! [Jobs...]       [Jobs...]       [Jobs...]       [Jobs...]
//!    ↓               ↓               ↓               ↓
//!    └───────── Steal ←──────────────┘               │
//!                                   Steal ←──────────┘
//!                                                      │
//!                         (index, result) channel ─────┘ → barrier
//! ```
//!
//! `run_batch` must not be called from inside a pool job: a worker blocked on
//! its own barrier cannot run the jobs it is waiting for.

use crate::utils::errors::{EngineError, Result};
use crossbeam::deque::{Injector, Steal, Stealer, Worker};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A unit of work executed on the pool
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Upper bound on how long an idle worker sleeps before re-checking the queues
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// State shared between the pool handle and its workers
struct Shared {
    /// Global job queue (injector)
    injector: Injector<Job>,

    /// Stealers for each worker's local queue
    stealers: Vec<Stealer<Job>>,

    /// Idle workers park here
    sleep_lock: Mutex<()>,
    wake: Condvar,

    shutdown: AtomicBool,

    /// Jobs submitted but not yet picked up
    queued: AtomicUsize,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl Shared {
    fn notify_one(&self) {
        let _guard = self.sleep_lock.lock();
        self.wake.notify_one();
    }

    fn notify_all(&self) {
        let _guard = self.sleep_lock.lock();
        self.wake.notify_all();
    }
}

/// Fixed-size work-stealing thread pool
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    num_workers: usize,
}

impl WorkerPool {
    /// Create a pool with `num_workers` threads
    pub fn new(num_workers: usize) -> Result<Self> {
        if num_workers == 0 {
            return Err(EngineError::WorkerPoolFailed(
                "Worker pool needs at least one thread".to_string(),
            ));
        }

        let mut workers = Vec::with_capacity(num_workers);
        let mut stealers = Vec::with_capacity(num_workers);

        for _ in 0..num_workers {
            let worker = Worker::new_fifo();
            stealers.push(worker.stealer());
            workers.push(worker);
        }

        let shared = Arc::new(Shared {
            injector: Injector::new(),
            stealers,
            sleep_lock: Mutex::new(()),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let mut handles = Vec::with_capacity(num_workers);
        for (worker_id, local) in workers.into_iter().enumerate() {
            let shared_clone = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("evolab-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, local, shared_clone));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.shutdown.store(true, Ordering::SeqCst);
                    shared.notify_all();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(EngineError::WorkerPoolFailed(format!(
                        "Failed to spawn worker {}: {}",
                        worker_id, e
                    )));
                }
            }
        }

        debug!("Worker pool initialized with {} workers", num_workers);

        Ok(Self {
            shared,
            handles,
            num_workers,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Submit multiple jobs in batch
    fn submit_batch(&self, jobs: Vec<Job>) {
        let count = jobs.len();
        trace!("Submitting batch of {} jobs", count);

        self.shared.queued.fetch_add(count, Ordering::SeqCst);
        for job in jobs {
            self.shared.injector.push(job);
        }

        if count > 0 {
            self.shared.notify_all();
        }
    }

    /// Run `task` once per item on the pool and wait for all of them
    ///
    /// Each item is moved into its own job, so a job has exclusive ownership of
    /// its item for the duration of the call. Results come back in item order.
    /// Returns [`EngineError::TaskLost`] if a job unwinds out of `task`, since
    /// the item it owned cannot be recovered.
    pub fn run_batch<T, R, F>(&self, items: Vec<T>, task: F) -> Result<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> R + Send + Sync + 'static,
    {
        let count = items.len();
        let task = Arc::new(task);
        let (tx, rx) = crossbeam_channel::bounded::<(usize, Option<R>)>(count);

        let jobs: Vec<Job> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let task = Arc::clone(&task);
                let tx = tx.clone();
                Box::new(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*task)(index, item)));
                    // The receiver outlives every job of this batch
                    let _ = tx.send((index, outcome.ok()));
                }) as Job
            })
            .collect();
        drop(tx);

        self.submit_batch(jobs);

        // Barrier: the iterator ends once every job has dropped its sender
        let mut slots: Vec<Option<R>> = (0..count).map(|_| None).collect();
        for (index, result) in rx.iter() {
            if result.is_none() {
                self.shared.panicked.fetch_add(1, Ordering::Relaxed);
                warn!(index, "Worker task unwound before returning its result");
            }
            slots[index] = result;
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or(EngineError::TaskLost { index }))
            .collect()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            num_workers: self.num_workers,
            queued_jobs: self.shared.queued.load(Ordering::SeqCst),
            completed_jobs: self.shared.completed.load(Ordering::Relaxed),
            panicked_jobs: self.shared.panicked.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.notify_all();

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread exited with a panic");
            }
        }
        debug!("Worker pool shut down");
    }
}

fn worker_loop(worker_id: usize, local: Worker<Job>, shared: Arc<Shared>) {
    trace!("Worker {} started", worker_id);

    loop {
        if let Some(job) = find_job(worker_id, &local, &shared) {
            shared.queued.fetch_sub(1, Ordering::SeqCst);
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                shared.panicked.fetch_add(1, Ordering::Relaxed);
                warn!("Worker {} recovered from a panicking job", worker_id);
            }
            shared.completed.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        // Re-check under the lock so a submit between the scan and the wait is not missed
        let mut guard = shared.sleep_lock.lock();
        if shared.queued.load(Ordering::SeqCst) == 0 && !shared.shutdown.load(Ordering::SeqCst) {
            shared.wake.wait_for(&mut guard, IDLE_WAIT);
        }
    }

    trace!("Worker {} stopped", worker_id);
}

/// Next job for a worker: local queue, then the injector, then other workers
fn find_job(worker_id: usize, local: &Worker<Job>, shared: &Shared) -> Option<Job> {
    if let Some(job) = local.pop() {
        return Some(job);
    }

    loop {
        match shared.injector.steal_batch_and_pop(local) {
            Steal::Success(job) => return Some(job),
            Steal::Retry => continue,
            Steal::Empty => {}
        }

        let mut retry = false;
        for (other_id, stealer) in shared.stealers.iter().enumerate() {
            if other_id == worker_id {
                continue;
            }
            match stealer.steal() {
                Steal::Success(job) => {
                    trace!("Worker {} stole a job from worker {}", worker_id, other_id);
                    return Some(job);
                }
                Steal::Retry => retry = true,
                Steal::Empty => {}
            }
        }

        if !retry {
            return None;
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub num_workers: usize,
    pub queued_jobs: usize,
    pub completed_jobs: u64,
    pub panicked_jobs: u64,
}
