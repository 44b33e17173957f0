//! Bounded worker pool for structure checks and recipe searches.
//!
//! Work is submitted from controller ticks and polled for completion on
//! later ticks; nothing in the tick path ever blocks on the pool. A panic
//! inside submitted work is caught at the pool boundary, logged, and marks
//! the task failed -- it never reaches the tick driver and never kills a
//! worker thread.
//!
//! The executor also keeps a rolling average of execution time per
//! submitting entity. Call sites use the average (together with the
//! matched-cell force rule) to decide whether a tick's structure/recipe work
//! should run asynchronously at all.
//!
//! [`TaskExecutor::synchronous`] is the deterministic test double: submitted
//! work runs inline on the calling thread, so tests observe the exact same
//! submit-then-poll protocol without real concurrency.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Identifies the entity a task was submitted for, keying duration stats.
pub type SubmitterKey = u64;

// ---------------------------------------------------------------------------
// Task handle
// ---------------------------------------------------------------------------

struct TaskShared {
    done: AtomicBool,
    failed: AtomicBool,
}

/// Completion handle for a submitted task. Never blocks.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    /// Whether the work has finished, successfully or not.
    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
    }

    /// Whether the work panicked. Only meaningful once `is_done()`.
    pub fn is_failed(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Pool internals
// ---------------------------------------------------------------------------

struct QueuedJob {
    submitter: SubmitterKey,
    work: Box<dyn FnOnce() + Send + 'static>,
    shared: Arc<TaskShared>,
}

type Stats = Arc<Mutex<HashMap<SubmitterKey, Duration>>>;

fn run_job(job: QueuedJob, stats: &Stats) {
    let started = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(job.work));
    record_duration(stats, job.submitter, started.elapsed());

    if let Err(payload) = result {
        job.shared.failed.store(true, Ordering::Release);
        log::warn!(
            "async task for submitter {} panicked: {}",
            job.submitter,
            panic_message(payload.as_ref())
        );
    }
    job.shared.done.store(true, Ordering::Release);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Exponential moving average, weighted 3:1 toward history.
fn record_duration(stats: &Stats, submitter: SubmitterKey, sample: Duration) {
    if let Ok(mut map) = stats.lock() {
        let entry = map.entry(submitter).or_insert(sample);
        let avg = (entry.as_nanos() * 3 + sample.as_nanos()) / 4;
        *entry = Duration::from_nanos(avg as u64);
    }
}

enum Mode {
    Pool {
        sender: Option<mpsc::Sender<QueuedJob>>,
        workers: Vec<JoinHandle<()>>,
    },
    Synchronous,
}

// ---------------------------------------------------------------------------
// TaskExecutor
// ---------------------------------------------------------------------------

/// Shared, process-wide worker pool with bounded concurrency.
pub struct TaskExecutor {
    mode: Mode,
    stats: Stats,
}

impl TaskExecutor {
    /// Pool sized to the number of available cores.
    pub fn new() -> Self {
        Self::with_workers(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    /// Pool with a fixed worker count (clamped to at least 1).
    pub fn with_workers(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let stats: Stats = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = mpsc::channel::<QueuedJob>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let receiver = Arc::clone(&receiver);
            let stats = Arc::clone(&stats);
            let handle = std::thread::Builder::new()
                .name(format!("machina-worker-{index}"))
                .spawn(move || {
                    loop {
                        let job = match receiver.lock() {
                            Ok(rx) => rx.recv(),
                            Err(_) => break,
                        };
                        match job {
                            Ok(job) => run_job(job, &stats),
                            Err(_) => break,
                        }
                    }
                })
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        Self {
            mode: Mode::Pool {
                sender: Some(sender),
                workers,
            },
            stats,
        }
    }

    /// Deterministic test double: work runs inline at submission.
    pub fn synchronous() -> Self {
        Self {
            mode: Mode::Synchronous,
            stats: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule `work` on the pool. Returns a handle used to detect
    /// completion without blocking.
    pub fn submit_async(
        &self,
        submitter: SubmitterKey,
        work: impl FnOnce() + Send + 'static,
    ) -> TaskHandle {
        let shared = Arc::new(TaskShared {
            done: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        });
        let handle = TaskHandle {
            shared: Arc::clone(&shared),
        };
        let job = QueuedJob {
            submitter,
            work: Box::new(work),
            shared,
        };

        match &self.mode {
            Mode::Synchronous => run_job(job, &self.stats),
            Mode::Pool { sender, .. } => {
                let Some(sender) = sender else {
                    run_job(job, &self.stats);
                    return handle;
                };
                if let Err(mpsc::SendError(job)) = sender.send(job) {
                    // Workers are gone (shutdown race); degrade to inline.
                    log::warn!("worker pool unavailable, running task inline");
                    run_job(job, &self.stats);
                }
            }
        }
        handle
    }

    /// Rolling average execution time of tasks submitted for this entity.
    pub fn average_duration(&self, submitter: SubmitterKey) -> Duration {
        self.stats
            .lock()
            .ok()
            .and_then(|map| map.get(&submitter).copied())
            .unwrap_or(Duration::ZERO)
    }

    pub fn worker_count(&self) -> usize {
        match &self.mode {
            Mode::Pool { workers, .. } => workers.len(),
            Mode::Synchronous => 0,
        }
    }

    /// Clear duration statistics. Idempotent; in-flight work is unaffected
    /// (stale results are discarded by their consumers, not recalled here).
    pub fn reset(&self) {
        if let Ok(mut map) = self.stats.lock() {
            map.clear();
        }
    }
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        if let Mode::Pool { sender, workers } = &mut self.mode {
            // Closing the channel lets each worker drain and exit.
            drop(sender.take());
            for worker in workers.drain(..) {
                let _ = worker.join();
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
