//! Background worker abstraction for deferred loads
//!
//! This module provides the trait and implementations for running the
//! off-thread portion of deferred loaders. The pool is deliberately a
//! single worker: successive jobs execute in strict submission order, so a
//! task's dependency-discovery job can never race its load job, and
//! sibling tasks observe each other's side effects in order.
//!
//! The owner thread never blocks on a job; it polls [`JobHandle::is_done`]
//! and comes back on the next driver iteration.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::anyhow;
use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::descriptor::AssetDescriptor;

/// What a background job produced.
#[derive(Debug)]
pub enum JobYield {
    /// Dependency discovery found these descriptors.
    Dependencies(Vec<AssetDescriptor>),
    /// The off-thread load portion completed.
    OffThreadDone,
    /// The job observed its task's cancel flag and skipped the work.
    Cancelled,
}

/// Result of one background job.
pub type JobOutcome = anyhow::Result<JobYield>;

/// A unit of background work.
pub type Job = Box<dyn FnOnce() -> JobOutcome + Send>;

#[derive(Debug, Default)]
struct JobSlot {
    done: AtomicBool,
    result: Mutex<Option<JobOutcome>>,
}

impl JobSlot {
    fn fill(&self, outcome: JobOutcome) {
        *self.result.lock() = Some(outcome);
        self.done.store(true, Ordering::Release);
    }
}

/// Handle to a submitted job.
///
/// Completion is observed by polling; [`take`](JobHandle::take) consumes
/// the outcome once [`is_done`](JobHandle::is_done) reports true.
#[derive(Debug, Clone)]
pub struct JobHandle {
    slot: Arc<JobSlot>,
}

impl JobHandle {
    fn pending() -> (Self, Arc<JobSlot>) {
        let slot = Arc::new(JobSlot::default());
        (Self { slot: slot.clone() }, slot)
    }

    fn ready(outcome: JobOutcome) -> Self {
        let slot = Arc::new(JobSlot::default());
        slot.fill(outcome);
        Self { slot }
    }

    /// Whether the job has finished. Never blocks.
    pub fn is_done(&self) -> bool {
        self.slot.done.load(Ordering::Acquire)
    }

    /// Consume the outcome of a finished job.
    ///
    /// Returns `None` while the job is still running, or after the outcome
    /// was already taken.
    pub fn take(&self) -> Option<JobOutcome> {
        if !self.is_done() {
            return None;
        }
        self.slot.result.lock().take()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_job(job: Job) -> JobOutcome {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(anyhow!("background job panicked: {}", panic_message(&*payload))),
    }
}

/// Executor for background jobs.
///
/// Implementations must preserve submission order and run at most one job
/// at a time.
pub trait WorkerPool: Send + Sync {
    /// Queue a job for execution.
    fn submit(&self, job: Job) -> JobHandle;

    /// Give the pool a chance to make progress on the calling thread.
    ///
    /// No-op for pools with a real worker thread; the driver loop calls
    /// this once per `update` before touching manager state.
    fn drive(&self) {}

    /// Stop accepting jobs and wait for outstanding work to finish.
    fn shutdown(&self) {}
}

/// Production pool: one spawned worker thread fed by a FIFO channel.
pub struct SingleThreadWorker {
    sender: Mutex<Option<Sender<(Job, Arc<JobSlot>)>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SingleThreadWorker {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<(Job, Arc<JobSlot>)>();
        let handle = thread::Builder::new()
            .name("quiver-asset-worker".to_string())
            .spawn(move || {
                for (job, slot) in rx.iter() {
                    slot.fill(run_job(job));
                }
            })
            .expect("failed to spawn asset worker thread");
        Self {
            sender: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(handle)),
        }
    }
}

impl Default for SingleThreadWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPool for SingleThreadWorker {
    fn submit(&self, job: Job) -> JobHandle {
        let guard = self.sender.lock();
        match guard.as_ref() {
            Some(tx) => {
                let (handle, slot) = JobHandle::pending();
                if tx.send((job, slot.clone())).is_err() {
                    slot.fill(Err(anyhow!("worker pool shut down")));
                }
                handle
            }
            None => JobHandle::ready(Err(anyhow!("worker pool shut down"))),
        }
    }

    fn shutdown(&self) {
        // Dropping the sender closes the channel and ends the worker loop.
        self.sender.lock().take();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SingleThreadWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Test pool: jobs queue up and run one per [`drive`](WorkerPool::drive)
/// call, on the calling thread.
///
/// This makes driver-loop tests fully deterministic: each `update` call
/// executes at most one background job. Jobs run outside the manager's
/// state lock, so they may call back into manager accessors.
#[derive(Default)]
pub struct ManualWorker {
    queue: Mutex<VecDeque<(Job, Arc<JobSlot>)>>,
}

impl ManualWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl WorkerPool for ManualWorker {
    fn submit(&self, job: Job) -> JobHandle {
        let (handle, slot) = JobHandle::pending();
        self.queue.lock().push_back((job, slot));
        handle
    }

    fn drive(&self) {
        // Pop before running: the job may submit follow-up work.
        let next = self.queue.lock().pop_front();
        if let Some((job, slot)) = next {
            slot.fill(run_job(job));
        }
    }
}
