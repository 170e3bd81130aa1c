//! Bounded worker pool for running opaque jobs.
//!
//! [`JobQueue`] runs at most `W` jobs at a time:
//!
//! - every idle worker publishes a private rendezvous slot into a ready pool of capacity `W`
//! - a single dispatcher takes the next submission and hands it to the first ready slot
//! - [`JobQueue::submit`] blocks until the dispatcher accepts the job, so a producer is never more
//!   than one job ahead of the pool
//! - [`JobQueue::stop`] drains: running jobs finish, then every thread exits
//!
//! A failing (or panicking) job does not take the process down. The first failure is kept, further
//! submissions are refused with [`QueueError::Aborted`] and [`JobQueue::stop`] returns
//! [`QueueError::JobFailed`].
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use sheet_ingest::execution::{JobError, JobQueue};
//!
//! let queue = JobQueue::new(4).unwrap();
//! queue.start().unwrap();
//!
//! let done = Arc::new(AtomicUsize::new(0));
//! for _ in 0..10 {
//!     let done = Arc::clone(&done);
//!     queue
//!         .submit(move || -> Result<(), JobError> {
//!             done.fetch_add(1, Ordering::SeqCst);
//!             Ok(())
//!         })
//!         .unwrap();
//! }
//!
//! let metrics = queue.stop().unwrap();
//! assert_eq!(done.load(Ordering::SeqCst), 10);
//! assert!(metrics.max_active_jobs <= 4);
//! ```

mod observer;
mod worker;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use thiserror::Error;

pub use observer::{QueueEvent, QueueMetrics, QueueMetricsSnapshot, QueueObserver, TracingQueueObserver};

use worker::{Slot, Worker};

/// Error type returned by a failing [`Job`].
pub type JobError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A self-contained unit of work.
///
/// Closures `FnOnce() -> Result<(), JobError>` are jobs too.
pub trait Job: Send + 'static {
    fn execute(self: Box<Self>) -> Result<(), JobError>;
}

impl<F> Job for F
where
    F: FnOnce() -> Result<(), JobError> + Send + 'static,
{
    fn execute(self: Box<Self>) -> Result<(), JobError> {
        (*self)()
    }
}

pub(crate) type BoxedJob = Box<dyn Job>;

/// Errors returned by [`JobQueue`].
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job queue needs at least one worker")]
    NoWorkers,

    #[error("job queue has not been started")]
    NotStarted,

    #[error("job queue was already started")]
    AlreadyStarted,

    /// `submit` was called after `stop` was initiated.
    #[error("job queue is stopping; no more jobs are accepted")]
    Stopped,

    #[error("job queue was already stopped")]
    AlreadyStopped,

    /// A previously submitted job failed; the queue refuses further work.
    #[error("a previous job failed; no more jobs are accepted")]
    Aborted,

    /// The first job failure, reported by `stop`.
    #[error("job failed: {0}")]
    JobFailed(#[source] JobError),

    #[error("failed to spawn queue thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("{0} queue thread(s) panicked")]
    ThreadPanicked(usize),
}

/// Lifecycle of a [`JobQueue`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// State shared by the queue handle and its threads.
pub(crate) struct Shared {
    metrics: Arc<QueueMetrics>,
    observer: Option<Arc<dyn QueueObserver>>,
    failed: AtomicBool,
    failure: Mutex<Option<JobError>>,
}

impl Shared {
    fn new(metrics: Arc<QueueMetrics>, observer: Option<Arc<dyn QueueObserver>>) -> Self {
        Self {
            metrics,
            observer,
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    fn emit(&self, event: QueueEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }

    pub(crate) fn execute(&self, worker: usize, job: BoxedJob) {
        self.metrics.on_job_start();
        self.emit(QueueEvent::JobStarted { worker });
        let started = Instant::now();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job.execute())) {
            Ok(result) => result,
            Err(payload) => Err(panic_message(payload.as_ref()).into()),
        };

        match outcome {
            Ok(()) => {
                self.metrics.on_job_end(false);
                self.emit(QueueEvent::JobFinished {
                    worker,
                    elapsed: started.elapsed(),
                });
            }
            Err(err) => {
                self.metrics.on_job_end(true);
                self.emit(QueueEvent::JobFailed {
                    worker,
                    message: err.to_string(),
                });
                self.record_failure(err);
            }
        }
    }

    fn record_failure(&self, err: JobError) {
        let mut slot = lock(&self.failure);
        if slot.is_none() {
            *slot = Some(err);
        }
        self.failed.store(true, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Option<JobError> {
        lock(&self.failure).take()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("job panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("job panicked: {s}")
    } else {
        "job panicked".to_string()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Worker count used when none is configured: the host's available parallelism.
pub fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Dispatcher + fixed worker pool. See the [module docs](self).
pub struct JobQueue {
    workers: usize,
    state: Mutex<QueueState>,
    submit_tx: Sender<BoxedJob>,
    submit_rx: Mutex<Option<Receiver<BoxedJob>>>,
    quit_tx: Mutex<Option<Sender<()>>>,
    dispatcher: Mutex<Option<JoinHandle<Result<(), QueueError>>>>,
    shared: Arc<Shared>,
}

impl JobQueue {
    /// Create a queue with `workers` worker threads. Nothing runs until [`Self::start`].
    pub fn new(workers: usize) -> Result<Self, QueueError> {
        if workers == 0 {
            return Err(QueueError::NoWorkers);
        }
        let (submit_tx, submit_rx) = bounded(0);
        Ok(Self {
            workers,
            state: Mutex::new(QueueState::Created),
            submit_tx,
            submit_rx: Mutex::new(Some(submit_rx)),
            quit_tx: Mutex::new(None),
            dispatcher: Mutex::new(None),
            shared: Arc::new(Shared::new(Arc::new(QueueMetrics::new()), None)),
        })
    }

    /// Attach an observer for queue events. Takes effect for the next [`Self::start`].
    pub fn with_observer(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        let metrics = Arc::clone(&self.shared.metrics);
        self.shared = Arc::new(Shared::new(metrics, Some(observer)));
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn state(&self) -> QueueState {
        *lock(&self.state)
    }

    /// Get a handle to real-time queue metrics.
    pub fn metrics(&self) -> Arc<QueueMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Launch the dispatcher and all workers.
    pub fn start(&self) -> Result<(), QueueError> {
        let mut state = lock(&self.state);
        if *state != QueueState::Created {
            return Err(QueueError::AlreadyStarted);
        }
        let submit_rx = lock(&self.submit_rx)
            .take()
            .ok_or(QueueError::AlreadyStarted)?;

        let (ready_tx, ready_rx) = bounded::<Slot>(self.workers);
        let (worker_quit_tx, worker_quit_rx) = bounded::<()>(0);

        let mut workers = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            match Worker::spawn(
                id,
                ready_tx.clone(),
                worker_quit_rx.clone(),
                Arc::clone(&self.shared),
            ) {
                Ok(w) => workers.push(w),
                Err(err) => {
                    drop(worker_quit_tx);
                    for w in workers {
                        let _ = w.join();
                    }
                    return Err(QueueError::Spawn(err));
                }
            }
        }
        drop(ready_tx);

        let (quit_tx, quit_rx) = bounded::<()>(0);
        let dispatcher = Dispatcher {
            submit_rx,
            ready_rx,
            quit_rx,
            worker_quit: worker_quit_tx,
            workers,
            shared: Arc::clone(&self.shared),
        };
        let handle = thread::Builder::new()
            .name("ingest-dispatcher".to_string())
            .spawn(move || dispatcher.run())
            .map_err(QueueError::Spawn)?;

        *lock(&self.quit_tx) = Some(quit_tx);
        *lock(&self.dispatcher) = Some(handle);
        *state = QueueState::Running;
        drop(state);

        self.shared.emit(QueueEvent::Started {
            workers: self.workers,
        });
        Ok(())
    }

    /// Hand `job` to the pool, blocking until the dispatcher accepts it.
    pub fn submit<J: Job>(&self, job: J) -> Result<(), QueueError> {
        match self.state() {
            QueueState::Created => return Err(QueueError::NotStarted),
            QueueState::Running => {}
            QueueState::Stopping | QueueState::Stopped => return Err(QueueError::Stopped),
        }
        if self.shared.failed.load(Ordering::SeqCst) {
            return Err(QueueError::Aborted);
        }

        let start = Instant::now();
        self.submit_tx
            .send(Box::new(job))
            .map_err(|_| QueueError::Stopped)?;
        let waited = start.elapsed();

        self.shared.metrics.on_submitted(waited);
        if waited > Duration::ZERO {
            self.shared.emit(QueueEvent::SubmitWaited { duration: waited });
        }
        Ok(())
    }

    /// Stop accepting jobs, let in-flight jobs finish and wait for every thread to exit.
    ///
    /// Returns the final metrics, or the first job failure observed during the run.
    pub fn stop(&self) -> Result<QueueMetricsSnapshot, QueueError> {
        {
            let mut state = lock(&self.state);
            match *state {
                QueueState::Created => return Err(QueueError::NotStarted),
                QueueState::Stopping | QueueState::Stopped => return Err(QueueError::AlreadyStopped),
                QueueState::Running => *state = QueueState::Stopping,
            }
        }
        self.shared.emit(QueueEvent::Stopping);

        drop(lock(&self.quit_tx).take());
        let handle = lock(&self.dispatcher).take();
        let joined = match handle {
            Some(handle) => handle.join().unwrap_or(Err(QueueError::ThreadPanicked(1))),
            None => Ok(()),
        };

        *lock(&self.state) = QueueState::Stopped;
        let metrics = self.shared.metrics.snapshot();
        self.shared.emit(QueueEvent::Stopped {
            metrics: metrics.clone(),
        });

        joined?;
        match self.shared.take_failure() {
            Some(err) => Err(QueueError::JobFailed(err)),
            None => Ok(metrics),
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        if self.state() == QueueState::Running {
            let _ = self.stop();
        }
    }
}

struct Dispatcher {
    submit_rx: Receiver<BoxedJob>,
    ready_rx: Receiver<Slot>,
    quit_rx: Receiver<()>,
    worker_quit: Sender<()>,
    workers: Vec<Worker>,
    shared: Arc<Shared>,
}

impl Dispatcher {
    fn run(self) -> Result<(), QueueError> {
        let Dispatcher {
            submit_rx,
            ready_rx,
            quit_rx,
            worker_quit,
            workers,
            shared,
        } = self;

        loop {
            select! {
                recv(submit_rx) -> job => {
                    let Ok(job) = job else { break };
                    if !hand_off(&ready_rx, job) {
                        shared.record_failure("no worker left to run submitted job".into());
                        break;
                    }
                }
                recv(quit_rx) -> _ => break,
            }
        }

        // Wake blocked submitters, then release the workers.
        drop(submit_rx);
        drop(worker_quit);

        let panicked = workers
            .into_iter()
            .map(Worker::join)
            .filter(Result::is_err)
            .count();
        if panicked > 0 {
            Err(QueueError::ThreadPanicked(panicked))
        } else {
            Ok(())
        }
    }
}

// The slot send is a rendezvous: it returns once the worker holds the job.
fn hand_off(ready_rx: &Receiver<Slot>, mut job: BoxedJob) -> bool {
    while let Ok(slot) = ready_rx.recv() {
        match slot.send(job) {
            Ok(()) => return true,
            Err(returned) => job = returned.into_inner(),
        }
    }
    false
}
