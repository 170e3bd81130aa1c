use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, trace, warn};

/// Lifecycle and job events emitted by the [`super::JobQueue`].
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Started { workers: usize },
    SubmitWaited { duration: Duration },
    JobStarted { worker: usize },
    JobFinished { worker: usize, elapsed: Duration },
    JobFailed { worker: usize, message: String },
    Stopping,
    Stopped { metrics: QueueMetricsSnapshot },
}

/// Observer hook for queue events.
pub trait QueueObserver: Send + Sync {
    fn on_event(&self, event: &QueueEvent);
}

/// Forwards queue events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingQueueObserver;

impl QueueObserver for TracingQueueObserver {
    fn on_event(&self, event: &QueueEvent) {
        match event {
            QueueEvent::Started { workers } => debug!(workers, "job queue started"),
            QueueEvent::SubmitWaited { duration } => trace!(?duration, "submit waited for dispatcher"),
            QueueEvent::JobStarted { worker } => trace!(worker, "job started"),
            QueueEvent::JobFinished { worker, elapsed } => trace!(worker, ?elapsed, "job finished"),
            QueueEvent::JobFailed { worker, message } => warn!(worker, error = %message, "job failed"),
            QueueEvent::Stopping => debug!("job queue stopping"),
            QueueEvent::Stopped { metrics } => debug!(%metrics, "job queue stopped"),
        }
    }
}

/// Real-time counters for one queue.
///
/// Workers and the submitting thread update these while the queue runs; callers can snapshot them
/// at any time.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    jobs_submitted: AtomicU64,
    jobs_started: AtomicU64,
    jobs_finished: AtomicU64,
    jobs_failed: AtomicU64,
    submit_wait_ns: AtomicU64,

    active_jobs: AtomicUsize,
    max_active_jobs: AtomicUsize,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_submitted(&self, waited: Duration) {
        let _ = self.jobs_submitted.fetch_add(1, Ordering::SeqCst);
        let add = waited.as_nanos().min(u64::MAX as u128) as u64;
        let _ = self.submit_wait_ns.fetch_add(add, Ordering::SeqCst);
    }

    pub(crate) fn on_job_start(&self) {
        let _ = self.jobs_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_jobs.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_jobs, now);
    }

    pub(crate) fn on_job_end(&self, failed: bool) {
        if failed {
            let _ = self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        } else {
            let _ = self.jobs_finished.fetch_add(1, Ordering::SeqCst);
        }
        let _ = self.active_jobs.fetch_sub(1, Ordering::SeqCst);
    }

    /// Jobs currently executing.
    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::SeqCst),
            jobs_started: self.jobs_started.load(Ordering::SeqCst),
            jobs_finished: self.jobs_finished.load(Ordering::SeqCst),
            jobs_failed: self.jobs_failed.load(Ordering::SeqCst),
            submit_wait: Duration::from_nanos(self.submit_wait_ns.load(Ordering::SeqCst)),
            max_active_jobs: self.max_active_jobs.load(Ordering::SeqCst),
        }
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    loop {
        let cur = dst.load(Ordering::SeqCst);
        if now <= cur {
            break;
        }
        if dst
            .compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            break;
        }
    }
}

/// Immutable snapshot of [`QueueMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_started: u64,
    pub jobs_finished: u64,
    pub jobs_failed: u64,
    /// Total time submitters spent blocked waiting for the dispatcher.
    pub submit_wait: Duration,
    pub max_active_jobs: usize,
}

impl fmt::Display for QueueMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submitted={}, finished={}/{}, failed={}, max_active_jobs={}, submit_wait={:?}",
            self.jobs_submitted,
            self.jobs_finished,
            self.jobs_started,
            self.jobs_failed,
            self.max_active_jobs,
            self.submit_wait
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tracks_active_high_water_mark() {
        let m = QueueMetrics::new();
        m.on_submitted(Duration::from_millis(3));
        m.on_submitted(Duration::ZERO);
        m.on_job_start();
        m.on_job_start();
        assert_eq!(m.active_jobs(), 2);
        m.on_job_end(false);
        m.on_job_end(true);
        m.on_job_start();
        m.on_job_end(false);

        let snap = m.snapshot();
        assert_eq!(snap.jobs_submitted, 2);
        assert_eq!(snap.jobs_started, 3);
        assert_eq!(snap.jobs_finished, 2);
        assert_eq!(snap.jobs_failed, 1);
        assert_eq!(snap.max_active_jobs, 2);
        assert_eq!(snap.submit_wait, Duration::from_millis(3));
        assert_eq!(m.active_jobs(), 0);
    }
}
