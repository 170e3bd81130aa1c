use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{error, info, warn};

use crate::error::IngestError;
use crate::types::TableSchema;

use super::pipeline::IngestReport;

/// Observer interface for the progress of one ingestion run.
///
/// Implementors can drive a display, record metrics, or log.
pub trait IngestProgress: Send + Sync {
    /// Called once the target table exists, before the first row is read.
    fn on_started(&self, _table: &TableSchema) {}

    /// Called after each accepted row with the running total of submitted rows.
    fn on_row_submitted(&self, _total: u64) {}

    /// Called when a row is skipped under [`crate::config::OverflowPolicy::Skip`].
    fn on_row_skipped(&self, _row: usize, _error: &IngestError) {}

    /// Called when every submitted row has been written.
    fn on_finished(&self, _report: &IngestReport) {}

    /// Called when the run fails.
    fn on_failed(&self, _error: &IngestError) {}
}

/// Ignores all progress callbacks.
#[derive(Debug, Default)]
pub struct NoProgress;

impl IngestProgress for NoProgress {}

/// Logs run start, skipped rows and the outcome through `tracing`.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl IngestProgress for TracingProgress {
    fn on_started(&self, table: &TableSchema) {
        info!(table = %table.name, columns = ?table.columns, "ingestion started");
    }

    fn on_row_skipped(&self, row: usize, error: &IngestError) {
        warn!(row, error = %error, "row skipped");
    }

    fn on_finished(&self, report: &IngestReport) {
        info!(
            table = %report.table.name,
            rows = report.rows_submitted,
            skipped = report.rows_skipped,
            elapsed = ?report.elapsed,
            "ingestion finished"
        );
    }

    fn on_failed(&self, error: &IngestError) {
        error!(error = %error, "ingestion failed");
    }
}

/// Spinner with a running row count, drawn on stderr.
pub struct ProgressBarReporter {
    bar: ProgressBar,
}

impl ProgressBarReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} {pos} rows [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("processing");
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl Default for ProgressBarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProgressBarReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressBarReporter")
            .field("position", &self.bar.position())
            .finish()
    }
}

impl IngestProgress for ProgressBarReporter {
    fn on_started(&self, table: &TableSchema) {
        self.bar.set_message(format!("processing {}", table.name));
    }

    fn on_row_submitted(&self, total: u64) {
        self.bar.set_position(total);
    }

    fn on_row_skipped(&self, row: usize, _error: &IngestError) {
        self.bar.println(format!("skipped row {row}: more cells than columns"));
    }

    fn on_finished(&self, report: &IngestReport) {
        self.bar.set_position(report.rows_submitted);
        self.bar.finish_with_message(format!("done {}", report.table.name));
    }

    fn on_failed(&self, _error: &IngestError) {
        self.bar.abandon_with_message("failed");
    }
}

/// Fans out callbacks to a list of progress observers.
#[derive(Default)]
pub struct CompositeProgress {
    observers: Vec<Arc<dyn IngestProgress>>,
}

impl CompositeProgress {
    pub fn new(observers: Vec<Arc<dyn IngestProgress>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeProgress")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestProgress for CompositeProgress {
    fn on_started(&self, table: &TableSchema) {
        for o in &self.observers {
            o.on_started(table);
        }
    }

    fn on_row_submitted(&self, total: u64) {
        for o in &self.observers {
            o.on_row_submitted(total);
        }
    }

    fn on_row_skipped(&self, row: usize, error: &IngestError) {
        for o in &self.observers {
            o.on_row_skipped(row, error);
        }
    }

    fn on_finished(&self, report: &IngestReport) {
        for o in &self.observers {
            o.on_finished(report);
        }
    }

    fn on_failed(&self, error: &IngestError) {
        for o in &self.observers {
            o.on_failed(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    impl IngestProgress for Recording {
        fn on_started(&self, table: &TableSchema) {
            self.calls.lock().unwrap().push(format!("started {}", table.name));
        }

        fn on_row_submitted(&self, total: u64) {
            self.calls.lock().unwrap().push(format!("row {total}"));
        }

        fn on_row_skipped(&self, row: usize, _error: &IngestError) {
            self.calls.lock().unwrap().push(format!("skipped {row}"));
        }

        fn on_failed(&self, _error: &IngestError) {
            self.calls.lock().unwrap().push("failed".to_string());
        }
    }

    #[test]
    fn composite_forwards_every_callback_to_each_observer() {
        let a = Arc::new(Recording::default());
        let b = Arc::new(Recording::default());
        let composite = CompositeProgress::new(vec![a.clone(), b.clone(), Arc::new(NoProgress)]);

        let mismatch = IngestError::SchemaMismatch {
            row: 3,
            cells: 3,
            columns: 2,
        };
        composite.on_started(&TableSchema::new("people", vec!["nama".to_string()]));
        composite.on_row_submitted(1);
        composite.on_row_skipped(3, &mismatch);
        composite.on_failed(&mismatch);

        let expected = vec!["started people", "row 1", "skipped 3", "failed"];
        assert_eq!(*a.calls.lock().unwrap(), expected);
        assert_eq!(*b.calls.lock().unwrap(), expected);
    }

    #[test]
    fn hidden_progress_bar_tracks_submitted_rows() {
        let reporter = ProgressBarReporter::new();
        reporter.bar.set_draw_target(ProgressDrawTarget::hidden());
        reporter.on_row_submitted(42);
        assert_eq!(reporter.bar.position(), 42);
        reporter.on_failed(&IngestError::NoSheets);
        assert!(reporter.bar.is_finished());
    }
}
