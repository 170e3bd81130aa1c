//! Orchestration of one ingestion run.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{IngestConfig, OverflowPolicy};
use crate::error::{IngestError, IngestResult, SinkError};
use crate::execution::{Job, JobError, JobQueue, QueueError, QueueMetricsSnapshot, QueueObserver};
use crate::ids::IdAllocator;
use crate::schema::{ColumnHeader, HeaderSlot, RowMapper};
use crate::sink::{InsertHandle, Sink};
use crate::types::{InsertionTuple, Row, TableSchema};

use super::observability::{IngestProgress, NoProgress};

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// The relation that was created and filled.
    pub table: TableSchema,
    /// Rows handed to the worker pool (all of them were written).
    pub rows_submitted: u64,
    /// Rows skipped because they were wider than the header.
    pub rows_skipped: u64,
    pub elapsed: Duration,
    pub queue: QueueMetricsSnapshot,
}

/// Writes one [`InsertionTuple`] through a shared insert handle.
pub struct InsertJob<H> {
    handle: Arc<H>,
    tuple: InsertionTuple,
}

impl<H> InsertJob<H> {
    pub fn new(handle: Arc<H>, tuple: InsertionTuple) -> Self {
        Self { handle, tuple }
    }
}

impl<H: InsertHandle + 'static> Job for InsertJob<H> {
    fn execute(self: Box<Self>) -> Result<(), JobError> {
        self.handle.execute(&self.tuple).map_err(Into::into)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RowCounts {
    submitted: u64,
    skipped: u64,
}

/// Header scan → table creation → row streaming → bounded parallel inserts → drain.
///
/// A pipeline serves one sheet: the header is scanned on the first run and reused afterwards.
pub struct IngestionPipeline<S, A> {
    sink: S,
    allocator: A,
    workers: usize,
    on_overflow: OverflowPolicy,
    data_start_row: usize,
    header: HeaderSlot,
    progress: Arc<dyn IngestProgress>,
    queue_observer: Option<Arc<dyn QueueObserver>>,
}

impl<S, A> fmt::Debug for IngestionPipeline<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("workers", &self.workers)
            .field("on_overflow", &self.on_overflow)
            .field("data_start_row", &self.data_start_row)
            .field("header", &self.header.get().map(ColumnHeader::names))
            .field("queue_observer_set", &self.queue_observer.is_some())
            .finish()
    }
}

impl<S: Sink, A: IdAllocator> IngestionPipeline<S, A> {
    pub fn new(sink: S, allocator: A, config: &IngestConfig) -> Self {
        Self {
            sink,
            allocator,
            workers: config.worker_count(),
            on_overflow: config.on_overflow,
            data_start_row: config.data_start_row,
            header: HeaderSlot::new(),
            progress: Arc::new(NoProgress),
            queue_observer: None,
        }
    }

    /// Report progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn IngestProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Use an already scanned header instead of scanning the cells passed to [`Self::run`].
    pub fn with_header(mut self, header: ColumnHeader) -> Self {
        self.header = HeaderSlot::with_header(header);
        self
    }

    /// Attach an observer to the run's worker pool.
    pub fn with_queue_observer(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        self.queue_observer = Some(observer);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The scanned header, once a run has started.
    pub fn header(&self) -> Option<&ColumnHeader> {
        self.header.get()
    }

    /// Ingest `rows` into a new relation `table` whose columns come from `header_cells`.
    ///
    /// Returns only after every submitted row has been written. On failure, rows already written
    /// stay in the sink.
    pub fn run<H, I>(&self, table: &str, header_cells: &[H], rows: I) -> IngestResult<IngestReport>
    where
        H: AsRef<str>,
        I: IntoIterator<Item = Row>,
    {
        let result = self.run_inner(table, header_cells, rows);
        match &result {
            Ok(report) => self.progress.on_finished(report),
            Err(err) => self.progress.on_failed(err),
        }
        result
    }

    fn run_inner<H, I>(&self, table: &str, header_cells: &[H], rows: I) -> IngestResult<IngestReport>
    where
        H: AsRef<str>,
        I: IntoIterator<Item = Row>,
    {
        let started = Instant::now();

        let header = self.header.scan(header_cells)?;
        if header.is_empty() {
            return Err(IngestError::BlankColumnName { column: 1 });
        }

        let schema = TableSchema::new(table, header.names());
        self.sink.create_table(&schema)?;
        let insert = Arc::new(self.sink.prepare_insert(&schema)?);
        info!(table, columns = schema.columns.len(), workers = self.workers, "table created");
        self.progress.on_started(&schema);

        let mut queue = JobQueue::new(self.workers)?;
        if let Some(observer) = &self.queue_observer {
            queue = queue.with_observer(Arc::clone(observer));
        }
        queue.start()?;

        let produced = self.produce(&queue, &RowMapper::new(header), &insert, rows);
        let stopped = queue.stop();

        let (counts, metrics) = match (produced, stopped) {
            (Ok(counts), Ok(metrics)) => (counts, metrics),
            // The failed job explains why submission was refused.
            (Err(IngestError::Queue(QueueError::Aborted)), Err(stop_err)) => {
                return Err(from_queue_error(stop_err));
            }
            (Err(err), stop) => {
                if let Err(stop_err) = stop {
                    warn!(error = %stop_err, "job queue reported an error while draining");
                }
                return Err(err);
            }
            (Ok(_), Err(stop_err)) => return Err(from_queue_error(stop_err)),
        };

        debug!(%metrics, "job queue drained");
        Ok(IngestReport {
            table: schema,
            rows_submitted: counts.submitted,
            rows_skipped: counts.skipped,
            elapsed: started.elapsed(),
            queue: metrics,
        })
    }

    fn produce<H, I>(
        &self,
        queue: &JobQueue,
        mapper: &RowMapper<'_>,
        insert: &Arc<H>,
        rows: I,
    ) -> IngestResult<RowCounts>
    where
        H: InsertHandle + 'static,
        I: IntoIterator<Item = Row>,
    {
        let mut counts = RowCounts::default();
        for (idx, row) in rows.into_iter().enumerate() {
            let row_number = self.data_start_row + idx;
            let id = self.allocator.next_id()?;

            let tuple = match mapper.values(id, &row) {
                Ok(tuple) => tuple,
                Err(overflow) => {
                    let err = IngestError::SchemaMismatch {
                        row: row_number,
                        cells: overflow.cells,
                        columns: overflow.columns,
                    };
                    match self.on_overflow {
                        OverflowPolicy::Abort => return Err(err),
                        OverflowPolicy::Skip => {
                            warn!(
                                row = row_number,
                                cells = overflow.cells,
                                columns = overflow.columns,
                                "skipping row wider than header"
                            );
                            counts.skipped += 1;
                            self.progress.on_row_skipped(row_number, &err);
                            continue;
                        }
                    }
                }
            };

            queue.submit(InsertJob::new(Arc::clone(insert), tuple))?;
            counts.submitted += 1;
            self.progress.on_row_submitted(counts.submitted);
        }
        Ok(counts)
    }
}

/// Unwrap sink failures carried through the queue so callers see [`IngestError::Sink`].
fn from_queue_error(err: QueueError) -> IngestError {
    match err {
        QueueError::JobFailed(source) => match source.downcast::<SinkError>() {
            Ok(sink) => IngestError::Sink(*sink),
            Err(other) => IngestError::Queue(QueueError::JobFailed(other)),
        },
        other => IngestError::Queue(other),
    }
}
