//! Spreadsheet ingestion.
//!
//! Most callers should use [`ingest_workbook`] (from [`unified`]), which reads the first sheet of
//! a workbook and writes it to a SQLite table.
//!
//! The building blocks are available on their own:
//! - [`excel::Sheet`]: header and data rows of a worksheet as text
//! - [`IngestionPipeline`]: header scan, table creation and bounded parallel inserts into any
//!   [`crate::sink::Sink`]
//! - [`IngestProgress`]: progress callbacks (spinner, `tracing`, or your own)

pub mod excel;
pub mod observability;
pub mod pipeline;
pub mod unified;

pub use observability::{
    CompositeProgress, IngestProgress, NoProgress, ProgressBarReporter, TracingProgress,
};
pub use pipeline::{IngestReport, IngestionPipeline, InsertJob};
pub use unified::{database_path_for, ingest_workbook, table_name_for};
