//! `sheet-ingest` loads the first worksheet of a spreadsheet into a relational table.
//!
//! The header row becomes the column list (normalized to SQL-safe names), every data row becomes
//! one `INSERT` with a generated 63-bit id, and inserts run on a bounded worker pool that applies
//! backpressure to the row reader.
//!
//! The primary entrypoint is [`ingestion::ingest_workbook`]:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sheet_ingest::config::IngestConfig;
//! use sheet_ingest::ingestion::{ingest_workbook, TracingProgress};
//!
//! # fn main() -> Result<(), sheet_ingest::IngestError> {
//! // Writes `people.sqlite` with a table named `people`.
//! let report = ingest_workbook("people.xlsx", &IngestConfig::default(), Arc::new(TracingProgress))?;
//! println!("rows={} skipped={}", report.rows_submitted, report.rows_skipped);
//! # Ok(())
//! # }
//! ```
//!
//! Rows from any source can go through [`ingestion::IngestionPipeline`] directly:
//!
//! ```rust
//! use sheet_ingest::config::IngestConfig;
//! use sheet_ingest::ids::SequentialIds;
//! use sheet_ingest::ingestion::IngestionPipeline;
//! use sheet_ingest::sink::SqliteSink;
//!
//! let sink = SqliteSink::open_in_memory().unwrap();
//! let pipeline = IngestionPipeline::new(sink, SequentialIds::default(), &IngestConfig::default());
//!
//! let rows = vec![
//!     vec!["Ann".to_string(), "30".to_string()],
//!     vec!["Bo".to_string()],
//! ];
//! let report = pipeline.run("people", &["Nama", "Usia"], rows).unwrap();
//! assert_eq!(report.table.columns, vec!["nama", "usia"]);
//! assert_eq!(report.rows_submitted, 2);
//! ```
//!
//! ## Modules
//!
//! - [`schema`]: header normalization and row-to-tuple mapping
//! - [`execution`]: the bounded job queue
//! - [`ingestion`]: worksheet reading, the pipeline and progress reporting
//! - [`sink`]: relational sinks (SQLite)
//! - [`ids`]: row id allocators
//! - [`config`]: run configuration
//! - [`error`]: error types

pub mod config;
pub mod error;
pub mod execution;
pub mod ids;
pub mod ingestion;
pub mod schema;
pub mod sink;
pub mod types;

pub use error::{IngestError, IngestResult};
