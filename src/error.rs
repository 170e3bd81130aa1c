use thiserror::Error;

use crate::execution::QueueError;

/// Convenience result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Error type returned by the ingestion pipeline and its entrypoints.
///
/// Header problems are reported before any table is created. Everything else is fatal to the run
/// except [`IngestError::SchemaMismatch`], whose handling depends on
/// [`crate::config::OverflowPolicy`].
#[derive(Debug, Error)]
pub enum IngestError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The workbook could not be opened or a worksheet could not be read.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// The workbook does not contain any worksheet.
    #[error("workbook has no sheets")]
    NoSheets,

    /// The sheet ends before a row the configuration points at.
    #[error("sheet '{sheet}' has no row {row} ({what})")]
    MissingRow {
        sheet: String,
        row: usize,
        what: &'static str,
    },

    /// A header cell is empty or whitespace only.
    #[error("blank column name at column {column}")]
    BlankColumnName { column: usize },

    /// Two header cells carry exactly the same raw name.
    #[error("column name is not unique: '{name}' (columns {first} and {second})")]
    DuplicateColumnName {
        name: String,
        first: usize,
        second: usize,
    },

    /// A data row has more cells than the header declares.
    #[error("schema mismatch at row {row}: {cells} cells but only {columns} columns declared")]
    SchemaMismatch {
        row: usize,
        cells: usize,
        columns: usize,
    },

    /// The identifier allocator could not produce an id.
    #[error("id allocation failed: {0}")]
    Allocator(#[from] AllocatorError),

    /// The sink rejected a statement.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// The worker pool was misused or a job failed.
    #[error("job queue error: {0}")]
    Queue(#[from] QueueError),

    /// Invalid configuration values.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// The configuration file is not valid JSON for [`crate::config::IngestConfig`].
    #[error("config file error: {0}")]
    ConfigFile(#[from] serde_json::Error),
}

/// Errors produced by an [`crate::ids::IdAllocator`].
#[derive(Debug, Error)]
pub enum AllocatorError {
    /// The time-based generator failed (clock before its epoch, time bits exhausted, ...).
    #[error("flake id generator: {0}")]
    Flake(#[from] sonyflake::Error),

    /// A counter-based allocator ran out of values.
    #[error("id sequence exhausted")]
    Exhausted,
}

/// Errors produced by a [`crate::sink::Sink`] or one of its insert handles.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// SQLite integers are signed; ids above `i64::MAX` cannot be stored.
    #[error("row id {0} does not fit a signed 64-bit column")]
    IdOutOfRange(u64),

    /// The tuple does not match the width of the prepared insert.
    #[error("insert expects {expected} values, tuple has {got}")]
    Arity { expected: usize, got: usize },

    /// A table without columns cannot be created.
    #[error("table '{table}' has no columns")]
    EmptyTable { table: String },
}
