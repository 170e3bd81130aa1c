//! Persistent stores that receive insertion tuples.
//!
//! A [`Sink`] creates the target relation and prepares an [`InsertHandle`]; the handle is shared
//! read-only by every worker of the [`crate::execution::JobQueue`], so it must be safe to execute
//! from several threads at once. How that is achieved (one connection per worker, or a single
//! serialized writer) is up to the sink.

mod sqlite;

use crate::error::SinkError;
use crate::types::{InsertionTuple, TableSchema};

pub use sqlite::{SqliteInsert, SqliteSink};

/// Target store for one ingestion run.
pub trait Sink: Send + Sync {
    type Insert: InsertHandle + 'static;

    /// Create the relation described by `table`.
    fn create_table(&self, table: &TableSchema) -> Result<(), SinkError>;

    /// Prepare an insert of shape `(id, col_1 .. col_N)` into `table`.
    fn prepare_insert(&self, table: &TableSchema) -> Result<Self::Insert, SinkError>;
}

/// A prepared insert bound to one relation.
pub trait InsertHandle: Send + Sync {
    fn execute(&self, tuple: &InsertionTuple) -> Result<(), SinkError>;
}
