use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::error::SinkError;
use crate::types::{InsertionTuple, TableSchema};

use super::{InsertHandle, Sink};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed [`Sink`].
///
/// A SQLite connection cannot run statements from several threads at once, so all insert handles
/// share one connection behind a mutex and execute a cached prepared statement. Writes are
/// serialized; the worker pool still bounds how much work is in flight.
#[derive(Debug, Clone)]
pub struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSink {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        debug!(path = %path.as_ref().display(), "opened sqlite database");
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, SinkError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the underlying connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, SinkError> {
        let conn = lock(&self.conn);
        Ok(f(&conn)?)
    }
}

impl Sink for SqliteSink {
    type Insert = SqliteInsert;

    fn create_table(&self, table: &TableSchema) -> Result<(), SinkError> {
        if table.columns.is_empty() {
            return Err(SinkError::EmptyTable {
                table: table.name.clone(),
            });
        }
        let sql = table.create_sql();
        debug!(table = %table.name, columns = table.columns.len(), "creating table");
        lock(&self.conn).execute_batch(&sql)?;
        Ok(())
    }

    fn prepare_insert(&self, table: &TableSchema) -> Result<Self::Insert, SinkError> {
        let sql = table.insert_sql();
        // Prepare once up front so a bad statement fails before any job runs.
        lock(&self.conn).prepare_cached(&sql)?;
        Ok(SqliteInsert {
            conn: Arc::clone(&self.conn),
            sql,
            width: table.columns.len() + 1,
        })
    }
}

/// Prepared `INSERT` for one table; cheap to share between workers.
#[derive(Debug)]
pub struct SqliteInsert {
    conn: Arc<Mutex<Connection>>,
    sql: String,
    width: usize,
}

impl SqliteInsert {
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl InsertHandle for SqliteInsert {
    fn execute(&self, tuple: &InsertionTuple) -> Result<(), SinkError> {
        if tuple.width() != self.width {
            return Err(SinkError::Arity {
                expected: self.width,
                got: tuple.width(),
            });
        }
        let id = i64::try_from(tuple.id).map_err(|_| SinkError::IdOutOfRange(tuple.id))?;
        let args = std::iter::once(SqlValue::Integer(id))
            .chain(tuple.values.iter().cloned().map(SqlValue::Text));

        let conn = lock(&self.conn);
        let mut stmt = conn.prepare_cached(&self.sql)?;
        stmt.execute(params_from_iter(args))?;
        Ok(())
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TableSchema {
        TableSchema::new("people", vec!["nama".to_string(), "usia".to_string()])
    }

    #[test]
    fn creates_table_and_inserts_rows() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.create_table(&people()).unwrap();
        let insert = sink.prepare_insert(&people()).unwrap();
        assert_eq!(
            insert.sql(),
            r#"INSERT INTO "people" (id, "nama", "usia") VALUES (?, ?, ?)"#
        );

        insert
            .execute(&InsertionTuple::new(1, vec!["Ann".into(), "30".into()]))
            .unwrap();
        insert
            .execute(&InsertionTuple::new(2, vec!["Bo".into(), "".into()]))
            .unwrap();

        let rows: Vec<(i64, String, String)> = sink
            .with_connection(|c| {
                let mut stmt = c.prepare("SELECT id, nama, usia FROM people ORDER BY id")?;
                let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
                rows.collect()
            })
            .unwrap();
        assert_eq!(
            rows,
            vec![
                (1, "Ann".to_string(), "30".to_string()),
                (2, "Bo".to_string(), "".to_string()),
            ]
        );
    }

    #[test]
    fn duplicate_id_is_a_sink_error() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.create_table(&people()).unwrap();
        let insert = sink.prepare_insert(&people()).unwrap();
        let t = InsertionTuple::new(5, vec!["a".into(), "b".into()]);
        insert.execute(&t).unwrap();
        assert!(matches!(insert.execute(&t), Err(SinkError::Sqlite(_))));
    }

    #[test]
    fn rejects_wrong_arity_and_oversized_ids() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.create_table(&people()).unwrap();
        let insert = sink.prepare_insert(&people()).unwrap();

        let narrow = InsertionTuple::new(1, vec!["a".into()]);
        assert!(matches!(
            insert.execute(&narrow),
            Err(SinkError::Arity { expected: 3, got: 2 })
        ));

        let huge = InsertionTuple::new(u64::MAX, vec!["a".into(), "b".into()]);
        assert!(matches!(insert.execute(&huge), Err(SinkError::IdOutOfRange(u64::MAX))));
    }

    #[test]
    fn table_without_columns_is_rejected() {
        let sink = SqliteSink::open_in_memory().unwrap();
        let err = sink.create_table(&TableSchema::new("empty", Vec::new())).unwrap_err();
        assert!(matches!(err, SinkError::EmptyTable { .. }));
    }

    #[test]
    fn quoted_identifiers_allow_awkward_names() {
        let sink = SqliteSink::open_in_memory().unwrap();
        let table = TableSchema::new("data prajab-2024", vec!["123".to_string(), "select".to_string()]);
        sink.create_table(&table).unwrap();
        let insert = sink.prepare_insert(&table).unwrap();
        insert
            .execute(&InsertionTuple::new(9, vec!["x".into(), "y".into()]))
            .unwrap();
        let n: i64 = sink
            .with_connection(|c| c.query_row("SELECT COUNT(*) FROM \"data prajab-2024\"", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(n, 1);
    }
}
