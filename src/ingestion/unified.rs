//! Workbook-to-SQLite entrypoint.
//!
//! [`ingest_workbook`] ties the pieces together for the common case:
//!
//! - the first worksheet of the workbook is read (header row and data rows per [`IngestConfig`])
//! - the target table is named after the file (`data prajab.xlsx` → `data_prajab`)
//! - rows are written to `<file stem>.sqlite` next to the input unless a database is configured

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::execution::TracingQueueObserver;
use crate::ids::FlakeIds;
use crate::schema::ColumnHeader;
use crate::sink::SqliteSink;

use super::excel::Sheet;
use super::observability::IngestProgress;
use super::pipeline::{IngestReport, IngestionPipeline};

/// Table name for a workbook: the file stem with spaces replaced by `_`.
pub fn table_name_for(path: &Path) -> IngestResult<String> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace(' ', "_"))
        .unwrap_or_default();
    if stem.is_empty() {
        return Err(IngestError::Config {
            message: format!("cannot derive a table name from '{}'", path.display()),
        });
    }
    Ok(stem)
}

/// Default output database: the input path with a `.sqlite` extension.
pub fn database_path_for(path: &Path) -> PathBuf {
    path.with_extension("sqlite")
}

/// Ingest the first sheet of the workbook at `path` into a SQLite database.
///
/// Header errors are reported before the database is touched. The header is scanned once and
/// handed to the pipeline.
pub fn ingest_workbook(
    path: impl AsRef<Path>,
    config: &IngestConfig,
    progress: Arc<dyn IngestProgress>,
) -> IngestResult<IngestReport> {
    let path = path.as_ref();
    config.validate()?;
    let table = table_name_for(path)?;

    let sheet = Sheet::open_first(path, config.header_row, config.data_start_row)?;
    let header_cells = sheet.header_cells()?;
    if header_cells.is_empty() {
        return Err(IngestError::BlankColumnName { column: 1 });
    }
    let header = ColumnHeader::from_cells(&header_cells)?;
    let rows = sheet.data_rows()?;

    let database = config
        .database
        .clone()
        .unwrap_or_else(|| database_path_for(path));
    if config.replace_existing {
        match fs::remove_file(&database) {
            Ok(()) => warn!(database = %database.display(), "removed existing database"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        input = %path.display(),
        sheet = sheet.name(),
        table = %table,
        database = %database.display(),
        "ingesting workbook"
    );

    let sink = SqliteSink::open(&database)?;
    let pipeline = IngestionPipeline::new(sink, FlakeIds::new()?, config)
        .with_header(header)
        .with_progress(progress)
        .with_queue_observer(Arc::new(TracingQueueObserver));
    pipeline.run(&table, &header_cells, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::NoProgress;

    #[test]
    fn table_name_replaces_spaces() {
        assert_eq!(
            table_name_for(Path::new("/tmp/data prajab 2024.xlsx")).unwrap(),
            "data_prajab_2024"
        );
        assert_eq!(table_name_for(Path::new("people.xlsx")).unwrap(), "people");
    }

    #[test]
    fn table_name_needs_a_stem() {
        assert!(matches!(
            table_name_for(Path::new("/")),
            Err(IngestError::Config { .. })
        ));
    }

    #[test]
    fn database_sits_next_to_input() {
        assert_eq!(
            database_path_for(Path::new("in/people.xlsx")),
            PathBuf::from("in/people.sqlite")
        );
    }

    #[test]
    fn missing_workbook_fails_before_creating_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("absent.xlsx");
        let err = ingest_workbook(&input, &IngestConfig::default(), Arc::new(NoProgress)).unwrap_err();
        assert!(matches!(err, IngestError::Excel(_) | IngestError::Io(_)));
        assert!(!database_path_for(&input).exists());
    }
}
