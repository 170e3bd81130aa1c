//! Run configuration.
//!
//! [`IngestConfig`] can be built in code (use [`Default`] for common cases) or loaded from a JSON
//! file:
//!
//! ```json
//! {
//!   "header_row": 1,
//!   "data_start_row": 2,
//!   "workers": 8,
//!   "on_overflow": "skip",
//!   "database": "out/people.sqlite"
//! }
//! ```
//!
//! Every field is optional; missing fields keep their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};
use crate::execution::default_workers;

/// What to do with a data row that has more cells than the header has columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Log the row, count it as skipped and continue.
    #[default]
    Skip,
    /// Fail the whole run with [`IngestError::SchemaMismatch`].
    Abort,
}

/// Options controlling one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// 1-based sheet row holding the column names.
    pub header_row: usize,
    /// 1-based sheet row of the first data row; must be after `header_row`.
    pub data_start_row: usize,
    /// Worker count. If `None`, uses the platform's available parallelism.
    pub workers: Option<usize>,
    /// Handling of rows wider than the header.
    pub on_overflow: OverflowPolicy,
    /// Output database. If `None`, `<input stem>.sqlite` next to the input file.
    pub database: Option<PathBuf>,
    /// Delete an existing output database before the run.
    pub replace_existing: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            header_row: 1,
            data_start_row: 2,
            workers: None,
            on_overflow: OverflowPolicy::default(),
            database: None,
            replace_existing: true,
        }
    }
}

impl IngestConfig {
    /// Load a configuration file (JSON).
    pub fn from_path(path: impl AsRef<Path>) -> IngestResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> IngestResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check row offsets and worker count.
    pub fn validate(&self) -> IngestResult<()> {
        if self.header_row < 1 {
            return Err(IngestError::Config {
                message: format!("header_row must be >= 1 (got {})", self.header_row),
            });
        }
        if self.data_start_row <= self.header_row {
            return Err(IngestError::Config {
                message: format!(
                    "data_start_row ({}) must be greater than header_row ({})",
                    self.data_start_row, self.header_row
                ),
            });
        }
        if self.workers == Some(0) {
            return Err(IngestError::Config {
                message: "workers must be > 0 when set".to_string(),
            });
        }
        Ok(())
    }

    /// Effective worker count.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_workers).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = IngestConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.header_row, 1);
        assert_eq!(cfg.data_start_row, 2);
        assert_eq!(cfg.on_overflow, OverflowPolicy::Skip);
        assert!(cfg.worker_count() >= 1);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = IngestConfig::from_json(r#"{ "workers": 3, "on_overflow": "abort" }"#).unwrap();
        assert_eq!(cfg.workers, Some(3));
        assert_eq!(cfg.worker_count(), 3);
        assert_eq!(cfg.on_overflow, OverflowPolicy::Abort);
        assert_eq!(cfg.header_row, 1);
        assert!(cfg.replace_existing);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = IngestConfig::from_json(r#"{ "sheet": "Second" }"#).unwrap_err();
        assert!(matches!(err, IngestError::ConfigFile(_)));
    }

    #[test]
    fn validate_rejects_bad_offsets() {
        let cfg = IngestConfig {
            header_row: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(IngestError::Config { .. })));

        let cfg = IngestConfig {
            header_row: 3,
            data_start_row: 3,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("data_start_row (3)"));

        let cfg = IngestConfig {
            workers: Some(0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.json");
        std::fs::write(&path, r#"{ "header_row": 2, "data_start_row": 4 }"#).unwrap();
        let cfg = IngestConfig::from_path(&path).unwrap();
        assert_eq!((cfg.header_row, cfg.data_start_row), (2, 4));
    }
}
