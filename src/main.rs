//! sheet-ingest - load the first sheet of a workbook into SQLite

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sheet_ingest::config::{IngestConfig, OverflowPolicy};
use sheet_ingest::ingestion::{
    database_path_for, ingest_workbook, CompositeProgress, IngestProgress, ProgressBarReporter,
    TracingProgress,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sheet-ingest")]
#[command(author, version, about = "Load a spreadsheet into a SQLite table")]
struct Cli {
    /// Workbook to ingest (.xlsx, .xlsm, .xlsb, .xls, .ods)
    input: PathBuf,

    /// JSON configuration file; flags override its values
    #[arg(long = "cfg", value_name = "FILE", env = "SHEET_INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Number of insert workers (default: available parallelism)
    #[arg(short, long)]
    workers: Option<usize>,

    /// 1-based row holding the column names
    #[arg(long)]
    header_row: Option<usize>,

    /// 1-based row of the first data row
    #[arg(long)]
    data_start_row: Option<usize>,

    /// What to do with rows wider than the header
    #[arg(long, value_enum)]
    on_overflow: Option<OverflowArg>,

    /// Output database (default: <input stem>.sqlite next to the input)
    #[arg(short, long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Do not draw the progress spinner
    #[arg(short, long)]
    quiet: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OverflowArg {
    Skip,
    Abort,
}

impl From<OverflowArg> for OverflowPolicy {
    fn from(arg: OverflowArg) -> Self {
        match arg {
            OverflowArg::Skip => OverflowPolicy::Skip,
            OverflowArg::Abort => OverflowPolicy::Abort,
        }
    }
}

impl Cli {
    /// Config file values (or defaults) with command-line flags applied on top.
    fn ingest_config(&self) -> Result<IngestConfig> {
        let mut cfg = match &self.config {
            Some(path) => IngestConfig::from_path(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => IngestConfig::default(),
        };
        if let Some(workers) = self.workers {
            cfg.workers = Some(workers);
        }
        if let Some(row) = self.header_row {
            cfg.header_row = row;
        }
        if let Some(row) = self.data_start_row {
            cfg.data_start_row = row;
        }
        if let Some(policy) = self.on_overflow {
            cfg.on_overflow = policy.into();
        }
        if let Some(database) = &self.database {
            cfg.database = Some(database.clone());
        }
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_for(cli: &Cli) -> Arc<dyn IngestProgress> {
    match (cli.quiet, cli.verbose) {
        (true, _) => Arc::new(TracingProgress),
        (false, false) => Arc::new(ProgressBarReporter::new()),
        (false, true) => Arc::new(CompositeProgress::new(vec![
            Arc::new(ProgressBarReporter::new()),
            Arc::new(TracingProgress),
        ])),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let cfg = cli.ingest_config()?;
    let progress = progress_for(cli);

    let report = ingest_workbook(&cli.input, &cfg, progress)
        .with_context(|| format!("failed to ingest {}", cli.input.display()))?;

    let database = cfg
        .database
        .clone()
        .unwrap_or_else(|| database_path_for(&cli.input));
    info!(queue = %report.queue, "worker pool summary");
    println!(
        "{} rows written to table '{}' in {} ({} skipped, {:.2?})",
        report.rows_submitted,
        report.table.name,
        database.display(),
        report.rows_skipped,
        report.elapsed
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "ingestion failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
