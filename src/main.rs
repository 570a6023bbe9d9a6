//! `ironload` command-line entry point.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ironload::config::{
    DEFAULT_BUCKET, DEFAULT_DEST_PREFIX, DEFAULT_ERROR_LOG, DEFAULT_FAILED_LEDGER,
    DEFAULT_LOG_FILE, DEFAULT_MAX_BATCHES, DEFAULT_MIN_DELAY_SECS, DEFAULT_RETRY_BATCH_SIZE,
    DEFAULT_RETRY_ERROR_LOG, DEFAULT_RETRY_FAILED_LEDGER, DEFAULT_STORAGE_ROOT,
    DEFAULT_UPDATES_PER_WINDOW, DEFAULT_WAREHOUSE_ROOT, DEFAULT_WINDOW_SECS, LoadSettings,
    PipelineConfig, RateLimit, RetrySettings,
};
use ironload::io::cloud::{LoadJobConfig, LocalObjectStore, LocalWarehouse, ObjectIO, WarehouseIO};
use ironload::logging::{LogConfig, LogFormat, LogLevel, init_logging};
use ironload::runner::WorkerPool;
use ironload::schema::TableSchema;
use ironload::upload::{UploadOptions, UploadOrchestrator};
use ironload::{BatchLoadScheduler, PipelineError, RetryDriver, RetryOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Transform, upload and load a compressed JSONL corpus.
#[derive(Parser, Debug)]
#[command(name = "ironload", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory of the object store (one subdirectory per bucket)
    #[arg(long, env = "IRONLOAD_STORAGE_ROOT", default_value = DEFAULT_STORAGE_ROOT, global = true)]
    storage_root: PathBuf,

    /// Root directory of the warehouse tables
    #[arg(long, env = "IRONLOAD_WAREHOUSE_ROOT", default_value = DEFAULT_WAREHOUSE_ROOT, global = true)]
    warehouse_root: PathBuf,

    /// Bucket holding the processed objects
    #[arg(long, env = "IRONLOAD_BUCKET", default_value = DEFAULT_BUCKET, global = true)]
    bucket: String,

    /// Worker threads (defaults to the number of logical CPUs)
    #[arg(long, env = "IRONLOAD_WORKERS", global = true)]
    workers: Option<usize>,

    /// Append-only operational log
    #[arg(long, env = "IRONLOAD_LOG_FILE", default_value = DEFAULT_LOG_FILE, global = true)]
    log_file: PathBuf,

    /// Do not write the operational log file
    #[arg(long, global = true)]
    no_log_file: bool,

    /// trace, debug, info, warn or error
    #[arg(long, env = "IRONLOAD_LOG_LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Log file encoding: text or json
    #[arg(long, env = "IRONLOAD_LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transform local source files and upload the ones not yet uploaded
    Upload(UploadArgs),
    /// Load every uploaded object into the warehouse table
    Load(LoadArgs),
    /// Reload the URIs recorded in a failure ledger
    Retry(RetryArgs),
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// Directory searched recursively for *.jsonl.gz files
    #[arg(long, env = "IRONLOAD_SOURCE_ROOT")]
    source_root: PathBuf,

    /// Key prefix for uploaded objects
    #[arg(long, env = "IRONLOAD_DEST_PREFIX", default_value = DEFAULT_DEST_PREFIX)]
    dest_prefix: String,

    /// Keep processed files whose upload failed in this directory
    #[arg(long, env = "IRONLOAD_RETAIN_FAILED")]
    retain_failed: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RateArgs {
    /// Table mutation operations allowed per window
    #[arg(long, env = "IRONLOAD_UPDATES_PER_WINDOW", default_value_t = DEFAULT_UPDATES_PER_WINDOW)]
    updates_per_window: u32,

    /// Length of the quota window in seconds
    #[arg(long, env = "IRONLOAD_WINDOW_SECS", default_value_t = DEFAULT_WINDOW_SECS)]
    window_secs: u64,

    /// Minimum pause after each load job in seconds
    #[arg(long, env = "IRONLOAD_MIN_DELAY_SECS", default_value_t = DEFAULT_MIN_DELAY_SECS)]
    min_delay_secs: u64,
}

impl RateArgs {
    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            updates_per_window: self.updates_per_window,
            window: Duration::from_secs(self.window_secs),
            min_delay: Duration::from_secs(self.min_delay_secs),
        }
    }
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Key prefix of the objects to load
    #[arg(long, env = "IRONLOAD_OBJECT_PREFIX", default_value = DEFAULT_DEST_PREFIX)]
    object_prefix: String,

    /// Destination table, dataset.table or project.dataset.table
    #[arg(long, env = "IRONLOAD_TABLE")]
    table: String,

    /// JSON schema artifact for the table
    #[arg(long, env = "IRONLOAD_SCHEMA")]
    schema: PathBuf,

    /// Upper bound on the number of load jobs
    #[arg(long, env = "IRONLOAD_MAX_BATCHES", default_value_t = DEFAULT_MAX_BATCHES)]
    max_batches: usize,

    #[command(flatten)]
    rate: RateArgs,

    /// Failure ledger written by this pass
    #[arg(long, default_value = DEFAULT_FAILED_LEDGER)]
    failed_ledger: PathBuf,

    /// Error log written by this pass
    #[arg(long, default_value = DEFAULT_ERROR_LOG)]
    error_log: PathBuf,
}

#[derive(Args, Debug)]
struct RetryArgs {
    /// Destination table, dataset.table or project.dataset.table
    #[arg(long, env = "IRONLOAD_TABLE")]
    table: String,

    /// JSON schema artifact for the table
    #[arg(long, env = "IRONLOAD_SCHEMA")]
    schema: PathBuf,

    /// URIs per retried load job
    #[arg(long, default_value_t = DEFAULT_RETRY_BATCH_SIZE)]
    batch_size: usize,

    #[command(flatten)]
    rate: RateArgs,

    /// Ledger to retry
    #[arg(long, default_value = DEFAULT_FAILED_LEDGER)]
    failed_ledger: PathBuf,

    /// Ledger for URIs that fail again
    #[arg(long, default_value = DEFAULT_RETRY_FAILED_LEDGER)]
    retry_failed_ledger: PathBuf,

    /// Error log for this pass
    #[arg(long, default_value = DEFAULT_RETRY_ERROR_LOG)]
    retry_error_log: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::builder()
        .level(cli.log_level)
        .format(cli.log_format);
    if !cli.no_log_file {
        log_config = log_config.log_file(&cli.log_file);
    }
    let _guard = match init_logging(&log_config.build()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "run aborted");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = PipelineConfig {
        storage_root: cli.storage_root.clone(),
        warehouse_root: cli.warehouse_root.clone(),
        bucket: cli.bucket.clone(),
        workers: cli.workers,
    };
    config.validate()?;

    match &cli.command {
        Command::Upload(args) => upload(&config, args),
        Command::Load(args) => load(&config, args),
        Command::Retry(args) => retry(&config, args),
    }
}

fn object_store(config: &PipelineConfig) -> Result<Arc<dyn ObjectIO>> {
    let store = LocalObjectStore::new(&config.storage_root)
        .map_err(|e| PipelineError::client("object store", e.to_string()))?;
    Ok(Arc::new(store))
}

fn warehouse(config: &PipelineConfig, store: Arc<dyn ObjectIO>) -> Result<Arc<dyn WarehouseIO>> {
    let warehouse = LocalWarehouse::new(&config.warehouse_root, store)
        .map_err(|e| PipelineError::client("warehouse", e.to_string()))?;
    Ok(Arc::new(warehouse))
}

fn upload(config: &PipelineConfig, args: &UploadArgs) -> Result<()> {
    let store = object_store(config)?;
    let pool = WorkerPool::new(config.workers)?;
    let options = UploadOptions {
        retain_failed_dir: args.retain_failed.clone(),
        ..UploadOptions::default()
    };

    let summary = UploadOrchestrator::new(store, config.bucket.clone(), pool, options)
        .run(&args.source_root, &args.dest_prefix)?;
    println!("{summary}");
    Ok(())
}

fn load(config: &PipelineConfig, args: &LoadArgs) -> Result<()> {
    let mut settings = LoadSettings::new(&args.table, &args.schema)?;
    settings.object_prefix.clone_from(&args.object_prefix);
    settings.max_batches = args.max_batches;
    settings.rate = args.rate.rate_limit();
    settings.failed_ledger.clone_from(&args.failed_ledger);
    settings.error_log.clone_from(&args.error_log);
    settings.validate()?;

    let schema = TableSchema::from_file(&settings.schema_path)?;
    let store = object_store(config)?;
    let warehouse = warehouse(config, Arc::clone(&store))?;
    let pool = WorkerPool::new(config.workers)?;
    let throttle = Arc::new(settings.rate.throttle(pool.width()));

    let scheduler = BatchLoadScheduler::new(
        warehouse,
        settings.table.clone(),
        LoadJobConfig::append_ndjson(schema),
        pool,
        throttle,
    );
    let report = scheduler.run(
        store.as_ref(),
        &config.bucket,
        &settings.object_prefix,
        settings.max_batches,
    )?;
    report
        .persist(&settings.failed_ledger, &settings.error_log)
        .context("write failure artifacts")?;

    println!(
        "{} files in {} batches of {}: {} failed ({} files) in {:.1}s",
        report.total_files,
        report.batches,
        report.batch_size,
        report.failed_batches(),
        report.failed_count(),
        report.elapsed.as_secs_f64()
    );
    if report.failed_count() > 0 {
        println!(
            "failed URIs written to {}; retry with `ironload retry`",
            settings.failed_ledger.display()
        );
    }
    Ok(())
}

fn retry(config: &PipelineConfig, args: &RetryArgs) -> Result<()> {
    let mut settings = RetrySettings::new(&args.table, &args.schema)?;
    settings.batch_size = args.batch_size;
    settings.rate = args.rate.rate_limit();
    settings.failed_ledger.clone_from(&args.failed_ledger);
    settings.retry_failed_ledger.clone_from(&args.retry_failed_ledger);
    settings.retry_error_log.clone_from(&args.retry_error_log);
    settings.validate()?;

    let schema = TableSchema::from_file(&settings.schema_path)?;
    let store = object_store(config)?;
    let warehouse = warehouse(config, store)?;
    let pool = WorkerPool::new(config.workers)?;
    let throttle = Arc::new(settings.rate.throttle(pool.width()));
    let scheduler = BatchLoadScheduler::new(
        warehouse,
        settings.table.clone(),
        LoadJobConfig::append_ndjson(schema),
        pool,
        throttle,
    );

    let ledger = settings.failed_ledger.clone();
    match RetryDriver::new(scheduler, settings).run()? {
        RetryOutcome::NothingToRetry => {
            println!("{} not found; nothing to retry", ledger.display());
        }
        RetryOutcome::Completed { retried, report } => {
            println!(
                "retried {retried} files in {} batches: {} still failing",
                report.batches,
                report.failed_count()
            );
        }
    }
    Ok(())
}
