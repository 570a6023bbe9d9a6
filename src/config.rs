//! Run configuration with documented defaults.
//!
//! Values arrive from the command line (with `IRONLOAD_*` environment
//! fallbacks, see `main.rs`) and are validated here before any client is
//! constructed, so a bad value stops the run before it touches anything.

use crate::error::{PipelineError, Result};
use crate::io::cloud::TableRef;
use crate::io::cloud::helpers::validate_resource_name;
use crate::throttle::FixedDelay;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DEST_PREFIX: &str = "processed_for_bq";
pub const DEFAULT_MAX_BATCHES: usize = 1500;
pub const DEFAULT_UPDATES_PER_WINDOW: u32 = 100;
pub const DEFAULT_WINDOW_SECS: u64 = 10;
pub const DEFAULT_MIN_DELAY_SECS: u64 = 10;
pub const DEFAULT_RETRY_BATCH_SIZE: usize = 50;
pub const DEFAULT_FAILED_LEDGER: &str = "failed_uploads.txt";
pub const DEFAULT_ERROR_LOG: &str = "error-log.log";
pub const DEFAULT_RETRY_FAILED_LEDGER: &str = "retry_failed_uploads.txt";
pub const DEFAULT_RETRY_ERROR_LOG: &str = "retry_error_log.txt";
pub const DEFAULT_LOG_FILE: &str = "ironload.log";
pub const DEFAULT_STORAGE_ROOT: &str = "storage";
pub const DEFAULT_WAREHOUSE_ROOT: &str = "warehouse";
pub const DEFAULT_BUCKET: &str = "crossref";

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory of the filesystem-backed object store.
    pub storage_root: PathBuf,
    /// Root directory of the filesystem-backed warehouse.
    pub warehouse_root: PathBuf,
    pub bucket: String,
    /// Worker pool width; one per logical CPU when `None`.
    pub workers: Option<usize>,
}

impl PipelineConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for an invalid bucket name, a zero
    /// worker count, or a warehouse root inside the bucket directory.
    pub fn validate(&self) -> Result<()> {
        validate_resource_name(&self.bucket)
            .map_err(|e| PipelineError::config(format!("bucket: {}", e.message)))?;
        if self.workers == Some(0) {
            return Err(PipelineError::config("workers must be at least 1"));
        }
        if self
            .warehouse_root
            .starts_with(self.storage_root.join(&self.bucket))
        {
            return Err(PipelineError::config(
                "warehouse root must not live inside the bucket directory",
            ));
        }
        Ok(())
    }
}

/// Warehouse mutation quota: at most `updates_per_window` load jobs per
/// `window`, with a per-job pause of at least `min_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub updates_per_window: u32,
    pub window: Duration,
    pub min_delay: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            updates_per_window: DEFAULT_UPDATES_PER_WINDOW,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            min_delay: Duration::from_secs(DEFAULT_MIN_DELAY_SECS),
        }
    }
}

impl RateLimit {
    /// Per-job delay for a pool of `pool_width` workers.
    #[must_use]
    pub fn throttle(&self, pool_width: usize) -> FixedDelay {
        FixedDelay::for_ceiling(pool_width, self.updates_per_window, self.window, self.min_delay)
    }

    fn validate(&self) -> Result<()> {
        if self.updates_per_window == 0 {
            return Err(PipelineError::config("updates per window must be at least 1"));
        }
        if self.window.is_zero() {
            return Err(PipelineError::config("rate window must be longer than zero"));
        }
        Ok(())
    }
}

/// Settings for the initial load pass.
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub table: TableRef,
    pub schema_path: PathBuf,
    pub object_prefix: String,
    pub max_batches: usize,
    pub rate: RateLimit,
    pub failed_ledger: PathBuf,
    pub error_log: PathBuf,
}

impl LoadSettings {
    /// Settings with every default applied.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if `table` is not a valid identifier.
    pub fn new(table: &str, schema_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            table: parse_table(table)?,
            schema_path: schema_path.into(),
            object_prefix: DEFAULT_DEST_PREFIX.to_string(),
            max_batches: DEFAULT_MAX_BATCHES,
            rate: RateLimit::default(),
            failed_ledger: DEFAULT_FAILED_LEDGER.into(),
            error_log: DEFAULT_ERROR_LOG.into(),
        })
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for a zero batch ceiling, an invalid
    /// rate limit, or identical ledger and error log paths.
    pub fn validate(&self) -> Result<()> {
        if self.max_batches == 0 {
            return Err(PipelineError::config("max batches must be at least 1"));
        }
        self.rate.validate()?;
        distinct_paths(&self.failed_ledger, &self.error_log)
    }
}

/// Settings for a retry pass over a failure ledger.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub table: TableRef,
    pub schema_path: PathBuf,
    pub batch_size: usize,
    pub rate: RateLimit,
    /// Ledger to read.
    pub failed_ledger: PathBuf,
    /// Where this pass writes the URIs that failed again.
    pub retry_failed_ledger: PathBuf,
    pub retry_error_log: PathBuf,
}

impl RetrySettings {
    /// Settings with every default applied.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if `table` is not a valid identifier.
    pub fn new(table: &str, schema_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            table: parse_table(table)?,
            schema_path: schema_path.into(),
            batch_size: DEFAULT_RETRY_BATCH_SIZE,
            rate: RateLimit::default(),
            failed_ledger: DEFAULT_FAILED_LEDGER.into(),
            retry_failed_ledger: DEFAULT_RETRY_FAILED_LEDGER.into(),
            retry_error_log: DEFAULT_RETRY_ERROR_LOG.into(),
        })
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for a zero batch size, an invalid
    /// rate limit, or output paths that collide with each other or with the
    /// ledger being read.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::config("retry batch size must be at least 1"));
        }
        self.rate.validate()?;
        distinct_paths(&self.retry_failed_ledger, &self.retry_error_log)?;
        distinct_paths(&self.failed_ledger, &self.retry_error_log)
    }
}

/// Parse `dataset.table` or `project.dataset.table`.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] for a malformed identifier.
pub fn parse_table(identifier: &str) -> Result<TableRef> {
    let table = TableRef::parse(identifier)
        .map_err(|e| PipelineError::config(format!("table: {}", e.message)))?;
    for part in table
        .project
        .iter()
        .chain([&table.dataset, &table.table])
    {
        validate_resource_name(part)
            .map_err(|e| PipelineError::config(format!("table {identifier}: {}", e.message)))?;
    }
    Ok(table)
}

fn distinct_paths(a: &Path, b: &Path) -> Result<()> {
    if a == b {
        return Err(PipelineError::config(format!(
            "{} is used for two different artifacts",
            a.display()
        )));
    }
    Ok(())
}
