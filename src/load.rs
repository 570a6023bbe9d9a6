//! Rate-throttled bulk loading of uploaded objects into a warehouse table.
//!
//! Object URIs are grouped into contiguous batches so that the whole prefix
//! fits in at most `max_batches` load jobs, and each batch becomes one
//! asynchronous warehouse job. Workers pause for the configured [`Throttle`]
//! delay after every job so the pool as a whole stays under the table's
//! mutation quota. A failed batch never stops the others: its URIs go to the
//! report's failure list and its error to the error lines, which
//! [`LoadReport::persist`] writes out for the retry pass.

use crate::error::Result;
use crate::io::cloud::helpers::folder_prefix;
use crate::io::cloud::{LoadJobConfig, ObjectIO, TableRef, WarehouseIO};
use crate::ledger::{format_error_line, write_errors, write_failures};
use crate::runner::WorkerPool;
use crate::throttle::Throttle;
use crate::upload::SOURCE_SUFFIX;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Smallest batch size that fits `total` URIs into at most `max_batches`
/// batches. Zero when there is nothing to load.
///
/// ```
/// use ironload::load::batch_size_for;
///
/// assert_eq!(batch_size_for(237, 1500), 1);
/// assert_eq!(batch_size_for(50_000, 1500), 34);
/// assert_eq!(batch_size_for(0, 1500), 0);
/// ```
#[must_use]
pub fn batch_size_for(total: usize, max_batches: usize) -> usize {
    if total == 0 {
        0
    } else {
        total.div_ceil(max_batches.max(1))
    }
}

/// Split `uris` into contiguous batches of `size`; the last may be smaller.
#[must_use]
pub fn partition(uris: &[String], size: usize) -> Vec<Vec<String>> {
    if size == 0 {
        return Vec::new();
    }
    uris.chunks(size).map(<[String]>::to_vec).collect()
}

/// Result of one load job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Position of the batch in submission order.
    pub index: usize,
    pub batch: Vec<String>,
    pub success: bool,
    pub error: Option<String>,
}

/// Totals for one load pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub batch_size: usize,
    pub batches: usize,
    pub total_files: usize,
    pub succeeded_batches: usize,
    /// URIs of every failed batch, in batch order.
    pub failed_uris: Vec<String>,
    /// One `[uri, ...] - error` line per failed batch, in batch order.
    pub error_lines: Vec<String>,
    pub elapsed: Duration,
}

impl LoadReport {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed_uris.len()
    }

    #[must_use]
    pub fn failed_batches(&self) -> usize {
        self.error_lines.len()
    }

    /// Overwrite the failure ledger and error log with this report's
    /// failures. Both files are written even when nothing failed.
    ///
    /// # Errors
    ///
    /// Returns a ledger error if either file cannot be written.
    pub fn persist(&self, failed_ledger: impl AsRef<Path>, error_log: impl AsRef<Path>) -> Result<()> {
        write_failures(failed_ledger, &self.failed_uris)?;
        write_errors(error_log, &self.error_lines)
    }
}

struct JobContext {
    warehouse: Arc<dyn WarehouseIO>,
    table: TableRef,
    config: LoadJobConfig,
    throttle: Arc<dyn Throttle>,
}

pub struct BatchLoadScheduler {
    ctx: Arc<JobContext>,
    pool: WorkerPool,
}

impl BatchLoadScheduler {
    pub fn new(
        warehouse: Arc<dyn WarehouseIO>,
        table: TableRef,
        config: LoadJobConfig,
        pool: WorkerPool,
        throttle: Arc<dyn Throttle>,
    ) -> Self {
        Self {
            ctx: Arc::new(JobContext {
                warehouse,
                table,
                config,
                throttle,
            }),
            pool,
        }
    }

    #[must_use]
    pub fn pool_width(&self) -> usize {
        self.pool.width()
    }

    /// Load every `*.jsonl.gz` object under `object_prefix` in at most
    /// `max_batches` jobs.
    ///
    /// # Errors
    ///
    /// Returns an error if the objects cannot be listed. Job failures are
    /// reported in the [`LoadReport`], not as errors.
    pub fn run(
        &self,
        store: &dyn ObjectIO,
        bucket: &str,
        object_prefix: &str,
        max_batches: usize,
    ) -> Result<LoadReport> {
        let prefix = folder_prefix(object_prefix);
        let uris: Vec<String> = store
            .list_objects(bucket, &prefix)?
            .into_iter()
            .filter(|o| o.key.ends_with(SOURCE_SUFFIX))
            .map(|o| store.object_uri(bucket, &o.key))
            .collect();

        if uris.is_empty() {
            info!(bucket, prefix = %prefix, "no objects to load");
            return Ok(LoadReport::default());
        }

        let batch_size = batch_size_for(uris.len(), max_batches);
        Ok(self.load_uris(uris, batch_size))
    }

    /// Submit `uris` in contiguous batches of `batch_size`, one load job per
    /// batch, and wait for all of them.
    pub fn load_uris(&self, uris: Vec<String>, batch_size: usize) -> LoadReport {
        let started = Instant::now();
        let total_files = uris.len();
        let batches: Vec<(usize, Vec<String>)> =
            partition(&uris, batch_size).into_iter().enumerate().collect();
        let batch_count = batches.len();

        info!(
            table = %self.ctx.table,
            files = total_files,
            batch_size,
            batches = batch_count,
            workers = self.pool.width(),
            delay_secs = self.ctx.throttle.delay().as_secs_f64(),
            "loading batches"
        );

        let mut outcomes = Vec::with_capacity(batch_count);
        let work_ctx = Arc::clone(&self.ctx);
        let recover_ctx = Arc::clone(&self.ctx);
        self.pool.run(
            batches,
            move |(index, batch): &(usize, Vec<String>)| load_batch(&work_ctx, *index, batch),
            move |(index, batch): &(usize, Vec<String>), message: String| {
                recover_ctx.throttle.pause();
                LoadOutcome {
                    index: *index,
                    batch: batch.clone(),
                    success: false,
                    error: Some(format!("worker panicked: {message}")),
                }
            },
            |outcome: LoadOutcome| {
                outcomes.push(outcome);
                if outcomes.len() % 100 == 0 {
                    info!(done = outcomes.len(), total = batch_count, "load progress");
                }
            },
        );

        outcomes.sort_by_key(|o| o.index);
        let mut report = LoadReport {
            batch_size,
            batches: batch_count,
            total_files,
            ..LoadReport::default()
        };
        for outcome in outcomes {
            if outcome.success {
                report.succeeded_batches += 1;
            } else {
                let error = outcome.error.as_deref().unwrap_or("unknown error");
                report
                    .error_lines
                    .push(format_error_line(&outcome.batch, error));
                report.failed_uris.extend(outcome.batch);
            }
        }
        report.elapsed = started.elapsed();

        info!(
            table = %self.ctx.table,
            succeeded = report.succeeded_batches,
            failed = report.failed_batches(),
            failed_files = report.failed_count(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            "load finished"
        );
        report
    }
}

fn load_batch(ctx: &JobContext, index: usize, batch: &[String]) -> LoadOutcome {
    let result = ctx
        .warehouse
        .start_load(&ctx.table, batch, &ctx.config)
        .and_then(|job| {
            debug!(job = %job.id, batch = index, files = batch.len(), "load job submitted");
            ctx.warehouse.wait_for_job(&job)
        });
    ctx.throttle.pause();

    match result {
        Ok(()) => {
            debug!(batch = index, files = batch.len(), "batch loaded");
            LoadOutcome {
                index,
                batch: batch.to_vec(),
                success: true,
                error: None,
            }
        }
        Err(e) => {
            error!(batch = index, files = batch.len(), error = %e, "batch failed");
            LoadOutcome {
                index,
                batch: batch.to_vec(),
                success: false,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uris(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("mem://b/p/{i}.jsonl.gz")).collect()
    }

    #[test]
    fn batch_sizes() {
        assert_eq!(batch_size_for(237, 1500), 1);
        assert_eq!(batch_size_for(1500, 1500), 1);
        assert_eq!(batch_size_for(1501, 1500), 2);
        assert_eq!(batch_size_for(50_000, 1500), 34);
        assert_eq!(batch_size_for(10, 0), 10);
    }

    #[test]
    fn partition_is_contiguous() {
        let all = uris(120);
        let batches = partition(&all, 50);
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![50, 50, 20]
        );
        assert_eq!(batches.concat(), all);
        assert_eq!(partition(&uris(50_000), 34).len(), 1471);
        assert!(partition(&all, 0).is_empty());
    }
}
