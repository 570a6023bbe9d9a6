//! Retry pass over a failure ledger.
//!
//! A pass reads the URIs of previously failed batches, reloads them in small
//! fixed-size batches through the same [`BatchLoadScheduler`] as the initial
//! load, and writes whatever fails again to a new ledger and error log. The
//! new ledger can be fed to the next pass.

use crate::config::RetrySettings;
use crate::error::Result;
use crate::ledger::read_failures;
use crate::load::{BatchLoadScheduler, LoadReport};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The ledger file does not exist.
    NothingToRetry,
    Completed { retried: usize, report: LoadReport },
}

pub struct RetryDriver {
    scheduler: BatchLoadScheduler,
    settings: RetrySettings,
}

impl RetryDriver {
    #[must_use]
    pub fn new(scheduler: BatchLoadScheduler, settings: RetrySettings) -> Self {
        Self {
            scheduler,
            settings,
        }
    }

    /// Retry every URI in the configured failure ledger.
    ///
    /// # Errors
    ///
    /// Returns a ledger error if the input ledger exists but cannot be read,
    /// or if the new ledger or error log cannot be written.
    pub fn run(&self) -> Result<RetryOutcome> {
        let Some(uris) = read_failures(&self.settings.failed_ledger)? else {
            info!(
                ledger = %self.settings.failed_ledger.display(),
                "no failure ledger; nothing to retry"
            );
            return Ok(RetryOutcome::NothingToRetry);
        };

        let retried = uris.len();
        let report = if uris.is_empty() {
            info!(ledger = %self.settings.failed_ledger.display(), "failure ledger is empty");
            LoadReport {
                batch_size: self.settings.batch_size,
                ..LoadReport::default()
            }
        } else {
            info!(
                files = retried,
                batch_size = self.settings.batch_size,
                "retrying failed loads"
            );
            self.scheduler.load_uris(uris, self.settings.batch_size)
        };

        report.persist(
            &self.settings.retry_failed_ledger,
            &self.settings.retry_error_log,
        )?;
        info!(
            retried,
            still_failing = report.failed_count(),
            ledger = %self.settings.retry_failed_ledger.display(),
            "retry pass finished"
        );
        Ok(RetryOutcome::Completed { retried, report })
    }
}
