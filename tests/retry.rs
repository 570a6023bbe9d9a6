mod common;

use anyhow::Result;
use common::{uris, works_schema, works_table};
use ironload::config::RetrySettings;
use ironload::io::cloud::{FakeWarehouseIO, LoadJobConfig};
use ironload::ledger::{read_failures, write_failures};
use ironload::load::BatchLoadScheduler;
use ironload::retry::{RetryDriver, RetryOutcome};
use ironload::runner::WorkerPool;
use ironload::throttle::NoThrottle;
use std::path::Path;
use std::sync::Arc;

fn driver(warehouse: &FakeWarehouseIO, dir: &Path) -> Result<RetryDriver> {
    let scheduler = BatchLoadScheduler::new(
        Arc::new(warehouse.clone()),
        works_table(),
        LoadJobConfig::append_ndjson(works_schema()),
        WorkerPool::new(Some(3))?,
        Arc::new(NoThrottle),
    );
    let mut settings = RetrySettings::new("crossref.works", dir.join("schema.json"))?;
    settings.failed_ledger = dir.join("failed_uploads.txt");
    settings.retry_failed_ledger = dir.join("retry_failed_uploads.txt");
    settings.retry_error_log = dir.join("retry_error_log.txt");
    settings.validate()?;
    Ok(RetryDriver::new(scheduler, settings))
}

#[test]
fn retries_in_batches_of_fifty() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let all = uris(120);
    write_failures(dir.path().join("failed_uploads.txt"), &all)?;
    let warehouse = FakeWarehouseIO::new();

    let RetryOutcome::Completed { retried, report } = driver(&warehouse, dir.path())?.run()? else {
        panic!("ledger exists");
    };
    assert_eq!(retried, 120);
    assert_eq!(report.batch_size, 50);
    let mut sizes: Vec<usize> = warehouse.completed_loads().iter().map(|l| l.uris.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![20, 50, 50]);
    assert_eq!(
        read_failures(dir.path().join("retry_failed_uploads.txt"))?,
        Some(Vec::new())
    );
    Ok(())
}

#[test]
fn only_the_failing_batch_is_written_again() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let all = uris(120);
    write_failures(dir.path().join("failed_uploads.txt"), &all)?;
    let warehouse = FakeWarehouseIO::new();
    warehouse.fail_loads_containing(&all[75]);

    let RetryOutcome::Completed { report, .. } = driver(&warehouse, dir.path())?.run()? else {
        panic!("ledger exists");
    };
    assert_eq!(report.failed_batches(), 1);
    assert_eq!(
        read_failures(dir.path().join("retry_failed_uploads.txt"))?,
        Some(all[50..100].to_vec())
    );
    let errors = std::fs::read_to_string(dir.path().join("retry_error_log.txt"))?;
    assert_eq!(errors.lines().count(), 1);
    assert!(errors.starts_with(&format!("[{}, ", all[50])));
    Ok(())
}

#[test]
fn retry_output_feeds_the_next_pass() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let all = uris(60);
    write_failures(dir.path().join("failed_uploads.txt"), &all)?;
    let warehouse = FakeWarehouseIO::new();
    warehouse.fail_loads_containing(&all[0]);
    driver(&warehouse, dir.path())?.run()?;

    std::fs::rename(
        dir.path().join("retry_failed_uploads.txt"),
        dir.path().join("failed_uploads.txt"),
    )?;
    warehouse.heal();
    let RetryOutcome::Completed { retried, report } = driver(&warehouse, dir.path())?.run()? else {
        panic!("ledger exists");
    };
    assert_eq!(retried, 50);
    assert_eq!(report.failed_count(), 0);
    assert_eq!(warehouse.loaded_uris(), {
        let mut expected = all.clone();
        expected.sort();
        expected
    });
    Ok(())
}

#[test]
fn missing_ledger_means_nothing_to_retry() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let warehouse = FakeWarehouseIO::new();
    assert_eq!(driver(&warehouse, dir.path())?.run()?, RetryOutcome::NothingToRetry);
    assert_eq!(warehouse.submitted_jobs(), 0);
    assert!(!dir.path().join("retry_failed_uploads.txt").exists());
    Ok(())
}

#[test]
fn empty_ledger_completes_without_jobs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_failures(dir.path().join("failed_uploads.txt"), &[])?;
    let warehouse = FakeWarehouseIO::new();

    let outcome = driver(&warehouse, dir.path())?.run()?;
    assert!(matches!(outcome, RetryOutcome::Completed { retried: 0, .. }));
    assert_eq!(warehouse.submitted_jobs(), 0);
    assert!(dir.path().join("retry_failed_uploads.txt").exists());
    Ok(())
}
