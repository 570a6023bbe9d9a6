mod common;

use anyhow::Result;
use common::{uris, works_schema, works_table};
use ironload::io::cloud::{FakeObjectIO, FakeWarehouseIO, LoadJobConfig};
use ironload::ledger::read_failures;
use ironload::load::{BatchLoadScheduler, batch_size_for, partition};
use ironload::runner::WorkerPool;
use ironload::throttle::{FixedDelay, NoThrottle, Throttle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn scheduler(warehouse: &FakeWarehouseIO, throttle: Arc<dyn Throttle>) -> Result<BatchLoadScheduler> {
    Ok(BatchLoadScheduler::new(
        Arc::new(warehouse.clone()),
        works_table(),
        LoadJobConfig::append_ndjson(works_schema()),
        WorkerPool::new(Some(4))?,
        throttle,
    ))
}

#[derive(Default)]
struct CountingThrottle {
    pauses: AtomicUsize,
}

impl Throttle for CountingThrottle {
    fn delay(&self) -> Duration {
        Duration::ZERO
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn small_prefix_is_one_file_per_batch() -> Result<()> {
    let all = uris(237);
    let size = batch_size_for(all.len(), 1500);
    assert_eq!(size, 1);
    assert_eq!(partition(&all, size).len(), 237);

    let warehouse = FakeWarehouseIO::new();
    let report = scheduler(&warehouse, Arc::new(NoThrottle))?.load_uris(all.clone(), size);
    assert_eq!(report.batches, 237);
    assert_eq!(report.succeeded_batches, 237);
    assert_eq!(report.failed_count(), 0);
    assert_eq!(warehouse.submitted_jobs(), 237);
    assert_eq!(warehouse.loaded_uris(), all);
    Ok(())
}

#[test]
fn large_prefix_fits_under_the_batch_ceiling() {
    let all = uris(50_000);
    let size = batch_size_for(all.len(), 1500);
    assert_eq!(size, 34);
    let batches = partition(&all, size);
    assert_eq!(batches.len(), 1471);
    assert!(batches.len() <= 1500);
    assert_eq!(batches.last().map(Vec::len), Some(50_000 - 34 * 1470));
}

#[test]
fn run_lists_only_processed_objects() -> Result<()> {
    let store = FakeObjectIO::with_bucket("corpus");
    for i in 0..10 {
        store.put_object("corpus", &format!("processed_for_bq/{i}.jsonl.gz"), b"{}");
    }
    store.put_object("corpus", "processed_for_bq/notes.txt", b"");
    store.put_object("corpus", "elsewhere/9.jsonl.gz", b"{}");
    let warehouse = FakeWarehouseIO::new();

    let report = scheduler(&warehouse, Arc::new(NoThrottle))?.run(&store, "corpus", "processed_for_bq", 3)?;
    assert_eq!(report.total_files, 10);
    assert_eq!(report.batch_size, 4);
    assert_eq!(report.batches, 3);
    assert_eq!(warehouse.loaded_uris().len(), 10);
    assert!(warehouse.loaded_uris().iter().all(|u| u.starts_with("mem://corpus/processed_for_bq/")));
    Ok(())
}

#[test]
fn empty_prefix_submits_nothing() -> Result<()> {
    let store = FakeObjectIO::with_bucket("corpus");
    let warehouse = FakeWarehouseIO::new();
    let report = scheduler(&warehouse, Arc::new(NoThrottle))?.run(&store, "corpus", "processed_for_bq", 1500)?;
    assert_eq!(report.batches, 0);
    assert_eq!(warehouse.submitted_jobs(), 0);
    Ok(())
}

#[test]
fn listing_failure_is_an_error() -> Result<()> {
    let store = FakeObjectIO::new();
    let warehouse = FakeWarehouseIO::new();
    assert!(scheduler(&warehouse, Arc::new(NoThrottle))?.run(&store, "missing", "p", 10).is_err());
    Ok(())
}

#[test]
fn failed_batches_go_to_the_ledger() -> Result<()> {
    let all = uris(30);
    let warehouse = FakeWarehouseIO::new();
    warehouse.fail_loads_containing(&all[12]);
    warehouse.fail_loads_containing(&all[27]);

    let report = scheduler(&warehouse, Arc::new(NoThrottle))?.load_uris(all.clone(), 10);
    assert_eq!(report.batches, 3);
    assert_eq!(report.succeeded_batches, 1);
    assert_eq!(report.failed_batches(), 2);
    let expected: Vec<String> = all[10..30].to_vec();
    assert_eq!(report.failed_uris, expected);
    assert_eq!(warehouse.loaded_uris(), all[..10].to_vec());

    assert!(report.error_lines[0].starts_with(&format!("[{}, ", all[10])));
    assert!(report.error_lines[0].contains("] - JobFailed"));

    let dir = tempfile::tempdir()?;
    let ledger = dir.path().join("failed_uploads.txt");
    let errors = dir.path().join("error-log.log");
    report.persist(&ledger, &errors)?;
    assert_eq!(read_failures(&ledger)?, Some(expected));
    assert_eq!(std::fs::read_to_string(&errors)?.lines().count(), 2);
    Ok(())
}

#[test]
fn rejected_submissions_are_failures_too() -> Result<()> {
    let warehouse = FakeWarehouseIO::new();
    warehouse.reject_submissions();
    let report = scheduler(&warehouse, Arc::new(NoThrottle))?.load_uris(uris(5), 2);
    assert_eq!(report.failed_count(), 5);
    assert!(report.error_lines.iter().all(|l| l.contains("RateLimited")));
    assert_eq!(warehouse.submitted_jobs(), 0);
    Ok(())
}

#[test]
fn throttle_pauses_after_every_job_success_or_failure() -> Result<()> {
    let all = uris(9);
    let warehouse = FakeWarehouseIO::new();
    warehouse.fail_loads_containing(&all[0]);
    let throttle = Arc::new(CountingThrottle::default());

    let report = scheduler(&warehouse, throttle.clone())?.load_uris(all, 3);
    assert_eq!(report.failed_batches(), 1);
    assert_eq!(throttle.pauses.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn fixed_delay_stays_under_the_quota() {
    // 4 workers, 100 updates per 10s: 0.4s per job would do, the floor wins.
    let d = FixedDelay::for_ceiling(4, 100, Duration::from_secs(10), Duration::from_secs(10));
    assert_eq!(d.delay(), Duration::from_secs(10));
    // 250 workers: each must wait 25s to keep 250 jobs per 25s = 10 per second.
    let d = FixedDelay::for_ceiling(250, 100, Duration::from_secs(10), Duration::from_secs(10));
    assert_eq!(d.delay(), Duration::from_secs(25));
}
