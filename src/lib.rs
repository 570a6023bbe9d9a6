//! # ironload
//!
//! An incremental, idempotent pipeline that takes a corpus of gzip-compressed
//! JSON Lines files from local disk into an analytical warehouse table.
//!
//! ## Stages
//!
//! 1. **Transform and upload** ([`upload::UploadOrchestrator`]) - every source
//!    file whose base name is not yet under the destination prefix is streamed
//!    through [`processor::process_file`], which rewrites `date-parts` arrays
//!    into ISO dates ([`transform::transform`]), and the result is uploaded.
//!    Re-running only picks up the files that never made it.
//! 2. **Load** ([`load::BatchLoadScheduler`]) - the uploaded objects are
//!    grouped into at most `max_batches` load jobs, submitted from a bounded
//!    worker pool that pauses after every job to stay under the table's
//!    mutation quota. Failed batches are written to a failure ledger.
//! 3. **Retry** ([`retry::RetryDriver`]) - a ledger is reloaded in small
//!    batches and whatever fails again goes to a new ledger.
//!
//! A corrupt record, a failed upload or a failed load job is counted and
//! logged; only configuration, schema and client construction errors stop a
//! run.
//!
//! ## Collaborators
//!
//! The object store and the warehouse are reached through the
//! [`io::cloud::ObjectIO`] and [`io::cloud::WarehouseIO`] traits. Clients are
//! built once and shared as `Arc<dyn ...>`. In-memory fakes with failure
//! injection live in [`io::cloud::fake`]; filesystem-backed implementations
//! used by the `ironload` binary live in `io::cloud::local` (feature
//! `local-backends`).
//!
//! ## Quick Start
//!
//! ```
//! use ironload::io::cloud::{FakeObjectIO, FakeWarehouseIO, LoadJobConfig, TableRef};
//! use ironload::load::BatchLoadScheduler;
//! use ironload::runner::WorkerPool;
//! use ironload::schema::TableSchema;
//! use ironload::throttle::NoThrottle;
//! use ironload::upload::{UploadOptions, UploadOrchestrator};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let source = tempfile::tempdir()?;
//! let store = Arc::new(FakeObjectIO::with_bucket("corpus"));
//!
//! let uploader = UploadOrchestrator::new(
//!     store.clone(),
//!     "corpus",
//!     WorkerPool::new(Some(2))?,
//!     UploadOptions::default(),
//! );
//! let summary = uploader.run(source.path(), "processed_for_bq")?;
//! assert_eq!(summary.success_count(), 0);
//!
//! let schema: TableSchema = serde_json::from_str(r#"[{"name": "DOI", "type": "STRING"}]"#)?;
//! let loader = BatchLoadScheduler::new(
//!     Arc::new(FakeWarehouseIO::new()),
//!     TableRef::parse("crossref.works")?,
//!     LoadJobConfig::append_ndjson(schema),
//!     WorkerPool::new(Some(2))?,
//!     Arc::new(NoThrottle),
//! );
//! let report = loader.run(store.as_ref(), "corpus", "processed_for_bq", 1500)?;
//! assert_eq!(report.failed_count(), 0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod ledger;
pub mod load;
pub mod logging;
pub mod processor;
pub mod retry;
pub mod runner;
pub mod schema;
pub mod throttle;
pub mod transform;
pub mod upload;

pub use error::{PipelineError, Result};
pub use load::{BatchLoadScheduler, LoadReport};
pub use processor::{FileStats, process_file};
pub use retry::{RetryDriver, RetryOutcome};
pub use transform::transform;
pub use upload::{ProcessOutcome, UploadOrchestrator, UploadSummary};
