//! Dedup-aware processing and upload of a local source tree.
//!
//! A run lists the destination prefix once, builds an index of the base names
//! already present there, and then processes and uploads every source file
//! whose base name is not in the index. Re-running after a crash therefore
//! only touches the files that never reached the object store.
//!
//! The index is a snapshot. Two concurrent runs against the same prefix can
//! both decide a file is missing and upload it twice; the object store keeps
//! the last write and the warehouse load is append-only, so such a race shows
//! up as duplicate rows, not lost ones.

use crate::error::{PipelineError, Result};
use crate::io::cloud::ObjectIO;
use crate::io::cloud::helpers::{folder_prefix, join_key};
use crate::io::glob::{base_name, find_files};
use crate::processor::process_file;
use crate::runner::WorkerPool;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Suffix shared by source files and uploaded objects.
pub const SOURCE_SUFFIX: &str = ".jsonl.gz";

/// One source file scheduled for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    /// File name without [`SOURCE_SUFFIX`]; the dedup key.
    pub base_name: String,
    pub destination_key: String,
}

impl FileTask {
    /// Build a task for `path` found under `source_root`. Returns `None` if the
    /// file is outside the root or its name does not end with
    /// [`SOURCE_SUFFIX`].
    #[must_use]
    pub fn new(source_root: &Path, path: PathBuf, dest_prefix: &str) -> Option<Self> {
        let relative_path = path.strip_prefix(source_root).ok()?.to_path_buf();
        let base = base_name(&path, SOURCE_SUFFIX)?.to_string();
        let relative_key = relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(Self {
            destination_key: join_key(dest_prefix, &relative_key),
            path,
            relative_path,
            base_name: base,
        })
    }
}

/// What happened to one [`FileTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Already present at the destination.
    Skipped { base: String },
    /// The source could not be read or the output could not be written.
    ProcessingFailed { base: String },
    /// Processing produced no documents; nothing was uploaded.
    EmptyResult { base: String },
    /// The upload was rejected. `retained` is where the processed file was
    /// kept, when a retention directory is configured.
    UploadFailed {
        base: String,
        retained: Option<PathBuf>,
    },
    Success { base: String, uri: String },
    /// The task panicked or failed outside the processing path.
    WorkerError { base: String, message: String },
}

impl ProcessOutcome {
    #[must_use]
    pub fn base(&self) -> &str {
        match self {
            Self::Skipped { base }
            | Self::ProcessingFailed { base }
            | Self::EmptyResult { base }
            | Self::UploadFailed { base, .. }
            | Self::Success { base, .. }
            | Self::WorkerError { base, .. } => base,
        }
    }
}

/// Totals for one upload run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub total_files: usize,
    pub skipped: usize,
    pub processing_failed: usize,
    pub empty: usize,
    pub upload_failed: usize,
    pub worker_errors: usize,
    pub success_uris: Vec<String>,
    pub retained: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl UploadSummary {
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.success_uris.len()
    }

    /// Number of tasks that reached an outcome.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.skipped
            + self.processing_failed
            + self.empty
            + self.upload_failed
            + self.worker_errors
            + self.success_count()
    }

    fn record(&mut self, outcome: ProcessOutcome) {
        match outcome {
            ProcessOutcome::Skipped { .. } => self.skipped += 1,
            ProcessOutcome::ProcessingFailed { .. } => self.processing_failed += 1,
            ProcessOutcome::EmptyResult { .. } => self.empty += 1,
            ProcessOutcome::UploadFailed { retained, .. } => {
                self.upload_failed += 1;
                self.retained.extend(retained);
            }
            ProcessOutcome::Success { uri, .. } => self.success_uris.push(uri),
            ProcessOutcome::WorkerError { .. } => self.worker_errors += 1,
        }
    }
}

impl fmt::Display for UploadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} uploaded, {} skipped, {} processing failures, {} empty, {} upload failures, {} worker errors in {:.1}s",
            self.total_files,
            self.success_count(),
            self.skipped,
            self.processing_failed,
            self.empty,
            self.upload_failed,
            self.worker_errors,
            self.elapsed.as_secs_f64()
        )
    }
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Where processed files whose upload failed are moved. Without it they
    /// are discarded with the run's temporary directory.
    pub retain_failed_dir: Option<PathBuf>,
    /// Log progress after this many completed tasks.
    pub progress_every: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            retain_failed_dir: None,
            progress_every: 100,
        }
    }
}

pub struct UploadOrchestrator {
    store: Arc<dyn ObjectIO>,
    bucket: String,
    pool: WorkerPool,
    options: UploadOptions,
}

struct TaskContext {
    store: Arc<dyn ObjectIO>,
    bucket: String,
    index: HashSet<String>,
    temp_root: PathBuf,
    retain_failed_dir: Option<PathBuf>,
}

impl UploadOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectIO>,
        bucket: impl Into<String>,
        pool: WorkerPool,
        options: UploadOptions,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            pool,
            options,
        }
    }

    /// Process and upload every `*.jsonl.gz` file under `source_root` that is
    /// not yet present under `dest_prefix`.
    ///
    /// Per-file failures are counted in the summary and never abort the run.
    /// A missing source root is logged and yields an empty summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary working directory cannot be created
    /// or the source tree cannot be walked.
    pub fn run(&self, source_root: impl AsRef<Path>, dest_prefix: &str) -> Result<UploadSummary> {
        let source_root = source_root.as_ref();
        let started = Instant::now();
        let mut summary = UploadSummary::default();

        if !source_root.is_dir() {
            error!(root = %source_root.display(), "source directory not found");
            return Ok(summary);
        }

        let index = self.existing_base_names(dest_prefix);
        info!(prefix = dest_prefix, existing = index.len(), "built dedup index");

        let files = find_files(source_root, SOURCE_SUFFIX).map_err(|e| {
            PipelineError::Io(std::io::Error::other(format!(
                "walk {}: {e:#}",
                source_root.display()
            )))
        })?;
        let tasks: Vec<FileTask> = files
            .into_iter()
            .filter_map(|file| {
                let task = FileTask::new(source_root, file.path, dest_prefix);
                if task.is_none() {
                    warn!(file = %file.relative.display(), "ignoring file with unusable name");
                }
                task
            })
            .collect();

        summary.total_files = tasks.len();
        if tasks.is_empty() {
            info!(root = %source_root.display(), "no source files found");
            return Ok(summary);
        }
        info!(
            files = tasks.len(),
            workers = self.pool.width(),
            "processing source files"
        );

        let temp_dir = tempfile::Builder::new()
            .prefix("ironload_processed_")
            .tempdir()?;
        let ctx = Arc::new(TaskContext {
            store: Arc::clone(&self.store),
            bucket: self.bucket.clone(),
            index,
            temp_root: temp_dir.path().to_path_buf(),
            retain_failed_dir: self.options.retain_failed_dir.clone(),
        });

        let total = tasks.len();
        let every = self.options.progress_every.max(1);
        self.pool.run(
            tasks,
            move |task: &FileTask| process_task(&ctx, task),
            |task: &FileTask, message: String| {
                error!(file = %task.path.display(), %message, "worker failed");
                ProcessOutcome::WorkerError {
                    base: task.base_name.clone(),
                    message,
                }
            },
            |outcome| {
                summary.record(outcome);
                let done = summary.completed();
                if done % every == 0 || done == total {
                    info!(
                        done,
                        total,
                        uploaded = summary.success_count(),
                        skipped = summary.skipped,
                        "upload progress"
                    );
                }
            },
        );

        summary.elapsed = started.elapsed();
        info!(%summary, "upload finished");
        Ok(summary)
    }

    /// Base names of the objects already under `dest_prefix`. A listing
    /// failure is logged and treated as an empty destination.
    fn existing_base_names(&self, dest_prefix: &str) -> HashSet<String> {
        let prefix = folder_prefix(dest_prefix);
        match self.store.list_objects(&self.bucket, &prefix) {
            Ok(objects) => objects
                .into_iter()
                .filter(|o| o.key != prefix)
                .filter_map(|o| {
                    let name = o.key.rsplit('/').next()?;
                    name.strip_suffix(SOURCE_SUFFIX).map(ToString::to_string)
                })
                .collect(),
            Err(e) => {
                error!(bucket = %self.bucket, prefix = %prefix, error = %e, "listing destination failed; nothing will be skipped");
                HashSet::new()
            }
        }
    }
}

fn process_task(ctx: &TaskContext, task: &FileTask) -> ProcessOutcome {
    let base = task.base_name.clone();
    if ctx.index.contains(&task.base_name) {
        debug!(base = %base, "already uploaded");
        return ProcessOutcome::Skipped { base };
    }

    let output = ctx.temp_root.join(&task.relative_path);
    match process_file(&task.path, &output) {
        Err(e) => {
            warn!(file = %task.path.display(), error = %format!("{e:#}"), "processing failed");
            let _ = fs::remove_file(&output);
            return ProcessOutcome::ProcessingFailed { base };
        }
        Ok(stats) if stats.lines_written == 0 => {
            debug!(file = %task.path.display(), "no documents after processing");
            let _ = fs::remove_file(&output);
            return ProcessOutcome::EmptyResult { base };
        }
        Ok(_) => {}
    }
    if fs::metadata(&output).map(|m| m.len() == 0).unwrap_or(true) {
        let _ = fs::remove_file(&output);
        return ProcessOutcome::EmptyResult { base };
    }

    match ctx
        .store
        .upload_file(&ctx.bucket, &task.destination_key, &output)
    {
        Ok(()) => {
            let _ = fs::remove_file(&output);
            let uri = ctx.store.object_uri(&ctx.bucket, &task.destination_key);
            debug!(%uri, "uploaded");
            ProcessOutcome::Success { base, uri }
        }
        Err(e) => {
            if e.is_permission_denied() {
                error!(key = %task.destination_key, error = %e, "permission denied uploading");
            } else {
                error!(key = %task.destination_key, error = %e, "upload failed");
            }
            let retained = ctx
                .retain_failed_dir
                .as_deref()
                .and_then(|dir| retain(&output, &dir.join(&task.relative_path)));
            ProcessOutcome::UploadFailed { base, retained }
        }
    }
}

/// Move `from` to `to`, copying when a rename is not possible.
fn retain(from: &Path, to: &Path) -> Option<PathBuf> {
    let moved = (|| -> std::io::Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::rename(from, to).is_err() {
            fs::copy(from, to)?;
            fs::remove_file(from)?;
        }
        Ok(())
    })();
    match moved {
        Ok(()) => {
            info!(path = %to.display(), "kept processed file for a later upload");
            Some(to.to_path_buf())
        }
        Err(e) => {
            warn!(from = %from.display(), to = %to.display(), error = %e, "could not keep processed file");
            None
        }
    }
}
