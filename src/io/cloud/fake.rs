//! Fake implementations for testing.
//!
//! These implementations use in-memory data structures to simulate the object
//! store and the warehouse, and expose hooks for injecting the failures the
//! pipeline has to survive: denied uploads, broken listings, rejected job
//! submissions and failed load jobs.

use crate::io::cloud::traits::{
    CloudIOError, CloudResult, ErrorKind, LoadJob, LoadJobConfig, ObjectIO, ObjectMetadata,
    TableRef, WarehouseIO,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type BucketStorage = Arc<Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>>;

// ============================================================================
// FakeObjectIO
// ============================================================================

#[derive(Clone, Default)]
pub struct FakeObjectIO {
    storage: BucketStorage,
    denied_key_fragments: Arc<Mutex<Vec<String>>>,
    listing_broken: Arc<AtomicBool>,
    uploads: Arc<AtomicUsize>,
}

impl FakeObjectIO {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fake store with one empty bucket.
    #[must_use]
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.create_bucket(bucket);
        store
    }

    /// Creates an empty bucket if it does not exist yet.
    ///
    /// # Panics
    ///
    /// Panics if the mutex protecting the storage is poisoned.
    pub fn create_bucket(&self, bucket: &str) {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .entry(bucket.to_string())
            .or_default();
    }

    /// Stores an object directly, bypassing upload accounting.
    ///
    /// # Panics
    ///
    /// Panics if the mutex protecting the storage is poisoned.
    pub fn put_object(&self, bucket: &str, key: &str, data: &[u8]) {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
    }

    /// Uploads to any key containing `fragment` fail with `PermissionDenied`.
    ///
    /// # Panics
    ///
    /// Panics if the mutex protecting the deny list is poisoned.
    pub fn deny_uploads_matching(&self, fragment: &str) {
        self.denied_key_fragments
            .lock()
            .expect("deny list mutex poisoned")
            .push(fragment.to_string());
    }

    /// Makes every subsequent listing fail with `Network`.
    pub fn break_listing(&self) {
        self.listing_broken.store(true, Ordering::SeqCst);
    }

    /// Number of successful `upload_file` calls.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// All keys in `bucket`, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the mutex protecting the storage is poisoned.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ObjectIO for FakeObjectIO {
    fn scheme(&self) -> &str {
        "mem"
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> CloudResult<Vec<ObjectMetadata>> {
        if self.listing_broken.load(Ordering::SeqCst) {
            return Err(CloudIOError::new(
                ErrorKind::Network,
                format!("listing {bucket}/{prefix} failed"),
            ));
        }
        let storage = self.storage.lock().expect("storage mutex poisoned");
        let objects = storage.get(bucket).ok_or_else(|| {
            CloudIOError::new(ErrorKind::NotFound, format!("Bucket {bucket} not found"))
        })?;

        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, data)| ObjectMetadata {
                key: key.clone(),
                size: data.len() as u64,
            })
            .collect())
    }

    fn upload_file(&self, bucket: &str, key: &str, local_path: &Path) -> CloudResult<()> {
        let denied = self
            .denied_key_fragments
            .lock()
            .expect("deny list mutex poisoned")
            .iter()
            .any(|fragment| key.contains(fragment.as_str()));
        if denied {
            return Err(CloudIOError::new(
                ErrorKind::PermissionDenied,
                format!("write access to {bucket}/{key} denied"),
            ));
        }

        let data = std::fs::read(local_path).map_err(|e| {
            CloudIOError::from_io(&e, format!("read {} for upload", local_path.display()))
        })?;

        let mut storage = self.storage.lock().expect("storage mutex poisoned");
        let objects = storage.get_mut(bucket).ok_or_else(|| {
            CloudIOError::new(ErrorKind::NotFound, format!("Bucket {bucket} not found"))
        })?;
        objects.insert(key.to_string(), data);
        drop(storage);

        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        let storage = self.storage.lock().expect("storage mutex poisoned");
        storage
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| {
                CloudIOError::new(
                    ErrorKind::NotFound,
                    format!("Object {bucket}/{key} not found"),
                )
            })
    }
}

// ============================================================================
// FakeWarehouseIO
// ============================================================================

#[derive(Debug, Clone)]
struct PendingJob {
    table: TableRef,
    uris: Vec<String>,
}

/// One completed load as recorded by [`FakeWarehouseIO`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedLoad {
    pub table: TableRef,
    pub uris: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeWarehouseIO {
    pending: Arc<Mutex<HashMap<String, PendingJob>>>,
    completed: Arc<Mutex<Vec<RecordedLoad>>>,
    failing_uris: Arc<Mutex<HashSet<String>>>,
    reject_submissions: Arc<AtomicBool>,
    next_job: Arc<AtomicUsize>,
    submitted: Arc<AtomicUsize>,
}

impl FakeWarehouseIO {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Any job whose batch contains `uri` finishes as `JobFailed`.
    ///
    /// # Panics
    ///
    /// Panics if the mutex protecting the failure set is poisoned.
    pub fn fail_loads_containing(&self, uri: &str) {
        self.failing_uris
            .lock()
            .expect("failing uris mutex poisoned")
            .insert(uri.to_string());
    }

    /// Clears every injected load failure.
    ///
    /// # Panics
    ///
    /// Panics if the mutex protecting the failure set is poisoned.
    pub fn heal(&self) {
        self.failing_uris
            .lock()
            .expect("failing uris mutex poisoned")
            .clear();
        self.reject_submissions.store(false, Ordering::SeqCst);
    }

    /// Every subsequent `start_load` fails with `RateLimited`.
    pub fn reject_submissions(&self) {
        self.reject_submissions.store(true, Ordering::SeqCst);
    }

    /// Number of jobs accepted by `start_load`.
    #[must_use]
    pub fn submitted_jobs(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Loads that finished successfully, in completion order.
    ///
    /// # Panics
    ///
    /// Panics if the mutex protecting the completed loads is poisoned.
    #[must_use]
    pub fn completed_loads(&self) -> Vec<RecordedLoad> {
        self.completed
            .lock()
            .expect("completed mutex poisoned")
            .clone()
    }

    /// Every URI loaded successfully, sorted.
    #[must_use]
    pub fn loaded_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .completed_loads()
            .into_iter()
            .flat_map(|load| load.uris)
            .collect();
        uris.sort();
        uris
    }
}

impl WarehouseIO for FakeWarehouseIO {
    fn start_load(
        &self,
        table: &TableRef,
        source_uris: &[String],
        _config: &LoadJobConfig,
    ) -> CloudResult<LoadJob> {
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(CloudIOError::new(
                ErrorKind::RateLimited,
                format!("Exceeded rate limits: too many table update operations for {table}"),
            ));
        }
        if source_uris.is_empty() {
            return Err(CloudIOError::new(
                ErrorKind::InvalidInput,
                "load job needs at least one source URI",
            ));
        }

        let id = format!("fake-job-{}", self.next_job.fetch_add(1, Ordering::SeqCst));
        self.pending.lock().expect("pending mutex poisoned").insert(
            id.clone(),
            PendingJob {
                table: table.clone(),
                uris: source_uris.to_vec(),
            },
        );
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(LoadJob { id })
    }

    fn wait_for_job(&self, job: &LoadJob) -> CloudResult<()> {
        let pending = self
            .pending
            .lock()
            .expect("pending mutex poisoned")
            .remove(&job.id)
            .ok_or_else(|| {
                CloudIOError::new(ErrorKind::NotFound, format!("Unknown job {}", job.id))
            })?;

        let failing = self
            .failing_uris
            .lock()
            .expect("failing uris mutex poisoned")
            .iter()
            .find(|uri| pending.uris.contains(*uri))
            .cloned();
        if let Some(uri) = failing {
            return Err(CloudIOError::new(
                ErrorKind::JobFailed,
                format!("Error while reading data, error message: JSON parsing error in {uri}"),
            ));
        }

        self.completed
            .lock()
            .expect("completed mutex poisoned")
            .push(RecordedLoad {
                table: pending.table,
                uris: pending.uris,
            });
        Ok(())
    }
}
