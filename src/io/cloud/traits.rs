//! Core traits for the two external collaborators: object storage and the
//! analytical warehouse.
//!
//! Both interfaces are synchronous. Implementations that wrap async SDKs block
//! internally, which keeps the worker pools in [`crate::runner`] free of any
//! runtime coupling.

use crate::schema::TableSchema;
use std::error::Error;
use std::fmt;
use std::path::Path;

// ============================================================================
// Core Error Type
// ============================================================================

/// Error type for object-store and warehouse operations
#[derive(Debug, Clone)]
pub struct CloudIOError {
    pub message: String,
    pub kind: ErrorKind,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    PermissionDenied,
    NotFound,
    InvalidInput,
    Network,
    Timeout,
    RateLimited,
    /// The warehouse accepted the job but reported it as failed.
    JobFailed,
    InternalError,
}

impl fmt::Display for CloudIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl Error for CloudIOError {}

impl CloudIOError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Map a local I/O error onto the closest cloud error kind.
    pub fn from_io(err: &std::io::Error, message: impl Into<String>) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                ErrorKind::InvalidInput
            }
            _ => ErrorKind::InternalError,
        };
        Self::new(kind, message).with_source(err.to_string())
    }

    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::PermissionDenied | ErrorKind::Authentication
        )
    }
}

pub type CloudResult<T> = Result<T, CloudIOError>;

// ============================================================================
// ObjectIO - Object Storage
// ============================================================================

/// Metadata for an object in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
}

/// Trait for object storage operations
pub trait ObjectIO: Send + Sync {
    /// URI scheme used when objects are referenced by the warehouse
    /// (`gs`, `s3`, `file`, ...).
    fn scheme(&self) -> &str;

    /// List every object whose key starts with `prefix`, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket doesn't exist, permissions are not enough, or the listing fails
    fn list_objects(&self, bucket: &str, prefix: &str) -> CloudResult<Vec<ObjectMetadata>>;

    /// Upload a local file to `bucket/key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the local file is unreadable, permissions are not enough, or the upload fails
    fn upload_file(&self, bucket: &str, key: &str, local_path: &Path) -> CloudResult<()>;

    /// Download an object's bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist, permissions are not enough, or the download fails
    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>>;

    /// The URI other services use to reference `bucket/key`.
    fn object_uri(&self, bucket: &str, key: &str) -> String {
        format!("{}://{}/{}", self.scheme(), bucket, key)
    }
}

// ============================================================================
// WarehouseIO - Analytical Warehouse
// ============================================================================

/// Fully qualified table reference (`[project.]dataset.table`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub project: Option<String>,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    /// Parse `dataset.table` or `project.dataset.table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier has the wrong number of parts or an empty part
    pub fn parse(identifier: &str) -> CloudResult<Self> {
        let parts: Vec<&str> = identifier.split('.').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(CloudIOError::new(
                ErrorKind::InvalidInput,
                format!("Invalid table identifier: {identifier}"),
            ));
        }
        match parts.as_slice() {
            [dataset, table] => Ok(Self {
                project: None,
                dataset: (*dataset).to_string(),
                table: (*table).to_string(),
            }),
            [project, dataset, table] => Ok(Self {
                project: Some((*project).to_string()),
                dataset: (*dataset).to_string(),
                table: (*table).to_string(),
            }),
            _ => Err(CloudIOError::new(
                ErrorKind::InvalidInput,
                format!("Invalid table identifier: {identifier}"),
            )),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(project) = &self.project {
            write!(f, "{project}.")?;
        }
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// Format of the objects a load job reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    NewlineDelimitedJson,
}

/// What a load job does to existing table contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    /// Append rows; never truncate or overwrite.
    Append,
}

/// Settings pinned for every load job of a run.
#[derive(Debug, Clone)]
pub struct LoadJobConfig {
    pub schema: TableSchema,
    pub source_format: SourceFormat,
    pub write_disposition: WriteDisposition,
    /// Fields present in the data but absent from the schema are dropped
    /// instead of failing the job.
    pub ignore_unknown_values: bool,
    /// Never infer the schema from data.
    pub autodetect: bool,
}

impl LoadJobConfig {
    /// The only configuration this pipeline submits: NDJSON, append-only,
    /// explicit schema, unknown fields ignored.
    #[must_use]
    pub fn append_ndjson(schema: TableSchema) -> Self {
        Self {
            schema,
            source_format: SourceFormat::NewlineDelimitedJson,
            write_disposition: WriteDisposition::Append,
            ignore_unknown_values: true,
            autodetect: false,
        }
    }
}

/// Handle to a submitted load job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadJob {
    pub id: String,
}

/// Trait for analytical data warehouse operations
pub trait WarehouseIO: Send + Sync {
    /// Submit an asynchronous job loading `source_uris` into `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be submitted (quota, permissions, invalid input)
    fn start_load(
        &self,
        table: &TableRef,
        source_uris: &[String],
        config: &LoadJobConfig,
    ) -> CloudResult<LoadJob>;

    /// Block until `job` reaches a terminal state. `Ok` means the job succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::JobFailed`] when the warehouse reports the load as failed, or another
    /// kind if the job status cannot be obtained
    fn wait_for_job(&self, job: &LoadJob) -> CloudResult<()>;
}
