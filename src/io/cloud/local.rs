//! Filesystem-backed object store and warehouse.
//!
//! These back the `ironload` binary when no hosted service is wired in, and
//! they behave like the hosted services where it matters to the pipeline:
//!
//! - [`LocalObjectStore`] keeps each bucket in a directory under a storage
//!   root. Uploads are written to a hidden temporary sibling and renamed into
//!   place, so a listing never observes a half-written object.
//! - [`LocalWarehouse`] runs every load job on its own thread. A job reads its
//!   objects through the injected [`ObjectIO`], validates every row against the
//!   pinned schema, and appends to `<root>/<dataset>/<table>.jsonl` only if
//!   every row of every object passed. A rejected job writes nothing.

use crate::io::cloud::helpers::{split_object_uri, validate_key_path, validate_resource_name};
use crate::io::cloud::traits::{
    CloudIOError, CloudResult, ErrorKind, LoadJob, LoadJobConfig, ObjectIO, ObjectMetadata,
    SourceFormat, TableRef, WarehouseIO,
};
use crate::io::compression::auto_detect_reader;
use crate::io::glob::{SourceFile, find_files_strict};
use crate::schema::{FieldMode, SchemaField};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, info};

const TMP_SUFFIX: &str = ".ironload-tmp";

// ============================================================================
// LocalObjectStore
// ============================================================================

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Open (creating if needed) a storage root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created
    pub fn new(root: impl Into<PathBuf>) -> CloudResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            CloudIOError::from_io(&e, format!("create storage root {}", root.display()))
        })?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> CloudResult<PathBuf> {
        validate_resource_name(bucket)?;
        validate_key_path(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

impl ObjectIO for LocalObjectStore {
    fn scheme(&self) -> &str {
        "file"
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> CloudResult<Vec<ObjectMetadata>> {
        validate_resource_name(bucket)?;
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.is_dir() {
            // Nothing has been uploaded to this bucket yet.
            return Ok(Vec::new());
        }

        let files = find_files_strict(&bucket_dir, "").map_err(|e| {
            CloudIOError::new(ErrorKind::InternalError, format!("list {}", bucket_dir.display()))
                .with_source(format!("{e:#}"))
        })?;

        let mut objects = Vec::new();
        for SourceFile { path, relative } in files {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.ends_with(TMP_SUFFIX) || !key.starts_with(prefix) {
                continue;
            }
            let size = fs::metadata(&path)
                .map_err(|e| CloudIOError::from_io(&e, format!("stat {}", path.display())))?
                .len();
            objects.push(ObjectMetadata { key, size });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn upload_file(&self, bucket: &str, key: &str, local_path: &Path) -> CloudResult<()> {
        let dest = self.object_path(bucket, key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CloudIOError::from_io(&e, format!("mkdir -p {}", parent.display())))?;
        }

        let mut tmp_name = dest.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(TMP_SUFFIX);
        let tmp = dest.with_file_name(tmp_name);

        fs::copy(local_path, &tmp).map_err(|e| {
            CloudIOError::from_io(
                &e,
                format!("copy {} to {}", local_path.display(), tmp.display()),
            )
        })?;
        fs::rename(&tmp, &dest).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CloudIOError::from_io(&e, format!("publish {}", dest.display()))
        })?;
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        fs::read(&path).map_err(|e| CloudIOError::from_io(&e, format!("read {bucket}/{key}")))
    }
}

// ============================================================================
// LocalWarehouse
// ============================================================================

type JobHandle = JoinHandle<CloudResult<usize>>;

pub struct LocalWarehouse {
    root: PathBuf,
    store: Arc<dyn ObjectIO>,
    jobs: Mutex<HashMap<String, JobHandle>>,
    next_job: AtomicUsize,
    append_lock: Arc<Mutex<()>>,
}

impl LocalWarehouse {
    /// Open (creating if needed) a warehouse root that reads source objects
    /// through `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn ObjectIO>) -> CloudResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            CloudIOError::from_io(&e, format!("create warehouse root {}", root.display()))
        })?;
        Ok(Self {
            root,
            store,
            jobs: Mutex::new(HashMap::new()),
            next_job: AtomicUsize::new(0),
            append_lock: Arc::new(Mutex::new(())),
        })
    }

    /// File holding the rows of `table`.
    #[must_use]
    pub fn table_path(&self, table: &TableRef) -> PathBuf {
        table_path(&self.root, table)
    }
}

fn table_path(root: &Path, table: &TableRef) -> PathBuf {
    let mut dir = root.to_path_buf();
    if let Some(project) = &table.project {
        dir.push(project);
    }
    dir.push(&table.dataset);
    dir.join(format!("{}.jsonl", table.table))
}

impl WarehouseIO for LocalWarehouse {
    fn start_load(
        &self,
        table: &TableRef,
        source_uris: &[String],
        config: &LoadJobConfig,
    ) -> CloudResult<LoadJob> {
        if let Some(project) = &table.project {
            validate_resource_name(project)?;
        }
        validate_resource_name(&table.dataset)?;
        validate_resource_name(&table.table)?;
        if source_uris.is_empty() {
            return Err(CloudIOError::new(
                ErrorKind::InvalidInput,
                "load job needs at least one source URI",
            ));
        }
        if config.source_format != SourceFormat::NewlineDelimitedJson || config.autodetect {
            return Err(CloudIOError::new(
                ErrorKind::InvalidInput,
                "only NDJSON loads with an explicit schema are supported",
            ));
        }

        let id = format!("local-job-{}", self.next_job.fetch_add(1, Ordering::SeqCst));
        let job = LocalLoad {
            id: id.clone(),
            target: table_path(&self.root, table),
            uris: source_uris.to_vec(),
            fields: config.schema.fields.clone(),
            ignore_unknown: config.ignore_unknown_values,
            store: Arc::clone(&self.store),
            append_lock: Arc::clone(&self.append_lock),
        };
        let handle = std::thread::Builder::new()
            .name(id.clone())
            .spawn(move || job.run())
            .map_err(|e| CloudIOError::from_io(&e, "spawn load job"))?;

        self.jobs
            .lock()
            .expect("jobs mutex poisoned")
            .insert(id.clone(), handle);
        debug!(job = %id, table = %table, files = source_uris.len(), "load job submitted");
        Ok(LoadJob { id })
    }

    fn wait_for_job(&self, job: &LoadJob) -> CloudResult<()> {
        let handle = self
            .jobs
            .lock()
            .expect("jobs mutex poisoned")
            .remove(&job.id)
            .ok_or_else(|| {
                CloudIOError::new(ErrorKind::NotFound, format!("Unknown job {}", job.id))
            })?;

        let rows = handle.join().map_err(|_| {
            CloudIOError::new(
                ErrorKind::InternalError,
                format!("load job {} crashed", job.id),
            )
        })??;
        info!(job = %job.id, rows, "load job finished");
        Ok(())
    }
}

struct LocalLoad {
    id: String,
    target: PathBuf,
    uris: Vec<String>,
    fields: Vec<SchemaField>,
    ignore_unknown: bool,
    store: Arc<dyn ObjectIO>,
    append_lock: Arc<Mutex<()>>,
}

impl LocalLoad {
    fn run(self) -> CloudResult<usize> {
        let mut rows = Vec::new();
        for uri in &self.uris {
            self.read_object(uri, &mut rows)?;
        }
        self.append(&rows)?;
        Ok(rows.len())
    }

    fn read_object(&self, uri: &str, rows: &mut Vec<Value>) -> CloudResult<()> {
        let (scheme, bucket, key) = split_object_uri(uri)?;
        if scheme != self.store.scheme() {
            return Err(CloudIOError::new(
                ErrorKind::InvalidInput,
                format!("unsupported URI scheme '{scheme}' in {uri}"),
            ));
        }
        let bytes = self.store.get_object(&bucket, &key)?;
        let reader = auto_detect_reader(Cursor::new(bytes), &key).map_err(|e| {
            CloudIOError::new(ErrorKind::JobFailed, format!("cannot decode {uri}"))
                .with_source(e.to_string())
        })?;

        for (idx, line) in BufReader::new(reader).lines().enumerate() {
            let line = line.map_err(|e| {
                CloudIOError::new(ErrorKind::JobFailed, format!("Error while reading {uri}"))
                    .with_source(e.to_string())
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line).map_err(|e| {
                CloudIOError::new(
                    ErrorKind::JobFailed,
                    format!("JSON parsing error in row starting at line {} of {uri}", idx + 1),
                )
                .with_source(e.to_string())
            })?;
            let row = conform_row(&value, &self.fields, self.ignore_unknown, "").map_err(|msg| {
                CloudIOError::new(
                    ErrorKind::JobFailed,
                    format!("{msg} (line {} of {uri})", idx + 1),
                )
            })?;
            rows.push(Value::Object(row));
        }
        Ok(())
    }

    fn append(&self, rows: &[Value]) -> CloudResult<()> {
        let _guard = self.append_lock.lock().expect("append mutex poisoned");
        if let Some(parent) = self.target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CloudIOError::from_io(&e, format!("mkdir -p {}", parent.display())))?;
        }
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.target)
            .map_err(|e| CloudIOError::from_io(&e, format!("open {}", self.target.display())))?;
        let mut w = BufWriter::new(file);
        for row in rows {
            serde_json::to_writer(&mut w, row).map_err(|e| {
                CloudIOError::new(ErrorKind::InternalError, format!("job {}", self.id))
                    .with_source(e.to_string())
            })?;
            w.write_all(b"\n")
                .map_err(|e| CloudIOError::from_io(&e, format!("append to {}", self.target.display())))?;
        }
        w.flush()
            .map_err(|e| CloudIOError::from_io(&e, format!("flush {}", self.target.display())))
    }
}

/// Check `value` against `fields` and return the row restricted to known
/// columns.
fn conform_row(
    value: &Value,
    fields: &[SchemaField],
    ignore_unknown: bool,
    path: &str,
) -> Result<Map<String, Value>, String> {
    let Value::Object(object) = value else {
        return Err(format!("row{} is not a JSON object", display_path(path)));
    };

    if !ignore_unknown
        && let Some(unknown) = object
            .keys()
            .find(|key| !fields.iter().any(|f| &f.name == *key))
    {
        return Err(format!("no such field: {path}{unknown}"));
    }

    let mut row = Map::with_capacity(fields.len());
    for field in fields {
        let column = format!("{path}{}", field.name);
        match object.get(&field.name) {
            None | Some(Value::Null) => {
                if field.mode == FieldMode::Required {
                    return Err(format!("missing required field: {column}"));
                }
            }
            Some(value) => {
                let conformed = conform_value(value, field, ignore_unknown, &column)?;
                row.insert(field.name.clone(), conformed);
            }
        }
    }
    Ok(row)
}

fn conform_value(
    value: &Value,
    field: &SchemaField,
    ignore_unknown: bool,
    column: &str,
) -> Result<Value, String> {
    if field.mode == FieldMode::Repeated {
        let Value::Array(items) = value else {
            return Err(format!("array specified for non-repeated field: {column}"));
        };
        return items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| conform_scalar(item, field, ignore_unknown, column))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    if value.is_array() {
        return Err(format!("array specified for non-repeated field: {column}"));
    }
    conform_scalar(value, field, ignore_unknown, column)
}

fn conform_scalar(
    value: &Value,
    field: &SchemaField,
    ignore_unknown: bool,
    column: &str,
) -> Result<Value, String> {
    if field.is_record() {
        let nested = conform_row(value, &field.fields, ignore_unknown, &format!("{column}."))?;
        return Ok(Value::Object(nested));
    }

    let ok = match field.field_type.to_ascii_uppercase().as_str() {
        "STRING" => value.is_string(),
        "INTEGER" | "INT64" => {
            value.is_i64()
                || value.is_u64()
                || value.as_str().is_some_and(|s| s.parse::<i64>().is_ok())
        }
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            value.is_number() || value.as_str().is_some_and(|s| s.parse::<f64>().is_ok())
        }
        "BOOLEAN" | "BOOL" => value.is_boolean(),
        "DATE" => value
            .as_str()
            .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
        // TIMESTAMP, DATETIME, JSON and the rest are passed through as-is.
        _ => true,
    };
    if ok {
        Ok(value.clone())
    } else {
        Err(format!(
            "invalid value for {} field {column}: {value}",
            field.field_type
        ))
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" at {}", path.trim_end_matches('.'))
    }
}
