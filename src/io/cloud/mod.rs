//! Object-store and warehouse abstractions.
//!
//! The pipeline talks to its two external collaborators through
//! [`ObjectIO`] and [`WarehouseIO`]. Clients are built once at startup and
//! handed to every component as `Arc<dyn ...>`; nothing below constructs a
//! client on its own.
//!
//! - [`traits`] - trait definitions, [`CloudIOError`], load job types
//! - [`fake`] - in-memory implementations with failure injection, for tests
//! - [`local`] - filesystem-backed implementations used by the `ironload`
//!   binary (feature `local-backends`)
//! - [`helpers`] - URI parsing, key joining and name validation
//!
//! ## Unit Testing with Fakes
//! ```
//! use ironload::io::cloud::*;
//! use std::io::Write;
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = FakeObjectIO::with_bucket("bucket");
//! let mut file = tempfile::NamedTempFile::new()?;
//! file.write_all(b"{}\n")?;
//!
//! store.upload_file("bucket", "processed/a.jsonl.gz", file.path())?;
//! let listed = store.list_objects("bucket", "processed/")?;
//! assert_eq!(listed.len(), 1);
//! assert_eq!(store.object_uri("bucket", &listed[0].key), "mem://bucket/processed/a.jsonl.gz");
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`CloudResult<T>`]. [`ErrorKind::PermissionDenied`]
//! and [`ErrorKind::Authentication`] are reported separately by the upload
//! stage; [`ErrorKind::JobFailed`] marks a load the warehouse rejected.

pub mod fake;
pub mod helpers;
#[cfg_attr(docsrs, doc(cfg(feature = "local-backends")))]
#[cfg(feature = "local-backends")]
pub mod local;
pub mod traits;

pub use fake::*;
#[cfg(feature = "local-backends")]
pub use local::*;
pub use traits::*;
