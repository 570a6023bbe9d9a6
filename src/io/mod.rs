//! Local file and remote storage I/O.
//!
//! - [`compression`] - codec detection, gzip readers and finishing writers
//! - [`glob`] - recursive source file enumeration
//! - [`cloud`] - object-store and warehouse collaborators

pub mod cloud;
pub mod compression;
pub mod glob;
