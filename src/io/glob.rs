//! Source file enumeration.
//!
//! Input trees are walked with a recursive glob (`<root>/**/*<suffix>`), and the
//! matches come back sorted so every run visits files in the same order.
//!
//! ```no_run
//! use ironload::io::glob::find_files;
//!
//! let files = find_files("crossref_dump", ".jsonl.gz")?;
//! for file in &files {
//!     println!("{}", file.relative.display());
//! }
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use anyhow::{Context, Result, bail};
use glob::{MatchOptions, Pattern, glob_with};
use std::path::{Path, PathBuf};
use tracing::warn;

/// A file found under a source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Full path on disk.
    pub path: PathBuf,
    /// Path relative to the root that was searched.
    pub relative: PathBuf,
}

/// Find every regular file under `root` whose name ends with `suffix`,
/// searching subdirectories recursively.
///
/// Entries that cannot be read (an unreadable subdirectory, a broken link)
/// are logged and skipped so one bad entry never hides the rest of the tree.
///
/// # Errors
///
/// Returns an error if:
/// - `root` is not a directory
/// - The root path cannot be expressed as a glob pattern
pub fn find_files(root: impl AsRef<Path>, suffix: &str) -> Result<Vec<SourceFile>> {
    walk(root.as_ref(), suffix, false)
}

/// Like [`find_files`], but any unreadable entry fails the whole walk.
///
/// Used where a partial answer would be wrong, such as listing an object
/// store whose contents decide what gets loaded.
///
/// # Errors
///
/// Returns an error if `root` is not a directory, the pattern is invalid, or
/// any entry under `root` cannot be read.
pub fn find_files_strict(root: impl AsRef<Path>, suffix: &str) -> Result<Vec<SourceFile>> {
    walk(root.as_ref(), suffix, true)
}

fn walk(root: &Path, suffix: &str, strict: bool) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        bail!("source root {} is not a directory", root.display());
    }

    let root_str = root
        .to_str()
        .with_context(|| format!("source root {} is not valid UTF-8", root.display()))?;
    let pattern = format!(
        "{}/**/*{}",
        Pattern::escape(root_str.trim_end_matches('/')),
        Pattern::escape(suffix)
    );
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut files = Vec::new();
    for entry in glob_with(&pattern, options).with_context(|| format!("invalid glob pattern: {pattern}"))? {
        let path = match entry {
            Ok(path) => path,
            Err(e) if strict => {
                return Err(e).with_context(|| format!("error reading glob entry for pattern: {pattern}"));
            }
            Err(e) => {
                warn!(path = %e.path().display(), error = %e.error(), "skipping unreadable entry");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_path_buf();
        files.push(SourceFile { path, relative });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// File name of `path` with `suffix` removed, if the name ends with it.
#[must_use]
pub fn base_name<'a>(path: &'a Path, suffix: &str) -> Option<&'a str> {
    path.file_name()?.to_str()?.strip_suffix(suffix)
}
