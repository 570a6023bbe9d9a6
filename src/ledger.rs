//! Failure ledger and error log artifacts.
//!
//! The failure ledger is one object URI per line. The error log has one line
//! per failed batch, `[uri, uri, ...] - <error text>`. Both are overwritten on
//! every write; the retry pass reads a ledger and writes its own pair at
//! different paths.

use crate::error::{PipelineError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Read a failure ledger.
///
/// Returns `Ok(None)` when the file does not exist. Blank lines are skipped
/// and surrounding whitespace is trimmed.
///
/// # Errors
///
/// Returns [`PipelineError::Ledger`] if the file exists but cannot be read.
pub fn read_failures(path: impl AsRef<Path>) -> Result<Option<Vec<String>>> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(ledger_error(path, source)),
    };

    let mut uris = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| ledger_error(path, source))?;
        let line = line.trim();
        if !line.is_empty() {
            uris.push(line.to_string());
        }
    }
    Ok(Some(uris))
}

/// Overwrite `path` with one URI per line.
///
/// # Errors
///
/// Returns [`PipelineError::Ledger`] if the file cannot be written.
pub fn write_failures(path: impl AsRef<Path>, uris: &[String]) -> Result<()> {
    write_lines(path.as_ref(), uris)
}

/// Overwrite `path` with one error line per failed batch.
///
/// # Errors
///
/// Returns [`PipelineError::Ledger`] if the file cannot be written.
pub fn write_errors(path: impl AsRef<Path>, lines: &[String]) -> Result<()> {
    write_lines(path.as_ref(), lines)
}

/// `[uri, uri] - error`
#[must_use]
pub fn format_error_line(batch: &[String], error: &str) -> String {
    format!("[{}] - {error}", batch.join(", "))
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| ledger_error(path, source))?;
    }
    let file = File::create(path).map_err(|source| ledger_error(path, source))?;
    let mut w = BufWriter::new(file);
    for line in lines {
        writeln!(w, "{line}").map_err(|source| ledger_error(path, source))?;
    }
    w.flush().map_err(|source| ledger_error(path, source))
}

fn ledger_error(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::Ledger {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ledger_is_none() {
        assert!(read_failures("/no/such/ledger.txt").unwrap().is_none());
    }

    #[test]
    fn write_then_read_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/failed.txt");
        write_failures(&path, &["file://b/a.jsonl.gz".into(), "  ".into(), "file://b/c.jsonl.gz".into()])
            .unwrap();
        assert_eq!(
            read_failures(&path).unwrap().unwrap(),
            vec!["file://b/a.jsonl.gz", "file://b/c.jsonl.gz"]
        );

        write_failures(&path, &[]).unwrap();
        assert_eq!(read_failures(&path).unwrap().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn error_line_format() {
        let line = format_error_line(&["gs://b/1".into(), "gs://b/2".into()], "JobFailed: boom");
        assert_eq!(line, "[gs://b/1, gs://b/2] - JobFailed: boom");
    }
}
