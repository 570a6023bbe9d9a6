//! Streaming rewrite of one compressed JSONL file.

use crate::io::compression::{auto_detect_reader, auto_detect_writer};
use crate::transform::transform;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::{File, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Line counts for one processed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    /// Non-blank lines read.
    pub lines_read: u64,
    /// Transformed documents written.
    pub lines_written: u64,
    /// Lines that were not valid JSON.
    pub failed_json: u64,
    /// Lines holding a bare JSON `null`, which are dropped.
    pub null_docs: u64,
}

/// Read `input` line by line, transform each JSON document and write it to
/// `output` as compact JSON, one document per line.
///
/// Compression follows the file names: a `.gz` input is decompressed (gzip is
/// also recognised by its magic bytes) and a `.gz` output is compressed.
/// Blank lines are skipped. A line that is not valid JSON is counted in
/// [`FileStats::failed_json`] and skipped; it never fails the file. Invalid
/// UTF-8 is replaced rather than treated as a read error.
///
/// # Errors
///
/// Returns an error only for stream-level failures: the input cannot be
/// opened, read or decompressed, or the output cannot be created, written or
/// finished. The output may be partially written in that case and should be
/// discarded by the caller.
pub fn process_file(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<FileStats> {
    let input = input.as_ref();
    let output = output.as_ref();

    let f = File::open(input).with_context(|| format!("open {}", input.display()))?;
    let rdr = auto_detect_reader(f, input)
        .with_context(|| format!("setup decompression for {}", input.display()))?;
    let mut rdr = BufReader::new(rdr);

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let out = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut w = auto_detect_writer(out, output)
        .with_context(|| format!("setup compression for {}", output.display()))?;

    let mut stats = FileStats::default();
    let mut buf = Vec::new();
    let mut line_no = 0u64;
    loop {
        buf.clear();
        let n = rdr
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read line {} in {}", line_no + 1, input.display()))?;
        if n == 0 {
            break;
        }
        line_no += 1;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines_read += 1;

        let doc: Value = match serde_json::from_str(line) {
            Ok(doc) => doc,
            Err(e) => {
                stats.failed_json += 1;
                debug!(file = %input.display(), line = line_no, error = %e, "skipping malformed JSON line");
                continue;
            }
        };
        if doc.is_null() {
            stats.null_docs += 1;
            continue;
        }

        serde_json::to_writer(&mut w, &transform(&doc))
            .with_context(|| format!("serialize line {} to {}", line_no, output.display()))?;
        w.write_all(b"\n")
            .with_context(|| format!("write {}", output.display()))?;
        stats.lines_written += 1;
    }
    w.finish()
        .with_context(|| format!("finish {}", output.display()))?;

    if stats.failed_json > 0 {
        warn!(
            file = %input.display(),
            read = stats.lines_read,
            written = stats.lines_written,
            failed = stats.failed_json,
            "processed file with malformed lines"
        );
    } else {
        debug!(
            file = %input.display(),
            read = stats.lines_read,
            written = stats.lines_written,
            "processed file"
        );
    }
    Ok(stats)
}
