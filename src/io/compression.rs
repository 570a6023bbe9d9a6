//! Compression detection and codec wrappers for line-oriented I/O.
//!
//! Source files and uploaded objects are gzip-compressed JSONL (`.jsonl.gz`).
//! Readers are wrapped transparently: the codec is picked from the file
//! extension first and from the stream's magic bytes second, and a stream that
//! matches neither is read as plain text.
//!
//! Writers differ from readers in one respect: compressed formats write a
//! trailer when the stream ends, and a failure there would silently produce a
//! truncated object if it only happened on drop. Every writer returned here is
//! a [`FinishWrite`], and callers must call [`FinishWrite::finish`] to learn
//! whether the output is complete.
//!
//! ```no_run
//! use ironload::io::compression::{auto_detect_reader, auto_detect_writer};
//! use std::fs::File;
//! use std::io::Write;
//! # fn main() -> anyhow::Result<()> {
//! let reader = auto_detect_reader(File::open("in.jsonl.gz")?, "in.jsonl.gz")?;
//! let mut writer = auto_detect_writer(File::create("out.jsonl.gz")?, "out.jsonl.gz")?;
//! writer.write_all(b"{}\n")?;
//! writer.finish()?;
//! # drop(reader);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A writer whose completion must be confirmed explicitly.
pub trait FinishWrite: Write {
    /// Flush remaining data (and any codec trailer) to the underlying sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the final write or flush fails.
    fn finish(self: Box<Self>) -> std::io::Result<()>;
}

impl<W: Write> FinishWrite for GzEncoder<W> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        let mut inner = GzEncoder::finish(*self)?;
        inner.flush()
    }
}

impl<W: Write> FinishWrite for BufWriter<W> {
    fn finish(mut self: Box<Self>) -> std::io::Result<()> {
        self.flush()?;
        self.into_inner().map_err(|e| e.into_error())?.flush()
    }
}

/// A compression algorithm recognised by extension and magic bytes.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &str;

    /// Lowercase file extensions with the leading dot.
    fn extensions(&self) -> &[&str];

    /// Byte signature at the start of a compressed stream.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader(&self, reader: Box<dyn Read>) -> Box<dyn Read>;

    /// Wrap a writer with compression.
    fn wrap_writer(&self, writer: Box<dyn Write>) -> Box<dyn FinishWrite>;
}

/// Gzip via `flate2`. Multi-member archives (concatenated gzip streams) are
/// decoded in full.
pub struct GzipCodec;

impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> Box<dyn Read> {
        Box::new(MultiGzDecoder::new(reader))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> Box<dyn FinishWrite> {
        Box::new(GzEncoder::new(BufWriter::new(writer), Compression::default()))
    }
}

static CODECS: [&dyn CompressionCodec; 1] = [&GzipCodec];

/// Detect compression codec from file path extension (case-insensitive).
#[must_use]
pub fn codec_for_path(path: impl AsRef<Path>) -> Option<&'static dyn CompressionCodec> {
    let path_str = path.as_ref().to_string_lossy().to_lowercase();
    CODECS
        .iter()
        .copied()
        .find(|codec| codec.extensions().iter().any(|ext| path_str.ends_with(ext)))
}

/// Detect compression codec from the first bytes of a buffered stream. The
/// reader is not advanced.
fn codec_for_magic<R: BufRead>(reader: &mut R) -> Option<&'static dyn CompressionCodec> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    CODECS.iter().copied().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| buf.len() >= magic.len() && buf.starts_with(magic))
    })
}

/// Wrap a reader with decompression if the path or content calls for it.
///
/// # Errors
///
/// Currently infallible for the built-in codec; the `Result` keeps the call
/// sites uniform with [`auto_detect_writer`].
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read>> {
    if let Some(codec) = codec_for_path(&path_hint) {
        return Ok(codec.wrap_reader(Box::new(reader)));
    }

    let mut buf_reader = BufReader::new(reader);
    if let Some(codec) = codec_for_magic(&mut buf_reader) {
        return Ok(codec.wrap_reader(Box::new(buf_reader)));
    }

    Ok(Box::new(buf_reader))
}

/// Wrap a writer with compression chosen by the path extension; plain
/// buffered output otherwise.
///
/// # Errors
///
/// Returns an error if the path hint has no usable file name.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn FinishWrite>> {
    let path = path_hint.as_ref();
    path.file_name()
        .with_context(|| format!("output path has no file name: {}", path.display()))?;
    if let Some(codec) = codec_for_path(path) {
        return Ok(codec.wrap_writer(Box::new(writer)));
    }
    Ok(Box::new(BufWriter::new(writer)))
}
