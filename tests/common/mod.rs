#![allow(dead_code)]

use anyhow::Result;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use ironload::io::cloud::TableRef;
use ironload::schema::TableSchema;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

/// Write `lines` to a gzip file, one per line, creating parent directories.
pub fn write_gz_lines(path: &Path, lines: &[&str]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut enc = GzEncoder::new(File::create(path)?, Compression::default());
    for line in lines {
        enc.write_all(line.as_bytes())?;
        enc.write_all(b"\n")?;
    }
    enc.finish()?;
    Ok(())
}

pub fn read_gz_lines(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(MultiGzDecoder::new(File::open(path)?));
    Ok(reader.lines().collect::<std::io::Result<_>>()?)
}

pub fn gunzip_lines(bytes: &[u8]) -> Result<Vec<String>> {
    let mut text = String::new();
    MultiGzDecoder::new(bytes).read_to_string(&mut text)?;
    Ok(text.lines().map(ToString::to_string).collect())
}

/// A file with a gzip extension that is not gzip.
pub fn write_corrupt_gz(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, b"\x1f\x8bthis is not a gzip stream at all")?;
    Ok(())
}

pub fn works_schema() -> TableSchema {
    serde_json::from_str(
        r#"[
            {"name": "DOI", "type": "STRING", "mode": "REQUIRED"},
            {"name": "title", "type": "STRING", "mode": "REPEATED"},
            {"name": "issued", "type": "RECORD", "fields": [
                {"name": "date", "type": "DATE"}
            ]}
        ]"#,
    )
    .expect("valid schema")
}

pub fn works_table() -> TableRef {
    TableRef::parse("crossref.works").expect("valid table")
}

pub fn uris(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("mem://corpus/processed_for_bq/{i:05}.jsonl.gz"))
        .collect()
}
