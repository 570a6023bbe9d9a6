mod common;

use anyhow::Result;
use common::{read_gz_lines, write_corrupt_gz, write_gz_lines};
use ironload::processor::{FileStats, process_file};
use serde_json::{Value, json};
use std::fs;

#[test]
fn malformed_lines_are_skipped_and_counted() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in/0001.jsonl.gz");
    let output = tmp.path().join("out/nested/0001.jsonl.gz");
    write_gz_lines(
        &input,
        &[
            r#"{"DOI": "a", "issued": {"date-parts": [[2020, 5, 6]]}}"#,
            r#"{"DOI": "b", "#,
            "",
            "   ",
            r#"{"DOI": "c"}"#,
            "not json at all",
            r#"{"DOI": "d", "issued": {"date-parts": [[2020, 2, 31]]}}"#,
        ],
    )?;

    let stats = process_file(&input, &output)?;
    assert_eq!(
        stats,
        FileStats {
            lines_read: 5,
            lines_written: 3,
            failed_json: 2,
            null_docs: 0,
        }
    );

    let written: Vec<Value> = read_gz_lines(&output)?
        .iter()
        .map(|l| serde_json::from_str(l))
        .collect::<serde_json::Result<_>>()?;
    assert_eq!(
        written,
        vec![
            json!({"DOI": "a", "issued": {"date": "2020-05-06"}}),
            json!({"DOI": "c"}),
            json!({"DOI": "d", "issued": {"date": null}}),
        ]
    );
    Ok(())
}

#[test]
fn null_documents_are_dropped() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.jsonl.gz");
    let output = tmp.path().join("out.jsonl.gz");
    write_gz_lines(&input, &["null", r#"{"DOI": "x"}"#, "null"])?;

    let stats = process_file(&input, &output)?;
    assert_eq!(stats.lines_written, 1);
    assert_eq!(stats.null_docs, 2);
    assert_eq!(read_gz_lines(&output)?, vec![r#"{"DOI":"x"}"#]);
    Ok(())
}

#[test]
fn invalid_utf8_is_replaced_not_fatal() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.jsonl.gz");
    let output = tmp.path().join("out.jsonl.gz");
    {
        use flate2::{Compression, write::GzEncoder};
        use std::io::Write;
        let mut enc = GzEncoder::new(fs::File::create(&input)?, Compression::default());
        enc.write_all(b"{\"title\": \"caf\xe9\"}\n{\"DOI\": \"ok\"}\n")?;
        enc.finish()?;
    }

    let stats = process_file(&input, &output)?;
    assert_eq!(stats.lines_written, 2);
    assert_eq!(stats.failed_json, 0);
    assert!(read_gz_lines(&output)?[0].contains('\u{FFFD}'));
    Ok(())
}

#[test]
fn file_of_only_bad_lines_writes_nothing() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.jsonl.gz");
    let output = tmp.path().join("out.jsonl.gz");
    write_gz_lines(&input, &["{", "}", "[1,"])?;

    let stats = process_file(&input, &output)?;
    assert_eq!(stats.lines_written, 0);
    assert_eq!(stats.failed_json, 3);
    assert!(read_gz_lines(&output)?.is_empty());
    Ok(())
}

#[test]
fn stream_failures_are_errors() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let output = tmp.path().join("out.jsonl.gz");

    assert!(process_file(tmp.path().join("missing.jsonl.gz"), &output).is_err());

    let corrupt = tmp.path().join("corrupt.jsonl.gz");
    write_corrupt_gz(&corrupt)?;
    assert!(process_file(&corrupt, &output).is_err());
    Ok(())
}

#[test]
fn plain_output_when_extension_has_no_codec() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.jsonl.gz");
    let output = tmp.path().join("out.jsonl");
    write_gz_lines(&input, &[r#"{"issued": {"date-parts": [[1990]]}}"#])?;

    process_file(&input, &output)?;
    assert_eq!(
        fs::read_to_string(&output)?,
        "{\"issued\":{\"date\":\"1990-01-01\"}}\n"
    );
    Ok(())
}

#[test]
fn numbers_keep_their_exact_text() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("in.jsonl.gz");
    let output = tmp.path().join("out.jsonl.gz");
    write_gz_lines(
        &input,
        &[
            r#"{"id": 123456789012345678901234567890, "score": 0.10000000000000000555, "issued": {"date-parts": [[2020, 1, 2]]}}"#,
            r#"{"id": -98765432109876543210, "big": 18446744073709551616}"#,
        ],
    )?;

    process_file(&input, &output)?;
    assert_eq!(
        read_gz_lines(&output)?,
        vec![
            r#"{"id":123456789012345678901234567890,"score":0.10000000000000000555,"issued":{"date":"2020-01-02"}}"#,
            r#"{"id":-98765432109876543210,"big":18446744073709551616}"#,
        ]
    );
    Ok(())
}
