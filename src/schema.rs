//! Warehouse table schema loaded from a static JSON artifact.
//!
//! The artifact uses the warehouse API representation: a JSON array of
//! `{"name", "type", "mode", "fields"}` objects, where `fields` nests the
//! columns of a `RECORD` column. It is read once at startup and pinned into
//! every load job; it is never inferred from data.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Column mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

/// One column descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: FieldMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SchemaField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaField {
    #[must_use]
    pub fn is_record(&self) -> bool {
        matches!(
            self.field_type.to_ascii_uppercase().as_str(),
            "RECORD" | "STRUCT"
        )
    }
}

/// Ordered column list of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSchema {
    pub fields: Vec<SchemaField>,
}

impl TableSchema {
    /// Load and validate a schema artifact.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Schema`] if the file is missing, is not a JSON
    /// array of field descriptors, is empty, or contains an unnamed column or
    /// a `RECORD` column without nested fields.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| PipelineError::schema(path, format!("cannot open: {e}")))?;
        let schema: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PipelineError::schema(path, format!("malformed: {e}")))?;
        schema
            .validate()
            .map_err(|message| PipelineError::schema(path, message))?;
        Ok(schema)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.fields.is_empty() {
            return Err("schema has no fields".to_string());
        }
        validate_fields(&self.fields, "")
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn validate_fields(fields: &[SchemaField], parent: &str) -> std::result::Result<(), String> {
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(format!("unnamed field under '{parent}'"));
        }
        if field.field_type.trim().is_empty() {
            return Err(format!("field '{parent}{}' has no type", field.name));
        }
        if field.is_record() {
            if field.fields.is_empty() {
                return Err(format!(
                    "record field '{parent}{}' has no nested fields",
                    field.name
                ));
            }
            validate_fields(&field.fields, &format!("{parent}{}.", field.name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_schema(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_nested_schema() {
        let file = write_schema(
            r#"[
                {"name": "DOI", "type": "STRING", "mode": "REQUIRED"},
                {"name": "issued", "type": "RECORD", "fields": [
                    {"name": "date", "type": "DATE"}
                ]},
                {"name": "subject", "type": "STRING", "mode": "REPEATED"}
            ]"#,
        );
        let schema = TableSchema::from_file(file.path()).unwrap();
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields[0].mode, FieldMode::Required);
        assert_eq!(schema.fields[1].mode, FieldMode::Nullable);
        assert!(schema.field("issued").unwrap().is_record());
        assert_eq!(schema.fields[2].mode, FieldMode::Repeated);
    }

    #[test]
    fn missing_file_is_schema_error() {
        let err = TableSchema::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }

    #[test]
    fn malformed_and_empty_schemas_are_rejected() {
        for body in [
            "{not json",
            "[]",
            r#"[{"name": "x"}]"#,
            r#"[{"name": "r", "type": "RECORD"}]"#,
            r#"[{"name": "m", "type": "STRING", "mode": "SOMETIMES"}]"#,
        ] {
            let file = write_schema(body);
            assert!(TableSchema::from_file(file.path()).is_err(), "body: {body}");
        }
    }
}
