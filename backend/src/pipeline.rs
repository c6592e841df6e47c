//! High-level loading API.
//!
//! Combines the ingestion steps for an `ErrorData` payload:
//! JSON parse, schema validation, deserialization, structural checks and
//! sequence annotation. Also reads the auxiliary inputs the CLI accepts
//! (dataset CSVs and correction batches).
//!
//! # Example
//!
//! ```rust,ignore
//! use flightcheck::pipeline::load_error_data_file;
//! use std::path::Path;
//!
//! let data = load_error_data_file(Path::new("errors.json"))?;
//! println!("{} errors on {} rows", data.summary.total_errors, data.summary.error_rows);
//! ```

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::api::logs::{log_error, log_info, log_info_indent, log_success};
use crate::corrections::CorrectionBatch;
use crate::error::{PipelineResult, ValidationError};
use crate::models::{ErrorData, Row};
use crate::parser::{parse_csv_file_auto, rows_from_csv};
use crate::sequence::annotate;
use crate::validation::validate_error_data;

/// Load an `ErrorData` payload from raw JSON bytes.
///
/// Steps:
/// 1. Parse JSON
/// 2. Validate against the embedded schema (all violations reported)
/// 3. Deserialize, classifying rows as generic or sequence
/// 4. Check referential integrity and the summary
/// 5. Annotate sequence highlights
pub fn load_error_data(bytes: &[u8]) -> PipelineResult<ErrorData> {
    log_info("📖 Loading error data...");
    let value: Value = serde_json::from_slice(bytes).map_err(ValidationError::Json)?;
    load_error_value(value)
}

/// Same as [`load_error_data`] for a file on disk.
pub fn load_error_data_file(path: &Path) -> PipelineResult<ErrorData> {
    let bytes = fs::read(path)?;
    log_info(format!("Reading {}", path.display()));
    load_error_data(&bytes)
}

/// Load an already-parsed JSON value.
pub fn load_error_value(value: Value) -> PipelineResult<ErrorData> {
    if let Err(errors) = validate_error_data(&value) {
        log_error(format!("Schema validation failed ({} violations)", errors.len()));
        for e in errors.iter().take(5) {
            log_info_indent(e.clone(), 1);
        }
        return Err(ValidationError::SchemaError { errors }.into());
    }
    log_success("Schema valid");

    let data: ErrorData = serde_json::from_value(value).map_err(ValidationError::Json)?;
    data.validate()?;
    log_success(format!(
        "{} errors on {} rows in {} categories",
        data.summary.total_errors,
        data.summary.error_rows,
        data.categories.len()
    ));
    for category in &data.categories {
        log_info_indent(
            format!("{}: {} instances", category.name, category.instance_count()),
            1,
        );
    }

    Ok(annotate(&data))
}

/// Read a dataset CSV into a `rows_data` map keyed by zero-based row index.
pub fn load_rows_data(path: &Path) -> PipelineResult<BTreeMap<usize, Row>> {
    log_info("📖 Reading CSV file...");
    let parsed = parse_csv_file_auto(path)?;
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows, {} columns", parsed.records.len(), parsed.headers.len()));
    Ok(rows_from_csv(parsed.records))
}

/// Read a corrections batch file: `{"<row_idx>": {"<column>": value}}`.
pub fn load_corrections(path: &Path) -> PipelineResult<CorrectionBatch> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, PipelineError};
    use crate::models::tests::sample_data;
    use crate::models::CellValue;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_load_annotates_sequence_rows() {
        let bytes = serde_json::to_vec(&sample_data()).unwrap();
        let data = load_error_data(&bytes).unwrap();

        let group = &data.categories[0].errors[0];
        let highlighted: Vec<usize> = group
            .rows
            .iter()
            .filter(|r| r.highlight)
            .map(|r| r.row_idx)
            .collect();
        assert_eq!(highlighted, vec![12, 11]);
        assert!(data.categories[1].errors.iter().all(|g| g.rows.iter().all(|r| !r.highlight)));
    }

    #[test]
    fn test_load_rejects_non_json() {
        assert!(matches!(
            load_error_data(b"not json"),
            Err(PipelineError::Validation(ValidationError::Json(_)))
        ));
    }

    #[test]
    fn test_load_reports_schema_violations() {
        let payload = json!({
            "summary": { "total_errors": 0, "error_rows": 0, "categories": {} },
            "rows_data": { "1": { "Fuel": true } },
            "categories": "nope"
        });
        match load_error_value(payload) {
            Err(PipelineError::Validation(ValidationError::SchemaError { errors })) => {
                assert_eq!(errors.len(), 2)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_load_rejects_missing_row_snapshot() {
        let mut data = sample_data();
        data.rows_data.remove(&42);
        let bytes = serde_json::to_vec(&data).unwrap();
        assert!(matches!(
            load_error_data(&bytes),
            Err(PipelineError::Model(ModelError::MissingRowData { row_idx: 42, .. }))
        ));
    }

    #[test]
    fn test_load_rows_data_and_corrections() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("flights.csv");
        fs::write(&csv_path, "Flight;Fuel\nTK1;120\n\"TK;2\";80\n").unwrap();
        let rows = load_rows_data(&csv_path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[&1].get("Flight"), Some(&CellValue::from("TK;2")));

        let batch_path = dir.path().join("fix.json");
        fs::write(&batch_path, r#"{"42": {"Fuel": "125", "Date": null}}"#).unwrap();
        let batch = load_corrections(&batch_path).unwrap();
        assert_eq!(batch[&42]["Fuel"], CellValue::from("125"));
        assert_eq!(batch[&42]["Date"], CellValue::Null);
    }
}
