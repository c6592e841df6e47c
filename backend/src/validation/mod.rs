//! JSON Schema validation at the ingestion boundary.
//!
//! Inbound `ErrorData` payloads are checked against an embedded draft-7
//! schema before they are deserialized, so that every violation is reported
//! at once instead of stopping at the first serde error.
//!
//! The schema is embedded at compile time from `schemas/error-data.json`.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use flightcheck::validation::validate_error_data;
//!
//! let payload = json!({
//!     "summary": { "total_errors": 0, "error_rows": 0, "categories": {} },
//!     "rows_data": {},
//!     "categories": []
//! });
//! assert!(validate_error_data(&payload).is_ok());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

static ERROR_DATA_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/error-data.json"))
        .expect("Invalid embedded schema")
});

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check: true/false only.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate against the embedded `ErrorData` schema.
pub fn validate_error_data(data: &Value) -> Result<(), Vec<String>> {
    validate(&ERROR_DATA_SCHEMA, data)
}

/// Quick check against the embedded `ErrorData` schema.
pub fn is_valid_error_data(data: &Value) -> bool {
    is_valid(&ERROR_DATA_SCHEMA, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_data;
    use serde_json::json;

    #[test]
    fn test_sample_payload_valid() {
        let payload = serde_json::to_value(sample_data()).unwrap();
        assert!(validate_error_data(&payload).is_ok());
    }

    #[test]
    fn test_minimal_payload_valid() {
        let payload = json!({
            "summary": { "total_errors": 0, "error_rows": 0, "categories": {} },
            "rows_data": {},
            "categories": []
        });
        assert!(is_valid_error_data(&payload));
    }

    #[test]
    fn test_boolean_cell_rejected() {
        let payload = json!({
            "summary": { "total_errors": 0, "error_rows": 0, "categories": {} },
            "rows_data": { "1": { "Fuel": true } },
            "categories": []
        });
        let errors = validate_error_data(&payload).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_negative_row_idx_rejected() {
        let payload = json!({
            "summary": { "total_errors": 1, "error_rows": 1, "categories": {} },
            "rows_data": {},
            "categories": [{
                "name": "DATE_ERRORS",
                "errors": [{ "reason": "bad", "rows": [{ "row_idx": -1 }] }]
            }]
        });
        assert!(!is_valid_error_data(&payload));
    }

    #[test]
    fn test_non_numeric_row_key_rejected() {
        let payload = json!({
            "summary": { "total_errors": 0, "error_rows": 0, "categories": {} },
            "rows_data": { "abc": {} },
            "categories": []
        });
        assert!(!is_valid_error_data(&payload));
    }
}
