//! Error types for the Flightcheck reporting engine.
//!
//! One error enum per component:
//!
//! - [`CsvError`] - CSV reading and serialization errors
//! - [`ModelError`] - Producer-contract violations in inbound `ErrorData`
//! - [`CodecError`] - Compact/paginated codec errors
//! - [`CorrectionError`] - Rejected correction ledger entries
//! - [`ExportError`] - Clean/errors CSV export errors
//! - [`RegistryError`] - Snapshot store errors
//! - [`ValidationError`] - JSON Schema violations at the ingestion boundary
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors while reading or writing CSV.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the byte content.
    #[error("Failed to decode content as {0}")]
    EncodingError(String),

    /// Invalid CSV format.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: u64, message: String },

    /// Nothing to serialize.
    #[error("No records to write")]
    EmptyInput,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

// =============================================================================
// Model Errors
// =============================================================================

/// Structural errors in an `ErrorData` payload.
///
/// These signal a bug in the upstream rule engine and are never masked.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    /// An error row references a row that has no snapshot in `rows_data`.
    #[error("Row {row_idx} referenced by '{category}' / '{reason}' is missing from rows_data")]
    MissingRowData {
        category: String,
        reason: String,
        row_idx: usize,
    },

    /// The producer-supplied summary disagrees with the categories.
    #[error("Summary mismatch on {field}: declared {declared}, computed {computed}")]
    SummaryMismatch {
        field: String,
        declared: usize,
        computed: usize,
    },

    /// Two categories share the same name.
    #[error("Duplicate category name: {0}")]
    DuplicateCategory(String),
}

// =============================================================================
// Codec Errors
// =============================================================================

/// Errors from the compact and paginated codecs.
///
/// A compact payload that fails to decode is rejected as a whole.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// A field index that is not present in `field_map`.
    #[error("Unknown field index {0} in compact payload")]
    UnknownFieldIndex(u64),

    /// A schema does not list a field the decoder needs.
    #[error("Schema '{schema}' is missing field '{field}'")]
    MissingSchemaField { schema: String, field: String },

    /// A positional record has the wrong number of slots.
    #[error("Record of kind '{kind}' has {found} slots, schema expects {expected}")]
    ArityMismatch {
        kind: String,
        expected: usize,
        found: usize,
    },

    /// A slot holds a value of the wrong JSON type.
    #[error("Malformed '{kind}' record: {message}")]
    Malformed { kind: String, message: String },

    /// The page size must be at least one.
    #[error("Page size must be at least 1")]
    InvalidPageSize,

    /// The page lies outside `1..=total_pages`.
    #[error("Page {page} out of range for category '{category}' ({total_pages} pages)")]
    PageOutOfRange {
        category: String,
        page: usize,
        total_pages: usize,
    },

    /// No category with that name.
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// The decoded model violates a structural invariant.
    #[error("Decoded payload is inconsistent: {0}")]
    Model(#[from] ModelError),
}

// =============================================================================
// Correction Errors
// =============================================================================

/// Reasons a proposed correction is rejected.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrectionError {
    /// The row has no snapshot in `rows_data`.
    #[error("Row {row_idx} does not exist in the dataset")]
    UnknownRow { row_idx: usize },

    /// No group referencing the row lets the user edit this column.
    #[error("Column '{column}' is not editable for row {row_idx}")]
    ColumnNotEditable { row_idx: usize, column: String },

    /// The column is locked by sequence-error rendering.
    #[error("Column '{column}' of row {row_idx} is locked by a sequence error")]
    LockedColumn { row_idx: usize, column: String },
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while generating export files.
#[derive(Debug, Error)]
pub enum ExportError {
    /// No row qualifies for the requested export.
    #[error("No rows qualify for the {0} export")]
    NoQualifyingRows(String),

    /// The requested group does not exist.
    #[error("No group '{reason}' in category '{category}'")]
    UnknownGroup { category: String, reason: String },

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// The dataset references a row it has no snapshot for.
    #[error("Cannot export: {0}")]
    Model(#[from] ModelError),
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the snapshot registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Snapshot not found.
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors at the ingestion boundary.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema validation failed.
    #[error("Payload does not match the ErrorData schema: {errors:?}")]
    SchemaError { errors: Vec<String> },

    /// The payload is not JSON at all.
    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable holds an unparsable value.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidVar { var: String, value: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::pipeline::load_error_data`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Structural error.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Codec error.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error outside the ingestion boundary.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown resource.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for model checks.
pub type ModelResult<T> = Result<T, ModelError>;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // CsvError -> ExportError -> PipelineError
        let export_err: ExportError = CsvError::EmptyInput.into();
        let pipeline_err: PipelineError = export_err.into();
        assert!(pipeline_err.to_string().contains("No records"));

        // ModelError -> CodecError
        let codec_err: CodecError = ModelError::DuplicateCategory("DATE_ERRORS".into()).into();
        assert!(codec_err.to_string().contains("DATE_ERRORS"));
    }

    #[test]
    fn test_missing_row_message() {
        let err = ModelError::MissingRowData {
            category: "SEQUENCE_ERRORS".into(),
            reason: "Broken chain".into(),
            row_idx: 17,
        };
        let msg = err.to_string();
        assert!(msg.contains("Row 17"));
        assert!(msg.contains("SEQUENCE_ERRORS"));
    }

    #[test]
    fn test_correction_error_serializes_with_kind() {
        let err = CorrectionError::ColumnNotEditable {
            row_idx: 3,
            column: "Fuel".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "column_not_editable");
        assert_eq!(json["column"], "Fuel");
    }
}
