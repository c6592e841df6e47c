//! # flightcheck - Validation-error reporting for flight record datasets
//!
//! flightcheck takes the result of a validation run over a flight-record CSV
//! (error categories, groups and row snapshots), serves it page by page,
//! highlights broken flight sequences, collects user corrections and writes
//! corrected CSV exports.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ ErrorData   │────▶│ Validation  │────▶│  Sequence   │────▶│  Snapshot   │
//! │   (JSON)    │     │ (schema +   │     │ (highlight) │     │  registry   │
//! └─────────────┘     │  integrity) │     └─────────────┘     └──────┬──────┘
//!                     └─────────────┘                                │
//!        ┌───────────────────────────┬───────────────────────────────┤
//!        ▼                           ▼                               ▼
//! ┌─────────────┐            ┌─────────────┐                 ┌─────────────┐
//! │   Codec     │            │ Correction  │────────────────▶│   Export    │
//! │ (pages +    │            │   ledger    │                 │ (clean and  │
//! │  compact)   │            └─────────────┘                 │  errors CSV)│
//! └─────────────┘                                            └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flightcheck::{load_error_data_file, CorrectionLedger, export_clean};
//! use std::path::Path;
//!
//! let data = load_error_data_file(Path::new("errors.json"))?;
//! let mut ledger = CorrectionLedger::new();
//! ledger.record(&data, 42, "Fuel", "125")?;
//! let file = export_clean(&data, &ledger, "summer_schedule")?;
//! std::fs::write(&file.filename, file.bytes())?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Error data model (rows, groups, categories, summary)
//! - [`parser`] - CSV reading and writing
//! - [`sequence`] - Sequence-error bucketing, highlighting and column locks
//! - [`codec`] - Paginated and compact encodings
//! - [`corrections`] - Correction ledger
//! - [`export`] - Clean/errors CSV exports
//! - [`validation`] - JSON Schema validation of inbound payloads
//! - [`cache`] - Snapshot registry
//! - [`pipeline`] - Loading and ingestion steps
//! - [`config`] - Engine configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Engine
pub mod codec;
pub mod corrections;
pub mod export;
pub mod sequence;

// Validation
pub mod validation;

// Snapshots
pub mod cache;

// Orchestration
pub mod config;
pub mod pipeline;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CodecError, ConfigError, CorrectionError, CsvError, ExportError, ModelError, PipelineError,
    RegistryError, ServerError, ValidationError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CellValue, ErrorCategory, ErrorData, ErrorGroup, ErrorRow, ErrorSummary, Instance, Row,
    RowIndex, RowKind, SequenceError,
};

// =============================================================================
// Re-exports - Engine
// =============================================================================

pub use codec::{
    decode, encode, metadata, page, ErrorMetadata, OptimizedErrorData, PaginatedErrorData,
};
pub use corrections::{Correction, CorrectionBatch, CorrectionLedger};
pub use export::{export_bundle, export_clean, export_errors, export_group, CsvFile, ExportKind};
pub use sequence::{annotate, group_view, parse_sequence_error};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{parse_bytes_auto, parse_csv, parse_csv_file_auto, to_csv, ParseResult};

// =============================================================================
// Re-exports - Validation, Registry, Pipeline
// =============================================================================

pub use cache::{SnapshotInfo, SnapshotRegistry};
pub use config::EngineConfig;
pub use pipeline::{load_error_data, load_error_data_file};
pub use validation::{is_valid_error_data, validate_error_data};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
