//! REST API types.
//!
//! Envelope types use camelCase; the payloads they carry (`ErrorMetadata`,
//! `PaginatedErrorData`, `OptimizedErrorData`) keep their own wire format.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::cache::SnapshotInfo;
use crate::codec::ErrorMetadata;
use crate::corrections::{BatchOutcome, Rejection};

/// Query string of snapshot uploads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSnapshotQuery {
    /// Human-readable name; defaults to "snapshot"
    pub name: Option<String>,
}

/// Query string of paginated endpoints
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    /// Overrides the configured page size
    pub page_size: Option<usize>,
}

/// Response after a snapshot upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub snapshot: SnapshotInfo,
    /// Metadata at the configured page size
    pub metadata: ErrorMetadata,
}

/// Response of the snapshot listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotListResponse {
    pub snapshots: Vec<SnapshotInfo>,
}

/// Response after opening an editing session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub snapshot_id: String,
}

/// Response after a corrections batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionResponse {
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
    /// Corrections held by the session after this batch
    pub pending: usize,
}

impl CorrectionResponse {
    pub fn new(outcome: BatchOutcome, pending: usize) -> Self {
        Self {
            accepted: outcome.accepted,
            rejected: outcome.rejected,
            pending,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}
