//! Sequence-error engine.
//!
//! Detects and annotates error groups that describe broken flight itineraries,
//! where the destination of leg N differs from the origin of leg N+1.
//!
//! # Algorithm
//!
//! ```text
//! ErrorGroup rows                 Buckets (by exact cell_data)      Flags
//! ┌──────────────────────┐       ┌──────────────────────────┐
//! │ 12 "TCCOH : A → B"   │       │ "TCCOH : A → B"          │
//! │ 10 "TCCOH : A → B"   │  →    │   10, 11, 12, 13 (sorted)│  →  highlight 11, 12
//! │ 13 "TCCOH : A → B"   │       ├──────────────────────────┤     mismatch where
//! │ 11 "TCCOH : A → B"   │       │ ...                      │     dest(N) != origin(N+1)
//! └──────────────────────┘       └──────────────────────────┘
//! ```
//!
//! Buckets are keyed by the raw marker string, not the parsed fields: two
//! markers that differ only in spacing land in different buckets.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{ErrorData, ErrorGroup, ErrorRow, Row, SequenceError, DESTINATION_ICAO, ORIGIN_ICAO};

/// `CODE : DEST → ORIGIN`, whitespace-tolerant around the separators.
static SEQUENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9_]+)\s*:\s*([A-Za-z0-9_]+)\s*→\s*([A-Za-z0-9_]+)")
        .expect("static sequence pattern")
});

/// Bucket size that triggers highlighting.
///
/// Business rule tied to the four-leg itinerary-break shape; it does not
/// generalize to other sizes.
pub const HIGHLIGHT_BUCKET_SIZE: usize = 4;

/// 1-indexed positions highlighted in a bucket of [`HIGHLIGHT_BUCKET_SIZE`].
pub const HIGHLIGHT_POSITIONS: [usize; 2] = [2, 3];

/// Columns never editable in sequence-error rendering.
pub const LOCKED_COLUMNS: [&str; 2] = [DESTINATION_ICAO, ORIGIN_ICAO];

/// Parse a sequence marker. Returns `None` for anything else.
pub fn parse_sequence_error(cell_data: &str) -> Option<SequenceError> {
    let caps = SEQUENCE_PATTERN.captures(cell_data)?;
    Some(SequenceError {
        error_code: caps[1].to_string(),
        destination_icao: caps[2].to_string(),
        origin_icao: caps[3].to_string(),
    })
}

// =============================================================================
// Buckets
// =============================================================================

/// Rows of one group sharing a byte-identical `cell_data`, sorted by `row_idx`.
#[derive(Debug, Clone)]
pub struct SequenceBucket<'a> {
    pub marker: Option<&'a str>,
    pub rows: Vec<&'a ErrorRow>,
}

/// Split a group into buckets, in order of first appearance.
pub fn bucket_rows(group: &ErrorGroup) -> Vec<SequenceBucket<'_>> {
    let mut buckets: Vec<SequenceBucket<'_>> = Vec::new();
    let mut positions: HashMap<Option<&str>, usize> = HashMap::new();
    for row in &group.rows {
        let marker = row.cell_data();
        match positions.get(&marker) {
            Some(&pos) => buckets[pos].rows.push(row),
            None => {
                positions.insert(marker, buckets.len());
                buckets.push(SequenceBucket {
                    marker,
                    rows: vec![row],
                });
            }
        }
    }
    for bucket in &mut buckets {
        bucket.rows.sort_by_key(|r| r.row_idx);
    }
    buckets
}

impl SequenceBucket<'_> {
    /// Row indices selected by the highlight rule.
    pub fn highlighted(&self) -> Vec<usize> {
        if self.rows.len() != HIGHLIGHT_BUCKET_SIZE {
            return Vec::new();
        }
        HIGHLIGHT_POSITIONS
            .iter()
            .map(|&pos| self.rows[pos - 1].row_idx)
            .collect()
    }

    /// Rows whose `Destination ICAO` differs from the next row's `Origin ICAO`.
    pub fn destination_mismatches(&self) -> BTreeSet<usize> {
        self.rows
            .windows(2)
            .filter_map(|pair| {
                let next_origin = pair[1].columns.get(ORIGIN_ICAO).filter(|v| !v.is_null())?;
                let dest = pair[0].columns.get(DESTINATION_ICAO);
                (dest != Some(next_origin)).then_some(pair[0].row_idx)
            })
            .collect()
    }
}

/// Highlight map of a group: only highlighted rows appear, mapped to `true`.
pub fn highlight_map(group: &ErrorGroup) -> BTreeMap<usize, bool> {
    bucket_rows(group)
        .iter()
        .flat_map(|b| b.highlighted())
        .map(|idx| (idx, true))
        .collect()
}

/// Rows of a group flagged for a destination/origin mismatch.
pub fn mismatch_flags(group: &ErrorGroup) -> BTreeSet<usize> {
    bucket_rows(group)
        .iter()
        .flat_map(|b| b.destination_mismatches())
        .collect()
}

// =============================================================================
// Editability
// =============================================================================

/// Whether `column` is editable in `group`, after the sequence carve-out.
pub fn is_column_editable(group: &ErrorGroup, column: &str) -> bool {
    if !group.declares_editable(column) {
        return false;
    }
    !(group.is_sequence() && LOCKED_COLUMNS.contains(&column))
}

/// Effective editable columns of a group, in declared order.
pub fn editable_columns(group: &ErrorGroup) -> Vec<String> {
    group
        .columns
        .iter()
        .filter(|c| is_column_editable(group, c))
        .cloned()
        .collect()
}

// =============================================================================
// Views
// =============================================================================

/// Rendering view of a group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub reason: String,
    pub is_sequence: bool,
    pub editable_columns: Vec<String>,
    pub buckets: Vec<BucketView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketView {
    pub marker: Option<String>,
    pub sequence: Option<SequenceError>,
    pub rows: Vec<RowView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowView {
    pub row_idx: usize,
    pub highlight: bool,
    /// The `Destination ICAO` cell is shown as a mismatch.
    pub destination_mismatch: bool,
    pub columns: Row,
}

/// Build the rendering view of one group.
pub fn group_view(group: &ErrorGroup) -> GroupView {
    let buckets = bucket_rows(group)
        .into_iter()
        .map(|bucket| {
            let highlighted = bucket.highlighted();
            let mismatched = bucket.destination_mismatches();
            BucketView {
                marker: bucket.marker.map(String::from),
                sequence: bucket.rows.first().and_then(|r| r.sequence().cloned()),
                rows: bucket
                    .rows
                    .iter()
                    .map(|r| RowView {
                        row_idx: r.row_idx,
                        highlight: highlighted.contains(&r.row_idx),
                        destination_mismatch: mismatched.contains(&r.row_idx),
                        columns: r.columns.clone(),
                    })
                    .collect(),
            }
        })
        .collect();

    GroupView {
        reason: group.reason.clone(),
        is_sequence: group.is_sequence(),
        editable_columns: editable_columns(group),
        buckets,
    }
}

/// Return a copy of `data` with `highlight` set on sequence groups.
///
/// Rows outside sequence groups keep `highlight = false`.
pub fn annotate(data: &ErrorData) -> ErrorData {
    let mut annotated = data.clone();
    for category in &mut annotated.categories {
        for group in &mut category.errors {
            let map = if group.is_sequence() {
                highlight_map(group)
            } else {
                BTreeMap::new()
            };
            for row in &mut group.rows {
                row.highlight = map.contains_key(&row.row_idx);
            }
        }
    }
    annotated
}
