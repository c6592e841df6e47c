//! Domain models for the validation-error reporting engine.
//!
//! This module contains the canonical in-memory shape produced by the
//! external rule engine and consumed by every other component:
//!
//! - [`ErrorData`] - Summary, row snapshots and categories of one validation run
//! - [`ErrorCategory`] - A named family of rules (e.g. `SEQUENCE_ERRORS`)
//! - [`ErrorGroup`] - One rule (reason) and the rows that violate it
//! - [`ErrorRow`] - One violation instance of one row
//! - [`Row`] / [`CellValue`] - Ordered column snapshot with closed value variants
//! - [`SequenceError`] / [`RowKind`] - Structured marker classification
//!
//! `row_idx` is the join key between all of these: a row violating two rules
//! appears as two `ErrorRow`s with the same index.

pub mod summary;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::error::{ModelError, ModelResult};
use crate::sequence::parse_sequence_error;

pub use summary::ErrorSummary;

/// Column holding the arrival airport of a leg.
pub const DESTINATION_ICAO: &str = "Destination ICAO";

/// Column holding the departure airport of a leg.
pub const ORIGIN_ICAO: &str = "Origin ICAO";

/// Shared empty row, for display when a snapshot is absent. Never exported.
pub static EMPTY_ROW: Row = Row { cells: Vec::new() };

// =============================================================================
// Cell Values
// =============================================================================

/// A single cell value.
///
/// Rows coming from the rule engine only ever hold strings, numbers or nulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    /// Missing value.
    #[default]
    Null,
    /// Numeric value, kept in its exact JSON representation.
    Number(serde_json::Number),
    /// Free text.
    Text(String),
}

impl CellValue {
    /// Text used when the value is written to CSV or compared as a string.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }

    /// Borrow the inner string for text cells.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n.into())
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(n.into())
    }
}

impl From<usize> for CellValue {
    fn from(n: usize) -> Self {
        CellValue::Number((n as u64).into())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(CellValue::Number)
            .unwrap_or(CellValue::Null)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

// =============================================================================
// Row Snapshot
// =============================================================================

/// An ordered mapping of column name to value.
///
/// Column order is the order the producer emitted, which becomes the CSV
/// header order on export. Setting an existing column replaces it in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cell by column name.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| k == column).map(|(_, v)| v)
    }

    /// Set a cell, keeping the column position if it already exists.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    /// Builder-style [`Row::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Prepend columns, keeping their order, ahead of the existing ones.
    pub fn prepend(&mut self, leading: Vec<(String, CellValue)>) {
        let mut cells = leading;
        for (k, v) in std::mem::take(&mut self.cells) {
            if !cells.iter().any(|(existing, _)| *existing == k) {
                cells.push((k, v));
            }
        }
        self.cells = cells;
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.set(k, v);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of column names to string, number or null")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::new();
                while let Some((k, v)) = access.next_entry::<String, CellValue>()? {
                    row.set(k, v);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

// =============================================================================
// Sequence Marker
// =============================================================================

/// A parsed sequence-error marker: `CODE : DEST → ORIGIN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceError {
    #[serde(rename = "errorCode")]
    pub error_code: String,
    #[serde(rename = "destinationICAO")]
    pub destination_icao: String,
    #[serde(rename = "originICAO")]
    pub origin_icao: String,
}

/// How a row's `cell_data` was classified at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RowKind {
    /// Plain description, or no description at all.
    #[default]
    Generic,
    /// A structured sequence-error marker.
    Sequence(SequenceError),
}

impl RowKind {
    /// Classify a violation description.
    pub fn classify(cell_data: Option<&str>) -> Self {
        cell_data
            .and_then(parse_sequence_error)
            .map(RowKind::Sequence)
            .unwrap_or_default()
    }

    pub fn sequence(&self) -> Option<&SequenceError> {
        match self {
            RowKind::Sequence(seq) => Some(seq),
            RowKind::Generic => None,
        }
    }
}

// =============================================================================
// Error Row
// =============================================================================

/// One violation instance of one dataset row.
///
/// The row is classified once, when built or deserialized; `kind` never
/// goes out of sync with `cell_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ErrorRowWire", into = "ErrorRowWire")]
pub struct ErrorRow {
    /// Index into the owning dataset.
    pub row_idx: usize,
    /// Violation description, possibly a sequence marker.
    cell_data: Option<String>,
    /// Column snapshot taken at detection time.
    pub columns: Row,
    /// Violation is dataset-wide.
    pub file_level: bool,
    /// Set only by the sequence engine.
    pub highlight: bool,
    kind: RowKind,
}

impl ErrorRow {
    pub fn new(row_idx: usize, cell_data: Option<String>, columns: Row) -> Self {
        let kind = RowKind::classify(cell_data.as_deref());
        Self {
            row_idx,
            cell_data,
            columns,
            file_level: false,
            highlight: false,
            kind,
        }
    }

    pub fn with_file_level(mut self, file_level: bool) -> Self {
        self.file_level = file_level;
        self
    }

    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn cell_data(&self) -> Option<&str> {
        self.cell_data.as_deref()
    }

    pub fn kind(&self) -> &RowKind {
        &self.kind
    }

    pub fn sequence(&self) -> Option<&SequenceError> {
        self.kind.sequence()
    }
}

/// Serialized shape of [`ErrorRow`].
#[derive(Serialize, Deserialize)]
struct ErrorRowWire {
    row_idx: usize,
    #[serde(default)]
    cell_data: Option<String>,
    #[serde(default)]
    columns: Row,
    #[serde(default)]
    file_level: bool,
    #[serde(default)]
    highlight: bool,
}

impl From<ErrorRowWire> for ErrorRow {
    fn from(w: ErrorRowWire) -> Self {
        ErrorRow::new(w.row_idx, w.cell_data, w.columns)
            .with_file_level(w.file_level)
            .with_highlight(w.highlight)
    }
}

impl From<ErrorRow> for ErrorRowWire {
    fn from(r: ErrorRow) -> Self {
        ErrorRowWire {
            row_idx: r.row_idx,
            cell_data: r.cell_data,
            columns: r.columns,
            file_level: r.file_level,
            highlight: r.highlight,
        }
    }
}

// =============================================================================
// Error Group / Category
// =============================================================================

/// All rows violating one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorGroup {
    /// Human-readable rule description.
    pub reason: String,
    /// Rows in detection order.
    #[serde(default)]
    pub rows: Vec<ErrorRow>,
    /// Columns the user may edit for this rule.
    #[serde(default)]
    pub columns: Vec<String>,
}

impl ErrorGroup {
    pub fn new(reason: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            reason: reason.into(),
            rows: Vec::new(),
            columns,
        }
    }

    pub fn with_rows(mut self, rows: Vec<ErrorRow>) -> Self {
        self.rows = rows;
        self
    }

    /// True if any row carries a sequence marker.
    pub fn is_sequence(&self) -> bool {
        self.rows.iter().any(|r| r.sequence().is_some())
    }

    /// Whether the group declares `column` editable, before any carve-out.
    pub fn declares_editable(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn references(&self, row_idx: usize) -> bool {
        self.rows.iter().any(|r| r.row_idx == row_idx)
    }
}

/// A named family of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCategory {
    /// Stable machine key.
    pub name: String,
    #[serde(default)]
    pub errors: Vec<ErrorGroup>,
    #[serde(default)]
    pub file_level: bool,
}

impl ErrorCategory {
    pub fn new(name: impl Into<String>, errors: Vec<ErrorGroup>) -> Self {
        Self {
            name: name.into(),
            errors,
            file_level: false,
        }
    }

    /// Number of violation instances in this category.
    pub fn instance_count(&self) -> usize {
        self.errors.iter().map(|g| g.rows.len()).sum()
    }

    pub fn group(&self, reason: &str) -> Option<&ErrorGroup> {
        self.errors.iter().find(|g| g.reason == reason)
    }
}

// =============================================================================
// Error Data
// =============================================================================

/// One violation instance, with the group and category it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Instance<'a> {
    pub category: &'a ErrorCategory,
    pub group: &'a ErrorGroup,
    pub row: &'a ErrorRow,
}

/// Full, uncompressed result of one validation run.
///
/// Treated as immutable: annotation and corrections produce new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub summary: ErrorSummary,
    /// Row snapshots keyed by `row_idx`.
    pub rows_data: BTreeMap<usize, Row>,
    pub categories: Vec<ErrorCategory>,
}

impl ErrorData {
    /// Build a dataset with a summary computed from `categories`.
    pub fn new(rows_data: BTreeMap<usize, Row>, categories: Vec<ErrorCategory>) -> Self {
        Self {
            summary: ErrorSummary::compute(&categories),
            rows_data,
            categories,
        }
    }

    /// Check every structural invariant of the payload.
    pub fn validate(&self) -> ModelResult<()> {
        let mut names = BTreeSet::new();
        for category in &self.categories {
            if !names.insert(category.name.as_str()) {
                return Err(ModelError::DuplicateCategory(category.name.clone()));
            }
        }
        self.check_integrity()?;
        self.check_summary()
    }

    /// Fail if the producer-supplied summary disagrees with the categories.
    pub fn check_summary(&self) -> ModelResult<()> {
        self.summary.check_against(&self.categories)
    }

    /// Fail on the first `row_idx` that has no snapshot in `rows_data`.
    pub fn check_integrity(&self) -> ModelResult<()> {
        for instance in self.instances() {
            if !self.rows_data.contains_key(&instance.row.row_idx) {
                return Err(ModelError::MissingRowData {
                    category: instance.category.name.clone(),
                    reason: instance.group.reason.clone(),
                    row_idx: instance.row.row_idx,
                });
            }
        }
        Ok(())
    }

    pub fn category(&self, name: &str) -> Option<&ErrorCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Every violation instance, in category, group and detection order.
    pub fn instances(&self) -> impl Iterator<Item = Instance<'_>> {
        self.categories.iter().flat_map(|category| {
            category.errors.iter().flat_map(move |group| {
                group.rows.iter().map(move |row| Instance {
                    category,
                    group,
                    row,
                })
            })
        })
    }

    /// Instances referencing `row_idx`.
    pub fn instances_for_row(&self, row_idx: usize) -> Vec<Instance<'_>> {
        self.instances()
            .filter(|i| i.row.row_idx == row_idx)
            .collect()
    }

    /// Snapshot for a referenced row.
    pub fn row(&self, row_idx: usize) -> Option<&Row> {
        self.rows_data.get(&row_idx)
    }

    /// Snapshot for display; falls back to an empty row.
    pub fn row_for_display(&self, row_idx: usize) -> &Row {
        self.rows_data.get(&row_idx).unwrap_or(&EMPTY_ROW)
    }
}

/// `row_idx` to instance positions, built once per dataset.
///
/// Positions are `(category, group, row)` offsets into the dataset the index
/// was built from; lookups against any other dataset skip stale positions.
#[derive(Debug, Clone, Default)]
pub struct RowIndex {
    by_row: HashMap<usize, Vec<(usize, usize, usize)>>,
}

impl RowIndex {
    pub fn build(data: &ErrorData) -> Self {
        let mut by_row: HashMap<usize, Vec<(usize, usize, usize)>> = HashMap::new();
        for (c, category) in data.categories.iter().enumerate() {
            for (g, group) in category.errors.iter().enumerate() {
                for (r, row) in group.rows.iter().enumerate() {
                    by_row.entry(row.row_idx).or_default().push((c, g, r));
                }
            }
        }
        Self { by_row }
    }

    /// Same result as [`ErrorData::instances_for_row`], without the scan.
    pub fn instances<'a>(&self, data: &'a ErrorData, row_idx: usize) -> Vec<Instance<'a>> {
        let Some(positions) = self.by_row.get(&row_idx) else {
            return Vec::new();
        };
        positions
            .iter()
            .filter_map(|&(c, g, r)| {
                let category = data.categories.get(c)?;
                let group = category.errors.get(g)?;
                let row = group.rows.get(r)?;
                (row.row_idx == row_idx).then_some(Instance {
                    category,
                    group,
                    row,
                })
            })
            .collect()
    }

    /// Number of distinct indexed rows.
    pub fn len(&self) -> usize {
        self.by_row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_row.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
