//! Correction ledger.
//!
//! Proposed cell edits are kept per editing session, keyed by
//! `(row_idx, column)` with last-write-wins semantics. The ledger never
//! touches the snapshot it validates against: materializing corrections
//! produces new rows.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut ledger = CorrectionLedger::new();
//! ledger.record(&data, 42, "Fuel", "120")?;
//! ledger.record(&data, 42, "Fuel", "125")?; // supersedes
//! let corrected = ledger.materialize(&data);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CorrectionError;
use crate::models::{CellValue, ErrorData, ErrorGroup, Instance, Row, RowIndex};
use crate::sequence::is_column_editable;

/// A proposed edit of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub row_idx: usize,
    pub column: String,
    pub old_value: CellValue,
    pub new_value: CellValue,
}

/// Batch submission: `row_idx -> {column: value}`.
pub type CorrectionBatch = BTreeMap<usize, BTreeMap<String, CellValue>>;

/// A batch entry that was not stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub row_idx: usize,
    pub column: String,
    pub reason: CorrectionError,
}

/// Outcome of a batch submission.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
}

/// Accumulated corrections of one editing session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectionLedger {
    entries: BTreeMap<(usize, String), Correction>,
}

impl CorrectionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a correction. A later write to the same cell wins.
    pub fn record(
        &mut self,
        data: &ErrorData,
        row_idx: usize,
        column: &str,
        new_value: impl Into<CellValue>,
    ) -> Result<&Correction, CorrectionError> {
        let original = data
            .row(row_idx)
            .ok_or(CorrectionError::UnknownRow { row_idx })?;
        check_editable(&data.instances_for_row(row_idx), row_idx, column)?;
        Ok(self.store(row_idx, column, original, new_value.into()))
    }

    /// Record every entry of a batch; invalid entries are reported, not stored.
    pub fn submit_batch(&mut self, data: &ErrorData, batch: CorrectionBatch) -> BatchOutcome {
        self.submit_indexed(data, &RowIndex::build(data), batch)
    }

    /// [`submit_batch`](Self::submit_batch) with a prebuilt index of `data`.
    pub fn submit_indexed(
        &mut self,
        data: &ErrorData,
        index: &RowIndex,
        batch: CorrectionBatch,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (row_idx, cells) in batch {
            let Some(original) = data.row(row_idx) else {
                for column in cells.into_keys() {
                    outcome.rejected.push(Rejection {
                        row_idx,
                        column,
                        reason: CorrectionError::UnknownRow { row_idx },
                    });
                }
                continue;
            };
            let instances = index.instances(data, row_idx);
            for (column, value) in cells {
                match check_editable(&instances, row_idx, &column) {
                    Ok(()) => {
                        self.store(row_idx, &column, original, value);
                        outcome.accepted += 1;
                    }
                    Err(reason) => outcome.rejected.push(Rejection {
                        row_idx,
                        column,
                        reason,
                    }),
                }
            }
        }
        outcome
    }

    fn store(
        &mut self,
        row_idx: usize,
        column: &str,
        original: &Row,
        new_value: CellValue,
    ) -> &Correction {
        let correction = Correction {
            row_idx,
            column: column.to_string(),
            old_value: original.get(column).cloned().unwrap_or_default(),
            new_value,
        };
        let key = (row_idx, column.to_string());
        self.entries.insert(key.clone(), correction);
        &self.entries[&key]
    }

    /// Drop the correction for one cell.
    pub fn revert(&mut self, row_idx: usize, column: &str) -> Option<Correction> {
        self.entries.remove(&(row_idx, column.to_string()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, row_idx: usize, column: &str) -> Option<&Correction> {
        self.entries.get(&(row_idx, column.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Correction> {
        self.entries.values()
    }

    /// Corrections touching one row.
    pub fn for_row(&self, row_idx: usize) -> impl Iterator<Item = &Correction> {
        self.entries
            .range((row_idx, String::new())..)
            .take_while(move |((idx, _), _)| *idx == row_idx)
            .map(|(_, c)| c)
    }

    /// Apply corrections to one row snapshot.
    pub fn apply(&self, row_idx: usize, original: &Row) -> Row {
        let mut row = original.clone();
        for correction in self.for_row(row_idx) {
            row.set(correction.column.clone(), correction.new_value.clone());
        }
        row
    }

    /// Corrected copy of every row in `rows_data`.
    pub fn materialize(&self, data: &ErrorData) -> BTreeMap<usize, Row> {
        data.rows_data
            .iter()
            .map(|(&idx, row)| (idx, self.apply(idx, row)))
            .collect()
    }

    /// Whether the ledger resolves this row's violation of `group`.
    ///
    /// Resolved means some column the group lets the user edit was changed.
    pub fn resolves(&self, group: &ErrorGroup, row_idx: usize) -> bool {
        self.for_row(row_idx).any(|c| {
            c.new_value != c.old_value && is_column_editable(group, &c.column)
        })
    }
}

/// Accept a column if at least one group referencing the row lets it be edited.
fn check_editable(
    instances: &[Instance<'_>],
    row_idx: usize,
    column: &str,
) -> Result<(), CorrectionError> {
    if instances.iter().any(|i| is_column_editable(i.group, column)) {
        return Ok(());
    }
    if instances.iter().any(|i| i.group.declares_editable(column)) {
        return Err(CorrectionError::LockedColumn {
            row_idx,
            column: column.to_string(),
        });
    }
    Err(CorrectionError::ColumnNotEditable {
        row_idx,
        column: column.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_data;
    use crate::models::DESTINATION_ICAO;

    #[test]
    fn test_last_write_wins() {
        let data = sample_data();
        let mut ledger = CorrectionLedger::new();
        ledger.record(&data, 42, "Fuel", "120").unwrap();
        ledger.record(&data, 42, "Fuel", "125").unwrap();
        ledger.record(&data, 42, "Date", "2024-01-01").unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get(42, "Fuel").unwrap().new_value, CellValue::from("125"));
        assert_eq!(ledger.get(42, "Date").unwrap().new_value, CellValue::from("2024-01-01"));
    }

    #[test]
    fn test_old_value_captured() {
        let data = sample_data();
        let mut ledger = CorrectionLedger::new();
        let c = ledger.record(&data, 42, "Fuel", "125").unwrap();
        assert_eq!(c.old_value, CellValue::from("abc"));
    }

    #[test]
    fn test_rejects_unknown_row() {
        let data = sample_data();
        let mut ledger = CorrectionLedger::new();
        assert_eq!(
            ledger.record(&data, 999, "Fuel", "1").unwrap_err(),
            CorrectionError::UnknownRow { row_idx: 999 }
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_rejects_non_editable_column() {
        let data = sample_data();
        let mut ledger = CorrectionLedger::new();
        assert!(matches!(
            ledger.record(&data, 42, "Flight", "TK10"),
            Err(CorrectionError::ColumnNotEditable { .. })
        ));
        // row 50 is in rows_data but no group references it
        assert!(matches!(
            ledger.record(&data, 50, "Fuel", "1"),
            Err(CorrectionError::ColumnNotEditable { .. })
        ));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_rejects_locked_icao_column() {
        let data = sample_data();
        let mut ledger = CorrectionLedger::new();
        assert_eq!(
            ledger.record(&data, 11, DESTINATION_ICAO, "LTAX").unwrap_err(),
            CorrectionError::LockedColumn {
                row_idx: 11,
                column: DESTINATION_ICAO.into()
            }
        );
        assert!(ledger.record(&data, 11, "Fuel", 130).is_ok());
    }

    #[test]
    fn test_materialize_does_not_mutate() {
        let data = sample_data();
        let mut ledger = CorrectionLedger::new();
        ledger.record(&data, 42, "Fuel", "125").unwrap();

        let corrected = ledger.materialize(&data);
        assert_eq!(corrected[&42].get("Fuel"), Some(&CellValue::from("125")));
        assert_eq!(corrected[&50], data.rows_data[&50]);
        assert_eq!(data.rows_data[&42].get("Fuel"), Some(&CellValue::from("abc")));
        assert_eq!(corrected.len(), data.rows_data.len());
    }

    #[test]
    fn test_batch_partial_acceptance() {
        let data = sample_data();
        let mut ledger = CorrectionLedger::new();
        let mut batch = CorrectionBatch::new();
        batch.insert(42, BTreeMap::from([
            ("Fuel".to_string(), CellValue::from("125")),
            ("Flight".to_string(), CellValue::from("TK0")),
        ]));
        batch.insert(7, BTreeMap::from([("Fuel".to_string(), CellValue::from("1"))]));

        let outcome = ledger.submit_batch(&data, batch);
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_indexed_batch_matches_record() {
        let data = sample_data();
        let batch: CorrectionBatch = BTreeMap::from([
            (11, BTreeMap::from([
                (DESTINATION_ICAO.to_string(), CellValue::from("LTAX")),
                ("Fuel".to_string(), CellValue::from(130)),
            ])),
            (42, BTreeMap::from([
                ("Date".to_string(), CellValue::from("2024-01-01")),
                ("Flight".to_string(), CellValue::from("TK0")),
            ])),
            (50, BTreeMap::from([("Fuel".to_string(), CellValue::from(1))])),
            (999, BTreeMap::from([("Fuel".to_string(), CellValue::from(1))])),
        ]);

        let mut one_by_one = CorrectionLedger::new();
        let mut expected = BatchOutcome::default();
        for (row_idx, cells) in batch.clone() {
            for (column, value) in cells {
                match one_by_one.record(&data, row_idx, &column, value) {
                    Ok(_) => expected.accepted += 1,
                    Err(reason) => expected.rejected.push(Rejection { row_idx, column, reason }),
                }
            }
        }

        let index = RowIndex::build(&data);
        let mut indexed = CorrectionLedger::new();
        let outcome = indexed.submit_indexed(&data, &index, batch);

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.accepted, expected.accepted);
        assert_eq!(outcome.rejected, expected.rejected);
        assert_eq!(indexed, one_by_one);
    }

    #[test]
    fn test_revert_and_for_row() {
        let data = sample_data();
        let mut ledger = CorrectionLedger::new();
        ledger.record(&data, 42, "Fuel", "125").unwrap();
        ledger.record(&data, 42, "Date", "2024-01-01").unwrap();
        ledger.record(&data, 11, "Fuel", "1").unwrap();
        assert_eq!(ledger.for_row(42).count(), 2);

        assert!(ledger.revert(42, "Fuel").is_some());
        assert!(ledger.revert(42, "Fuel").is_none());
        assert_eq!(ledger.for_row(42).count(), 1);
    }

    #[test]
    fn test_resolves_requires_changed_value() {
        let data = sample_data();
        let fuel_group = &data.categories[1].errors[0];
        let mut ledger = CorrectionLedger::new();
        ledger.record(&data, 42, "Fuel", "abc").unwrap();
        assert!(!ledger.resolves(fuel_group, 42));
        ledger.record(&data, 42, "Fuel", "125").unwrap();
        assert!(ledger.resolves(fuel_group, 42));

        let date_group = &data.categories[1].errors[1];
        assert!(!ledger.resolves(date_group, 42));
    }
}
