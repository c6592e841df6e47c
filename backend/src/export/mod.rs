//! Clean and error CSV exports.
//!
//! An error instance is *open* until the ledger changes a column its group
//! lets the user edit. The clean export holds corrected rows with no open
//! instance, including rows that never had one. The errors export holds one
//! line per open instance, with four leading columns:
//!
//! | Column           | Content                         |
//! |------------------|---------------------------------|
//! | `Error_Category` | category name                   |
//! | `Error_Reason`   | group reason                    |
//! | `Error_Details`  | row `cell_data`, empty if none  |
//! | `Row_Index`      | `row_idx`                       |
//!
//! Neither export produces an empty file: no qualifying rows is an error.
//! A referenced row with no snapshot in `rows_data` is an error too; exports
//! never fill missing rows with blanks.
//!
//! The CSV header is taken from the first record. Columns that only appear in
//! later records are left out and listed in [`CsvFile::dropped_columns`].

use serde::Serialize;
use std::collections::BTreeSet;

use crate::api::logs::{log_success, log_warning};
use crate::corrections::CorrectionLedger;
use crate::error::{ExportError, ExportResult, ModelError};
use crate::models::{CellValue, ErrorData, Instance, Row};
use crate::parser::{dropped_columns, to_csv};

pub const ERROR_CATEGORY: &str = "Error_Category";
pub const ERROR_REASON: &str = "Error_Reason";
pub const ERROR_DETAILS: &str = "Error_Details";
pub const ROW_INDEX: &str = "Row_Index";

/// Which export to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Clean,
    Errors,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Clean => "clean",
            ExportKind::Errors => "errors",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clean" => Some(ExportKind::Clean),
            "errors" => Some(ExportKind::Errors),
            _ => None,
        }
    }
}

/// A generated CSV file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvFile {
    pub filename: String,
    pub content: String,
    pub rows: usize,
    /// Columns of later records missing from the header.
    pub dropped_columns: Vec<String>,
}

impl CsvFile {
    pub fn bytes(&self) -> &[u8] {
        self.content.as_bytes()
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Instances the ledger has not resolved, in category/group/detection order.
pub fn open_instances<'a>(data: &'a ErrorData, ledger: &CorrectionLedger) -> Vec<Instance<'a>> {
    data.instances()
        .filter(|i| !ledger.resolves(i.group, i.row.row_idx))
        .collect()
}

/// Corrected rows with no open instance.
pub fn export_clean(
    data: &ErrorData,
    ledger: &CorrectionLedger,
    base_name: &str,
) -> ExportResult<CsvFile> {
    data.check_integrity()?;
    let open: BTreeSet<usize> = open_instances(data, ledger)
        .iter()
        .map(|i| i.row.row_idx)
        .collect();

    let records: Vec<Row> = data
        .rows_data
        .iter()
        .filter(|(idx, _)| !open.contains(idx))
        .map(|(&idx, row)| ledger.apply(idx, row))
        .collect();

    write(records, ExportKind::Clean, format!("{}_clean", sanitize_filename(base_name)))
}

/// One corrected line per open instance, with error columns prepended.
pub fn export_errors(
    data: &ErrorData,
    ledger: &CorrectionLedger,
    base_name: &str,
) -> ExportResult<CsvFile> {
    data.check_integrity()?;
    let mut records = Vec::new();
    for instance in open_instances(data, ledger) {
        records.push(annotated_row(data, ledger, &instance)?);
    }
    write(records, ExportKind::Errors, format!("{}_errors", sanitize_filename(base_name)))
}

/// Corrected rows of one group, named after its category and reason.
pub fn export_group(
    data: &ErrorData,
    ledger: &CorrectionLedger,
    category: &str,
    reason: &str,
) -> ExportResult<CsvFile> {
    let unknown = || ExportError::UnknownGroup {
        category: category.to_string(),
        reason: reason.to_string(),
    };
    let cat = data.category(category).ok_or_else(unknown)?;
    let group = cat.group(reason).ok_or_else(unknown)?;

    let records = group
        .rows
        .iter()
        .map(|row| {
            annotated_row(
                data,
                ledger,
                &Instance {
                    category: cat,
                    group,
                    row,
                },
            )
        })
        .collect::<ExportResult<Vec<_>>>()?;

    let stem = format!("{}_{}", sanitize_filename(category), sanitize_filename(reason));
    write(records, ExportKind::Errors, stem)
}

/// Both exports; an empty side is reported instead of written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportBundle {
    pub clean: Option<CsvFile>,
    pub errors: Option<CsvFile>,
    /// User-facing notes about skipped exports.
    pub messages: Vec<String>,
}

/// Generate both exports, logging the outcome.
pub fn export_bundle(
    data: &ErrorData,
    ledger: &CorrectionLedger,
    base_name: &str,
) -> ExportResult<ExportBundle> {
    let mut bundle = ExportBundle::default();

    match export_clean(data, ledger, base_name) {
        Ok(file) => {
            log_success(format!("Clean export: {} rows → {}", file.rows, file.filename));
            bundle.clean = Some(file);
        }
        Err(ExportError::NoQualifyingRows(kind)) => {
            log_warning(format!("No rows for the {} export", kind));
            bundle.messages.push(format!("No rows qualify for the {} export", kind));
        }
        Err(e) => return Err(e),
    }

    match export_errors(data, ledger, base_name) {
        Ok(file) => {
            log_success(format!("Errors export: {} lines → {}", file.rows, file.filename));
            bundle.errors = Some(file);
        }
        Err(ExportError::NoQualifyingRows(kind)) => {
            log_warning(format!("No rows for the {} export", kind));
            bundle.messages.push(format!("No rows qualify for the {} export", kind));
        }
        Err(e) => return Err(e),
    }

    Ok(bundle)
}

fn annotated_row(
    data: &ErrorData,
    ledger: &CorrectionLedger,
    instance: &Instance<'_>,
) -> ExportResult<Row> {
    let idx = instance.row.row_idx;
    let snapshot = data.row(idx).ok_or_else(|| ModelError::MissingRowData {
        category: instance.category.name.clone(),
        reason: instance.group.reason.clone(),
        row_idx: idx,
    })?;
    let mut row = ledger.apply(idx, snapshot);
    row.prepend(vec![
        (ERROR_CATEGORY.to_string(), CellValue::from(instance.category.name.as_str())),
        (ERROR_REASON.to_string(), CellValue::from(instance.group.reason.as_str())),
        (
            ERROR_DETAILS.to_string(),
            CellValue::from(instance.row.cell_data().unwrap_or_default()),
        ),
        (ROW_INDEX.to_string(), CellValue::from(idx)),
    ]);
    Ok(row)
}

fn write(records: Vec<Row>, kind: ExportKind, stem: String) -> ExportResult<CsvFile> {
    if records.is_empty() {
        return Err(ExportError::NoQualifyingRows(kind.as_str().to_string()));
    }
    let filename = format!("{}.csv", stem);
    let dropped = dropped_columns(&records);
    if !dropped.is_empty() {
        log_warning(format!(
            "{}: columns missing from the header were left out: {}",
            filename,
            dropped.join(", ")
        ));
    }
    Ok(CsvFile {
        content: to_csv(&records)?,
        rows: records.len(),
        dropped_columns: dropped,
        filename,
    })
}
