//! Positional, schema-driven encoding of [`ErrorData`].
//!
//! Every field name used anywhere in the payload, column names included, is
//! interned once in `meta.field_map`. Records become arrays whose slots follow
//! the field order listed in `meta.schemas`:
//!
//! ```text
//! category   [name, file_level, [error_group...]]
//! error_group[reason, [column_idx...], [row_error...]]
//! row_error  [row_idx, cell_data, file_level, highlight, [column_idx, value, ...]]
//! row_data   [row_idx, [column_idx, value, ...]]
//! ```
//!
//! The decoder reads slot positions from the payload's own schemas, so field
//! order may change between producer and consumer versions. Any unknown index,
//! missing schema field or arity mismatch rejects the whole payload.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use crate::error::{CodecError, CodecResult};
use crate::models::{CellValue, ErrorCategory, ErrorData, ErrorGroup, ErrorRow, ErrorSummary, Row};

const CATEGORY_FIELDS: [&str; 3] = ["name", "file_level", "errors"];
const GROUP_FIELDS: [&str; 3] = ["reason", "columns", "rows"];
const ROW_FIELDS: [&str; 5] = ["row_idx", "cell_data", "file_level", "highlight", "columns"];
const ROW_DATA_FIELDS: [&str; 2] = ["row_idx", "columns"];

/// Ordered field names per record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactSchemas {
    pub category: Vec<String>,
    pub error_group: Vec<String>,
    pub row_error: Vec<String>,
    pub row_data: Vec<String>,
}

impl Default for CompactSchemas {
    fn default() -> Self {
        let owned = |fields: &[&str]| fields.iter().map(|f| f.to_string()).collect();
        Self {
            category: owned(&CATEGORY_FIELDS),
            error_group: owned(&GROUP_FIELDS),
            row_error: owned(&ROW_FIELDS),
            row_data: owned(&ROW_DATA_FIELDS),
        }
    }
}

/// Field dictionary and schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactMeta {
    pub field_map: BTreeMap<String, u64>,
    pub schemas: CompactSchemas,
}

/// Compact transfer payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedErrorData {
    pub meta: CompactMeta,
    pub categories: Vec<Value>,
    pub summary: ErrorSummary,
    pub rows_data: Vec<Value>,
}

// =============================================================================
// Encoding
// =============================================================================

/// Interns field names in first-use order.
#[derive(Default)]
struct FieldTable {
    map: BTreeMap<String, u64>,
}

impl FieldTable {
    fn intern(&mut self, name: &str) -> u64 {
        let next = self.map.len() as u64;
        *self.map.entry(name.to_string()).or_insert(next)
    }

    fn cells(&mut self, row: &Row) -> Value {
        let mut flat = Vec::with_capacity(row.len() * 2);
        for (column, value) in row.iter() {
            flat.push(json!(self.intern(column)));
            flat.push(json!(value));
        }
        Value::Array(flat)
    }
}

/// Encode a snapshot.
pub fn encode(data: &ErrorData) -> OptimizedErrorData {
    let schemas = CompactSchemas::default();
    let mut table = FieldTable::default();
    for field in CATEGORY_FIELDS
        .iter()
        .chain(&GROUP_FIELDS)
        .chain(&ROW_FIELDS)
        .chain(&ROW_DATA_FIELDS)
    {
        table.intern(field);
    }

    let categories = data
        .categories
        .iter()
        .map(|category| {
            let groups: Vec<Value> = category
                .errors
                .iter()
                .map(|group| encode_group(group, &mut table))
                .collect();
            json!([category.name, category.file_level, groups])
        })
        .collect();

    let rows_data = data
        .rows_data
        .iter()
        .map(|(idx, row)| json!([idx, table.cells(row)]))
        .collect();

    OptimizedErrorData {
        meta: CompactMeta {
            field_map: table.map,
            schemas,
        },
        categories,
        summary: data.summary.clone(),
        rows_data,
    }
}

fn encode_group(group: &ErrorGroup, table: &mut FieldTable) -> Value {
    let columns: Vec<u64> = group.columns.iter().map(|c| table.intern(c)).collect();
    let rows: Vec<Value> = group
        .rows
        .iter()
        .map(|row| {
            json!([
                row.row_idx,
                row.cell_data(),
                row.file_level,
                row.highlight,
                table.cells(&row.columns)
            ])
        })
        .collect();
    json!([group.reason, columns, rows])
}

// =============================================================================
// Decoding
// =============================================================================

/// Slot positions of one record kind.
struct Layout {
    kind: &'static str,
    positions: HashMap<&'static str, usize>,
    width: usize,
}

impl Layout {
    fn new(kind: &'static str, schema: &[String], required: &[&'static str]) -> CodecResult<Self> {
        let mut positions = HashMap::new();
        for &field in required {
            let pos = schema
                .iter()
                .position(|f| f == field)
                .ok_or_else(|| CodecError::MissingSchemaField {
                    schema: kind.to_string(),
                    field: field.to_string(),
                })?;
            positions.insert(field, pos);
        }
        Ok(Self {
            kind,
            positions,
            width: schema.len(),
        })
    }

    fn record<'v>(&self, value: &'v Value) -> CodecResult<Record<'v, '_>> {
        let slots = value.as_array().ok_or_else(|| self.malformed("record is not an array"))?;
        if slots.len() != self.width {
            return Err(CodecError::ArityMismatch {
                kind: self.kind.to_string(),
                expected: self.width,
                found: slots.len(),
            });
        }
        Ok(Record { slots, layout: self })
    }

    fn malformed(&self, message: impl Into<String>) -> CodecError {
        CodecError::Malformed {
            kind: self.kind.to_string(),
            message: message.into(),
        }
    }
}

struct Record<'v, 'l> {
    slots: &'v [Value],
    layout: &'l Layout,
}

impl<'v> Record<'v, '_> {
    fn get(&self, field: &str) -> &'v Value {
        &self.slots[self.layout.positions[field]]
    }

    fn str(&self, field: &str) -> CodecResult<&'v str> {
        self.get(field)
            .as_str()
            .ok_or_else(|| self.layout.malformed(format!("'{}' is not a string", field)))
    }

    fn bool(&self, field: &str) -> CodecResult<bool> {
        self.get(field)
            .as_bool()
            .ok_or_else(|| self.layout.malformed(format!("'{}' is not a boolean", field)))
    }

    fn index(&self, field: &str) -> CodecResult<usize> {
        self.get(field)
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| self.layout.malformed(format!("'{}' is not an index", field)))
    }

    fn array(&self, field: &str) -> CodecResult<&'v [Value]> {
        self.get(field)
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| self.layout.malformed(format!("'{}' is not an array", field)))
    }
}

struct Decoder<'a> {
    names: HashMap<u64, &'a str>,
    category: Layout,
    group: Layout,
    row: Layout,
    row_data: Layout,
}

impl<'a> Decoder<'a> {
    fn new(meta: &'a CompactMeta) -> CodecResult<Self> {
        let names = meta
            .field_map
            .iter()
            .map(|(name, &idx)| (idx, name.as_str()))
            .collect::<HashMap<_, _>>();
        if names.len() != meta.field_map.len() {
            return Err(CodecError::Malformed {
                kind: "field_map".into(),
                message: "two fields share one index".into(),
            });
        }

        Ok(Self {
            names,
            category: Layout::new("category", &meta.schemas.category, &CATEGORY_FIELDS)?,
            group: Layout::new("error_group", &meta.schemas.error_group, &GROUP_FIELDS)?,
            row: Layout::new("row_error", &meta.schemas.row_error, &ROW_FIELDS)?,
            row_data: Layout::new("row_data", &meta.schemas.row_data, &ROW_DATA_FIELDS)?,
        })
    }

    fn name(&self, value: &Value) -> CodecResult<&'a str> {
        let idx = value.as_u64().ok_or_else(|| CodecError::Malformed {
            kind: "field_map".into(),
            message: format!("field reference {} is not an index", value),
        })?;
        self.names
            .get(&idx)
            .copied()
            .ok_or(CodecError::UnknownFieldIndex(idx))
    }

    fn cells(&self, layout: &Layout, flat: &[Value]) -> CodecResult<Row> {
        if flat.len() % 2 != 0 {
            return Err(layout.malformed("column list has an odd length"));
        }
        let mut row = Row::new();
        for pair in flat.chunks(2) {
            let column = self.name(&pair[0])?;
            let value: CellValue = serde_json::from_value(pair[1].clone())
                .map_err(|e| layout.malformed(format!("column '{}': {}", column, e)))?;
            row.set(column, value);
        }
        Ok(row)
    }

    fn category(&self, value: &Value) -> CodecResult<ErrorCategory> {
        let rec = self.category.record(value)?;
        let errors = rec
            .array("errors")?
            .iter()
            .map(|g| self.group(g))
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(ErrorCategory {
            name: rec.str("name")?.to_string(),
            errors,
            file_level: rec.bool("file_level")?,
        })
    }

    fn group(&self, value: &Value) -> CodecResult<ErrorGroup> {
        let rec = self.group.record(value)?;
        let columns = rec
            .array("columns")?
            .iter()
            .map(|c| self.name(c).map(String::from))
            .collect::<CodecResult<Vec<_>>>()?;
        let rows = rec
            .array("rows")?
            .iter()
            .map(|r| self.row(r))
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(ErrorGroup {
            reason: rec.str("reason")?.to_string(),
            rows,
            columns,
        })
    }

    fn row(&self, value: &Value) -> CodecResult<ErrorRow> {
        let rec = self.row.record(value)?;
        let cell_data = match rec.get("cell_data") {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            _ => return Err(self.row.malformed("'cell_data' is not a string or null")),
        };
        let columns = self.cells(&self.row, rec.array("columns")?)?;
        Ok(ErrorRow::new(rec.index("row_idx")?, cell_data, columns)
            .with_file_level(rec.bool("file_level")?)
            .with_highlight(rec.bool("highlight")?))
    }

    fn row_data(&self, value: &Value) -> CodecResult<(usize, Row)> {
        let rec = self.row_data.record(value)?;
        Ok((rec.index("row_idx")?, self.cells(&self.row_data, rec.array("columns")?)?))
    }
}

/// Decode a compact payload back into the canonical model.
///
/// The result is checked for referential integrity and summary consistency.
pub fn decode(payload: &OptimizedErrorData) -> CodecResult<ErrorData> {
    let decoder = Decoder::new(&payload.meta)?;

    let categories = payload
        .categories
        .iter()
        .map(|c| decoder.category(c))
        .collect::<CodecResult<Vec<_>>>()?;

    let mut rows_data = BTreeMap::new();
    for value in &payload.rows_data {
        let (idx, row) = decoder.row_data(value)?;
        if rows_data.insert(idx, row).is_some() {
            return Err(decoder.row_data.malformed(format!("row {} appears twice", idx)));
        }
    }

    let data = ErrorData {
        summary: payload.summary.clone(),
        rows_data,
        categories,
    };
    data.validate()?;
    Ok(data)
}
