//! In-memory tabular data model.
//!
//! A [`Table`] is a set of named, typed columns of equal length. Cell
//! values are either numbers, raw text, or empty. Column types are
//! inferred once at load time and drive which chart roles a column may
//! take.

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// A single cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Empty,
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Numeric view of the cell. Text and empty cells have none.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Display form used for previews, axis labels and CSV export.
    /// Whole numbers drop the trailing `.0` so a cell loaded as `30`
    /// round-trips as `30`, not `30.0`.
    pub fn render(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Value::Text(s) => s.clone(),
            Value::Empty => String::new(),
        }
    }
}

/// Inferred column type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Every non-empty cell is a finite number.
    Numeric,
    /// Non-numeric with at least one repeated value.
    Categorical,
    /// Non-numeric, all values distinct.
    Text,
}

/// A named column with its inferred type.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    /// Build a column, inferring its type from the values.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let kind = infer_kind(&values);
        Column {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ColumnType::Numeric
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Per-row numeric view. Rows that hold no number yield `None`.
    pub fn numbers(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.values.iter().map(Value::as_number)
    }
}

/// Decide whether a raw text field reads as a number.
///
/// Mirrors the loader's float parsing but keeps two classes of lookalikes
/// as text: non-finite spellings (`NaN`, `inf`) and integers with a
/// redundant leading zero (`007`), which usually encode identifiers.
pub(crate) fn is_numeric_str(s: &str) -> bool {
    let t = s.trim();
    if t.is_empty() {
        return false;
    }
    let digits = t.strip_prefix(['+', '-']).unwrap_or(t);
    if digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.") {
        return false;
    }
    matches!(t.parse::<f64>(), Ok(v) if v.is_finite())
}

fn infer_kind(values: &[Value]) -> ColumnType {
    let filled: Vec<&Value> = values.iter().filter(|v| !v.is_empty()).collect();
    if filled.is_empty() {
        return ColumnType::Text;
    }
    if filled.iter().all(|v| matches!(v, Value::Number(_))) {
        return ColumnType::Numeric;
    }
    let mut seen = HashSet::new();
    let repeated = filled.iter().any(|v| !seen.insert(v.render()));
    if repeated {
        ColumnType::Categorical
    } else {
        ColumnType::Text
    }
}

/// Raised when column lengths disagree.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("column '{column}' has {found} rows, expected {expected}")]
pub struct ShapeError {
    pub column: String,
    pub expected: usize,
    pub found: usize,
}

/// An immutable table of equal-length columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Assemble a table, rejecting ragged column sets.
    pub fn new(columns: Vec<Column>) -> Result<Self, ShapeError> {
        if let Some(first) = columns.first() {
            let expected = first.len();
            for col in &columns[1..] {
                if col.len() != expected {
                    return Err(ShapeError {
                        column: col.name.clone(),
                        expected,
                        found: col.len(),
                    });
                }
            }
        }
        Ok(Table { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Iterate rows as slices of cell references, in column order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
        (0..self.row_count()).map(move |r| self.columns.iter().map(|c| &c.values[r]).collect())
    }

    /// Snapshot sent to the dashboard after an upload.
    pub fn preview(&self) -> TablePreview {
        TablePreview {
            columns: self
                .columns
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name.clone(),
                    kind: c.kind,
                })
                .collect(),
            row_count: self.row_count(),
            rows: self
                .rows()
                .map(|row| row.into_iter().map(Value::render).collect())
                .collect(),
        }
    }
}

/// Column metadata exposed to the dashboard.
#[derive(Clone, Debug, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnType,
}

/// JSON payload backing the data preview pane.
#[derive(Clone, Debug, Serialize)]
pub struct TablePreview {
    pub columns: Vec<ColumnInfo>,
    pub row_count: usize,
    pub rows: Vec<Vec<String>>,
}
