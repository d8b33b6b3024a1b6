//! Tabular data model shared by every statistical test.
//!
//! A [`DataTable`] is an ordered set of equally long named columns. Cells are
//! loosely typed [`Value`]s: the same CSV may carry numeric measurements next
//! to categorical labels, and tests decide per column how to read them.
//!
//! Construction paths:
//! - CSV text via [`DataTable::from_csv_reader`] (header row required)
//! - JSON row objects via [`DataTable::from_json_rows`] (stored preview samples)
//! - Column vectors via [`DataTable::new`]
//!
//! Tables are never mutated by tests; filtering produces fresh vectors.

use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use std::io;
use thiserror::Error;

/// Tokens treated as missing when parsing text cells.
const MISSING_TOKENS: [&str; 7] = ["", "NA", "N/A", "NaN", "nan", "null", "None"];

/// Errors raised while assembling a table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("column '{name}' has {found} values, expected {expected}")]
    RaggedColumn {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Parse a raw text cell: missing tokens, then numbers, then booleans, else text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if MISSING_TOKENS.contains(&trimmed) {
            return Value::Missing;
        }
        if let Ok(x) = trimmed.parse::<f64>() {
            if x.is_finite() {
                return Value::Number(x);
            }
        }
        match trimmed {
            "true" | "True" | "TRUE" => Value::Bool(true),
            "false" | "False" | "FALSE" => Value::Bool(false),
            _ => Value::Text(trimmed.to_string()),
        }
    }

    /// Convert a JSON scalar. Nested arrays/objects are kept as their JSON text.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Missing,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Missing),
            JsonValue::String(s) => Value::parse(s),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view. Booleans read as 0/1 so binary outcomes stay usable.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(x) => Some(*x),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Category label used for grouping and display.
    ///
    /// Integral numbers print without a fractional part so that coded factor
    /// levels read `-1` / `1` rather than `-1.0` / `1.0`.
    pub fn label(&self) -> String {
        match self {
            Value::Missing => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(x) => format_number(*x),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Missing => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(x) => JsonValue::from(*x),
            Value::Text(s) => JsonValue::String(s.clone()),
        }
    }
}

/// Render a float the way category labels expect it.
pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

/// A named column of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Convenience constructor for a fully numeric column.
    pub fn numeric(name: impl Into<String>, values: &[f64]) -> Self {
        Self::new(name, values.iter().map(|&x| Value::Number(x)).collect())
    }

    /// Convenience constructor for a text column.
    pub fn text<S: AsRef<str>>(name: impl Into<String>, values: &[S]) -> Self {
        Self::new(
            name,
            values.iter().map(|s| Value::parse(s.as_ref())).collect(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> &Value {
        self.values.get(row).unwrap_or(&Value::Missing)
    }

    /// A column is numeric when it has at least one value and every
    /// non-missing cell is a number.
    pub fn is_numeric(&self) -> bool {
        let mut seen = false;
        for v in &self.values {
            match v {
                Value::Missing => {}
                Value::Number(_) => seen = true,
                _ => return false,
            }
        }
        seen
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    /// Non-missing numeric cells in row order.
    pub fn numbers(&self) -> Vec<f64> {
        self.values.iter().filter_map(Value::as_f64).collect()
    }

    /// Reported dtype, in the vocabulary dataset profiles use.
    pub fn dtype(&self) -> &'static str {
        if self.is_numeric() {
            if self
                .values
                .iter()
                .filter_map(Value::as_f64)
                .all(|x| x.fract() == 0.0)
            {
                "int64"
            } else {
                "float64"
            }
        } else if self
            .values
            .iter()
            .all(|v| matches!(v, Value::Bool(_) | Value::Missing))
            && self.values.iter().any(|v| !v.is_missing())
        {
            "bool"
        } else {
            "object"
        }
    }
}

/// An immutable, column-oriented table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    columns: Vec<Column>,
    n_rows: usize,
}

impl DataTable {
    /// Build a table, checking that all columns share one length and one name space.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        let mut names = HashSet::new();
        for col in &columns {
            if !names.insert(col.name.clone()) {
                return Err(TableError::DuplicateColumn(col.name.clone()));
            }
            if col.len() != n_rows {
                return Err(TableError::RaggedColumn {
                    name: col.name.clone(),
                    expected: n_rows,
                    found: col.len(),
                });
            }
        }
        Ok(Self { columns, n_rows })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse CSV with a header row. Short records are padded with missing cells.
    pub fn from_csv_reader<R: io::Read>(reader: R) -> Result<Self, TableError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut cells: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];

        for record in rdr.records() {
            let record = record?;
            for (i, col) in cells.iter_mut().enumerate() {
                col.push(record.get(i).map(Value::parse).unwrap_or(Value::Missing));
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column::new(name, values))
            .collect();
        Self::new(columns)
    }

    pub fn from_csv_str(text: &str) -> Result<Self, TableError> {
        Self::from_csv_reader(text.as_bytes())
    }

    /// Build a table from JSON row objects. Column order follows first appearance.
    pub fn from_json_rows(rows: &[Map<String, JsonValue>]) -> Self {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            for key in row.keys() {
                if seen.insert(key.clone()) {
                    names.push(key.clone());
                }
            }
        }
        let columns = names
            .into_iter()
            .map(|name| {
                let values = rows
                    .iter()
                    .map(|row| row.get(&name).map(Value::from_json).unwrap_or(Value::Missing))
                    .collect();
                Column::new(name, values)
            })
            .collect();
        Self {
            columns,
            n_rows: rows.len(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn numeric_column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_numeric())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Total missing cells across the table.
    pub fn missing_cells(&self) -> usize {
        self.columns.iter().map(Column::null_count).sum()
    }

    /// Row indices where every named column holds a value.
    pub fn complete_rows(&self, names: &[&str]) -> Vec<usize> {
        let cols: Vec<&Column> = names.iter().filter_map(|n| self.column(n)).collect();
        (0..self.n_rows)
            .filter(|&r| cols.iter().all(|c| !c.get(r).is_missing()))
            .collect()
    }

    /// Keep only the first `n` rows.
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.n_rows);
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.values[..n].to_vec()))
                .collect(),
            n_rows: n,
        }
    }

    /// Serialize back to CSV text (header + rows).
    pub fn to_csv_string(&self) -> Result<String, TableError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for r in 0..self.n_rows {
            wtr.write_record(self.columns.iter().map(|c| c.get(r).label()))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| TableError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// BLAKE3 fingerprint of the table contents, stable across reconstructions.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for col in &self.columns {
            hasher.update(col.name.as_bytes());
            hasher.update(&[0]);
            for v in &col.values {
                hasher.update(v.label().as_bytes());
                hasher.update(&[if v.is_missing() { 2 } else { 1 }]);
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}
