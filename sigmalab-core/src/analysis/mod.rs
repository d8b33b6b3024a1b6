//! Test implementations, grouped by family.
//!
//! Every test is a plain function `fn(&DataTable, &Config) -> Result<AnalysisResult, TestError>`
//! over a typed, serde-deserialized config. [`TypedTest`] adapts such a function
//! to the object-safe [`TestImplementation`] trait the registry stores:
//! - required keys from the catalog are checked before deserialization
//! - malformed configs become `InvalidConfig`
//! - any `TestError` becomes a `success = false` result
//!
//! Tests never panic on bad input and never mutate the table.

pub mod capability;
pub mod comparison;
pub mod descriptive;
pub mod doe;
pub mod regression;
pub mod spc;

use crate::catalog;
use crate::htest;
use crate::kind::TestKind;
use crate::result::{AnalysisResult, JsonMap, TestError};
use crate::table::{Column, DataTable, Value};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

// ─── Trait ───────────────────────────────────────────────────────────

/// A runnable statistical test.
///
/// Implementations must be pure: same table and config, same result.
pub trait TestImplementation: Send + Sync {
    fn kind(&self) -> TestKind;

    /// Run against a table. Expected failures are returned as
    /// `success = false` results, never as panics.
    fn run(&self, table: &DataTable, config: &JsonMap) -> AnalysisResult;
}

/// Signature of a typed test body.
pub type TestBody<C> = fn(&DataTable, &C) -> Result<AnalysisResult, TestError>;

/// Adapter from a typed test body to [`TestImplementation`].
pub struct TypedTest<C> {
    kind: TestKind,
    body: TestBody<C>,
    _config: PhantomData<fn() -> C>,
}

impl<C> TypedTest<C> {
    pub fn new(kind: TestKind, body: TestBody<C>) -> Self {
        Self {
            kind,
            body,
            _config: PhantomData,
        }
    }
}

impl<C: DeserializeOwned> TypedTest<C> {
    fn execute(&self, table: &DataTable, config: &JsonMap) -> Result<AnalysisResult, TestError> {
        for key in catalog::entry(self.kind).required_config {
            match config.get(*key) {
                None | Some(serde_json::Value::Null) => {
                    return Err(TestError::MissingConfig((*key).to_string()))
                }
                Some(_) => {}
            }
        }
        let parsed: C = serde_json::from_value(serde_json::Value::Object(config.clone()))
            .map_err(|e| TestError::invalid(e.to_string()))?;
        (self.body)(table, &parsed)
    }
}

impl<C: DeserializeOwned> TestImplementation for TypedTest<C> {
    fn kind(&self) -> TestKind {
        self.kind
    }

    fn run(&self, table: &DataTable, config: &JsonMap) -> AnalysisResult {
        self.execute(table, config)
            .unwrap_or_else(|e| AnalysisResult::failure(self.kind, &e))
    }
}

// ─── Config defaults ─────────────────────────────────────────────────

pub(crate) fn default_alpha() -> f64 {
    0.05
}

// ─── Column access ───────────────────────────────────────────────────

pub(crate) fn column<'a>(table: &'a DataTable, name: &str) -> Result<&'a Column, TestError> {
    table
        .column(name)
        .ok_or_else(|| TestError::ColumnNotFound(name.to_string()))
}

/// Non-missing values of a numeric column.
pub(crate) fn numeric_series(table: &DataTable, name: &str) -> Result<Vec<f64>, TestError> {
    let col = column(table, name)?;
    if !is_number_like(col) {
        return Err(TestError::NotNumeric(name.to_string()));
    }
    Ok(col.numbers())
}

/// Numeric or boolean cells only (booleans read as 0/1).
fn is_number_like(col: &Column) -> bool {
    let mut seen = false;
    for v in col.values() {
        match v {
            Value::Missing => {}
            Value::Number(_) | Value::Bool(_) => seen = true,
            Value::Text(_) => return false,
        }
    }
    seen
}

/// Numeric columns restricted to rows complete across all of `names`.
pub(crate) fn complete_numeric(
    table: &DataTable,
    names: &[&str],
) -> Result<Vec<Vec<f64>>, TestError> {
    let mut cols = Vec::with_capacity(names.len());
    for name in names {
        let col = column(table, name)?;
        if !is_number_like(col) {
            return Err(TestError::NotNumeric((*name).to_string()));
        }
        cols.push(col);
    }
    let rows = table.complete_rows(names);
    Ok(cols
        .iter()
        .map(|c| rows.iter().filter_map(|&r| c.get(r).as_f64()).collect())
        .collect())
}

/// Numeric values of `name` at the given row indices.
pub(crate) fn numeric_rows(
    table: &DataTable,
    name: &str,
    rows: &[usize],
) -> Result<Vec<f64>, TestError> {
    let col = column(table, name)?;
    if !is_number_like(col) {
        return Err(TestError::NotNumeric(name.to_string()));
    }
    Ok(rows.iter().filter_map(|&r| col.get(r).as_f64()).collect())
}

/// Labels of `names` (any type) on rows complete across all of `names`.
pub(crate) fn complete_labels(
    table: &DataTable,
    names: &[&str],
) -> Result<Vec<Vec<String>>, TestError> {
    let mut cols = Vec::with_capacity(names.len());
    for name in names {
        cols.push(column(table, name)?);
    }
    let rows = table.complete_rows(names);
    Ok(cols
        .iter()
        .map(|c| rows.iter().map(|&r| c.get(r).label()).collect())
        .collect())
}

// ─── Grouping ────────────────────────────────────────────────────────

/// Numeric `y` split by the labels of `x`, groups in first-appearance order.
pub(crate) fn groups_in_order(
    table: &DataTable,
    y: &str,
    x: &str,
) -> Result<Vec<(String, Vec<f64>)>, TestError> {
    let ycol = column(table, y)?;
    let xcol = column(table, x)?;
    if !is_number_like(ycol) {
        return Err(TestError::NotNumeric(y.to_string()));
    }
    let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
    for r in table.complete_rows(&[y, x]) {
        let Some(value) = ycol.get(r).as_f64() else {
            continue;
        };
        let label = xcol.get(r).label();
        match groups.iter_mut().find(|(name, _)| *name == label) {
            Some((_, values)) => values.push(value),
            None => groups.push((label, vec![value])),
        }
    }
    Ok(groups)
}

/// Same as [`groups_in_order`], groups sorted by level.
pub(crate) fn groups_sorted(
    table: &DataTable,
    y: &str,
    x: &str,
) -> Result<Vec<(String, Vec<f64>)>, TestError> {
    let mut groups = groups_in_order(table, y, x)?;
    groups.sort_by(|a, b| compare_levels(&a.0, &b.0));
    Ok(groups)
}

/// Level ordering: numerically when both labels are numbers, else lexically.
pub(crate) fn compare_levels(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Distinct labels sorted by [`compare_levels`].
pub(crate) fn sorted_levels(labels: &[String]) -> Vec<String> {
    let mut levels = labels.to_vec();
    levels.sort_by(|a, b| compare_levels(a, b));
    levels.dedup();
    levels
}

pub(crate) fn group_slices(groups: &[(String, Vec<f64>)]) -> Vec<&[f64]> {
    groups.iter().map(|(_, v)| v.as_slice()).collect()
}

// ─── Shared interpretation ───────────────────────────────────────────

/// Cohen's d magnitude label.
pub(crate) fn effect_label(d: f64) -> &'static str {
    let ad = d.abs();
    if ad < 0.2 {
        "negligible"
    } else if ad < 0.5 {
        "small"
    } else if ad < 0.8 {
        "medium"
    } else {
        "large"
    }
}

/// Shapiro-Wilk screen used by parametric comparisons. Appends a warning
/// and returns `false` when the group looks non-normal.
pub(crate) fn check_normality(values: &[f64], name: &str, warnings: &mut Vec<String>) -> bool {
    if values.len() < 3 {
        return true;
    }
    let head = &values[..values.len().min(5000)];
    match htest::shapiro_wilk(head) {
        Some((_, p)) if p < 0.05 => {
            warnings.push(format!(
                "Group '{name}' may not be normally distributed (Shapiro-Wilk p={p:.4}). \
                 Consider a non-parametric alternative."
            ));
            false
        }
        _ => true,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::table::{Column, DataTable};

    pub fn table(columns: Vec<Column>) -> DataTable {
        DataTable::new(columns).unwrap()
    }

    pub fn config(value: serde_json::Value) -> crate::result::JsonMap {
        crate::result::object(value)
    }

    /// Deterministic pseudo-normal values (sum of uniforms) around `mean`.
    pub fn bell(n: usize, mean: f64, sd: f64, seed: u64) -> Vec<f64> {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let s: f64 = (0..12).map(|_| rng.gen::<f64>()).sum::<f64>() - 6.0;
                mean + sd * s
            })
            .collect()
    }
}
