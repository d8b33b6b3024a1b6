//! Standardized outcome of a single statistical test run.

use crate::charts::ChartSpec;
use crate::kind::{TestCategory, TestKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Loosely typed extension map for test-specific output.
pub type JsonMap = Map<String, Value>;

/// Expected domain failures. These never escape a test implementation as
/// errors; they become `success = false` results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TestError {
    #[error("Missing required configuration key '{0}'")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Column '{0}' is not numeric")]
    NotNumeric(String),

    #[error("{0}")]
    InsufficientData(String),

    #[error("{0}")]
    Degenerate(String),
}

impl TestError {
    /// Configuration problems, as opposed to data inadequacy.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TestError::MissingConfig(_) | TestError::InvalidConfig(_)
        )
    }

    pub fn insufficient(msg: impl Into<String>) -> Self {
        TestError::InsufficientData(msg.into())
    }

    pub fn degenerate(msg: impl Into<String>) -> Self {
        TestError::Degenerate(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        TestError::InvalidConfig(msg.into())
    }
}

/// Result of running one test. Produced once and never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub test_type: String,
    pub test_category: String,
    pub success: bool,
    pub summary: JsonMap,
    pub details: JsonMap,
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
    #[serde(default)]
    pub interpretation_context: JsonMap,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Set whenever `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl AnalysisResult {
    /// Empty successful result for a kind; callers fill the maps.
    pub fn success(kind: TestKind) -> Self {
        Self {
            test_type: kind.as_str().to_string(),
            test_category: kind.category().as_str().to_string(),
            success: true,
            summary: JsonMap::new(),
            details: JsonMap::new(),
            charts: Vec::new(),
            interpretation_context: JsonMap::new(),
            warnings: Vec::new(),
            error: None,
            duration_ms: None,
        }
    }

    /// Failed result carrying a human-readable error.
    pub fn failure(kind: TestKind, error: &TestError) -> Self {
        Self::failed_with(
            kind.as_str(),
            kind.category().as_str(),
            error.to_string(),
        )
    }

    /// Failed result for types outside the catalog, or engine-level faults.
    pub fn failed_with(test_type: &str, category: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut details = JsonMap::new();
        details.insert("error".into(), Value::String(error.clone()));
        Self {
            test_type: test_type.to_string(),
            test_category: category.to_string(),
            success: false,
            summary: JsonMap::new(),
            details,
            charts: Vec::new(),
            interpretation_context: JsonMap::new(),
            warnings: Vec::new(),
            error: Some(error),
            duration_ms: None,
        }
    }

    pub fn category(&self) -> Option<TestCategory> {
        TestKind::parse(&self.test_type).ok().map(TestKind::category)
    }

    /// Stamp elapsed time, mirrored into `details` for persisted readers.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self.details
            .insert("duration_ms".into(), Value::from(duration_ms));
        self
    }

    pub fn summary_f64(&self, key: &str) -> Option<f64> {
        self.summary.get(key).and_then(Value::as_f64)
    }

    pub fn summary_bool(&self, key: &str) -> Option<bool> {
        self.summary.get(key).and_then(Value::as_bool)
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }
}

/// Convert a `json!` object literal into a map; non-objects become empty.
pub fn object(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

/// JSON number for a float, `null` when not finite.
pub fn num(x: f64) -> Value {
    if x.is_finite() {
        Value::from(x)
    } else {
        Value::Null
    }
}

/// JSON number for an optional float.
pub fn opt_num(x: Option<f64>) -> Value {
    x.map(num).unwrap_or(Value::Null)
}

/// Round to `places` decimals.
pub fn round_to(x: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (x * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_sets_error_in_both_places() {
        let r = AnalysisResult::failure(
            TestKind::OneSampleT,
            &TestError::MissingConfig("population_mean".into()),
        );
        assert!(!r.success);
        assert_eq!(
            r.error.as_deref(),
            Some("Missing required configuration key 'population_mean'")
        );
        assert_eq!(
            r.details.get("error").and_then(Value::as_str),
            r.error.as_deref()
        );
        assert!(r.summary.is_empty());
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn duration_mirrored_into_details() {
        let r = AnalysisResult::success(TestKind::CChart).with_duration(12);
        assert_eq!(r.duration_ms, Some(12));
        assert_eq!(r.details["duration_ms"], 12);
    }

    #[test]
    fn non_finite_numbers_serialize_as_null() {
        assert_eq!(num(f64::NAN), Value::Null);
        assert_eq!(num(1.5), Value::from(1.5));
        assert_eq!(round_to(1.23456, 2), 1.23);
    }
}
