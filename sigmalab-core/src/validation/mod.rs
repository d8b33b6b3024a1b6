//! Deterministic validation of a test run.
//!
//! Three layers, each a pure function producing a [`ValidationReport`]:
//! - [`validate_inputs`]: configuration, sample size, data types, missing data
//! - [`validate_outputs`]: ranges and finiteness of reported statistics
//! - [`validate_assumptions`]: normality, equal variance, expected counts, VIF
//!
//! [`run_full_validation`] merges them. Validation is advisory: it never
//! changes or suppresses the result it inspects.

mod assumptions;
mod inputs;
mod outputs;

pub use assumptions::validate_assumptions;
pub use inputs::validate_inputs;
pub use outputs::validate_outputs;

use crate::result::{AnalysisResult, JsonMap};
use crate::table::DataTable;
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Findings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    SampleSize,
    DataType,
    MissingData,
    Configuration,
    Assumption,
    OutputRange,
    Statistical,
}

/// Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub severity: Severity,
    pub category: FindingCategory,
    pub message: String,
    #[serde(default)]
    pub detail: String,
}

impl ValidationFinding {
    pub fn new(severity: Severity, category: FindingCategory, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            detail: String::new(),
        }
    }

    pub fn error(category: FindingCategory, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    pub fn warning(category: FindingCategory, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    pub fn info(category: FindingCategory, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, category, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

// ─── Reports ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub confidence: Confidence,
    #[serde(default)]
    pub findings: Vec<ValidationFinding>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    /// Grade findings: any error fails the report with low confidence,
    /// any warning gives medium, otherwise high.
    pub fn from_findings(findings: Vec<ValidationFinding>, recommendations: Vec<String>) -> Self {
        let has = |s: Severity| findings.iter().any(|f| f.severity == s);
        let confidence = if has(Severity::Error) {
            Confidence::Low
        } else if has(Severity::Warning) {
            Confidence::Medium
        } else {
            Confidence::High
        };
        Self {
            passed: !has(Severity::Error),
            confidence,
            findings,
            recommendations,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
    }

    /// Concatenate findings and recommendations (deduplicated, first
    /// occurrence wins); passed only if every layer passed, confidence is
    /// the lowest layer's.
    pub fn merge(layers: &[ValidationReport]) -> Self {
        let mut findings = Vec::new();
        let mut recommendations: Vec<String> = Vec::new();
        for layer in layers {
            findings.extend(layer.findings.iter().cloned());
            for rec in &layer.recommendations {
                if !recommendations.contains(rec) {
                    recommendations.push(rec.clone());
                }
            }
        }
        Self {
            passed: layers.iter().all(|l| l.passed),
            confidence: layers
                .iter()
                .map(|l| l.confidence)
                .min()
                .unwrap_or(Confidence::High),
            findings,
            recommendations,
        }
    }
}

/// Run all three layers against a finished result and merge them.
///
/// `row_count` is the dataset's reported size, used when no table is
/// available.
pub fn run_full_validation(
    test_type: &str,
    config: &JsonMap,
    table: Option<&DataTable>,
    row_count: Option<usize>,
    result: &AnalysisResult,
) -> ValidationReport {
    ValidationReport::merge(&[
        validate_inputs(test_type, config, table, row_count),
        validate_outputs(result),
        validate_assumptions(test_type, config, table),
    ])
}

// ─── Config helpers ──────────────────────────────────────────────────

/// Column names referenced by a config key: a single string or a list.
pub(crate) fn config_columns(config: &JsonMap, key: &str) -> Vec<String> {
    match config.get(key) {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn config_str<'a>(config: &'a JsonMap, key: &str) -> Option<&'a str> {
    config.get(key).and_then(serde_json::Value::as_str)
}
