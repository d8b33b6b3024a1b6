//! Input layer: configuration completeness, sample size, group sizes,
//! numeric conformance and missing data.

use super::{config_columns, config_str, FindingCategory as Cat, ValidationFinding, ValidationReport};
use crate::catalog;
use crate::kind::TestKind;
use crate::result::JsonMap;
use crate::table::DataTable;

const GROUPING_KEYS: [&str; 3] = ["x_column", "factor_a", "factor_b"];

pub fn validate_inputs(
    test_type: &str,
    config: &JsonMap,
    table: Option<&DataTable>,
    row_count: Option<usize>,
) -> ValidationReport {
    let Ok(kind) = TestKind::parse(test_type) else {
        let mut report = ValidationReport::from_findings(
            vec![ValidationFinding::warning(
                Cat::Configuration,
                format!("Unknown test type '{test_type}': cannot validate requirements"),
            )],
            Vec::new(),
        );
        report.confidence = super::Confidence::Low;
        return report;
    };
    let req = catalog::entry(kind);
    let table = table.filter(|t| !t.is_empty());
    let mut findings = Vec::new();
    let mut recommendations = Vec::new();

    for key in req.required_config {
        if config.get(*key).map_or(true, serde_json::Value::is_null) {
            findings.push(
                ValidationFinding::error(
                    Cat::Configuration,
                    format!("Missing required configuration parameter: '{key}'"),
                )
                .with_detail(format!("Test '{test_type}' requires '{key}' in its configuration.")),
            );
        }
    }

    let rows = table
        .map(DataTable::n_rows)
        .or(row_count)
        .unwrap_or(0);
    let min = req.min_samples;
    if rows > 0 && rows < min {
        findings.push(
            ValidationFinding::error(
                Cat::SampleSize,
                format!("Insufficient sample size: {rows} rows (minimum {min} required)"),
            )
            .with_detail(format!(
                "Test '{test_type}' needs at least {min} observations for reliable results."
            )),
        );
        recommendations.push(format!(
            "Collect at least {min} observations before running this test."
        ));
    } else if rows > 0 && rows < min * 2 {
        findings.push(
            ValidationFinding::warning(
                Cat::SampleSize,
                format!(
                    "Small sample size: {rows} rows (minimum {min}, recommended {}+)",
                    min * 2
                ),
            )
            .with_detail("Results may have low statistical power. Consider collecting more data."),
        );
    }

    let Some(table) = table else {
        return ValidationReport::from_findings(findings, recommendations);
    };

    if let Some(min_per_group) = req.min_per_group {
        for key in GROUPING_KEYS {
            let Some(col) = config_str(config, key).and_then(|name| table.column(name)) else {
                continue;
            };
            let small: Vec<String> = group_counts(col)
                .into_iter()
                .filter(|(_, n)| *n < min_per_group)
                .map(|(label, n)| format!("{label}={n}"))
                .collect();
            if !small.is_empty() {
                findings.push(
                    ValidationFinding::error(
                        Cat::SampleSize,
                        format!(
                            "Group(s) too small in '{}': {} (minimum {min_per_group} per group)",
                            col.name(),
                            small.join(", ")
                        ),
                    )
                    .with_detail(
                        "Small groups reduce statistical power and may invalidate test assumptions.",
                    ),
                );
            }
        }
    }

    if req.requires_numeric {
        for key in req.numeric_keys {
            for name in config_columns(config, key) {
                let Some(col) = table.column(&name) else {
                    continue;
                };
                if !col.is_numeric() {
                    findings.push(
                        ValidationFinding::error(
                            Cat::DataType,
                            format!("Column '{name}' is not numeric (dtype: {})", col.dtype()),
                        )
                        .with_detail(
                            "This test requires numeric data. Convert or choose a different column.",
                        ),
                    );
                }
            }
        }
    }

    let cells = table.n_rows() * table.n_cols();
    if cells > 0 {
        let pct = table.missing_cells() as f64 / cells as f64 * 100.0;
        if pct > 20.0 {
            findings.push(
                ValidationFinding::error(
                    Cat::MissingData,
                    format!("High missing data rate: {pct:.1}% of values are missing"),
                )
                .with_detail("Results may be unreliable. Consider imputation or data cleaning."),
            );
            recommendations.push("Address missing data before running analysis.".to_string());
        } else if pct > 5.0 {
            findings.push(
                ValidationFinding::warning(
                    Cat::MissingData,
                    format!("Notable missing data: {pct:.1}% of values are missing"),
                )
                .with_detail("Check if missingness is random or systematic."),
            );
        }
    }

    ValidationReport::from_findings(findings, recommendations)
}

/// Non-missing counts per label, in first-appearance order.
fn group_counts(col: &crate::table::Column) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for v in col.values().iter().filter(|v| !v.is_missing()) {
        let label = v.label();
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((label, 1)),
        }
    }
    counts
}
