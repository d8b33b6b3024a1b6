//! Assumption layer, keyed off the catalog's assumption flags.

use super::{config_columns, config_str, Confidence, FindingCategory as Cat, ValidationFinding, ValidationReport};
use crate::analysis::{complete_labels, complete_numeric, group_slices, groups_in_order, numeric_series, sorted_levels};
use crate::catalog;
use crate::htest;
use crate::kind::TestKind;
use crate::linear_model;
use crate::result::JsonMap;
use crate::table::DataTable;

const ALPHA: f64 = 0.05;
const MIN_NORMALITY_N: usize = 8;
const SHAPIRO_MAX_N: usize = 5000;
const VIF_LIMIT: f64 = 10.0;

/// Non-parametric fallback suggested when normality fails.
fn alternative(kind: TestKind) -> Option<&'static str> {
    match kind {
        TestKind::TwoSampleT => Some("mann_whitney"),
        TestKind::OneWayAnova => Some("kruskal_wallis"),
        TestKind::PairedT => Some("Wilcoxon signed-rank test"),
        _ => None,
    }
}

pub fn validate_assumptions(
    test_type: &str,
    config: &JsonMap,
    table: Option<&DataTable>,
) -> ValidationReport {
    let Some(table) = table.filter(|t| !t.is_empty()) else {
        let mut report = ValidationReport::from_findings(
            vec![ValidationFinding::info(
                Cat::Assumption,
                "No data available to check assumptions",
            )],
            Vec::new(),
        );
        report.confidence = Confidence::Medium;
        return report;
    };
    let Ok(kind) = TestKind::parse(test_type) else {
        return ValidationReport::from_findings(Vec::new(), Vec::new());
    };
    let req = catalog::entry(kind);
    let mut findings = Vec::new();
    let mut recommendations = Vec::new();

    if req.assumes_normality {
        for (label, values) in normality_samples(kind, config, table) {
            if values.len() < MIN_NORMALITY_N {
                continue;
            }
            let (test_name, outcome) = if values.len() <= SHAPIRO_MAX_N {
                ("Shapiro-Wilk", htest::shapiro_wilk(&values))
            } else {
                ("D'Agostino-Pearson", htest::dagostino_pearson(&values))
            };
            let Some((_, p)) = outcome else { continue };
            if p < ALPHA {
                findings.push(
                    ValidationFinding::warning(
                        Cat::Assumption,
                        format!("Normality assumption may be violated for '{label}' (p={p:.4})"),
                    )
                    .with_detail(format!(
                        "The {test_name} test suggests the data is not normally distributed. \
                         Consider a non-parametric alternative."
                    )),
                );
                if let Some(alt) = alternative(kind) {
                    recommendations.push(format!(
                        "Consider using '{alt}' instead: it does not require normality."
                    ));
                }
            }
        }
    }

    if req.assumes_equal_variance {
        if let Some(p) = levene_p(config, table) {
            if p < ALPHA {
                findings.push(
                    ValidationFinding::warning(
                        Cat::Assumption,
                        format!("Equal variance assumption may be violated (Levene's p={p:.4})"),
                    )
                    .with_detail(
                        "Group variances appear unequal. Welch's correction applies where available.",
                    ),
                );
            }
        }
    }

    if req.assumes_expected_counts {
        if let Some(pct_low) = low_expected_pct(config, table) {
            if pct_low > 20.0 {
                findings.push(
                    ValidationFinding::warning(
                        Cat::Assumption,
                        format!("{pct_low:.0}% of expected cell counts are < 5"),
                    )
                    .with_detail(
                        "Chi-square test may not be valid. Consider Fisher's exact test or combining categories.",
                    ),
                );
                recommendations.push("Combine small categories or use Fisher's exact test.".to_string());
            }
        }
    }

    if req.checks_multicollinearity {
        for (name, vif) in predictor_vifs(config, table) {
            if vif > VIF_LIMIT {
                findings.push(
                    ValidationFinding::warning(
                        Cat::Assumption,
                        format!("High multicollinearity: VIF={vif:.1} for '{name}'"),
                    )
                    .with_detail(
                        "VIF > 10 suggests strong multicollinearity. Consider removing correlated predictors.",
                    ),
                );
            }
        }
    }

    ValidationReport::from_findings(findings, recommendations)
}

/// Samples whose normality matters: per group when the test groups its
/// response, the differences for paired data, else the analysed column.
fn normality_samples(kind: TestKind, config: &JsonMap, table: &DataTable) -> Vec<(String, Vec<f64>)> {
    if kind == TestKind::PairedT {
        let (Some(before), Some(after)) = (
            config_str(config, "column_before"),
            config_str(config, "column_after"),
        ) else {
            return Vec::new();
        };
        return match complete_numeric(table, &[before, after]) {
            Ok(cols) => {
                let diffs = cols[1].iter().zip(&cols[0]).map(|(a, b)| a - b).collect();
                vec![(format!("{after} - {before}"), diffs)]
            }
            Err(_) => Vec::new(),
        };
    }
    let y = config_str(config, "column").or_else(|| config_str(config, "y_column"));
    let Some(y) = y else { return Vec::new() };
    let group = config_str(config, "x_column").or_else(|| config_str(config, "factor_a"));
    match group {
        Some(x) if matches!(
            kind,
            TestKind::TwoSampleT | TestKind::OneWayAnova | TestKind::TwoWayAnova
        ) =>
        {
            groups_in_order(table, y, x)
                .map(|groups| {
                    groups
                        .into_iter()
                        .map(|(label, values)| (format!("{y} [{x}={label}]"), values))
                        .collect()
                })
                .unwrap_or_default()
        }
        _ => numeric_series(table, y)
            .map(|values| vec![(y.to_string(), values)])
            .unwrap_or_default(),
    }
}

fn levene_p(config: &JsonMap, table: &DataTable) -> Option<f64> {
    let y = config_str(config, "y_column")?;
    let x = config_str(config, "x_column").or_else(|| config_str(config, "factor_a"))?;
    let groups: Vec<(String, Vec<f64>)> = groups_in_order(table, y, x)
        .ok()?
        .into_iter()
        .filter(|(_, v)| v.len() >= 2)
        .collect();
    if groups.len() < 2 {
        return None;
    }
    htest::levene(&group_slices(&groups)).map(|(_, p)| p)
}

/// Percentage of contingency cells whose expected count is below 5.
fn low_expected_pct(config: &JsonMap, table: &DataTable) -> Option<f64> {
    let a = config_str(config, "column_a")?;
    let b = config_str(config, "column_b")?;
    let labels = complete_labels(table, &[a, b]).ok()?;
    let (rows, cols) = (sorted_levels(&labels[0]), sorted_levels(&labels[1]));
    let total = labels[0].len() as f64;
    if total == 0.0 {
        return None;
    }
    let count = |values: &[String], lvl: &String| values.iter().filter(|v| *v == lvl).count() as f64;
    let row_totals: Vec<f64> = rows.iter().map(|r| count(&labels[0], r)).collect();
    let col_totals: Vec<f64> = cols.iter().map(|c| count(&labels[1], c)).collect();
    let low = row_totals
        .iter()
        .flat_map(|rt| col_totals.iter().map(move |ct| rt * ct / total))
        .filter(|e| *e < 5.0)
        .count();
    Some(low as f64 / (rows.len() * cols.len()) as f64 * 100.0)
}

fn predictor_vifs(config: &JsonMap, table: &DataTable) -> Vec<(String, f64)> {
    let names: Vec<String> = config_columns(config, "x_columns")
        .into_iter()
        .filter(|n| table.column(n).is_some_and(|c| c.is_numeric()))
        .collect();
    if names.len() < 2 {
        return Vec::new();
    }
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let Ok(predictors) = complete_numeric(table, &refs) else {
        return Vec::new();
    };
    if predictors[0].len() <= names.len() + 1 {
        return Vec::new();
    }
    names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), linear_model::vif(&predictors, i)))
        .collect()
}
