//! Output layer: sanity of the numbers a test reported.
//!
//! Non-finite statistics are serialized as `null`, so a `null` under a
//! statistic key is treated as NaN.

use super::{FindingCategory as Cat, ValidationFinding, ValidationReport};
use crate::catalog;
use crate::kind::TestKind;
use crate::result::AnalysisResult;
use serde_json::Value;

const STATISTIC_KEYS: [&str; 7] = [
    "statistic",
    "test_statistic",
    "f_statistic",
    "t_statistic",
    "chi2_statistic",
    "u_statistic",
    "h_statistic",
];

const DF_KEYS: [&str; 4] = ["df", "degrees_of_freedom", "df_between", "df_within"];

const MAX_PLAUSIBLE_EFFECT: f64 = 10.0;

/// A reported value: absent, NaN-like (`null` or non-finite), a number, or
/// something that is not a number at all.
enum Reported<'a> {
    Absent,
    NotFinite,
    Number(f64),
    Other(&'a Value),
}

fn reported<'a>(result: &'a AnalysisResult, key: &str, with_details: bool) -> Reported<'a> {
    let value = result
        .summary
        .get(key)
        .or_else(|| with_details.then(|| result.details.get(key)).flatten());
    match value {
        None => Reported::Absent,
        Some(Value::Null) => Reported::NotFinite,
        Some(v) => match v.as_f64() {
            Some(x) if x.is_finite() => Reported::Number(x),
            Some(_) => Reported::NotFinite,
            None => Reported::Other(v),
        },
    }
}

pub fn validate_outputs(result: &AnalysisResult) -> ValidationReport {
    let mut findings = Vec::new();

    if !result.success {
        findings.push(ValidationFinding::error(
            Cat::Statistical,
            format!(
                "Test did not complete: {}",
                result.error.as_deref().unwrap_or("unknown error")
            ),
        ));
    }

    match reported(result, "p_value", false) {
        Reported::Absent => {}
        Reported::NotFinite => findings.push(ValidationFinding::error(
            Cat::OutputRange,
            "p-value is NaN or infinite: computation likely failed",
        )),
        Reported::Number(p) if !(0.0..=1.0).contains(&p) => findings.push(
            ValidationFinding::error(Cat::OutputRange, format!("p-value out of range: {p} (must be 0-1)")),
        ),
        Reported::Number(_) => {}
        Reported::Other(v) => findings.push(ValidationFinding::error(
            Cat::OutputRange,
            format!("p-value is not numeric: {v}"),
        )),
    }

    for key in STATISTIC_KEYS {
        if let Reported::NotFinite = reported(result, key, false) {
            findings.push(
                ValidationFinding::error(
                    Cat::OutputRange,
                    format!("Test statistic '{key}' is NaN or infinite"),
                )
                .with_detail(
                    "This typically indicates a degenerate dataset (zero variance, identical groups, etc.).",
                ),
            );
        }
    }

    match reported(result, "effect_size", false) {
        Reported::NotFinite => findings.push(ValidationFinding::warning(
            Cat::OutputRange,
            "Effect size is NaN or infinite",
        )),
        Reported::Number(d) if d.abs() > MAX_PLAUSIBLE_EFFECT => findings.push(
            ValidationFinding::warning(
                Cat::Statistical,
                format!("Unusually large effect size: {d:.2}"),
            )
            .with_detail("Effect sizes above 2.0 are rare in practice. Verify the data is correct."),
        ),
        _ => {}
    }

    if let Reported::Number(r2) = reported(result, "r_squared", true) {
        if !(0.0..=1.0).contains(&r2) {
            findings.push(ValidationFinding::error(
                Cat::OutputRange,
                format!("R-squared out of range: {r2} (must be 0-1)"),
            ));
        }
    }

    for key in DF_KEYS {
        if let Reported::Number(df) = reported(result, key, true) {
            if df <= 0.0 {
                findings.push(
                    ValidationFinding::error(
                        Cat::OutputRange,
                        format!("Degrees of freedom '{key}' <= 0: {df}"),
                    )
                    .with_detail("Indicates insufficient data for this test."),
                );
            }
        }
    }

    if let (Reported::Number(lo), Reported::Number(hi)) = (
        reported(result, "ci_lower", true),
        reported(result, "ci_upper", true),
    ) {
        if lo > hi {
            findings.push(ValidationFinding::error(
                Cat::OutputRange,
                format!("Confidence interval inverted: [{lo}, {hi}]"),
            ));
        }
    }

    let expects_charts = TestKind::parse(&result.test_type)
        .map(|k| catalog::entry(k).produces_charts)
        .unwrap_or(false);
    if expects_charts && result.success && result.charts.is_empty() {
        findings.push(
            ValidationFinding::warning(
                Cat::OutputRange,
                "No charts generated for a test that typically produces visualizations",
            )
            .with_detail("Charts help interpret results. This may indicate a rendering issue."),
        );
    }

    for w in &result.warnings {
        findings.push(ValidationFinding::info(
            Cat::Statistical,
            format!("Test warning: {w}"),
        ));
    }

    ValidationReport::from_findings(findings, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::TestError;
    use crate::validation::{Confidence, Severity};
    use serde_json::json;

    fn result_with(summary: Value) -> AnalysisResult {
        let mut r = AnalysisResult::success(TestKind::OneSampleT);
        r.summary = crate::result::object(summary);
        r
    }

    #[test]
    fn clean_output_is_high_confidence() {
        let r = result_with(json!({"p_value": 0.03, "t_statistic": 2.4, "df": 19, "ci_lower": 1.0, "ci_upper": 2.0}));
        let report = validate_outputs(&r);
        assert!(report.passed);
        assert_eq!(report.confidence, Confidence::High);
    }

    #[test]
    fn flags_ranges_and_non_finite_values() {
        let r = result_with(json!({
            "p_value": 1.5,
            "f_statistic": null,
            "effect_size": 14.0,
            "r_squared": -0.2,
            "df_within": 0,
            "ci_lower": 3.0,
            "ci_upper": 1.0,
        }));
        let report = validate_outputs(&r);
        assert!(!report.passed);
        assert_eq!(report.errors().count(), 5);
        assert!(report
            .findings
            .iter()
            .any(|f| f.severity == Severity::Warning && f.message.contains("14.00")));
    }

    #[test]
    fn failures_and_warnings_are_resurfaced() {
        let failed = AnalysisResult::failure(TestKind::CChart, &TestError::insufficient("Need at least 2 points"));
        let report = validate_outputs(&failed);
        assert!(!report.passed);
        assert!(report.findings[0].message.ends_with("Need at least 2 points"));

        let mut warned = AnalysisResult::success(TestKind::FullFactorial);
        warned.warnings.push("heads up".into());
        let report = validate_outputs(&warned);
        assert!(report.passed);
        assert_eq!(report.findings[0].severity, Severity::Info);
        assert_eq!(report.findings[0].message, "Test warning: heads up");
    }

    #[test]
    fn chart_tests_without_charts_warn() {
        let r = AnalysisResult::success(TestKind::IMrChart);
        let report = validate_outputs(&r);
        assert_eq!(report.confidence, Confidence::Medium);
    }
}
