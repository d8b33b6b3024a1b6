//! Static metadata for every test kind.
//!
//! One [`TestRequirement`] per [`TestKind`], in catalog order. The catalog
//! feeds three consumers:
//! - config-key checks before a test runs
//! - applicability scoring against a dataset profile
//! - the input and assumption layers of validation

use crate::kind::{TestCategory, TestKind};
use crate::table::DataTable;
use serde::{Deserialize, Serialize};

// ─── Requirement entries ─────────────────────────────────────────────

/// Requirements and descriptive metadata for one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRequirement {
    #[serde(rename = "test_type")]
    pub kind: TestKind,
    pub name: &'static str,
    pub category: TestCategory,
    pub description: &'static str,
    pub y_type: Option<&'static str>,
    pub x_type: Option<&'static str>,
    /// Rows needed before the test is offered for a dataset.
    pub min_rows: usize,
    /// Rows below which validation flags the sample as too small.
    pub min_samples: usize,
    pub min_per_group: Option<usize>,
    pub required_config: &'static [&'static str],
    pub optional_config: &'static [&'static str],
    pub requires_numeric: bool,
    /// Config keys naming columns that must hold numbers.
    pub numeric_keys: &'static [&'static str],
    pub assumes_normality: bool,
    pub assumes_equal_variance: bool,
    pub assumes_expected_counts: bool,
    pub checks_multicollinearity: bool,
    /// Successful runs are expected to carry at least one chart.
    pub produces_charts: bool,
}

impl TestRequirement {
    const fn new(kind: TestKind, name: &'static str, description: &'static str) -> Self {
        Self {
            kind,
            name,
            category: kind.category(),
            description,
            y_type: None,
            x_type: None,
            min_rows: 0,
            min_samples: 1,
            min_per_group: None,
            required_config: &[],
            optional_config: &[],
            requires_numeric: false,
            numeric_keys: &[],
            assumes_normality: false,
            assumes_equal_variance: false,
            assumes_expected_counts: false,
            checks_multicollinearity: false,
            produces_charts: false,
        }
    }

    const fn types(mut self, y: Option<&'static str>, x: Option<&'static str>) -> Self {
        self.y_type = y;
        self.x_type = x;
        self
    }

    const fn sizes(mut self, min_rows: usize, min_samples: usize) -> Self {
        self.min_rows = min_rows;
        self.min_samples = min_samples;
        self
    }

    const fn per_group(mut self, n: usize) -> Self {
        self.min_per_group = Some(n);
        self
    }

    const fn config(mut self, required: &'static [&'static str], optional: &'static [&'static str]) -> Self {
        self.required_config = required;
        self.optional_config = optional;
        self
    }

    const fn numeric(mut self, keys: &'static [&'static str]) -> Self {
        self.requires_numeric = true;
        self.numeric_keys = keys;
        self
    }

    const fn normality(mut self) -> Self {
        self.assumes_normality = true;
        self
    }

    const fn equal_variance(mut self) -> Self {
        self.assumes_equal_variance = true;
        self
    }

    const fn expected_counts(mut self) -> Self {
        self.assumes_expected_counts = true;
        self
    }

    const fn multicollinearity(mut self) -> Self {
        self.checks_multicollinearity = true;
        self
    }

    const fn charts(mut self) -> Self {
        self.produces_charts = true;
        self
    }
}

use TestKind as K;

const CONTINUOUS: Option<&str> = Some("continuous");
const CATEGORICAL: Option<&str> = Some("categorical");
const COUNT: Option<&str> = Some("count");
const TWO_LEVELS: Option<&str> = Some("categorical (2 levels)");
const MANY_LEVELS: Option<&str> = Some("categorical (3+ levels)");
const FACTOR_LEVELS: Option<&str> = Some("factors with levels");

/// Catalog entries, indexed by `TestKind` discriminant.
static CATALOG: [TestRequirement; 28] = [
    // Descriptive
    TestRequirement::new(K::DescriptiveSummary, "Descriptive Statistics",
        "Mean, median, mode, std dev, range, quartiles, skewness, kurtosis")
        .types(CONTINUOUS, None).sizes(1, 1)
        .config(&[], &["columns"]).numeric(&["columns"]).charts(),
    TestRequirement::new(K::NormalityTest, "Normality Test",
        "Shapiro-Wilk and Anderson-Darling tests with histogram and probability plot")
        .types(CONTINUOUS, None).sizes(3, 8)
        .config(&["column"], &["alpha"]).numeric(&["column"]).charts(),
    TestRequirement::new(K::ParetoAnalysis, "Pareto Analysis",
        "Pareto chart with vital-few identification (80/20 rule)")
        .types(CATEGORICAL, None).sizes(1, 2)
        .config(&["category_column"], &["value_column", "top_n"]).charts(),
    // Comparison
    TestRequirement::new(K::OneSampleT, "One-Sample t-Test",
        "Compare a sample mean to a known or target value")
        .types(CONTINUOUS, None).sizes(2, 5)
        .config(&["column", "population_mean"], &["alpha", "alternative"])
        .numeric(&["column"]).normality(),
    TestRequirement::new(K::TwoSampleT, "Two-Sample t-Test",
        "Compare means of two independent groups")
        .types(CONTINUOUS, TWO_LEVELS).sizes(4, 5).per_group(3)
        .config(&["y_column", "x_column"], &["alpha", "equal_var", "alternative"])
        .numeric(&["y_column"]).normality().equal_variance().charts(),
    TestRequirement::new(K::PairedT, "Paired t-Test",
        "Compare before and after measurements on the same subjects")
        .types(CONTINUOUS, Some("paired")).sizes(2, 5)
        .config(&["column_before", "column_after"], &["alpha", "alternative"])
        .numeric(&["column_before", "column_after"]).normality(),
    TestRequirement::new(K::OneWayAnova, "One-Way ANOVA",
        "Compare means across 3 or more groups (with Tukey HSD post-hoc)")
        .types(CONTINUOUS, MANY_LEVELS).sizes(6, 10).per_group(3)
        .config(&["y_column", "x_column"], &["alpha"])
        .numeric(&["y_column"]).normality().equal_variance().charts(),
    TestRequirement::new(K::TwoWayAnova, "Two-Way ANOVA",
        "Two-factor comparison with interaction effects")
        .types(CONTINUOUS, Some("two categorical factors")).sizes(8, 12).per_group(2)
        .config(&["y_column", "factor_a", "factor_b"], &["alpha"])
        .numeric(&["y_column"]).normality().equal_variance().charts(),
    TestRequirement::new(K::MannWhitney, "Mann-Whitney U Test",
        "Non-parametric two-sample comparison for non-normal data")
        .types(Some("continuous (non-normal OK)"), TWO_LEVELS).sizes(2, 5).per_group(3)
        .config(&["y_column", "x_column"], &["alpha", "alternative"])
        .numeric(&["y_column"]).charts(),
    TestRequirement::new(K::KruskalWallis, "Kruskal-Wallis H Test",
        "Non-parametric comparison of 3 or more groups for non-normal data")
        .types(Some("continuous (non-normal OK)"), MANY_LEVELS).sizes(4, 10).per_group(3)
        .config(&["y_column", "x_column"], &["alpha"])
        .numeric(&["y_column"]).charts(),
    TestRequirement::new(K::ChiSquareAssociation, "Chi-Square Test of Association",
        "Test association between two categorical variables")
        .types(CATEGORICAL, CATEGORICAL).sizes(5, 20)
        .config(&["column_a", "column_b"], &["alpha"]).expected_counts().charts(),
    TestRequirement::new(K::ChiSquareGoodness, "Chi-Square Goodness of Fit",
        "Test whether an observed distribution matches an expected one")
        .types(CATEGORICAL, None).sizes(5, 20)
        .config(&["column"], &["expected_proportions", "alpha"]).charts(),
    // Correlation and regression
    TestRequirement::new(K::Correlation, "Correlation Analysis",
        "Pearson and Spearman correlation matrix with heatmap")
        .types(Some("continuous (multiple)"), None).sizes(3, 10)
        .config(&[], &["columns", "method"]).numeric(&["columns"]).charts(),
    TestRequirement::new(K::SimpleRegression, "Simple Linear Regression",
        "Single-predictor linear regression with residual plots")
        .types(CONTINUOUS, CONTINUOUS).sizes(3, 10)
        .config(&["y_column", "x_column"], &["alpha"])
        .numeric(&["y_column", "x_column"]).normality().charts(),
    TestRequirement::new(K::MultipleRegression, "Multiple Linear Regression",
        "Multiple-predictor regression with VIF and diagnostics")
        .types(CONTINUOUS, Some("continuous (multiple)")).sizes(10, 20)
        .config(&["y_column", "x_columns"], &["alpha"])
        .numeric(&["y_column", "x_columns"]).normality().multicollinearity().charts(),
    TestRequirement::new(K::LogisticRegression, "Logistic Regression",
        "Binary outcome prediction with odds ratios")
        .types(Some("binary"), Some("continuous")).sizes(20, 30)
        .config(&["y_column", "x_columns"], &["alpha"]).charts(),
    // SPC
    TestRequirement::new(K::IMrChart, "I-MR Control Chart",
        "Individuals and moving range chart for single measurements")
        .types(Some("continuous (time-ordered)"), None).sizes(2, 20)
        .config(&["column"], &["labels_column"]).numeric(&["column"]).charts(),
    TestRequirement::new(K::XbarRChart, "X-bar/R Control Chart",
        "Subgroup means and ranges chart")
        .types(Some("continuous (subgroups)"), None).sizes(4, 20)
        .config(&["column", "subgroup_size"], &["labels_column"]).numeric(&["column"]).charts(),
    TestRequirement::new(K::PChart, "P Chart",
        "Proportion defective chart")
        .types(COUNT, None).sizes(2, 20)
        .config(&["defects_column"], &["sample_size_column", "sample_size"])
        .numeric(&["defects_column", "sample_size_column"]).charts(),
    TestRequirement::new(K::NpChart, "NP Chart",
        "Count defective chart (constant sample size)")
        .types(COUNT, None).sizes(2, 20)
        .config(&["defects_column", "sample_size"], &[]).numeric(&["defects_column"]).charts(),
    TestRequirement::new(K::CChart, "C Chart",
        "Defects per unit chart (constant opportunity)")
        .types(COUNT, None).sizes(2, 20)
        .config(&["column"], &[]).numeric(&["column"]).charts(),
    TestRequirement::new(K::UChart, "U Chart",
        "Defects per unit chart (variable sample size)")
        .types(COUNT, None).sizes(2, 20)
        .config(&["defects_column"], &["units_column", "units"])
        .numeric(&["defects_column", "units_column"]).charts(),
    // Capability
    TestRequirement::new(K::CapabilityNormal, "Process Capability (Normal)",
        "Cp, Cpk, Pp, Ppk for normally distributed data")
        .types(Some("continuous (normal)"), None).sizes(2, 30)
        .config(&["column"], &["lsl", "usl", "target", "subgroup_size"])
        .numeric(&["column"]).normality().charts(),
    TestRequirement::new(K::CapabilityNonnormal, "Process Capability (Non-Normal)",
        "Capability via Box-Cox transformation for non-normal data")
        .types(Some("continuous (non-normal)"), None).sizes(3, 30)
        .config(&["column"], &["lsl", "usl", "target"]).numeric(&["column"]).charts(),
    TestRequirement::new(K::MsaGageRr, "Gage R&R (MSA)",
        "Measurement system analysis: repeatability and reproducibility")
        .types(CONTINUOUS, Some("part + operator")).sizes(8, 10)
        .config(&["measurement_column", "part_column", "operator_column"], &["tolerance"])
        .numeric(&["measurement_column"]).charts(),
    // DOE
    TestRequirement::new(K::FullFactorial, "Full Factorial Design",
        "Generate a 2^k full factorial design matrix")
        .types(None, FACTOR_LEVELS).sizes(0, 4)
        .config(&["factors"], &["center_points", "replicates"]),
    TestRequirement::new(K::FractionalFactorial, "Fractional Factorial Design",
        "Generate a 2^(k-p) fractional factorial design")
        .types(None, FACTOR_LEVELS).sizes(0, 4)
        .config(&["factors", "fraction"], &["replicates"]),
    TestRequirement::new(K::DoeAnalysis, "DOE Analysis",
        "Analyze factorial experiment results with main effects and interactions")
        .types(CONTINUOUS, Some("categorical factors")).sizes(4, 8)
        .config(&["response_column", "factor_columns"], &["alpha"])
        .numeric(&["response_column"]).charts(),
];

/// Catalog entry for a kind.
pub fn entry(kind: TestKind) -> &'static TestRequirement {
    &CATALOG[kind as usize]
}

/// All entries in catalog order.
pub fn entries() -> &'static [TestRequirement] {
    &CATALOG
}

// ─── Dataset profiles ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    #[serde(default)]
    pub dtype: String,
}

impl ColumnProfile {
    pub fn is_numeric(&self) -> bool {
        ["int", "float", "num"]
            .iter()
            .any(|prefix| self.dtype.starts_with(prefix))
    }
}

/// Column metadata and row count, as stored alongside a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatasetProfile {
    #[serde(default)]
    pub columns: Vec<ColumnProfile>,
    #[serde(default)]
    pub row_count: usize,
}

impl DatasetProfile {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            columns: table
                .columns()
                .iter()
                .map(|c| ColumnProfile {
                    name: c.name().to_string(),
                    dtype: c.dtype().to_string(),
                })
                .collect(),
            row_count: table.n_rows(),
        }
    }
}

/// Whether a test can run on a dataset with this profile.
pub fn applicable(kind: TestKind, profile: &DatasetProfile) -> bool {
    let req = entry(kind);
    if profile.row_count < req.min_rows {
        return false;
    }
    let has_numeric = profile.columns.iter().any(ColumnProfile::is_numeric);
    let has_categorical = profile.columns.iter().any(|c| !c.is_numeric());
    match req.y_type {
        Some(y) if y.contains("continuous") && !has_numeric => false,
        Some(y) if y.contains("categorical") && !has_categorical => false,
        _ => true,
    }
}

// ─── Introspection ───────────────────────────────────────────────────

/// A catalog entry, scored against a profile when one was given.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogListing {
    #[serde(flatten)]
    pub requirement: &'static TestRequirement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicable: Option<bool>,
}

pub fn available_tests(profile: Option<&DatasetProfile>) -> Vec<CatalogListing> {
    CATALOG
        .iter()
        .map(|requirement| CatalogListing {
            requirement,
            applicable: profile.map(|p| applicable(requirement.kind, p)),
        })
        .collect()
}

/// Entry for an externally sourced test type, `None` when unknown.
pub fn test_info(test_type: &str) -> Option<&'static TestRequirement> {
    TestKind::parse(test_type).ok().map(entry)
}

/// Test kinds grouped by category, both in catalog order.
pub fn categories() -> Vec<(TestCategory, Vec<TestKind>)> {
    let mut grouped: Vec<(TestCategory, Vec<TestKind>)> = Vec::new();
    for req in &CATALOG {
        match grouped.iter_mut().find(|(cat, _)| *cat == req.category) {
            Some((_, kinds)) => kinds.push(req.kind),
            None => grouped.push((req.category, vec![req.kind])),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(rows: usize, dtypes: &[&str]) -> DatasetProfile {
        DatasetProfile {
            columns: dtypes
                .iter()
                .enumerate()
                .map(|(i, d)| ColumnProfile {
                    name: format!("c{i}"),
                    dtype: d.to_string(),
                })
                .collect(),
            row_count: rows,
        }
    }

    #[test]
    fn catalog_is_indexed_by_kind() {
        assert_eq!(CATALOG.len(), TestKind::ALL.len());
        for (i, kind) in TestKind::ALL.iter().enumerate() {
            assert_eq!(CATALOG[i].kind, *kind);
            assert_eq!(entry(*kind).category, kind.category());
        }
    }

    #[test]
    fn required_and_optional_keys_do_not_overlap() {
        for req in entries() {
            for key in req.required_config {
                assert!(!req.optional_config.contains(key), "{}: {key}", req.kind);
            }
        }
    }

    #[test]
    fn applicability_checks_rows_and_column_types() {
        let numeric_only = profile(50, &["float64", "int64"]);
        assert!(applicable(TestKind::IMrChart, &numeric_only));
        assert!(!applicable(TestKind::ParetoAnalysis, &numeric_only));
        assert!(!applicable(TestKind::LogisticRegression, &profile(10, &["float64"])));

        let text_only = profile(50, &["object"]);
        assert!(!applicable(TestKind::DescriptiveSummary, &text_only));
        assert!(applicable(TestKind::ChiSquareGoodness, &text_only));
        assert!(applicable(TestKind::FullFactorial, &profile(0, &[])));
    }

    #[test]
    fn introspection_follows_catalog_order() {
        let cats = categories();
        assert_eq!(cats[0].0, TestCategory::Descriptive);
        assert_eq!(cats.len(), 7);
        assert_eq!(cats.iter().map(|(_, k)| k.len()).sum::<usize>(), 28);

        let listed = available_tests(Some(&profile(3, &["float64"])));
        assert_eq!(listed.len(), 28);
        assert!(listed.iter().all(|l| l.applicable.is_some()));
        assert!(available_tests(None).iter().all(|l| l.applicable.is_none()));

        assert_eq!(test_info("c_chart").map(|r| r.name), Some("C Chart"));
        assert!(test_info("bogus").is_none());
    }

    #[test]
    fn listing_serializes_flat() {
        let listing = &available_tests(None)[0];
        let v = serde_json::to_value(listing).unwrap();
        assert_eq!(v["test_type"], "descriptive_summary");
        assert_eq!(v["category"], "descriptive");
        assert!(v.get("applicable").is_none());
    }
}
