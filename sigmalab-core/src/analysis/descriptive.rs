//! Descriptive family: summary statistics, normality, Pareto.

use super::{column, default_alpha, numeric_series};
use crate::charts;
use crate::htest;
use crate::kind::TestKind;
use crate::result::{num, object, round_to, AnalysisResult, JsonMap, TestError};
use crate::sample;
use crate::table::DataTable;
use serde::Deserialize;
use serde_json::{json, Value};

// ─── Descriptive summary ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescriptiveConfig {
    /// Columns to summarise; defaults to every numeric column.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

fn column_stats(values: &[f64], null_count: usize, n_rows: usize) -> JsonMap {
    let n = values.len();
    let s = sample::sorted(values);
    let (min, max) = sample::min_max(values);
    let q1 = sample::percentile_sorted(&s, 25.0);
    let q3 = sample::percentile_sorted(&s, 75.0);
    let mean = sample::mean(values);
    let std = sample::std_dev(values);
    let (mode, mode_count) = sample::mode(values).map_or((Value::Null, 0), |(m, c)| (num(m), c));

    let mut stats = object(json!({
        "n": n,
        "mean": num(mean),
        "median": num(sample::percentile_sorted(&s, 50.0)),
        "std": num(std),
        "variance": num(sample::variance(values)),
        "min": num(min),
        "max": num(max),
        "range": num(max - min),
        "q1": num(q1),
        "q3": num(q3),
        "iqr": num(q3 - q1),
        "skewness": if n > 2 { num(sample::skewness(values)) } else { Value::Null },
        "kurtosis": if n > 3 { num(sample::kurtosis(values)) } else { Value::Null },
        "null_count": null_count,
        "null_pct": num(round_to(null_count as f64 / n_rows.max(1) as f64 * 100.0, 2)),
        "mode": mode,
        "mode_count": mode_count,
    }));
    if mean != 0.0 {
        stats.insert("cv".into(), num(round_to(std / mean.abs() * 100.0, 2)));
    }
    stats
}

pub fn descriptive_summary(
    table: &DataTable,
    config: &DescriptiveConfig,
) -> Result<AnalysisResult, TestError> {
    let candidates: Vec<&str> = match &config.columns {
        Some(cols) => {
            for c in cols {
                column(table, c)?;
            }
            cols.iter()
                .map(String::as_str)
                .filter(|c| table.column(c).is_some_and(|col| col.is_numeric()))
                .collect()
        }
        None => table.numeric_column_names(),
    };
    if candidates.is_empty() {
        return Err(TestError::insufficient("No numeric columns found"));
    }

    let mut r = AnalysisResult::success(TestKind::DescriptiveSummary);
    let mut per_column = JsonMap::new();
    let mut sample_sizes = JsonMap::new();
    for name in &candidates {
        let Some(col) = table.column(name) else {
            continue;
        };
        let values = col.numbers();
        if values.is_empty() {
            r.warnings.push(format!("Column '{name}' has no non-null values"));
            continue;
        }
        per_column.insert(
            name.to_string(),
            Value::Object(column_stats(&values, col.null_count(), table.n_rows())),
        );
        sample_sizes.insert(name.to_string(), values.len().into());
        r.charts.push(charts::histogram(
            &values,
            name,
            &format!("Distribution of {name}"),
            name,
            true,
        ));
    }

    r.summary = if per_column.len() == 1 {
        match per_column.values().next() {
            Some(Value::Object(only)) => only.clone(),
            _ => JsonMap::new(),
        }
    } else {
        per_column.clone()
    };
    let analyzed: Vec<String> = per_column.keys().cloned().collect();
    r.details.insert("columns".into(), Value::Object(per_column));
    r.interpretation_context = object(json!({
        "test_name": "Descriptive Statistics",
        "column_count": analyzed.len(),
        "columns_analyzed": analyzed,
        "sample_sizes": sample_sizes,
    }));
    Ok(r)
}

// ─── Normality ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NormalityConfig {
    pub column: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

pub fn normality_test(
    table: &DataTable,
    config: &NormalityConfig,
) -> Result<AnalysisResult, TestError> {
    let values = numeric_series(table, &config.column)?;
    let n = values.len();
    if n < 3 {
        return Err(TestError::insufficient("Need at least 3 observations"));
    }
    let mut r = AnalysisResult::success(TestKind::NormalityTest);
    if n > 5000 {
        r.warnings.push(format!(
            "Sample size ({n}) exceeds 5000. Shapiro-Wilk may be overly sensitive. \
             Consider visual assessment (histogram, Q-Q plot) alongside the p-value."
        ));
    }

    let (w, p) = htest::shapiro_wilk(&values[..n.min(5000)])
        .ok_or_else(|| TestError::degenerate("All values are identical; normality cannot be assessed"))?;
    let ad = htest::anderson_darling(&values)
        .ok_or_else(|| TestError::degenerate("All values are identical; normality cannot be assessed"))?;
    let (ad_critical, ad_significant) = match ad.critical_at(config.alpha) {
        Some((cv, _)) => (num(cv), ad.statistic > cv),
        None => (Value::Null, false),
    };
    let is_normal = p >= config.alpha;
    let alpha = config.alpha;
    let skew = sample::skewness(&values);
    let kurt = sample::kurtosis(&values);

    r.summary = object(json!({
        "is_normal": is_normal,
        "shapiro_wilk_statistic": num(w),
        "shapiro_wilk_p_value": num(p),
        "anderson_darling_statistic": num(ad.statistic),
        "anderson_darling_critical_value": ad_critical,
        "anderson_darling_significant": ad_significant,
        "alpha": alpha,
        "n": n,
    }));
    r.details = object(json!({
        "column": config.column,
        "shapiro_wilk": {"statistic": num(w), "p_value": num(p)},
        "anderson_darling": {
            "statistic": num(ad.statistic),
            "critical_values": ad.critical_values.to_vec(),
            "significance_levels": ad.significance_levels.to_vec(),
        },
        "descriptive": {
            "mean": num(sample::mean(&values)),
            "std": num(sample::std_dev(&values)),
            "skewness": num(skew),
            "kurtosis": num(kurt),
        },
    }));
    r.charts = vec![
        charts::histogram(
            &values,
            &config.column,
            &format!("Distribution of {}", config.column),
            &config.column,
            true,
        ),
        charts::probability_plot(&values, &format!("Normal Probability Plot: {}", config.column)),
    ];
    r.interpretation_context = object(json!({
        "test_name": "Normality Test",
        "column": config.column,
        "conclusion": if is_normal { "normal" } else { "not normal" },
        "p_value": num(p),
        "alpha": alpha,
        "sample_size": n,
        "skewness": num(skew),
        "kurtosis": num(kurt),
        "recommendation": if is_normal {
            "Data appears normally distributed. Parametric tests (t-test, ANOVA) are appropriate."
        } else {
            "Data does NOT appear normally distributed. Consider non-parametric alternatives \
             (Mann-Whitney, Kruskal-Wallis) or data transformations."
        },
    }));
    Ok(r)
}

// ─── Pareto ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ParetoConfig {
    pub category_column: String,
    #[serde(default)]
    pub value_column: Option<String>,
    #[serde(default)]
    pub top_n: Option<usize>,
}

/// Share of the total at which the vital few stop.
const VITAL_FEW_PCT: f64 = 80.0;

pub fn pareto_analysis(table: &DataTable, config: &ParetoConfig) -> Result<AnalysisResult, TestError> {
    let cat_col = column(table, &config.category_column)?;
    let mut r = AnalysisResult::success(TestKind::ParetoAnalysis);

    let value_col = match &config.value_column {
        Some(v) => match table.column(v) {
            Some(c) => Some(c),
            None => {
                r.warnings
                    .push(format!("Value column '{v}' not found; counting occurrences instead"));
                None
            }
        },
        None => None,
    };

    // Aggregate per category, first-seen order, then a stable descending sort.
    let mut totals: Vec<(String, f64)> = Vec::new();
    for row in 0..table.n_rows() {
        let cell = cat_col.get(row);
        if cell.is_missing() {
            continue;
        }
        let amount = match value_col {
            Some(vc) => vc.get(row).as_f64().unwrap_or(0.0),
            None => 1.0,
        };
        let label = cell.label();
        match totals.iter_mut().find(|(c, _)| *c == label) {
            Some((_, t)) => *t += amount,
            None => totals.push((label, amount)),
        }
    }
    if totals.is_empty() {
        return Err(TestError::insufficient(format!(
            "No categories found in '{}'",
            config.category_column
        )));
    }
    totals.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    if let Some(k) = config.top_n {
        totals.truncate(k.max(1));
    }

    let categories: Vec<String> = totals.iter().map(|(c, _)| c.clone()).collect();
    let values: Vec<f64> = totals.iter().map(|(_, v)| *v).collect();
    let sum: f64 = values.iter().sum();
    let total = if sum == 0.0 { 1.0 } else { sum };

    let mut running = 0.0;
    let cumulative: Vec<f64> = values
        .iter()
        .map(|v| {
            running += v;
            round_to(running / total * 100.0, 2)
        })
        .collect();
    let percentages: Vec<f64> = values.iter().map(|v| round_to(v / total * 100.0, 2)).collect();

    let mut vital_few = Vec::new();
    for (cat, cum) in categories.iter().zip(&cumulative) {
        vital_few.push(cat.clone());
        if *cum >= VITAL_FEW_PCT {
            break;
        }
    }
    let trivial_many: Vec<String> = categories
        .iter()
        .filter(|c| !vital_few.contains(c))
        .cloned()
        .collect();
    let vital_few_pct = cumulative[vital_few.len() - 1];

    r.summary = object(json!({
        "total": num(sum),
        "category_count": categories.len(),
        "vital_few_count": vital_few.len(),
        "vital_few_pct": vital_few_pct,
        "vital_few": vital_few,
    }));
    r.details = object(json!({
        "categories": categories,
        "values": values,
        "percentages": percentages,
        "cumulative_percentages": cumulative,
        "vital_few": vital_few,
        "trivial_many": trivial_many,
    }));
    let yaxis = config
        .value_column
        .as_deref()
        .filter(|_| value_col.is_some())
        .unwrap_or("Count");
    r.charts = vec![charts::pareto_chart(
        &categories,
        &values,
        &format!("Pareto Analysis: {}", config.category_column),
        yaxis,
    )];
    r.interpretation_context = object(json!({
        "test_name": "Pareto Analysis",
        "category_column": config.category_column,
        "total": num(sum),
        "vital_few": vital_few,
        "vital_few_pct": vital_few_pct,
        "top_category": categories[0],
        "top_category_pct": percentages[0],
        "recommendation": format!(
            "Focus on the vital few: {}. These {} categories account for {:.1}% of the total.",
            vital_few.join(", "),
            vital_few.len(),
            vital_few_pct
        ),
    }));
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{bell, table};
    use crate::table::Column;

    #[test]
    fn single_column_summary_is_flattened() {
        let t = table(vec![
            Column::numeric("x", &[1.0, 2.0, 3.0, 4.0, 5.0]),
            Column::text("label", &["a", "b", "c", "d", "e"]),
        ]);
        let r = descriptive_summary(&t, &DescriptiveConfig::default()).unwrap();
        assert_eq!(r.summary["n"], 5);
        assert_eq!(r.summary["mean"], 3.0);
        assert_eq!(r.summary["q1"], 2.0);
        assert_eq!(r.summary["cv"], 52.7);
        assert_eq!(r.charts.len(), 1);
        assert_eq!(r.interpretation_context["column_count"], 1);
    }

    #[test]
    fn multi_column_summary_keys_by_column() {
        let t = table(vec![
            Column::numeric("a", &[1.0, 2.0, 3.0]),
            Column::numeric("b", &[0.0, 0.0, 0.0]),
        ]);
        let r = descriptive_summary(&t, &DescriptiveConfig::default()).unwrap();
        assert!(r.summary.contains_key("a") && r.summary.contains_key("b"));
        // Zero mean: no coefficient of variation
        assert!(r.summary["b"].get("cv").is_none());
        assert!(r.summary["a"]["kurtosis"].is_null());
    }

    #[test]
    fn text_only_table_has_no_numeric_columns() {
        let t = table(vec![Column::text("s", &["x", "y"])]);
        let err = descriptive_summary(&t, &DescriptiveConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "No numeric columns found");
    }

    #[test]
    fn normality_accepts_bell_shaped_data() {
        let t = table(vec![Column::numeric("v", &bell(60, 10.0, 2.0, 7))]);
        let cfg = NormalityConfig {
            column: "v".into(),
            alpha: 0.05,
        };
        let r = normality_test(&t, &cfg).unwrap();
        assert_eq!(r.summary["is_normal"], true);
        assert_eq!(r.charts.len(), 2);
        assert_eq!(
            r.details["anderson_darling"]["significance_levels"],
            json!([15.0, 10.0, 5.0, 2.5, 1.0])
        );
    }

    #[test]
    fn normality_needs_three_points() {
        let t = table(vec![Column::numeric("v", &[1.0, 2.0])]);
        let cfg = NormalityConfig {
            column: "v".into(),
            alpha: 0.05,
        };
        assert_eq!(
            normality_test(&t, &cfg).unwrap_err().to_string(),
            "Need at least 3 observations"
        );
    }

    #[test]
    fn pareto_identifies_vital_few() {
        let defects = ["scratch", "dent", "scratch", "scratch", "chip", "scratch", "dent", "scratch", "scratch", "scratch"];
        let t = table(vec![Column::text("defect", &defects)]);
        let cfg = ParetoConfig {
            category_column: "defect".into(),
            value_column: None,
            top_n: None,
        };
        let r = pareto_analysis(&t, &cfg).unwrap();
        assert_eq!(r.details["categories"], json!(["scratch", "dent", "chip"]));
        assert_eq!(r.details["cumulative_percentages"], json!([70.0, 90.0, 100.0]));
        assert_eq!(r.summary["vital_few"], json!(["scratch", "dent"]));
        assert_eq!(r.details["trivial_many"], json!(["chip"]));
    }
}
