//! Comparison family: t-tests, ANOVA, rank tests, chi-square.

use super::{
    check_normality, column, complete_labels, complete_numeric, default_alpha, effect_label,
    group_slices, groups_in_order, groups_sorted, numeric_rows, numeric_series, sorted_levels,
};
use crate::charts;
use crate::dist::{self, Alternative};
use crate::htest;
use crate::kind::TestKind;
use crate::linear_model::{type2_anova, Factor, Term};
use crate::result::{num, object, opt_num, round_to, AnalysisResult, JsonMap, TestError};
use crate::sample;
use crate::table::DataTable;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

fn t_interval(center: f64, se: f64, df: f64, alpha: f64) -> (f64, f64) {
    let q = dist::t_ppf(1.0 - alpha / 2.0, df);
    (center - q * se, center + q * se)
}

fn group_names(groups: &[(String, Vec<f64>)]) -> Vec<String> {
    groups.iter().map(|(g, _)| g.clone()).collect()
}

fn exactly_two(groups: Vec<(String, Vec<f64>)>) -> Result<[(String, Vec<f64>); 2], TestError> {
    let found = groups.len();
    let names = group_names(&groups);
    <[(String, Vec<f64>); 2]>::try_from(groups).map_err(|_| {
        TestError::insufficient(format!("Expected 2 groups, found {found}: {names:?}"))
    })
}

// ─── One-sample t ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct OneSampleConfig {
    pub column: String,
    pub population_mean: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub alternative: Alternative,
}

pub fn one_sample_t(table: &DataTable, config: &OneSampleConfig) -> Result<AnalysisResult, TestError> {
    let values = numeric_series(table, &config.column)?;
    let n = values.len();
    if n < 2 {
        return Err(TestError::insufficient("Need at least 2 observations"));
    }
    let sd = sample::std_dev(&values);
    if sd == 0.0 {
        return Err(TestError::degenerate(
            "Sample has zero variance; the t statistic is undefined",
        ));
    }
    let mut r = AnalysisResult::success(TestKind::OneSampleT);
    check_normality(&values, &config.column, &mut r.warnings);

    let mu = config.population_mean;
    let t = htest::t_test_1samp(&values, mu, config.alternative);
    let mean = sample::mean(&values);
    let se = sd / (n as f64).sqrt();
    let (lo, hi) = t_interval(mean, se, t.df, config.alpha);
    let effect = (mean - mu) / sd;
    let significant = t.p < config.alpha;

    r.summary = object(json!({
        "statistic": num(t.t),
        "p_value": num(t.p),
        "significant": significant,
        "sample_mean": num(mean),
        "population_mean": mu,
        "difference": num(mean - mu),
        "effect_size": num(effect),
        "ci_lower": num(lo),
        "ci_upper": num(hi),
    }));
    r.details = object(json!({
        "column": config.column,
        "n": n,
        "alpha": config.alpha,
        "alternative": config.alternative.as_str(),
        "sample_std": num(sd),
        "standard_error": num(se),
        "degrees_of_freedom": n - 1,
    }));
    r.charts = vec![charts::histogram(
        &values,
        &config.column,
        &format!("Distribution of {}", config.column),
        &config.column,
        true,
    )];
    r.interpretation_context = object(json!({
        "test_name": "One-Sample t-Test",
        "column": config.column,
        "sample_mean": num(mean),
        "population_mean": mu,
        "p_value": num(t.p),
        "significant": significant,
        "alpha": config.alpha,
        "effect_size": num(effect),
        "effect_label": effect_label(effect),
        "conclusion": if significant {
            format!("The sample mean ({mean:.4}) is significantly different from {mu}")
        } else {
            format!("No significant difference between sample mean ({mean:.4}) and {mu}")
        },
    }));
    Ok(r)
}

// ─── Two-sample t ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TwoSampleConfig {
    pub y_column: String,
    pub x_column: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// `None` selects pooled or Welch from Levene's test.
    #[serde(default)]
    pub equal_var: Option<bool>,
    #[serde(default)]
    pub alternative: Alternative,
}

pub fn two_sample_t(table: &DataTable, config: &TwoSampleConfig) -> Result<AnalysisResult, TestError> {
    let [(name1, g1), (name2, g2)] =
        exactly_two(groups_in_order(table, &config.y_column, &config.x_column)?)?;
    if g1.len() < 2 || g2.len() < 2 {
        return Err(TestError::insufficient("Each group needs at least 2 observations"));
    }
    let mut r = AnalysisResult::success(TestKind::TwoSampleT);
    check_normality(&g1, &name1, &mut r.warnings);
    check_normality(&g2, &name2, &mut r.warnings);

    let levene = htest::levene(&[&g1, &g2]);
    let equal_var = match config.equal_var {
        Some(v) => v,
        None => match levene {
            Some((_, p)) if p < 0.05 => {
                r.warnings.push(format!(
                    "Levene's test indicates unequal variances (p={p:.4}). Using Welch's t-test."
                ));
                false
            }
            _ => true,
        },
    };

    let t = htest::t_test_ind(&g1, &g2, equal_var, config.alternative);
    if !t.t.is_finite() {
        return Err(TestError::degenerate(
            "Both groups have zero variance; the t statistic is undefined",
        ));
    }
    let d = htest::cohen_d(&g1, &g2);
    let (m1, m2) = (sample::mean(&g1), sample::mean(&g2));
    let significant = t.p < config.alpha;

    r.summary = object(json!({
        "statistic": num(t.t),
        "p_value": num(t.p),
        "significant": significant,
        "group_1": name1,
        "group_1_mean": num(m1),
        "group_1_n": g1.len(),
        "group_2": name2,
        "group_2_mean": num(m2),
        "group_2_n": g2.len(),
        "mean_difference": num(m1 - m2),
        "effect_size": num(d),
        "effect_label": effect_label(d),
        "equal_var": equal_var,
    }));
    r.details = object(json!({
        "y_column": config.y_column,
        "x_column": config.x_column,
        "alpha": config.alpha,
        "alternative": config.alternative.as_str(),
        "group_1_std": num(sample::std_dev(&g1)),
        "group_2_std": num(sample::std_dev(&g2)),
        "degrees_of_freedom": num(t.df),
        "levene_p": opt_num(levene.map(|(_, p)| p)),
    }));
    r.charts = vec![charts::box_plot(
        &[(name1.clone(), g1.clone()), (name2.clone(), g2.clone())],
        &format!("{} by {}", config.y_column, config.x_column),
        &config.y_column,
    )];
    r.interpretation_context = object(json!({
        "test_name": if equal_var { "Two-Sample t-Test (Pooled)" } else { "Two-Sample t-Test (Welch's)" },
        "y_column": config.y_column,
        "x_column": config.x_column,
        "groups": [name1, name2],
        "means": [num(m1), num(m2)],
        "p_value": num(t.p),
        "significant": significant,
        "effect_size": num(d),
        "effect_label": effect_label(d),
        "alpha": config.alpha,
    }));
    Ok(r)
}

// ─── Paired t ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PairedConfig {
    pub column_before: String,
    pub column_after: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub alternative: Alternative,
}

pub fn paired_t(table: &DataTable, config: &PairedConfig) -> Result<AnalysisResult, TestError> {
    let cols = complete_numeric(table, &[&config.column_before, &config.column_after])?;
    let (before, after) = (&cols[0], &cols[1]);
    let n = before.len();
    if n < 2 {
        return Err(TestError::insufficient("Need at least 2 paired observations"));
    }
    let diffs: Vec<f64> = after.iter().zip(before).map(|(a, b)| a - b).collect();
    let sd_diff = sample::std_dev(&diffs);
    if sd_diff == 0.0 {
        return Err(TestError::degenerate(
            "All paired differences are identical; the t statistic is undefined",
        ));
    }
    let mut r = AnalysisResult::success(TestKind::PairedT);
    check_normality(&diffs, "differences", &mut r.warnings);

    // Statistic follows the before - after convention.
    let reversed: Vec<f64> = diffs.iter().map(|d| -d).collect();
    let t = htest::t_test_1samp(&reversed, 0.0, config.alternative);
    let mean_diff = sample::mean(&diffs);
    let se = sd_diff / (n as f64).sqrt();
    let (lo, hi) = t_interval(mean_diff, se, t.df, config.alpha);
    let effect = mean_diff / sd_diff;
    let mean_before = sample::mean(before);
    let mean_after = sample::mean(after);
    let significant = t.p < config.alpha;

    r.summary = object(json!({
        "statistic": num(t.t),
        "p_value": num(t.p),
        "significant": significant,
        "mean_difference": num(mean_diff),
        "std_difference": num(sd_diff),
        "mean_before": num(mean_before),
        "mean_after": num(mean_after),
        "effect_size": num(effect),
        "ci_lower": num(lo),
        "ci_upper": num(hi),
        "n_pairs": n,
    }));
    r.details = object(json!({
        "column_before": config.column_before,
        "column_after": config.column_after,
        "alpha": config.alpha,
        "alternative": config.alternative.as_str(),
        "n": n,
        "degrees_of_freedom": n - 1,
    }));
    r.charts = vec![
        charts::box_plot(
            &[("Before".to_string(), before.clone()), ("After".to_string(), after.clone())],
            "Before vs After",
            "Value",
        ),
        charts::histogram(&diffs, "Differences", "Distribution of Differences", "After - Before", true),
    ];
    r.interpretation_context = object(json!({
        "test_name": "Paired t-Test",
        "before_col": config.column_before,
        "after_col": config.column_after,
        "mean_before": num(mean_before),
        "mean_after": num(mean_after),
        "mean_difference": num(mean_diff),
        "p_value": num(t.p),
        "significant": significant,
        "effect_size": num(effect),
        "effect_label": effect_label(effect),
        "alpha": config.alpha,
        "direction": if mean_diff > 0.0 { "increased" } else { "decreased" },
        "pct_change": if mean_before != 0.0 {
            round_to(mean_diff.abs() / mean_before.abs() * 100.0, 2)
        } else {
            0.0
        },
    }));
    Ok(r)
}

// ─── One-way ANOVA ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct OneWayConfig {
    pub y_column: String,
    pub x_column: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

/// Tukey HSD over all pairs `i < j` of `groups` (in the order given).
fn tukey_hsd(groups: &[(String, Vec<f64>)], ms_within: f64, df_within: f64, alpha: f64) -> Vec<Value> {
    let k = groups.len() as f64;
    let q_crit = dist::studentized_range_ppf(1.0 - alpha, k, df_within);
    let mut rows = Vec::new();
    for i in 0..groups.len() {
        for j in (i + 1)..groups.len() {
            let (ni, nj) = (groups[i].1.len() as f64, groups[j].1.len() as f64);
            let meandiff = sample::mean(&groups[j].1) - sample::mean(&groups[i].1);
            let se = (ms_within / 2.0 * (1.0 / ni + 1.0 / nj)).sqrt();
            let q = meandiff.abs() / se;
            let p_adj = (1.0 - dist::studentized_range_cdf(q, k, df_within)).clamp(0.0, 1.0);
            let lower = meandiff - q_crit * se;
            let upper = meandiff + q_crit * se;
            rows.push(json!({
                "group1": groups[i].0,
                "group2": groups[j].0,
                "meandiff": round_to(meandiff, 4),
                "p_adj": round_to(p_adj, 4),
                "lower": round_to(lower, 4),
                "upper": round_to(upper, 4),
                "reject": p_adj < alpha,
            }));
        }
    }
    rows
}

pub fn one_way_anova(table: &DataTable, config: &OneWayConfig) -> Result<AnalysisResult, TestError> {
    let groups: Vec<(String, Vec<f64>)> = groups_sorted(table, &config.y_column, &config.x_column)?
        .into_iter()
        .filter(|(_, v)| v.len() >= 2)
        .collect();
    if groups.len() < 2 {
        return Err(TestError::insufficient("Need at least 2 groups with 2+ observations"));
    }
    let mut r = AnalysisResult::success(TestKind::OneWayAnova);
    for (name, values) in &groups {
        check_normality(values, name, &mut r.warnings);
    }
    let slices = group_slices(&groups);
    let levene = htest::levene(&slices);
    if let Some((_, p)) = levene {
        if p < 0.05 {
            r.warnings.push(format!(
                "Levene's test indicates unequal variances (p={p:.4}). \
                 ANOVA is moderately robust, but consider Kruskal-Wallis if groups are very unequal."
            ));
        }
    }
    let anova = htest::one_way_anova(&slices)
        .ok_or_else(|| TestError::insufficient("Need at least 2 groups with 2+ observations"))?;
    if anova.ss_within == 0.0 {
        return Err(TestError::degenerate(
            "Every group has zero variance; the F statistic is undefined",
        ));
    }
    let ss_total = anova.ss_between + anova.ss_within;
    let eta_sq = if ss_total > 0.0 { anova.ss_between / ss_total } else { 0.0 };
    let significant = anova.p < config.alpha;

    let mut group_stats = JsonMap::new();
    let mut group_means = JsonMap::new();
    for (name, values) in &groups {
        group_stats.insert(
            name.clone(),
            json!({
                "n": values.len(),
                "mean": num(sample::mean(values)),
                "std": num(sample::std_dev(values)),
            }),
        );
        group_means.insert(name.clone(), num(sample::mean(values)));
    }

    let posthoc = if significant && groups.len() >= 3 {
        Value::Array(tukey_hsd(&groups, anova.ms_within(), anova.df_within, config.alpha))
    } else {
        Value::Null
    };
    let has_posthoc = !posthoc.is_null();

    r.summary = object(json!({
        "statistic": num(anova.f),
        "p_value": num(anova.p),
        "significant": significant,
        "group_count": groups.len(),
        "eta_squared": num(eta_sq),
        "levene_p": opt_num(levene.map(|(_, p)| p)),
        "df_between": anova.df_between,
        "df_within": anova.df_within,
    }));
    r.details = object(json!({
        "y_column": config.y_column,
        "x_column": config.x_column,
        "alpha": config.alpha,
        "group_stats": group_stats,
        "posthoc_tukey": posthoc,
        "levene": {
            "statistic": opt_num(levene.map(|(w, _)| w)),
            "p_value": opt_num(levene.map(|(_, p)| p)),
        },
        "ss_between": num(anova.ss_between),
        "ss_within": num(anova.ss_within),
    }));
    r.charts = vec![charts::box_plot(
        &groups,
        &format!("{} by {}", config.y_column, config.x_column),
        &config.y_column,
    )];
    r.interpretation_context = object(json!({
        "test_name": "One-Way ANOVA",
        "y_column": config.y_column,
        "x_column": config.x_column,
        "group_count": groups.len(),
        "group_names": group_names(&groups),
        "group_means": group_means,
        "p_value": num(anova.p),
        "significant": significant,
        "eta_squared": num(eta_sq),
        "alpha": config.alpha,
        "has_posthoc": has_posthoc,
    }));
    Ok(r)
}

// ─── Two-way ANOVA ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TwoWayConfig {
    pub y_column: String,
    pub factor_a: String,
    pub factor_b: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

/// Mean of `y` for every (a-level, b-level) cell; empty cells read 0.
pub(crate) fn cell_means(
    y: &[f64],
    a: &[String],
    b: &[String],
    a_levels: &[String],
    b_levels: &[String],
) -> Vec<(String, Vec<f64>)> {
    b_levels
        .iter()
        .map(|bl| {
            let means = a_levels
                .iter()
                .map(|al| {
                    let cell: Vec<f64> = (0..y.len())
                        .filter(|&i| a[i] == *al && b[i] == *bl)
                        .map(|i| y[i])
                        .collect();
                    if cell.is_empty() {
                        0.0
                    } else {
                        sample::mean(&cell)
                    }
                })
                .collect();
            (bl.clone(), means)
        })
        .collect()
}

pub fn two_way_anova(table: &DataTable, config: &TwoWayConfig) -> Result<AnalysisResult, TestError> {
    let names = [
        config.y_column.as_str(),
        config.factor_a.as_str(),
        config.factor_b.as_str(),
    ];
    let labels = complete_labels(table, &names)?;
    let y = numeric_rows(table, &config.y_column, &table.complete_rows(&names))?;
    let (a, b) = (&labels[1], &labels[2]);

    let a_levels = sorted_levels(a);
    let b_levels = sorted_levels(b);
    for (name, levels) in [(&config.factor_a, &a_levels), (&config.factor_b, &b_levels)] {
        if levels.len() < 2 {
            return Err(TestError::insufficient(format!(
                "Factor '{name}' needs at least 2 levels"
            )));
        }
    }
    if y.len() < 4 {
        return Err(TestError::insufficient(format!(
            "Need at least 4 complete observations, got {}",
            y.len()
        )));
    }

    let factors = vec![
        Factor::from_labels(config.factor_a.clone(), a),
        Factor::from_labels(config.factor_b.clone(), b),
    ];
    let terms = vec![Term::main(0), Term::main(1), Term::interaction(0, 1)];
    let anova = type2_anova(&y, &factors, &terms);
    let mut r = AnalysisResult::success(TestKind::TwoWayAnova);
    if anova.residual_df <= 0.0 {
        r.warnings.push(
            "No residual degrees of freedom (one observation per cell); F tests are unavailable."
                .to_string(),
        );
    }

    let mut table_json = JsonMap::new();
    let mut significant_terms = Vec::new();
    for row in &anova.rows {
        let significant = row.p.is_some_and(|p| p < config.alpha);
        if significant {
            significant_terms.push(row.term.clone());
        }
        let mut entry = object(json!({
            "sum_sq": num(row.sum_sq),
            "df": row.df,
            "F": opt_num(row.f),
            "PR(>F)": opt_num(row.p),
        }));
        if row.term != "Residual" {
            entry.insert("significant".into(), Value::Bool(significant));
        }
        table_json.insert(row.term.clone(), Value::Object(entry));
    }

    r.summary = object(json!({
        "anova_table": table_json,
        "alpha": config.alpha,
        "significant_terms": significant_terms,
    }));
    r.details = object(json!({
        "y_column": config.y_column,
        "factor_a": config.factor_a,
        "factor_b": config.factor_b,
        "anova_table": table_json,
        "model_r_squared": num(anova.r_squared),
        "n": y.len(),
    }));
    r.charts = vec![charts::interaction_plot(
        &a_levels,
        &cell_means(&y, a, b, &a_levels, &b_levels),
        &format!("Interaction: {} x {}", config.factor_a, config.factor_b),
        (&config.factor_a, &format!("Mean {}", config.y_column)),
        &config.factor_b,
    )];
    r.interpretation_context = object(json!({
        "test_name": "Two-Way ANOVA",
        "y_column": config.y_column,
        "factor_a": config.factor_a,
        "factor_b": config.factor_b,
        "anova_results": table_json,
        "significant_terms": significant_terms,
        "alpha": config.alpha,
    }));
    Ok(r)
}

// ─── Mann-Whitney ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MannWhitneyConfig {
    pub y_column: String,
    pub x_column: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub alternative: Alternative,
}

pub fn mann_whitney(table: &DataTable, config: &MannWhitneyConfig) -> Result<AnalysisResult, TestError> {
    let [(name1, g1), (name2, g2)] =
        exactly_two(groups_in_order(table, &config.y_column, &config.x_column)?)?;
    let (n1, n2) = (g1.len(), g2.len());
    let (u, p) = htest::mann_whitney_u(&g1, &g2, config.alternative);
    let rank_biserial = 1.0 - 2.0 * u / (n1 * n2) as f64;
    let significant = p < config.alpha;
    let (med1, med2) = (sample::median(&g1), sample::median(&g2));

    let mut r = AnalysisResult::success(TestKind::MannWhitney);
    r.summary = object(json!({
        "statistic": num(u),
        "p_value": num(p),
        "significant": significant,
        "group_1": name1,
        "group_1_median": num(med1),
        "group_1_n": n1,
        "group_2": name2,
        "group_2_median": num(med2),
        "group_2_n": n2,
        "rank_biserial_r": num(rank_biserial),
    }));
    r.details = object(json!({
        "y_column": config.y_column,
        "x_column": config.x_column,
        "alpha": config.alpha,
        "alternative": config.alternative.as_str(),
    }));
    let mut medians = JsonMap::new();
    medians.insert(name1.clone(), num(med1));
    medians.insert(name2.clone(), num(med2));
    r.charts = vec![charts::box_plot(
        &[(name1, g1), (name2, g2)],
        &format!("{} by {}", config.y_column, config.x_column),
        &config.y_column,
    )];
    r.interpretation_context = object(json!({
        "test_name": "Mann-Whitney U Test",
        "y_column": config.y_column,
        "x_column": config.x_column,
        "medians": medians,
        "p_value": num(p),
        "significant": significant,
        "alpha": config.alpha,
    }));
    Ok(r)
}

// ─── Kruskal-Wallis ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct KruskalConfig {
    pub y_column: String,
    pub x_column: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

pub fn kruskal_wallis(table: &DataTable, config: &KruskalConfig) -> Result<AnalysisResult, TestError> {
    let groups = groups_sorted(table, &config.y_column, &config.x_column)?;
    if groups.len() < 2 {
        return Err(TestError::insufficient("Need at least 2 groups"));
    }
    let slices = group_slices(&groups);
    let (h, p) = htest::kruskal_wallis(&slices)
        .ok_or_else(|| TestError::degenerate("All values are identical; the H statistic is undefined"))?;
    let k = groups.len();
    let n_total: usize = groups.iter().map(|(_, v)| v.len()).sum();
    let epsilon_sq = if n_total > k {
        (h - k as f64 + 1.0) / (n_total - k) as f64
    } else {
        0.0
    };

    let combined: Vec<f64> = slices.iter().flat_map(|g| g.iter().copied()).collect();
    let ranks = sample::rank_average(&combined);
    let mut group_stats = JsonMap::new();
    let mut group_medians = JsonMap::new();
    let mut offset = 0;
    for (name, values) in &groups {
        let mean_rank = sample::mean(&ranks[offset..offset + values.len()]);
        offset += values.len();
        group_stats.insert(
            name.clone(),
            json!({"n": values.len(), "median": num(sample::median(values)), "mean_rank": num(mean_rank)}),
        );
        group_medians.insert(name.clone(), num(sample::median(values)));
    }
    let significant = p < config.alpha;

    let mut r = AnalysisResult::success(TestKind::KruskalWallis);
    r.summary = object(json!({
        "statistic": num(h),
        "p_value": num(p),
        "significant": significant,
        "group_count": k,
        "epsilon_squared": num(epsilon_sq),
        "degrees_of_freedom": k - 1,
    }));
    r.details = object(json!({
        "y_column": config.y_column,
        "x_column": config.x_column,
        "alpha": config.alpha,
        "group_stats": group_stats,
    }));
    r.charts = vec![charts::box_plot(
        &groups,
        &format!("{} by {}", config.y_column, config.x_column),
        &config.y_column,
    )];
    r.interpretation_context = object(json!({
        "test_name": "Kruskal-Wallis H Test",
        "y_column": config.y_column,
        "x_column": config.x_column,
        "group_count": k,
        "group_medians": group_medians,
        "p_value": num(p),
        "significant": significant,
        "alpha": config.alpha,
    }));
    Ok(r)
}

// ─── Chi-square association ──────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChiAssociationConfig {
    pub column_a: String,
    pub column_b: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

pub fn chi_square_association(
    table: &DataTable,
    config: &ChiAssociationConfig,
) -> Result<AnalysisResult, TestError> {
    let labels = complete_labels(table, &[&config.column_a, &config.column_b])?;
    let (a, b) = (&labels[0], &labels[1]);
    let row_labels = sorted_levels(a);
    let col_labels = sorted_levels(b);
    if row_labels.is_empty() || col_labels.is_empty() {
        return Err(TestError::insufficient("Empty contingency table"));
    }
    let mut observed = vec![vec![0.0; col_labels.len()]; row_labels.len()];
    for (ra, cb) in a.iter().zip(b) {
        let (Some(i), Some(j)) = (
            row_labels.iter().position(|l| l == ra),
            col_labels.iter().position(|l| l == cb),
        ) else {
            continue;
        };
        observed[i][j] += 1.0;
    }
    let c = htest::chi2_contingency(&observed)
        .ok_or_else(|| TestError::insufficient("Empty contingency table"))?;

    let mut r = AnalysisResult::success(TestKind::ChiSquareAssociation);
    let total_cells = row_labels.len() * col_labels.len();
    let low = c.expected.iter().flatten().filter(|e| **e < 5.0).count();
    if low > 0 {
        r.warnings.push(format!(
            "{low} of {total_cells} cells ({:.0}%) have expected frequency < 5. \
             Chi-square results may not be reliable.",
            low as f64 / total_cells as f64 * 100.0
        ));
    }
    let n: f64 = observed.iter().flatten().sum();
    let min_dim = (row_labels.len() - 1).min(col_labels.len() - 1);
    let cramers_v = if n > 0.0 && min_dim > 0 {
        (c.chi2 / (n * min_dim as f64)).sqrt()
    } else {
        0.0
    };
    let significant = c.p < config.alpha;

    r.summary = object(json!({
        "statistic": num(c.chi2),
        "p_value": num(c.p),
        "significant": significant,
        "degrees_of_freedom": c.dof,
        "cramers_v": num(cramers_v),
        "n": n as usize,
        "low_expected_pct": round_to(low as f64 / total_cells as f64 * 100.0, 1),
    }));
    r.details = object(json!({
        "column_a": config.column_a,
        "column_b": config.column_b,
        "alpha": config.alpha,
        "observed": observed,
        "expected": c.expected,
        "row_labels": row_labels,
        "col_labels": col_labels,
    }));
    r.charts = vec![charts::count_heatmap(
        &observed,
        &row_labels,
        &col_labels,
        &format!("Contingency Table: {} x {}", config.column_a, config.column_b),
    )];
    r.interpretation_context = object(json!({
        "test_name": "Chi-Square Test of Association",
        "column_a": config.column_a,
        "column_b": config.column_b,
        "p_value": num(c.p),
        "significant": significant,
        "cramers_v": num(cramers_v),
        "alpha": config.alpha,
        "conclusion": if significant {
            format!(
                "There IS a statistically significant association between {} and {}",
                config.column_a, config.column_b
            )
        } else {
            format!(
                "No significant association found between {} and {}",
                config.column_a, config.column_b
            )
        },
    }));
    Ok(r)
}

// ─── Chi-square goodness of fit ──────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChiGoodnessConfig {
    pub column: String,
    /// Category → proportion. Normalised over the observed categories.
    #[serde(default)]
    pub expected_proportions: Option<HashMap<String, f64>>,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

pub fn chi_square_goodness(
    table: &DataTable,
    config: &ChiGoodnessConfig,
) -> Result<AnalysisResult, TestError> {
    let col = column(table, &config.column)?;
    let mut counts: Vec<(String, f64)> = Vec::new();
    for v in col.values().iter().filter(|v| !v.is_missing()) {
        let label = v.label();
        match counts.iter_mut().find(|(c, _)| *c == label) {
            Some((_, n)) => *n += 1.0,
            None => counts.push((label, 1.0)),
        }
    }
    counts.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    if counts.len() < 2 {
        return Err(TestError::insufficient("Need at least 2 categories"));
    }
    let categories: Vec<String> = counts.iter().map(|(c, _)| c.clone()).collect();
    let observed: Vec<f64> = counts.iter().map(|(_, n)| *n).collect();
    let n: f64 = observed.iter().sum();

    let expected: Vec<f64> = match &config.expected_proportions {
        Some(props) if !props.is_empty() => {
            let weights: Vec<f64> = categories
                .iter()
                .map(|c| props.get(c).copied().unwrap_or(0.0))
                .collect();
            if let Some((cat, _)) = categories.iter().zip(&weights).find(|(_, w)| **w <= 0.0) {
                return Err(TestError::invalid(format!(
                    "Expected proportion for category '{cat}' must be positive"
                )));
            }
            let total: f64 = weights.iter().sum();
            weights.iter().map(|w| w / total * n).collect()
        }
        _ => vec![n / categories.len() as f64; categories.len()],
    };

    let mut r = AnalysisResult::success(TestKind::ChiSquareGoodness);
    let low = expected.iter().filter(|e| **e < 5.0).count();
    if low > 0 {
        r.warnings
            .push(format!("{low} categories have expected frequency < 5."));
    }
    let (chi2, p) = htest::chi_square_gof(&observed, &expected);
    let significant = p < config.alpha;
    let rounded: Vec<f64> = expected.iter().map(|e| round_to(*e, 2)).collect();

    r.summary = object(json!({
        "statistic": num(chi2),
        "p_value": num(p),
        "significant": significant,
        "degrees_of_freedom": categories.len() - 1,
        "n": n as usize,
    }));
    r.details = object(json!({
        "column": config.column,
        "alpha": config.alpha,
        "categories": categories,
        "observed": observed,
        "expected": rounded,
    }));
    r.charts = vec![charts::bar_chart(
        &categories,
        &observed,
        &format!("Observed vs Expected: {}", config.column),
        "Count",
        false,
    )];
    r.interpretation_context = object(json!({
        "test_name": "Chi-Square Goodness of Fit",
        "column": config.column,
        "p_value": num(p),
        "significant": significant,
        "alpha": config.alpha,
        "distribution_tested": if config.expected_proportions.as_ref().is_some_and(|p| !p.is_empty()) {
            "specified"
        } else {
            "uniform"
        },
    }));
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{bell, table};
    use crate::table::Column;

    fn two_groups(a: &[f64], b: &[f64]) -> DataTable {
        let mut y = a.to_vec();
        y.extend_from_slice(b);
        let g: Vec<&str> = a.iter().map(|_| "A").chain(b.iter().map(|_| "B")).collect();
        table(vec![Column::numeric("y", &y), Column::text("g", &g)])
    }

    #[test]
    fn one_sample_t_matches_hand_computation() {
        let t = table(vec![Column::numeric("x", &[5.1, 4.9, 5.3, 5.0, 5.2, 4.8])]);
        let cfg = OneSampleConfig {
            column: "x".into(),
            population_mean: 5.0,
            alpha: 0.05,
            alternative: Alternative::TwoSided,
        };
        let r = one_sample_t(&t, &cfg).unwrap();
        // mean 5.05, sd 0.187083, se 0.076376 -> t = 0.654654
        assert!((r.summary_f64("statistic").unwrap() - 0.654654).abs() < 1e-5);
        assert_eq!(r.details["degrees_of_freedom"], 5);
        let (lo, hi) = (r.summary_f64("ci_lower").unwrap(), r.summary_f64("ci_upper").unwrap());
        assert!(lo < 5.05 && 5.05 < hi);
        assert_eq!(r.summary_bool("significant"), Some(false));
    }

    #[test]
    fn two_sample_switches_to_welch_on_unequal_spread() {
        let a = bell(30, 10.0, 0.5, 1);
        let b = bell(30, 10.0, 6.0, 2);
        let r = two_sample_t(&two_groups(&a, &b), &TwoSampleConfig {
            y_column: "y".into(),
            x_column: "g".into(),
            alpha: 0.05,
            equal_var: None,
            alternative: Alternative::TwoSided,
        })
        .unwrap();
        assert_eq!(r.summary_bool("equal_var"), Some(false));
        assert!(r.warnings.iter().any(|w| w.contains("Using Welch's t-test")));
        assert_eq!(r.summary["group_1"], "A");
    }

    #[test]
    fn two_sample_requires_exactly_two_groups() {
        let t = table(vec![
            Column::numeric("y", &[1.0, 2.0, 3.0]),
            Column::text("g", &["a", "b", "c"]),
        ]);
        let cfg = TwoSampleConfig {
            y_column: "y".into(),
            x_column: "g".into(),
            alpha: 0.05,
            equal_var: None,
            alternative: Alternative::TwoSided,
        };
        let err = two_sample_t(&t, &cfg).unwrap_err().to_string();
        assert!(err.starts_with("Expected 2 groups, found 3"));
    }

    #[test]
    fn paired_t_reports_after_minus_before() {
        let t = table(vec![
            Column::numeric("before", &[10.0, 12.0, 11.0, 13.0, 12.0]),
            Column::numeric("after", &[12.0, 13.0, 13.5, 14.0, 14.5]),
        ]);
        let r = paired_t(&t, &PairedConfig {
            column_before: "before".into(),
            column_after: "after".into(),
            alpha: 0.05,
            alternative: Alternative::TwoSided,
        })
        .unwrap();
        assert!((r.summary_f64("mean_difference").unwrap() - 1.8).abs() < 1e-12);
        assert!(r.summary_f64("statistic").unwrap() < 0.0);
        assert_eq!(r.interpretation_context["direction"], "increased");
    }

    #[test]
    fn anova_runs_tukey_for_three_separated_groups() {
        let mut y = bell(10, 10.0, 1.0, 3);
        y.extend(bell(10, 15.0, 1.0, 4));
        y.extend(bell(10, 20.0, 1.0, 5));
        let g: Vec<&str> = (0..30).map(|i| ["a", "b", "c"][i / 10]).collect();
        let t = table(vec![Column::numeric("y", &y), Column::text("g", &g)]);
        let r = one_way_anova(&t, &OneWayConfig {
            y_column: "y".into(),
            x_column: "g".into(),
            alpha: 0.05,
        })
        .unwrap();
        assert_eq!(r.summary_bool("significant"), Some(true));
        let rows = r.details["posthoc_tukey"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["group1"], "a");
        assert_eq!(rows[0]["group2"], "b");
        assert!(rows.iter().all(|row| row["reject"] == true));
        assert_eq!(r.summary["df_between"], 2.0);
    }

    #[test]
    fn anova_skips_tukey_with_two_groups() {
        let a = bell(10, 10.0, 1.0, 8);
        let b = bell(10, 20.0, 1.0, 9);
        let r = one_way_anova(&two_groups(&a, &b), &OneWayConfig {
            y_column: "y".into(),
            x_column: "g".into(),
            alpha: 0.05,
        })
        .unwrap();
        assert!(r.details["posthoc_tukey"].is_null());
    }

    #[test]
    fn two_way_table_has_all_terms() {
        let y = [10.0, 11.0, 14.0, 15.0, 20.0, 22.0, 23.0, 26.0];
        let a = ["lo", "lo", "lo", "lo", "hi", "hi", "hi", "hi"];
        let b = ["x", "x", "y", "y", "x", "x", "y", "y"];
        let t = table(vec![
            Column::numeric("y", &y),
            Column::text("temp", &a),
            Column::text("line", &b),
        ]);
        let r = two_way_anova(&t, &TwoWayConfig {
            y_column: "y".into(),
            factor_a: "temp".into(),
            factor_b: "line".into(),
            alpha: 0.05,
        })
        .unwrap();
        let tbl = r.summary["anova_table"].as_object().unwrap();
        for key in ["temp", "line", "temp:line", "Residual"] {
            assert!(tbl.contains_key(key), "missing {key}");
        }
        assert!(tbl["Residual"]["F"].is_null());
        assert_eq!(r.charts.len(), 1);
    }

    #[test]
    fn mann_whitney_exact_for_separated_samples() {
        let r = mann_whitney(&two_groups(&[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0, 7.0, 8.0]), &MannWhitneyConfig {
            y_column: "y".into(),
            x_column: "g".into(),
            alpha: 0.05,
            alternative: Alternative::TwoSided,
        })
        .unwrap();
        assert_eq!(r.summary["statistic"], 0.0);
        assert_eq!(r.summary["rank_biserial_r"], 1.0);
        assert!((r.summary_f64("p_value").unwrap() - 2.0 / 70.0).abs() < 1e-12);
    }

    #[test]
    fn kruskal_reports_epsilon_squared() {
        let t = table(vec![
            Column::numeric("y", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]),
            Column::text("g", &["a", "a", "a", "b", "b", "b", "c", "c", "c"]),
        ]);
        let r = kruskal_wallis(&t, &KruskalConfig {
            y_column: "y".into(),
            x_column: "g".into(),
            alpha: 0.05,
        })
        .unwrap();
        let h = r.summary_f64("statistic").unwrap();
        assert!((h - 7.2).abs() < 1e-9);
        assert!((r.summary_f64("epsilon_squared").unwrap() - (h - 2.0) / 6.0).abs() < 1e-12);
        assert_eq!(r.details["group_stats"]["b"]["mean_rank"], 5.0);
    }

    #[test]
    fn chi_square_association_flags_sparse_cells() {
        let a = ["m", "m", "f", "f", "m", "f"];
        let b = ["y", "n", "y", "n", "y", "n"];
        let t = table(vec![Column::text("sex", &a), Column::text("resp", &b)]);
        let r = chi_square_association(&t, &ChiAssociationConfig {
            column_a: "sex".into(),
            column_b: "resp".into(),
            alpha: 0.05,
        })
        .unwrap();
        assert_eq!(r.summary["degrees_of_freedom"], 1);
        assert!(r.warnings[0].starts_with("4 of 4 cells (100%)"));
        assert_eq!(r.details["row_labels"], json!(["f", "m"]));
    }

    #[test]
    fn chi_square_goodness_uniform_and_specified() {
        let cats: Vec<&str> = std::iter::repeat("a")
            .take(30)
            .chain(std::iter::repeat("b").take(20))
            .chain(std::iter::repeat("c").take(10))
            .collect();
        let t = table(vec![Column::text("c", &cats)]);
        let uniform = chi_square_goodness(&t, &ChiGoodnessConfig {
            column: "c".into(),
            expected_proportions: None,
            alpha: 0.05,
        })
        .unwrap();
        // (100 + 0 + 100) / 20
        assert!((uniform.summary_f64("statistic").unwrap() - 10.0).abs() < 1e-12);

        let props: HashMap<String, f64> =
            [("a".to_string(), 3.0), ("b".to_string(), 2.0), ("c".to_string(), 1.0)]
                .into_iter()
                .collect();
        let fitted = chi_square_goodness(&t, &ChiGoodnessConfig {
            column: "c".into(),
            expected_proportions: Some(props),
            alpha: 0.05,
        })
        .unwrap();
        assert!(fitted.summary_f64("statistic").unwrap().abs() < 1e-12);
        assert_eq!(fitted.interpretation_context["distribution_tested"], "specified");
    }
}
