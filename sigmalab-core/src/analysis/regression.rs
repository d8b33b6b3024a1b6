//! Correlation and regression family.

use super::{column, complete_numeric, default_alpha, numeric_rows};
use crate::charts::{self, Trendline};
use crate::htest;
use crate::kind::TestKind;
use crate::linear_model::{durbin_watson, vif, Logit, Ols};
use crate::result::{num, object, round_to, AnalysisResult, JsonMap, TestError};
use crate::table::DataTable;
use rayon::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};

const STRONG_CORRELATION: f64 = 0.5;
const VIF_LIMIT: f64 = 10.0;

// ─── Correlation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
    #[default]
    Both,
}

impl CorrelationMethod {
    fn as_str(self) -> &'static str {
        match self {
            CorrelationMethod::Pearson => "pearson",
            CorrelationMethod::Spearman => "spearman",
            CorrelationMethod::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub method: CorrelationMethod,
}

type CorrFn = fn(&[f64], &[f64]) -> (f64, f64);

/// Symmetric `(r, p)` matrices; pairs are computed in parallel.
fn correlation_matrix(data: &[Vec<f64>], f: CorrFn) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let k = data.len();
    let pairs: Vec<(usize, usize)> = (0..k)
        .flat_map(|i| ((i + 1)..k).map(move |j| (i, j)))
        .collect();
    let computed: Vec<(usize, usize, f64, f64)> = pairs
        .par_iter()
        .map(|&(i, j)| {
            let (r, p) = f(&data[i], &data[j]);
            (i, j, r, p)
        })
        .collect();
    let mut r = vec![vec![0.0; k]; k];
    let mut p = vec![vec![0.0; k]; k];
    for (i, row) in r.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    for (i, j, rv, pv) in computed {
        r[i][j] = rv;
        r[j][i] = rv;
        p[i][j] = pv;
        p[j][i] = pv;
    }
    (r, p)
}

fn matrix_json(names: &[String], m: &[Vec<f64>]) -> Value {
    let mut outer = JsonMap::new();
    for (i, a) in names.iter().enumerate() {
        let mut inner = JsonMap::new();
        for (j, b) in names.iter().enumerate() {
            inner.insert(b.clone(), num(m[i][j]));
        }
        outer.insert(a.clone(), Value::Object(inner));
    }
    Value::Object(outer)
}

pub fn correlation(table: &DataTable, config: &CorrelationConfig) -> Result<AnalysisResult, TestError> {
    let names: Vec<String> = match &config.columns {
        Some(cols) => {
            for c in cols {
                column(table, c)?;
            }
            cols.iter()
                .filter(|c| table.column(c).is_some_and(|col| col.is_numeric()))
                .cloned()
                .collect()
        }
        None => table
            .numeric_column_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };
    if names.len() < 2 {
        return Err(TestError::insufficient("Need at least 2 numeric columns"));
    }
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let data = complete_numeric(table, &refs)?;
    let n = data[0].len();
    if n < 3 {
        return Err(TestError::insufficient("Need at least 3 complete observations"));
    }
    let constant: Vec<&String> = names
        .iter()
        .zip(&data)
        .filter(|(_, col)| col.iter().all(|v| *v == col[0]))
        .map(|(name, _)| name)
        .collect();

    let mut methods: Vec<(&str, CorrFn, &str)> = Vec::new();
    if config.method != CorrelationMethod::Spearman {
        methods.push(("pearson", htest::pearson, "Pearson Correlation Matrix"));
    }
    if config.method != CorrelationMethod::Pearson {
        methods.push(("spearman", htest::spearman, "Spearman Correlation Matrix"));
    }

    let mut details = object(json!({ "columns": names }));
    let mut chart_list = Vec::new();
    let mut strong: Vec<(f64, Value)> = Vec::new();
    for (label, f, title) in methods {
        let (r, p) = correlation_matrix(&data, f);
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                if r[i][j].abs() >= STRONG_CORRELATION {
                    strong.push((
                        r[i][j].abs(),
                        json!({
                            "var1": names[i],
                            "var2": names[j],
                            "r": round_to(r[i][j], 4),
                            "method": label,
                        }),
                    ));
                }
            }
        }
        details.insert(
            label.to_string(),
            json!({
                "correlations": matrix_json(&names, &r),
                "p_values": matrix_json(&names, &p),
            }),
        );
        chart_list.push(charts::heatmap(&r, &names, title));
    }
    strong.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let strong: Vec<Value> = strong.into_iter().map(|(_, v)| v).collect();

    let mut r = AnalysisResult::success(TestKind::Correlation);
    for name in constant {
        r.warnings.push(format!(
            "Column '{name}' is constant. Its correlations are undefined."
        ));
    }
    r.summary = object(json!({
        "columns": names,
        "n": n,
        "strong_correlations": strong.iter().take(10).collect::<Vec<_>>(),
    }));
    r.details = details;
    r.charts = chart_list;
    r.interpretation_context = object(json!({
        "test_name": "Correlation Analysis",
        "n": n,
        "column_count": names.len(),
        "strong_pairs": strong.iter().take(5).collect::<Vec<_>>(),
        "methods_used": config.method.as_str(),
    }));
    Ok(r)
}

// ─── Simple regression ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SimpleRegressionConfig {
    pub y_column: String,
    pub x_column: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn coefficient(model: &Ols, i: usize) -> Value {
    json!({
        "value": num(model.params[i]),
        "std_err": num(model.bse[i]),
        "t_stat": num(model.tvalues[i]),
        "p_value": num(model.pvalues[i]),
    })
}

pub fn simple_regression(
    table: &DataTable,
    config: &SimpleRegressionConfig,
) -> Result<AnalysisResult, TestError> {
    let cols = complete_numeric(table, &[&config.y_column, &config.x_column])?;
    let (y, x) = (&cols[0], &cols[1]);
    let n = y.len();
    if n < 3 {
        return Err(TestError::insufficient("Need at least 3 observations"));
    }
    let model = Ols::fit(y, std::slice::from_ref(x)).ok_or_else(|| {
        TestError::degenerate(format!("'{}' has no variation; slope is undefined", config.x_column))
    })?;
    let ci = model.conf_int(config.alpha);
    let (intercept, slope) = (model.params[0], model.params[1]);
    let significant = model.f_p_value < config.alpha;
    let (y_col, x_col) = (&config.y_column, &config.x_column);
    let equation = format!("{y_col} = {intercept:.4} + {slope:.4} × {x_col}");

    let mut r = AnalysisResult::success(TestKind::SimpleRegression);
    r.summary = object(json!({
        "r_squared": num(model.r_squared),
        "adj_r_squared": num(model.adj_r_squared),
        "f_statistic": num(model.f_statistic),
        "f_p_value": num(model.f_p_value),
        "significant": significant,
        "intercept": num(intercept),
        "slope": num(slope),
        "slope_p_value": num(model.pvalues[1]),
        "slope_ci_lower": num(ci[1].0),
        "slope_ci_upper": num(ci[1].1),
        "n": n,
        "durbin_watson": num(durbin_watson(&model.residuals)),
    }));
    let mut coefficients = JsonMap::new();
    coefficients.insert("const".into(), coefficient(&model, 0));
    coefficients.insert(x_col.clone(), coefficient(&model, 1));
    r.details = object(json!({
        "y_column": y_col,
        "x_column": x_col,
        "alpha": config.alpha,
        "equation": equation,
        "coefficients": coefficients,
        "aic": num(model.aic),
        "bic": num(model.bic),
    }));

    let (lo, hi) = crate::sample::min_max(x);
    let line = Trendline {
        x: vec![lo, hi],
        y: vec![intercept + slope * lo, intercept + slope * hi],
        name: "Regression Line".to_string(),
    };
    r.charts = vec![charts::scatter(
        x,
        y,
        &format!("{y_col} vs {x_col}"),
        (x_col, y_col),
        Some(line),
        "Data",
    )];
    r.charts.extend(charts::residual_plots(
        &model.fitted,
        &model.residuals,
        &format!("{y_col} ~ {x_col}"),
    ));
    r.interpretation_context = object(json!({
        "test_name": "Simple Linear Regression",
        "equation": equation,
        "r_squared": num(model.r_squared),
        "r_squared_pct": round_to(model.r_squared * 100.0, 1),
        "slope": num(slope),
        "slope_p_value": num(model.pvalues[1]),
        "significant": significant,
        "alpha": config.alpha,
        "y_column": y_col,
        "x_column": x_col,
        "interpretation": format!(
            "For every 1-unit increase in {x_col}, {y_col} changes by {slope:.4} units. \
             The model explains {:.1}% of the variation in {y_col}.",
            model.r_squared * 100.0
        ),
    }));
    Ok(r)
}

// ─── Multiple regression ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MultipleRegressionConfig {
    pub y_column: String,
    pub x_columns: Vec<String>,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn check_predictors(table: &DataTable, y: &str, xs: &[String]) -> Result<(), TestError> {
    column(table, y)?;
    let missing: Vec<&str> = xs
        .iter()
        .filter(|c| !table.has_column(c))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(TestError::ColumnNotFound(missing.join(", ")));
    }
    if xs.is_empty() {
        return Err(TestError::insufficient("Need at least 1 predictor column"));
    }
    Ok(())
}

pub fn multiple_regression(
    table: &DataTable,
    config: &MultipleRegressionConfig,
) -> Result<AnalysisResult, TestError> {
    check_predictors(table, &config.y_column, &config.x_columns)?;
    let mut names: Vec<&str> = vec![config.y_column.as_str()];
    names.extend(config.x_columns.iter().map(String::as_str));
    let mut cols = complete_numeric(table, &names)?;
    let y = cols.remove(0);
    let xs = cols;
    let n = y.len();
    let k = xs.len();
    if n < k + 2 {
        return Err(TestError::insufficient(format!(
            "Need at least {} observations, got {n}",
            k + 2
        )));
    }

    let mut r = AnalysisResult::success(TestKind::MultipleRegression);
    if n < 10 * k {
        r.warnings.push(format!(
            "Sample size ({n}) is less than 10× the number of predictors ({k}). Results may be unreliable."
        ));
    }
    let mut vif_data = JsonMap::new();
    if k >= 2 {
        for (i, name) in config.x_columns.iter().enumerate() {
            let v = vif(&xs, i);
            if v > VIF_LIMIT {
                r.warnings.push(format!(
                    "High multicollinearity detected for '{name}' (VIF = {v:.1})"
                ));
            }
            vif_data.insert(name.clone(), num(round_to(v, 2)));
        }
    }

    let model = Ols::fit(&y, &xs)
        .ok_or_else(|| TestError::degenerate("Predictors are perfectly collinear; the model cannot be fit"))?;
    let ci = model.conf_int(config.alpha);
    let mut coefficients = JsonMap::new();
    let mut significant_predictors = Vec::new();
    let coeff_names = std::iter::once("const").chain(config.x_columns.iter().map(String::as_str));
    for (i, name) in coeff_names.enumerate() {
        let significant = model.pvalues[i] < config.alpha;
        if significant && i > 0 {
            significant_predictors.push(name.to_string());
        }
        coefficients.insert(
            name.to_string(),
            json!({
                "value": num(model.params[i]),
                "std_err": num(model.bse[i]),
                "t_stat": num(model.tvalues[i]),
                "p_value": num(model.pvalues[i]),
                "ci_lower": num(ci[i].0),
                "ci_upper": num(ci[i].1),
                "significant": significant,
            }),
        );
    }
    let significant = model.f_p_value < config.alpha;

    r.summary = object(json!({
        "r_squared": num(model.r_squared),
        "adj_r_squared": num(model.adj_r_squared),
        "f_statistic": num(model.f_statistic),
        "f_p_value": num(model.f_p_value),
        "significant": significant,
        "n": n,
        "predictor_count": k,
        "significant_predictors": significant_predictors,
    }));
    r.details = object(json!({
        "y_column": config.y_column,
        "x_columns": config.x_columns,
        "alpha": config.alpha,
        "coefficients": coefficients,
        "vif": vif_data,
        "aic": num(model.aic),
        "bic": num(model.bic),
        "durbin_watson": num(durbin_watson(&model.residuals)),
    }));
    r.charts = charts::residual_plots(
        &model.fitted,
        &model.residuals,
        &format!("Multiple Regression: {}", config.y_column),
    );
    r.interpretation_context = object(json!({
        "test_name": "Multiple Linear Regression",
        "r_squared": num(model.r_squared),
        "r_squared_pct": round_to(model.r_squared * 100.0, 1),
        "adj_r_squared": num(model.adj_r_squared),
        "significant": significant,
        "significant_predictors": significant_predictors,
        "predictor_count": k,
        "alpha": config.alpha,
        "y_column": config.y_column,
    }));
    Ok(r)
}

// ─── Logistic regression ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LogisticConfig {
    pub y_column: String,
    pub x_columns: Vec<String>,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

pub fn logistic_regression(
    table: &DataTable,
    config: &LogisticConfig,
) -> Result<AnalysisResult, TestError> {
    check_predictors(table, &config.y_column, &config.x_columns)?;
    let mut names: Vec<&str> = vec![config.y_column.as_str()];
    names.extend(config.x_columns.iter().map(String::as_str));
    let labels_col = column(table, &config.y_column)?;
    let rows = table.complete_rows(&names);
    let xs = config
        .x_columns
        .iter()
        .map(|c| numeric_rows(table, c, &rows))
        .collect::<Result<Vec<_>, _>>()?;
    let y_labels: Vec<String> = rows
        .iter()
        .map(|&r| labels_col.get(r).label())
        .collect();
    let mut levels: Vec<&String> = Vec::new();
    for l in &y_labels {
        if !levels.contains(&l) {
            levels.push(l);
        }
    }
    if levels.len() != 2 {
        return Err(TestError::insufficient(format!(
            "Y must have exactly 2 levels, found {}: {:?}",
            levels.len(),
            levels
        )));
    }

    let mut r = AnalysisResult::success(TestKind::LogisticRegression);
    let zero_one = levels.iter().all(|l| *l == "0" || *l == "1");
    let positive = if zero_one { "1".to_string() } else { levels[1].clone() };
    if !zero_one {
        r.warnings.push(format!(
            "Mapped '{}' → 0 and '{}' → 1",
            levels[0], levels[1]
        ));
    }
    let y: Vec<f64> = y_labels
        .iter()
        .map(|l| if *l == positive { 1.0 } else { 0.0 })
        .collect();
    let n = y.len();
    let k = config.x_columns.len();
    if n < k + 10 {
        r.warnings.push(format!(
            "Small sample ({n}) for {k} predictors. Results may be unreliable."
        ));
    }

    let model = Logit::fit(&y, &xs).map_err(|e| TestError::degenerate(e.to_string()))?;
    let ci = model.conf_int(config.alpha);
    let mut coefficients = JsonMap::new();
    let mut odds_ratios = JsonMap::new();
    let mut significant_predictors = Vec::new();
    let coeff_names = std::iter::once("const").chain(config.x_columns.iter().map(String::as_str));
    for (i, name) in coeff_names.enumerate() {
        let significant = model.pvalues[i] < config.alpha;
        let odds = model.params[i].exp();
        if i > 0 {
            odds_ratios.insert(name.to_string(), num(odds));
            if significant {
                significant_predictors.push(name.to_string());
            }
        }
        coefficients.insert(
            name.to_string(),
            json!({
                "value": num(model.params[i]),
                "odds_ratio": num(odds),
                "std_err": num(model.bse[i]),
                "z_stat": num(model.zvalues[i]),
                "p_value": num(model.pvalues[i]),
                "ci_lower": num(ci[i].0),
                "ci_upper": num(ci[i].1),
                "significant": significant,
            }),
        );
    }

    let (mut tp, mut tn, mut fp, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    for (p, actual) in model.predicted.iter().zip(&y) {
        match (*p >= 0.5, *actual == 1.0) {
            (true, true) => tp += 1,
            (false, false) => tn += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
        }
    }
    let accuracy = (tp + tn) as f64 / n as f64;

    r.summary = object(json!({
        "pseudo_r_squared": num(model.pseudo_r_squared),
        "log_likelihood": num(model.llf),
        "aic": num(model.aic),
        "bic": num(model.bic),
        "accuracy": num(accuracy),
        "n": n,
        "significant_predictors": significant_predictors,
    }));
    r.details = object(json!({
        "y_column": config.y_column,
        "x_columns": config.x_columns,
        "alpha": config.alpha,
        "coefficients": coefficients,
        "confusion_matrix": {
            "true_positive": tp,
            "true_negative": tn,
            "false_positive": fp,
            "false_negative": fn_,
        },
        "accuracy": num(accuracy),
        "iterations": model.iterations,
    }));
    r.interpretation_context = object(json!({
        "test_name": "Logistic Regression",
        "y_column": config.y_column,
        "pseudo_r_squared": num(model.pseudo_r_squared),
        "accuracy": num(accuracy),
        "accuracy_pct": round_to(accuracy * 100.0, 1),
        "significant_predictors": significant_predictors,
        "odds_ratios": odds_ratios,
        "alpha": config.alpha,
    }));
    Ok(r)
}
