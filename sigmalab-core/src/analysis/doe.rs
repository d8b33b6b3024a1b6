//! Two-level factorial design generation and factorial ANOVA.
//!
//! - `full_factorial` enumerates all 2^k coded runs, with replicates and
//!   optional center points
//! - `fractional_factorial` builds a 2^(k-p) base design and derives the
//!   remaining columns as products of base columns
//! - `doe_analysis` fits main effects plus pairwise interactions by Type-II ANOVA
//!
//! Run order is shuffled with a fixed seed so that the same request always
//! produces the same design.

use super::comparison::cell_means;
use super::{column, default_alpha, numeric_rows, sorted_levels};
use crate::charts;
use crate::kind::TestKind;
use crate::linear_model::{type2_anova, Factor, Term};
use crate::result::{num, object, opt_num, round_to, AnalysisResult, JsonMap, TestError};
use crate::sample;
use crate::table::DataTable;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::{json, Value};

/// Seed for run-order randomization.
pub const DESIGN_SEED: u64 = 42;

const MAX_FULL_FACTORS: usize = 10;

// ─── Factor levels ───────────────────────────────────────────────────

/// A factor with its low and high settings, as given in the config.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorLevels {
    pub name: String,
    pub low: Value,
    pub high: Value,
}

impl FactorLevels {
    /// Actual setting for a coded level (-1, 0, +1). Center points need
    /// numeric settings.
    fn actual(&self, coded: i8) -> Result<Value, TestError> {
        match coded {
            c if c < 0 => Ok(self.low.clone()),
            c if c > 0 => Ok(self.high.clone()),
            _ => match (self.low.as_f64(), self.high.as_f64()) {
                (Some(l), Some(h)) => Ok(num((l + h) / 2.0)),
                _ => Err(TestError::invalid(format!(
                    "Center points need numeric levels for factor '{}'",
                    self.name
                ))),
            },
        }
    }
}

/// Parse `{"name": [low, high], ...}`, keeping the given factor order.
fn parse_factors(factors: &JsonMap) -> Result<Vec<FactorLevels>, TestError> {
    factors
        .iter()
        .map(|(name, levels)| match levels.as_array().map(Vec::as_slice) {
            Some([low, high]) => Ok(FactorLevels {
                name: name.clone(),
                low: low.clone(),
                high: high.clone(),
            }),
            _ => Err(TestError::invalid(format!(
                "Factor '{name}' must have exactly two levels [low, high]"
            ))),
        })
        .collect()
}

// ─── Design construction ─────────────────────────────────────────────

/// All 2^k coded runs in standard order, first factor varying slowest.
fn coded_grid(k: usize) -> Vec<Vec<i8>> {
    (0..1usize << k)
        .map(|run| {
            (0..k)
                .map(|j| if (run >> (k - 1 - j)) & 1 == 1 { 1 } else { -1 })
                .collect()
        })
        .collect()
}

fn replicate(base: &[Vec<i8>], replicates: usize) -> Vec<Vec<i8>> {
    let mut runs = Vec::with_capacity(base.len() * replicates);
    for _ in 0..replicates {
        runs.extend(base.iter().cloned());
    }
    runs
}

/// Shuffle runs and emit `{run_order, std_order, <factor>: actual, coded}` rows.
fn design_table(factors: &[FactorLevels], runs: Vec<Vec<i8>>) -> Result<Vec<Value>, TestError> {
    let mut ordered: Vec<(usize, Vec<i8>)> = runs.into_iter().enumerate().collect();
    let mut rng = StdRng::seed_from_u64(DESIGN_SEED);
    ordered.shuffle(&mut rng);

    ordered
        .into_iter()
        .enumerate()
        .map(|(position, (std_index, coded))| {
            let mut row = JsonMap::new();
            row.insert("run_order".into(), Value::from(position + 1));
            row.insert("std_order".into(), Value::from(std_index + 1));
            let mut coded_map = JsonMap::new();
            for (factor, &c) in factors.iter().zip(&coded) {
                row.insert(factor.name.clone(), factor.actual(c)?);
                coded_map.insert(factor.name.clone(), Value::from(c));
            }
            row.insert("coded".into(), Value::Object(coded_map));
            Ok(Value::Object(row))
        })
        .collect()
}

fn levels_json(factors: &[FactorLevels]) -> (Value, Value) {
    let mut coded = JsonMap::new();
    let mut actual = JsonMap::new();
    for f in factors {
        coded.insert(f.name.clone(), json!([-1, 1]));
        actual.insert(f.name.clone(), json!([f.low, f.high]));
    }
    (Value::Object(coded), Value::Object(actual))
}

fn factor_names(factors: &[FactorLevels]) -> Vec<String> {
    factors.iter().map(|f| f.name.clone()).collect()
}

fn default_replicates() -> usize {
    1
}

// ─── Full factorial ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FullFactorialConfig {
    pub factors: JsonMap,
    #[serde(default)]
    pub center_points: usize,
    #[serde(default = "default_replicates")]
    pub replicates: usize,
}

pub fn full_factorial(
    _table: &DataTable,
    config: &FullFactorialConfig,
) -> Result<AnalysisResult, TestError> {
    let factors = parse_factors(&config.factors)?;
    let k = factors.len();
    if k < 2 {
        return Err(TestError::invalid("Need at least 2 factors"));
    }
    if k > MAX_FULL_FACTORS {
        return Err(TestError::invalid(format!(
            "Too many factors ({k}). Maximum {MAX_FULL_FACTORS} for full factorial."
        )));
    }
    let replicates = config.replicates.max(1);

    let base = coded_grid(k);
    let base_runs = base.len();
    let mut runs = replicate(&base, replicates);
    runs.extend((0..config.center_points).map(|_| vec![0i8; k]));
    let total_runs = runs.len();
    let design = design_table(&factors, runs)?;
    let (coded_levels, actual_levels) = levels_json(&factors);

    let mut r = AnalysisResult::success(TestKind::FullFactorial);
    r.summary = object(json!({
        "design_type": format!("2^{k} Full Factorial"),
        "factors": k,
        "factor_names": factor_names(&factors),
        "total_runs": total_runs,
        "base_runs": base_runs,
        "replicates": replicates,
        "center_points": config.center_points,
    }));
    r.details = object(json!({
        "design_table": design,
        "factors": factor_names(&factors),
        "coded_levels": coded_levels,
        "actual_levels": actual_levels,
        "seed": DESIGN_SEED,
    }));
    r.interpretation_context = object(json!({
        "test_name": "Full Factorial Design",
        "factors": k,
        "total_runs": total_runs,
        "instruction": "Run experiments in the randomized run order shown. Record the response for each run.",
    }));
    Ok(r)
}

// ─── Fractional factorial ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FractionalFactorialConfig {
    pub factors: JsonMap,
    pub fraction: usize,
    #[serde(default = "default_replicates")]
    pub replicates: usize,
}

pub fn fractional_factorial(
    _table: &DataTable,
    config: &FractionalFactorialConfig,
) -> Result<AnalysisResult, TestError> {
    let factors = parse_factors(&config.factors)?;
    let k = factors.len();
    let p = config.fraction;
    if k < 3 {
        return Err(TestError::invalid(
            "Fractional factorial requires at least 3 factors",
        ));
    }
    if p == 0 || p >= k {
        return Err(TestError::invalid(format!(
            "Fraction p={p} must be between 1 and k-1 (k={k})"
        )));
    }
    let replicates = config.replicates.max(1);
    let base_k = k - p;

    // Generated column g is the product of the first (base_k - g) base columns.
    let base: Vec<Vec<i8>> = coded_grid(base_k)
        .into_iter()
        .map(|mut run| {
            let generated: Vec<i8> = (0..p)
                .map(|g| run.iter().take(base_k.saturating_sub(g)).product())
                .collect();
            run.extend(generated);
            run
        })
        .collect();
    let base_runs = base.len();
    let runs = replicate(&base, replicates);
    let total_runs = runs.len();
    let design = design_table(&factors, runs)?;

    let resolution = base_k as i64 - p as i64 + 1;
    let resolution_label = if resolution >= 3 {
        format!("Resolution {resolution}")
    } else {
        "Low resolution".to_string()
    };

    let mut r = AnalysisResult::success(TestKind::FractionalFactorial);
    r.summary = object(json!({
        "design_type": format!("2^({k}-{p}) Fractional Factorial"),
        "factors": k,
        "fraction": p,
        "factor_names": factor_names(&factors),
        "base_runs": base_runs,
        "total_runs": total_runs,
        "replicates": replicates,
        "resolution": resolution_label,
    }));
    r.details = object(json!({
        "design_table": design,
        "factors": factor_names(&factors),
        "generators": format!("p={p}"),
        "seed": DESIGN_SEED,
    }));
    r.warnings
        .push("Main effects may be confounded with higher-order interactions.".to_string());
    r.interpretation_context = object(json!({
        "test_name": "Fractional Factorial Design",
        "factors": k,
        "total_runs": total_runs,
        "resolution": resolution_label,
    }));
    Ok(r)
}

// ─── Analysis ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DoeAnalysisConfig {
    pub response_column: String,
    pub factor_columns: Vec<String>,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

pub fn doe_analysis(table: &DataTable, config: &DoeAnalysisConfig) -> Result<AnalysisResult, TestError> {
    if config.factor_columns.is_empty() {
        return Err(TestError::invalid("Need at least 1 factor column"));
    }
    let mut names = vec![config.response_column.as_str()];
    names.extend(config.factor_columns.iter().map(String::as_str));
    let mut factor_cols = Vec::with_capacity(config.factor_columns.len());
    for name in &config.factor_columns {
        factor_cols.push(column(table, name)?);
    }
    let rows = table.complete_rows(&names);
    let y = numeric_rows(table, &config.response_column, &rows)?;
    let n = y.len();
    if n < 4 {
        return Err(TestError::insufficient(format!(
            "Need at least 4 observations, got {n}"
        )));
    }
    let labels: Vec<Vec<String>> = factor_cols
        .iter()
        .map(|c| rows.iter().map(|&r| c.get(r).label()).collect())
        .collect();
    for (name, l) in config.factor_columns.iter().zip(&labels) {
        if sorted_levels(l).len() < 2 {
            return Err(TestError::insufficient(format!(
                "Factor '{name}' needs at least 2 levels"
            )));
        }
    }

    let factors: Vec<Factor> = config
        .factor_columns
        .iter()
        .zip(&labels)
        .map(|(name, l)| Factor::from_labels(name.clone(), l))
        .collect();
    let k = factors.len();
    let mut terms: Vec<Term> = (0..k).map(Term::main).collect();
    for i in 0..k {
        for j in i + 1..k {
            terms.push(Term::interaction(i, j));
        }
    }
    let anova = type2_anova(&y, &factors, &terms);

    let mut r = AnalysisResult::success(TestKind::DoeAnalysis);
    if anova.residual_df <= 0.0 {
        r.warnings.push(
            "No residual degrees of freedom: F-tests are unavailable. Add replicates or center points."
                .to_string(),
        );
    }

    let mut effects = JsonMap::new();
    let mut significant = Vec::new();
    let mut ranked: Vec<(String, f64)> = Vec::new();
    for (term, row) in terms.iter().zip(&anova.rows) {
        let label = term.label(&factors);
        let is_significant = row.p.is_some_and(|p| p < config.alpha);
        if is_significant {
            significant.push(label.clone());
        }
        if let Some(f) = row.f {
            ranked.push((label.clone(), f.abs()));
        }
        effects.insert(
            label,
            json!({
                "sum_sq": num(row.sum_sq),
                "df": row.df,
                "F": opt_num(row.f),
                "p_value": opt_num(row.p),
                "significant": is_significant,
            }),
        );
    }
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let main_effects: Vec<(String, Vec<String>, Vec<f64>)> = config
        .factor_columns
        .iter()
        .zip(&labels)
        .map(|(name, l)| {
            let levels = sorted_levels(l);
            let means = levels
                .iter()
                .map(|lvl| {
                    let cell: Vec<f64> = (0..n).filter(|&i| l[i] == *lvl).map(|i| y[i]).collect();
                    sample::mean(&cell)
                })
                .collect();
            (name.clone(), levels, means)
        })
        .collect();
    r.charts.push(charts::main_effects_plot(
        &main_effects,
        &format!("Main Effects Plot: {}", config.response_column),
        &config.response_column,
    ));
    if k >= 2 {
        let (f1, f2) = (&config.factor_columns[0], &config.factor_columns[1]);
        let a_levels = sorted_levels(&labels[0]);
        let b_levels = sorted_levels(&labels[1]);
        let traces = cell_means(&y, &labels[0], &labels[1], &a_levels, &b_levels);
        r.charts.push(charts::interaction_plot(
            &a_levels,
            &traces,
            &format!("Interaction: {f1} x {f2}"),
            (f1, &config.response_column),
            f2,
        ));
    }
    if !ranked.is_empty() {
        let (cats, vals): (Vec<String>, Vec<f64>) = ranked.into_iter().unzip();
        r.charts.push(charts::bar_chart(
            &cats,
            &vals,
            "Pareto of Standardized Effects (|F-statistic|)",
            "|F|",
            true,
        ));
    }

    let r2 = anova.r_squared;
    r.summary = object(json!({
        "r_squared": round_to(r2, 4),
        "adj_r_squared": round_to(anova.adj_r_squared, 4),
        "effects": effects.clone(),
        "significant_effects": significant.clone(),
        "n": n,
        "factor_count": k,
    }));
    r.details = object(json!({
        "response_column": config.response_column,
        "factor_columns": config.factor_columns,
        "alpha": config.alpha,
        "anova_effects": effects,
        "r_squared": num(r2),
        "residual_df": anova.residual_df,
    }));
    let recommendation = if significant.is_empty() {
        "No statistically significant effects found at the chosen alpha level.".to_string()
    } else {
        format!(
            "Significant effects: {}. Model explains {:.1}% of variation.",
            significant.join(", "),
            r2 * 100.0
        )
    };
    r.interpretation_context = object(json!({
        "test_name": "DOE Analysis (Factorial ANOVA)",
        "response": config.response_column,
        "r_squared": round_to(r2, 4),
        "significant_effects": significant,
        "recommendation": recommendation,
    }));
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{config, table};
    use crate::table::Column;

    fn factors(n: usize) -> JsonMap {
        let mut map = JsonMap::new();
        for i in 0..n {
            map.insert(format!("F{i}"), json!([10 * i, 10 * i + 5]));
        }
        map
    }

    fn design(r: &AnalysisResult) -> Vec<Value> {
        r.details["design_table"].as_array().cloned().unwrap()
    }

    #[test]
    fn coded_grid_is_standard_order() {
        assert_eq!(
            coded_grid(2),
            vec![vec![-1, -1], vec![-1, 1], vec![1, -1], vec![1, 1]]
        );
    }

    #[test]
    fn full_factorial_counts_replicates_and_center_points() {
        let cfg = FullFactorialConfig {
            factors: factors(3),
            center_points: 1,
            replicates: 2,
        };
        let r = full_factorial(&DataTable::empty(), &cfg).unwrap();
        assert_eq!(r.summary["total_runs"], 17);
        assert_eq!(r.summary["base_runs"], 8);
        let rows = design(&r);
        let center = rows
            .iter()
            .find(|row| row["coded"]["F0"] == 0)
            .unwrap();
        assert_eq!(center["F1"], 12.5);
        let mut orders: Vec<u64> = rows.iter().map(|row| row["std_order"].as_u64().unwrap()).collect();
        orders.sort_unstable();
        assert_eq!(orders, (1..=17).collect::<Vec<u64>>());
    }

    #[test]
    fn design_order_is_reproducible() {
        let cfg = FullFactorialConfig {
            factors: factors(4),
            center_points: 0,
            replicates: 1,
        };
        let a = full_factorial(&DataTable::empty(), &cfg).unwrap();
        let b = full_factorial(&DataTable::empty(), &cfg).unwrap();
        assert_eq!(design(&a), design(&b));
    }

    #[test]
    fn full_factorial_rejects_factor_counts() {
        let one = FullFactorialConfig {
            factors: factors(1),
            center_points: 0,
            replicates: 1,
        };
        assert!(full_factorial(&DataTable::empty(), &one).unwrap_err().is_configuration());
        let many = FullFactorialConfig {
            factors: factors(11),
            center_points: 0,
            replicates: 1,
        };
        assert!(full_factorial(&DataTable::empty(), &many).is_err());
    }

    #[test]
    fn center_points_need_numeric_levels() {
        let cfg = FullFactorialConfig {
            factors: config(json!({"A": ["lo", "hi"], "B": [1, 2]})),
            center_points: 1,
            replicates: 1,
        };
        assert!(full_factorial(&DataTable::empty(), &cfg).unwrap_err().is_configuration());
    }

    #[test]
    fn half_fraction_of_four_factors_has_eight_complete_runs() {
        let cfg = FractionalFactorialConfig {
            factors: factors(4),
            fraction: 1,
            replicates: 1,
        };
        let r = fractional_factorial(&DataTable::empty(), &cfg).unwrap();
        let rows = design(&r);
        assert_eq!(rows.len(), 8);
        for row in &rows {
            for i in 0..4 {
                assert!(row[format!("F{i}")].is_number());
            }
        }
        assert_eq!(r.summary["resolution"], "Resolution 3");
        // D = ABC
        for row in &rows {
            let c = &row["coded"];
            let abc = c["F0"].as_i64().unwrap() * c["F1"].as_i64().unwrap() * c["F2"].as_i64().unwrap();
            assert_eq!(c["F3"].as_i64().unwrap(), abc);
        }
    }

    #[test]
    fn fraction_must_leave_a_base_design() {
        let cfg = FractionalFactorialConfig {
            factors: factors(3),
            fraction: 3,
            replicates: 1,
        };
        assert!(fractional_factorial(&DataTable::empty(), &cfg).is_err());
    }

    fn doe_table() -> DataTable {
        let a = ["-1", "1", "-1", "1", "-1", "1", "-1", "1"];
        let b = ["-1", "-1", "1", "1", "-1", "-1", "1", "1"];
        let y: Vec<f64> = a
            .iter()
            .zip(&b)
            .enumerate()
            .map(|(i, (a, b))| {
                let a: f64 = a.parse().unwrap();
                let b: f64 = b.parse().unwrap();
                50.0 + 8.0 * a + 0.2 * b + if i < 4 { 0.3 } else { -0.3 }
            })
            .collect();
        table(vec![
            Column::numeric("y", &y),
            Column::text("A", &a),
            Column::text("B", &b),
        ])
    }

    #[test]
    fn doe_analysis_finds_the_dominant_factor() {
        let cfg = DoeAnalysisConfig {
            response_column: "y".into(),
            factor_columns: vec!["A".into(), "B".into()],
            alpha: 0.05,
        };
        let r = doe_analysis(&doe_table(), &cfg).unwrap();
        let significant = r.summary["significant_effects"].as_array().unwrap();
        assert!(significant.iter().any(|s| s == "A"));
        assert!(!significant.iter().any(|s| s == "B"));
        assert!(r.summary["effects"].get("A:B").is_some());
        assert_eq!(r.charts.len(), 3);
        assert_eq!(r.charts[2].data[0]["y"][0], "A");
    }

    #[test]
    fn doe_analysis_needs_observations() {
        let t = table(vec![
            Column::numeric("y", &[1.0, 2.0, 3.0]),
            Column::text("A", &["a", "b", "a"]),
        ]);
        let cfg = DoeAnalysisConfig {
            response_column: "y".into(),
            factor_columns: vec!["A".into()],
            alpha: 0.05,
        };
        let err = doe_analysis(&t, &cfg).unwrap_err();
        assert_eq!(err.to_string(), "Need at least 4 observations, got 3");
    }
}
