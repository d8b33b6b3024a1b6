//! Process capability and measurement system analysis.

use super::{column, complete_labels, numeric_rows, numeric_series, sorted_levels};
use super::spc::subgroup_constants;
use crate::charts;
use crate::dist;
use crate::htest;
use crate::kind::TestKind;
use crate::linear_model::{type2_anova, Factor, Term};
use crate::result::{num, object, opt_num, round_to, AnalysisResult, TestError};
use crate::sample;
use crate::table::DataTable;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const IMR_D2: f64 = 1.128;
const FALLBACK_D2: f64 = 2.326;
const ZERO_SIGMA: f64 = 1e-10;

fn require_spec_limits(lsl: Option<f64>, usl: Option<f64>) -> Result<(), TestError> {
    if lsl.is_none() && usl.is_none() {
        return Err(TestError::invalid(
            "At least one spec limit (lsl or usl) is required",
        ));
    }
    if let (Some(l), Some(u)) = (lsl, usl) {
        if l >= u {
            return Err(TestError::invalid(format!(
                "lsl ({l}) must be below usl ({u})"
            )));
        }
    }
    Ok(())
}

/// Two-sided or one-sided capability indices for one sigma estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Indices {
    pub both: Option<f64>,
    pub upper: Option<f64>,
    pub lower: Option<f64>,
    pub k: Option<f64>,
}

pub fn indices(mean: f64, sigma: f64, lsl: Option<f64>, usl: Option<f64>) -> Indices {
    let upper = usl.map(|u| (u - mean) / (3.0 * sigma));
    let lower = lsl.map(|l| (mean - l) / (3.0 * sigma));
    let both = match (lsl, usl) {
        (Some(l), Some(u)) => Some((u - l) / (6.0 * sigma)),
        _ => None,
    };
    let k = match (upper, lower) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    Indices { both, upper, lower, k }
}

fn rating(cpk: f64) -> &'static str {
    if cpk >= 2.0 {
        "World-class (Cpk ≥ 2.0)"
    } else if cpk >= 1.33 {
        "Capable (Cpk ≥ 1.33)"
    } else if cpk >= 1.0 {
        "Marginally capable (1.0 ≤ Cpk < 1.33)"
    } else {
        "Not capable (Cpk < 1.0), action required"
    }
}

// ─── Normal capability ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityConfig {
    pub column: String,
    #[serde(default)]
    pub lsl: Option<f64>,
    #[serde(default)]
    pub usl: Option<f64>,
    #[serde(default)]
    pub target: Option<f64>,
    #[serde(default = "default_subgroup")]
    pub subgroup_size: usize,
}

fn default_subgroup() -> usize {
    1
}

/// Short-term sigma: average moving range for individuals, average
/// subgroup range otherwise.
fn within_sigma(values: &[f64], subgroup_size: usize, overall: f64, warnings: &mut Vec<String>) -> f64 {
    if subgroup_size <= 1 {
        let mr = sample::moving_ranges(values);
        if mr.is_empty() {
            return overall;
        }
        return sample::mean(&mr) / IMR_D2;
    }
    let d2 = subgroup_constants(subgroup_size).map_or(FALLBACK_D2, |c| c.d2);
    let complete = values.len() / subgroup_size * subgroup_size;
    if complete < subgroup_size * 2 {
        warnings.push("Not enough data for subgroup-based sigma. Using overall std.".to_string());
        return overall;
    }
    let ranges: Vec<f64> = values[..complete]
        .chunks(subgroup_size)
        .map(|g| {
            let (lo, hi) = sample::min_max(g);
            hi - lo
        })
        .collect();
    sample::mean(&ranges) / d2
}

pub fn capability_normal(table: &DataTable, config: &CapabilityConfig) -> Result<AnalysisResult, TestError> {
    let values = numeric_series(table, &config.column)?;
    require_spec_limits(config.lsl, config.usl)?;
    let n = values.len();
    if n < 2 {
        return Err(TestError::insufficient("Need at least 2 observations"));
    }
    let mut r = AnalysisResult::success(TestKind::CapabilityNormal);
    if n < 30 {
        r.warnings.push(format!(
            "Small sample ({n}). Capability indices are more reliable with 30+ observations."
        ));
    }
    if let Some((_, p)) = htest::shapiro_wilk(&values[..n.min(5000)]) {
        if p < 0.05 {
            r.warnings.push(format!(
                "Data may not be normally distributed (Shapiro-Wilk p={p:.4}). \
                 Consider capability_nonnormal analysis."
            ));
        }
    }

    let mean = sample::mean(&values);
    let mut overall = sample::std_dev(&values);
    let mut within = within_sigma(&values, config.subgroup_size, overall, &mut r.warnings);
    if within == 0.0 {
        within = ZERO_SIGMA;
        r.warnings
            .push("Within-group standard deviation is zero.".to_string());
    }
    if overall == 0.0 {
        overall = ZERO_SIGMA;
        r.warnings.push("Overall standard deviation is zero.".to_string());
    }

    let cap = indices(mean, within, config.lsl, config.usl);
    let perf = indices(mean, overall, config.lsl, config.usl);

    let ppm_above = config
        .usl
        .map_or(0.0, |u| dist::normal_sf((u - mean) / overall) * 1e6);
    let ppm_below = config
        .lsl
        .map_or(0.0, |l| dist::normal_sf((mean - l) / overall) * 1e6);
    let ppm_total = ppm_above + ppm_below;
    let z_bench = if ppm_total > 0.0 && ppm_total < 1e6 {
        dist::normal_isf(ppm_total / 1e6)
    } else if ppm_total == 0.0 {
        6.0
    } else {
        0.0
    };
    let sigma_level = round_to(z_bench + 1.5, 2);
    let rating = cap.k.map_or("N/A", rating);

    r.summary = object(json!({
        "cp": opt_num(cap.both),
        "cpk": opt_num(cap.k),
        "cpl": opt_num(cap.lower),
        "cpu": opt_num(cap.upper),
        "pp": opt_num(perf.both),
        "ppk": opt_num(perf.k),
        "ppl": opt_num(perf.lower),
        "ppu": opt_num(perf.upper),
        "mean": num(mean),
        "within_std": num(within),
        "overall_std": num(overall),
        "ppm_total": round_to(ppm_total, 1),
        "ppm_above": round_to(ppm_above, 1),
        "ppm_below": round_to(ppm_below, 1),
        "z_bench": round_to(z_bench, 2),
        "sigma_level": sigma_level,
        "n": n,
    }));
    r.details = object(json!({
        "column": config.column,
        "lsl": config.lsl,
        "usl": config.usl,
        "target": config.target,
        "subgroup_size": config.subgroup_size,
    }));
    r.charts = vec![charts::capability_histogram(
        &values,
        config.lsl,
        config.usl,
        config.target,
        &format!("Process Capability: {}", config.column),
    )];

    let ppm_sentence = if ppm_total > 0.0 {
        format!("Estimated {ppm_total:.0} PPM out of spec. ")
    } else {
        "No parts out of spec. ".to_string()
    };
    let target_sentence = match config.target {
        Some(t) => format!("Process is centered at {mean:.4}, target is {t}."),
        None => format!("Process is centered at {mean:.4}."),
    };
    r.interpretation_context = object(json!({
        "test_name": "Process Capability (Normal)",
        "column": config.column,
        "cpk": opt_num(cap.k),
        "ppk": opt_num(perf.k),
        "rating": rating,
        "ppm_total": round_to(ppm_total, 1),
        "sigma_level": sigma_level,
        "mean": num(mean),
        "within_std": num(within),
        "lsl": config.lsl,
        "usl": config.usl,
        "recommendation": format!(
            "Process is {}. {ppm_sentence}{target_sentence}",
            rating.to_lowercase()
        ),
    }));
    Ok(r)
}

// ─── Non-normal capability ───────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NonNormalConfig {
    pub column: String,
    #[serde(default)]
    pub lsl: Option<f64>,
    #[serde(default)]
    pub usl: Option<f64>,
    #[serde(default)]
    pub target: Option<f64>,
}

const LAMBDA_RANGE: (f64, f64) = (-5.0, 5.0);
const GOLDEN_TOL: f64 = 1e-8;

pub fn box_cox(x: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-12 {
        x.ln()
    } else {
        (x.powf(lambda) - 1.0) / lambda
    }
}

/// Profile log-likelihood of the Box-Cox transform at `lambda`.
fn box_cox_llf(values: &[f64], log_sum: f64, lambda: f64) -> f64 {
    let n = values.len() as f64;
    let transformed: Vec<f64> = values.iter().map(|v| box_cox(*v, lambda)).collect();
    let m = sample::mean(&transformed);
    let var = transformed.iter().map(|t| (t - m).powi(2)).sum::<f64>() / n;
    (lambda - 1.0) * log_sum - n / 2.0 * var.ln()
}

/// Maximum-likelihood Box-Cox lambda by golden-section search.
/// `None` when the likelihood is not finite over the search range.
pub fn box_cox_lambda(values: &[f64]) -> Option<f64> {
    let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
    let f = |l: f64| -box_cox_llf(values, log_sum, l);
    let ratio = (5.0_f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = LAMBDA_RANGE;
    let mut c = b - ratio * (b - a);
    let mut d = a + ratio * (b - a);
    let (mut fc, mut fd) = (f(c), f(d));
    while (b - a).abs() > GOLDEN_TOL {
        if !fc.is_finite() || !fd.is_finite() {
            return None;
        }
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - ratio * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + ratio * (b - a);
            fd = f(d);
        }
    }
    let lambda = (a + b) / 2.0;
    f(lambda).is_finite().then_some(lambda)
}

pub fn capability_nonnormal(table: &DataTable, config: &NonNormalConfig) -> Result<AnalysisResult, TestError> {
    let values = numeric_series(table, &config.column)?;
    require_spec_limits(config.lsl, config.usl)?;
    let n = values.len();
    if n < 3 {
        return Err(TestError::insufficient("Need at least 3 observations"));
    }
    let mut r = AnalysisResult::success(TestKind::CapabilityNonnormal);

    let (min, _) = sample::min_max(&values);
    let shift = if min <= 0.0 { min.abs() + 1.0 } else { 0.0 };
    if shift > 0.0 {
        r.warnings.push(format!(
            "Data shifted by +{shift} to make all values positive for Box-Cox transformation."
        ));
    }
    let shifted: Vec<f64> = values.iter().map(|v| v + shift).collect();
    let lambda = match box_cox_lambda(&shifted) {
        Some(l) => l,
        None => {
            r.warnings
                .push("Box-Cox optimization failed. Using log transformation.".to_string());
            0.0
        }
    };
    let transformed: Vec<f64> = shifted.iter().map(|v| box_cox(*v, lambda)).collect();
    let transform_limit = |v: f64| {
        let s = v + shift;
        if s <= 0.0 {
            f64::NEG_INFINITY
        } else {
            box_cox(s, lambda)
        }
    };
    let t_lsl = config.lsl.map(transform_limit);
    let t_usl = config.usl.map(transform_limit);
    let t_mean = sample::mean(&transformed);
    let mut t_std = sample::std_dev(&transformed);
    if t_std == 0.0 {
        t_std = ZERO_SIGMA;
    }
    let idx = indices(t_mean, t_std, t_lsl, t_usl);

    let norm_p = htest::shapiro_wilk(&transformed[..n.min(5000)]).map(|(_, p)| p);
    if let Some(p) = norm_p.filter(|p| *p < 0.05) {
        r.warnings.push(format!(
            "Transformed data is still not normal (p={p:.4}). Capability indices may not be reliable."
        ));
    }

    r.summary = object(json!({
        "cpk": opt_num(idx.k),
        "ppk": opt_num(idx.k),
        "cp": opt_num(idx.both),
        "lambda": num(lambda),
        "shift": shift,
        "original_mean": num(sample::mean(&values)),
        "original_std": num(sample::std_dev(&values)),
        "transformed_mean": num(t_mean),
        "transformed_std": num(t_std),
        "transformed_lsl": opt_num(t_lsl),
        "transformed_usl": opt_num(t_usl),
        "normality_p_transformed": opt_num(norm_p),
        "n": n,
    }));
    r.details = object(json!({
        "column": config.column,
        "lsl": config.lsl,
        "usl": config.usl,
        "target": config.target,
        "transformation": "box-cox",
        "lambda": num(lambda),
    }));
    r.charts = vec![charts::capability_histogram(
        &values,
        config.lsl,
        config.usl,
        config.target,
        &format!("Process Capability (Non-Normal): {}", config.column),
    )];
    r.interpretation_context = object(json!({
        "test_name": "Process Capability (Non-Normal, Box-Cox)",
        "column": config.column,
        "cpk": opt_num(idx.k),
        "lambda": num(lambda),
        "lsl": config.lsl,
        "usl": config.usl,
        "rating": idx.k.map_or("N/A", rating),
    }));
    Ok(r)
}

// ─── Gage R&R ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct GageConfig {
    pub measurement_column: String,
    pub part_column: String,
    pub operator_column: String,
    #[serde(default)]
    pub tolerance: Option<f64>,
}

/// Crossed-design variance components, each clamped at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarianceComponents {
    pub repeatability: f64,
    pub operator: f64,
    pub interaction: f64,
    pub part: f64,
}

impl VarianceComponents {
    pub fn reproducibility(&self) -> f64 {
        self.operator + self.interaction
    }

    pub fn gage_rr(&self) -> f64 {
        self.repeatability + self.reproducibility()
    }

    pub fn total(&self) -> f64 {
        self.gage_rr() + self.part
    }
}

fn gage_rating(pct_study_var: f64) -> &'static str {
    if pct_study_var < 10.0 {
        "Acceptable"
    } else if pct_study_var < 30.0 {
        "Marginal, may be acceptable depending on application"
    } else {
        "Not acceptable, measurement system needs improvement"
    }
}

fn pct(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// Mean replicate count over the part/operator cells that hold data, truncated.
fn mean_cell_count(parts: &[String], operators: &[String]) -> usize {
    let mut cells: HashMap<(&str, &str), usize> = HashMap::new();
    for (p, o) in parts.iter().zip(operators) {
        *cells.entry((p.as_str(), o.as_str())).or_default() += 1;
    }
    if cells.is_empty() {
        return 0;
    }
    cells.values().sum::<usize>() / cells.len()
}

pub fn msa_gage_rr(table: &DataTable, config: &GageConfig) -> Result<AnalysisResult, TestError> {
    let names = [
        config.measurement_column.as_str(),
        config.part_column.as_str(),
        config.operator_column.as_str(),
    ];
    for name in names {
        column(table, name)?;
    }
    let labels = complete_labels(table, &names)?;
    let y = numeric_rows(table, &config.measurement_column, &table.complete_rows(&names))?;
    let (parts, operators) = (&labels[1], &labels[2]);
    let n_parts = sorted_levels(parts).len();
    let n_operators = sorted_levels(operators).len();
    if n_parts < 2 || n_operators < 2 {
        return Err(TestError::insufficient(format!(
            "Need at least 2 parts and 2 operators. Got {n_parts} parts, {n_operators} operators."
        )));
    }

    let factors = vec![
        Factor::from_labels(config.part_column.clone(), parts),
        Factor::from_labels(config.operator_column.clone(), operators),
    ];
    let terms = vec![Term::main(0), Term::main(1), Term::interaction(0, 1)];
    let anova = type2_anova(&y, &factors, &terms);
    if anova.residual_df <= 0.0 {
        return Err(TestError::insufficient(
            "Need repeated measurements: at least 2 per part/operator cell",
        ));
    }
    let ms = |row: usize| {
        let r = &anova.rows[row];
        if r.df > 0.0 {
            r.sum_sq / r.df
        } else {
            0.0
        }
    };
    let (ms_part, ms_oper, ms_inter) = (ms(0), ms(1), ms(2));
    let ms_error = anova.residual_ss / anova.residual_df;

    let n_reps = mean_cell_count(parts, operators).max(1) as f64;
    let vc = VarianceComponents {
        repeatability: ms_error,
        interaction: ((ms_inter - ms_error) / n_reps).max(0.0),
        operator: ((ms_oper - ms_inter) / (n_parts as f64 * n_reps)).max(0.0),
        part: ((ms_part - ms_inter) / (n_operators as f64 * n_reps)).max(0.0),
    };
    let total = vc.total();
    let sv_gage = 6.0 * vc.gage_rr().sqrt();
    let sv_total = 6.0 * total.sqrt();
    let pct_sv = pct(sv_gage, sv_total);
    let pct_tol = config
        .tolerance
        .filter(|t| *t > 0.0)
        .map(|t| round_to(sv_gage / t * 100.0, 2));
    let ndc = if vc.gage_rr() > 0.0 {
        ((1.41 * (vc.part / vc.gage_rr()).sqrt()) as u64).max(1)
    } else {
        999
    };
    let rating = gage_rating(pct_sv);

    let cells = n_parts * n_operators;
    let mut r = AnalysisResult::success(TestKind::MsaGageRr);
    if y.len() % cells != 0 {
        r.warnings.push(
            "Unbalanced design: part/operator cells have unequal replicate counts.".to_string(),
        );
    }
    let (p_rep, p_repro, p_part) = (
        pct(vc.repeatability, total),
        pct(vc.reproducibility(), total),
        pct(vc.part, total),
    );
    r.summary = object(json!({
        "pct_gage_rr_contribution": round_to(pct(vc.gage_rr(), total), 2),
        "pct_repeatability": round_to(p_rep, 2),
        "pct_reproducibility": round_to(p_repro, 2),
        "pct_part_to_part": round_to(p_part, 2),
        "pct_study_var": round_to(pct_sv, 2),
        "pct_tolerance": pct_tol,
        "ndc": ndc,
        "rating": rating,
        "n_parts": n_parts,
        "n_operators": n_operators,
        "n_replicates": n_reps as u64,
    }));
    r.details = object(json!({
        "variance_components": {
            "repeatability": round_to(vc.repeatability, 6),
            "reproducibility": round_to(vc.reproducibility(), 6),
            "operator": round_to(vc.operator, 6),
            "interaction": round_to(vc.interaction, 6),
            "gage_rr": round_to(vc.gage_rr(), 6),
            "part_to_part": round_to(vc.part, 6),
            "total": round_to(total, 6),
        },
        "study_variation": {
            "gage_rr": round_to(sv_gage, 4),
            "total": round_to(sv_total, 4),
        },
        "tolerance": config.tolerance,
    }));
    r.charts = vec![charts::bar_chart(
        &["Repeatability".to_string(), "Reproducibility".to_string(), "Part-to-Part".to_string()],
        &[p_rep, p_repro, p_part],
        "Gage R&R: Variance Components (% Contribution)",
        "% of Total Variation",
        false,
    )];
    r.interpretation_context = object(json!({
        "test_name": "Gage R&R (Crossed ANOVA Method)",
        "pct_gage_rr": round_to(pct(vc.gage_rr(), total), 2),
        "pct_study_var": round_to(pct_sv, 2),
        "ndc": ndc,
        "rating": rating,
        "recommendation": format!(
            "Measurement system %Study Var = {pct_sv:.1}%. {rating}. Number of distinct categories = {ndc} {}",
            if ndc >= 5 {
                "(≥ 5 is ideal)."
            } else {
                "(< 5, the system cannot adequately distinguish between parts)."
            }
        ),
    }));
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{bell, table};
    use crate::table::Column;

    fn cap_config(lsl: Option<f64>, usl: Option<f64>) -> CapabilityConfig {
        CapabilityConfig {
            column: "x".into(),
            lsl,
            usl,
            target: None,
            subgroup_size: 1,
        }
    }

    #[test]
    fn indices_two_and_one_sided() {
        let both = indices(10.0, 1.0, Some(4.0), Some(16.0));
        assert_eq!(both.both, Some(2.0));
        assert_eq!(both.k, Some(2.0));
        let upper = indices(10.0, 1.0, None, Some(13.0));
        assert_eq!(upper.both, None);
        assert_eq!(upper.k, Some(1.0));
        let off_center = indices(12.0, 1.0, Some(4.0), Some(16.0));
        assert!((off_center.k.unwrap() - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn capability_requires_a_spec_limit() {
        let t = table(vec![Column::numeric("x", &[1.0, 2.0, 3.0])]);
        let err = capability_normal(&t, &cap_config(None, None)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn capable_process_reports_low_ppm() {
        let values = bell(60, 10.0, 0.5, 21);
        let t = table(vec![Column::numeric("x", &values)]);
        let r = capability_normal(&t, &cap_config(Some(7.0), Some(13.0))).unwrap();
        let cpk = r.summary_f64("cpk").unwrap();
        assert!(cpk > 1.5, "cpk {cpk}");
        assert!(r.summary_f64("ppm_total").unwrap() < 100.0);
        let z = r.summary_f64("z_bench").unwrap();
        assert!((r.summary_f64("sigma_level").unwrap() - round_to(z + 1.5, 2)).abs() < 0.011);
        assert_eq!(r.charts.len(), 1);
        assert!(r.warnings.iter().all(|w| !w.starts_with("Small sample")));
    }

    #[test]
    fn ppm_matches_normal_tail() {
        // mean 0, sd 1 by construction; USL at +2 sd.
        let values = [-1.5, -0.5, 0.5, 1.5, -1.5, -0.5, 0.5, 1.5];
        let sd = sample::std_dev(&values);
        let t = table(vec![Column::numeric("x", &values)]);
        let r = capability_normal(&t, &cap_config(None, Some(2.0 * sd))).unwrap();
        let expected = round_to(dist::normal_sf(2.0) * 1e6, 1);
        assert!((r.summary_f64("ppm_above").unwrap() - expected).abs() < 0.2);
        assert_eq!(r.summary_f64("ppm_below"), Some(0.0));
        assert!(r.summary["cp"].is_null());
    }

    #[test]
    fn box_cox_recovers_log_for_lognormal_shape() {
        let values: Vec<f64> = bell(200, 0.0, 0.4, 33).into_iter().map(f64::exp).collect();
        let lambda = box_cox_lambda(&values).unwrap();
        assert!(lambda.abs() < 0.35, "lambda {lambda}");
    }

    #[test]
    fn nonnormal_falls_back_to_log_when_likelihood_overflows() {
        let values: Vec<f64> = (0..30).map(|i| 1e300 * (1.0 + 0.01 * f64::from(i))).collect();
        assert_eq!(box_cox_lambda(&values), None);
        let t = table(vec![Column::numeric("x", &values)]);
        let r = capability_nonnormal(&t, &NonNormalConfig {
            column: "x".into(),
            lsl: Some(5e299),
            usl: Some(2e300),
            target: None,
        })
        .unwrap();
        assert_eq!(r.summary_f64("lambda"), Some(0.0));
        assert_eq!(r.details["lambda"], 0.0);
        assert!(r
            .warnings
            .iter()
            .any(|w| w == "Box-Cox optimization failed. Using log transformation."));
        let t_usl = r.summary_f64("transformed_usl").unwrap();
        assert!((t_usl - 2e300_f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn nonnormal_shifts_non_positive_data() {
        let values: Vec<f64> = (0..30).map(|i| f64::from(i) - 5.0).collect();
        let t = table(vec![Column::numeric("x", &values)]);
        let r = capability_nonnormal(&t, &NonNormalConfig {
            column: "x".into(),
            lsl: None,
            usl: Some(40.0),
            target: None,
        })
        .unwrap();
        assert_eq!(r.summary["shift"], 6.0);
        assert!(r.warnings[0].starts_with("Data shifted by +6"));
        assert_eq!(r.summary["cpk"], r.summary["ppk"]);
    }

    fn gage_table(operator_bias: f64, noise: f64) -> DataTable {
        gage_table_without(operator_bias, noise, None)
    }

    fn gage_table_without(operator_bias: f64, noise: f64, missing: Option<(u32, &str)>) -> DataTable {
        let mut meas = Vec::new();
        let mut part = Vec::new();
        let mut oper = Vec::new();
        let errs = bell(60, 0.0, noise, 44);
        let mut e = errs.iter();
        for p in 0..10 {
            for (o, name) in ["A", "B", "C"].iter().enumerate() {
                if missing == Some((p, *name)) {
                    continue;
                }
                for _ in 0..2 {
                    let true_value = 10.0 + f64::from(p);
                    meas.push(true_value + operator_bias * o as f64 + e.next().copied().unwrap_or(0.0));
                    part.push(format!("P{p:02}"));
                    oper.push(*name);
                }
            }
        }
        table(vec![
            Column::numeric("m", &meas),
            Column::text("part", &part),
            Column::text("op", &oper),
        ])
    }

    fn gage_config() -> GageConfig {
        GageConfig {
            measurement_column: "m".into(),
            part_column: "part".into(),
            operator_column: "op".into(),
            tolerance: Some(20.0),
        }
    }

    #[test]
    fn gage_rr_good_system_is_acceptable() {
        let r = msa_gage_rr(&gage_table(0.0, 0.05), &gage_config()).unwrap();
        assert_eq!(r.summary["rating"], "Acceptable");
        assert_eq!(r.summary["n_replicates"], 2);
        assert!(r.summary["ndc"].as_u64().unwrap() >= 5);
        let sum: f64 = ["pct_repeatability", "pct_reproducibility", "pct_part_to_part"]
            .iter()
            .map(|k| r.summary_f64(k).unwrap())
            .sum();
        assert!((sum - 100.0).abs() < 0.05);
    }

    #[test]
    fn gage_rr_replicates_ignore_missing_cells() {
        let parts: Vec<String> = ["a", "a", "b", "b", "b", "b"].map(String::from).to_vec();
        let ops: Vec<String> = ["x", "x", "x", "x", "y", "y"].map(String::from).to_vec();
        assert_eq!(mean_cell_count(&parts, &ops), 2);

        let full = msa_gage_rr(&gage_table(0.5, 0.3), &gage_config()).unwrap();
        let gapped = msa_gage_rr(&gage_table_without(0.5, 0.3, Some((0, "C"))), &gage_config()).unwrap();
        assert_eq!(full.summary["n_replicates"], 2);
        assert_eq!(gapped.summary["n_replicates"], 2);
    }

    #[test]
    fn gage_rr_operator_bias_is_not_acceptable() {
        let r = msa_gage_rr(&gage_table(3.0, 0.5), &gage_config()).unwrap();
        assert!(r.summary_f64("pct_study_var").unwrap() >= 30.0);
        assert!(r.summary["rating"].as_str().unwrap().starts_with("Not acceptable"));
    }

    #[test]
    fn gage_rr_needs_two_operators() {
        let t = table(vec![
            Column::numeric("m", &[1.0, 2.0, 3.0, 4.0]),
            Column::text("part", &["a", "b", "a", "b"]),
            Column::text("op", &["x", "x", "x", "x"]),
        ]);
        let err = msa_gage_rr(&t, &gage_config()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Need at least 2 parts and 2 operators. Got 2 parts, 1 operators."
        );
    }
}
