//! Statistical process control charts.
//!
//! Out-of-control detection uses the beyond-3σ rule only: a point is a
//! violation when it falls strictly above the UCL or below the LCL.

use super::{column, numeric_rows, numeric_series};
use crate::charts::{self, Limits};
use crate::kind::TestKind;
use crate::result::{num, object, round_to, AnalysisResult, TestError};
use crate::sample;
use crate::table::DataTable;
use serde::Deserialize;
use serde_json::json;

/// Control-chart constants for one subgroup size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubgroupConstants {
    pub a2: f64,
    pub d3: f64,
    pub d4: f64,
    pub d2: f64,
}

const fn consts(a2: f64, d3: f64, d4: f64, d2: f64) -> SubgroupConstants {
    SubgroupConstants { a2, d3, d4, d2 }
}

/// Indexed by subgroup size - 2.
const XBAR_R_CONSTANTS: [SubgroupConstants; 9] = [
    consts(1.880, 0.0, 3.267, 1.128),
    consts(1.023, 0.0, 2.574, 1.693),
    consts(0.729, 0.0, 2.282, 2.059),
    consts(0.577, 0.0, 2.114, 2.326),
    consts(0.483, 0.0, 2.004, 2.534),
    consts(0.419, 0.076, 1.924, 2.704),
    consts(0.373, 0.136, 1.864, 2.847),
    consts(0.337, 0.184, 1.816, 2.970),
    consts(0.308, 0.223, 1.777, 3.078),
];

/// A2/D3/D4/d2 for subgroup sizes 2 through 10.
pub fn subgroup_constants(size: usize) -> Option<SubgroupConstants> {
    size.checked_sub(2).and_then(|i| XBAR_R_CONSTANTS.get(i)).copied()
}

const IMR_D2: f64 = 1.128;
const IMR_D4: f64 = 3.267;

fn beyond(values: &[f64], limits: Limits) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > limits.ucl || **v < limits.lcl)
        .map(|(i, _)| i)
        .collect()
}

fn beyond_each(values: &[f64], ucl: &[f64], lcl: &[f64]) -> Vec<usize> {
    (0..values.len())
        .filter(|&i| values[i] > ucl[i] || values[i] < lcl[i])
        .collect()
}

/// Labels from `labels_column` on the rows where `value_column` is present.
fn point_labels(
    table: &DataTable,
    value_column: &str,
    labels_column: Option<&str>,
) -> Option<Vec<String>> {
    let labels = table.column(labels_column?)?;
    let values = table.column(value_column)?;
    Some(
        (0..table.n_rows())
            .filter(|&r| !values.get(r).is_missing())
            .map(|r| labels.get(r).label())
            .collect(),
    )
}

fn require_rows(n: usize, what: &str) -> Result<(), TestError> {
    if n < 2 {
        return Err(TestError::insufficient(format!("Need at least 2 {what}")));
    }
    Ok(())
}

// ─── I-MR ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct IndividualsConfig {
    pub column: String,
    #[serde(default)]
    pub labels_column: Option<String>,
}

pub fn i_mr_chart(table: &DataTable, config: &IndividualsConfig) -> Result<AnalysisResult, TestError> {
    let values = numeric_series(table, &config.column)?;
    let n = values.len();
    require_rows(n, "observations")?;
    let labels = point_labels(table, &config.column, config.labels_column.as_deref());

    let mr = sample::moving_ranges(&values);
    let mr_bar = sample::mean(&mr);
    let x_bar = sample::mean(&values);
    let sigma = mr_bar / IMR_D2;
    let i_limits = Limits {
        center: x_bar,
        ucl: x_bar + 3.0 * sigma,
        lcl: x_bar - 3.0 * sigma,
    };
    let mr_limits = Limits {
        center: mr_bar,
        ucl: IMR_D4 * mr_bar,
        lcl: 0.0,
    };
    let i_viol = beyond(&values, i_limits);
    let mr_viol = beyond(&mr, mr_limits);
    let in_control = i_viol.is_empty() && mr_viol.is_empty();

    let mut r = AnalysisResult::success(TestKind::IMrChart);
    if !i_viol.is_empty() {
        r.warnings.push(format!(
            "{} point(s) out of control on Individuals chart",
            i_viol.len()
        ));
    }
    if !mr_viol.is_empty() {
        r.warnings.push(format!(
            "{} point(s) out of control on Moving Range chart",
            mr_viol.len()
        ));
    }
    r.summary = object(json!({
        "x_bar": num(x_bar),
        "mr_bar": num(mr_bar),
        "sigma_estimate": num(sigma),
        "i_ucl": num(i_limits.ucl),
        "i_lcl": num(i_limits.lcl),
        "mr_ucl": num(mr_limits.ucl),
        "n": n,
        "i_violations": i_viol.len(),
        "mr_violations": mr_viol.len(),
        "in_control": in_control,
    }));
    r.details = object(json!({
        "column": config.column,
        "values": values,
        "moving_ranges": mr,
        "i_violation_indices": i_viol,
        "mr_violation_indices": mr_viol,
    }));
    r.charts = vec![
        charts::control_chart(
            &values,
            i_limits,
            &format!("I Chart: {}", config.column),
            &config.column,
            labels.as_deref(),
            &i_viol,
        ),
        charts::control_chart(
            &mr,
            mr_limits,
            &format!("MR Chart: {}", config.column),
            "Moving Range",
            labels.as_deref().map(|l| &l[1.min(l.len())..]),
            &mr_viol,
        ),
    ];
    r.interpretation_context = object(json!({
        "test_name": "I-MR Control Chart",
        "column": config.column,
        "process_mean": num(x_bar),
        "estimated_sigma": num(sigma),
        "in_control": in_control,
        "total_violations": i_viol.len() + mr_viol.len(),
        "recommendation": if in_control {
            "Process is in statistical control. Variation is from common causes only.".to_string()
        } else {
            format!(
                "Process has special cause variation. {} point(s) beyond control limits on I chart. \
                 Investigate root causes for these out-of-control signals.",
                i_viol.len()
            )
        },
    }));
    Ok(r)
}

// ─── X-bar / R ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct XbarRConfig {
    pub column: String,
    pub subgroup_size: usize,
    #[serde(default)]
    pub labels_column: Option<String>,
}

pub fn xbar_r_chart(table: &DataTable, config: &XbarRConfig) -> Result<AnalysisResult, TestError> {
    let size = config.subgroup_size;
    if size < 2 {
        return Err(TestError::invalid("subgroup_size must be >= 2"));
    }
    let constants = subgroup_constants(size).ok_or_else(|| {
        TestError::invalid(format!("Subgroup size {size} not supported (2-10)"))
    })?;
    let values = numeric_series(table, &config.column)?;
    let complete = values.len() / size * size;
    if complete < size * 2 {
        return Err(TestError::insufficient("Need at least 2 complete subgroups"));
    }
    let subgroups: Vec<&[f64]> = values[..complete].chunks(size).collect();
    let k = subgroups.len();
    let means: Vec<f64> = subgroups.iter().map(|g| sample::mean(g)).collect();
    let ranges: Vec<f64> = subgroups
        .iter()
        .map(|g| {
            let (lo, hi) = sample::min_max(g);
            hi - lo
        })
        .collect();
    let xbar_bar = sample::mean(&means);
    let r_bar = sample::mean(&ranges);
    let xbar_limits = Limits {
        center: xbar_bar,
        ucl: xbar_bar + constants.a2 * r_bar,
        lcl: xbar_bar - constants.a2 * r_bar,
    };
    let r_limits = Limits {
        center: r_bar,
        ucl: constants.d4 * r_bar,
        lcl: constants.d3 * r_bar,
    };
    let sigma = r_bar / constants.d2;
    let labels: Option<Vec<String>> = config
        .labels_column
        .as_deref()
        .and_then(|c| table.column(c))
        .map(|c| {
            c.values()
                .iter()
                .filter(|v| !v.is_missing())
                .take(k)
                .map(|v| v.label())
                .collect()
        });

    let xbar_viol = beyond(&means, xbar_limits);
    let r_viol = beyond(&ranges, r_limits);
    let in_control = xbar_viol.is_empty() && r_viol.is_empty();

    let mut r = AnalysisResult::success(TestKind::XbarRChart);
    if complete < values.len() {
        r.warnings.push(format!(
            "{} trailing observation(s) do not fill a subgroup and were ignored",
            values.len() - complete
        ));
    }
    if !xbar_viol.is_empty() {
        r.warnings.push(format!(
            "{} subgroup(s) out of control on X-bar chart",
            xbar_viol.len()
        ));
    }
    if !r_viol.is_empty() {
        r.warnings
            .push(format!("{} subgroup(s) out of control on R chart", r_viol.len()));
    }
    r.summary = object(json!({
        "xbar_bar": num(xbar_bar),
        "r_bar": num(r_bar),
        "sigma_estimate": num(sigma),
        "xbar_ucl": num(xbar_limits.ucl),
        "xbar_lcl": num(xbar_limits.lcl),
        "r_ucl": num(r_limits.ucl),
        "r_lcl": num(r_limits.lcl),
        "subgroup_size": size,
        "num_subgroups": k,
        "xbar_violations": xbar_viol.len(),
        "r_violations": r_viol.len(),
        "in_control": in_control,
    }));
    r.details = object(json!({
        "column": config.column,
        "subgroup_means": means,
        "subgroup_ranges": ranges,
        "constants_used": {"A2": constants.a2, "D3": constants.d3, "D4": constants.d4, "d2": constants.d2},
        "xbar_violation_indices": xbar_viol,
        "r_violation_indices": r_viol,
    }));
    r.charts = vec![
        charts::control_chart(
            &means,
            xbar_limits,
            &format!("X-bar Chart (n={size})"),
            "Subgroup Mean",
            labels.as_deref(),
            &xbar_viol,
        ),
        charts::control_chart(
            &ranges,
            r_limits,
            &format!("R Chart (n={size})"),
            "Subgroup Range",
            labels.as_deref(),
            &r_viol,
        ),
    ];
    r.interpretation_context = object(json!({
        "test_name": "X-bar/R Control Chart",
        "process_mean": num(xbar_bar),
        "estimated_sigma": num(sigma),
        "subgroup_size": size,
        "num_subgroups": k,
        "in_control": in_control,
        "total_violations": xbar_viol.len() + r_viol.len(),
    }));
    Ok(r)
}

// ─── Attribute charts ────────────────────────────────────────────────

/// Counts paired with per-sample denominators, from a column or a constant.
fn counts_and_sizes(
    table: &DataTable,
    counts_column: &str,
    size_column: Option<&str>,
    constant: Option<f64>,
    missing_msg: &str,
) -> Result<(Vec<f64>, Vec<f64>), TestError> {
    match (size_column.filter(|c| table.has_column(c)), constant) {
        (Some(size_col), _) => {
            let rows = table.complete_rows(&[counts_column, size_col]);
            let counts = numeric_rows(table, counts_column, &rows)?;
            let sizes = numeric_rows(table, size_col, &rows)?;
            Ok((counts, sizes))
        }
        (None, Some(c)) => {
            let counts = numeric_series(table, counts_column)?;
            let sizes = vec![c; counts.len()];
            Ok((counts, sizes))
        }
        (None, None) => {
            column(table, counts_column)?;
            Err(TestError::MissingConfig(missing_msg.to_string()))
        }
    }
}

fn positive_sizes(sizes: &[f64], what: &str) -> Result<(), TestError> {
    if sizes.iter().any(|s| *s <= 0.0) {
        return Err(TestError::degenerate(format!("{what} must be positive")));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct PChartConfig {
    pub defects_column: String,
    #[serde(default)]
    pub sample_size_column: Option<String>,
    #[serde(default)]
    pub sample_size: Option<f64>,
}

pub fn p_chart(table: &DataTable, config: &PChartConfig) -> Result<AnalysisResult, TestError> {
    let (defects, sizes) = counts_and_sizes(
        table,
        &config.defects_column,
        config.sample_size_column.as_deref(),
        config.sample_size,
        "sample_size_column or sample_size",
    )?;
    let n = defects.len();
    require_rows(n, "samples")?;
    positive_sizes(&sizes, "Sample sizes")?;

    let proportions: Vec<f64> = defects.iter().zip(&sizes).map(|(d, s)| d / s).collect();
    let p_bar = defects.iter().sum::<f64>() / sizes.iter().sum::<f64>();
    let spread = |size: f64| 3.0 * (p_bar * (1.0 - p_bar) / size).sqrt();
    let ucl: Vec<f64> = sizes.iter().map(|s| p_bar + spread(*s)).collect();
    let lcl: Vec<f64> = sizes.iter().map(|s| (p_bar - spread(*s)).max(0.0)).collect();
    let avg_size = sample::mean(&sizes);
    let avg_ucl = p_bar + spread(avg_size);
    let avg_lcl = (p_bar - spread(avg_size)).max(0.0);
    let violations = beyond_each(&proportions, &ucl, &lcl);
    let in_control = violations.is_empty();

    let mut r = AnalysisResult::success(TestKind::PChart);
    if !in_control {
        r.warnings
            .push(format!("{} sample(s) out of control", violations.len()));
    }
    r.summary = object(json!({
        "p_bar": num(p_bar),
        "ucl": num(avg_ucl),
        "lcl": num(avg_lcl),
        "num_samples": n,
        "avg_sample_size": num(avg_size),
        "violations": violations.len(),
        "in_control": in_control,
    }));
    r.details = object(json!({
        "proportions": proportions,
        "ucl_per_sample": ucl,
        "lcl_per_sample": lcl,
        "violation_indices": violations,
    }));
    r.charts = vec![if config.sample_size_column.is_some() {
        charts::variable_limit_chart(
            &proportions,
            p_bar,
            &ucl,
            &lcl,
            "P Chart: Proportion Defective",
            "Proportion",
            &violations,
        )
    } else {
        charts::control_chart(
            &proportions,
            Limits { center: p_bar, ucl: avg_ucl, lcl: avg_lcl },
            "P Chart: Proportion Defective",
            "Proportion",
            None,
            &violations,
        )
    }];
    r.interpretation_context = object(json!({
        "test_name": "P Chart (Proportion Defective)",
        "p_bar": num(p_bar),
        "p_bar_pct": round_to(p_bar * 100.0, 2),
        "in_control": in_control,
        "violations": violations.len(),
    }));
    Ok(r)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NpChartConfig {
    pub defects_column: String,
    pub sample_size: f64,
}

pub fn np_chart(table: &DataTable, config: &NpChartConfig) -> Result<AnalysisResult, TestError> {
    if config.sample_size <= 0.0 {
        return Err(TestError::invalid("sample_size must be positive"));
    }
    let defects = numeric_series(table, &config.defects_column)?;
    let n = defects.len();
    require_rows(n, "samples")?;
    let np_bar = sample::mean(&defects);
    let p_bar = np_bar / config.sample_size;
    let spread = 3.0 * (np_bar * (1.0 - p_bar)).max(0.0).sqrt();
    let limits = Limits {
        center: np_bar,
        ucl: np_bar + spread,
        lcl: (np_bar - spread).max(0.0),
    };
    let violations = beyond(&defects, limits);
    let in_control = violations.is_empty();

    let mut r = AnalysisResult::success(TestKind::NpChart);
    if !in_control {
        r.warnings
            .push(format!("{} sample(s) out of control", violations.len()));
    }
    r.summary = object(json!({
        "np_bar": num(np_bar),
        "p_bar": num(p_bar),
        "ucl": num(limits.ucl),
        "lcl": num(limits.lcl),
        "sample_size": config.sample_size,
        "num_samples": n,
        "violations": violations.len(),
        "in_control": in_control,
    }));
    r.details = object(json!({
        "defects": defects,
        "violation_indices": violations,
    }));
    r.charts = vec![charts::control_chart(
        &defects,
        limits,
        "NP Chart: Count Defective",
        "Defective Count",
        None,
        &violations,
    )];
    r.interpretation_context = object(json!({
        "test_name": "NP Chart",
        "np_bar": num(np_bar),
        "p_bar": num(p_bar),
        "in_control": in_control,
        "violations": violations.len(),
    }));
    Ok(r)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CChartConfig {
    pub column: String,
}

pub fn c_chart(table: &DataTable, config: &CChartConfig) -> Result<AnalysisResult, TestError> {
    let counts = numeric_series(table, &config.column)?;
    let n = counts.len();
    require_rows(n, "observations")?;
    let c_bar = sample::mean(&counts);
    let spread = 3.0 * c_bar.max(0.0).sqrt();
    let limits = Limits {
        center: c_bar,
        ucl: c_bar + spread,
        lcl: (c_bar - spread).max(0.0),
    };
    let violations = beyond(&counts, limits);
    let in_control = violations.is_empty();

    let mut r = AnalysisResult::success(TestKind::CChart);
    if !in_control {
        r.warnings
            .push(format!("{} unit(s) out of control", violations.len()));
    }
    r.summary = object(json!({
        "c_bar": num(c_bar),
        "ucl": num(limits.ucl),
        "lcl": num(limits.lcl),
        "num_units": n,
        "violations": violations.len(),
        "in_control": in_control,
    }));
    r.details = object(json!({
        "counts": counts,
        "violation_indices": violations,
    }));
    r.charts = vec![charts::control_chart(
        &counts,
        limits,
        &format!("C Chart: {}", config.column),
        "Defect Count",
        None,
        &violations,
    )];
    r.interpretation_context = object(json!({
        "test_name": "C Chart (Defects per Unit)",
        "c_bar": num(c_bar),
        "in_control": in_control,
        "violations": violations.len(),
    }));
    Ok(r)
}

#[derive(Debug, Clone, Deserialize)]
pub struct UChartConfig {
    pub defects_column: String,
    #[serde(default)]
    pub units_column: Option<String>,
    #[serde(default)]
    pub units: Option<f64>,
}

pub fn u_chart(table: &DataTable, config: &UChartConfig) -> Result<AnalysisResult, TestError> {
    let (defects, units) = counts_and_sizes(
        table,
        &config.defects_column,
        config.units_column.as_deref(),
        config.units,
        "units_column or units",
    )?;
    let n = defects.len();
    require_rows(n, "samples")?;
    positive_sizes(&units, "Inspection units")?;

    let rates: Vec<f64> = defects.iter().zip(&units).map(|(d, u)| d / u).collect();
    let u_bar = defects.iter().sum::<f64>() / units.iter().sum::<f64>();
    let spread = |u: f64| 3.0 * (u_bar / u).sqrt();
    let ucl: Vec<f64> = units.iter().map(|u| u_bar + spread(*u)).collect();
    let lcl: Vec<f64> = units.iter().map(|u| (u_bar - spread(*u)).max(0.0)).collect();
    let avg_units = sample::mean(&units);
    let violations = beyond_each(&rates, &ucl, &lcl);
    let in_control = violations.is_empty();

    let mut r = AnalysisResult::success(TestKind::UChart);
    if !in_control {
        r.warnings
            .push(format!("{} sample(s) out of control", violations.len()));
    }
    r.summary = object(json!({
        "u_bar": num(u_bar),
        "ucl": num(u_bar + spread(avg_units)),
        "lcl": num((u_bar - spread(avg_units)).max(0.0)),
        "num_samples": n,
        "avg_units": num(avg_units),
        "violations": violations.len(),
        "in_control": in_control,
    }));
    r.details = object(json!({
        "u_values": rates,
        "ucl_per_sample": ucl,
        "lcl_per_sample": lcl,
        "violation_indices": violations,
    }));
    r.charts = vec![charts::variable_limit_chart(
        &rates,
        u_bar,
        &ucl,
        &lcl,
        "U Chart: Defects per Unit",
        "Rate (defects/unit)",
        &violations,
    )];
    r.interpretation_context = object(json!({
        "test_name": "U Chart (Defects per Unit, Variable Size)",
        "u_bar": num(u_bar),
        "in_control": in_control,
        "violations": violations.len(),
    }));
    Ok(r)
}
