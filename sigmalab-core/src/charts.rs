//! Declarative chart specifications.
//!
//! Every builder is a pure function from numeric arrays to a [`ChartSpec`]
//! (Plotly-compatible traces + layout). Nothing here renders; the frontend
//! and report exporters consume the JSON as-is.

use crate::dist;
use crate::result::{num, JsonMap};
use crate::sample;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A single declarative chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_type: String,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub layout: JsonMap,
    #[serde(default)]
    pub title: String,
}

// ─── Palette ─────────────────────────────────────────────────────────

pub const PRIMARY: &str = "#3B82F6";
pub const SUCCESS: &str = "#22C55E";
pub const WARNING: &str = "#F59E0B";
pub const DANGER: &str = "#EF4444";

pub const PALETTE: [&str; 10] = [
    "#3B82F6", "#EF4444", "#22C55E", "#F59E0B", "#8B5CF6", "#06B6D4", "#EC4899", "#14B8A6",
    "#F97316", "#6366F1",
];

const GRID: &str = "#374151";

fn dark_layout() -> JsonMap {
    match json!({
        "paper_bgcolor": "#1F2937",
        "plot_bgcolor": "#111827",
        "font": {"color": "#E5E7EB", "family": "Inter, system-ui, sans-serif"},
        "xaxis": {"gridcolor": GRID, "zerolinecolor": "#4B5563"},
        "yaxis": {"gridcolor": GRID, "zerolinecolor": "#4B5563"},
        "legend": {"bgcolor": "rgba(0,0,0,0)"},
        "margin": {"l": 60, "r": 30, "t": 50, "b": 60},
    }) {
        Value::Object(m) => m,
        _ => JsonMap::new(),
    }
}

/// Merge overrides onto the dark theme. Nested objects merge one level deep.
fn layout(overrides: Value) -> JsonMap {
    let mut base = dark_layout();
    if let Value::Object(over) = overrides {
        for (key, val) in over {
            match (base.get_mut(&key), val) {
                (Some(Value::Object(existing)), Value::Object(patch)) => {
                    for (k, v) in patch {
                        existing.insert(k, v);
                    }
                }
                (_, val) => {
                    base.insert(key, val);
                }
            }
        }
    }
    base
}

fn spec(chart_type: &str, title: &str, data: Vec<Value>, overrides: Value) -> ChartSpec {
    let mut overrides = overrides;
    if let Value::Object(map) = &mut overrides {
        map.insert("title".into(), json!({ "text": title }));
    }
    ChartSpec {
        chart_type: chart_type.to_string(),
        data,
        layout: layout(overrides),
        title: title.to_string(),
    }
}

fn nums(values: &[f64]) -> Value {
    Value::Array(values.iter().map(|&x| num(x)).collect())
}

fn endpoints<T: Clone>(xs: &[T]) -> Vec<T> {
    match (xs.first(), xs.last()) {
        (Some(a), Some(b)) => vec![a.clone(), b.clone()],
        _ => Vec::new(),
    }
}

// ─── Builders ────────────────────────────────────────────────────────

/// Histogram, optionally overlaid with a fitted normal curve scaled to counts.
pub fn histogram(values: &[f64], name: &str, title: &str, xaxis_title: &str, normal_curve: bool) -> ChartSpec {
    let mut data = vec![json!({
        "type": "histogram",
        "x": nums(values),
        "name": name,
        "marker": {"color": PRIMARY, "line": {"color": "#1E3A5F", "width": 1}},
        "opacity": 0.85,
    })];

    if normal_curve && values.len() > 2 {
        let mu = sample::mean(values);
        let sigma = sample::std_dev(values);
        if sigma > 0.0 {
            let (lo, hi) = sample::min_max(values);
            let bins = (values.len() as f64).sqrt().floor().max(1.0);
            let bin_width = (hi - lo) / bins;
            let xs: Vec<f64> = (0..200)
                .map(|i| mu - 4.0 * sigma + 8.0 * sigma * i as f64 / 199.0)
                .collect();
            let ys: Vec<f64> = xs
                .iter()
                .map(|&x| dist::normal_pdf((x - mu) / sigma) / sigma * values.len() as f64 * bin_width)
                .collect();
            data.push(json!({
                "type": "scatter",
                "x": nums(&xs),
                "y": nums(&ys),
                "mode": "lines",
                "name": "Normal Curve",
                "line": {"color": DANGER, "width": 2, "dash": "dash"},
            }));
        }
    }

    spec(
        "histogram",
        title,
        data,
        json!({
            "xaxis": {"title": xaxis_title},
            "yaxis": {"title": "Frequency"},
            "bargap": 0.05,
        }),
    )
}

/// Box plot, one trace per group, in the order given.
pub fn box_plot(groups: &[(String, Vec<f64>)], title: &str, yaxis_title: &str) -> ChartSpec {
    let data = groups
        .iter()
        .enumerate()
        .map(|(i, (name, values))| {
            json!({
                "type": "box",
                "y": nums(values),
                "name": name,
                "marker": {"color": PALETTE[i % PALETTE.len()]},
                "boxmean": "sd",
            })
        })
        .collect();
    spec(
        "box",
        title,
        data,
        json!({
            "yaxis": {"title": yaxis_title},
            "showlegend": groups.len() > 1,
        }),
    )
}

/// Straight overlay line for scatter plots.
#[derive(Debug, Clone)]
pub struct Trendline {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub name: String,
}

pub fn scatter(
    x: &[f64],
    y: &[f64],
    title: &str,
    axes: (&str, &str),
    trendline: Option<Trendline>,
    name: &str,
) -> ChartSpec {
    let mut data = vec![json!({
        "type": "scatter",
        "x": nums(x),
        "y": nums(y),
        "mode": "markers",
        "name": name,
        "marker": {"color": PRIMARY, "size": 8, "opacity": 0.7},
    })];
    if let Some(t) = trendline {
        data.push(json!({
            "type": "scatter",
            "x": nums(&t.x),
            "y": nums(&t.y),
            "mode": "lines",
            "name": t.name,
            "line": {"color": DANGER, "width": 2},
        }));
    }
    spec(
        "scatter",
        title,
        data,
        json!({
            "xaxis": {"title": axes.0},
            "yaxis": {"title": axes.1},
        }),
    )
}

/// Vertical bar chart, or horizontal when `horizontal` is set.
pub fn bar_chart(categories: &[String], values: &[f64], title: &str, yaxis_title: &str, horizontal: bool) -> ChartSpec {
    let trace = if horizontal {
        json!({
            "type": "bar",
            "x": nums(values),
            "y": categories,
            "orientation": "h",
            "marker": {"color": PRIMARY},
        })
    } else {
        json!({
            "type": "bar",
            "x": categories,
            "y": nums(values),
            "marker": {"color": PRIMARY},
        })
    };
    spec(
        "bar",
        title,
        vec![trace],
        json!({ "yaxis": {"title": yaxis_title} }),
    )
}

/// Bars sorted descending, a cumulative-percentage line on a secondary axis,
/// and an 80% reference line.
pub fn pareto_chart(categories: &[String], values: &[f64], title: &str, yaxis_title: &str) -> ChartSpec {
    let mut pairs: Vec<(&String, f64)> = categories.iter().zip(values.iter().copied()).collect();
    pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let cats: Vec<String> = pairs.iter().map(|(c, _)| (*c).clone()).collect();
    let vals: Vec<f64> = pairs.iter().map(|(_, v)| *v).collect();
    let total: f64 = vals.iter().sum();
    let total = if total == 0.0 { 1.0 } else { total };
    let mut running = 0.0;
    let cumulative: Vec<f64> = vals
        .iter()
        .map(|v| {
            running += v;
            running / total * 100.0
        })
        .collect();

    let data = vec![
        json!({
            "type": "bar",
            "x": cats,
            "y": nums(&vals),
            "name": yaxis_title,
            "marker": {"color": PRIMARY},
            "yaxis": "y",
        }),
        json!({
            "type": "scatter",
            "x": cats,
            "y": nums(&cumulative),
            "name": "Cumulative %",
            "mode": "lines+markers",
            "line": {"color": DANGER, "width": 2},
            "marker": {"size": 6},
            "yaxis": "y2",
        }),
        json!({
            "type": "scatter",
            "x": endpoints(&cats),
            "y": [80, 80],
            "mode": "lines",
            "name": "80% Line",
            "line": {"color": WARNING, "width": 1, "dash": "dash"},
            "yaxis": "y2",
            "showlegend": true,
        }),
    ];
    spec(
        "pareto",
        title,
        data,
        json!({
            "xaxis": {"title": ""},
            "yaxis": {"title": yaxis_title},
            "yaxis2": {
                "title": "Cumulative %",
                "overlaying": "y",
                "side": "right",
                "range": [0, 105],
                "gridcolor": GRID,
                "ticksuffix": "%",
            },
            "legend": {"x": 0.7, "y": 1.1, "orientation": "h"},
        }),
    )
}

/// Normal Q-Q plot with a least-squares reference line.
pub fn probability_plot(values: &[f64], title: &str) -> ChartSpec {
    let sorted = sample::sorted(values);
    let n = sorted.len();
    let theoretical: Vec<f64> = (1..=n)
        .map(|i| dist::normal_ppf(i as f64 / (n as f64 + 1.0)))
        .collect();
    let (slope, intercept) = sample::linear_fit(&theoretical, &sorted);
    let ref_x = endpoints(&theoretical);
    let ref_y: Vec<f64> = ref_x.iter().map(|x| slope * x + intercept).collect();

    let data = vec![
        json!({
            "type": "scatter",
            "x": nums(&theoretical),
            "y": nums(&sorted),
            "mode": "markers",
            "name": "Data",
            "marker": {"color": PRIMARY, "size": 6},
        }),
        json!({
            "type": "scatter",
            "x": nums(&ref_x),
            "y": nums(&ref_y),
            "mode": "lines",
            "name": "Reference Line",
            "line": {"color": DANGER, "width": 2, "dash": "dash"},
        }),
    ];
    spec(
        "probability",
        title,
        data,
        json!({
            "xaxis": {"title": "Theoretical Quantiles"},
            "yaxis": {"title": "Sample Quantiles"},
        }),
    )
}

/// Control-limit set drawn on a control chart.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub center: f64,
    pub ucl: f64,
    pub lcl: f64,
}

/// Time-ordered points with center line, limits, and violation markers.
pub fn control_chart(
    values: &[f64],
    limits: Limits,
    title: &str,
    yaxis_title: &str,
    labels: Option<&[String]>,
    violations: &[usize],
) -> ChartSpec {
    let x: Vec<Value> = match labels {
        Some(l) if l.len() == values.len() => l.iter().map(|s| json!(s)).collect(),
        _ => (1..=values.len()).map(|i| json!(i)).collect(),
    };
    let ends = endpoints(&x);
    let line = |y: f64, name: String, color: &str, dash: Option<&str>| {
        let width = if dash.is_some() { 1.5 } else { 2.0 };
        let mut style = json!({"color": color, "width": width});
        if let (Some(d), Value::Object(m)) = (dash, &mut style) {
            m.insert("dash".into(), json!(d));
        }
        json!({
            "type": "scatter",
            "x": ends,
            "y": [num(y), num(y)],
            "mode": "lines",
            "name": name,
            "line": style,
        })
    };

    let mut data = vec![
        json!({
            "type": "scatter",
            "x": x,
            "y": nums(values),
            "mode": "lines+markers",
            "name": "Data",
            "line": {"color": PRIMARY, "width": 1.5},
            "marker": {"size": 5, "color": PRIMARY},
        }),
        line(limits.center, format!("CL = {:.4}", limits.center), SUCCESS, None),
        line(limits.ucl, format!("UCL = {:.4}", limits.ucl), DANGER, Some("dash")),
        line(limits.lcl, format!("LCL = {:.4}", limits.lcl), DANGER, Some("dash")),
    ];

    if !violations.is_empty() {
        let vx: Vec<Value> = violations.iter().filter_map(|&i| x.get(i).cloned()).collect();
        let vy: Vec<Value> = violations
            .iter()
            .filter_map(|&i| values.get(i).map(|&v| num(v)))
            .collect();
        data.push(json!({
            "type": "scatter",
            "x": vx,
            "y": vy,
            "mode": "markers",
            "name": "Out of Control",
            "marker": {"color": DANGER, "size": 10, "symbol": "diamond"},
        }));
    }

    spec(
        "control_chart",
        title,
        data,
        json!({
            "xaxis": {"title": "Observation"},
            "yaxis": {"title": yaxis_title},
        }),
    )
}

/// Variable-limit control chart (P/U charts): limits drawn as step lines.
pub fn variable_limit_chart(
    values: &[f64],
    center: f64,
    ucl: &[f64],
    lcl: &[f64],
    title: &str,
    yaxis_title: &str,
    violations: &[usize],
) -> ChartSpec {
    let avg_ucl = if ucl.is_empty() { center } else { sample::mean(ucl) };
    let avg_lcl = if lcl.is_empty() { center } else { sample::mean(lcl) };
    let mut chart = control_chart(
        values,
        Limits {
            center,
            ucl: avg_ucl,
            lcl: avg_lcl,
        },
        title,
        yaxis_title,
        None,
        violations,
    );
    let x: Vec<usize> = (1..=values.len()).collect();
    for (name, ys) in [("UCL (per point)", ucl), ("LCL (per point)", lcl)] {
        chart.data.push(json!({
            "type": "scatter",
            "x": x,
            "y": nums(ys),
            "mode": "lines",
            "line": {"color": DANGER, "width": 1, "shape": "hv", "dash": "dot"},
            "name": name,
        }));
    }
    chart
}

/// Heatmap for correlation matrices (`zmin=-1`, `zmax=1`).
pub fn heatmap(matrix: &[Vec<f64>], labels: &[String], title: &str) -> ChartSpec {
    let text: Vec<Vec<String>> = matrix
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| if v.is_finite() { format!("{v:.3}") } else { String::new() })
                .collect()
        })
        .collect();
    let z: Vec<Value> = matrix.iter().map(|row| nums(row)).collect();
    let data = vec![json!({
        "type": "heatmap",
        "z": z,
        "x": labels,
        "y": labels,
        "text": text,
        "texttemplate": "%{text}",
        "colorscale": "RdBu_r",
        "zmin": -1,
        "zmax": 1,
        "colorbar": {"title": "r"},
    })];
    spec(
        "heatmap",
        title,
        data,
        json!({
            "xaxis": {"side": "bottom"},
            "yaxis": {"autorange": "reversed"},
        }),
    )
}

/// Count heatmap (contingency tables) scaled from zero to the largest cell.
pub fn count_heatmap(matrix: &[Vec<f64>], row_labels: &[String], col_labels: &[String], title: &str) -> ChartSpec {
    let zmax = matrix
        .iter()
        .flat_map(|r| r.iter().copied())
        .fold(0.0_f64, f64::max);
    let text: Vec<Vec<String>> = matrix
        .iter()
        .map(|row| row.iter().map(|v| format!("{v:.0}")).collect())
        .collect();
    let z: Vec<Value> = matrix.iter().map(|row| nums(row)).collect();
    let data = vec![json!({
        "type": "heatmap",
        "z": z,
        "x": col_labels,
        "y": row_labels,
        "text": text,
        "texttemplate": "%{text}",
        "colorscale": "Blues",
        "zmin": 0,
        "zmax": zmax,
    })];
    spec(
        "heatmap",
        title,
        data,
        json!({
            "xaxis": {"side": "bottom"},
            "yaxis": {"autorange": "reversed"},
        }),
    )
}

/// Residuals-vs-fitted scatter plus a residual histogram.
pub fn residual_plots(fitted: &[f64], residuals: &[f64], title: &str) -> Vec<ChartSpec> {
    let (lo, hi) = sample::min_max(fitted);
    vec![
        scatter(
            fitted,
            residuals,
            &format!("{title}: Residuals vs Fitted"),
            ("Fitted Values", "Residuals"),
            Some(Trendline {
                x: vec![lo, hi],
                y: vec![0.0, 0.0],
                name: "Zero Line".into(),
            }),
            "Residuals",
        ),
        histogram(
            residuals,
            "Residuals",
            &format!("{title}: Histogram of Residuals"),
            "Residual",
            true,
        ),
    ]
}

/// Mean response per level, one line per factor.
pub fn main_effects_plot(factors: &[(String, Vec<String>, Vec<f64>)], title: &str, yaxis_title: &str) -> ChartSpec {
    let data = factors
        .iter()
        .enumerate()
        .map(|(i, (factor, levels, means))| {
            let x: Vec<String> = levels.iter().map(|l| format!("{factor}\n{l}")).collect();
            json!({
                "type": "scatter",
                "x": x,
                "y": nums(means),
                "mode": "lines+markers",
                "name": factor,
                "line": {"color": PALETTE[i % PALETTE.len()], "width": 2},
                "marker": {"size": 8},
            })
        })
        .collect();
    spec(
        "main_effects",
        title,
        data,
        json!({
            "xaxis": {"title": "Factor Levels"},
            "yaxis": {"title": yaxis_title},
        }),
    )
}

/// Cell means of factor A across levels, one trace per level of factor B.
pub fn interaction_plot(
    x_levels: &[String],
    traces: &[(String, Vec<f64>)],
    title: &str,
    axes: (&str, &str),
    trace_name: &str,
) -> ChartSpec {
    let data = traces
        .iter()
        .enumerate()
        .map(|(i, (level, means))| {
            json!({
                "type": "scatter",
                "x": x_levels,
                "y": nums(means),
                "mode": "lines+markers",
                "name": format!("{trace_name}={level}"),
                "line": {"color": PALETTE[i % PALETTE.len()], "width": 2},
                "marker": {"size": 8},
            })
        })
        .collect();
    spec(
        "interaction",
        title,
        data,
        json!({
            "xaxis": {"title": axes.0},
            "yaxis": {"title": axes.1},
        }),
    )
}

/// Histogram with specification-limit and target markers.
pub fn capability_histogram(values: &[f64], lsl: Option<f64>, usl: Option<f64>, target: Option<f64>, title: &str) -> ChartSpec {
    let mut chart = histogram(values, "Process Data", title, "", true);
    let height = values.len() as f64 / 5.0;
    let marks = [
        (lsl, "LSL", DANGER, "dot"),
        (usl, "USL", DANGER, "dot"),
        (target, "Target", SUCCESS, "dashdot"),
    ];
    for (value, label, color, dash) in marks {
        if let Some(v) = value {
            chart.data.push(json!({
                "type": "scatter",
                "x": [num(v), num(v)],
                "y": [0.0, num(height)],
                "mode": "lines",
                "name": format!("{label} = {v}"),
                "line": {"color": color, "width": 2, "dash": dash},
            }));
        }
    }
    chart
}
