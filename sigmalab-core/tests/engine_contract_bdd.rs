//! BDD scenarios for the pure test-execution contract.
//!
//! Covers the externally observable guarantees of `run_test` and
//! `run_full_validation`:
//! - configuration and data-inadequacy failures are results, never panics
//! - per-family numeric behavior (Welch switch, Tukey rows, capability,
//!   control limits, gage R&R decomposition, factorial designs)
//! - validation severity and confidence merging

use serde_json::json;
use sigmalab_core::{catalog, dist};
use sigmalab_core::validation::{validate_inputs, Confidence};
use sigmalab_core::{run_full_validation, run_test, Column, DataTable, JsonMap, Registry};

// ── Helpers ──────────────────────────────────────────────────────────

fn config(v: serde_json::Value) -> JsonMap {
    match v {
        serde_json::Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

/// Standard normal quantiles at evenly spaced probabilities: mean zero,
/// symmetric, and about as normal as a finite sample gets.
fn spread(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| dist::normal_ppf((i as f64 + 0.5) / n as f64))
        .collect()
}

fn grouped(groups: &[(&str, Vec<f64>)]) -> DataTable {
    let mut y = Vec::new();
    let mut g = Vec::new();
    for (name, values) in groups {
        y.extend(values.iter().copied());
        g.extend(std::iter::repeat(*name).take(values.len()));
    }
    DataTable::new(vec![Column::numeric("y", &y), Column::text("g", &g)]).unwrap()
}

// ── Configuration contract ───────────────────────────────────────────

#[test]
fn bdd_scenario_missing_required_key_names_the_key_for_every_test() {
    // GIVEN a small numeric table
    let table = DataTable::new(vec![Column::numeric("x", &[1.0, 2.0, 3.0])]).unwrap();
    let registry = Registry::standard();

    for req in catalog::entries() {
        for omitted in req.required_config {
            // AND a config carrying every required key except one
            let mut cfg = JsonMap::new();
            for key in req.required_config.iter().filter(|k| *k != omitted) {
                cfg.insert((*key).to_string(), json!("x"));
            }

            // WHEN the test runs
            let result = registry.run_test(req.kind.as_str(), &table, &cfg);

            // THEN it fails without panicking and names the missing key
            assert!(!result.success, "{} without {omitted}", req.kind);
            assert_eq!(
                result.error.as_deref(),
                Some(format!("Missing required configuration key '{omitted}'").as_str())
            );
            assert_eq!(result.details["error"], result.error.clone().unwrap());
        }
    }
}

#[test]
fn bdd_scenario_too_few_rows_fail_locally_and_in_validation() {
    // GIVEN a single observation
    let table = DataTable::new(vec![Column::numeric("x", &[4.2])]).unwrap();
    let cfg = config(json!({"column": "x", "population_mean": 4.0}));

    // WHEN a one-sample t-test runs
    let result = run_test("one_sample_t", &table, &cfg);

    // THEN the implementation refuses
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Need at least 2 observations"));

    // AND a chart that succeeds locally on 5 points is still flagged by validation
    let five = DataTable::new(vec![Column::numeric("x", &[1.0, 2.0, 3.0, 2.0, 1.0])]).unwrap();
    let chart = run_test("i_mr_chart", &five, &config(json!({"column": "x"})));
    assert!(chart.success);
    let inputs = validate_inputs("i_mr_chart", &config(json!({"column": "x"})), Some(&five), None);
    assert!(!inputs.passed);
    assert!(inputs.findings[0].message.starts_with("Insufficient sample size: 5 rows"));
}

// ── Comparison ───────────────────────────────────────────────────────

#[test]
fn bdd_scenario_levene_decides_between_pooled_and_welch() {
    let base = spread(50);
    let cfg = config(json!({"y_column": "y", "x_column": "g"}));

    // GIVEN two groups with sigma 1 and sigma 5
    let wide: Vec<f64> = base.iter().map(|d| 10.0 + 5.0 * d).collect();
    let narrow: Vec<f64> = base.iter().map(|d| 10.0 + d).collect();
    let unequal = grouped(&[("a", narrow.clone()), ("b", wide)]);

    // WHEN the two-sample t-test runs with auto-detection
    let r = run_test("two_sample_t", &unequal, &cfg);

    // THEN Welch is used and recorded
    assert!(r.success);
    assert_eq!(r.summary_bool("equal_var"), Some(false));
    assert!(r.warnings.iter().any(|w| w.contains("Welch")));

    // GIVEN two groups with identical spread
    let shifted: Vec<f64> = base.iter().map(|d| 11.0 + d).collect();
    let equal = grouped(&[("a", narrow), ("b", shifted)]);

    // THEN the pooled test is kept
    let r = run_test("two_sample_t", &equal, &cfg);
    assert_eq!(r.summary_bool("equal_var"), Some(true));
}

#[test]
fn bdd_scenario_significant_anova_with_three_groups_has_three_tukey_rows() {
    // GIVEN three well separated groups
    let base = spread(12);
    let groups: Vec<(&str, Vec<f64>)> = [("low", 10.0), ("mid", 14.0), ("high", 18.0)]
        .into_iter()
        .map(|(name, mu)| (name, base.iter().map(|d| mu + d).collect()))
        .collect();
    let table = grouped(&groups);

    // WHEN one-way ANOVA runs
    let r = run_test(
        "one_way_anova",
        &table,
        &config(json!({"y_column": "y", "x_column": "g"})),
    );

    // THEN the omnibus test is significant and Tukey compares every pair
    assert!(r.success);
    assert!(r.summary_f64("p_value").unwrap() < 0.05);
    let rows = r.details["posthoc_tukey"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    for row in rows {
        for key in ["meandiff", "p_adj", "lower", "upper", "reject"] {
            assert!(row.get(key).is_some(), "missing {key}");
        }
    }
}

// ── Capability ───────────────────────────────────────────────────────

#[test]
fn bdd_scenario_centered_process_has_cpk_equal_to_cp() {
    // GIVEN data symmetric around 15 with specs 10..20
    let centered: Vec<f64> = spread(40).iter().map(|d| 15.0 + 0.5 * d).collect();
    let table = DataTable::new(vec![Column::numeric("x", &centered)]).unwrap();
    let cfg = config(json!({"column": "x", "lsl": 10.0, "usl": 20.0}));

    // WHEN capability is computed
    let r = run_test("capability_normal", &table, &cfg);

    // THEN cpk matches cp and essentially nothing falls outside spec
    let cp = r.summary_f64("cp").unwrap();
    let cpk = r.summary_f64("cpk").unwrap();
    assert!((cp - cpk).abs() < 1e-9, "cp {cp} cpk {cpk}");
    assert!(r.summary_f64("ppm_total").unwrap() < 1.0);

    // WHEN the process mean moves to 19
    let shifted: Vec<f64> = centered.iter().map(|x| x + 4.0).collect();
    let table = DataTable::new(vec![Column::numeric("x", &shifted)]).unwrap();
    let r = run_test("capability_normal", &table, &cfg);

    // THEN the upper index binds
    let cpu = r.summary_f64("cpu").unwrap();
    let cpl = r.summary_f64("cpl").unwrap();
    assert!(cpu < cpl);
    assert_eq!(r.summary_f64("cpk").unwrap(), cpu);
}

#[test]
fn bdd_scenario_gage_rr_percentages_sum_to_one_hundred() {
    // GIVEN 5 parts x 3 operators x 2 replicates
    let mut m = Vec::new();
    let mut parts = Vec::new();
    let mut ops = Vec::new();
    for p in 0..5 {
        for o in 0..3 {
            for rep in 0..2 {
                let noise = [0.03, -0.02, 0.01, -0.04, 0.02, 0.0][(p + o + rep) % 6];
                m.push(10.0 + p as f64 * 0.8 + o as f64 * 0.05 + noise);
                parts.push(format!("P{p}"));
                ops.push(format!("O{o}"));
            }
        }
    }
    let table = DataTable::new(vec![
        Column::numeric("m", &m),
        Column::text("part", &parts),
        Column::text("op", &ops),
    ])
    .unwrap();

    // WHEN the gage study runs
    let r = run_test(
        "msa_gage_rr",
        &table,
        &config(json!({"measurement_column": "m", "part_column": "part", "operator_column": "op"})),
    );

    // THEN the contributions partition the total variance
    assert!(r.success, "{:?}", r.error);
    let total = r.summary_f64("pct_repeatability").unwrap()
        + r.summary_f64("pct_reproducibility").unwrap()
        + r.summary_f64("pct_part_to_part").unwrap();
    assert!((total - 100.0).abs() < 0.05, "sum {total}");
    assert!(r.summary["ndc"].as_u64().unwrap() >= 1);
}

// ── SPC ──────────────────────────────────────────────────────────────

#[test]
fn bdd_scenario_individuals_chart_flags_a_single_spike() {
    // GIVEN a stable alternating process
    let mut values: Vec<f64> = (0..30)
        .map(|i| if i % 2 == 0 { 10.1 } else { 9.9 })
        .collect();
    let cfg = config(json!({"column": "x"}));
    let stable = DataTable::new(vec![Column::numeric("x", &values)]).unwrap();

    // WHEN the I-MR chart is built
    let r = run_test("i_mr_chart", &stable, &cfg);

    // THEN it is in control with no violations
    assert_eq!(r.summary_bool("in_control"), Some(true));
    assert_eq!(r.details["i_violation_indices"], json!([]));

    // GIVEN one point far above the mean
    values[15] = 15.0;
    let spiked = DataTable::new(vec![Column::numeric("x", &values)]).unwrap();

    // THEN exactly that index is flagged on the individuals chart
    let r = run_test("i_mr_chart", &spiked, &cfg);
    assert_eq!(r.details["i_violation_indices"], json!([15]));
}

// ── Descriptive and DOE ──────────────────────────────────────────────

#[test]
fn bdd_scenario_descriptive_summary_of_one_to_five() {
    // GIVEN the values 1..5
    let table = DataTable::new(vec![Column::numeric("x", &[1.0, 2.0, 3.0, 4.0, 5.0])]).unwrap();

    // WHEN summarised
    let r = run_test("descriptive_summary", &table, &JsonMap::new());

    // THEN the single column is flattened into the summary
    assert_eq!(r.summary_f64("mean"), Some(3.0));
    assert_eq!(r.summary_f64("median"), Some(3.0));
    assert!((r.summary_f64("std").unwrap() - 1.5811).abs() < 1e-4);
    assert_eq!(r.summary["n"], 5);
    assert_eq!(r.summary["null_count"], 0);
}

#[test]
fn bdd_scenario_half_fraction_of_four_factors() {
    // GIVEN four two-level factors and p = 1
    let cfg = config(json!({
        "factors": {"temp": [150, 200], "time": [10, 20], "speed": ["slow", "fast"], "feed": [1, 2]},
        "fraction": 1,
    }));

    // WHEN the design is generated
    let r = run_test("fractional_factorial", &DataTable::empty(), &cfg);

    // THEN there are 2^(4-1) runs with every factor populated
    let rows = r.details["design_table"].as_array().unwrap();
    assert_eq!(rows.len(), 8);
    for row in rows {
        for factor in ["temp", "time", "speed", "feed"] {
            assert!(!row[factor].is_null());
        }
    }
    assert!(!r.warnings.is_empty());
}

// ── Validation merge ─────────────────────────────────────────────────

#[test]
fn bdd_scenario_full_validation_takes_the_weakest_layer() {
    // GIVEN a clean one-sample run on enough data
    let values: Vec<f64> = spread(40).iter().map(|d| 5.0 + d).collect();
    let table = DataTable::new(vec![Column::numeric("x", &values)]).unwrap();
    let cfg = config(json!({"column": "x", "population_mean": 5.0}));
    let result = run_test("one_sample_t", &table, &cfg);

    // WHEN validated with the table
    let report = run_full_validation("one_sample_t", &cfg, Some(&table), None, &result);

    // THEN every layer is clean and confidence is high
    assert!(report.passed, "{:?}", report.findings);
    assert_eq!(report.confidence, Confidence::High);

    // WHEN validated without the table
    let report = run_full_validation("one_sample_t", &cfg, None, Some(40), &result);

    // THEN the assumption layer caps confidence at medium
    assert_eq!(report.confidence, Confidence::Medium);

    // WHEN the run itself failed
    let failed = run_test("one_sample_t", &table, &JsonMap::new());
    let report = run_full_validation("one_sample_t", &JsonMap::new(), Some(&table), None, &failed);

    // THEN the merged report fails with low confidence
    assert!(!report.passed);
    assert_eq!(report.confidence, Confidence::Low);
}
