//! Criterion benchmarks for SigmaLab hot paths.
//!
//! Benchmarks:
//! 1. Group comparisons (one-way ANOVA with Tukey, Kruskal-Wallis)
//! 2. Correlation matrix over many columns
//! 3. DOE analysis on a replicated 2^3 design
//! 4. Full three-layer validation of a finished run

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use sigmalab_core::{run_full_validation, Column, DataTable, JsonMap, Registry};

// ── Helpers ──────────────────────────────────────────────────────────

/// Deterministic pseudo-noise in [-1, 1).
fn wobble(i: usize) -> f64 {
    ((i as f64 * 12.9898).sin() * 43758.5453).fract()
}

fn config(v: serde_json::Value) -> JsonMap {
    match v {
        serde_json::Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

fn grouped_table(rows: usize, groups: usize) -> DataTable {
    let y: Vec<f64> = (0..rows)
        .map(|i| 10.0 + (i % groups) as f64 * 0.5 + wobble(i))
        .collect();
    let g: Vec<String> = (0..rows).map(|i| format!("G{}", i % groups)).collect();
    DataTable::new(vec![Column::numeric("y", &y), Column::text("g", &g)]).unwrap()
}

fn wide_table(rows: usize, cols: usize) -> DataTable {
    let columns = (0..cols)
        .map(|c| {
            let values: Vec<f64> = (0..rows)
                .map(|i| i as f64 * 0.01 * c as f64 + wobble(i * cols + c))
                .collect();
            Column::numeric(format!("c{c}"), &values)
        })
        .collect();
    DataTable::new(columns).unwrap()
}

fn factorial_table(replicates: usize) -> DataTable {
    let mut a = Vec::new();
    let mut b = Vec::new();
    let mut c = Vec::new();
    let mut y = Vec::new();
    for rep in 0..replicates {
        for run in 0..8_usize {
            let (fa, fb, fc) = ((run >> 2) & 1, (run >> 1) & 1, run & 1);
            a.push(if fa == 1 { "high" } else { "low" });
            b.push(if fb == 1 { "high" } else { "low" });
            c.push(if fc == 1 { "high" } else { "low" });
            y.push(50.0 + 6.0 * fa as f64 + 2.0 * fb as f64 + wobble(rep * 8 + run));
        }
    }
    DataTable::new(vec![
        Column::text("A", &a),
        Column::text("B", &b),
        Column::text("C", &c),
        Column::numeric("yield", &y),
    ])
    .unwrap()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_group_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_comparison");
    let registry = Registry::standard();
    let cfg = config(json!({"y_column": "y", "x_column": "g"}));

    for &rows in &[100, 1_000, 10_000] {
        let table = grouped_table(rows, 4);
        group.bench_with_input(BenchmarkId::new("one_way_anova", rows), &rows, |b, _| {
            b.iter(|| registry.run_test("one_way_anova", black_box(&table), black_box(&cfg)));
        });
        group.bench_with_input(BenchmarkId::new("kruskal_wallis", rows), &rows, |b, _| {
            b.iter(|| registry.run_test("kruskal_wallis", black_box(&table), black_box(&cfg)));
        });
    }
    group.finish();
}

fn bench_correlation(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlation_matrix");
    let registry = Registry::standard();

    for &cols in &[4, 12] {
        let table = wide_table(1_000, cols);
        for method in ["pearson", "spearman"] {
            let cfg = config(json!({"method": method}));
            group.bench_with_input(BenchmarkId::new(method, cols), &cols, |b, _| {
                b.iter(|| registry.run_test("correlation", black_box(&table), black_box(&cfg)));
            });
        }
    }
    group.finish();
}

fn bench_doe_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("doe_analysis");
    let registry = Registry::standard();
    let cfg = config(json!({"response_column": "yield", "factor_columns": ["A", "B", "C"]}));

    for &replicates in &[2, 8] {
        let table = factorial_table(replicates);
        group.bench_with_input(
            BenchmarkId::new("two_level_3_factors", replicates),
            &replicates,
            |b, _| {
                b.iter(|| registry.run_test("doe_analysis", black_box(&table), black_box(&cfg)));
            },
        );
    }
    group.finish();
}

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");
    let registry = Registry::standard();
    let cfg = config(json!({"y_column": "y", "x_column": "g"}));

    for &rows in &[200, 4_000] {
        let table = grouped_table(rows, 2);
        let result = registry.run_test("two_sample_t", &table, &cfg);
        group.bench_with_input(BenchmarkId::new("two_sample_t", rows), &rows, |b, _| {
            b.iter(|| {
                run_full_validation(
                    "two_sample_t",
                    black_box(&cfg),
                    Some(black_box(&table)),
                    None,
                    black_box(&result),
                )
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_group_comparison,
    bench_correlation,
    bench_doe_analysis,
    bench_validation,
);
criterion_main!(benches);
