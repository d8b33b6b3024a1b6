//! Sample statistics on plain `f64` slices.
//!
//! All functions are total: empty or degenerate input yields `0.0` or `NaN`
//! rather than panicking. Callers check sample sizes before relying on them.

use std::cmp::Ordering;
use std::collections::BTreeMap;

fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (ddof = 1). Zero for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Sample standard deviation (ddof = 1).
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Sum of squared deviations from the mean.
pub fn sum_sq_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum()
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(cmp_f64);
    v
}

pub fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        })
}

/// Percentile with linear interpolation between closest ranks (`q` in 0..=100).
pub fn percentile(values: &[f64], q: f64) -> f64 {
    percentile_sorted(&sorted(values), q)
}

pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// Central moment of order `k` (population normalisation).
fn central_moment(values: &[f64], k: i32) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(k)).sum::<f64>() / values.len() as f64
}

/// Bias-corrected sample skewness (G1). `NaN` below three values or for constant data.
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 3 {
        return f64::NAN;
    }
    let m2 = central_moment(values, 2);
    if m2 <= 0.0 {
        return f64::NAN;
    }
    let g1 = central_moment(values, 3) / m2.powf(1.5);
    g1 * (n * (n - 1.0)).sqrt() / (n - 2.0)
}

/// Bias-corrected excess kurtosis (G2). `NaN` below four values or for constant data.
pub fn kurtosis(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 4 {
        return f64::NAN;
    }
    let m2 = central_moment(values, 2);
    if m2 <= 0.0 {
        return f64::NAN;
    }
    let g2 = central_moment(values, 4) / (m2 * m2) - 3.0;
    ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
}

/// Most frequent value (smallest on ties) and its count.
pub fn mode(values: &[f64]) -> Option<(f64, usize)> {
    let s = sorted(values);
    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < s.len() {
        let mut j = i;
        while j < s.len() && s[j] == s[i] {
            j += 1;
        }
        let count = j - i;
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((s[i], count));
        }
        i = j;
    }
    best
}

/// Least-squares slope and intercept of `y` on `x`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> (f64, f64) {
    let mx = mean(x);
    let my = mean(y);
    let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    if sxx == 0.0 {
        return (0.0, my);
    }
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let slope = sxy / sxx;
    (slope, my - slope * mx)
}

/// Average ranks (1-based), ties share the mean of their positions.
pub fn rank_average(values: &[f64]) -> Vec<f64> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| cmp_f64(&values[a], &values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < idx.len() {
        let mut j = i;
        while j + 1 < idx.len() && values[idx[j + 1]] == values[idx[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &k in &idx[i..=j] {
            ranks[k] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Sizes of tied groups (only groups larger than one).
pub fn tie_sizes(values: &[f64]) -> Vec<usize> {
    let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v.to_bits()).or_default() += 1;
    }
    counts.into_values().filter(|&c| c > 1).collect()
}

/// Absolute successive differences.
pub fn moving_ranges(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| (w[1] - w[0]).abs()).collect()
}

/// Pearson correlation coefficient. `NaN` when either side is constant.
pub fn pearson_r(x: &[f64], y: &[f64]) -> f64 {
    let mx = mean(x);
    let my = mean(y);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_moments() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(mean(&v), 3.0);
        assert_eq!(median(&v), 3.0);
        assert!((std_dev(&v) - 1.5811388).abs() < 1e-6);
        assert_eq!(percentile(&v, 25.0), 2.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 25.0), 1.75);
    }

    #[test]
    fn skewness_and_kurtosis_match_reference_values() {
        let v = [2.0, 8.0, 0.0, 4.0, 1.0, 9.0, 9.0, 0.0];
        // Reference: bias-corrected G1 = 0.3305822, G2 = -2.0986023
        assert!((skewness(&v) - 0.3305822).abs() < 1e-6);
        assert!((kurtosis(&v) + 2.0986023).abs() < 1e-5);
        assert!(skewness(&[1.0, 2.0]).is_nan());
    }

    #[test]
    fn mode_prefers_smallest_on_ties() {
        assert_eq!(mode(&[3.0, 1.0, 3.0, 1.0, 2.0]), Some((1.0, 2)));
        assert_eq!(mode(&[]), None);
    }

    #[test]
    fn ranks_average_ties() {
        assert_eq!(rank_average(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
        assert_eq!(tie_sizes(&[1.0, 1.0, 2.0, 3.0, 3.0, 3.0]), vec![2, 3]);
    }

    #[test]
    fn linear_fit_recovers_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let (slope, intercept) = linear_fit(&x, &y);
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
    }
}
