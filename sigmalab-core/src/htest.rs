//! Classical hypothesis-test kernels on plain slices.
//!
//! These are the building blocks the test implementations and the
//! assumption checks share. Each returns raw statistics; interpretation
//! (labels, warnings, charts) happens one layer up.

use crate::dist::{self, Alternative};
use crate::sample;

// ─── Normality ───────────────────────────────────────────────────────

/// Shapiro-Wilk W statistic and p-value (Royston's approximation).
///
/// Returns `None` for fewer than three values or a zero range.
pub fn shapiro_wilk(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let x = sample::sorted(values);
    let range = x[n - 1] - x[0];
    if range < 1e-19 {
        return None;
    }

    let an = n as f64;
    let nn2 = n / 2;
    let mut a = vec![0.0; nn2];

    if n == 3 {
        a[0] = 0.5f64.sqrt();
    } else {
        const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
        const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
        let an25 = an + 0.25;
        let m: Vec<f64> = (0..nn2)
            .map(|i| dist::normal_ppf((i as f64 + 1.0 - 0.375) / an25))
            .collect();
        let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
        let ssumm2 = summ2.sqrt();
        let rsn = 1.0 / an.sqrt();
        let a1 = poly(&C1, rsn) - m[0] / ssumm2;

        let (first, fac) = if n > 5 {
            let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
            let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
                / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
                .sqrt();
            a[1] = a2;
            (2, fac)
        } else {
            let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
            (1, fac)
        };
        a[0] = a1;
        for i in first..nn2 {
            a[i] = -m[i] / fac;
        }
    }

    let numerator: f64 = (0..nn2).map(|i| a[i] * (x[n - 1 - i] - x[i])).sum();
    let ssq = sample::sum_sq_dev(&x);
    let w = (numerator * numerator / ssq).min(1.0);

    if n == 3 {
        const PI6: f64 = 1.909_859_317_102_744;
        const STQR: f64 = 1.047_197_551_196_598;
        let p = (PI6 * (w.sqrt().asin() - STQR)).max(0.0);
        return Some((w, p));
    }

    let w1 = (1.0 - w).ln();
    let p = if n <= 11 {
        const G: [f64; 2] = [-2.273, 0.459];
        const C3: [f64; 4] = [0.5440, -0.39978, 0.025054, -6.714e-4];
        const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
        let gamma = poly(&G, an);
        if w1 >= gamma {
            return Some((w, 1e-99));
        }
        let y = -(gamma - w1).ln();
        let m = poly(&C3, an);
        let s = poly(&C4, an).exp();
        dist::normal_sf((y - m) / s)
    } else {
        const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
        const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
        let ln_n = an.ln();
        let m = poly(&C5, ln_n);
        let s = poly(&C6, ln_n).exp();
        dist::normal_sf((w1 - m) / s)
    };
    Some((w, p))
}

fn poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Anderson-Darling normality statistic with its critical-value table.
#[derive(Debug, Clone, PartialEq)]
pub struct AndersonDarling {
    pub statistic: f64,
    pub critical_values: [f64; 5],
    /// Significance levels in percent, matching `critical_values`.
    pub significance_levels: [f64; 5],
}

impl AndersonDarling {
    /// First table entry whose significance level / 100 is at or below `alpha`.
    pub fn critical_at(&self, alpha: f64) -> Option<(f64, f64)> {
        self.critical_values
            .iter()
            .zip(self.significance_levels.iter())
            .find(|(_, &sl)| sl / 100.0 <= alpha)
            .map(|(&cv, &sl)| (cv, sl))
    }
}

pub fn anderson_darling(values: &[f64]) -> Option<AndersonDarling> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = sample::mean(values);
    let sd = sample::std_dev(values);
    if sd == 0.0 {
        return None;
    }
    let w: Vec<f64> = sample::sorted(values)
        .into_iter()
        .map(|x| (x - mean) / sd)
        .collect();
    let nf = n as f64;
    let s: f64 = (0..n)
        .map(|i| {
            let k = (2 * i + 1) as f64 / nf;
            k * (dist::normal_cdf(w[i]).ln() + dist::normal_sf(w[n - 1 - i]).ln())
        })
        .sum();
    let statistic = -nf - s;

    const AVALS: [f64; 5] = [0.576, 0.656, 0.787, 0.918, 1.092];
    let scale = 1.0 + 4.0 / nf - 25.0 / (nf * nf);
    let mut critical_values = [0.0; 5];
    for (cv, a) in critical_values.iter_mut().zip(AVALS) {
        *cv = (a / scale * 1000.0).round() / 1000.0;
    }
    Some(AndersonDarling {
        statistic,
        critical_values,
        significance_levels: [15.0, 10.0, 5.0, 2.5, 1.0],
    })
}

/// D'Agostino–Pearson K² omnibus normality test. Needs at least 8 values.
pub fn dagostino_pearson(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 8 {
        return None;
    }
    let nf = n as f64;
    let mean = sample::mean(values);
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf;
    if m2 <= 0.0 {
        return None;
    }
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / nf;
    let m4 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / nf;

    // Skewness component
    let b1 = m3 / m2.powf(1.5);
    let mut y = b1 * ((nf + 1.0) * (nf + 3.0) / (6.0 * (nf - 2.0))).sqrt();
    let beta2 = 3.0 * (nf * nf + 27.0 * nf - 70.0) * (nf + 1.0) * (nf + 3.0)
        / ((nf - 2.0) * (nf + 5.0) * (nf + 7.0) * (nf + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    if y == 0.0 {
        y = 1.0;
    }
    let ya = y / alpha;
    let z_skew = delta * (ya + (ya * ya + 1.0).sqrt()).ln();

    // Kurtosis component
    let b2 = m4 / (m2 * m2);
    let e = 3.0 * (nf - 1.0) / (nf + 1.0);
    let var_b2 =
        24.0 * nf * (nf - 2.0) * (nf - 3.0) / ((nf + 1.0).powi(2) * (nf + 3.0) * (nf + 5.0));
    let x = (b2 - e) / var_b2.sqrt();
    let sqrt_beta1 = 6.0 * (nf * nf - 5.0 * nf + 2.0) / ((nf + 7.0) * (nf + 9.0))
        * (6.0 * (nf + 3.0) * (nf + 5.0) / (nf * (nf - 2.0) * (nf - 3.0))).sqrt();
    let a = 6.0
        + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    if denom == 0.0 {
        return None;
    }
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).powf(1.0 / 3.0);
    let z_kurt = (term1 - term2) / (2.0 / (9.0 * a)).sqrt();

    let k2 = z_skew * z_skew + z_kurt * z_kurt;
    Some((k2, dist::chi2_sf(k2, 2.0)))
}

// ─── Variance and location ───────────────────────────────────────────

/// Levene's test (median-centred, Brown–Forsythe) for equal variances.
pub fn levene(groups: &[&[f64]]) -> Option<(f64, f64)> {
    let k = groups.len();
    let n_total: usize = groups.iter().map(|g| g.len()).sum();
    if k < 2 || n_total <= k || groups.iter().any(|g| g.is_empty()) {
        return None;
    }
    let z: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| {
            let med = sample::median(g);
            g.iter().map(|v| (v - med).abs()).collect()
        })
        .collect();
    let z_means: Vec<f64> = z.iter().map(|g| sample::mean(g)).collect();
    let grand = z.iter().flatten().sum::<f64>() / n_total as f64;
    let between: f64 = z
        .iter()
        .zip(&z_means)
        .map(|(g, m)| g.len() as f64 * (m - grand).powi(2))
        .sum();
    let within: f64 = z
        .iter()
        .zip(&z_means)
        .map(|(g, m)| g.iter().map(|v| (v - m).powi(2)).sum::<f64>())
        .sum();
    let df1 = (k - 1) as f64;
    let df2 = (n_total - k) as f64;
    if within == 0.0 {
        return if between == 0.0 {
            None
        } else {
            Some((f64::INFINITY, 0.0))
        };
    }
    let w = df2 / df1 * between / within;
    Some((w, dist::f_sf(w, df1, df2)))
}

/// One-way ANOVA decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct OneWay {
    pub f: f64,
    pub p: f64,
    pub df_between: f64,
    pub df_within: f64,
    pub ss_between: f64,
    pub ss_within: f64,
}

impl OneWay {
    pub fn ms_within(&self) -> f64 {
        self.ss_within / self.df_within
    }
}

pub fn one_way_anova(groups: &[&[f64]]) -> Option<OneWay> {
    let k = groups.len();
    let n_total: usize = groups.iter().map(|g| g.len()).sum();
    if k < 2 || n_total <= k {
        return None;
    }
    let grand = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n_total as f64;
    let ss_between: f64 = groups
        .iter()
        .map(|g| g.len() as f64 * (sample::mean(g) - grand).powi(2))
        .sum();
    let ss_within: f64 = groups.iter().map(|g| sample::sum_sq_dev(g)).sum();
    let df_between = (k - 1) as f64;
    let df_within = (n_total - k) as f64;
    let f = (ss_between / df_between) / (ss_within / df_within);
    let p = if f.is_nan() {
        f64::NAN
    } else {
        dist::f_sf(f, df_between, df_within)
    };
    Some(OneWay {
        f,
        p,
        df_between,
        df_within,
        ss_between,
        ss_within,
    })
}

/// Two-sample t-test result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    pub t: f64,
    pub df: f64,
    pub p: f64,
}

/// Independent two-sample t-test, pooled or Welch.
pub fn t_test_ind(a: &[f64], b: &[f64], equal_var: bool, alternative: Alternative) -> TTest {
    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let v1 = sample::variance(a);
    let v2 = sample::variance(b);
    let diff = sample::mean(a) - sample::mean(b);
    let (se, df) = if equal_var {
        let df = n1 + n2 - 2.0;
        let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / df;
        ((pooled * (1.0 / n1 + 1.0 / n2)).sqrt(), df)
    } else {
        let q1 = v1 / n1;
        let q2 = v2 / n2;
        let df = (q1 + q2).powi(2) / (q1 * q1 / (n1 - 1.0) + q2 * q2 / (n2 - 1.0));
        ((q1 + q2).sqrt(), df)
    };
    let t = diff / se;
    TTest {
        t,
        df,
        p: dist::t_p_value(t, df, alternative),
    }
}

/// One-sample t-test against `mu`.
pub fn t_test_1samp(values: &[f64], mu: f64, alternative: Alternative) -> TTest {
    let n = values.len() as f64;
    let se = sample::std_dev(values) / n.sqrt();
    let t = (sample::mean(values) - mu) / se;
    let df = n - 1.0;
    TTest {
        t,
        df,
        p: dist::t_p_value(t, df, alternative),
    }
}

/// Cohen's d with pooled standard deviation.
pub fn cohen_d(a: &[f64], b: &[f64]) -> f64 {
    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let pooled = (((n1 - 1.0) * sample::variance(a) + (n2 - 1.0) * sample::variance(b))
        / (n1 + n2 - 2.0))
        .sqrt();
    if pooled == 0.0 || pooled.is_nan() {
        return 0.0;
    }
    (sample::mean(a) - sample::mean(b)) / pooled
}

// ─── Rank tests ──────────────────────────────────────────────────────

/// Mann-Whitney U for the first sample and its p-value.
///
/// Exact null distribution when the smaller sample has at most 8 values
/// and there are no ties; otherwise the normal approximation with tie and
/// continuity corrections.
pub fn mann_whitney_u(a: &[f64], b: &[f64], alternative: Alternative) -> (f64, f64) {
    let n1 = a.len();
    let n2 = b.len();
    let combined: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
    let ranks = sample::rank_average(&combined);
    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;
    let ties = sample::tie_sizes(&combined);

    let p = if n1.min(n2) <= 8 && ties.is_empty() {
        let pmf = mann_whitney_pmf(n1, n2);
        let sf = |u: f64| -> f64 {
            let start = u.ceil().max(0.0) as usize;
            pmf.iter().skip(start).sum()
        };
        match alternative {
            Alternative::Greater => sf(u1),
            Alternative::Less => sf(u2),
            Alternative::TwoSided => (2.0 * sf(u1.max(u2))).min(1.0),
        }
    } else {
        let n = (n1 + n2) as f64;
        let mu = (n1 * n2) as f64 / 2.0;
        let tie_term: f64 = ties.iter().map(|&t| (t * t * t - t) as f64).sum();
        let s = ((n1 * n2) as f64 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)))).sqrt();
        let u = match alternative {
            Alternative::Greater => u1,
            Alternative::Less => u2,
            Alternative::TwoSided => u1.max(u2),
        };
        let z = (u - mu - 0.5) / s;
        let p = dist::normal_sf(z);
        if alternative == Alternative::TwoSided {
            (2.0 * p).min(1.0)
        } else {
            p
        }
    };
    (u1, p)
}

/// Exact null PMF of U for sample sizes (m, n), via the Gaussian binomial coefficient.
fn mann_whitney_pmf(m: usize, n: usize) -> Vec<f64> {
    let (m, n) = if m <= n { (m, n) } else { (n, m) };
    let degree = m * n;
    let mut coef = vec![0.0; degree + 1];
    coef[0] = 1.0;
    for i in 1..=m {
        // multiply by (1 - q^(n+i))
        let shift = n + i;
        for d in (shift..=degree).rev() {
            coef[d] -= coef[d - shift];
        }
        // divide by (1 - q^i)
        for d in i..=degree {
            coef[d] += coef[d - i];
        }
    }
    let total: f64 = coef.iter().sum();
    coef.into_iter().map(|c| c / total).collect()
}

/// Kruskal-Wallis H (tie-corrected) and p-value.
pub fn kruskal_wallis(groups: &[&[f64]]) -> Option<(f64, f64)> {
    let k = groups.len();
    if k < 2 {
        return None;
    }
    let combined: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = combined.len() as f64;
    let ranks = sample::rank_average(&combined);
    let mut offset = 0;
    let mut sum = 0.0;
    for g in groups {
        let r: f64 = ranks[offset..offset + g.len()].iter().sum();
        sum += r * r / g.len() as f64;
        offset += g.len();
    }
    let mut h = 12.0 / (n * (n + 1.0)) * sum - 3.0 * (n + 1.0);
    let tie_term: f64 = sample::tie_sizes(&combined)
        .iter()
        .map(|&t| (t * t * t - t) as f64)
        .sum();
    let correction = 1.0 - tie_term / (n * n * n - n);
    if correction <= 0.0 {
        return None;
    }
    h /= correction;
    Some((h, dist::chi2_sf(h, (k - 1) as f64)))
}

// ─── Categorical ─────────────────────────────────────────────────────

/// Chi-square test of independence.
#[derive(Debug, Clone, PartialEq)]
pub struct Contingency {
    pub chi2: f64,
    pub p: f64,
    pub dof: usize,
    pub expected: Vec<Vec<f64>>,
}

/// Chi-square independence test with Yates' correction when dof = 1.
pub fn chi2_contingency(observed: &[Vec<f64>]) -> Option<Contingency> {
    let rows = observed.len();
    let cols = observed.first().map(Vec::len).unwrap_or(0);
    if rows == 0 || cols == 0 {
        return None;
    }
    let row_sums: Vec<f64> = observed.iter().map(|r| r.iter().sum()).collect();
    let col_sums: Vec<f64> = (0..cols)
        .map(|j| observed.iter().map(|r| r[j]).sum())
        .collect();
    let total: f64 = row_sums.iter().sum();
    if total == 0.0 {
        return None;
    }
    let expected: Vec<Vec<f64>> = row_sums
        .iter()
        .map(|rs| col_sums.iter().map(|cs| rs * cs / total).collect())
        .collect();
    let dof = (rows - 1) * (cols - 1);

    if dof == 0 {
        return Some(Contingency {
            chi2: 0.0,
            p: 1.0,
            dof,
            expected,
        });
    }

    let mut chi2 = 0.0;
    for i in 0..rows {
        for j in 0..cols {
            let e = expected[i][j];
            let mut o = observed[i][j];
            if dof == 1 {
                let diff = e - o;
                o += diff.signum() * diff.abs().min(0.5);
            }
            chi2 += (o - e).powi(2) / e;
        }
    }
    Some(Contingency {
        chi2,
        p: dist::chi2_sf(chi2, dof as f64),
        dof,
        expected,
    })
}

/// Pearson chi-square goodness-of-fit.
pub fn chi_square_gof(observed: &[f64], expected: &[f64]) -> (f64, f64) {
    let chi2: f64 = observed
        .iter()
        .zip(expected)
        .map(|(o, e)| (o - e).powi(2) / e)
        .sum();
    let dof = observed.len().saturating_sub(1) as f64;
    (chi2, dist::chi2_sf(chi2, dof))
}

// ─── Correlation ─────────────────────────────────────────────────────

/// Pearson r with two-sided p-value (t distribution, n-2 df).
pub fn pearson(x: &[f64], y: &[f64]) -> (f64, f64) {
    let r = sample::pearson_r(x, y);
    (r, correlation_p(r, x.len()))
}

/// Spearman rho with two-sided p-value.
pub fn spearman(x: &[f64], y: &[f64]) -> (f64, f64) {
    let rx = sample::rank_average(x);
    let ry = sample::rank_average(y);
    let r = sample::pearson_r(&rx, &ry);
    (r, correlation_p(r, x.len()))
}

fn correlation_p(r: f64, n: usize) -> f64 {
    if r.is_nan() || n < 3 {
        return f64::NAN;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / ((1.0 - r) * (1.0 + r))).sqrt();
    dist::t_p_value(t, df, Alternative::TwoSided)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn shapiro_on_evenly_spaced_data_is_not_rejected() {
        let v: Vec<f64> = (1..=20).map(f64::from).collect();
        let (w, p) = shapiro_wilk(&v).unwrap();
        assert!(w > 0.95 && w <= 1.0);
        assert!(p > 0.05);
    }

    #[test]
    fn shapiro_rejects_heavy_skew() {
        let v: Vec<f64> = (0..30).map(|i| (i as f64 / 3.0).exp()).collect();
        let (_, p) = shapiro_wilk(&v).unwrap();
        assert!(p < 0.01, "p = {p}");
    }

    #[test]
    fn shapiro_three_points() {
        let (w, p) = shapiro_wilk(&[1.0, 2.0, 3.0]).unwrap();
        assert!(close(w, 1.0, 1e-12));
        assert!(close(p, 1.0, 1e-6));
        assert!(shapiro_wilk(&[4.0, 4.0, 4.0]).is_none());
    }

    #[test]
    fn anderson_critical_value_selection() {
        let v: Vec<f64> = (1..=50).map(|i| (i as f64 * 0.37).sin()).collect();
        let ad = anderson_darling(&v).unwrap();
        let (cv, sl) = ad.critical_at(0.05).unwrap();
        assert_eq!(sl, 5.0);
        assert_eq!(cv, ad.critical_values[2]);
        let (_, sl10) = ad.critical_at(0.10).unwrap();
        assert_eq!(sl10, 10.0);
        assert!(ad.critical_at(0.001).is_none());
    }

    #[test]
    fn levene_detects_spread_difference() {
        let a: Vec<f64> = (0..40).map(|i| (i as f64 * 0.7).sin()).collect();
        let b: Vec<f64> = a.iter().map(|v| v * 6.0).collect();
        let (_, p) = levene(&[&a, &b]).unwrap();
        assert!(p < 0.001);
        let (_, p_same) = levene(&[&a, &a]).unwrap();
        assert!(p_same > 0.99);
    }

    #[test]
    fn welch_and_pooled_agree_on_equal_sizes_and_variances() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 3.0, 4.0, 5.0, 6.0];
        let pooled = t_test_ind(&a, &b, true, Alternative::TwoSided);
        let welch = t_test_ind(&a, &b, false, Alternative::TwoSided);
        assert!(close(pooled.t, welch.t, 1e-12));
        assert!(close(pooled.df, 8.0, 1e-12));
        assert!(close(welch.df, 8.0, 1e-9));
        assert!(close(pooled.t, -1.0, 1e-12));
    }

    #[test]
    fn mann_whitney_exact_small_sample() {
        // Complete separation, 4 vs 4: two-sided exact p = 2/70
        let (u, p) = mann_whitney_u(&[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0, 7.0, 8.0], Alternative::TwoSided);
        assert_eq!(u, 0.0);
        assert!(close(p, 2.0 / 70.0, 1e-12));
    }

    #[test]
    fn mann_whitney_pmf_sums_to_one() {
        let pmf = mann_whitney_pmf(3, 5);
        assert_eq!(pmf.len(), 16);
        assert!(close(pmf.iter().sum::<f64>(), 1.0, 1e-12));
        // symmetric
        assert!(close(pmf[0], pmf[15], 1e-15));
    }

    #[test]
    fn kruskal_matches_hand_computation() {
        // Ranks: g1 = 1,2,3 (sum 6), g2 = 4,5,6 (sum 15), g3 = 7,8,9 (sum 24)
        let (h, _) = kruskal_wallis(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[7.0, 8.0, 9.0]]).unwrap();
        let expected = 12.0 / 90.0 * (36.0 / 3.0 + 225.0 / 3.0 + 576.0 / 3.0) - 30.0;
        assert!(close(h, expected, 1e-12));
    }

    #[test]
    fn contingency_applies_yates_on_2x2() {
        let obs = vec![vec![10.0, 20.0], vec![20.0, 10.0]];
        let c = chi2_contingency(&obs).unwrap();
        assert_eq!(c.dof, 1);
        // |o - e| = 5 -> 4.5 after correction; 4 cells * 4.5^2 / 15
        assert!(close(c.chi2, 4.0 * 20.25 / 15.0, 1e-12));
    }

    #[test]
    fn perfect_correlation_has_zero_p() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let (r, p) = pearson(&x, &[2.0, 4.0, 6.0, 8.0]);
        assert!(close(r, 1.0, 1e-12));
        assert_eq!(p, 0.0);
        let (rho, _) = spearman(&x, &[1.0, 4.0, 9.0, 16.0]);
        assert!(close(rho, 1.0, 1e-12));
    }
}
