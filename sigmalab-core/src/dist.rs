//! Probability distributions implemented from first principles.
//!
//! - Lanczos approximation for ln(Gamma)
//! - Regularized incomplete beta (Lentz continued fraction)
//! - Regularized incomplete gamma (series / continued fraction)
//! - Normal, Student t, F, and chi-square CDFs and survival functions
//! - Normal and t quantiles
//! - Studentized range distribution (Tukey HSD)
//!
//! Accuracy targets are those of the hypothesis tests that consume them:
//! roughly 1e-10 absolute on p-values in the central range.

use std::f64::consts::{PI, SQRT_2};

// ─── Gamma / Beta primitives ─────────────────────────────────────────

/// Lanczos approximation for ln(Gamma(x)), g=7, n=9.
pub fn ln_gamma(x: f64) -> f64 {
    #[allow(clippy::excessive_precision)]
    const COEFFICIENTS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    const G: f64 = 7.0;

    if x < 0.5 {
        // Reflection: Gamma(x) * Gamma(1-x) = pi / sin(pi*x)
        let sin_val = (PI * x).sin();
        if sin_val.abs() < 1e-300 {
            return f64::INFINITY;
        }
        return PI.ln() - sin_val.abs().ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = COEFFICIENTS[0];
    for (i, &c) in COEFFICIENTS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + G + 0.5;
    (2.0 * PI).sqrt().ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

const TINY: f64 = 1e-300;
const EPS: f64 = 1e-15;
const MAX_ITER: usize = 500;

/// Regularized incomplete beta function I_x(a, b).
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if !(0.0..=1.0).contains(&x) || a <= 0.0 || b <= 0.0 {
        return f64::NAN;
    }
    if x == 0.0 {
        return 0.0;
    }
    if x == 1.0 {
        return 1.0;
    }
    // Symmetry keeps the continued fraction in its fast-converging region
    if x > (a + 1.0) / (a + b + 2.0) {
        return 1.0 - regularized_incomplete_beta(b, a, 1.0 - x);
    }

    let ln_prefix =
        a * x.ln() + b * (1.0 - x).ln() - ln_gamma(a) - ln_gamma(b) + ln_gamma(a + b) - a.ln();

    let mut c = 1.0_f64;
    let mut d = 1.0 - (a + b) * x / (a + 1.0);
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut f = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;

        let even = m * (b - m) * x / ((a + 2.0 * m - 1.0) * (a + 2.0 * m));
        d = 1.0 + even * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + even / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        f *= c * d;

        let odd = -((a + m) * (a + b + m) * x) / ((a + 2.0 * m) * (a + 2.0 * m + 1.0));
        d = 1.0 + odd * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + odd / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = c * d;
        f *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }

    ln_prefix.exp() * f
}

/// Regularized lower incomplete gamma P(a, x).
pub fn regularized_gamma_p(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 0.0;
    }
    if x < a + 1.0 {
        gamma_series(a, x)
    } else {
        1.0 - gamma_continued_fraction(a, x)
    }
}

/// Regularized upper incomplete gamma Q(a, x) = 1 - P(a, x).
pub fn regularized_gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        1.0 - gamma_series(a, x)
    } else {
        gamma_continued_fraction(a, x)
    }
}

fn gamma_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut del = sum;
    for _ in 0..MAX_ITER {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * EPS {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn gamma_continued_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_ITER {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

// ─── Normal ──────────────────────────────────────────────────────────

/// Complementary error function.
pub fn erfc(x: f64) -> f64 {
    if x >= 0.0 {
        regularized_gamma_q(0.5, x * x)
    } else {
        1.0 + regularized_gamma_p(0.5, x * x)
    }
}

/// Standard normal density.
pub fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    0.5 * erfc(-z / SQRT_2)
}

/// Standard normal survival function, accurate far into the upper tail.
pub fn normal_sf(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    0.5 * erfc(z / SQRT_2)
}

/// Standard normal quantile (Acklam's rational approximation + one Halley step).
pub fn normal_ppf(p: f64) -> f64 {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    let x = if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    };

    // Halley refinement against the tail that keeps precision
    let e = if p < 0.5 {
        normal_cdf(x) - p
    } else {
        (1.0 - p) - normal_sf(x)
    };
    let u = e * (2.0 * PI).sqrt() * (x * x / 2.0).exp();
    let refined = x - u / (1.0 + x * u / 2.0);
    if refined.is_finite() {
        refined
    } else {
        x
    }
}

/// Inverse survival function: z such that P(Z > z) = p.
pub fn normal_isf(p: f64) -> f64 {
    -normal_ppf(p)
}

// ─── Student t ───────────────────────────────────────────────────────

/// Student's t CDF: P(T <= t).
pub fn t_cdf(t: f64, df: f64) -> f64 {
    if df <= 0.0 || t.is_nan() {
        return f64::NAN;
    }
    if t == 0.0 {
        return 0.5;
    }
    if t.is_infinite() {
        return if t > 0.0 { 1.0 } else { 0.0 };
    }
    let x = df / (df + t * t);
    let ib = regularized_incomplete_beta(df / 2.0, 0.5, x);
    if t > 0.0 {
        1.0 - 0.5 * ib
    } else {
        0.5 * ib
    }
}

/// Student's t survival function: P(T > t).
pub fn t_sf(t: f64, df: f64) -> f64 {
    t_cdf(-t, df)
}

/// Student's t quantile by bracketed bisection.
pub fn t_ppf(p: f64, df: f64) -> f64 {
    if p.is_nan() || df <= 0.0 || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.5 {
        return 0.0;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }
    let mut lo = -1.0;
    let mut hi = 1.0;
    while t_cdf(lo, df) > p && lo > -1e12 {
        lo *= 2.0;
    }
    while t_cdf(hi, df) < p && hi < 1e12 {
        hi *= 2.0;
    }
    bisect(|t| t_cdf(t, df) - p, lo, hi)
}

/// Which tail(s) a hypothesis test looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Alternative {
    #[default]
    #[serde(rename = "two-sided")]
    TwoSided,
    #[serde(rename = "less")]
    Less,
    #[serde(rename = "greater")]
    Greater,
}

impl Alternative {
    pub fn as_str(self) -> &'static str {
        match self {
            Alternative::TwoSided => "two-sided",
            Alternative::Less => "less",
            Alternative::Greater => "greater",
        }
    }
}

/// P-value for a t statistic under the requested alternative.
pub fn t_p_value(t: f64, df: f64, alternative: Alternative) -> f64 {
    match alternative {
        Alternative::TwoSided => (2.0 * t_sf(t.abs(), df)).min(1.0),
        Alternative::Less => t_cdf(t, df),
        Alternative::Greater => t_sf(t, df),
    }
}

/// P-value for a standard-normal statistic under the requested alternative.
pub fn z_p_value(z: f64, alternative: Alternative) -> f64 {
    match alternative {
        Alternative::TwoSided => (2.0 * normal_sf(z.abs())).min(1.0),
        Alternative::Less => normal_cdf(z),
        Alternative::Greater => normal_sf(z),
    }
}

// ─── F and chi-square ────────────────────────────────────────────────

/// F distribution survival function P(F > f).
pub fn f_sf(f: f64, d1: f64, d2: f64) -> f64 {
    if f.is_nan() || d1 <= 0.0 || d2 <= 0.0 {
        return f64::NAN;
    }
    if f <= 0.0 {
        return 1.0;
    }
    if f.is_infinite() {
        return 0.0;
    }
    regularized_incomplete_beta(d2 / 2.0, d1 / 2.0, d2 / (d2 + d1 * f))
}

/// Chi-square survival function P(X > x).
pub fn chi2_sf(x: f64, k: f64) -> f64 {
    if x.is_nan() || k <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }
    regularized_gamma_q(k / 2.0, x / 2.0)
}

// ─── Studentized range ───────────────────────────────────────────────

/// Probability integral of the range of `cc` standard normals (`rr` ranges).
fn wprob(w: f64, rr: f64, cc: f64) -> f64 {
    const NLEG: usize = 12;
    const IHALF: usize = 6;
    const C1: f64 = -30.0;
    const C2: f64 = -50.0;
    const C3: f64 = 60.0;
    const BB: f64 = 8.0;
    const WLAR: f64 = 3.0;
    const XLEG: [f64; IHALF] = [
        0.981560634246719250690549090149,
        0.904117256370474856678465866119,
        0.769902674194304687036893833213,
        0.587317954286617447296702418941,
        0.367831498998180193752691536644,
        0.125233408511468915472441369464,
    ];
    const ALEG: [f64; IHALF] = [
        0.047175336386511827194615961485,
        0.106939325995318430960254718194,
        0.160078328543346226334652529543,
        0.203167426723065921749064455810,
        0.233492536538354808760849898925,
        0.249147045813402785000562436043,
    ];

    let qsqz = w * 0.5;
    if qsqz >= BB {
        return 1.0;
    }

    let mut pr_w = 2.0 * normal_cdf(qsqz) - 1.0;
    pr_w = if pr_w >= (C2 / cc).exp() {
        pr_w.powf(cc)
    } else {
        0.0
    };

    let wincr = if w > WLAR { 2.0 } else { 3.0 };
    let mut blb = qsqz;
    let binc = (BB - qsqz) / wincr;
    let mut bub = blb + binc;
    let mut einsum = 0.0;
    let cc1 = cc - 1.0;

    let mut wi = 1.0;
    while wi <= wincr {
        let mut elsum = 0.0;
        let a = 0.5 * (bub + blb);
        let b = 0.5 * (bub - blb);

        for jj in 1..=NLEG {
            let (j, xx) = if IHALF < jj {
                let j = NLEG - jj + 1;
                (j, XLEG[j - 1])
            } else {
                (jj, -XLEG[jj - 1])
            };
            let c = b * xx;
            let ac = a + c;
            let qexpo = ac * ac;
            if qexpo > C3 {
                break;
            }
            let pplus = 2.0 * normal_cdf(ac);
            let pminus = 2.0 * normal_cdf(ac - w);
            let rinsum = pplus * 0.5 - pminus * 0.5;
            if rinsum >= (C1 / cc1).exp() {
                elsum += ALEG[j - 1] * (-(0.5 * qexpo)).exp() * rinsum.powf(cc1);
            }
        }
        elsum *= 2.0 * b * cc / (2.0 * PI).sqrt();
        einsum += elsum;
        blb = bub;
        bub += binc;
        wi += 1.0;
    }

    pr_w += einsum;
    if pr_w <= (C1 / rr).exp() {
        return 0.0;
    }
    pr_w = pr_w.powf(rr);
    pr_w.min(1.0)
}

/// CDF of the studentized range for `k` groups and `df` error degrees of freedom.
pub fn studentized_range_cdf(q: f64, k: f64, df: f64) -> f64 {
    const NLEGQ: usize = 16;
    const IHALFQ: usize = 8;
    const EPS1: f64 = -30.0;
    const EPS2: f64 = 1.0e-14;
    const DLARG: f64 = 25000.0;
    const XLEGQ: [f64; IHALFQ] = [
        0.989400934991649932596154173450,
        0.944575023073232576077988415535,
        0.865631202387831743880467897712,
        0.755404408355003033895101194847,
        0.617876244402643748446671764049,
        0.458016777657227386342419442984,
        0.281603550779258913230460501460,
        0.950125098376374401853193354250e-1,
    ];
    const ALEGQ: [f64; IHALFQ] = [
        0.271524594117540948517805724560e-1,
        0.622535239386478928628438369944e-1,
        0.951585116824927848099251076022e-1,
        0.124628971255533872052476282192,
        0.149595988816576732081501730547,
        0.169156519395002538189312079030,
        0.182603415044923588866763667969,
        0.189450610455068496285396723208,
    ];
    let rr = 1.0;

    if q.is_nan() || df < 2.0 || k < 2.0 {
        return f64::NAN;
    }
    if q <= 0.0 {
        return 0.0;
    }
    if q.is_infinite() {
        return 1.0;
    }
    if df > DLARG {
        return wprob(q, rr, k);
    }

    let f2 = df * 0.5;
    let mut f2lf = f2 * df.ln() - df * std::f64::consts::LN_2 - ln_gamma(f2);
    let f21 = f2 - 1.0;
    let ff4 = df * 0.25;
    let ulen: f64 = if df <= 100.0 {
        1.0
    } else if df <= 800.0 {
        0.5
    } else if df <= 5000.0 {
        0.25
    } else {
        0.125
    };
    f2lf += ulen.ln();

    let mut ans = 0.0;
    for i in 1..=50 {
        let mut otsum = 0.0;
        let twa1 = (2 * i - 1) as f64 * ulen;

        for jj in 1..=NLEGQ {
            let (j, t1) = if IHALFQ < jj {
                let j = jj - IHALFQ - 1;
                (
                    j,
                    f2lf + f21 * (twa1 + XLEGQ[j] * ulen).ln() - (XLEGQ[j] * ulen + twa1) * ff4,
                )
            } else {
                let j = jj - 1;
                (
                    j,
                    f2lf + f21 * (twa1 - XLEGQ[j] * ulen).ln() + (XLEGQ[j] * ulen - twa1) * ff4,
                )
            };

            if t1 >= EPS1 {
                let qsqz = if IHALFQ < jj {
                    q * ((XLEGQ[j] * ulen + twa1) * 0.5).sqrt()
                } else {
                    q * ((-(XLEGQ[j] * ulen) + twa1) * 0.5).sqrt()
                };
                otsum += wprob(qsqz, rr, k) * ALEGQ[j] * t1.exp();
            }
        }

        if i as f64 * ulen >= 1.0 && otsum <= EPS2 {
            break;
        }
        ans += otsum;
    }
    ans.min(1.0)
}

/// Quantile of the studentized range distribution.
pub fn studentized_range_ppf(p: f64, k: f64, df: f64) -> f64 {
    if !(0.0..1.0).contains(&p) {
        return f64::NAN;
    }
    let mut hi = 10.0;
    while studentized_range_cdf(hi, k, df) < p && hi < 1e4 {
        hi *= 2.0;
    }
    bisect(|q| studentized_range_cdf(q, k, df) - p, 0.0, hi)
}

// ─── Root finding ────────────────────────────────────────────────────

/// Bisection for a monotone increasing function with a sign change on [lo, hi].
pub(crate) fn bisect<F: Fn(f64) -> f64>(f: F, mut lo: f64, mut hi: f64) -> f64 {
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if f(mid) < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if (hi - lo).abs() <= 1e-12 * (1.0 + mid.abs()) {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    // ─── Gamma / beta ────────────────────────────────────────────

    #[test]
    fn ln_gamma_known_values() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-12));
        assert!(close(ln_gamma(5.0), 24f64.ln(), 1e-12));
        assert!(close(ln_gamma(0.5), PI.sqrt().ln(), 1e-12));
    }

    #[test]
    fn incomplete_beta_symmetry() {
        let a = 2.5;
        let b = 4.0;
        let x = 0.3;
        let lhs = regularized_incomplete_beta(a, b, x);
        let rhs = 1.0 - regularized_incomplete_beta(b, a, 1.0 - x);
        assert!(close(lhs, rhs, 1e-12));
    }

    #[test]
    fn incomplete_gamma_exponential_case() {
        // P(1, x) = 1 - e^-x
        assert!(close(regularized_gamma_p(1.0, 2.0), 1.0 - (-2.0f64).exp(), 1e-12));
        assert!(close(regularized_gamma_q(1.0, 10.0), (-10.0f64).exp(), 1e-14));
    }

    // ─── Normal ──────────────────────────────────────────────────

    #[test]
    fn normal_cdf_reference_points() {
        assert!(close(normal_cdf(0.0), 0.5, 1e-14));
        assert!(close(normal_cdf(1.959963984540054), 0.975, 1e-10));
        assert!(close(normal_sf(3.0), 0.0013498980316301, 1e-13));
        assert!(close(normal_sf(6.0), 9.865876450377e-10, 1e-18));
    }

    #[test]
    fn normal_ppf_inverts_cdf() {
        for &p in &[1e-9, 0.001, 0.02, 0.3, 0.5, 0.8, 0.99, 1.0 - 1e-7] {
            assert!(close(normal_cdf(normal_ppf(p)), p, 1e-12 + p * 1e-9), "p={p}");
        }
        assert!(close(normal_ppf(0.975), 1.959963984540054, 1e-9));
    }

    // ─── t / F / chi-square ──────────────────────────────────────

    #[test]
    fn t_cdf_and_ppf_agree() {
        assert!(close(t_cdf(2.0, 10.0), 0.963305982614, 1e-9));
        assert!(close(t_ppf(0.975, 10.0), 2.228138851986, 1e-8));
        assert!(close(t_ppf(0.025, 4.0), -2.776445105198, 1e-8));
    }

    #[test]
    fn t_p_value_alternatives() {
        let two = t_p_value(2.0, 10.0, Alternative::TwoSided);
        let greater = t_p_value(2.0, 10.0, Alternative::Greater);
        let less = t_p_value(2.0, 10.0, Alternative::Less);
        assert!(close(two, 2.0 * greater, 1e-14));
        assert!(close(less + greater, 1.0, 1e-14));
    }

    #[test]
    fn f_and_chi2_reference_points() {
        // F(2, 10) at 4.10 is close to the 5% critical value
        assert!(close(f_sf(4.102821, 2.0, 10.0), 0.05, 1e-6));
        assert!(close(chi2_sf(3.841458820694124, 1.0), 0.05, 1e-10));
        assert!(close(chi2_sf(2.0, 2.0), (-1.0f64).exp(), 1e-12));
    }

    // ─── Studentized range ───────────────────────────────────────

    #[test]
    fn studentized_range_critical_values() {
        // Tabulated q(0.95; k=3, df=10) = 3.877, q(0.95; k=4, df=20) = 3.958
        assert!(close(studentized_range_cdf(3.877, 3.0, 10.0), 0.95, 5e-4));
        assert!(close(studentized_range_ppf(0.95, 4.0, 20.0), 3.958, 5e-3));
        assert!(close(studentized_range_ppf(0.95, 3.0, 12.0), 3.773, 5e-3));
        assert!(close(studentized_range_ppf(0.95, 10.0, 60.0), 4.646, 5e-3));
    }

    #[test]
    fn studentized_range_large_df_approaches_normal_range() {
        // q(0.95; k=3, df=120) = 3.356; df=inf limit is 3.314
        assert!(close(studentized_range_ppf(0.95, 3.0, 120.0), 3.356, 5e-3));
        let q1000 = studentized_range_ppf(0.95, 3.0, 1000.0);
        assert!(q1000 > 3.30 && q1000 < 3.33, "q {q1000}");
    }

    #[test]
    fn studentized_range_is_monotone() {
        let a = studentized_range_cdf(1.0, 3.0, 12.0);
        let b = studentized_range_cdf(2.0, 3.0, 12.0);
        let c = studentized_range_cdf(5.0, 3.0, 12.0);
        assert!(a < b && b < c && c <= 1.0);
    }
}
