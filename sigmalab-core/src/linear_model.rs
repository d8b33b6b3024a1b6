//! Linear and logistic model fitting.
//!
//! - [`Ols`]: ordinary least squares with a constant term and full inference
//! - [`Logit`]: binary logistic regression by Newton-Raphson (IRLS)
//! - [`type2_anova`]: Type-II sums of squares for categorical factors and
//!   their interactions, built on nested-model projections
//! - [`vif`] and [`durbin_watson`] diagnostics

use crate::dist::{self, Alternative};
use crate::linalg::{self, Matrix};
use crate::sample;
use std::f64::consts::PI;

// ─── Ordinary least squares ──────────────────────────────────────────

/// Fitted OLS model. Coefficient vectors are ordered constant first.
#[derive(Debug, Clone, PartialEq)]
pub struct Ols {
    pub params: Vec<f64>,
    pub bse: Vec<f64>,
    pub tvalues: Vec<f64>,
    pub pvalues: Vec<f64>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub nobs: usize,
    pub df_model: f64,
    pub df_resid: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub llf: f64,
    pub aic: f64,
    pub bic: f64,
}

impl Ols {
    /// Fit `y ~ 1 + predictors`. `None` when the design is singular.
    pub fn fit(y: &[f64], predictors: &[Vec<f64>]) -> Option<Self> {
        let n = y.len();
        let mut columns = Vec::with_capacity(predictors.len() + 1);
        columns.push(vec![1.0; n]);
        columns.extend(predictors.iter().cloned());
        let x = Matrix::from_columns(&columns);
        let k = x.cols();

        let xtx_inv = x.gram().inverse()?;
        let params = xtx_inv.mul_vec(&x.transpose_mul_vec(y));
        let fitted = x.mul_vec(&params);
        let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, b)| a - b).collect();

        let ssr: f64 = residuals.iter().map(|r| r * r).sum();
        let tss = sample::sum_sq_dev(y);
        let nf = n as f64;
        let df_model = (k - 1) as f64;
        let df_resid = nf - k as f64;

        let sigma2 = if df_resid > 0.0 { ssr / df_resid } else { f64::NAN };
        let bse: Vec<f64> = (0..k).map(|i| (sigma2 * xtx_inv.get(i, i)).sqrt()).collect();
        let tvalues: Vec<f64> = params.iter().zip(&bse).map(|(b, s)| b / s).collect();
        let pvalues: Vec<f64> = tvalues
            .iter()
            .map(|t| dist::t_p_value(*t, df_resid, Alternative::TwoSided))
            .collect();

        let r_squared = if tss > 0.0 { 1.0 - ssr / tss } else { f64::NAN };
        let adj_r_squared = 1.0 - (nf - 1.0) / df_resid * (1.0 - r_squared);
        let ess = tss - ssr;
        let f_statistic = (ess / df_model) / (ssr / df_resid);
        let f_p_value = if f_statistic.is_nan() {
            f64::NAN
        } else {
            dist::f_sf(f_statistic, df_model, df_resid)
        };
        let llf = -nf / 2.0 * (2.0 * PI).ln() - nf / 2.0 * (ssr / nf).ln() - nf / 2.0;
        let aic = -2.0 * llf + 2.0 * k as f64;
        let bic = -2.0 * llf + nf.ln() * k as f64;

        Some(Self {
            params,
            bse,
            tvalues,
            pvalues,
            fitted,
            residuals,
            nobs: n,
            df_model,
            df_resid,
            r_squared,
            adj_r_squared,
            f_statistic,
            f_p_value,
            llf,
            aic,
            bic,
        })
    }

    /// Two-sided `1 - alpha` confidence interval for each coefficient.
    pub fn conf_int(&self, alpha: f64) -> Vec<(f64, f64)> {
        let q = dist::t_ppf(1.0 - alpha / 2.0, self.df_resid);
        self.params
            .iter()
            .zip(&self.bse)
            .map(|(b, s)| (b - q * s, b + q * s))
            .collect()
    }
}

/// Durbin-Watson statistic of a residual series.
pub fn durbin_watson(residuals: &[f64]) -> f64 {
    let num: f64 = residuals.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    let den: f64 = residuals.iter().map(|r| r * r).sum();
    if den == 0.0 {
        return f64::NAN;
    }
    num / den
}

/// Variance inflation factor of predictor `index` against the others.
pub fn vif(predictors: &[Vec<f64>], index: usize) -> f64 {
    let target = &predictors[index];
    let others: Vec<Vec<f64>> = predictors
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, c)| c.clone())
        .collect();
    let n = target.len();
    let mut columns = vec![vec![1.0; n]];
    columns.extend(others);
    let proj = linalg::project(target, &columns);
    let tss = sample::sum_sq_dev(target);
    if tss == 0.0 {
        return f64::INFINITY;
    }
    let r2 = 1.0 - proj.rss / tss;
    1.0 / (1.0 - r2)
}

// ─── Logistic regression ─────────────────────────────────────────────

const LOGIT_MAX_ITER: usize = 35;
const LOGIT_TOL: f64 = 1e-8;

/// Why a logistic fit could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogitFailure {
    Singular,
    NotConverged,
    PerfectSeparation,
}

impl std::fmt::Display for LogitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogitFailure::Singular => write!(f, "Singular design matrix in logistic regression"),
            LogitFailure::NotConverged => {
                write!(f, "Logistic regression did not converge within {LOGIT_MAX_ITER} iterations")
            }
            LogitFailure::PerfectSeparation => write!(
                f,
                "Perfect separation detected; the outcome is completely predicted by the predictors"
            ),
        }
    }
}

/// Fitted logit model. Coefficient vectors are ordered constant first.
#[derive(Debug, Clone, PartialEq)]
pub struct Logit {
    pub params: Vec<f64>,
    pub bse: Vec<f64>,
    pub zvalues: Vec<f64>,
    pub pvalues: Vec<f64>,
    pub predicted: Vec<f64>,
    pub llf: f64,
    pub llnull: f64,
    pub pseudo_r_squared: f64,
    pub aic: f64,
    pub bic: f64,
    pub iterations: usize,
}

impl Logit {
    pub fn fit(y: &[f64], predictors: &[Vec<f64>]) -> Result<Self, LogitFailure> {
        let n = y.len();
        let mut columns = Vec::with_capacity(predictors.len() + 1);
        columns.push(vec![1.0; n]);
        columns.extend(predictors.iter().cloned());
        let x = Matrix::from_columns(&columns);
        let k = x.cols();

        let mut beta = vec![0.0; k];
        let mut converged = false;
        let mut iterations = 0;
        let mut cov = None;
        for iter in 0..LOGIT_MAX_ITER {
            iterations = iter + 1;
            let p = predict(&x, &beta);
            let weights: Vec<f64> = p.iter().map(|pi| pi * (1.0 - pi)).collect();
            let resid: Vec<f64> = y.iter().zip(&p).map(|(yi, pi)| yi - pi).collect();
            let grad = x.transpose_mul_vec(&resid);
            let hess_inv = x
                .weighted_gram(Some(&weights))
                .inverse()
                .ok_or(LogitFailure::Singular)?;
            let step = hess_inv.mul_vec(&grad);
            let max_step = step.iter().fold(0.0f64, |m, s| m.max(s.abs()));
            for (b, s) in beta.iter_mut().zip(&step) {
                *b += s;
            }
            if !beta.iter().all(|b| b.is_finite()) {
                return Err(LogitFailure::NotConverged);
            }
            if max_step < LOGIT_TOL {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(LogitFailure::NotConverged);
        }

        let predicted = predict(&x, &beta);
        if predicted.iter().all(|p| *p < 1e-10 || *p > 1.0 - 1e-10) {
            return Err(LogitFailure::PerfectSeparation);
        }
        let weights: Vec<f64> = predicted.iter().map(|pi| pi * (1.0 - pi)).collect();
        if let Some(inv) = x.weighted_gram(Some(&weights)).inverse() {
            cov = Some(inv);
        }
        let cov = cov.ok_or(LogitFailure::Singular)?;

        let bse: Vec<f64> = (0..k).map(|i| cov.get(i, i).sqrt()).collect();
        let zvalues: Vec<f64> = beta.iter().zip(&bse).map(|(b, s)| b / s).collect();
        let pvalues: Vec<f64> = zvalues
            .iter()
            .map(|z| dist::z_p_value(*z, Alternative::TwoSided))
            .collect();

        let llf = log_likelihood(y, &predicted);
        let ybar = sample::mean(y);
        let llnull = log_likelihood(y, &vec![ybar; n]);
        let pseudo_r_squared = 1.0 - llf / llnull;
        let nf = n as f64;
        let aic = -2.0 * llf + 2.0 * k as f64;
        let bic = -2.0 * llf + nf.ln() * k as f64;

        Ok(Self {
            params: beta,
            bse,
            zvalues,
            pvalues,
            predicted,
            llf,
            llnull,
            pseudo_r_squared,
            aic,
            bic,
            iterations,
        })
    }

    pub fn conf_int(&self, alpha: f64) -> Vec<(f64, f64)> {
        let q = dist::normal_ppf(1.0 - alpha / 2.0);
        self.params
            .iter()
            .zip(&self.bse)
            .map(|(b, s)| (b - q * s, b + q * s))
            .collect()
    }
}

fn predict(x: &Matrix, beta: &[f64]) -> Vec<f64> {
    x.mul_vec(beta)
        .into_iter()
        .map(|eta| 1.0 / (1.0 + (-eta).exp()))
        .collect()
}

fn log_likelihood(y: &[f64], p: &[f64]) -> f64 {
    y.iter()
        .zip(p)
        .map(|(yi, pi)| {
            let pi = pi.clamp(1e-300, 1.0 - 1e-16);
            yi * pi.ln() + (1.0 - yi) * (1.0 - pi).ln()
        })
        .sum()
}

// ─── Type-II ANOVA ───────────────────────────────────────────────────

/// A categorical factor: per-row level codes into a sorted level list.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub name: String,
    pub levels: Vec<String>,
    pub codes: Vec<usize>,
}

impl Factor {
    /// Encode row labels; levels are sorted lexically.
    pub fn from_labels(name: impl Into<String>, labels: &[String]) -> Self {
        let mut levels: Vec<String> = labels.to_vec();
        levels.sort();
        levels.dedup();
        let codes = labels
            .iter()
            .map(|l| levels.binary_search(l).unwrap_or(0))
            .collect();
        Self {
            name: name.into(),
            levels,
            codes,
        }
    }

    /// Treatment-coded dummy columns (first level is the reference).
    fn dummies(&self) -> Vec<Vec<f64>> {
        (1..self.levels.len())
            .map(|lvl| {
                self.codes
                    .iter()
                    .map(|&c| if c == lvl { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect()
    }
}

/// A model term: one factor (main effect) or several (interaction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub factors: Vec<usize>,
}

impl Term {
    pub fn main(i: usize) -> Self {
        Self { factors: vec![i] }
    }

    pub fn interaction(i: usize, j: usize) -> Self {
        Self {
            factors: vec![i, j],
        }
    }

    fn contains(&self, other: &Term) -> bool {
        other.factors.iter().all(|f| self.factors.contains(f))
    }

    pub fn label(&self, factors: &[Factor]) -> String {
        self.factors
            .iter()
            .map(|&i| factors[i].name.as_str())
            .collect::<Vec<_>>()
            .join(":")
    }

    fn columns(&self, factors: &[Factor]) -> Vec<Vec<f64>> {
        let mut cols: Vec<Vec<f64>> = vec![vec![1.0; factors[self.factors[0]].codes.len()]];
        for &fi in &self.factors {
            let dummies = factors[fi].dummies();
            let mut next = Vec::with_capacity(cols.len() * dummies.len());
            for c in &cols {
                for d in &dummies {
                    next.push(c.iter().zip(d).map(|(a, b)| a * b).collect());
                }
            }
            cols = next;
        }
        cols
    }
}

/// One row of an ANOVA table. `f` and `p` are `None` when the residual
/// has no degrees of freedom.
#[derive(Debug, Clone, PartialEq)]
pub struct AnovaRow {
    pub term: String,
    pub sum_sq: f64,
    pub df: f64,
    pub f: Option<f64>,
    pub p: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnovaTable {
    /// Term rows in model order, followed by the `Residual` row.
    pub rows: Vec<AnovaRow>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub residual_ss: f64,
    pub residual_df: f64,
}

impl AnovaTable {
    pub fn row(&self, term: &str) -> Option<&AnovaRow> {
        self.rows.iter().find(|r| r.term == term)
    }
}

fn design(factors: &[Factor], terms: &[&Term]) -> Vec<Vec<f64>> {
    let n = factors.first().map(|f| f.codes.len()).unwrap_or(0);
    let mut cols = vec![vec![1.0; n]];
    for t in terms {
        cols.extend(t.columns(factors));
    }
    cols
}

/// Type-II ANOVA of `y` over `terms`.
///
/// Each term's sum of squares is the reduction in residual sum of squares
/// from adding it to the model made of every term that does not contain it.
pub fn type2_anova(y: &[f64], factors: &[Factor], terms: &[Term]) -> AnovaTable {
    let n = y.len() as f64;
    let all: Vec<&Term> = terms.iter().collect();
    let full = linalg::project(y, &design(factors, &all));
    let residual_df = n - full.rank as f64;
    let ms_resid = if residual_df > 0.0 {
        full.rss / residual_df
    } else {
        f64::NAN
    };

    let mut rows = Vec::with_capacity(terms.len() + 1);
    for term in terms {
        let reduced: Vec<&Term> = terms
            .iter()
            .filter(|u| *u != term && !u.contains(term))
            .collect();
        let mut with_term = reduced.clone();
        with_term.push(term);
        let base = linalg::project(y, &design(factors, &reduced));
        let augmented = linalg::project(y, &design(factors, &with_term));
        let sum_sq = (base.rss - augmented.rss).max(0.0);
        let df = (augmented.rank - base.rank) as f64;
        let (f, p) = if residual_df > 0.0 && df > 0.0 && ms_resid > 0.0 {
            let f = (sum_sq / df) / ms_resid;
            (Some(f), Some(dist::f_sf(f, df, residual_df)))
        } else {
            (None, None)
        };
        rows.push(AnovaRow {
            term: term.label(factors),
            sum_sq,
            df,
            f,
            p,
        });
    }
    rows.push(AnovaRow {
        term: "Residual".to_string(),
        sum_sq: full.rss,
        df: residual_df,
        f: None,
        p: None,
    });

    let tss = sample::sum_sq_dev(y);
    let r_squared = if tss > 0.0 { 1.0 - full.rss / tss } else { f64::NAN };
    let adj_r_squared = if residual_df > 0.0 {
        1.0 - (1.0 - r_squared) * (n - 1.0) / residual_df
    } else {
        f64::NAN
    };
    AnovaTable {
        rows,
        r_squared,
        adj_r_squared,
        residual_ss: full.rss,
        residual_df,
    }
}
