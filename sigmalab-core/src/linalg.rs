//! Small dense linear algebra for model fitting.
//!
//! Designs here are tall and narrow (tens of columns at most), so normal
//! equations with Gauss-Jordan inversion are adequate for inference, and a
//! rank-revealing Gram-Schmidt projection handles nested-model comparisons
//! where dummy columns can be collinear.

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Build an `n x columns.len()` matrix from column vectors of length `n`.
    pub fn from_columns(columns: &[Vec<f64>]) -> Self {
        let rows = columns.first().map(Vec::len).unwrap_or(0);
        let cols = columns.len();
        let mut m = Self::zeros(rows, cols);
        for (j, col) in columns.iter().enumerate() {
            for (i, v) in col.iter().enumerate().take(rows) {
                m.set(i, j, *v);
            }
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: f64) {
        self.data[i * self.cols + j] = v;
    }

    /// `Xᵀ W X` with optional diagonal weights.
    pub fn weighted_gram(&self, weights: Option<&[f64]>) -> Matrix {
        let mut g = Matrix::zeros(self.cols, self.cols);
        for a in 0..self.cols {
            for b in a..self.cols {
                let mut s = 0.0;
                for i in 0..self.rows {
                    let w = weights.map_or(1.0, |w| w[i]);
                    s += w * self.get(i, a) * self.get(i, b);
                }
                g.set(a, b, s);
                g.set(b, a, s);
            }
        }
        g
    }

    pub fn gram(&self) -> Matrix {
        self.weighted_gram(None)
    }

    /// `Xᵀ v`.
    pub fn transpose_mul_vec(&self, v: &[f64]) -> Vec<f64> {
        (0..self.cols)
            .map(|j| (0..self.rows).map(|i| self.get(i, j) * v[i]).sum())
            .collect()
    }

    /// `X v`.
    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        (0..self.rows)
            .map(|i| (0..self.cols).map(|j| self.get(i, j) * v[j]).sum())
            .collect()
    }

    /// Inverse of a square matrix by Gauss-Jordan with partial pivoting.
    ///
    /// `None` when a pivot falls below a scale-relative tolerance.
    pub fn inverse(&self) -> Option<Matrix> {
        if self.rows != self.cols {
            return None;
        }
        let n = self.rows;
        let scale = self
            .data
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()))
            .max(f64::MIN_POSITIVE);
        let tol = scale * 1e-12;
        let mut a = self.clone();
        let mut inv = Matrix::identity(n);

        for col in 0..n {
            let pivot_row = (col..n).max_by(|&x, &y| {
                a.get(x, col)
                    .abs()
                    .partial_cmp(&a.get(y, col).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
            if a.get(pivot_row, col).abs() < tol {
                return None;
            }
            if pivot_row != col {
                a.swap_rows(pivot_row, col);
                inv.swap_rows(pivot_row, col);
            }
            let p = a.get(col, col);
            for j in 0..n {
                a.set(col, j, a.get(col, j) / p);
                inv.set(col, j, inv.get(col, j) / p);
            }
            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a.get(r, col);
                if factor == 0.0 {
                    continue;
                }
                for j in 0..n {
                    a.set(r, j, a.get(r, j) - factor * a.get(col, j));
                    inv.set(r, j, inv.get(r, j) - factor * inv.get(col, j));
                }
            }
        }
        Some(inv)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for j in 0..self.cols {
            self.data.swap(a * self.cols + j, b * self.cols + j);
        }
    }
}

/// Projection of `y` onto the span of a set of columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub fitted: Vec<f64>,
    pub rss: f64,
    /// Number of linearly independent columns retained.
    pub rank: usize,
}

/// Project `y` onto `columns` with modified Gram-Schmidt, dropping columns
/// that are numerically dependent on earlier ones.
pub fn project(y: &[f64], columns: &[Vec<f64>]) -> Projection {
    let n = y.len();
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(columns.len());
    for col in columns {
        let original = norm(col);
        if original == 0.0 {
            continue;
        }
        let mut v = col.clone();
        for q in &basis {
            let d = dot(q, &v);
            for (vi, qi) in v.iter_mut().zip(q) {
                *vi -= d * qi;
            }
        }
        let remaining = norm(&v);
        if remaining <= original * 1e-10 {
            continue;
        }
        for vi in v.iter_mut() {
            *vi /= remaining;
        }
        basis.push(v);
    }

    let mut fitted = vec![0.0; n];
    for q in &basis {
        let d = dot(q, y);
        for (f, qi) in fitted.iter_mut().zip(q) {
            *f += d * qi;
        }
    }
    let rss = y.iter().zip(&fitted).map(|(a, b)| (a - b).powi(2)).sum();
    Projection {
        fitted,
        rss,
        rank: basis.len(),
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
