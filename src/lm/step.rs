//! Step calculation for the Levenberg-Marquardt algorithm.
//!
//! Solves the damped normal equations `(JᵀJ + λI) δ = -Jᵀr` in the scaled
//! parameter space.

use ndarray::{Array1, Array2};

use crate::error::{ItcError, Result};

/// Handles step calculation for the Levenberg-Marquardt algorithm.
pub struct LmStep;

impl LmStep {
    /// Calculate the step for Jacobian `j`, residuals `r` and damping `lambda`.
    ///
    /// Tries a Cholesky factorisation first and falls back to Gaussian
    /// elimination with partial pivoting.
    pub fn calculate_step(j: &Array2<f64>, r: &Array1<f64>, lambda: f64) -> Result<Array1<f64>> {
        let mut a = j.t().dot(j);
        for i in 0..a.nrows() {
            a[[i, i]] += lambda;
        }
        let rhs = -j.t().dot(r);

        match Self::solve_cholesky(&a, &rhs) {
            Some(step) => Ok(step),
            None => Self::solve_gaussian(&a, &rhs),
        }
    }

    /// Solve `a x = b` for symmetric positive definite `a`.
    pub fn solve_cholesky(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
        let n = a.nrows();
        let mut l: Array2<f64> = Array2::zeros((n, n));

        for i in 0..n {
            for j in 0..=i {
                let mut sum = a[[i, j]];
                for k in 0..j {
                    sum -= l[[i, k]] * l[[j, k]];
                }
                if i == j {
                    if !(sum > 0.0) {
                        return None;
                    }
                    l[[i, i]] = sum.sqrt();
                } else {
                    l[[i, j]] = sum / l[[j, j]];
                }
            }
        }

        // Forward substitution (L * y = b)
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let mut sum = b[i];
            for k in 0..i {
                sum -= l[[i, k]] * y[k];
            }
            y[i] = sum / l[[i, i]];
        }

        // Backward substitution (L^T * x = y)
        let mut x = Array1::zeros(n);
        for i in (0..n).rev() {
            let mut sum = y[i];
            for k in (i + 1)..n {
                sum -= l[[k, i]] * x[k];
            }
            x[i] = sum / l[[i, i]];
        }

        Some(x)
    }

    /// Solve `a x = b` by Gaussian elimination with partial pivoting.
    pub fn solve_gaussian(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
        let n = a.nrows();
        let mut m = a.clone();
        let mut rhs = b.clone();

        for col in 0..n {
            let pivot = (col..n)
                .max_by(|&p, &q| {
                    m[[p, col]]
                        .abs()
                        .partial_cmp(&m[[q, col]].abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(col);

            if m[[pivot, col]].abs() < 1e-300 {
                return Err(ItcError::Other("singular matrix in LM step".to_string()));
            }

            if pivot != col {
                for k in 0..n {
                    m.swap([col, k], [pivot, k]);
                }
                rhs.swap(col, pivot);
            }

            for row in (col + 1)..n {
                let factor = m[[row, col]] / m[[col, col]];
                for k in col..n {
                    m[[row, k]] -= factor * m[[col, k]];
                }
                rhs[row] -= factor * rhs[col];
            }
        }

        let mut x = Array1::zeros(n);
        for i in (0..n).rev() {
            let mut sum = rhs[i];
            for k in (i + 1)..n {
                sum -= m[[i, k]] * x[k];
            }
            x[i] = sum / m[[i, i]];
        }

        Ok(x)
    }
}
