//! Least-squares problem definition used by the Levenberg-Marquardt backend.
//!
//! This module defines the `Problem` trait, which represents a nonlinear
//! least squares problem, and [`ScalarObjective`], which presents a scalar
//! loss (an RMSD) as a problem with a single residual.

use ndarray::{Array1, Array2};

use crate::error::{ItcError, Result};

/// A trait representing a nonlinear least squares problem.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the residuals
    ///
    /// # Returns
    ///
    /// * A vector of residuals, or an error if the evaluation fails
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the Jacobian matrix at the given parameters.
    ///
    /// The default implementation uses forward finite differences with a
    /// relative step of `1e-8`.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        crate::utils::finite_difference::jacobian(self, params, None)
    }

    /// Evaluate the sum of squared residuals at the given parameters.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}

/// A scalar objective seen as a one-residual least-squares problem.
///
/// Minimizing the squared residual minimizes the objective as long as the
/// objective is non-negative, which holds for RMSD-type losses.
pub struct ScalarObjective<'a> {
    objective: &'a dyn Fn(&[f64]) -> f64,
    parameter_count: usize,
}

impl<'a> ScalarObjective<'a> {
    /// Wrap `objective` taking `parameter_count` parameters.
    pub fn new(objective: &'a dyn Fn(&[f64]) -> f64, parameter_count: usize) -> Self {
        Self {
            objective,
            parameter_count,
        }
    }
}

impl Problem for ScalarObjective<'_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != self.parameter_count {
            return Err(ItcError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.parameter_count,
                params.len()
            )));
        }

        let value = match params.as_slice() {
            Some(slice) => (self.objective)(slice),
            None => (self.objective)(&params.to_vec()),
        };
        Ok(Array1::from_elem(1, value))
    }

    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn residual_count(&self) -> usize {
        1
    }
}
