//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! The calorimetry objective reaches the optimizer as a single scalar residual
//! (the RMSD), so the settings here revolve around the numerical Jacobian step
//! and the stopping tolerance on the scaled step.

use serde::{Deserialize, Serialize};

use crate::error::{ItcError, Result};

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of iterations. Default: 1000
    pub max_iterations: usize,

    /// Relative step for the forward-difference Jacobian, applied to the
    /// parameter scale. Default: 1e-6
    pub diff_step: f64,

    /// Convergence threshold on the infinity norm of the scaled step. Default: 1e-10
    pub epsilon: f64,

    /// Tolerance for relative change in the cost. Default: 1e-12
    pub ftol: f64,

    /// Tolerance for the scaled gradient norm. Default: 1e-14
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-12
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e12
    pub max_lambda: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            diff_step: 1e-6,
            epsilon: 1e-10,
            ftol: 1e-12,
            gtol: 1e-14,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e12,
        }
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ItcError::InvalidConfiguration(format!(
            "LM {} must be positive, got {}",
            name, value
        )))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ItcError::InvalidConfiguration(format!(
            "LM {} must be non-negative, got {}",
            name, value
        )))
    }
}

impl LmConfig {
    /// Reject settings the iteration cannot run with.
    pub fn validate(&self) -> Result<()> {
        positive("diff_step", self.diff_step)?;
        non_negative("epsilon", self.epsilon)?;
        non_negative("ftol", self.ftol)?;
        non_negative("gtol", self.gtol)?;
        positive("initial_lambda", self.initial_lambda)?;
        positive("min_lambda", self.min_lambda)?;
        if self.lambda_up_factor <= 1.0 {
            return Err(ItcError::InvalidConfiguration(format!(
                "LM lambda_up_factor must exceed 1, got {}",
                self.lambda_up_factor
            )));
        }
        if !(self.lambda_down_factor > 0.0 && self.lambda_down_factor < 1.0) {
            return Err(ItcError::InvalidConfiguration(format!(
                "LM lambda_down_factor must lie in (0, 1), got {}",
                self.lambda_down_factor
            )));
        }
        if !(self.min_lambda <= self.max_lambda) {
            return Err(ItcError::InvalidConfiguration(format!(
                "LM lambda range [{}, {}] is empty",
                self.min_lambda, self.max_lambda
            )));
        }
        Ok(())
    }
}
