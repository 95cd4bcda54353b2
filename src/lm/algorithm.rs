//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! The implementation works in scaled coordinates `y = x / s`, where the scale
//! vector `s` is the magnitude of the initial guess, and projects every trial
//! point onto the box constraints.

use std::fmt;

use ndarray::Array1;

use crate::error::{ItcError, Result};
use crate::events::CancellationToken;
use crate::optimizer::ConvergenceStatus;
use crate::problem::Problem;
use crate::utils::finite_difference::jacobian_bounded;

use super::config::LmConfig;
use super::step::LmStep;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// How the run terminated
    pub status: ConvergenceStatus,

    /// A message describing the result
    pub message: String,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Status: {}", self.status.description())?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the relative finite-difference step.
    pub fn with_diff_step(mut self, diff_step: f64) -> Self {
        self.config.diff_step = diff_step;
        self
    }

    /// Set the convergence threshold on the scaled step.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.config.epsilon = epsilon;
        self
    }

    /// Minimize the sum of squared residuals inside the box `[lower, upper]`.
    ///
    /// A step that cannot lower the cost even at maximum damping ends the run
    /// as converged: the current point is stationary to numerical precision.
    /// Running out of iterations is reported as
    /// [`ConvergenceStatus::MaxIterationsReached`].
    pub fn minimize_bounded<P: Problem>(
        &self,
        problem: &P,
        initial_params: &Array1<f64>,
        lower: &[f64],
        upper: &[f64],
        cancel: Option<&CancellationToken>,
    ) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params || lower.len() != n_params || upper.len() != n_params
        {
            return Err(ItcError::DimensionMismatch(format!(
                "Expected {} parameters and bounds, got {}, {} and {}",
                n_params,
                initial_params.len(),
                lower.len(),
                upper.len()
            )));
        }

        let project = |x: &mut Array1<f64>| {
            for (j, value) in x.iter_mut().enumerate() {
                *value = value.max(lower[j]).min(upper[j]);
            }
        };

        // Scale vector from the initial guess
        let scale: Array1<f64> = initial_params
            .iter()
            .map(|v| if v.abs() > 0.0 && v.is_finite() { v.abs() } else { 1.0 })
            .collect();
        let fd_steps: Vec<f64> = scale.iter().map(|s| s * self.config.diff_step).collect();

        let mut params = initial_params.clone();
        project(&mut params);

        let mut residuals = problem.eval(&params)?;
        let mut cost: f64 = residuals.iter().map(|r| r.powi(2)).sum();
        let mut func_evals = 1;
        let mut iterations = 0;
        let mut lambda = self.config.initial_lambda;

        let finish = |params: Array1<f64>,
                      cost: f64,
                      iterations: usize,
                      func_evals: usize,
                      status: ConvergenceStatus,
                      message: String| LmResult {
            params,
            cost,
            iterations,
            func_evals,
            status,
            message,
        };

        if !cost.is_finite() {
            return Ok(finish(
                params,
                cost,
                0,
                func_evals,
                ConvergenceStatus::NumericalError,
                "Non-finite cost at the initial point".to_string(),
            ));
        }

        loop {
            if cost == 0.0 {
                return Ok(finish(
                    params,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::FunctionValueConvergence,
                    "Exact fit: zero cost".to_string(),
                ));
            }

            if cancel.map_or(false, |c| c.is_cancelled()) {
                return Ok(finish(
                    params,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::Cancelled,
                    "Cancelled".to_string(),
                ));
            }

            if iterations >= self.config.max_iterations {
                return Ok(finish(
                    params,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::MaxIterationsReached,
                    format!("Maximum iterations ({}) reached", self.config.max_iterations),
                ));
            }

            let jacobian = jacobian_bounded(problem, &params, &residuals, &fd_steps, upper)?;
            func_evals += n_params;

            // Jacobian in scaled coordinates: J * diag(s)
            let mut j_scaled = jacobian;
            for (col, s) in scale.iter().enumerate() {
                j_scaled.column_mut(col).mapv_inplace(|v| v * s);
            }

            let gradient = j_scaled.t().dot(&residuals);
            let gradient_norm = gradient.iter().fold(0.0f64, |m, g| m.max(g.abs()));
            if gradient_norm <= self.config.gtol {
                return Ok(finish(
                    params,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::GradientConvergence,
                    format!(
                        "Gradient convergence: ||g|| = {:.2e} <= {:.2e}",
                        gradient_norm, self.config.gtol
                    ),
                ));
            }

            loop {
                let step = LmStep::calculate_step(&j_scaled, &residuals, lambda)?;

                let mut new_params = &params + &(&step * &scale);
                project(&mut new_params);

                let scaled_change = new_params
                    .iter()
                    .zip(params.iter())
                    .zip(scale.iter())
                    .map(|((a, b), s)| ((a - b) / s).abs())
                    .fold(0.0f64, f64::max);
                if scaled_change <= self.config.epsilon {
                    return Ok(finish(
                        params,
                        cost,
                        iterations,
                        func_evals,
                        ConvergenceStatus::ParameterConvergence,
                        format!(
                            "Parameter convergence: |dx/s| = {:.2e} <= {:.2e}",
                            scaled_change, self.config.epsilon
                        ),
                    ));
                }

                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                let new_cost: f64 = new_residuals.iter().map(|r| r.powi(2)).sum();

                if new_cost.is_finite() && new_cost < cost {
                    let cost_change = (cost - new_cost) / cost.max(f64::MIN_POSITIVE);
                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);
                    iterations += 1;

                    if cost_change <= self.config.ftol {
                        return Ok(finish(
                            params,
                            cost,
                            iterations,
                            func_evals,
                            ConvergenceStatus::FunctionValueConvergence,
                            format!(
                                "Cost convergence: |df|/|f| = {:.2e} <= {:.2e}",
                                cost_change, self.config.ftol
                            ),
                        ));
                    }
                    break;
                }

                // Step rejected - increase lambda and try again
                lambda *= self.config.lambda_up_factor;
                if lambda > self.config.max_lambda {
                    return Ok(finish(
                        params,
                        cost,
                        iterations,
                        func_evals,
                        ConvergenceStatus::FunctionValueConvergence,
                        "No further decrease possible at maximum damping".to_string(),
                    ));
                }
            }
        }
    }
}
