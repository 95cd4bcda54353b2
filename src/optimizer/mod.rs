//! Pluggable minimizers behind a single bounded `minimize` contract.
//!
//! A backend implements [`Minimizer`] and only sees the free dimensions of
//! the problem with a sanitized objective. [`minimize`] handles clamping,
//! fixed-dimension removal, timing and the final [`Convergence`] report.

pub mod convergence;
pub mod nelder_mead;

use std::fmt;
use std::time::Instant;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ItcError, Result};
use crate::events::CancellationToken;
use crate::lm::LevenbergMarquardt;
use crate::problem::ScalarObjective;

pub use convergence::{Convergence, ConvergenceStatus, WORST_CASE_LOSS};
pub use nelder_mead::{NelderMead, SimplexConfig};

/// Available optimizer backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizerAlgorithm {
    /// Bounded Nelder-Mead simplex
    #[default]
    Simplex,
    /// Levenberg-Marquardt on the scalar loss
    LevenbergMarquardt,
}

impl fmt::Display for OptimizerAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerAlgorithm::Simplex => write!(f, "Nelder-Mead simplex"),
            OptimizerAlgorithm::LevenbergMarquardt => write!(f, "Levenberg-Marquardt"),
        }
    }
}

/// What a backend reports for the reduced problem.
#[derive(Debug, Clone)]
pub struct BackendOutcome {
    /// Best point found (reduced dimensions)
    pub parameters: Vec<f64>,
    /// Objective at `parameters`
    pub loss: f64,
    pub status: ConvergenceStatus,
    pub iterations: usize,
    pub evaluations: usize,
    pub message: String,
}

/// Result of [`minimize`]: the full-dimension best point and its report.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub parameters: Vec<f64>,
    pub convergence: Convergence,
}

/// A bounded minimizer for scalar objectives.
///
/// Backends receive a finite objective, bounds with `lower < upper` in every
/// dimension, an initial point inside the box and strictly positive steps.
pub trait Minimizer: Send + Sync + fmt::Debug {
    /// Which algorithm this is.
    fn algorithm(&self) -> OptimizerAlgorithm;

    /// Minimize `objective` over the box `[lower, upper]`.
    fn run(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        lower: &[f64],
        upper: &[f64],
        initial: &[f64],
        step_sizes: &[f64],
        cancel: Option<&CancellationToken>,
    ) -> Result<BackendOutcome>;
}

impl Minimizer for LevenbergMarquardt {
    fn algorithm(&self) -> OptimizerAlgorithm {
        OptimizerAlgorithm::LevenbergMarquardt
    }

    fn run(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        lower: &[f64],
        upper: &[f64],
        initial: &[f64],
        _step_sizes: &[f64],
        cancel: Option<&CancellationToken>,
    ) -> Result<BackendOutcome> {
        let problem = ScalarObjective::new(objective, initial.len());
        let result = self.minimize_bounded(
            &problem,
            &Array1::from_vec(initial.to_vec()),
            lower,
            upper,
            cancel,
        )?;

        Ok(BackendOutcome {
            parameters: result.params.to_vec(),
            // cost is the squared single residual
            loss: result.cost.sqrt(),
            status: result.status,
            iterations: result.iterations,
            evaluations: result.func_evals,
            message: result.message,
        })
    }
}

/// Minimize `objective` over `[lower, upper]` starting at `initial`.
///
/// The initial point is clamped into the box and dimensions with
/// `lower == upper` are held fixed. Non-finite objective values are seen by
/// the backend as [`WORST_CASE_LOSS`]. A result with a non-finite parameter
/// is marked failed.
pub fn minimize(
    minimizer: &dyn Minimizer,
    objective: &dyn Fn(&[f64]) -> f64,
    lower: &[f64],
    upper: &[f64],
    initial: &[f64],
    step_sizes: &[f64],
    cancel: Option<&CancellationToken>,
) -> Result<OptimizationOutcome> {
    let n = initial.len();
    if lower.len() != n || upper.len() != n || step_sizes.len() != n {
        return Err(ItcError::DimensionMismatch(format!(
            "initial point has {} dimensions, bounds have {} and {}, steps have {}",
            n,
            lower.len(),
            upper.len(),
            step_sizes.len()
        )));
    }
    for i in 0..n {
        if lower[i].is_nan() || upper[i].is_nan() || lower[i] > upper[i] {
            return Err(ItcError::InvalidConfiguration(format!(
                "invalid bounds [{}, {}] for dimension {}",
                lower[i], upper[i], i
            )));
        }
        if lower[i] < upper[i] && !(step_sizes[i].is_finite() && step_sizes[i] > 0.0) {
            return Err(ItcError::InvalidConfiguration(format!(
                "step size for dimension {} must be positive, got {}",
                i, step_sizes[i]
            )));
        }
    }

    let start = Instant::now();
    let algorithm = minimizer.algorithm();

    let base: Vec<f64> = initial
        .iter()
        .zip(lower.iter().zip(upper.iter()))
        .map(|(x, (lo, hi))| if x.is_nan() { *lo } else { x.max(*lo).min(*hi) })
        .collect();
    let free: Vec<usize> = (0..n).filter(|&i| lower[i] < upper[i]).collect();

    let expand = |reduced: &[f64]| -> Vec<f64> {
        let mut full = base.clone();
        for (k, &i) in free.iter().enumerate() {
            full[i] = reduced[k];
        }
        full
    };
    let sanitized = |reduced: &[f64]| -> f64 {
        let value = objective(&expand(reduced));
        if value.is_finite() {
            value
        } else {
            WORST_CASE_LOSS
        }
    };

    let (parameters, mut convergence) = if free.is_empty() {
        let value = objective(&base);
        let loss = if value.is_finite() { value } else { WORST_CASE_LOSS };
        let convergence = Convergence::new(
            algorithm,
            ConvergenceStatus::NothingToOptimize,
            0,
            1,
            loss,
            start.elapsed(),
            "All parameters are fixed",
        );
        (base.clone(), convergence)
    } else {
        let pick = |values: &[f64]| -> Vec<f64> { free.iter().map(|&i| values[i]).collect() };
        let outcome = minimizer.run(
            &sanitized,
            &pick(lower),
            &pick(upper),
            &pick(&base),
            &pick(step_sizes),
            cancel,
        )?;
        let convergence = Convergence::new(
            algorithm,
            outcome.status,
            outcome.iterations,
            outcome.evaluations,
            outcome.loss,
            start.elapsed(),
            outcome.message,
        );
        (expand(&outcome.parameters), convergence)
    };

    if parameters.iter().any(|p| !p.is_finite()) {
        convergence.mark_failed("non-finite parameter in result");
    }

    debug!(
        algorithm = %algorithm,
        status = ?convergence.status,
        evaluations = convergence.evaluations,
        loss = convergence.final_loss,
        failed = convergence.failed,
        "optimizer finished"
    );

    Ok(OptimizationOutcome {
        parameters,
        convergence,
    })
}
