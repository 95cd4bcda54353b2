//! Convergence reporting shared by all optimizer backends.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::OptimizerAlgorithm;

/// Loss value substituted for non-finite objective evaluations.
pub const WORST_CASE_LOSS: f64 = f64::MAX;

/// Possible termination states for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    /// The algorithm has converged due to a small parameter change.
    ParameterConvergence,

    /// The algorithm has converged due to a small function value change.
    FunctionValueConvergence,

    /// The algorithm has converged due to a small gradient.
    GradientConvergence,

    /// No parameter is free to vary; the objective was evaluated once.
    NothingToOptimize,

    /// The evaluation budget ran out before a tolerance was met.
    MaxEvaluationsReached,

    /// The algorithm has terminated due to reaching the maximum number of iterations.
    MaxIterationsReached,

    /// The algorithm has terminated due to a numerical error.
    NumericalError,

    /// A cancellation token was triggered during the run.
    Cancelled,
}

impl ConvergenceStatus {
    /// Returns true if the optimization has converged.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::GradientConvergence
                | ConvergenceStatus::NothingToOptimize
        )
    }

    /// Returns a description of the convergence status.
    pub fn description(&self) -> &'static str {
        match self {
            ConvergenceStatus::ParameterConvergence => "Converged: small parameter change",
            ConvergenceStatus::FunctionValueConvergence => "Converged: small function value change",
            ConvergenceStatus::GradientConvergence => "Converged: small gradient",
            ConvergenceStatus::NothingToOptimize => "Converged: all parameters fixed",
            ConvergenceStatus::MaxEvaluationsReached => "Terminated: evaluation budget exhausted",
            ConvergenceStatus::MaxIterationsReached => "Terminated: maximum iterations reached",
            ConvergenceStatus::NumericalError => "Terminated: numerical error",
            ConvergenceStatus::Cancelled => "Terminated: cancelled",
        }
    }
}

/// Outcome report of one optimizer call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    /// Backend that produced the result
    pub algorithm: OptimizerAlgorithm,
    /// How the run terminated
    pub status: ConvergenceStatus,
    /// Iterations performed
    pub iterations: usize,
    /// Objective evaluations performed
    pub evaluations: usize,
    /// Objective value at the returned point
    pub final_loss: f64,
    /// Elapsed wall-clock time
    pub wall_time: Duration,
    /// Human-readable summary
    pub message: String,
    /// True when the result should not be trusted
    pub failed: bool,
}

impl Convergence {
    /// Build a report; `failed` follows from the status and the loss.
    pub fn new(
        algorithm: OptimizerAlgorithm,
        status: ConvergenceStatus,
        iterations: usize,
        evaluations: usize,
        final_loss: f64,
        wall_time: Duration,
        message: impl Into<String>,
    ) -> Self {
        let failed =
            !status.is_converged() || !final_loss.is_finite() || final_loss >= WORST_CASE_LOSS;
        Self {
            algorithm,
            status,
            iterations,
            evaluations,
            final_loss,
            wall_time,
            message: message.into(),
            failed,
        }
    }

    /// Mark the run as failed because its parameters are unusable.
    pub fn mark_failed(&mut self, reason: &str) {
        self.failed = true;
        self.message = format!("{} ({})", self.message, reason);
    }

    /// Combine reports from independent runs into one.
    ///
    /// Iterations, evaluations and losses add up. The runs are assumed to
    /// have been concurrent, so the wall time is the longest one. The
    /// combination fails if any part failed.
    pub fn merge<'a, I>(reports: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Convergence>,
    {
        let mut iter = reports.into_iter();
        let mut merged = iter.next()?.clone();
        let mut count = 1;
        for report in iter {
            merged.iterations += report.iterations;
            merged.evaluations += report.evaluations;
            merged.final_loss += report.final_loss;
            merged.wall_time = merged.wall_time.max(report.wall_time);
            if report.failed && !merged.failed {
                merged.failed = true;
                merged.status = report.status;
            }
            count += 1;
        }
        let failed = merged.failed;
        merged.message = format!(
            "{} independent fits, {}",
            count,
            if failed { "at least one failed" } else { "all converged" }
        );
        Some(merged)
    }
}

impl fmt::Display for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result ({:?}):", self.algorithm)?;
        writeln!(f, "  Failed: {}", self.failed)?;
        writeln!(f, "  Status: {}", self.status.description())?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Loss: {:.6e}", self.final_loss)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.evaluations)?;
        writeln!(f, "  Wall time: {:?}", self.wall_time)?;
        Ok(())
    }
}
