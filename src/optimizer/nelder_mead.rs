//! Bounded Nelder-Mead simplex search.
//!
//! Trial points are projected onto the box, the initial simplex is built from
//! per-dimension step sizes, and a converged search is restarted from its best
//! vertex to escape premature collapse.

use serde::{Deserialize, Serialize};

use crate::error::{ItcError, Result};
use crate::events::CancellationToken;

use super::{BackendOutcome, ConvergenceStatus, Minimizer, OptimizerAlgorithm};

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Relative simplex diameter below which no further progress is possible.
const COLLAPSE_TOLERANCE: f64 = 4.0 * f64::EPSILON;

/// Configuration for the simplex search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplexConfig {
    /// Objective evaluation budget shared by all restarts. Default: 300000
    pub max_evaluations: usize,

    /// Absolute tolerance on the spread of objective values across the
    /// simplex. Default: `f64::EPSILON`
    pub f_tol_abs: f64,

    /// Optional tolerance on the relative simplex diameter. Default: unset
    pub x_tol_rel: Option<f64>,

    /// Number of restarts from the best vertex after convergence. Default: 2
    pub restarts: usize,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            max_evaluations: 300_000,
            f_tol_abs: f64::EPSILON,
            x_tol_rel: None,
            restarts: 2,
        }
    }
}

impl SimplexConfig {
    /// Reject settings the search cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_evaluations == 0 {
            return Err(ItcError::InvalidConfiguration(
                "simplex evaluation budget must be at least 1".to_string(),
            ));
        }
        if !(self.f_tol_abs.is_finite() && self.f_tol_abs >= 0.0) {
            return Err(ItcError::InvalidConfiguration(format!(
                "simplex f_tol_abs must be finite and non-negative, got {}",
                self.f_tol_abs
            )));
        }
        if let Some(x_tol) = self.x_tol_rel {
            if !(x_tol.is_finite() && x_tol > 0.0) {
                return Err(ItcError::InvalidConfiguration(format!(
                    "simplex x_tol_rel must be positive, got {}",
                    x_tol
                )));
            }
        }
        Ok(())
    }
}

/// The Nelder-Mead optimizer.
#[derive(Debug, Clone, Default)]
pub struct NelderMead {
    config: SimplexConfig,
}

impl NelderMead {
    /// Create a simplex optimizer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a simplex optimizer with the given configuration.
    pub fn with_config(config: SimplexConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &SimplexConfig {
        &self.config
    }

    /// Set the evaluation budget.
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.config.max_evaluations = max_evaluations;
        self
    }

    /// Set the relative parameter tolerance.
    pub fn with_x_tol_rel(mut self, x_tol_rel: Option<f64>) -> Self {
        self.config.x_tol_rel = x_tol_rel;
        self
    }

    /// Set the number of restarts.
    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.config.restarts = restarts;
        self
    }
}

struct Search<'a> {
    objective: &'a dyn Fn(&[f64]) -> f64,
    lower: &'a [f64],
    upper: &'a [f64],
    steps: &'a [f64],
    config: &'a SimplexConfig,
    cancel: Option<&'a CancellationToken>,
    evaluations: usize,
    iterations: usize,
}

impl Search<'_> {
    fn evaluate(&mut self, x: &[f64]) -> f64 {
        self.evaluations += 1;
        (self.objective)(x)
    }

    fn project(&self, x: &mut [f64]) {
        for (j, value) in x.iter_mut().enumerate() {
            *value = value.max(self.lower[j]).min(self.upper[j]);
        }
    }

    /// `from + coefficient * (to - from)`, projected onto the box.
    fn along(&self, from: &[f64], to: &[f64], coefficient: f64) -> Vec<f64> {
        let mut point: Vec<f64> = from
            .iter()
            .zip(to.iter())
            .map(|(a, b)| a + coefficient * (b - a))
            .collect();
        self.project(&mut point);
        point
    }

    /// Largest vertex distance from the best vertex, relative to the
    /// magnitude of the best vertex (or the step size near zero).
    fn relative_diameter(&self, simplex: &[(Vec<f64>, f64)]) -> f64 {
        let best = &simplex[0].0;
        simplex[1..]
            .iter()
            .flat_map(|(vertex, _)| {
                vertex.iter().enumerate().map(move |(j, v)| {
                    let scale = best[j].abs().max(self.steps[j]);
                    (v - best[j]).abs() / scale
                })
            })
            .fold(0.0, f64::max)
    }

    fn descend(&mut self, start: &[f64]) -> (Vec<f64>, f64, ConvergenceStatus) {
        let n = start.len();

        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        let f0 = self.evaluate(start);
        simplex.push((start.to_vec(), f0));
        for j in 0..n {
            let mut vertex = start.to_vec();
            vertex[j] = if start[j] + self.steps[j] <= self.upper[j] {
                start[j] + self.steps[j]
            } else {
                start[j] - self.steps[j]
            };
            self.project(&mut vertex);
            let value = self.evaluate(&vertex);
            simplex.push((vertex, value));
        }

        loop {
            simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            let best_value = simplex[0].1;
            let worst_value = simplex[n].1;

            if self.cancel.map_or(false, |c| c.is_cancelled()) {
                return (simplex[0].0.clone(), best_value, ConvergenceStatus::Cancelled);
            }
            if worst_value - best_value <= self.config.f_tol_abs {
                return (
                    simplex[0].0.clone(),
                    best_value,
                    ConvergenceStatus::FunctionValueConvergence,
                );
            }
            let diameter = self.relative_diameter(&simplex);
            let x_tol = self.config.x_tol_rel.unwrap_or(0.0).max(COLLAPSE_TOLERANCE);
            if diameter <= x_tol {
                return (
                    simplex[0].0.clone(),
                    best_value,
                    ConvergenceStatus::ParameterConvergence,
                );
            }
            if self.evaluations >= self.config.max_evaluations {
                return (
                    simplex[0].0.clone(),
                    best_value,
                    ConvergenceStatus::MaxEvaluationsReached,
                );
            }

            self.iterations += 1;

            // Centroid of all vertices but the worst
            let mut centroid = vec![0.0; n];
            for (vertex, _) in &simplex[..n] {
                for (c, v) in centroid.iter_mut().zip(vertex.iter()) {
                    *c += v / n as f64;
                }
            }

            let worst = simplex[n].0.clone();
            let reflected = self.along(&centroid, &worst, -REFLECTION);
            let reflected_value = self.evaluate(&reflected);

            if reflected_value < best_value {
                let expanded = self.along(&centroid, &reflected, EXPANSION);
                let expanded_value = self.evaluate(&expanded);
                simplex[n] = if expanded_value < reflected_value {
                    (expanded, expanded_value)
                } else {
                    (reflected, reflected_value)
                };
                continue;
            }

            if reflected_value < simplex[n - 1].1 {
                simplex[n] = (reflected, reflected_value);
                continue;
            }

            let accepted = if reflected_value < worst_value {
                // Outside contraction
                let contracted = self.along(&centroid, &reflected, CONTRACTION);
                let contracted_value = self.evaluate(&contracted);
                (contracted_value <= reflected_value).then_some((contracted, contracted_value))
            } else {
                // Inside contraction
                let contracted = self.along(&centroid, &worst, CONTRACTION);
                let contracted_value = self.evaluate(&contracted);
                (contracted_value < worst_value).then_some((contracted, contracted_value))
            };

            match accepted {
                Some(vertex) => simplex[n] = vertex,
                None => {
                    let best = simplex[0].0.clone();
                    for i in 1..=n {
                        let shrunk = self.along(&best, &simplex[i].0, SHRINK);
                        let value = self.evaluate(&shrunk);
                        simplex[i] = (shrunk, value);
                    }
                }
            }
        }
    }
}

impl Minimizer for NelderMead {
    fn algorithm(&self) -> OptimizerAlgorithm {
        OptimizerAlgorithm::Simplex
    }

    fn run(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        lower: &[f64],
        upper: &[f64],
        initial: &[f64],
        step_sizes: &[f64],
        cancel: Option<&CancellationToken>,
    ) -> Result<BackendOutcome> {
        let mut search = Search {
            objective,
            lower,
            upper,
            steps: step_sizes,
            config: &self.config,
            cancel,
            evaluations: 0,
            iterations: 0,
        };

        let (mut best, mut best_value, mut status) = search.descend(initial);
        let mut restarts = 0;

        while status.is_converged() && restarts < self.config.restarts {
            let (point, value, restart_status) = search.descend(&best);
            restarts += 1;

            let improvement = best_value - value;
            if value <= best_value {
                best = point;
                best_value = value;
            }
            match restart_status {
                ConvergenceStatus::Cancelled => {
                    status = restart_status;
                    break;
                }
                // The point kept from the previous pass already met a tolerance.
                ConvergenceStatus::MaxEvaluationsReached => break,
                _ => status = restart_status,
            }
            if improvement <= self.config.f_tol_abs {
                break;
            }
        }

        Ok(BackendOutcome {
            parameters: best,
            loss: best_value,
            status,
            iterations: search.iterations,
            evaluations: search.evaluations,
            message: format!(
                "{} after {} restart(s)",
                status.description(),
                restarts
            ),
        })
    }
}
