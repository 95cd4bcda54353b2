//! Simultaneous fit of several experiments with shared parameters.

use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use crate::config::FitConfig;
use crate::error::{ItcError, Result};
use crate::events::CancellationToken;
use crate::experiment::Experiment;
use crate::fit::{fit_layout, fit_model, summed_rmsd};
use crate::model::{BindingModel, ModelKind};
use crate::optimizer::Convergence;
use crate::parameters::{GlobalConstraints, ParameterLayout, WarmStart};
use crate::solution::{GlobalSolution, Solution};

/// A set of binding models fitted with one optimizer vector.
///
/// Constraints decide which of ΔH, K and N are shared between the
/// experiments; offsets are always per experiment.
#[derive(Debug)]
pub struct GlobalModel {
    models: Vec<Box<dyn BindingModel>>,
    layout: ParameterLayout,
}

impl GlobalModel {
    /// Create a global model.
    ///
    /// Fails without models, and for temperature-dependent constraints
    /// unless the experiments span at least two temperatures.
    pub fn new(models: Vec<Box<dyn BindingModel>>, constraints: GlobalConstraints) -> Result<Self> {
        let temperatures = models.iter().map(|m| m.experiment().temperature).collect();
        let layout = ParameterLayout::new(constraints, temperatures)?;
        Ok(Self { models, layout })
    }

    /// Build `kind` models around copies of `experiments`.
    pub fn from_experiments(
        experiments: &[Experiment],
        kind: ModelKind,
        constraints: GlobalConstraints,
    ) -> Result<Self> {
        let models = experiments
            .iter()
            .map(|experiment| {
                let mut data = experiment.clone();
                data.solution = None;
                kind.build(data)
            })
            .collect();
        Self::new(models, constraints)
    }

    /// The same models around other experiments, e.g. resampled data.
    pub fn with_experiments(&self, experiments: Vec<Experiment>) -> Result<Self> {
        if experiments.len() != self.models.len() {
            return Err(ItcError::DimensionMismatch(format!(
                "expected {} experiments, got {}",
                self.models.len(),
                experiments.len()
            )));
        }
        let models = self
            .models
            .iter()
            .zip(experiments)
            .map(|(model, experiment)| model.with_experiment(experiment))
            .collect();
        Ok(Self {
            models,
            layout: self.layout.clone(),
        })
    }

    pub fn models(&self) -> &[Box<dyn BindingModel>] {
        &self.models
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    pub fn constraints(&self) -> GlobalConstraints {
        self.layout.constraints()
    }

    /// Length of the optimizer vector.
    pub fn variable_count(&self) -> usize {
        self.layout.variable_count()
    }

    fn model_refs(&self) -> Vec<&dyn BindingModel> {
        self.models.iter().map(|m| m.as_ref()).collect()
    }

    /// Sum of per-experiment RMSDs at optimizer vector `x`.
    pub fn loss(&self, x: &[f64]) -> f64 {
        summed_rmsd(&self.layout, &self.model_refs(), x)
    }

    /// Fit all experiments.
    ///
    /// Without shared parameters every experiment is fitted on its own, in
    /// parallel, and the reports are merged. Otherwise one optimizer call
    /// minimizes the summed RMSD.
    ///
    /// # Arguments
    ///
    /// * `config` - Fit settings
    /// * `warm_start` - Optional previous global vector to search around
    /// * `cancel` - Optional cancellation token
    pub fn solve(
        &self,
        config: &FitConfig,
        warm_start: Option<&WarmStart>,
        cancel: Option<&CancellationToken>,
    ) -> Result<GlobalSolution> {
        if self.layout.constraints().all_independent() {
            self.solve_independent(config, warm_start, cancel)
        } else {
            self.solve_coupled(config, warm_start, cancel)
        }
    }

    fn solve_independent(
        &self,
        config: &FitConfig,
        warm_start: Option<&WarmStart>,
        cancel: Option<&CancellationToken>,
    ) -> Result<GlobalSolution> {
        debug!(models = self.models.len(), "Fitting experiments independently");

        let per_model_starts = match warm_start {
            Some(warm_start) => {
                let decoded = self.layout.unpack(&warm_start.center)?;
                Some(
                    (0..self.models.len())
                        .map(|i| {
                            WarmStart::new(
                                self.layout.model_vector(&decoded, i),
                                warm_start.tolerance,
                            )
                        })
                        .collect::<Vec<_>>(),
                )
            }
            None => None,
        };

        let start = Instant::now();
        let solutions: Vec<Solution> = self
            .models
            .par_iter()
            .enumerate()
            .map(|(i, model)| {
                let start = per_model_starts.as_ref().map(|starts| &starts[i]);
                fit_model(model.as_ref(), config, start, cancel)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut convergence = Convergence::merge(solutions.iter().map(|s| &s.convergence))
            .ok_or(ItcError::NoExperiments)?;
        convergence.wall_time = start.elapsed();
        let vectors: Vec<Vec<f64>> = solutions.iter().map(|s| s.raw_parameters.clone()).collect();
        let raw_parameters = self.layout.combine_independent(&vectors)?;
        let loss = solutions.iter().map(|s| s.loss).sum();

        GlobalSolution::new(&self.layout, raw_parameters, solutions, loss, convergence)
    }

    fn solve_coupled(
        &self,
        config: &FitConfig,
        warm_start: Option<&WarmStart>,
        cancel: Option<&CancellationToken>,
    ) -> Result<GlobalSolution> {
        let minimizer = config.minimizer(true);
        let fit = fit_layout(
            &self.layout,
            &self.model_refs(),
            minimizer.as_ref(),
            config,
            warm_start,
            cancel,
        )?;
        GlobalSolution::new(
            &self.layout,
            fit.raw_parameters,
            fit.solutions,
            fit.loss,
            fit.convergence,
        )
    }
}
