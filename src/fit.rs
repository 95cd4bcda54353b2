//! Fitting entry points.
//!
//! [`fit_model`] fits one binding model. [`fit_experiment`] and
//! [`fit_global`] are session helpers: they build the models from the
//! configuration, run the configured error estimation, store the results on
//! the experiments and notify the listener.

use tracing::{debug, info, warn};

use crate::config::{ErrorMethod, FitConfig};
use crate::error::{ItcError, Result};
use crate::events::{CancellationToken, FitListener};
use crate::experiment::Experiment;
use crate::global::GlobalModel;
use crate::model::{BindingModel, LossKind};
use crate::optimizer::{minimize, Convergence, Minimizer, WORST_CASE_LOSS};
use crate::parameters::{GlobalConstraints, ParameterLayout, WarmStart};
use crate::solution::{BootstrapSummary, GlobalSolution, Solution};
use crate::uncertainty::{bootstrap_global, bootstrap_solution};

/// Result of one optimizer run over a layout.
#[derive(Debug, Clone)]
pub(crate) struct LayoutFit {
    /// Optimizer vector
    pub raw_parameters: Vec<f64>,
    /// Per-experiment results in model order
    pub solutions: Vec<Solution>,
    /// Summed RMSD
    pub loss: f64,
    pub convergence: Convergence,
}

/// Sum of the per-experiment RMSDs at optimizer vector `x`.
///
/// Any experiment at the worst-case loss makes the whole sum worst-case.
pub(crate) fn summed_rmsd(
    layout: &ParameterLayout,
    models: &[&dyn BindingModel],
    x: &[f64],
) -> f64 {
    let decoded = match layout.unpack(x) {
        Ok(decoded) => decoded,
        Err(_) => return WORST_CASE_LOSS,
    };

    let mut total = 0.0;
    for (i, model) in models.iter().enumerate() {
        let loss = model.loss(&layout.model_parameters(&decoded, i), LossKind::Rmsd);
        if loss >= WORST_CASE_LOSS {
            return WORST_CASE_LOSS;
        }
        total += loss;
    }
    total
}

/// Run one optimizer call over `layout` and decode the result.
///
/// # Arguments
///
/// * `layout` - Vector layout; one entry per model
/// * `models` - The models, in layout order
/// * `minimizer` - Optimizer backend
/// * `config` - Bounds, steps, initial values and lock tolerances
/// * `warm_start` - Optional previous vector to search around
/// * `cancel` - Optional cancellation token passed to the backend
pub(crate) fn fit_layout(
    layout: &ParameterLayout,
    models: &[&dyn BindingModel],
    minimizer: &dyn Minimizer,
    config: &FitConfig,
    warm_start: Option<&WarmStart>,
    cancel: Option<&CancellationToken>,
) -> Result<LayoutFit> {
    if models.len() != layout.model_count() {
        return Err(ItcError::DimensionMismatch(format!(
            "layout has {} experiments, got {} models",
            layout.model_count(),
            models.len()
        )));
    }
    config.validate()?;

    let guesses: Vec<_> = models.iter().map(|m| m.initial_guess()).collect();
    let initial = layout.initial_parameters(&guesses, &config.parameters)?;
    let mut x0 = layout.pack(&initial)?;

    let (mut lower, mut upper) = layout.bounds(&config.parameters);
    let steps = layout.steps(&config.parameters);
    layout.apply_user_locks(&config.parameters, config.locks.tight, &x0, &mut lower, &mut upper)?;
    if let Some(warm_start) = warm_start {
        warm_start.apply(&mut lower, &mut upper, &steps)?;
        x0 = warm_start.center.clone();
    }

    debug!(
        models = models.len(),
        variables = layout.variable_count(),
        algorithm = %minimizer.algorithm(),
        warm_start = warm_start.is_some(),
        "Starting fit"
    );

    let objective = |x: &[f64]| summed_rmsd(layout, models, x);
    let outcome = minimize(minimizer, &objective, &lower, &upper, &x0, &steps, cancel)?;

    let decoded = layout.unpack(&outcome.parameters)?;
    let solutions = models
        .iter()
        .enumerate()
        .map(|(i, model)| {
            let parameters = layout.model_parameters(&decoded, i);
            Solution::new(
                model.kind(),
                model.experiment().temperature,
                parameters,
                layout.model_vector(&decoded, i),
                model.loss(&parameters, LossKind::Rmsd),
                outcome.convergence.clone(),
            )
        })
        .collect();

    if outcome.convergence.failed {
        warn!(
            status = ?outcome.convergence.status,
            evaluations = outcome.convergence.evaluations,
            "Fit did not converge: {}",
            outcome.convergence.message
        );
    }

    Ok(LayoutFit {
        raw_parameters: outcome.parameters,
        solutions,
        loss: outcome.convergence.final_loss,
        convergence: outcome.convergence,
    })
}

/// Fit a single binding model.
///
/// The optimizer vector is `[ΔH, ΔG, offset, N]`. Failed fits are returned
/// with `convergence.failed` set rather than as errors.
///
/// # Arguments
///
/// * `model` - The model to fit
/// * `config` - Fit settings
/// * `warm_start` - Optional previous vector to search around
/// * `cancel` - Optional cancellation token
///
/// # Returns
///
/// * The solution, or an error if the configuration is invalid
pub fn fit_model(
    model: &dyn BindingModel,
    config: &FitConfig,
    warm_start: Option<&WarmStart>,
    cancel: Option<&CancellationToken>,
) -> Result<Solution> {
    let layout = ParameterLayout::new(
        GlobalConstraints::default(),
        vec![model.experiment().temperature],
    )?;
    let minimizer = config.minimizer(false);
    let fit = fit_layout(&layout, &[model], minimizer.as_ref(), config, warm_start, cancel)?;

    let mut solution = fit
        .solutions
        .into_iter()
        .next()
        .ok_or(ItcError::NoExperiments)?;
    solution.raw_parameters = fit.raw_parameters;
    Ok(solution)
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    if cancel.map_or(false, |c| c.is_cancelled()) {
        return Err(ItcError::Cancelled);
    }
    Ok(())
}

/// Turn a bootstrap that kept too few refits into a summary without an
/// error estimate. Every other error is passed on.
fn summary_or_shortfall(result: Result<BootstrapSummary>) -> Result<BootstrapSummary> {
    match result {
        Err(ItcError::BootstrapFailed {
            requested,
            succeeded,
            failed,
        }) => {
            warn!(
                requested,
                succeeded,
                failed,
                "Bootstrap kept too few refits; reporting the fit without errors"
            );
            Ok(BootstrapSummary {
                requested,
                succeeded,
                failed,
            })
        }
        other => other,
    }
}

/// Fit one experiment with the configured isotherm and error method, and
/// store the solution on the experiment.
pub fn fit_experiment(
    experiment: &mut Experiment,
    config: &FitConfig,
    listener: &dyn FitListener,
) -> Result<Solution> {
    fit_experiment_cancellable(experiment, config, listener, None)
}

/// [`fit_experiment`] with a cancellation token.
///
/// On cancellation the experiment keeps its previous solution. A bootstrap
/// that keeps fewer than two refits does not discard the fit: the solution is
/// stored with zero errors and a `bootstrap_summary` recording the shortfall.
pub fn fit_experiment_cancellable(
    experiment: &mut Experiment,
    config: &FitConfig,
    listener: &dyn FitListener,
    cancel: Option<&CancellationToken>,
) -> Result<Solution> {
    config.validate()?;
    let mut data = experiment.clone();
    data.solution = None;
    let model = config.model.build(data);

    let mut solution = fit_model(model.as_ref(), config, None, cancel)?;
    check_cancelled(cancel)?;
    listener.on_fit_finished(&solution.convergence);

    if config.error_method == ErrorMethod::BootstrapResiduals {
        if solution.failed() {
            warn!("Skipping bootstrap because the fit did not converge");
        } else {
            let summary = summary_or_shortfall(bootstrap_solution(
                model.as_ref(),
                &mut solution,
                config,
                listener,
                cancel,
            ))?;
            solution.bootstrap_summary = Some(summary);
        }
    }

    info!(
        temperature = experiment.temperature,
        n = solution.n.value,
        enthalpy = solution.enthalpy.value,
        affinity = solution.affinity.value,
        rmsd = solution.loss,
        failed = solution.failed(),
        "Fit finished"
    );

    experiment.set_solution(solution.clone());
    Ok(solution)
}

/// Fit several experiments together under `config.constraints` and write
/// each per-experiment solution back.
pub fn fit_global(
    experiments: &mut [Experiment],
    config: &FitConfig,
    listener: &dyn FitListener,
) -> Result<GlobalSolution> {
    fit_global_cancellable(experiments, config, listener, None)
}

/// [`fit_global`] with a cancellation token.
///
/// Cancellation and bootstrap shortfalls are handled as in
/// [`fit_experiment_cancellable`].
pub fn fit_global_cancellable(
    experiments: &mut [Experiment],
    config: &FitConfig,
    listener: &dyn FitListener,
    cancel: Option<&CancellationToken>,
) -> Result<GlobalSolution> {
    config.validate()?;
    let model = GlobalModel::from_experiments(experiments, config.model, config.constraints)?;

    let mut solution = model.solve(config, None, cancel)?;
    check_cancelled(cancel)?;
    listener.on_fit_finished(&solution.convergence);

    if config.error_method == ErrorMethod::BootstrapResiduals {
        if solution.failed() {
            warn!("Skipping bootstrap because the global fit did not converge");
        } else {
            let summary = summary_or_shortfall(bootstrap_global(
                &model,
                &mut solution,
                config,
                listener,
                cancel,
            ))?;
            solution.bootstrap_summary = Some(summary);
            for result in &mut solution.solutions {
                result.bootstrap_summary = Some(summary);
            }
        }
    }

    info!(
        experiments = experiments.len(),
        variables = model.variable_count(),
        heat_capacity = solution.heat_capacity.value,
        loss = solution.loss,
        failed = solution.failed(),
        "Global fit finished"
    );

    for (experiment, result) in experiments.iter_mut().zip(&solution.solutions) {
        experiment.set_solution(result.clone());
    }
    Ok(solution)
}
