//! Residual bootstrap for single and global fits.
//!
//! Each iteration rebuilds every experiment from its predicted heats plus
//! residuals drawn with replacement from the original fit, refits with a
//! loose lock around the original estimate, and keeps the refit if it
//! converged. The spread of the kept refits becomes the error of each
//! reported quantity.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::prelude::*;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::FitConfig;
use crate::error::{ItcError, Result};
use crate::events::{CancellationToken, FitListener};
use crate::experiment::Experiment;
use crate::fit::fit_model;
use crate::global::GlobalModel;
use crate::model::{BindingModel, ModelParameters};
use crate::parameters::WarmStart;
use crate::solution::{BootstrapSummary, GlobalSolution, Solution};

/// Copy of the model's experiment with heats `predicted - scale * r`, where
/// each `r` is drawn uniformly from the fit residuals.
///
/// # Arguments
///
/// * `model` - Model holding the original data
/// * `parameters` - Fitted parameters
/// * `scale` - Factor applied to every drawn residual
/// * `rng` - Random number generator
pub fn resample_experiment<R: Rng + ?Sized>(
    model: &dyn BindingModel,
    parameters: &ModelParameters,
    scale: f64,
    rng: &mut R,
) -> Result<Experiment> {
    let residuals = model.residuals(parameters);
    if residuals.is_empty() {
        return Err(ItcError::InvalidExperiment(
            "no fitted injections to resample residuals from".to_string(),
        ));
    }

    let pick = Uniform::new(0, residuals.len());
    let heats: Vec<f64> = model
        .predicted(parameters)
        .iter()
        .map(|predicted| predicted - scale * residuals[pick.sample(rng)])
        .collect();
    model.experiment().with_peak_areas(&heats)
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.map_or(false, |c| c.is_cancelled())
}

/// Run `iterations` refits on a pool of `threads` workers.
///
/// `refit` returns `None` for refits that did not converge. Iteration `i`
/// gets an RNG seeded with `seed + i`.
fn run_iterations<T, F>(
    iterations: usize,
    threads: usize,
    seed: Option<u64>,
    listener: &dyn FitListener,
    cancel: Option<&CancellationToken>,
    refit: F,
) -> Result<(Vec<T>, BootstrapSummary)>
where
    T: Send,
    F: Fn(&mut StdRng) -> Result<Option<T>> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()?;
    let base_seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
    let finished = AtomicUsize::new(0);

    let outcomes: Vec<Option<T>> = pool.install(|| {
        (0..iterations)
            .into_par_iter()
            .map(|i| {
                if is_cancelled(cancel) {
                    return Err(ItcError::Cancelled);
                }
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(i as u64));
                let outcome = refit(&mut rng)?;
                let current = finished.fetch_add(1, Ordering::SeqCst) + 1;
                listener.on_iteration_progress(current, iterations);
                Ok(outcome)
            })
            .collect::<Result<Vec<_>>>()
    })?;
    if is_cancelled(cancel) {
        return Err(ItcError::Cancelled);
    }

    let survivors: Vec<T> = outcomes.into_iter().flatten().collect();
    let summary = BootstrapSummary {
        requested: iterations,
        succeeded: survivors.len(),
        failed: iterations - survivors.len(),
    };

    if summary.failed > 0 {
        warn!(
            failed = summary.failed,
            requested = summary.requested,
            "Dropped bootstrap iterations whose refit did not converge"
        );
    }
    if summary.succeeded < 2 {
        return Err(ItcError::BootstrapFailed {
            requested: summary.requested,
            succeeded: summary.succeeded,
            failed: summary.failed,
        });
    }
    Ok((survivors, summary))
}

/// Estimate the errors of a single-experiment solution by residual
/// resampling.
///
/// On success the errors of `solution` are replaced by the bootstrap spread
/// and the refits are stored on it. On error, including cancellation and
/// invalid settings, `solution` is left unchanged.
///
/// # Arguments
///
/// * `model` - The model that produced `solution`
/// * `solution` - Solution to attach the error estimate to
/// * `config` - Fit and bootstrap settings
/// * `listener` - Receives one progress call per finished iteration
/// * `cancel` - Optional cancellation token
///
/// # Returns
///
/// * Counts of requested, kept and dropped iterations
pub fn bootstrap_solution(
    model: &dyn BindingModel,
    solution: &mut Solution,
    config: &FitConfig,
    listener: &dyn FitListener,
    cancel: Option<&CancellationToken>,
) -> Result<BootstrapSummary> {
    config.validate()?;
    let settings = &config.bootstrap;
    let parameters = solution.parameters();
    let warm_start = WarmStart::new(solution.raw_parameters.clone(), config.locks.loose);

    let (children, summary) = run_iterations(
        settings.iterations,
        settings.max_parallelism,
        settings.seed,
        listener,
        cancel,
        |rng| {
            let data = resample_experiment(model, &parameters, settings.residual_scale, rng)?;
            let child_model = model.with_experiment(data);
            let child = fit_model(child_model.as_ref(), config, Some(&warm_start), cancel)?;
            Ok((!child.failed()).then_some(child))
        },
    )?;

    solution.apply_bootstrap(children, summary)?;
    info!(
        requested = summary.requested,
        succeeded = summary.succeeded,
        n_sd = solution.n.sd,
        enthalpy_sd = solution.enthalpy.sd,
        "Bootstrap finished"
    );
    Ok(summary)
}

/// Estimate the errors of a global solution by residual resampling.
///
/// Every experiment is resampled in each iteration and the whole global
/// model is refitted. Workers are capped at
/// `min(max_parallelism, global_max_parallelism)`.
pub fn bootstrap_global(
    model: &GlobalModel,
    solution: &mut GlobalSolution,
    config: &FitConfig,
    listener: &dyn FitListener,
    cancel: Option<&CancellationToken>,
) -> Result<BootstrapSummary> {
    config.validate()?;
    let settings = &config.bootstrap;
    if solution.solutions.len() != model.models().len() {
        return Err(ItcError::DimensionMismatch(format!(
            "global model has {} experiments, solution has {}",
            model.models().len(),
            solution.solutions.len()
        )));
    }
    let parameters: Vec<ModelParameters> =
        solution.solutions.iter().map(|s| s.parameters()).collect();
    let warm_start = WarmStart::new(solution.raw_parameters.clone(), config.locks.loose);
    let threads = settings
        .max_parallelism
        .min(settings.global_max_parallelism);

    let (children, summary) = run_iterations(
        settings.iterations,
        threads,
        settings.seed,
        listener,
        cancel,
        |rng| {
            let experiments = model
                .models()
                .iter()
                .zip(&parameters)
                .map(|(m, p)| resample_experiment(m.as_ref(), p, settings.residual_scale, &mut *rng))
                .collect::<Result<Vec<_>>>()?;
            let child = model
                .with_experiments(experiments)?
                .solve(config, Some(&warm_start), cancel)?;
            Ok((!child.failed()).then_some(child))
        },
    )?;

    solution.apply_bootstrap(children, summary)?;
    info!(
        requested = summary.requested,
        succeeded = summary.succeeded,
        heat_capacity_sd = solution.heat_capacity.sd,
        "Global bootstrap finished"
    );
    Ok(summary)
}
