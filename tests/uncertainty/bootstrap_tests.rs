//! Residual bootstrap on single and global fits.

use std::sync::atomic::{AtomicUsize, Ordering};

use itc_fit::model::ModelParameters;
use itc_fit::models::OneSetOfSites;
use itc_fit::uncertainty::{bootstrap_global, bootstrap_solution};
use itc_fit::{
    fit_experiment, fit_global, fit_model, CancellationToken, Constraint, ErrorMethod,
    FitConfig, FitListener, GlobalConstraints, GlobalModel, ItcError, ModelKind, NoopListener,
    OptimizerAlgorithm,
};

use crate::test_helpers::{noisy_experiment, reference_parameters, sample_sd, NOISE_SD};

/// Counts progress notifications.
#[derive(Default)]
struct CountingListener {
    calls: AtomicUsize,
    highest: AtomicUsize,
}

impl FitListener for CountingListener {
    fn on_iteration_progress(&self, current: usize, _total: usize) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.highest.fetch_max(current, Ordering::SeqCst);
    }
}

fn bootstrap_config(iterations: usize) -> FitConfig {
    FitConfig::new()
        .with_error_method(ErrorMethod::BootstrapResiduals)
        .with_bootstrap_iterations(iterations)
        .with_max_parallelism(4)
        .with_seed(2024)
}

#[test]
fn test_bootstrap_sd_matches_empirical_standard_error() {
    let truth = reference_parameters();
    let config = FitConfig::new();

    // Spread of N over independent noise realisations
    let fitted_n: Vec<f64> = (0..30)
        .map(|seed| {
            let model = OneSetOfSites::new(noisy_experiment(25.0, truth, NOISE_SD, 1000 + seed));
            fit_model(&model, &config, None, None).unwrap().n.value
        })
        .collect();
    let empirical = sample_sd(&fitted_n);

    let mut experiment = noisy_experiment(25.0, truth, NOISE_SD, 1);
    let solution = fit_experiment(&mut experiment, &bootstrap_config(500), &NoopListener).unwrap();

    let summary = solution.bootstrap_summary.unwrap();
    assert_eq!(summary.requested, 500);
    assert!(summary.has_error_estimate());
    assert_eq!(summary.succeeded + summary.failed, summary.requested);
    assert_eq!(solution.bootstrap_solutions.len(), summary.succeeded);

    let ratio = solution.n.sd / empirical;
    assert!(
        ratio > 0.5 && ratio < 2.0,
        "bootstrap sd {} vs empirical {}",
        solution.n.sd,
        empirical
    );
    assert!(solution.enthalpy.sd > 0.0);
    assert!(solution.gibbs.sd > 0.0);

    // The point estimate is the primary fit, not the bootstrap mean
    let primary = fit_model(
        &OneSetOfSites::new(noisy_experiment(25.0, truth, NOISE_SD, 1)),
        &config,
        None,
        None,
    )
    .unwrap();
    assert_eq!(solution.n.value, primary.n.value);
    assert_eq!(
        experiment.solution.as_ref().unwrap().n.sd,
        solution.n.sd
    );
}

#[test]
fn test_bootstrap_reports_progress_for_every_iteration() {
    let truth = reference_parameters();
    let model = OneSetOfSites::new(noisy_experiment(25.0, truth, NOISE_SD, 5));
    let config = bootstrap_config(12);
    let mut solution = fit_model(&model, &config, None, None).unwrap();

    let listener = CountingListener::default();
    let summary = bootstrap_solution(&model, &mut solution, &config, &listener, None).unwrap();

    assert_eq!(listener.calls.load(Ordering::SeqCst), 12);
    assert_eq!(listener.highest.load(Ordering::SeqCst), 12);
    assert_eq!(summary.succeeded + summary.failed, 12);
}

#[test]
fn test_bootstrap_is_reproducible_with_a_seed() {
    let truth = reference_parameters();
    let model = OneSetOfSites::new(noisy_experiment(25.0, truth, NOISE_SD, 9));
    let config = bootstrap_config(8);
    let primary = fit_model(&model, &config, None, None).unwrap();

    let mut first = primary.clone();
    let mut second = primary.clone();
    bootstrap_solution(&model, &mut first, &config, &NoopListener, None).unwrap();
    bootstrap_solution(
        &model,
        &mut second,
        &config.clone().with_max_parallelism(1),
        &NoopListener,
        None,
    )
    .unwrap();

    assert_eq!(first.n.sd, second.n.sd);
    assert_eq!(first.enthalpy.sd, second.enthalpy.sd);
}

#[test]
fn test_cancelled_bootstrap_leaves_solution_untouched() {
    let truth = reference_parameters();
    let model = OneSetOfSites::new(noisy_experiment(25.0, truth, NOISE_SD, 3));
    let config = bootstrap_config(20);
    let mut solution = fit_model(&model, &config, None, None).unwrap();
    let before = solution.clone();

    let token = CancellationToken::new();
    token.cancel();
    let result = bootstrap_solution(&model, &mut solution, &config, &NoopListener, Some(&token));

    assert!(matches!(result, Err(ItcError::Cancelled)));
    assert!(solution.bootstrap_summary.is_none());
    assert!(solution.bootstrap_solutions.is_empty());
    assert_eq!(solution.n, before.n);
    assert_eq!(solution.enthalpy.sd, 0.0);
}

#[test]
fn test_all_failed_refits_is_an_error() {
    let truth = reference_parameters();
    let model = OneSetOfSites::new(noisy_experiment(25.0, truth, NOISE_SD, 4));
    let mut solution = fit_model(&model, &FitConfig::new(), None, None).unwrap();

    // Refits that are not allowed a single iteration never converge
    let mut config = bootstrap_config(6).with_algorithm(OptimizerAlgorithm::LevenbergMarquardt);
    config.lm.max_iterations = 0;

    match bootstrap_solution(&model, &mut solution, &config, &NoopListener, None) {
        Err(ItcError::BootstrapFailed {
            requested,
            succeeded,
            failed,
        }) => {
            assert_eq!(requested, 6);
            assert_eq!(succeeded, 0);
            assert_eq!(failed, 6);
        }
        other => panic!("expected BootstrapFailed, got {:?}", other),
    }
    assert!(solution.bootstrap_summary.is_none());
}

#[test]
fn test_global_bootstrap() {
    let experiments = vec![
        noisy_experiment(15.0, ModelParameters::new(1.0, -26_000.0, 2e6, 0.0), NOISE_SD, 21),
        noisy_experiment(35.0, ModelParameters::new(1.0, -34_000.0, 5e5, 0.0), NOISE_SD, 22),
    ];
    let constraints = GlobalConstraints::default().with_enthalpy(Constraint::TemperatureDependent);
    let mut config = bootstrap_config(10).with_constraints(constraints);
    config.bootstrap.global_max_parallelism = 2;

    let model =
        GlobalModel::from_experiments(&experiments, ModelKind::OneSetOfSites, constraints).unwrap();
    let mut global = model.solve(&config, None, None).unwrap();
    let point = global.heat_capacity.value;

    let listener = CountingListener::default();
    let summary = bootstrap_global(&model, &mut global, &config, &listener, None).unwrap();

    assert_eq!(summary.succeeded + summary.failed, 10);
    assert_eq!(listener.calls.load(Ordering::SeqCst), 10);
    assert_eq!(global.bootstrap_solutions.len(), summary.succeeded);
    assert_eq!(global.heat_capacity.value, point);
    assert!(global.heat_capacity.sd > 0.0);
    assert_eq!(global.enthalpy_line.slope.sd, global.heat_capacity.sd);
    for solution in &global.solutions {
        assert!(solution.n.sd > 0.0);
        assert_eq!(solution.bootstrap_summary, Some(summary));
    }
}

/// Resampled residuals blown up until every refit overflows to the
/// worst-case loss, so no refit survives.
fn overflowing_bootstrap_config(iterations: usize) -> FitConfig {
    let mut config = bootstrap_config(iterations);
    config.bootstrap.residual_scale = 1e300;
    config
}

#[test]
fn test_failed_bootstrap_keeps_the_primary_fit() {
    let truth = reference_parameters();
    let mut experiment = noisy_experiment(25.0, truth, NOISE_SD, 12);
    let primary = fit_model(
        &OneSetOfSites::new(experiment.clone()),
        &FitConfig::new(),
        None,
        None,
    )
    .unwrap();

    let solution =
        fit_experiment(&mut experiment, &overflowing_bootstrap_config(6), &NoopListener).unwrap();

    assert!(!solution.failed());
    assert_eq!(solution.n.value, primary.n.value);
    assert_eq!(solution.n.sd, 0.0);
    assert!(solution.bootstrap_solutions.is_empty());
    let summary = solution.bootstrap_summary.unwrap();
    assert!(!summary.has_error_estimate());
    assert_eq!((summary.requested, summary.succeeded, summary.failed), (6, 0, 6));

    let stored = experiment.solution.as_ref().unwrap();
    assert_eq!(stored.n, solution.n);
    assert_eq!(stored.bootstrap_summary, Some(summary));
}

#[test]
fn test_failed_global_bootstrap_keeps_the_primary_fit() {
    let mut experiments = vec![
        noisy_experiment(15.0, ModelParameters::new(1.0, -26_000.0, 2e6, 0.0), NOISE_SD, 41),
        noisy_experiment(35.0, ModelParameters::new(1.0, -34_000.0, 5e5, 0.0), NOISE_SD, 42),
    ];
    let constraints = GlobalConstraints::default().with_enthalpy(Constraint::TemperatureDependent);
    let config = overflowing_bootstrap_config(4).with_constraints(constraints);

    let global = fit_global(&mut experiments, &config, &NoopListener).unwrap();

    assert!(!global.failed());
    assert!(global.heat_capacity.value < 0.0);
    assert_eq!(global.heat_capacity.sd, 0.0);
    let summary = global.bootstrap_summary.unwrap();
    assert_eq!((summary.succeeded, summary.failed), (0, 4));
    for (experiment, solution) in experiments.iter().zip(&global.solutions) {
        assert_eq!(solution.bootstrap_summary, Some(summary));
        assert_eq!(experiment.solution.as_ref().unwrap().enthalpy, solution.enthalpy);
    }
}

#[test]
fn test_invalid_bootstrap_settings_are_rejected_before_refitting() {
    let truth = reference_parameters();
    let model = OneSetOfSites::new(noisy_experiment(25.0, truth, NOISE_SD, 13));
    let mut solution = fit_model(&model, &FitConfig::new(), None, None).unwrap();

    let listener = CountingListener::default();
    let mut config = bootstrap_config(1);
    let result = bootstrap_solution(&model, &mut solution, &config, &listener, None);
    assert!(matches!(result, Err(ItcError::InvalidConfiguration(_))));
    assert_eq!(listener.calls.load(Ordering::SeqCst), 0);

    config.bootstrap.iterations = 10;
    config.bootstrap.residual_scale = f64::NAN;
    let result = bootstrap_solution(&model, &mut solution, &config, &listener, None);
    assert!(matches!(result, Err(ItcError::InvalidConfiguration(_))));
    assert!(solution.bootstrap_summary.is_none());
}
