//! Parameter recovery from synthetic titrations.

use approx::assert_relative_eq;
use itc_fit::model::{BindingModel, LossKind, ModelParameters};
use itc_fit::models::OneSetOfSites;
use itc_fit::optimizer::ConvergenceStatus;
use itc_fit::{fit_model, FitConfig, OptimizerAlgorithm};

use crate::test_helpers::{noisy_experiment, reference_parameters, synthetic_experiment, NOISE_SD};

#[test]
fn test_simplex_recovers_noise_free_parameters() {
    let truth = reference_parameters();
    let model = OneSetOfSites::new(synthetic_experiment(25.0, truth));

    let solution = fit_model(&model, &FitConfig::new(), None, None).unwrap();

    assert!(!solution.failed(), "{}", solution.convergence);
    assert!(solution.convergence.status.is_converged());
    assert_relative_eq!(solution.n.value, truth.n, max_relative = 0.01);
    assert_relative_eq!(solution.enthalpy.value, truth.enthalpy, max_relative = 0.01);
    assert_relative_eq!(solution.affinity.value, truth.affinity, max_relative = 0.01);
    assert!(solution.offset.value.abs() < 300.0);
    assert!(solution.loss < 1e-10);
}

#[test]
fn test_recovery_across_affinities() {
    for affinity in [1e5, 1e6, 1e7] {
        let truth = ModelParameters::new(0.8, -45_000.0, affinity, 0.0);
        let model = OneSetOfSites::new(synthetic_experiment(30.0, truth));

        let solution = fit_model(&model, &FitConfig::new(), None, None).unwrap();
        assert!(!solution.failed(), "K = {}: {}", affinity, solution.convergence);
        assert_relative_eq!(solution.n.value, 0.8, max_relative = 0.01);
        assert_relative_eq!(solution.enthalpy.value, -45_000.0, max_relative = 0.01);
        assert_relative_eq!(solution.affinity.value, affinity, max_relative = 0.01);
    }
}

#[test]
fn test_endothermic_binding() {
    let truth = ModelParameters::new(1.0, 20_000.0, 5e5, 0.0);
    let model = OneSetOfSites::new(synthetic_experiment(25.0, truth));

    let solution = fit_model(&model, &FitConfig::new(), None, None).unwrap();
    assert!(solution.enthalpy.value > 0.0);
    assert_relative_eq!(solution.enthalpy.value, 20_000.0, max_relative = 0.01);
    assert!(solution.minus_t_delta_s.value < 0.0);
}

#[test]
fn test_levenberg_marquardt_improves_on_the_guess() {
    let truth = reference_parameters();
    let model = OneSetOfSites::new(synthetic_experiment(25.0, truth));
    let initial_loss = model.loss(&model.initial_guess(), LossKind::Rmsd);

    let config = FitConfig::new().with_algorithm(OptimizerAlgorithm::LevenbergMarquardt);
    let solution = fit_model(&model, &config, None, None).unwrap();

    assert_eq!(solution.convergence.algorithm, OptimizerAlgorithm::LevenbergMarquardt);
    assert!(solution.loss < initial_loss / 10.0);
    assert_relative_eq!(solution.n.value, truth.n, max_relative = 0.02);
    assert_relative_eq!(solution.enthalpy.value, truth.enthalpy, max_relative = 0.05);
}

#[test]
fn test_noisy_fit_reports_rmsd_near_noise_level() {
    let truth = reference_parameters();
    let model = OneSetOfSites::new(noisy_experiment(25.0, truth, NOISE_SD, 7));

    let solution = fit_model(&model, &FitConfig::new(), None, None).unwrap();
    assert!(!solution.failed());
    assert!(solution.loss > 0.3 * NOISE_SD && solution.loss < 2.0 * NOISE_SD);
    assert_relative_eq!(solution.n.value, 1.0, max_relative = 0.02);

    // Sum of squares and RMSD describe the same residuals
    let parameters = solution.parameters();
    let ss = model.loss(&parameters, LossKind::SumOfSquares);
    let rmsd = model.loss(&parameters, LossKind::Rmsd);
    assert_relative_eq!(ss, rmsd * rmsd * model.fitted_count() as f64, max_relative = 1e-12);
}

#[test]
fn test_excluded_injections_do_not_influence_fit() {
    let truth = reference_parameters();
    let mut experiment = synthetic_experiment(25.0, truth);
    experiment.injections[0].peak_area.value *= 3.0;
    experiment.injections[0].include = false;

    let outlier = experiment.injections[5].peak_area.value * 2.0;
    experiment.injections[5].peak_area.value = outlier;
    let model = OneSetOfSites::new(experiment).with_excluded_injection(Some(5));

    let solution = fit_model(&model, &FitConfig::new(), None, None).unwrap();
    assert_eq!(model.fitted_count(), 23);
    assert_relative_eq!(solution.n.value, 1.0, max_relative = 0.01);
    assert_relative_eq!(solution.enthalpy.value, -30_000.0, max_relative = 0.01);
}

#[test]
fn test_fully_locked_parameters_are_not_optimized() {
    let truth = reference_parameters();
    let model = OneSetOfSites::new(synthetic_experiment(25.0, truth));

    let mut config = FitConfig::new();
    config.locks.tight.relative = 0.0;
    config.parameters.n = config.parameters.n.locked_at(1.0);
    config.parameters.enthalpy = config.parameters.enthalpy.locked_at(-30_000.0);
    config.parameters.affinity = config.parameters.affinity.locked_at(1e6);
    config.parameters.offset = config.parameters.offset.locked_at(0.0);

    let solution = fit_model(&model, &config, None, None).unwrap();
    assert_eq!(solution.convergence.status, ConvergenceStatus::NothingToOptimize);
    assert_eq!(solution.convergence.evaluations, 1);
    assert_eq!(solution.n.value, 1.0);
    assert!(!solution.failed());
}
