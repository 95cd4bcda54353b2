//! Fits driven by JSON configuration documents.

use approx::assert_relative_eq;
use itc_fit::{
    fit_experiment, fit_global, ChannelListener, Constraint, ErrorMethod, FitConfig, ItcError,
    NoopListener, OptimizerAlgorithm,
};

use crate::test_helpers::{reference_parameters, synthetic_experiment};

#[test]
fn test_fit_from_json_settings() {
    let config = FitConfig::from_json_str(
        r#"{
            "algorithm": "Simplex",
            "constraints": { "enthalpy": "SameForAll", "affinity": "None", "n": "None" },
            "parameters": { "n": { "lower": 0.5, "upper": 2.0, "step": 0.02, "initial": 1.2, "locked": false } }
        }"#,
    )
    .unwrap();
    assert_eq!(config.algorithm, OptimizerAlgorithm::Simplex);
    assert_eq!(config.constraints.enthalpy, Constraint::SameForAll);
    assert_eq!(config.parameters.n.initial, Some(1.2));

    let mut experiments = vec![
        synthetic_experiment(20.0, reference_parameters()),
        synthetic_experiment(30.0, reference_parameters()),
    ];
    let global = fit_global(&mut experiments, &config, &NoopListener).unwrap();
    assert_eq!(global.raw_parameters.len(), 7);
    assert_relative_eq!(global.solutions[0].enthalpy.value, -30_000.0, max_relative = 0.01);
    assert_eq!(global.solutions[0].enthalpy, global.solutions[1].enthalpy);
}

#[test]
fn test_saved_settings_reload_identically() {
    let mut config = FitConfig::new().with_algorithm(OptimizerAlgorithm::LevenbergMarquardt);
    config.parameters.offset = config.parameters.offset.locked_at(0.0);
    config.lm.max_iterations = 250;

    let reloaded = FitConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
    assert_eq!(reloaded, config);
    assert!(reloaded.parameters.offset.locked);
}

#[test]
fn test_invalid_settings_abort_the_fit() {
    let mut experiment = synthetic_experiment(25.0, reference_parameters());
    let mut config = FitConfig::new();
    config.parameters.enthalpy.lower = 1.0;
    config.parameters.enthalpy.upper = -1.0;

    assert!(matches!(
        fit_experiment(&mut experiment, &config, &NoopListener),
        Err(ItcError::InvalidConfiguration(_))
    ));
    assert!(experiment.solution.is_none());
}

#[test]
fn test_unusable_bootstrap_settings_abort_before_the_primary_fit() {
    let mut experiment = synthetic_experiment(25.0, reference_parameters());
    let config = FitConfig::from_json_str(
        r#"{ "error_method": "BootstrapResiduals", "bootstrap": { "iterations": 1 } }"#,
    )
    .unwrap();
    assert_eq!(config.error_method, ErrorMethod::BootstrapResiduals);

    let (listener, receiver) = ChannelListener::bounded(8);
    assert!(matches!(
        fit_experiment(&mut experiment, &config, &listener),
        Err(ItcError::InvalidConfiguration(_))
    ));
    assert_eq!(receiver.try_iter().count(), 0);
    assert!(experiment.solution.is_none());

    let mut experiments = vec![
        synthetic_experiment(20.0, reference_parameters()),
        synthetic_experiment(30.0, reference_parameters()),
    ];
    let mut config = FitConfig::new();
    config.bootstrap.global_max_parallelism = 0;
    assert!(matches!(
        fit_global(&mut experiments, &config, &NoopListener),
        Err(ItcError::InvalidConfiguration(_))
    ));
    assert!(experiments.iter().all(|e| e.solution.is_none()));
}
