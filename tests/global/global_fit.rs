//! Global fits across several experiments.

use approx::assert_relative_eq;
use itc_fit::model::ModelParameters;
use itc_fit::thermo::{affinity_from_gibbs, celsius_to_kelvin};
use itc_fit::{
    fit_global, Constraint, FitConfig, GlobalConstraints, GlobalModel, ItcError, ModelKind,
    NoopListener,
};

use crate::test_helpers::synthetic_experiment;

/// Two experiments whose ΔH changes by `heat_capacity` per degree around
/// -30 kJ/mol at 25 °C.
fn temperature_pair(heat_capacity: f64) -> Vec<itc_fit::Experiment> {
    vec![
        synthetic_experiment(
            15.0,
            ModelParameters::new(1.0, -30_000.0 - 10.0 * heat_capacity, 2e6, 0.0),
        ),
        synthetic_experiment(
            35.0,
            ModelParameters::new(1.0, -30_000.0 + 10.0 * heat_capacity, 5e5, 0.0),
        ),
    ]
}

#[test]
fn test_temperature_dependent_enthalpy_recovers_heat_capacity() {
    for heat_capacity in [-400.0, 300.0] {
        let mut experiments = temperature_pair(heat_capacity);
        let constraints =
            GlobalConstraints::default().with_enthalpy(Constraint::TemperatureDependent);
        let config = FitConfig::new().with_constraints(constraints);

        let model =
            GlobalModel::from_experiments(&experiments, ModelKind::OneSetOfSites, constraints)
                .unwrap();
        assert_eq!(model.variable_count(), 8);

        let global = fit_global(&mut experiments, &config, &NoopListener).unwrap();
        assert!(!global.failed(), "{}", global.convergence);
        assert_eq!(
            global.heat_capacity.value.signum(),
            heat_capacity.signum(),
            "ΔCp {}",
            global.heat_capacity.value
        );
        assert_relative_eq!(global.heat_capacity.value, heat_capacity, max_relative = 0.02);
        assert_relative_eq!(global.standard_enthalpy.value, -30_000.0, max_relative = 0.01);
        assert_relative_eq!(global.solutions[0].affinity.value, 2e6, max_relative = 0.02);
        assert_relative_eq!(global.solutions[1].affinity.value, 5e5, max_relative = 0.02);
    }
}

#[test]
fn test_fit_global_writes_solutions_back() {
    let mut experiments = temperature_pair(-400.0);
    let global = fit_global(&mut experiments, &FitConfig::new(), &NoopListener).unwrap();

    assert_eq!(global.raw_parameters.len(), 8);
    for (experiment, solution) in experiments.iter().zip(&global.solutions) {
        let stored = experiment.solution.as_ref().unwrap();
        assert_eq!(stored.enthalpy, solution.enthalpy);
        assert_eq!(stored.temperature, experiment.temperature);
    }
    // Independent fits: ΔCp from the regression of the fitted enthalpies
    assert_relative_eq!(global.heat_capacity.value, -400.0, max_relative = 0.02);
}

#[test]
fn test_shared_stoichiometry() {
    let mut experiments: Vec<_> = [(-28_000.0, 1e6), (-30_000.0, 3e6), (-32_000.0, 5e5)]
        .iter()
        .map(|(enthalpy, affinity)| {
            synthetic_experiment(25.0, ModelParameters::new(0.9, *enthalpy, *affinity, 0.0))
        })
        .collect();
    let constraints = GlobalConstraints::default().with_n(Constraint::SameForAll);
    let config = FitConfig::new().with_constraints(constraints);

    let global = fit_global(&mut experiments, &config, &NoopListener).unwrap();
    assert_eq!(global.raw_parameters.len(), 10);
    for solution in &global.solutions {
        assert_eq!(solution.n.value, global.solutions[0].n.value);
    }
    assert_relative_eq!(global.solutions[0].n.value, 0.9, max_relative = 0.01);
    assert_relative_eq!(global.solutions[2].enthalpy.value, -32_000.0, max_relative = 0.01);
    // Single temperature: no heat capacity
    assert_eq!(global.heat_capacity.value, 0.0);
}

#[test]
fn test_shared_affinity_across_temperatures() {
    let mut experiments: Vec<_> = [(15.0, -26_000.0), (25.0, -30_000.0), (35.0, -34_000.0)]
        .iter()
        .map(|(temperature, enthalpy)| {
            synthetic_experiment(*temperature, ModelParameters::new(1.0, *enthalpy, 1e6, 0.0))
        })
        .collect();
    let constraints = GlobalConstraints::default().with_affinity(Constraint::SameForAll);
    let config = FitConfig::new().with_constraints(constraints);

    let global = fit_global(&mut experiments, &config, &NoopListener).unwrap();
    assert!(!global.failed(), "{}", global.convergence);
    // Three ΔH, one ΔG, three offsets, three N
    assert_eq!(global.raw_parameters.len(), 10);

    for solution in &global.solutions {
        assert_eq!(solution.affinity.value, global.solutions[0].affinity.value);
    }
    assert_relative_eq!(global.solutions[0].affinity.value, 1e6, max_relative = 0.01);
    assert_relative_eq!(global.solutions[0].enthalpy.value, -26_000.0, max_relative = 0.01);
    assert_relative_eq!(global.solutions[2].enthalpy.value, -34_000.0, max_relative = 0.01);

    // The shared ΔG slot converts to K at the mean temperature
    let shared_gibbs = global.raw_parameters[3];
    assert_relative_eq!(
        affinity_from_gibbs(shared_gibbs, celsius_to_kelvin(25.0)),
        global.solutions[0].affinity.value,
        max_relative = 1e-9
    );
    for (experiment, solution) in experiments.iter().zip(&global.solutions) {
        assert_eq!(experiment.solution.as_ref().unwrap().affinity, solution.affinity);
    }
}

#[test]
fn test_temperature_dependent_affinity_uses_mean_temperature() {
    // ΔG is -34 kJ/mol at 25 °C and rises by 50 J/mol per degree, and each
    // experiment's K is that ΔG converted at the 25 °C mean temperature
    let mean_kelvin = celsius_to_kelvin(25.0);
    let affinities = [
        affinity_from_gibbs(-34_500.0, mean_kelvin),
        affinity_from_gibbs(-33_500.0, mean_kelvin),
    ];
    let mut experiments = vec![
        synthetic_experiment(15.0, ModelParameters::new(1.0, -28_000.0, affinities[0], 0.0)),
        synthetic_experiment(35.0, ModelParameters::new(1.0, -32_000.0, affinities[1], 0.0)),
    ];
    let constraints = GlobalConstraints::default().with_affinity(Constraint::TemperatureDependent);
    let config = FitConfig::new().with_constraints(constraints);

    let global = fit_global(&mut experiments, &config, &NoopListener).unwrap();
    assert!(!global.failed(), "{}", global.convergence);
    assert_eq!(global.raw_parameters.len(), 8);
    for (solution, affinity) in global.solutions.iter().zip(affinities) {
        assert_relative_eq!(solution.affinity.value, affinity, max_relative = 0.02);
    }
    // Reference ΔG and its slope sit after the two enthalpies
    assert_relative_eq!(global.raw_parameters[2], -34_000.0, max_relative = 0.01);
    assert!(global.raw_parameters[3] > 0.0);
}

#[test]
fn test_configuration_errors_abort_before_fitting() {
    let mut none: Vec<itc_fit::Experiment> = Vec::new();
    assert!(matches!(
        fit_global(&mut none, &FitConfig::new(), &NoopListener),
        Err(ItcError::NoExperiments)
    ));

    let mut same_temperature = vec![
        synthetic_experiment(25.0, ModelParameters::new(1.0, -30_000.0, 1e6, 0.0)),
        synthetic_experiment(25.0, ModelParameters::new(1.0, -31_000.0, 1e6, 0.0)),
    ];
    let config = FitConfig::new().with_constraints(
        GlobalConstraints::default().with_affinity(Constraint::TemperatureDependent),
    );
    assert!(matches!(
        fit_global(&mut same_temperature, &config, &NoopListener),
        Err(ItcError::InvalidConfiguration(_))
    ));
    assert!(same_temperature.iter().all(|e| e.solution.is_none()));
}
