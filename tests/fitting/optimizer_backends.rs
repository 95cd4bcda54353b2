//! The bounded `minimize` contract, exercised through the public API with
//! both backends.

use approx::assert_relative_eq;
use itc_fit::optimizer::{Minimizer, SimplexConfig, WORST_CASE_LOSS};
use itc_fit::{minimize, ConvergenceStatus, LevenbergMarquardt, NelderMead};

fn backends() -> Vec<Box<dyn Minimizer>> {
    vec![
        Box::new(NelderMead::with_config(SimplexConfig::default())),
        Box::new(LevenbergMarquardt::new()),
    ]
}

/// Distance from (1, -2, 3); a scalar loss shaped like an RMSD.
fn distance(x: &[f64]) -> f64 {
    ((x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2) + (x[2] - 3.0).powi(2)).sqrt()
}

#[test]
fn test_fixed_dimension_is_held() {
    for backend in backends() {
        let outcome = minimize(
            backend.as_ref(),
            &distance,
            &[-10.0, -10.0, 0.5],
            &[10.0, 10.0, 0.5],
            &[0.0, 0.0, 0.5],
            &[0.5, 0.5, 0.5],
            None,
        )
        .unwrap();

        assert_eq!(outcome.parameters[2], 0.5, "{}", backend.algorithm());
        assert_relative_eq!(outcome.parameters[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(outcome.parameters[1], -2.0, epsilon = 1e-3);
        assert_relative_eq!(outcome.convergence.final_loss, 2.5, epsilon = 1e-3);
    }
}

#[test]
fn test_minimum_outside_the_box_ends_on_the_boundary() {
    for backend in backends() {
        let outcome = minimize(
            backend.as_ref(),
            &distance,
            &[-10.0, -1.0, -10.0],
            &[10.0, 10.0, 10.0],
            &[5.0, 5.0, 5.0],
            &[0.5, 0.5, 0.5],
            None,
        )
        .unwrap();

        let x = &outcome.parameters;
        assert!(x[1] >= -1.0, "{}: {:?}", backend.algorithm(), x);
        assert_relative_eq!(x[1], -1.0, epsilon = 1e-3);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-2);
        assert_relative_eq!(x[2], 3.0, epsilon = 1e-2);
    }
}

#[test]
fn test_non_finite_region_is_avoided() {
    // Undefined for x[0] < 0, like an isotherm with negative stoichiometry
    let objective = |x: &[f64]| -> f64 {
        if x[0] < 0.0 {
            f64::NAN
        } else {
            (x[0].sqrt() - 0.5).powi(2) + (x[1] - 1.0).powi(2)
        }
    };

    let outcome = minimize(
        &NelderMead::new(),
        &objective,
        &[-1.0, -5.0],
        &[5.0, 5.0],
        &[2.0, 0.0],
        &[1.0, 1.0],
        None,
    )
    .unwrap();

    assert!(outcome.parameters.iter().all(|v| v.is_finite()));
    assert!(outcome.convergence.final_loss < WORST_CASE_LOSS);
    assert_relative_eq!(outcome.parameters[0], 0.25, epsilon = 1e-3);
    assert!(!outcome.convergence.failed);
}

#[test]
fn test_evaluation_budget_marks_failure() {
    let outcome = minimize(
        &NelderMead::new().with_max_evaluations(10),
        &distance,
        &[-10.0; 3],
        &[10.0; 3],
        &[5.0; 3],
        &[0.5; 3],
        None,
    )
    .unwrap();

    assert_eq!(outcome.convergence.status, ConvergenceStatus::MaxEvaluationsReached);
    assert!(outcome.convergence.failed);
    assert!(outcome.convergence.evaluations < 20);
}
