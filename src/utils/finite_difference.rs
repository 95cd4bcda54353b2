//! Finite difference methods for numerical differentiation.

use ndarray::{Array1, Array2};

use crate::error::{ItcError, Result};
use crate::problem::Problem;

/// Default step size for finite differences.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Compute the Jacobian matrix using forward finite differences.
///
/// The Jacobian is the matrix of partial derivatives of the residuals with
/// respect to the parameters: J[i,j] = ∂residual[i]/∂param[j]. The step is
/// `epsilon * |param|`, or `epsilon` for parameters smaller than `epsilon`.
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let steps: Vec<f64> = params
        .iter()
        .map(|p| if p.abs() > eps { p.abs() * eps } else { eps })
        .collect();
    let residuals = problem.eval(params)?;
    let upper = vec![f64::INFINITY; params.len()];
    jacobian_bounded(problem, params, &residuals, &steps, &upper)
}

/// Forward-difference Jacobian with explicit per-parameter steps.
///
/// `residuals` must be the residuals at `params`. A step that would cross
/// `upper` is taken backwards instead, so the problem is never evaluated
/// outside the box.
pub fn jacobian_bounded(
    problem: &dyn Problem,
    params: &Array1<f64>,
    residuals: &Array1<f64>,
    steps: &[f64],
    upper: &[f64],
) -> Result<Array2<f64>> {
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    if residuals.len() != n_residuals {
        return Err(ItcError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }
    if steps.len() != n_params || upper.len() != n_params {
        return Err(ItcError::DimensionMismatch(format!(
            "Expected {} steps and bounds, got {} and {}",
            n_params,
            steps.len(),
            upper.len()
        )));
    }

    let mut jac = Array2::zeros((n_residuals, n_params));

    for j in 0..n_params {
        let mut params_perturbed = params.clone();
        let h = if params[j] + steps[j] > upper[j] {
            -steps[j]
        } else {
            steps[j]
        };
        params_perturbed[j] += h;

        let residuals_perturbed = problem.eval(&params_perturbed)?;

        for i in 0..n_residuals {
            jac[[i, j]] = (residuals_perturbed[i] - residuals[i]) / h;
        }
    }

    Ok(jac)
}
