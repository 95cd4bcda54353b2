//! Straight-line regression of uncertain values against temperature.
//!
//! Used for heat capacities (ΔH vs T) and for the entropy / Gibbs energy
//! trend lines reported by global fits.

use serde::{Deserialize, Serialize};

use super::FloatWithError;

/// A fitted line `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// Slope with its standard error
    pub slope: FloatWithError,
    /// Value at `x = 0` with its standard error
    pub intercept: FloatWithError,
    /// Covariance between slope and intercept estimates
    pub covariance: f64,
}

impl LinearFit {
    /// A flat line through `value`.
    pub fn constant(value: FloatWithError) -> Self {
        Self {
            slope: FloatWithError::exact(0.0),
            intercept: value,
            covariance: 0.0,
        }
    }

    /// Evaluate the line at `x`, propagating slope/intercept uncertainty.
    pub fn evaluate(&self, x: f64) -> FloatWithError {
        let value = self.intercept.value + self.slope.value * x;
        let var = self.intercept.sd.powi(2)
            + x * x * self.slope.sd.powi(2)
            + 2.0 * x * self.covariance;
        FloatWithError::new(value, var.max(0.0).sqrt())
    }
}

/// Fit `y` against `x`.
///
/// Points are weighted by `1 / sd²` when every `y` carries a positive finite
/// sd; otherwise all points weigh the same and the parameter errors come from
/// the residual scatter. When all `x` coincide the slope is zero and the
/// intercept is the weighted mean of `y`.
///
/// Returns `None` when `x` and `y` differ in length or are empty.
pub fn linear_fit(x: &[f64], y: &[FloatWithError]) -> Option<LinearFit> {
    if x.is_empty() || x.len() != y.len() {
        return None;
    }

    let weighted = y.iter().all(|v| v.sd > 0.0 && v.sd.is_finite());
    let weights: Vec<f64> = if weighted {
        y.iter().map(|v| 1.0 / (v.sd * v.sd)).collect()
    } else {
        vec![1.0; y.len()]
    };

    let s: f64 = weights.iter().sum();
    let sx: f64 = weights.iter().zip(x).map(|(w, xi)| w * xi).sum();
    let sy: f64 = weights.iter().zip(y).map(|(w, yi)| w * yi.value).sum();
    let sxx: f64 = weights.iter().zip(x).map(|(w, xi)| w * xi * xi).sum();
    let sxy: f64 = weights
        .iter()
        .zip(x.iter().zip(y))
        .map(|(w, (xi, yi))| w * xi * yi.value)
        .sum();

    let delta = s * sxx - sx * sx;
    let x_spread = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        - x.iter().cloned().fold(f64::INFINITY, f64::min);

    if x_spread <= 0.0 || delta.abs() <= f64::EPSILON * s * sxx {
        let mean = sy / s;
        let sd = if weighted {
            (1.0 / s).sqrt()
        } else if y.len() > 1 {
            let var = y.iter().map(|v| (v.value - mean).powi(2)).sum::<f64>()
                / ((y.len() - 1) as f64 * y.len() as f64);
            var.sqrt()
        } else {
            0.0
        };
        return Some(LinearFit::constant(FloatWithError::new(mean, sd)));
    }

    let slope = (s * sxy - sx * sy) / delta;
    let intercept = (sxx * sy - sx * sxy) / delta;

    // Unweighted fits scale the covariance by the residual variance.
    let scale = if weighted {
        1.0
    } else if y.len() > 2 {
        let ssr: f64 = x
            .iter()
            .zip(y)
            .map(|(xi, yi)| (yi.value - intercept - slope * xi).powi(2))
            .sum();
        ssr / (y.len() - 2) as f64
    } else {
        0.0
    };

    Some(LinearFit {
        slope: FloatWithError::new(slope, (scale * s / delta).sqrt()),
        intercept: FloatWithError::new(intercept, (scale * sxx / delta).sqrt()),
        covariance: -scale * sx / delta,
    })
}
