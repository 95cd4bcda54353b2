//! Per-parameter search ranges, step sizes and locks.
//!
//! Bounds are stored per physical parameter. The affinity setting holds its
//! bounds and initial value as an association constant K [1/M] while its step
//! acts on the Gibbs energy used in the optimizer vector [J/mol].

use serde::{Deserialize, Serialize};

use crate::error::{ItcError, Result};

/// Range, step and lock state for one physical parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSetting {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
    /// Initial simplex step
    pub step: f64,
    /// User-supplied starting value, replacing the heuristic guess
    #[serde(default)]
    pub initial: Option<f64>,
    /// Hold the parameter near its starting value
    #[serde(default)]
    pub locked: bool,
}

impl ParameterSetting {
    /// Create an unlocked setting without an initial value.
    pub const fn new(lower: f64, upper: f64, step: f64) -> Self {
        Self {
            lower,
            upper,
            step,
            initial: None,
            locked: false,
        }
    }

    /// Set the starting value.
    pub fn with_initial(mut self, initial: f64) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Lock the parameter at `value`.
    pub fn locked_at(mut self, value: f64) -> Self {
        self.initial = Some(value);
        self.locked = true;
        self
    }

    /// Check that the range is ordered and the step positive.
    pub fn validate(&self, name: &str) -> Result<()> {
        if !(self.lower <= self.upper) {
            return Err(ItcError::InvalidConfiguration(format!(
                "{}: lower bound {} exceeds upper bound {}",
                name, self.lower, self.upper
            )));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(ItcError::InvalidConfiguration(format!(
                "{}: step must be positive, got {}",
                name, self.step
            )));
        }
        if let Some(initial) = self.initial {
            if !initial.is_finite() {
                return Err(ItcError::InvalidConfiguration(format!(
                    "{}: initial value must be finite",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Settings for every parameter the fits can vary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSettings {
    /// Stoichiometry N
    pub n: ParameterSetting,
    /// Binding enthalpy ΔH [J/mol]
    pub enthalpy: ParameterSetting,
    /// Association constant K [1/M]; the step applies to ΔG [J/mol]
    pub affinity: ParameterSetting,
    /// Heat offset [J/mol of injectant]
    pub offset: ParameterSetting,
    /// Heat capacity change ΔCp [J/(mol K)]
    pub heat_capacity: ParameterSetting,
    /// Slope of ΔG against temperature [J/(mol K)]
    pub affinity_slope: ParameterSetting,
    /// Slope of N against temperature [1/K]
    pub n_slope: ParameterSetting,
}

impl Default for ParameterSettings {
    fn default() -> Self {
        Self {
            n: ParameterSetting::new(0.1, 10.0, 0.05),
            enthalpy: ParameterSetting::new(-500_000.0, 500_000.0, 1000.0),
            affinity: ParameterSetting::new(1e1, 1e12, 500.0),
            offset: ParameterSetting::new(-200_000.0, 200_000.0, 200.0),
            heat_capacity: ParameterSetting::new(-20_000.0, 20_000.0, 50.0),
            affinity_slope: ParameterSetting::new(-2000.0, 2000.0, 10.0),
            n_slope: ParameterSetting::new(-0.5, 0.5, 0.001),
        }
    }
}

impl ParameterSettings {
    /// Validate every setting.
    pub fn validate(&self) -> Result<()> {
        self.n.validate("n")?;
        self.enthalpy.validate("enthalpy")?;
        self.affinity.validate("affinity")?;
        if self.affinity.lower <= 0.0 {
            return Err(ItcError::InvalidConfiguration(
                "affinity: lower bound must be positive".to_string(),
            ));
        }
        if matches!(self.affinity.initial, Some(k) if k <= 0.0) {
            return Err(ItcError::InvalidConfiguration(
                "affinity: initial value must be positive".to_string(),
            ));
        }
        self.offset.validate("offset")?;
        self.heat_capacity.validate("heat_capacity")?;
        self.affinity_slope.validate("affinity_slope")?;
        self.n_slope.validate("n_slope")
    }
}

/// Width of the window a lock leaves around its center.
///
/// The half width is `relative * |center| + step_multiple * step`, so values
/// near zero still get room proportional to their step size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LockTolerance {
    pub relative: f64,
    pub step_multiple: f64,
}

impl LockTolerance {
    /// Lock for user-locked parameters: 0.01 % of the value.
    pub const TIGHT: LockTolerance = LockTolerance {
        relative: 1e-4,
        step_multiple: 0.0,
    };

    /// Lock for bootstrap warm starts: 10 % of the value plus five steps.
    pub const LOOSE: LockTolerance = LockTolerance {
        relative: 0.1,
        step_multiple: 5.0,
    };

    /// Half width of the window around `center`.
    pub fn half_width(&self, center: f64, step: f64) -> f64 {
        self.relative * center.abs() + self.step_multiple * step
    }

    /// Narrow `[lower, upper]` to the window around `center`.
    ///
    /// The window is intersected with the original range and always contains
    /// the clamped center.
    pub fn apply(&self, lower: f64, upper: f64, center: f64, step: f64) -> (f64, f64) {
        let center = center.max(lower).min(upper);
        let half_width = self.half_width(center, step);
        ((center - half_width).max(lower), (center + half_width).min(upper))
    }

    /// Both widths must be finite and non-negative.
    pub fn validate(&self, name: &str) -> Result<()> {
        for (field, value) in [("relative", self.relative), ("step_multiple", self.step_multiple)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ItcError::InvalidConfiguration(format!(
                    "{} lock: {} must be finite and non-negative, got {}",
                    name, field, value
                )));
            }
        }
        Ok(())
    }
}

/// Pair of lock tolerances used by the fitting routines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Applied to parameters the user locked
    pub tight: LockTolerance,
    /// Applied around the point estimate in bootstrap refits
    pub loose: LockTolerance,
}

impl LockSettings {
    pub fn validate(&self) -> Result<()> {
        self.tight.validate("tight")?;
        self.loose.validate("loose")
    }
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            tight: LockTolerance::TIGHT,
            loose: LockTolerance::LOOSE,
        }
    }
}

/// Starting vector for a refit plus the lock confining the search around it.
#[derive(Debug, Clone, PartialEq)]
pub struct WarmStart {
    /// Optimizer vector of the previous solution
    pub center: Vec<f64>,
    pub tolerance: LockTolerance,
}

impl WarmStart {
    pub fn new(center: Vec<f64>, tolerance: LockTolerance) -> Self {
        Self { center, tolerance }
    }

    /// Narrow `lower`/`upper` in place around the warm-start center.
    pub fn apply(&self, lower: &mut [f64], upper: &mut [f64], steps: &[f64]) -> Result<()> {
        if self.center.len() != lower.len()
            || lower.len() != upper.len()
            || steps.len() != lower.len()
        {
            return Err(ItcError::DimensionMismatch(format!(
                "warm start has {} values for {} variables",
                self.center.len(),
                lower.len()
            )));
        }
        for i in 0..lower.len() {
            let (lo, hi) = self.tolerance.apply(lower[i], upper[i], self.center[i], steps[i]);
            lower[i] = lo;
            upper[i] = hi;
        }
        Ok(())
    }
}
