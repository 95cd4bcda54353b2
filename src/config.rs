//! Settings for every fitting entry point.
//!
//! A [`FitConfig`] is passed by reference into each fit; nothing in the crate
//! keeps process-wide fitting state. All settings serialize to JSON and every
//! field has a default, so partial documents are accepted.

use serde::{Deserialize, Serialize};

use crate::error::{ItcError, Result};
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::model::ModelKind;
use crate::optimizer::{Minimizer, NelderMead, OptimizerAlgorithm, SimplexConfig};
use crate::parameters::{GlobalConstraints, LockSettings, ParameterSettings};

/// How parameter errors are estimated after a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorMethod {
    /// Point estimates only
    #[default]
    None,
    /// Residual-resampling bootstrap
    BootstrapResiduals,
}

/// Bootstrap settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of resampled refits. Default: 100
    pub iterations: usize,
    /// Worker threads for single-experiment bootstraps. Default: available cores
    pub max_parallelism: usize,
    /// Worker cap for global bootstraps, each holding copies of all
    /// experiments. Default: 10
    pub global_max_parallelism: usize,
    /// Factor applied to resampled residuals. Default: 1.0
    pub residual_scale: f64,
    /// Base seed; iteration `i` uses `seed + i`. Default: random
    pub seed: Option<u64>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            max_parallelism: std::thread::available_parallelism().map_or(4, |n| n.get()),
            global_max_parallelism: 10,
            residual_scale: 1.0,
            seed: None,
        }
    }
}

impl BootstrapConfig {
    /// Reject settings that could never yield an error estimate.
    pub fn validate(&self) -> Result<()> {
        if self.iterations < 2 {
            return Err(ItcError::InvalidConfiguration(format!(
                "bootstrap needs at least 2 iterations, got {}",
                self.iterations
            )));
        }
        if self.max_parallelism == 0 || self.global_max_parallelism == 0 {
            return Err(ItcError::InvalidConfiguration(
                "bootstrap parallelism must be at least 1".to_string(),
            ));
        }
        if !(self.residual_scale.is_finite() && self.residual_scale > 0.0) {
            return Err(ItcError::InvalidConfiguration(format!(
                "residual scale must be finite and positive, got {}",
                self.residual_scale
            )));
        }
        Ok(())
    }
}

/// Complete fit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Isotherm used by the session helpers
    pub model: ModelKind,
    /// Per-parameter bounds, steps, initial values and locks
    pub parameters: ParameterSettings,
    /// Lock tolerances
    pub locks: LockSettings,
    /// Sharing rules for global fits
    pub constraints: GlobalConstraints,
    /// Optimizer backend
    pub algorithm: OptimizerAlgorithm,
    pub simplex: SimplexConfig,
    /// Relative parameter tolerance applied to simplex runs in global fits.
    /// Default: 1e-8
    pub global_x_tol_rel: Option<f64>,
    pub lm: LmConfig,
    pub error_method: ErrorMethod,
    pub bootstrap: BootstrapConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            parameters: ParameterSettings::default(),
            locks: LockSettings::default(),
            constraints: GlobalConstraints::default(),
            algorithm: OptimizerAlgorithm::default(),
            simplex: SimplexConfig::default(),
            global_x_tol_rel: Some(1e-8),
            lm: LmConfig::default(),
            error_method: ErrorMethod::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl FitConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isotherm.
    pub fn with_model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    /// Set the optimizer backend.
    pub fn with_algorithm(mut self, algorithm: OptimizerAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the global-fit constraints.
    pub fn with_constraints(mut self, constraints: GlobalConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Set the parameter settings.
    pub fn with_parameters(mut self, parameters: ParameterSettings) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the error estimation method.
    pub fn with_error_method(mut self, error_method: ErrorMethod) -> Self {
        self.error_method = error_method;
        self
    }

    /// Set the number of bootstrap iterations.
    pub fn with_bootstrap_iterations(mut self, iterations: usize) -> Self {
        self.bootstrap.iterations = iterations;
        self
    }

    /// Set the bootstrap worker count.
    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.bootstrap.max_parallelism = max_parallelism;
        self
    }

    /// Set the bootstrap base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.bootstrap.seed = Some(seed);
        self
    }

    /// Check settings that cannot be expressed in the types.
    pub fn validate(&self) -> Result<()> {
        self.parameters.validate()?;
        self.locks.validate()?;
        self.simplex.validate()?;
        if let Some(x_tol) = self.global_x_tol_rel {
            if !(x_tol.is_finite() && x_tol > 0.0) {
                return Err(ItcError::InvalidConfiguration(format!(
                    "global x_tol_rel must be positive, got {}",
                    x_tol
                )));
            }
        }
        self.lm.validate()?;
        self.bootstrap.validate()
    }

    /// The configured optimizer backend.
    ///
    /// Simplex runs in global fits use the global parameter tolerance.
    pub fn minimizer(&self, global: bool) -> Box<dyn Minimizer> {
        match self.algorithm {
            OptimizerAlgorithm::Simplex => {
                let mut simplex = self.simplex.clone();
                if global {
                    simplex.x_tol_rel = self.global_x_tol_rel.or(simplex.x_tol_rel);
                }
                Box::new(NelderMead::with_config(simplex))
            }
            OptimizerAlgorithm::LevenbergMarquardt => {
                Box::new(LevenbergMarquardt::with_config(self.lm.clone()))
            }
        }
    }

    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::Constraint;

    #[test]
    fn test_defaults() {
        let config = FitConfig::new();
        assert_eq!(config.model, ModelKind::OneSetOfSites);
        assert_eq!(config.algorithm, OptimizerAlgorithm::Simplex);
        assert_eq!(config.error_method, ErrorMethod::None);
        assert_eq!(config.global_x_tol_rel, Some(1e-8));
        assert_eq!(config.simplex.max_evaluations, 300_000);
        assert_eq!(config.bootstrap.global_max_parallelism, 10);
        assert!(config.bootstrap.max_parallelism >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = FitConfig::new()
            .with_algorithm(OptimizerAlgorithm::LevenbergMarquardt)
            .with_constraints(GlobalConstraints::default().with_n(Constraint::SameForAll))
            .with_error_method(ErrorMethod::BootstrapResiduals)
            .with_seed(7);

        let json = config.to_json_string().unwrap();
        let back = FitConfig::from_json_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = FitConfig::from_json_str(
            r#"{ "algorithm": "LevenbergMarquardt", "bootstrap": { "iterations": 250 } }"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, OptimizerAlgorithm::LevenbergMarquardt);
        assert_eq!(config.bootstrap.iterations, 250);
        assert_eq!(config.bootstrap.residual_scale, 1.0);
        assert_eq!(config.global_x_tol_rel, Some(1e-8));
        assert_eq!(config.parameters, ParameterSettings::default());

        assert!(FitConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_validation_covers_nested_settings() {
        let mut config = FitConfig::new();
        config.bootstrap.iterations = 1;
        assert!(matches!(config.validate(), Err(ItcError::InvalidConfiguration(_))));

        let mut config = FitConfig::new();
        config.bootstrap.max_parallelism = 0;
        assert!(config.validate().is_err());

        let mut config = FitConfig::new();
        config.bootstrap.global_max_parallelism = 0;
        assert!(config.validate().is_err());

        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = FitConfig::new();
            config.bootstrap.residual_scale = scale;
            assert!(config.validate().is_err(), "scale {}", scale);
        }

        let mut config = FitConfig::new();
        config.simplex.max_evaluations = 0;
        assert!(config.validate().is_err());

        let mut config = FitConfig::new();
        config.lm.diff_step = -1e-6;
        assert!(config.validate().is_err());

        let mut config = FitConfig::new();
        config.lm.epsilon = -1.0;
        assert!(config.validate().is_err());

        let mut config = FitConfig::new();
        config.global_x_tol_rel = Some(0.0);
        assert!(config.validate().is_err());

        let mut config = FitConfig::new();
        config.locks.loose.step_multiple = -5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minimizer_selection() {
        let config = FitConfig::new();
        assert_eq!(config.minimizer(false).algorithm(), OptimizerAlgorithm::Simplex);
        let lm = config.with_algorithm(OptimizerAlgorithm::LevenbergMarquardt);
        assert_eq!(
            lm.minimizer(true).algorithm(),
            OptimizerAlgorithm::LevenbergMarquardt
        );
    }
}
