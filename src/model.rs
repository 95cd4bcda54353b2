//! Binding model trait and the physical parameter set it evaluates.
//!
//! This module defines the [`BindingModel`] trait, which provides a common
//! interface for predicting injection heats from (N, ΔH, K, offset),
//! calculating residuals against the measured heats, and scoring a parameter
//! set with a loss function. Concrete isotherms live in [`crate::models`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::experiment::Experiment;
use crate::models::OneSetOfSites;
use crate::optimizer::WORST_CASE_LOSS;

/// Physical parameters of one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Stoichiometry (sites per macromolecule)
    pub n: f64,
    /// Binding enthalpy ΔH [J/mol]
    pub enthalpy: f64,
    /// Association constant K [1/M]
    pub affinity: f64,
    /// Heat offset per mole of injected titrant [J/mol]
    pub offset: f64,
}

impl ModelParameters {
    pub fn new(n: f64, enthalpy: f64, affinity: f64, offset: f64) -> Self {
        Self {
            n,
            enthalpy,
            affinity,
            offset,
        }
    }

    /// True when every value is finite.
    pub fn is_finite(&self) -> bool {
        self.n.is_finite()
            && self.enthalpy.is_finite()
            && self.affinity.is_finite()
            && self.offset.is_finite()
    }
}

/// Form of the loss returned by [`BindingModel::loss`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    /// Sum of squared residuals
    SumOfSquares,
    /// Root mean squared residual
    Rmsd,
}

/// Available isotherms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelKind {
    /// Independent identical binding sites
    #[default]
    OneSetOfSites,
}

impl ModelKind {
    /// Build a model of this kind around `experiment`.
    pub fn build(&self, experiment: Experiment) -> Box<dyn BindingModel> {
        match self {
            ModelKind::OneSetOfSites => Box::new(OneSetOfSites::new(experiment)),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::OneSetOfSites => write!(f, "One set of sites"),
        }
    }
}

/// A model predicting the heat of every injection of its experiment.
///
/// Implementations own their experiment. Models are shared across bootstrap
/// worker threads and must therefore be `Send + Sync`.
pub trait BindingModel: Send + Sync + fmt::Debug {
    /// Which isotherm this is.
    fn kind(&self) -> ModelKind;

    /// The experiment being modelled.
    fn experiment(&self) -> &Experiment;

    /// Injection left out of the loss as an outlier, if any.
    fn excluded_injection(&self) -> Option<usize>;

    /// Predicted heat of injection `index` [J].
    ///
    /// # Arguments
    ///
    /// * `index` - Position of the injection in the experiment
    /// * `parameters` - The physical parameters to evaluate
    ///
    /// # Returns
    ///
    /// * The predicted heat including the offset term; may be non-finite for
    ///   unphysical parameters
    fn evaluate(&self, index: usize, parameters: &ModelParameters) -> f64;

    /// Heuristic starting point derived from the data.
    fn initial_guess(&self) -> ModelParameters;

    /// The same model (including its excluded injection) around another experiment.
    fn with_experiment(&self, experiment: Experiment) -> Box<dyn BindingModel>;

    /// Predicted heats for all injections, included or not.
    fn predicted(&self, parameters: &ModelParameters) -> Vec<f64> {
        (0..self.experiment().injections.len())
            .map(|i| self.evaluate(i, parameters))
            .collect()
    }

    /// Whether injection `index` contributes to the loss.
    fn is_fitted(&self, index: usize) -> bool {
        self.experiment()
            .injections
            .get(index)
            .map_or(false, |inj| inj.include)
            && self.excluded_injection() != Some(index)
    }

    /// Number of injections contributing to the loss.
    fn fitted_count(&self) -> usize {
        (0..self.experiment().injections.len())
            .filter(|&i| self.is_fitted(i))
            .count()
    }

    /// Residuals `predicted - observed` over the fitted injections, in order.
    fn residuals(&self, parameters: &ModelParameters) -> Vec<f64> {
        let injections = &self.experiment().injections;
        (0..injections.len())
            .filter(|&i| self.is_fitted(i))
            .map(|i| self.evaluate(i, parameters) - injections[i].peak_area.value)
            .collect()
    }

    /// Loss over the fitted injections.
    ///
    /// Non-finite results, and experiments without fitted injections, give
    /// [`WORST_CASE_LOSS`].
    fn loss(&self, parameters: &ModelParameters, kind: LossKind) -> f64 {
        let residuals = self.residuals(parameters);
        if residuals.is_empty() {
            return WORST_CASE_LOSS;
        }
        let sum_of_squares: f64 = residuals.iter().map(|r| r * r).sum();
        let loss = match kind {
            LossKind::SumOfSquares => sum_of_squares,
            LossKind::Rmsd => (sum_of_squares / residuals.len() as f64).sqrt(),
        };
        if loss.is_finite() {
            loss
        } else {
            WORST_CASE_LOSS
        }
    }
}
