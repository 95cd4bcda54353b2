//! One set of independent, identical binding sites.
//!
//! The total bound heat after injection i is
//!
//! Q(i) = (ncell ΔH V / 2) (b - sqrt(b² - 4a)),
//! a = X / ncell, b = 1 + a + 1 / (K ncell), ncell = N M
//!
//! where M and X are the dilution-corrected macromolecule and titrant
//! concentrations. The heat of injection i corrects for the liquid displaced
//! from the working volume:
//!
//! ΔQ(i) = Q(i) + (v / V) (Q(i) + Q(i-1)) / 2 - Q(i-1)

use crate::experiment::Experiment;
use crate::model::{BindingModel, ModelKind, ModelParameters};

/// Association constant used as the starting guess.
const AFFINITY_GUESS: f64 = 1e6;

/// Number of trailing injections averaged for the offset guess.
const PLATEAU_INJECTIONS: usize = 3;

/// The one-set-of-sites isotherm.
#[derive(Debug, Clone)]
pub struct OneSetOfSites {
    experiment: Experiment,
    excluded_injection: Option<usize>,
}

impl OneSetOfSites {
    /// Create a model for `experiment`.
    pub fn new(experiment: Experiment) -> Self {
        Self {
            experiment,
            excluded_injection: None,
        }
    }

    /// Leave one injection out of the loss.
    pub fn with_excluded_injection(mut self, index: Option<usize>) -> Self {
        self.excluded_injection = index;
        self
    }

    /// Total heat of the bound complex after injection `index` [J].
    fn bound_heat(&self, index: usize, parameters: &ModelParameters) -> f64 {
        let injection = &self.experiment.injections[index];
        let ncell = parameters.n * injection.actual_cell_concentration;
        let a = injection.actual_titrant_concentration / ncell;
        let b = 1.0 + a + 1.0 / (parameters.affinity * ncell);

        // b - sqrt(b² - 4a) loses every digit to cancellation when binding
        // is tight; the conjugate form does not.
        let discriminant = (b * b - 4.0 * a).max(0.0);
        let bracket = 4.0 * a / (b + discriminant.sqrt());

        ncell * parameters.enthalpy * self.experiment.cell_volume / 2.0 * bracket
    }
}

impl BindingModel for OneSetOfSites {
    fn kind(&self) -> ModelKind {
        ModelKind::OneSetOfSites
    }

    fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    fn excluded_injection(&self) -> Option<usize> {
        self.excluded_injection
    }

    fn evaluate(&self, index: usize, parameters: &ModelParameters) -> f64 {
        let injection = &self.experiment.injections[index];
        let q = self.bound_heat(index, parameters);
        let q_previous = if index == 0 {
            0.0
        } else {
            self.bound_heat(index - 1, parameters)
        };
        let displaced = injection.volume / self.experiment.cell_volume;

        let dq = q + displaced * (q + q_previous) / 2.0 - q_previous;
        dq + parameters.offset * injection.injection_mass
    }

    fn initial_guess(&self) -> ModelParameters {
        let injections = &self.experiment.injections;
        let mut fitted: Vec<_> = injections.iter().filter(|inj| inj.include).collect();
        if fitted.is_empty() {
            fitted = injections.iter().collect();
        }

        let n = injections.last().map_or(1.0, |inj| inj.ratio() / 2.0);

        let tail = &fitted[fitted.len().saturating_sub(PLATEAU_INJECTIONS)..];
        let offset = if tail.is_empty() {
            0.0
        } else {
            tail.iter().map(|inj| inj.molar_heat()).sum::<f64>() / tail.len() as f64
        };

        let enthalpy = fitted.first().map_or(0.0, |inj| inj.molar_heat()) - offset;

        ModelParameters {
            n: if n.is_finite() && n > 0.0 { n } else { 1.0 },
            enthalpy: if enthalpy.is_finite() { enthalpy } else { 0.0 },
            affinity: AFFINITY_GUESS,
            offset: if offset.is_finite() { offset } else { 0.0 },
        }
    }

    fn with_experiment(&self, experiment: Experiment) -> Box<dyn BindingModel> {
        Box::new(Self {
            experiment,
            excluded_injection: self.excluded_injection,
        })
    }
}
