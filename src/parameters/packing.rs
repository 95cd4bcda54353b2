//! Mapping between the flat optimizer vector and per-experiment parameters.
//!
//! The vector is laid out in blocks, each sized by its family's
//! [`Constraint`]:
//!
//! 1. enthalpy: one value per experiment, one shared value, or the enthalpy
//!    at the mean temperature followed by the heat capacity
//! 2. affinity as Gibbs energy ΔG, with the same three shapes
//! 3. heat offsets, always one per experiment
//! 4. stoichiometry N, with the same three shapes
//!
//! A temperature-dependent family evaluates to `reference + slope * (T -
//! T_mean)` for each experiment. The association constant is recovered from
//! ΔG at the experiment's own temperature when affinity is independent and at
//! the mean temperature otherwise, including the temperature-dependent case.

use serde::{Deserialize, Serialize};

use crate::error::{ItcError, Result};
use crate::model::ModelParameters;
use crate::thermo::{affinity_from_gibbs, celsius_to_kelvin, gibbs_from_affinity};
use crate::uncertainty::{linear_fit, FloatWithError};

use super::bounds::{LockTolerance, ParameterSetting, ParameterSettings};
use super::constraints::{Constraint, GlobalConstraints, ParameterFamily};

/// Values of one parameter family in the shape its constraint dictates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FamilyValues {
    /// One value per experiment
    PerModel(Vec<f64>),
    /// One value for every experiment
    Shared(f64),
    /// Value at the mean temperature and its temperature slope
    Linear { reference: f64, slope: f64 },
}

impl FamilyValues {
    /// The constraint producing this shape.
    pub fn constraint(&self) -> Constraint {
        match self {
            FamilyValues::PerModel(_) => Constraint::None,
            FamilyValues::Shared(_) => Constraint::SameForAll,
            FamilyValues::Linear { .. } => Constraint::TemperatureDependent,
        }
    }

    /// Number of vector slots taken.
    pub fn len(&self) -> usize {
        match self {
            FamilyValues::PerModel(values) => values.len(),
            FamilyValues::Shared(_) => 1,
            FamilyValues::Linear { .. } => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value for experiment `model`, which sits `temperature_delta` degrees
    /// from the mean temperature.
    pub fn value_for(&self, model: usize, temperature_delta: f64) -> f64 {
        match self {
            FamilyValues::PerModel(values) => values[model],
            FamilyValues::Shared(value) => *value,
            FamilyValues::Linear { reference, slope } => reference + slope * temperature_delta,
        }
    }

    /// Collapse per-experiment estimates into the shape of `constraint`.
    ///
    /// Shared families take the mean; temperature-dependent families take the
    /// least-squares line through the estimates, referenced to the mean
    /// temperature.
    pub fn from_estimates(
        constraint: Constraint,
        estimates: &[f64],
        temperature_deltas: &[f64],
    ) -> Self {
        let mean = estimates.iter().sum::<f64>() / estimates.len().max(1) as f64;
        match constraint {
            Constraint::None => FamilyValues::PerModel(estimates.to_vec()),
            Constraint::SameForAll => FamilyValues::Shared(mean),
            Constraint::TemperatureDependent => {
                let y: Vec<FloatWithError> =
                    estimates.iter().map(|v| FloatWithError::exact(*v)).collect();
                match linear_fit(temperature_deltas, &y) {
                    Some(fit) => FamilyValues::Linear {
                        reference: fit.intercept.value,
                        slope: fit.slope.value,
                    },
                    None => FamilyValues::Linear {
                        reference: mean,
                        slope: 0.0,
                    },
                }
            }
        }
    }

    fn write(&self, out: &mut Vec<f64>) {
        match self {
            FamilyValues::PerModel(values) => out.extend_from_slice(values),
            FamilyValues::Shared(value) => out.push(*value),
            FamilyValues::Linear { reference, slope } => {
                out.push(*reference);
                out.push(*slope);
            }
        }
    }

    fn read(constraint: Constraint, model_count: usize, x: &[f64], cursor: &mut usize) -> Self {
        let start = *cursor;
        *cursor += constraint.variable_count(model_count);
        match constraint {
            Constraint::None => FamilyValues::PerModel(x[start..*cursor].to_vec()),
            Constraint::SameForAll => FamilyValues::Shared(x[start]),
            Constraint::TemperatureDependent => FamilyValues::Linear {
                reference: x[start],
                slope: x[start + 1],
            },
        }
    }
}

/// Decoded optimizer vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverParameters {
    /// ΔH [J/mol]; the slope is the heat capacity
    pub enthalpy: FamilyValues,
    /// ΔG [J/mol]
    pub gibbs: FamilyValues,
    /// Heat offsets, one per experiment
    pub offsets: Vec<f64>,
    /// Stoichiometry
    pub n: FamilyValues,
}

/// What a slot of the optimizer vector holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    Enthalpy,
    HeatCapacity,
    Gibbs,
    GibbsSlope,
    Offset,
    N,
    NSlope,
}

/// One slot of the optimizer vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    pub kind: VariableKind,
    /// Experiment the slot belongs to; `None` for shared and slope slots
    pub model: Option<usize>,
}

/// Vector layout for a set of experiments under a constraint set.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterLayout {
    constraints: GlobalConstraints,
    temperatures: Vec<f64>,
    mean_temperature: f64,
}

impl ParameterLayout {
    /// Create a layout for experiments at `temperatures` [°C].
    ///
    /// Fails without experiments, and for temperature-dependent constraints
    /// unless at least two distinct temperatures are present.
    pub fn new(constraints: GlobalConstraints, temperatures: Vec<f64>) -> Result<Self> {
        if temperatures.is_empty() {
            return Err(ItcError::NoExperiments);
        }
        if temperatures.iter().any(|t| !t.is_finite()) {
            return Err(ItcError::InvalidConfiguration(
                "experiment temperatures must be finite".to_string(),
            ));
        }

        let mean_temperature = temperatures.iter().sum::<f64>() / temperatures.len() as f64;

        if constraints.has_temperature_dependence() {
            let distinct = temperatures
                .iter()
                .any(|t| (t - temperatures[0]).abs() > 1e-9);
            if !distinct {
                let families: Vec<String> = [
                    ParameterFamily::Enthalpy,
                    ParameterFamily::Affinity,
                    ParameterFamily::N,
                ]
                .into_iter()
                .filter(|f| constraints.get(*f) == Constraint::TemperatureDependent)
                .map(|f| f.to_string())
                .collect();
                return Err(ItcError::InvalidConfiguration(format!(
                    "temperature-dependent {} requires experiments at two or more distinct temperatures",
                    families.join(", ")
                )));
            }
        }

        Ok(Self {
            constraints,
            temperatures,
            mean_temperature,
        })
    }

    pub fn constraints(&self) -> GlobalConstraints {
        self.constraints
    }

    pub fn model_count(&self) -> usize {
        self.temperatures.len()
    }

    /// Experiment temperatures [°C].
    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    /// Mean experiment temperature [°C].
    pub fn mean_temperature(&self) -> f64 {
        self.mean_temperature
    }

    /// `T - T_mean` for experiment `model`.
    pub fn temperature_delta(&self, model: usize) -> f64 {
        self.temperatures[model] - self.mean_temperature
    }

    /// Temperature [K] at which ΔG converts to K for experiment `model`.
    pub fn affinity_temperature(&self, model: usize) -> f64 {
        match self.constraints.affinity {
            Constraint::None => celsius_to_kelvin(self.temperatures[model]),
            Constraint::SameForAll | Constraint::TemperatureDependent => {
                celsius_to_kelvin(self.mean_temperature)
            }
        }
    }

    /// Length of the optimizer vector.
    pub fn variable_count(&self) -> usize {
        self.constraints.variable_count(self.model_count())
    }

    /// Description of every slot, in vector order.
    pub fn variables(&self) -> Vec<Variable> {
        let m = self.model_count();
        let mut variables = Vec::with_capacity(self.variable_count());

        let mut block = |constraint: Constraint, value: VariableKind, slope: VariableKind| {
            match constraint {
                Constraint::None => {
                    variables.extend((0..m).map(|i| Variable {
                        kind: value,
                        model: Some(i),
                    }));
                }
                Constraint::SameForAll => variables.push(Variable {
                    kind: value,
                    model: None,
                }),
                Constraint::TemperatureDependent => {
                    variables.push(Variable {
                        kind: value,
                        model: None,
                    });
                    variables.push(Variable {
                        kind: slope,
                        model: None,
                    });
                }
            }
        };

        block(
            self.constraints.enthalpy,
            VariableKind::Enthalpy,
            VariableKind::HeatCapacity,
        );
        block(
            self.constraints.affinity,
            VariableKind::Gibbs,
            VariableKind::GibbsSlope,
        );
        block(Constraint::None, VariableKind::Offset, VariableKind::Offset);
        block(self.constraints.n, VariableKind::N, VariableKind::NSlope);

        variables
    }

    /// Flatten `parameters` into an optimizer vector.
    pub fn pack(&self, parameters: &SolverParameters) -> Result<Vec<f64>> {
        let m = self.model_count();
        let check = |family: &str, values: &FamilyValues, constraint: Constraint| {
            if values.constraint() != constraint || values.len() != constraint.variable_count(m) {
                return Err(ItcError::DimensionMismatch(format!(
                    "{} values {:?} do not match constraint {:?} for {} experiments",
                    family, values, constraint, m
                )));
            }
            Ok(())
        };
        check("enthalpy", &parameters.enthalpy, self.constraints.enthalpy)?;
        check("affinity", &parameters.gibbs, self.constraints.affinity)?;
        check("n", &parameters.n, self.constraints.n)?;
        if parameters.offsets.len() != m {
            return Err(ItcError::DimensionMismatch(format!(
                "expected {} offsets, got {}",
                m,
                parameters.offsets.len()
            )));
        }

        let mut x = Vec::with_capacity(self.variable_count());
        parameters.enthalpy.write(&mut x);
        parameters.gibbs.write(&mut x);
        x.extend_from_slice(&parameters.offsets);
        parameters.n.write(&mut x);
        Ok(x)
    }

    /// Decode an optimizer vector.
    pub fn unpack(&self, x: &[f64]) -> Result<SolverParameters> {
        if x.len() != self.variable_count() {
            return Err(ItcError::DimensionMismatch(format!(
                "expected {} variables, got {}",
                self.variable_count(),
                x.len()
            )));
        }

        let m = self.model_count();
        let mut cursor = 0;
        let enthalpy = FamilyValues::read(self.constraints.enthalpy, m, x, &mut cursor);
        let gibbs = FamilyValues::read(self.constraints.affinity, m, x, &mut cursor);
        let offsets = x[cursor..cursor + m].to_vec();
        cursor += m;
        let n = FamilyValues::read(self.constraints.n, m, x, &mut cursor);

        Ok(SolverParameters {
            enthalpy,
            gibbs,
            offsets,
            n,
        })
    }

    /// Physical parameters of experiment `model`.
    pub fn model_parameters(&self, parameters: &SolverParameters, model: usize) -> ModelParameters {
        let delta = self.temperature_delta(model);
        let gibbs = parameters.gibbs.value_for(model, delta);
        ModelParameters {
            n: parameters.n.value_for(model, delta),
            enthalpy: parameters.enthalpy.value_for(model, delta),
            affinity: affinity_from_gibbs(gibbs, self.affinity_temperature(model)),
            offset: parameters.offsets[model],
        }
    }

    /// Physical parameters of every experiment.
    pub fn all_model_parameters(&self, parameters: &SolverParameters) -> Vec<ModelParameters> {
        (0..self.model_count())
            .map(|i| self.model_parameters(parameters, i))
            .collect()
    }

    /// Per-experiment ΔG [J/mol] as the optimizer vector represents it.
    pub fn model_gibbs(&self, parameters: &SolverParameters, model: usize) -> f64 {
        parameters
            .gibbs
            .value_for(model, self.temperature_delta(model))
    }

    /// Single-experiment vector `[ΔH, ΔG, offset, N]` of experiment `model`.
    ///
    /// ΔG is taken at the experiment's own temperature, so the vector is
    /// valid for a one-experiment layout even when affinity is shared.
    pub fn model_vector(&self, parameters: &SolverParameters, model: usize) -> Vec<f64> {
        let delta = self.temperature_delta(model);
        let gibbs = match self.constraints.affinity {
            Constraint::None => parameters.gibbs.value_for(model, delta),
            Constraint::SameForAll | Constraint::TemperatureDependent => gibbs_from_affinity(
                self.model_parameters(parameters, model).affinity,
                celsius_to_kelvin(self.temperatures[model]),
            ),
        };
        vec![
            parameters.enthalpy.value_for(model, delta),
            gibbs,
            parameters.offsets[model],
            parameters.n.value_for(model, delta),
        ]
    }

    /// Join single-experiment vectors into the vector of an all-independent
    /// layout. Inverse of [`model_vector`](Self::model_vector).
    pub fn combine_independent(&self, vectors: &[Vec<f64>]) -> Result<Vec<f64>> {
        if !self.constraints.all_independent() {
            return Err(ItcError::InvalidConfiguration(
                "only layouts without shared parameters can be combined".to_string(),
            ));
        }
        if vectors.len() != self.model_count() || vectors.iter().any(|v| v.len() != 4) {
            return Err(ItcError::DimensionMismatch(format!(
                "expected {} single-experiment vectors of length 4",
                self.model_count()
            )));
        }

        let column = |k: usize| vectors.iter().map(|v| v[k]).collect::<Vec<f64>>();
        self.pack(&SolverParameters {
            enthalpy: FamilyValues::PerModel(column(0)),
            gibbs: FamilyValues::PerModel(column(1)),
            offsets: column(2),
            n: FamilyValues::PerModel(column(3)),
        })
    }

    /// Starting point built from per-experiment guesses.
    ///
    /// User initial values in `settings` replace the matching guesses before
    /// the families are combined; user slopes replace the regression slopes.
    pub fn initial_parameters(
        &self,
        guesses: &[ModelParameters],
        settings: &ParameterSettings,
    ) -> Result<SolverParameters> {
        let m = self.model_count();
        if guesses.len() != m {
            return Err(ItcError::DimensionMismatch(format!(
                "expected {} initial guesses, got {}",
                m,
                guesses.len()
            )));
        }

        let pick = |setting: &ParameterSetting, guess: f64| setting.initial.unwrap_or(guess);
        let deltas: Vec<f64> = (0..m).map(|i| self.temperature_delta(i)).collect();

        let enthalpies: Vec<f64> = guesses
            .iter()
            .map(|g| pick(&settings.enthalpy, g.enthalpy))
            .collect();
        let gibbs: Vec<f64> = guesses
            .iter()
            .enumerate()
            .map(|(i, g)| {
                gibbs_from_affinity(pick(&settings.affinity, g.affinity), self.affinity_temperature(i))
            })
            .collect();
        let offsets: Vec<f64> = guesses
            .iter()
            .map(|g| pick(&settings.offset, g.offset))
            .collect();
        let ns: Vec<f64> = guesses.iter().map(|g| pick(&settings.n, g.n)).collect();

        let with_slope = |values: FamilyValues, setting: &ParameterSetting| match (values, setting.initial) {
            (FamilyValues::Linear { reference, .. }, Some(slope)) => {
                FamilyValues::Linear { reference, slope }
            }
            (values, _) => values,
        };

        Ok(SolverParameters {
            enthalpy: with_slope(
                FamilyValues::from_estimates(self.constraints.enthalpy, &enthalpies, &deltas),
                &settings.heat_capacity,
            ),
            gibbs: with_slope(
                FamilyValues::from_estimates(self.constraints.affinity, &gibbs, &deltas),
                &settings.affinity_slope,
            ),
            offsets,
            n: with_slope(
                FamilyValues::from_estimates(self.constraints.n, &ns, &deltas),
                &settings.n_slope,
            ),
        })
    }

    fn setting_for<'a>(&self, kind: VariableKind, settings: &'a ParameterSettings) -> &'a ParameterSetting {
        match kind {
            VariableKind::Enthalpy => &settings.enthalpy,
            VariableKind::HeatCapacity => &settings.heat_capacity,
            VariableKind::Gibbs => &settings.affinity,
            VariableKind::GibbsSlope => &settings.affinity_slope,
            VariableKind::Offset => &settings.offset,
            VariableKind::N => &settings.n,
            VariableKind::NSlope => &settings.n_slope,
        }
    }

    /// Lower and upper bounds for every slot.
    ///
    /// Affinity bounds are given for K and become ΔG bounds at the slot's
    /// conversion temperature; the larger K gives the lower ΔG.
    pub fn bounds(&self, settings: &ParameterSettings) -> (Vec<f64>, Vec<f64>) {
        self.variables()
            .into_iter()
            .map(|variable| {
                let setting = self.setting_for(variable.kind, settings);
                if variable.kind == VariableKind::Gibbs {
                    let t = match variable.model {
                        Some(i) => self.affinity_temperature(i),
                        None => celsius_to_kelvin(self.mean_temperature),
                    };
                    (
                        gibbs_from_affinity(setting.upper, t),
                        gibbs_from_affinity(setting.lower, t),
                    )
                } else {
                    (setting.lower, setting.upper)
                }
            })
            .unzip()
    }

    /// Initial simplex step for every slot.
    pub fn steps(&self, settings: &ParameterSettings) -> Vec<f64> {
        self.variables()
            .into_iter()
            .map(|variable| self.setting_for(variable.kind, settings).step)
            .collect()
    }

    /// Narrow the bounds of user-locked parameters around `center`.
    pub fn apply_user_locks(
        &self,
        settings: &ParameterSettings,
        tolerance: LockTolerance,
        center: &[f64],
        lower: &mut [f64],
        upper: &mut [f64],
    ) -> Result<()> {
        let variables = self.variables();
        if center.len() != variables.len()
            || lower.len() != variables.len()
            || upper.len() != variables.len()
        {
            return Err(ItcError::DimensionMismatch(format!(
                "expected {} variables for locking",
                variables.len()
            )));
        }

        for (i, variable) in variables.iter().enumerate() {
            let setting = self.setting_for(variable.kind, settings);
            if setting.locked {
                let (lo, hi) = tolerance.apply(lower[i], upper[i], center[i], setting.step);
                lower[i] = lo;
                upper[i] = hi;
            }
        }
        Ok(())
    }
}
