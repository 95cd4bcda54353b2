//! Integrated titration data consumed by the binding models.
//!
//! An [`Experiment`] is produced by an ingestion/integration layer outside
//! this crate. Volumes are in litres, concentrations in mol/L, heats in joules
//! and the temperature in degrees Celsius.

use serde::{Deserialize, Serialize};

use crate::error::{ItcError, Result};
use crate::solution::Solution;
use crate::uncertainty::FloatWithError;

/// Offset between the Celsius and Kelvin scales.
pub const KELVIN_OFFSET: f64 = 273.15;

/// One integrated injection peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injection {
    /// Position in the titration, starting at 0
    pub id: usize,
    /// Injected volume [L]
    pub volume: f64,
    /// Moles of titrant added by this injection [mol]
    pub injection_mass: f64,
    /// Integrated heat with its noise estimate [J]
    pub peak_area: FloatWithError,
    /// Whether the injection takes part in the fit
    pub include: bool,
    /// Macromolecule concentration in the cell after this injection [M]
    pub actual_cell_concentration: f64,
    /// Titrant concentration in the cell after this injection [M]
    pub actual_titrant_concentration: f64,
}

impl Injection {
    /// Create an included injection; concentrations are filled in by the experiment.
    pub fn new(id: usize, volume: f64, peak_area: FloatWithError) -> Self {
        Self {
            id,
            volume,
            injection_mass: 0.0,
            peak_area,
            include: true,
            actual_cell_concentration: 0.0,
            actual_titrant_concentration: 0.0,
        }
    }

    /// Set whether the injection is included in the fit.
    pub fn with_include(mut self, include: bool) -> Self {
        self.include = include;
        self
    }

    /// Override the titrant amount instead of deriving it from the syringe concentration.
    pub fn with_injection_mass(mut self, injection_mass: f64) -> Self {
        self.injection_mass = injection_mass;
        self
    }

    /// Titrant to macromolecule molar ratio in the cell after this injection.
    pub fn ratio(&self) -> f64 {
        self.actual_titrant_concentration / self.actual_cell_concentration
    }

    /// Heat per mole of injected titrant [J/mol].
    pub fn molar_heat(&self) -> f64 {
        self.peak_area.value / self.injection_mass
    }
}

/// Overall sign of the measured heats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeatDirection {
    /// Heat released (negative peak areas)
    Exothermic,
    /// Heat absorbed (positive peak areas)
    Endothermic,
}

/// A titration experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// Injections in titration order
    pub injections: Vec<Injection>,
    /// Working volume of the sample cell [L]
    pub cell_volume: f64,
    /// Initial macromolecule concentration in the cell [M]
    pub cell_concentration: f64,
    /// Titrant concentration in the syringe [M]
    pub syringe_concentration: f64,
    /// Measurement temperature [°C]
    pub temperature: f64,
    /// Most recent fit result
    pub solution: Option<Solution>,
}

impl Experiment {
    /// Create an experiment and derive per-injection concentrations.
    ///
    /// Injections without an explicit `injection_mass` get `volume *
    /// syringe_concentration`. Ids are renumbered to match the order.
    pub fn new(
        cell_volume: f64,
        cell_concentration: f64,
        syringe_concentration: f64,
        temperature: f64,
        injections: Vec<Injection>,
    ) -> Result<Self> {
        if injections.is_empty() {
            return Err(ItcError::InvalidExperiment("experiment has no injections".to_string()));
        }
        if !(cell_volume > 0.0) {
            return Err(ItcError::InvalidExperiment(format!(
                "cell volume must be positive, got {}",
                cell_volume
            )));
        }
        if !(cell_concentration > 0.0) || !(syringe_concentration > 0.0) {
            return Err(ItcError::InvalidExperiment(format!(
                "concentrations must be positive (cell {}, syringe {})",
                cell_concentration, syringe_concentration
            )));
        }
        if !temperature.is_finite() || temperature <= -KELVIN_OFFSET {
            return Err(ItcError::InvalidExperiment(format!(
                "invalid temperature {} °C",
                temperature
            )));
        }
        if let Some(inj) = injections
            .iter()
            .find(|inj| !(inj.volume > 0.0) || inj.volume >= cell_volume)
        {
            return Err(ItcError::InvalidExperiment(format!(
                "injection volume {} is outside (0, cell volume)",
                inj.volume
            )));
        }

        let mut experiment = Self {
            injections,
            cell_volume,
            cell_concentration,
            syringe_concentration,
            temperature,
            solution: None,
        };
        experiment.update_concentrations();
        Ok(experiment)
    }

    /// Recompute dilution-corrected concentrations for every injection.
    ///
    /// Each injection displaces its own volume out of the cell, so after
    /// injection `i` the remaining fraction of the original cell content is
    /// `d_i = Π (1 - v_j / V)`.
    pub fn update_concentrations(&mut self) {
        let mut dilution = 1.0;
        for (i, inj) in self.injections.iter_mut().enumerate() {
            dilution *= 1.0 - inj.volume / self.cell_volume;
            inj.id = i;
            if inj.injection_mass <= 0.0 {
                inj.injection_mass = inj.volume * self.syringe_concentration;
            }
            inj.actual_cell_concentration = self.cell_concentration * dilution;
            inj.actual_titrant_concentration = self.syringe_concentration * (1.0 - dilution);
        }
    }

    /// Temperature in kelvin.
    pub fn temperature_kelvin(&self) -> f64 {
        self.temperature + KELVIN_OFFSET
    }

    /// Number of injections that take part in fits.
    pub fn included_count(&self) -> usize {
        self.injections.iter().filter(|inj| inj.include).count()
    }

    /// Sign of the average measured heat.
    pub fn average_heat_direction(&self) -> HeatDirection {
        let total: f64 = self
            .injections
            .iter()
            .filter(|inj| inj.include)
            .map(|inj| inj.peak_area.value)
            .sum();
        if total > 0.0 {
            HeatDirection::Endothermic
        } else {
            HeatDirection::Exothermic
        }
    }

    /// Copy of this experiment with new heat values and no solution.
    ///
    /// The noise estimate of each injection is kept.
    pub fn with_peak_areas(&self, peak_areas: &[f64]) -> Result<Self> {
        if peak_areas.len() != self.injections.len() {
            return Err(ItcError::DimensionMismatch(format!(
                "expected {} peak areas, got {}",
                self.injections.len(),
                peak_areas.len()
            )));
        }

        let injections = self
            .injections
            .iter()
            .zip(peak_areas)
            .map(|(inj, &area)| Injection {
                peak_area: inj.peak_area.with_value(area),
                ..inj.clone()
            })
            .collect();

        Ok(Self {
            injections,
            solution: None,
            ..self.clone()
        })
    }

    /// Store a fit result on the experiment.
    pub fn set_solution(&mut self, solution: Solution) {
        self.solution = Some(solution);
    }
}
