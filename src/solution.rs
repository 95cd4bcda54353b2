//! Fit results and the thermodynamic quantities derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ItcError, Result};
use crate::model::{ModelKind, ModelParameters};
use crate::optimizer::Convergence;
use crate::parameters::{FamilyValues, GlobalConstraints, ParameterLayout};
use crate::thermo::{celsius_to_kelvin, GAS_CONSTANT, REFERENCE_TEMPERATURE};
use crate::uncertainty::{linear_fit, FloatWithError, LinearFit};

/// Outcome counts of a bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    /// Iterations asked for
    pub requested: usize,
    /// Iterations whose refit converged
    pub succeeded: usize,
    /// Iterations dropped because the refit failed
    pub failed: usize,
}

impl BootstrapSummary {
    /// True when enough refits survived to give every quantity a spread.
    pub fn has_error_estimate(&self) -> bool {
        self.succeeded >= 2
    }

    /// Fraction of iterations that were dropped.
    pub fn failure_fraction(&self) -> f64 {
        if self.requested == 0 {
            0.0
        } else {
            self.failed as f64 / self.requested as f64
        }
    }
}

/// Standard deviation of `quantity` over the bootstrap children.
fn spread<T>(children: &[T], quantity: impl Fn(&T) -> f64) -> f64 {
    let samples: Vec<f64> = children.iter().map(quantity).collect();
    FloatWithError::from_distribution(&samples).map_or(0.0, |d| d.sd)
}

fn require_children(count: usize) -> Result<()> {
    if count < 2 {
        return Err(ItcError::Other(format!(
            "error estimation needs at least two bootstrap solutions, got {}",
            count
        )));
    }
    Ok(())
}

/// Result of fitting one experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Isotherm that produced the result
    pub model_kind: ModelKind,
    /// Experiment temperature [°C]
    pub temperature: f64,
    /// Optimizer vector the parameters were decoded from
    pub raw_parameters: Vec<f64>,
    /// Stoichiometry
    pub n: FloatWithError,
    /// ΔH [J/mol]
    pub enthalpy: FloatWithError,
    /// K [1/M]
    pub affinity: FloatWithError,
    /// Heat offset [J/mol]
    pub offset: FloatWithError,
    /// ΔG = -RT ln K [J/mol]
    pub gibbs: FloatWithError,
    /// -TΔS = ΔG - ΔH [J/mol]
    pub minus_t_delta_s: FloatWithError,
    /// RMSD of the fit [J]
    pub loss: f64,
    pub convergence: Convergence,
    /// Refits on resampled data used for the error bars
    #[serde(default)]
    pub bootstrap_solutions: Vec<Solution>,
    /// Set once a bootstrap ran, including one that kept too few refits
    #[serde(default)]
    pub bootstrap_summary: Option<BootstrapSummary>,
}

impl Solution {
    /// Build a solution from fitted values; errors start at zero.
    pub fn new(
        model_kind: ModelKind,
        temperature: f64,
        parameters: ModelParameters,
        raw_parameters: Vec<f64>,
        loss: f64,
        convergence: Convergence,
    ) -> Self {
        let t = celsius_to_kelvin(temperature);
        let gibbs = -GAS_CONSTANT * t * parameters.affinity.ln();
        Self {
            model_kind,
            temperature,
            raw_parameters,
            n: parameters.n.into(),
            enthalpy: parameters.enthalpy.into(),
            affinity: parameters.affinity.into(),
            offset: parameters.offset.into(),
            gibbs: gibbs.into(),
            minus_t_delta_s: (gibbs - parameters.enthalpy).into(),
            loss,
            convergence,
            bootstrap_solutions: Vec::new(),
            bootstrap_summary: None,
        }
    }

    /// Fitted point estimates.
    pub fn parameters(&self) -> ModelParameters {
        ModelParameters {
            n: self.n.value,
            enthalpy: self.enthalpy.value,
            affinity: self.affinity.value,
            offset: self.offset.value,
        }
    }

    /// Whether the optimizer flagged the result.
    pub fn failed(&self) -> bool {
        self.convergence.failed
    }

    pub fn temperature_kelvin(&self) -> f64 {
        celsius_to_kelvin(self.temperature)
    }

    /// ΔS = (ΔH - ΔG) / T [J/(mol K)].
    pub fn entropy(&self) -> FloatWithError {
        -self.minus_t_delta_s / self.temperature_kelvin()
    }

    /// Kd = 1 / K [M].
    pub fn dissociation_constant(&self) -> FloatWithError {
        FloatWithError::exact(1.0) / self.affinity
    }

    /// Store bootstrap refits and replace every error with the spread of the
    /// refits. Point estimates are kept.
    pub fn apply_bootstrap(
        &mut self,
        children: Vec<Solution>,
        summary: BootstrapSummary,
    ) -> Result<()> {
        require_children(children.len())?;

        self.n.sd = spread(&children, |s| s.n.value);
        self.enthalpy.sd = spread(&children, |s| s.enthalpy.value);
        self.affinity.sd = spread(&children, |s| s.affinity.value);
        self.offset.sd = spread(&children, |s| s.offset.value);
        self.gibbs.sd = spread(&children, |s| s.gibbs.value);
        self.minus_t_delta_s.sd = spread(&children, |s| s.minus_t_delta_s.value);

        self.bootstrap_solutions = children;
        self.bootstrap_summary = Some(summary);
        Ok(())
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} at {:.2} °C:", self.model_kind, self.temperature)?;
        writeln!(f, "  N:      {}", self.n)?;
        writeln!(f, "  ΔH:     {} J/mol", self.enthalpy)?;
        writeln!(f, "  K:      {} 1/M", self.affinity)?;
        writeln!(f, "  ΔG:     {} J/mol", self.gibbs)?;
        writeln!(f, "  -TΔS:   {} J/mol", self.minus_t_delta_s)?;
        writeln!(f, "  offset: {} J/mol", self.offset)?;
        writeln!(f, "  RMSD:   {:.4e} J", self.loss)?;
        if let Some(summary) = &self.bootstrap_summary {
            writeln!(
                f,
                "  bootstrap: {}/{} succeeded",
                summary.succeeded, summary.requested
            )?;
        }
        write!(f, "{}", self.convergence)
    }
}

/// Result of a global fit over several experiments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSolution {
    /// Constraint set used for the fit
    pub constraints: GlobalConstraints,
    /// Optimizer vector
    pub raw_parameters: Vec<f64>,
    /// Per-experiment results, in experiment order
    pub solutions: Vec<Solution>,
    /// ΔH at 25 °C [J/mol]
    pub standard_enthalpy: FloatWithError,
    /// ΔCp [J/(mol K)]
    pub heat_capacity: FloatWithError,
    /// ΔH against temperature [°C]
    pub enthalpy_line: LinearFit,
    /// -TΔS against temperature [°C]
    pub entropy_line: LinearFit,
    /// ΔG against temperature [°C]
    pub gibbs_line: LinearFit,
    /// Sum of per-experiment RMSDs [J]
    pub loss: f64,
    pub convergence: Convergence,
    #[serde(default)]
    pub bootstrap_solutions: Vec<GlobalSolution>,
    #[serde(default)]
    pub bootstrap_summary: Option<BootstrapSummary>,
}

fn line_through(solutions: &[Solution], quantity: impl Fn(&Solution) -> FloatWithError) -> LinearFit {
    let x: Vec<f64> = solutions.iter().map(|s| s.temperature).collect();
    let y: Vec<FloatWithError> = solutions.iter().map(quantity).collect();
    linear_fit(&x, &y).unwrap_or_else(|| LinearFit::constant(FloatWithError::exact(0.0)))
}

impl GlobalSolution {
    /// Assemble a global result and derive the temperature trends.
    ///
    /// With temperature-dependent enthalpy the heat capacity is the fitted
    /// slope; otherwise it is the slope of the per-experiment ΔH against
    /// temperature, zero when all experiments share one temperature.
    pub fn new(
        layout: &ParameterLayout,
        raw_parameters: Vec<f64>,
        solutions: Vec<Solution>,
        loss: f64,
        convergence: Convergence,
    ) -> Result<Self> {
        if solutions.len() != layout.model_count() {
            return Err(ItcError::DimensionMismatch(format!(
                "expected {} solutions, got {}",
                layout.model_count(),
                solutions.len()
            )));
        }
        let decoded = layout.unpack(&raw_parameters)?;

        let enthalpy_line = match decoded.enthalpy {
            FamilyValues::Linear { reference, slope } => LinearFit {
                slope: FloatWithError::exact(slope),
                intercept: FloatWithError::exact(reference - slope * layout.mean_temperature()),
                covariance: 0.0,
            },
            _ => line_through(&solutions, |s| s.enthalpy),
        };

        let mut solution = Self {
            constraints: layout.constraints(),
            raw_parameters,
            standard_enthalpy: enthalpy_line.evaluate(REFERENCE_TEMPERATURE),
            heat_capacity: enthalpy_line.slope,
            enthalpy_line,
            entropy_line: LinearFit::constant(FloatWithError::exact(0.0)),
            gibbs_line: LinearFit::constant(FloatWithError::exact(0.0)),
            solutions,
            loss,
            convergence,
            bootstrap_solutions: Vec::new(),
            bootstrap_summary: None,
        };
        solution.update_lines();
        Ok(solution)
    }

    fn update_lines(&mut self) {
        self.entropy_line = line_through(&self.solutions, |s| s.minus_t_delta_s);
        self.gibbs_line = line_through(&self.solutions, |s| s.gibbs);
    }

    /// Experiment temperatures [°C].
    pub fn temperatures(&self) -> Vec<f64> {
        self.solutions.iter().map(|s| s.temperature).collect()
    }

    pub fn failed(&self) -> bool {
        self.convergence.failed
    }

    /// Store bootstrap refits and replace every error with the spread of the
    /// refits. Point estimates are kept. The -TΔS and ΔG lines are refitted
    /// with the new errors as weights; the ΔH line keeps its point estimate
    /// and takes the ΔCp spread as its slope error.
    pub fn apply_bootstrap(
        &mut self,
        children: Vec<GlobalSolution>,
        summary: BootstrapSummary,
    ) -> Result<()> {
        require_children(children.len())?;
        if children
            .iter()
            .any(|c| c.solutions.len() != self.solutions.len())
        {
            return Err(ItcError::DimensionMismatch(
                "bootstrap solution has a different number of experiments".to_string(),
            ));
        }

        for (i, solution) in self.solutions.iter_mut().enumerate() {
            let per_experiment: Vec<Solution> =
                children.iter().map(|c| c.solutions[i].clone()).collect();
            solution.apply_bootstrap(per_experiment, summary)?;
        }

        self.standard_enthalpy.sd = spread(&children, |c| c.standard_enthalpy.value);
        self.heat_capacity.sd = spread(&children, |c| c.heat_capacity.value);

        // The ΔH line stays the one ΔCp and ΔH(25 °C) were read from
        self.enthalpy_line.slope.sd = self.heat_capacity.sd;
        self.update_lines();

        self.bootstrap_solutions = children;
        self.bootstrap_summary = Some(summary);
        Ok(())
    }
}

impl fmt::Display for GlobalSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Global fit of {} experiments:", self.solutions.len())?;
        writeln!(f, "  ΔH(25 °C): {} J/mol", self.standard_enthalpy)?;
        writeln!(f, "  ΔCp:       {} J/(mol K)", self.heat_capacity)?;
        writeln!(f, "  loss:      {:.4e} J", self.loss)?;
        for solution in &self.solutions {
            write!(f, "{}", solution)?;
        }
        Ok(())
    }
}
