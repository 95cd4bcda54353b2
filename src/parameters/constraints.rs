//! Constraint rules linking parameters across experiments in a global fit.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How one parameter family is shared between the experiments of a global fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Constraint {
    /// Every experiment has its own value
    #[default]
    None,
    /// One value for all experiments
    SameForAll,
    /// A reference value at the mean temperature plus a linear temperature slope
    TemperatureDependent,
}

impl Constraint {
    /// All constraint kinds, in declaration order.
    pub const ALL: [Constraint; 3] = [
        Constraint::None,
        Constraint::SameForAll,
        Constraint::TemperatureDependent,
    ];

    /// Number of optimizer variables this constraint takes for `model_count` models.
    pub fn variable_count(&self, model_count: usize) -> usize {
        match self {
            Constraint::None => model_count,
            Constraint::SameForAll => 1,
            Constraint::TemperatureDependent => 2,
        }
    }
}

/// The parameter families that can be constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterFamily {
    Enthalpy,
    Affinity,
    N,
}

impl fmt::Display for ParameterFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterFamily::Enthalpy => write!(f, "enthalpy"),
            ParameterFamily::Affinity => write!(f, "affinity"),
            ParameterFamily::N => write!(f, "stoichiometry"),
        }
    }
}

/// Constraint selection for every family. Offsets are always per experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConstraints {
    pub enthalpy: Constraint,
    pub affinity: Constraint,
    pub n: Constraint,
}

impl GlobalConstraints {
    /// Create a constraint set.
    pub fn new(enthalpy: Constraint, affinity: Constraint, n: Constraint) -> Self {
        Self {
            enthalpy,
            affinity,
            n,
        }
    }

    /// Set the enthalpy constraint.
    pub fn with_enthalpy(mut self, constraint: Constraint) -> Self {
        self.enthalpy = constraint;
        self
    }

    /// Set the affinity constraint.
    pub fn with_affinity(mut self, constraint: Constraint) -> Self {
        self.affinity = constraint;
        self
    }

    /// Set the stoichiometry constraint.
    pub fn with_n(mut self, constraint: Constraint) -> Self {
        self.n = constraint;
        self
    }

    /// The constraint for `family`.
    pub fn get(&self, family: ParameterFamily) -> Constraint {
        match family {
            ParameterFamily::Enthalpy => self.enthalpy,
            ParameterFamily::Affinity => self.affinity,
            ParameterFamily::N => self.n,
        }
    }

    /// True when no family links experiments.
    pub fn all_independent(&self) -> bool {
        self.enthalpy == Constraint::None
            && self.affinity == Constraint::None
            && self.n == Constraint::None
    }

    /// True when any family carries a temperature slope.
    pub fn has_temperature_dependence(&self) -> bool {
        [self.enthalpy, self.affinity, self.n].contains(&Constraint::TemperatureDependent)
    }

    /// Length of the packed optimizer vector for `model_count` models.
    pub fn variable_count(&self, model_count: usize) -> usize {
        self.enthalpy.variable_count(model_count)
            + self.affinity.variable_count(model_count)
            + model_count
            + self.n.variable_count(model_count)
    }

    /// Every combination of family constraints.
    pub fn all_combinations() -> impl Iterator<Item = GlobalConstraints> {
        Constraint::ALL.into_iter().flat_map(|enthalpy| {
            Constraint::ALL.into_iter().flat_map(move |affinity| {
                Constraint::ALL
                    .into_iter()
                    .map(move |n| GlobalConstraints::new(enthalpy, affinity, n))
            })
        })
    }
}
