//! # Parameter System
//!
//! This module maps between the physical parameters of each experiment and
//! the flat vector seen by the optimizers.
//!
//! ## Core Components
//!
//! - [`ParameterSetting`] / [`ParameterSettings`]: per-parameter bounds, step
//!   sizes, initial values and lock flags
//! - [`LockTolerance`] and [`WarmStart`]: narrowing bounds around a center for
//!   locked parameters and bootstrap refits
//! - [`Constraint`] / [`GlobalConstraints`]: how enthalpy, affinity and
//!   stoichiometry are shared between experiments
//! - [`ParameterLayout`] and [`SolverParameters`]: exact `pack`/`unpack`
//!   between the optimizer vector and per-experiment values
//!
//! ## Example Usage
//!
//! ```rust
//! use itc_fit::parameters::{Constraint, GlobalConstraints, ParameterLayout};
//!
//! let constraints = GlobalConstraints::default().with_enthalpy(Constraint::TemperatureDependent);
//! let layout = ParameterLayout::new(constraints, vec![15.0, 35.0]).unwrap();
//!
//! // ΔH at the mean temperature and ΔCp, two ΔG, two offsets, two N
//! assert_eq!(layout.variable_count(), 8);
//! ```

pub mod bounds;
pub mod constraints;
pub mod packing;

pub use bounds::{LockSettings, LockTolerance, ParameterSetting, ParameterSettings, WarmStart};
pub use constraints::{Constraint, GlobalConstraints, ParameterFamily};
pub use packing::{
    FamilyValues, ParameterLayout, SolverParameters, Variable, VariableKind,
};
