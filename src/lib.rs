//! # itc-fit
//!
//! `itc-fit` fits binding isotherms to isothermal titration calorimetry (ITC)
//! data and estimates the errors of the fitted parameters.
//!
//! The library provides:
//! - A one-set-of-sites isotherm predicting the heat of every injection
//! - Single-experiment fits and global fits in which ΔH, K and N can be
//!   shared between experiments or vary linearly with temperature
//! - Two optimizer backends behind one bounded `minimize` contract: a
//!   Nelder-Mead simplex and Levenberg-Marquardt
//! - Residual bootstrap error estimation on a bounded worker pool
//!
//! ## Basic Usage
//!
//! ```
//! use itc_fit::{fit_experiment, Experiment, FitConfig, Injection, NoopListener};
//! use itc_fit::model::{BindingModel, ModelParameters};
//! use itc_fit::models::OneSetOfSites;
//! use itc_fit::uncertainty::FloatWithError;
//!
//! // 20 injections of 2 µL into a 200 µL cell
//! let injections = (0..20)
//!     .map(|i| Injection::new(i, 2e-6, FloatWithError::new(0.0, 1e-8)))
//!     .collect();
//! let template = Experiment::new(2e-4, 2e-5, 2e-4, 25.0, injections).unwrap();
//!
//! // Synthetic heats for N = 1, ΔH = -30 kJ/mol, K = 1e6 /M
//! let truth = ModelParameters::new(1.0, -30_000.0, 1e6, 0.0);
//! let heats = OneSetOfSites::new(template.clone()).predicted(&truth);
//! let mut experiment = template.with_peak_areas(&heats).unwrap();
//!
//! let solution = fit_experiment(&mut experiment, &FitConfig::new(), &NoopListener).unwrap();
//! assert!((solution.n.value - 1.0).abs() < 0.01);
//! assert!(experiment.solution.is_some());
//! ```

// Public modules
pub mod config;
pub mod error;
pub mod events;
pub mod experiment;
pub mod fit;
pub mod global;
pub mod lm;
pub mod model;
pub mod models;
pub mod optimizer;
pub mod parameters;
pub mod problem;
pub mod solution;
pub mod thermo;
pub mod uncertainty;

mod utils;

// Re-exports for convenience
pub use config::{BootstrapConfig, ErrorMethod, FitConfig};
pub use error::{ItcError, Result};
pub use events::{CancellationToken, ChannelListener, FitEvent, FitListener, NoopListener};
pub use experiment::{Experiment, Injection};
pub use fit::{
    fit_experiment, fit_experiment_cancellable, fit_global, fit_global_cancellable, fit_model,
};
pub use global::GlobalModel;
pub use lm::LevenbergMarquardt;
pub use model::{BindingModel, ModelKind, ModelParameters};
pub use optimizer::{minimize, Convergence, ConvergenceStatus, NelderMead, OptimizerAlgorithm};
pub use parameters::{Constraint, GlobalConstraints};
pub use problem::Problem;
pub use solution::{BootstrapSummary, GlobalSolution, Solution};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
