//! # Uncertainty Calculation
//!
//! Error estimates for fitted parameters and the quantities derived from
//! them:
//!
//! - [`FloatWithError`]: a value with a standard deviation and first-order
//!   error propagation
//! - [`linear_fit`]: weighted straight-line regression against temperature
//! - [`bootstrap_solution`] / [`bootstrap_global`]: residual resampling with
//!   parallel refits

mod bootstrap;
mod float_with_error;
mod regression;

pub use bootstrap::{bootstrap_global, bootstrap_solution, resample_experiment};
pub use float_with_error::FloatWithError;
pub use regression::{linear_fit, LinearFit};
