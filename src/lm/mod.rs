//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides a bounded, scaled implementation of the
//! Levenberg-Marquardt algorithm. Calorimetry fits present their loss as a
//! single scalar residual through [`ScalarObjective`](crate::problem::ScalarObjective).

pub mod algorithm;
pub mod config;
pub mod step;

pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::LmConfig;
pub use step::LmStep;
