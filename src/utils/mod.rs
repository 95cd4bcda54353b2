//! Utility functions and helpers for the itc-fit library.

pub mod finite_difference;
