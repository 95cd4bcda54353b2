//! Integration tests for single-experiment fits.

// Parameter recovery from synthetic titrations
mod single_fit;

// The bounded minimize contract on both backends
mod optimizer_backends;
