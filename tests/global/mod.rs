//! Integration tests for global fits.

mod global_fit;
