//! Integration tests for bootstrap error estimation.

mod bootstrap_tests;
