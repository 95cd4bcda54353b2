//! Integration tests for the session helpers and their configuration.

mod listener_tests;
mod config_tests;
