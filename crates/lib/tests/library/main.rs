//! Library scenario tests for pkgrepo-lib.

mod common;

mod build_tests;
mod log_tests;
mod registry_tests;
