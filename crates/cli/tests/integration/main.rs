//! End-to-end tests of the kiln binary against small projects.

mod build_tests;
mod clean_tests;
mod common;
mod graph_tests;
