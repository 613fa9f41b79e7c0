//! Common test utilities for exp-tracker scenario tests

#[allow(dead_code)]
pub mod cluster;
#[allow(dead_code)]
pub mod fixtures;

pub use cluster::*;
#[allow(unused_imports)]
pub use fixtures::*;
