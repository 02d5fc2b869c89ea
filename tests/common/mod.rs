//! Common test utilities for brain-mirror integration tests

#[allow(dead_code)]
pub mod config;
#[allow(dead_code)]
pub mod fixtures;
#[allow(dead_code)]
pub mod sharedb;

pub use config::*;
#[allow(unused_imports)]
pub use fixtures::*;
pub use sharedb::*;
