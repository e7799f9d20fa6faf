//! Test infrastructure for the tenant connection layer.
//!
//! Provides a deterministic in-process pool and resolver so the provisioning
//! logic can be exercised without a database.

#![allow(dead_code)]

pub mod fake_pool;
pub mod fixtures;

pub use fake_pool::*;
pub use fixtures::*;
