//! Reference worlds for tests and benchmarks.

pub mod corridor;
