//! Test execution seam.
//!
//! The scheduler drives jobs through their lifecycle but never runs a test
//! itself; it hands each job to a [`TestExecutor`]. The real deployment
//! plugs in a runner that talks to emulators, physical devices, or a cloud
//! browser farm. This crate ships [`SimulatedExecutor`], which models the
//! runner with random latency and outcome, for tests and standalone mode.

pub mod executor;

pub use executor::{SimulatedExecutor, TestExecutor, TestOutcome, TestReport};
