//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below exercises a subsystem against mock adapters.  All
//! tests run on the host with the simulated pin backend; no real GPIO
//! or network is required.

mod link_tests;
mod mocks;
mod rig;
mod scenario_tests;
