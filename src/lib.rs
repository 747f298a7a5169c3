//! pinagent library.
//!
//! Everything except process wiring lives here so the integration tests
//! can assemble the agent from the same parts as `main`, swapping in
//! mock transports, HTTP clients and event sinks.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod link;
pub mod pins;
pub mod scheduler;
