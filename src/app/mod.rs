//! Application core: trigger/action domain logic.
//!
//! This module holds the rules of the agent: parsing trigger and action
//! configuration, arming triggers, and running action sequences.  All
//! interaction with pins, the network and the clock happens through
//! **port traits** defined in [`ports`], keeping this layer testable
//! without real peripherals.

pub mod actions;
pub mod commands;
pub mod events;
pub mod model;
pub mod ports;
pub mod triggers;
