//! Pin management and thread helpers.

pub mod gpio;
pub mod worker;
