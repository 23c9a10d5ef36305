//! Command implementations

pub mod exclude;
pub mod snapshot;
pub mod status;
