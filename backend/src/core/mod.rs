//! Simulation clock and the per-run context object

pub mod context;
pub mod time;
