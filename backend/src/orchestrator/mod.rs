//! Orchestrator - event loop, configuration and run outputs
//!
//! See `engine.rs` for the loop itself.

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod report;

pub use config::{Admission, GroupConfig, HtlcConfig, RoutingMethod, SimulationConfig, Tolerance};
pub use engine::{validate_config, Simulation, SimulationError};

pub use checkpoint::{compute_config_hash, validate_snapshot, NetworkSnapshot};
pub use report::{
    summarize_payments, AttemptSummary, EdgeSummary, GroupSummary, PaymentSummary, SimulationReport,
};
