//! Payment Channel Network Simulator Core - Rust Engine
//!
//! Discrete-event simulation of HTLC payments over a channel network, with
//! dynamic channel groups that publish a shared capacity for routing.
//!
//! # Architecture
//!
//! - **core**: Simulation clock and the per-run context (clock, queue, RNG)
//! - **events**: Event kinds and the time-ordered scheduler
//! - **models**: Ledger (nodes, channels, edges), payments, groups, group-event log
//! - **routing**: Path oracle seam, route construction, reference Dijkstra oracle
//! - **settlement**: HTLC state machine (send, forward, receive, unwind)
//! - **groups**: Group construction, maintenance, leave policy and close
//! - **orchestrator**: Event loop, configuration, report, checkpoints
//! - **arrivals** / **topology**: Workload and network generators
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. All amounts are u64 millisatoshi, all times u64 milliseconds
//! 2. All randomness is deterministic (seeded RNG)
//! 3. Equal-time events dispatch in scheduling order
//! 4. A channel's two directions never hold more than its capacity
//! 5. No open group repeats a member or has two members sharing a node

pub mod arrivals;
pub mod core;
pub mod events;
pub mod groups;
pub mod models;
pub mod orchestrator;
pub mod rng;
pub mod routing;
pub mod settlement;
pub mod topology;

// Re-exports for convenience
pub use core::context::SimContext;
pub use core::time::SimClock;
pub use groups::GroupManager;
pub use models::{
    event::{GroupEvent, GroupEventLog},
    group::Group,
    network::{Network, NetworkError},
    payment::Payment,
};
pub use orchestrator::{Simulation, SimulationConfig, SimulationError, SimulationReport};
pub use rng::RngManager;
pub use routing::{DijkstraOracle, PathOracle};
