//! Routing: the path oracle seam and route construction
//!
//! The HTLC state machine never searches the graph itself. It asks a
//! [`PathOracle`] for an ordered list of hops and freezes that path into a
//! [`Route`](crate::models::payment::Route) for a single attempt.
//!
//! - `route`: path to route transformation (amounts, fees, timelocks)
//! - `dijkstra`: reference oracle used by the CLI and the tests
//! - `precompute`: parallel computation of every payment's initial path

pub mod dijkstra;
pub mod precompute;
pub mod route;

pub use dijkstra::DijkstraOracle;
pub use precompute::precompute_initial_paths;
pub use route::{build_route, FINAL_TIMELOCK};

use crate::models::network::{EdgeId, Network, NodeId};
use crate::orchestrator::config::RoutingMethod;
use std::collections::HashSet;

/// One hop of an oracle path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathHop {
    pub edge_id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
}

/// Inputs to a path search
#[derive(Debug, Clone, Copy)]
pub struct PathRequest<'a> {
    pub source: NodeId,
    pub destination: NodeId,
    pub amount: u64,
    pub now: u64,
    pub excluded: &'a HashSet<EdgeId>,
    pub fee_limit: u64,
}

/// External routing function
///
/// `Sync` because initial paths are computed on a worker pool before the
/// event loop starts.
pub trait PathOracle: Sync {
    /// Ordered hops from `source` to `destination`, or `None` when no route
    /// is feasible under current balances and policies
    fn find_route(&self, network: &Network, request: &PathRequest<'_>) -> Option<Vec<PathHop>>;

    /// Bottleneck estimate for an edge the sender does not own
    fn estimate_capacity(&self, network: &Network, edge: EdgeId) -> u64;
}

/// Capacity a sender believes `edge` has under `method`
pub fn estimated_capacity(network: &Network, edge: EdgeId, method: RoutingMethod) -> u64 {
    let e = network.edge(edge);
    let channel_capacity = network.channel_capacity(edge);
    match method {
        RoutingMethod::Baseline => channel_capacity,
        RoutingMethod::ChannelUpdate => e
            .latest_channel_update()
            .map_or(channel_capacity, |update| update.min(channel_capacity)),
        RoutingMethod::GroupRouting => match e.group.and_then(|id| network.group(id)) {
            Some(group) if group.is_open() => group.group_cap,
            _ => e.latest_channel_update().unwrap_or(channel_capacity),
        },
        RoutingMethod::Ideal => e.balance,
    }
}
