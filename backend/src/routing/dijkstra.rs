//! Reference path oracle
//!
//! Reverse Dijkstra from the destination, minimizing the amount that has to
//! leave the source. Distances are amounts: the amount an edge entering a node
//! must carry so that the rest of the path can deliver the payment.

use crate::models::network::{EdgeId, Network, NodeId};
use crate::orchestrator::config::RoutingMethod;
use crate::routing::{estimated_capacity, PathHop, PathOracle, PathRequest};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Longest path the oracle returns
pub const MAX_ROUTE_HOPS: usize = 20;

/// Dijkstra oracle estimating capacities with a [`RoutingMethod`]
#[derive(Debug, Clone, Copy)]
pub struct DijkstraOracle {
    method: RoutingMethod,
}

impl DijkstraOracle {
    pub fn new(method: RoutingMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> RoutingMethod {
        self.method
    }

    /// Capacity the source assumes when routing over `edge`
    fn usable_capacity(&self, network: &Network, edge: EdgeId, source: NodeId) -> u64 {
        let e = network.edge(edge);
        if e.from == source {
            e.balance
        } else {
            self.estimate_capacity(network, edge)
        }
    }
}

impl PathOracle for DijkstraOracle {
    fn find_route(&self, network: &Network, request: &PathRequest<'_>) -> Option<Vec<PathHop>> {
        let PathRequest {
            source,
            destination,
            amount,
            now,
            excluded,
            fee_limit,
        } = *request;

        if source == destination
            || source >= network.num_nodes()
            || destination >= network.num_nodes()
        {
            return None;
        }

        let n = network.num_nodes();
        // Amount the edge entering a node must carry
        let mut needed: Vec<Option<u64>> = vec![None; n];
        // Edge a node forwards on, towards the destination
        let mut next_edge: Vec<Option<EdgeId>> = vec![None; n];
        let mut hops: Vec<usize> = vec![0; n];
        let mut heap = BinaryHeap::new();

        // Incoming edges per node, in edge id order
        let mut incoming: Vec<Vec<EdgeId>> = vec![Vec::new(); n];
        for edge in &network.edges {
            incoming[edge.to].push(edge.id);
        }

        let sender = network.node(source);
        needed[destination] = Some(amount);
        heap.push(Reverse((amount, destination)));

        while let Some(Reverse((carried, node))) = heap.pop() {
            if needed[node] != Some(carried) {
                continue;
            }
            if node == source {
                break;
            }
            if hops[node] >= MAX_ROUTE_HOPS {
                continue;
            }

            for &edge_id in &incoming[node] {
                let edge = network.edge(edge_id);
                let from = edge.from;
                if edge.is_closed || excluded.contains(&edge_id) || from == destination {
                    continue;
                }
                if carried < edge.policy.min_htlc {
                    continue;
                }
                if self.usable_capacity(network, edge_id, source) < carried {
                    continue;
                }
                if from != source && sender.recently_failed(from, node, carried, now) {
                    continue;
                }

                // The source pays no fee to itself
                let candidate = if from == source {
                    carried
                } else {
                    carried + edge.policy.fee(carried)
                };
                if candidate - amount > fee_limit {
                    continue;
                }

                let better = match needed[from] {
                    Some(current) => candidate < current,
                    None => true,
                };
                if better {
                    needed[from] = Some(candidate);
                    next_edge[from] = Some(edge_id);
                    hops[from] = hops[node] + 1;
                    heap.push(Reverse((candidate, from)));
                }
            }
        }

        needed[source]?;

        let mut path = Vec::new();
        let mut node = source;
        while node != destination {
            let edge_id = next_edge[node]?;
            let edge = network.edge(edge_id);
            path.push(PathHop {
                edge_id,
                from: edge.from,
                to: edge.to,
            });
            node = edge.to;
            if path.len() > MAX_ROUTE_HOPS {
                return None;
            }
        }
        Some(path)
    }

    fn estimate_capacity(&self, network: &Network, edge: EdgeId) -> u64 {
        estimated_capacity(network, edge, self.method)
    }
}
