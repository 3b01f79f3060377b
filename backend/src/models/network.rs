//! Ledger: the payment-channel network graph
//!
//! Nodes, channels and directed edges live in index arenas owned by
//! [`Network`]. Every cross reference (edge to counter-edge, edge to group,
//! node to its edges) is an id into one of those arenas, never an owning
//! pointer.
//!
//! # Critical Invariants
//!
//! 1. **Channel conservation**: `edge1.balance + edge2.balance` of a channel only
//!    changes by amounts currently locked in in-flight HTLCs
//! 2. **Single membership**: an edge belongs to at most one group
//! 3. **Queued once**: `in_backlog` is set iff the edge sits in the construction backlog

use crate::models::group::{Group, GroupId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub type NodeId = usize;
pub type ChannelId = usize;
pub type EdgeId = usize;

/// A larger failure recorded less than this long ago shadows a new one (ms)
pub const FAIL_MEMORY_MS: u64 = 60_000;

/// Errors raised when mutating the graph structure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} cannot open a channel to itself")]
    SelfChannel(NodeId),

    #[error("need at least two nodes, have {0}")]
    NotEnoughNodes(usize),
}

/// Forwarding policy of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Flat fee per forwarded HTLC (msat)
    pub fee_base: u64,
    /// Proportional fee in millionths of the forwarded amount
    pub fee_proportional: u64,
    /// Smallest amount this edge forwards (msat)
    pub min_htlc: u64,
    /// Timelock delta added by this hop
    pub timelock: u32,
}

impl Policy {
    /// Fee charged for forwarding `amount`
    ///
    /// ```
    /// use pcn_simulator_core_rs::models::network::Policy;
    ///
    /// let policy = Policy { fee_base: 1000, fee_proportional: 10, min_htlc: 0, timelock: 40 };
    /// assert_eq!(policy.fee(2_000_000), 1020);
    /// ```
    pub fn fee(&self, amount: u64) -> u64 {
        self.fee_base + self.fee_proportional.saturating_mul(amount) / 1_000_000
    }
}

/// Advertised upper bound on what an edge can forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    pub time: u64,
    pub htlc_maximum: u64,
}

/// Amount held by an HTLC on an edge and for how long
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedBalance {
    pub amount: u64,
    pub start: u64,
    pub end: u64,
}

/// What a sender has learned about forwarding between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodePairResult {
    pub fail_time: u64,
    pub fail_amount: u64,
    pub success_time: u64,
    pub success_amount: u64,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Outgoing edges, in opening order
    pub open_edges: Vec<EdgeId>,
    /// Outcome history keyed by (from, to) node pair
    pub results: BTreeMap<(NodeId, NodeId), NodePairResult>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            open_edges: Vec::new(),
            results: BTreeMap::new(),
        }
    }

    pub fn pair_result(&self, from: NodeId, to: NodeId) -> Option<&NodePairResult> {
        self.results.get(&(from, to))
    }

    /// Record a successful forward of `amount` from `from` to `to`
    pub fn record_pair_success(&mut self, from: NodeId, to: NodeId, amount: u64, time: u64) {
        let result = self.results.entry((from, to)).or_default();
        result.success_time = time;
        if amount > result.success_amount {
            result.success_amount = amount;
        }
        if result.fail_time != 0 && result.success_amount > result.fail_amount {
            result.fail_amount = amount + 1;
        }
    }

    /// Record a failed forward of `amount` from `from` to `to`
    ///
    /// A failure is ignored when a smaller one was recorded within
    /// [`FAIL_MEMORY_MS`]; the smaller amount is the tighter bound.
    pub fn record_pair_fail(&mut self, from: NodeId, to: NodeId, amount: u64, time: u64) {
        if let Some(existing) = self.results.get(&(from, to)) {
            if amount > existing.fail_amount
                && time.saturating_sub(existing.fail_time) < FAIL_MEMORY_MS
            {
                return;
            }
        }

        let result = self.results.entry((from, to)).or_default();
        result.fail_amount = amount;
        result.fail_time = time;
        if amount == 0 {
            result.success_amount = 0;
        } else if amount <= result.success_amount {
            result.success_amount = amount - 1;
        }
    }

    /// True if forwarding `amount` from `from` to `to` failed recently at an
    /// amount no larger than `amount`
    pub fn recently_failed(&self, from: NodeId, to: NodeId, amount: u64, now: u64) -> bool {
        match self.results.get(&(from, to)) {
            Some(result) if result.fail_time != 0 => {
                now.saturating_sub(result.fail_time) < FAIL_MEMORY_MS
                    && amount >= result.fail_amount
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub edge1: EdgeId,
    pub edge2: EdgeId,
    pub node1: NodeId,
    pub node2: NodeId,
    pub capacity: u64,
    pub is_closed: bool,
}

/// One direction of a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub channel_id: ChannelId,
    pub counter_edge_id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub policy: Policy,
    pub balance: u64,
    /// Number of HTLCs ever forwarded on this edge
    pub tot_flows: u64,
    pub is_closed: bool,

    // Group membership
    pub group: Option<GroupId>,
    pub tolerance_tau: f64,
    pub join_time: Option<u64>,
    pub flows_at_join: u64,
    pub last_leave_time: Option<u64>,
    /// Forwards made while this edge held the group's published minimum
    pub min_cap_use_count: u64,
    pub in_backlog: bool,

    pub channel_updates: Vec<ChannelUpdate>,
    pub locked_balances: Vec<LockedBalance>,
}

/// Tolerance an edge carries before it ever joins a group
pub const DEFAULT_TOLERANCE_TAU: f64 = 0.10;

impl Edge {
    /// `htlc_maximum` of the most recent channel update
    pub fn latest_channel_update(&self) -> Option<u64> {
        self.channel_updates.last().map(|update| update.htlc_maximum)
    }

    /// Flows forwarded since the edge joined its current group
    pub fn flows_since_join(&self) -> u64 {
        self.tot_flows.saturating_sub(self.flows_at_join)
    }

    /// Drop membership state after leaving a group at `now`
    pub fn leave_group(&mut self, now: u64) {
        self.group = None;
        self.join_time = None;
        self.flows_at_join = 0;
        self.min_cap_use_count = 0;
        self.last_leave_time = Some(now);
    }

    pub fn in_cooldown(&self, now: u64, cooldown: u64) -> bool {
        match self.last_leave_time {
            Some(left) => now.saturating_sub(left) < cooldown,
            None => false,
        }
    }

    pub fn shares_endpoint(&self, other: &Edge) -> bool {
        self.from == other.from
            || self.from == other.to
            || self.to == other.from
            || self.to == other.to
    }
}

/// The network graph and the group collection
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub channels: Vec<Channel>,
    pub edges: Vec<Edge>,
    pub groups: Vec<Group>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `count` nodes with no channels
    pub fn with_nodes(count: usize) -> Self {
        let mut network = Self::new();
        for _ in 0..count {
            network.add_node();
        }
        network
    }

    pub fn add_node(&mut self) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node::new(id));
        id
    }

    /// Open a channel funded with `balance1` on the node1 side and `balance2`
    /// on the node2 side
    ///
    /// Both edges start with a channel update advertising the channel
    /// capacity at `time`.
    pub fn open_channel(
        &mut self,
        node1: NodeId,
        node2: NodeId,
        balance1: u64,
        balance2: u64,
        policy1: Policy,
        policy2: Policy,
        time: u64,
    ) -> Result<ChannelId, NetworkError> {
        if node1 == node2 {
            return Err(NetworkError::SelfChannel(node1));
        }
        for node in [node1, node2] {
            if node >= self.nodes.len() {
                return Err(NetworkError::UnknownNode(node));
            }
        }

        let channel_id = self.channels.len();
        let edge1 = self.edges.len();
        let edge2 = edge1 + 1;
        let capacity = balance1 + balance2;
        let update = ChannelUpdate {
            time,
            htlc_maximum: capacity,
        };

        for (id, counter, from, to, policy, balance) in [
            (edge1, edge2, node1, node2, policy1, balance1),
            (edge2, edge1, node2, node1, policy2, balance2),
        ] {
            self.edges.push(Edge {
                id,
                channel_id,
                counter_edge_id: counter,
                from,
                to,
                policy,
                balance,
                tot_flows: 0,
                is_closed: false,
                group: None,
                tolerance_tau: DEFAULT_TOLERANCE_TAU,
                join_time: None,
                flows_at_join: 0,
                last_leave_time: None,
                min_cap_use_count: 0,
                in_backlog: false,
                channel_updates: vec![update],
                locked_balances: Vec::new(),
            });
            self.nodes[from].open_edges.push(id);
        }

        self.channels.push(Channel {
            id: channel_id,
            edge1,
            edge2,
            node1,
            node2,
            capacity,
            is_closed: false,
        });

        Ok(channel_id)
    }

    /// # Panics
    /// Panics if `id` was not issued by this network.
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    /// # Panics
    /// Panics if `id` was not issued by this network.
    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id]
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id]
    }

    /// Capacity of the channel an edge belongs to
    pub fn channel_capacity(&self, edge: EdgeId) -> u64 {
        self.channels[self.edges[edge].channel_id].capacity
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(id)
    }

    /// Current sum of both directions of a channel
    pub fn channel_balance(&self, id: ChannelId) -> u64 {
        let channel = &self.channels[id];
        self.edges[channel.edge1].balance + self.edges[channel.edge2].balance
    }

    /// Sum of every edge balance
    pub fn total_balance(&self) -> u64 {
        self.edges.iter().map(|edge| edge.balance).sum()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Policy {
        Policy {
            fee_base: 1000,
            fee_proportional: 1,
            min_htlc: 0,
            timelock: 10,
        }
    }

    #[test]
    fn test_open_channel_wires_counter_edges() {
        let mut network = Network::with_nodes(2);
        let channel = network
            .open_channel(0, 1, 700, 300, policy(), policy(), 0)
            .unwrap();

        let ch = network.channel(channel);
        assert_eq!(ch.capacity, 1000);
        assert_eq!(network.edge(ch.edge1).counter_edge_id, ch.edge2);
        assert_eq!(network.edge(ch.edge2).counter_edge_id, ch.edge1);
        assert_eq!(network.edge(ch.edge1).from, 0);
        assert_eq!(network.edge(ch.edge2).from, 1);
        assert_eq!(network.node(0).open_edges, vec![ch.edge1]);
        assert_eq!(network.edge(ch.edge2).latest_channel_update(), Some(1000));
        assert_eq!(network.channel_balance(channel), 1000);
    }

    #[test]
    fn test_open_channel_rejects_bad_endpoints() {
        let mut network = Network::with_nodes(2);
        assert_eq!(
            network.open_channel(1, 1, 1, 1, policy(), policy(), 0),
            Err(NetworkError::SelfChannel(1))
        );
        assert_eq!(
            network.open_channel(0, 5, 1, 1, policy(), policy(), 0),
            Err(NetworkError::UnknownNode(5))
        );
    }

    #[test]
    fn test_pair_success_raises_fail_amount() {
        let mut node = Node::new(0);
        node.record_pair_fail(1, 2, 500, 1_000);
        node.record_pair_success(1, 2, 800, 2_000);

        let result = node.pair_result(1, 2).unwrap();
        assert_eq!(result.success_amount, 800);
        assert_eq!(result.fail_amount, 801);
    }

    #[test]
    fn test_larger_recent_failure_is_ignored() {
        let mut node = Node::new(0);
        node.record_pair_fail(1, 2, 500, 1_000);
        node.record_pair_fail(1, 2, 900, 2_000);
        assert_eq!(node.pair_result(1, 2).unwrap().fail_amount, 500);

        // Outside the memory window the larger failure replaces it
        node.record_pair_fail(1, 2, 900, 1_000 + FAIL_MEMORY_MS);
        assert_eq!(node.pair_result(1, 2).unwrap().fail_amount, 900);
    }

    #[test]
    fn test_failure_lowers_success_amount() {
        let mut node = Node::new(0);
        node.record_pair_success(3, 4, 1_000, 10);
        node.record_pair_fail(3, 4, 600, 20);
        assert_eq!(node.pair_result(3, 4).unwrap().success_amount, 599);

        node.record_pair_fail(3, 4, 0, 30);
        assert_eq!(node.pair_result(3, 4).unwrap().success_amount, 0);
    }

    #[test]
    fn test_recently_failed() {
        let mut node = Node::new(0);
        assert!(!node.recently_failed(1, 2, 10, 5));
        node.record_pair_fail(1, 2, 100, 1_000);
        assert!(node.recently_failed(1, 2, 100, 2_000));
        assert!(!node.recently_failed(1, 2, 99, 2_000));
        assert!(!node.recently_failed(1, 2, 100, 1_000 + FAIL_MEMORY_MS));
    }

    #[test]
    fn test_cooldown() {
        let mut network = Network::with_nodes(2);
        network
            .open_channel(0, 1, 10, 10, policy(), policy(), 0)
            .unwrap();
        let edge = network.edge_mut(0);
        assert!(!edge.in_cooldown(0, 100));
        edge.leave_group(50);
        assert!(edge.in_cooldown(149, 100));
        assert!(!edge.in_cooldown(150, 100));
    }
}
