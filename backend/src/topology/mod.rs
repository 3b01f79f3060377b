//! Random network generation
//!
//! A small scale-free graph: a ring of seed nodes, then new nodes attach to
//! existing ones with probability proportional to their channel count.
//! Capacities are split uniformly between the two directions and every edge
//! draws its own forwarding policy.
//!
//! All draws go through the run's [`RngManager`], so a seed reproduces the
//! same network.

use crate::models::network::{ChannelId, Network, NetworkError, NodeId, Policy};
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Millisatoshi per satoshi; capacities are configured in satoshi
pub const MSAT_PER_SAT: u64 = 1_000;

pub const MIN_FEE_BASE: u64 = 1_000;
pub const MAX_FEE_BASE: u64 = 5_000;
pub const MIN_FEE_PROPORTIONAL: u64 = 1;
pub const MAX_FEE_PROPORTIONAL: u64 = 10;
pub const MIN_TIMELOCK: u32 = 10;
pub const MAX_TIMELOCK: u32 = 100;

/// `min_htlc` values and their weights
const MIN_HTLC_CHOICES: [(u64, f64); 4] = [(0, 0.7), (10, 0.2), (100, 0.05), (1_000, 0.05)];

/// Mean capacity (satoshi) of channels opened while the simulation runs
pub const OPEN_CHANNEL_MEAN_CAPACITY: u64 = 1_000;

/// Parameters of the generated network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Nodes of the initial ring
    pub seed_nodes: usize,
    /// Nodes attached after the ring
    pub n_nodes: usize,
    /// Channels each attached node opens
    pub channels_per_node: usize,
    /// Mean channel capacity (satoshi)
    pub capacity_per_channel: u64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            seed_nodes: 5,
            n_nodes: 45,
            channels_per_node: 2,
            capacity_per_channel: 1_000,
        }
    }
}

/// Forwarding policy with fees, timelock and `min_htlc` drawn from the
/// usual ranges
pub fn random_policy(rng: &mut RngManager) -> Policy {
    let fee_base = rng.range(MIN_FEE_BASE as i64, MAX_FEE_BASE as i64) as u64;
    let fee_proportional =
        rng.range(MIN_FEE_PROPORTIONAL as i64, MAX_FEE_PROPORTIONAL as i64) as u64;
    let timelock = rng.range(MIN_TIMELOCK as i64, MAX_TIMELOCK as i64) as u32;

    let draw = rng.next_f64();
    let mut cumulative = 0.0;
    let mut min_htlc = MIN_HTLC_CHOICES[MIN_HTLC_CHOICES.len() - 1].0;
    for (value, weight) in MIN_HTLC_CHOICES {
        cumulative += weight;
        if draw < cumulative {
            min_htlc = value;
            break;
        }
    }

    Policy {
        fee_base,
        fee_proportional,
        min_htlc,
        timelock,
    }
}

/// Open a channel with a random capacity and split between two given nodes
pub fn open_random_channel_between(
    network: &mut Network,
    rng: &mut RngManager,
    node1: NodeId,
    node2: NodeId,
    mean_capacity: u64,
    time: u64,
) -> Result<ChannelId, NetworkError> {
    let capacity = (mean_capacity as f64 + rng.gaussian()).abs() as u64;
    let fraction = rng.next_f64();
    let balance1 = (fraction * capacity as f64) as u64;
    let balance2 = capacity - balance1;
    let policy1 = random_policy(rng);
    let policy2 = random_policy(rng);

    network.open_channel(
        node1,
        node2,
        balance1 * MSAT_PER_SAT,
        balance2 * MSAT_PER_SAT,
        policy1,
        policy2,
        time,
    )
}

/// Open a channel between two distinct random nodes
///
/// # Errors
/// `NetworkError::NotEnoughNodes` if the network has fewer than two nodes.
pub fn open_random_channel(
    network: &mut Network,
    rng: &mut RngManager,
    time: u64,
) -> Result<ChannelId, NetworkError> {
    let nodes = network.num_nodes();
    if nodes < 2 {
        return Err(NetworkError::NotEnoughNodes(nodes));
    }
    let node1 = rng.index(nodes);
    let mut node2 = rng.index(nodes);
    while node2 == node1 {
        node2 = rng.index(nodes);
    }
    open_random_channel_between(network, rng, node1, node2, OPEN_CHANNEL_MEAN_CAPACITY, time)
}

/// Pick a node among `0..degrees.len()` with probability proportional to
/// its channel count
fn preferential_pick(degrees: &[u64], rng: &mut RngManager) -> NodeId {
    let total: u64 = degrees.iter().sum();
    if total == 0 {
        return rng.index(degrees.len());
    }
    let mut target = rng.next_f64() * total as f64;
    for (node, &degree) in degrees.iter().enumerate() {
        target -= degree as f64;
        if target < 0.0 {
            return node;
        }
    }
    degrees.len() - 1
}

/// Build a scale-free network
pub fn generate_network(
    config: &TopologyConfig,
    rng: &mut RngManager,
) -> Result<Network, NetworkError> {
    if config.seed_nodes < 2 {
        return Err(NetworkError::NotEnoughNodes(config.seed_nodes));
    }

    let mut network = Network::with_nodes(config.seed_nodes);
    let mut degrees = vec![0u64; config.seed_nodes];
    let ring_channels = if config.seed_nodes == 2 { 1 } else { config.seed_nodes };

    for node1 in 0..ring_channels {
        let node2 = (node1 + 1) % config.seed_nodes;
        open_random_channel_between(&mut network, rng, node1, node2, config.capacity_per_channel, 0)?;
        degrees[node1] += 1;
        degrees[node2] += 1;
    }

    for _ in 0..config.n_nodes {
        let node = network.add_node();
        for _ in 0..config.channels_per_node {
            let peer = preferential_pick(&degrees, rng);
            open_random_channel_between(&mut network, rng, node, peer, config.capacity_per_channel, 0)?;
            degrees[peer] += 1;
        }
        degrees.push(config.channels_per_node as u64);
    }

    debug!(
        nodes = network.num_nodes(),
        channels = network.channels.len(),
        "network generated"
    );
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_network_shape() {
        let config = TopologyConfig {
            seed_nodes: 4,
            n_nodes: 10,
            channels_per_node: 2,
            capacity_per_channel: 500,
        };
        let mut rng = RngManager::new(3);
        let network = generate_network(&config, &mut rng).unwrap();

        assert_eq!(network.num_nodes(), 14);
        assert_eq!(network.channels.len(), 4 + 10 * 2);
        assert_eq!(network.num_edges(), 2 * network.channels.len());

        for channel in &network.channels {
            assert_ne!(channel.node1, channel.node2);
            assert_eq!(network.channel_balance(channel.id), channel.capacity);
            assert_eq!(channel.capacity % MSAT_PER_SAT, 0);
        }
    }

    #[test]
    fn test_same_seed_same_network() {
        let config = TopologyConfig::default();
        let a = generate_network(&config, &mut RngManager::new(99)).unwrap();
        let b = generate_network(&config, &mut RngManager::new(99)).unwrap();

        let balances = |n: &Network| n.edges.iter().map(|e| (e.from, e.to, e.balance, e.policy)).collect::<Vec<_>>();
        assert_eq!(balances(&a), balances(&b));
    }

    #[test]
    fn test_policy_ranges() {
        let mut rng = RngManager::new(5);
        for _ in 0..500 {
            let policy = random_policy(&mut rng);
            assert!((MIN_FEE_BASE..MAX_FEE_BASE).contains(&policy.fee_base));
            assert!((MIN_FEE_PROPORTIONAL..MAX_FEE_PROPORTIONAL).contains(&policy.fee_proportional));
            assert!((MIN_TIMELOCK..MAX_TIMELOCK).contains(&policy.timelock));
            assert!([0, 10, 100, 1_000].contains(&policy.min_htlc));
        }
    }

    #[test]
    fn test_open_random_channel_needs_two_nodes() {
        let mut network = Network::with_nodes(1);
        let mut rng = RngManager::new(1);
        assert_eq!(
            open_random_channel(&mut network, &mut rng, 0),
            Err(NetworkError::NotEnoughNodes(1))
        );

        let mut network = Network::with_nodes(2);
        let channel = open_random_channel(&mut network, &mut rng, 10).unwrap();
        assert_eq!(network.channel(channel).node1 + network.channel(channel).node2, 1);
    }
}
