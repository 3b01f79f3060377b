//! Simulation configuration
//!
//! Engine parameters plus the generator settings the CLI uses to build the
//! network and the payments. All types are serde-serializable so a run can be
//! described by a single JSON file and identified by its config hash.

use crate::arrivals::PaymentConfig;
use crate::topology::TopologyConfig;
use serde::{Deserialize, Serialize};

/// Capacity estimate a sender uses when routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMethod {
    /// Channel capacity only
    Baseline,
    /// Channel capacity capped by the latest channel update
    ChannelUpdate,
    /// Published group capacity where the edge is grouped
    #[default]
    GroupRouting,
    /// True balances (oracle knowledge)
    Ideal,
}

/// HTLC protocol timing and fault parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtlcConfig {
    /// Probability that a forwarding node is offline
    pub faulty_node_prob: f64,
    /// Abandon a payment once `now > start_time + timeout` (ms)
    pub payment_timeout: Option<u64>,
    /// Mean per-hop forwarding delay (ms)
    pub average_forward_interval: u64,
    /// Scale of the |gaussian| jitter added to every hop (ms)
    pub variance_forward_interval: u64,
    /// Extra delay before an offline failure is noticed (ms)
    pub offline_latency: u64,
    /// Delay of channel-update and group-update broadcasts (ms)
    pub group_broadcast_delay: u64,
    /// Split unroutable payments in two
    pub mpp: bool,
}

impl Default for HtlcConfig {
    fn default() -> Self {
        Self {
            faulty_node_prob: 0.0,
            payment_timeout: None,
            average_forward_interval: 100,
            variance_forward_interval: 0,
            offline_latency: 3_000,
            group_broadcast_delay: 0,
            mpp: false,
        }
    }
}

/// How admission bounds are derived from the seed balance `b`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Admission {
    /// `[b - b*limit_rate, b + b*limit_rate]`
    Symmetric { limit_rate: f64 },
    /// `[b*min_ratio, b*max_ratio]`
    Ratio { min_ratio: f64, max_ratio: f64 },
}

/// Per-member utilization-loss tolerance assigned on join
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Tolerance {
    Fixed { tau: f64 },
    Uniform { min: f64, max: f64 },
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Fixed { tau: 0.10 }
    }
}

/// Group lifecycle parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Target number of members
    pub group_size: usize,
    /// A group shrinking below this is closed
    pub group_size_min: usize,
    pub admission: Admission,
    /// Publish the observed minimum instead of the lower admission bound
    pub group_cap_update: bool,
    pub tolerance: Tolerance,
    /// Cooldown after leaving, in mean forwarding intervals
    pub cooldown_hops: u64,
    /// Flows since join after which the minimum member leaves
    pub k_used_on_min_edge: u64,
    pub max_leaves_per_group_tick: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            group_size: 5,
            group_size_min: 5,
            admission: Admission::Symmetric { limit_rate: 0.1 },
            group_cap_update: true,
            tolerance: Tolerance::default(),
            cooldown_hops: 5,
            k_used_on_min_edge: 5,
            max_leaves_per_group_tick: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub rng_seed: u64,
    pub routing_method: RoutingMethod,
    #[serde(default)]
    pub htlc: HtlcConfig,
    #[serde(default)]
    pub groups: GroupConfig,
    /// Generated network (used by the CLI)
    #[serde(default)]
    pub topology: TopologyConfig,
    /// Generated workload (used by the CLI)
    #[serde(default)]
    pub payments: PaymentConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rng_seed: 12345,
            routing_method: RoutingMethod::default(),
            htlc: HtlcConfig::default(),
            groups: GroupConfig::default(),
            topology: TopologyConfig::default(),
            payments: PaymentConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Group lifecycle runs only under group routing
    pub fn groups_enabled(&self) -> bool {
        self.routing_method == RoutingMethod::GroupRouting
    }
}
