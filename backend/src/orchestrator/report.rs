//! End-of-run report
//!
//! Payments are reported at the level the workload issued them: a split
//! payment appears once, with its shards folded in, and shards themselves
//! are not listed. Every edge is reported with its flow counters, channel
//! updates and locked balances.

use crate::models::group::{Group, GroupId};
use crate::models::network::{
    ChannelId, ChannelUpdate, Edge, EdgeId, LockedBalance, Network, NodeId, Policy,
};
use crate::models::payment::{Attempt, EdgeSnapshot, Payment, PaymentErrorKind, PaymentId};
use crate::orchestrator::checkpoint::compute_config_hash;
use crate::orchestrator::config::{RoutingMethod, SimulationConfig};
use crate::orchestrator::SimulationError;
use serde::{Deserialize, Serialize};

/// One finished attempt of a payment or of one of its shards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSummary {
    /// Payment that made the attempt (a shard id for split payments)
    pub payment: PaymentId,
    pub attempt: u32,
    pub is_succeeded: bool,
    pub end_time: u64,
    pub error_edge: Option<EdgeId>,
    pub error_kind: Option<PaymentErrorKind>,
    pub route: Vec<EdgeSnapshot>,
}

impl AttemptSummary {
    fn new(payment: PaymentId, attempt: &Attempt) -> Self {
        Self {
            payment,
            attempt: attempt.attempt,
            is_succeeded: attempt.is_succeeded,
            end_time: attempt.end_time,
            error_edge: attempt.error_edge,
            error_kind: attempt.error_kind,
            route: attempt.route.clone(),
        }
    }
}

fn attempts_of(payment: &Payment) -> impl Iterator<Item = AttemptSummary> + '_ {
    payment
        .history
        .iter()
        .map(move |attempt| AttemptSummary::new(payment.id, attempt))
}

/// Outcome of one issued payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub id: PaymentId,
    pub sender: NodeId,
    pub receiver: NodeId,
    pub amount: u64,
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub max_fee_limit: u64,
    /// Split into two shards
    pub mpp: bool,
    pub is_success: bool,
    pub is_timeout: bool,
    pub attempts: u32,
    pub no_balance_count: u32,
    pub offline_node_count: u32,
    /// Edges of the final route (the longer shard route for a split payment)
    pub route: Vec<EdgeId>,
    pub total_fee: Option<u64>,
    /// Finished attempts in order; shard attempts follow the parent's
    pub history: Vec<AttemptSummary>,
}

impl PaymentSummary {
    fn single(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            sender: payment.sender,
            receiver: payment.receiver,
            amount: payment.amount,
            start_time: payment.start_time,
            end_time: payment.end_time,
            max_fee_limit: payment.max_fee_limit,
            mpp: false,
            is_success: payment.is_success,
            is_timeout: payment.is_timeout,
            attempts: payment.attempts,
            no_balance_count: payment.no_balance_count,
            offline_node_count: payment.offline_node_count,
            route: route_edges(payment),
            total_fee: payment.route.as_ref().map(|route| route.total_fee),
            history: attempts_of(payment).collect(),
        }
    }

    /// Parent outcome from its two shards
    ///
    /// Successful only if both shards succeeded; ends when the later shard
    /// ends. Counters and attempts add up and fees add up when both shards
    /// were routed.
    fn split(parent: &Payment, first: &Payment, second: &Payment) -> Self {
        let (route, total_fee) = match (&first.route, &second.route) {
            (Some(a), Some(b)) => {
                let longer = if a.len() > b.len() { first } else { second };
                (route_edges(longer), Some(a.total_fee + b.total_fee))
            }
            _ => (Vec::new(), None),
        };
        let history = attempts_of(parent)
            .chain(attempts_of(first))
            .chain(attempts_of(second))
            .collect();

        Self {
            end_time: first.end_time.max(second.end_time),
            mpp: true,
            is_success: first.is_success && second.is_success,
            is_timeout: first.is_timeout || second.is_timeout,
            attempts: first.attempts + second.attempts,
            no_balance_count: first.no_balance_count + second.no_balance_count,
            offline_node_count: first.offline_node_count + second.offline_node_count,
            route,
            total_fee,
            history,
            ..Self::single(parent)
        }
    }
}

fn route_edges(payment: &Payment) -> Vec<EdgeId> {
    payment
        .route
        .as_ref()
        .map(|route| route.edge_ids().collect())
        .unwrap_or_default()
}

/// Fold shards into their parents
pub fn summarize_payments(payments: &[Payment]) -> Vec<PaymentSummary> {
    payments
        .iter()
        .filter(|payment| payment.parent.is_none())
        .map(|payment| {
            let shards = payment
                .shards
                .and_then(|[a, b]| Some((payments.get(a)?, payments.get(b)?)));
            match shards {
                Some((first, second)) => PaymentSummary::split(payment, first, second),
                None => PaymentSummary::single(payment),
            }
        })
        .collect()
}

/// Final state of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: GroupId,
    pub members: Vec<EdgeId>,
    pub balances: Vec<u64>,
    pub closed_time: Option<u64>,
    pub constructed_time: u64,
    pub min_bound: u64,
    pub max_bound: u64,
    pub max_cap: u64,
    pub min_cap: u64,
    pub group_cap: u64,
    /// Mean utilization loss over the latest capacity snapshot
    pub mean_utilization_loss: f64,
}

impl GroupSummary {
    fn new(group_id: GroupId, group: &Group, network: &Network) -> Self {
        Self {
            id: group.id.unwrap_or(group_id),
            members: group.edges.clone(),
            balances: group.edges.iter().map(|&edge| network.edge(edge).balance).collect(),
            closed_time: group.is_closed,
            constructed_time: group.constructed_time,
            min_bound: group.bounds.min,
            max_bound: group.bounds.max,
            max_cap: group.max_cap,
            min_cap: group.min_cap,
            group_cap: group.group_cap,
            mean_utilization_loss: group.mean_utilization_loss(),
        }
    }
}

/// Final state of one edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSummary {
    pub id: EdgeId,
    pub channel_id: ChannelId,
    pub counter_edge_id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub balance: u64,
    pub policy: Policy,
    pub is_closed: bool,
    pub tot_flows: u64,
    /// Forwards made as the group minimum during the current membership
    pub min_cap_use_count: u64,
    pub channel_updates: Vec<ChannelUpdate>,
    pub latest_channel_update: Option<u64>,
    pub group: Option<GroupId>,
    pub locked_balances: Vec<LockedBalance>,
    /// Sum of amount × lock duration over every locked balance (msat·ms)
    pub locked_amount_time: u128,
}

impl From<&Edge> for EdgeSummary {
    fn from(edge: &Edge) -> Self {
        let locked_amount_time = edge
            .locked_balances
            .iter()
            .map(|lock| u128::from(lock.amount) * u128::from(lock.end.saturating_sub(lock.start)))
            .sum();

        Self {
            id: edge.id,
            channel_id: edge.channel_id,
            counter_edge_id: edge.counter_edge_id,
            from: edge.from,
            to: edge.to,
            balance: edge.balance,
            policy: edge.policy,
            is_closed: edge.is_closed,
            tot_flows: edge.tot_flows,
            min_cap_use_count: edge.min_cap_use_count,
            channel_updates: edge.channel_updates.clone(),
            latest_channel_update: edge.latest_channel_update(),
            group: edge.group,
            locked_balances: edge.locked_balances.clone(),
            locked_amount_time,
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub config_hash: String,
    pub routing_method: RoutingMethod,
    pub end_time: u64,
    pub events_processed: u64,

    pub total_payments: usize,
    pub succeeded: usize,
    /// Ended without success and without timing out
    pub failed: usize,
    pub timed_out: usize,
    /// Payments with no end time (never reached a terminal state)
    pub unfinished: usize,
    pub success_rate: f64,
    pub mean_attempts: f64,
    pub total_fees: u64,

    pub groups_committed: usize,

    pub payments: Vec<PaymentSummary>,
    pub groups: Vec<GroupSummary>,
    pub edges: Vec<EdgeSummary>,
}

impl SimulationReport {
    pub fn build(
        config: &SimulationConfig,
        network: &Network,
        payments: &[Payment],
        events_processed: u64,
        end_time: u64,
    ) -> Result<Self, SimulationError> {
        let summaries = summarize_payments(payments);
        let total = summaries.len();
        let succeeded = summaries.iter().filter(|p| p.is_success).count();
        let timed_out = summaries.iter().filter(|p| p.is_timeout).count();
        let failed = summaries
            .iter()
            .filter(|p| !p.is_success && !p.is_timeout && p.end_time.is_some())
            .count();
        let unfinished = summaries.iter().filter(|p| p.end_time.is_none()).count();
        let attempts: u64 = summaries.iter().map(|p| u64::from(p.attempts)).sum();
        let total_fees = summaries
            .iter()
            .filter(|p| p.is_success)
            .filter_map(|p| p.total_fee)
            .sum();

        let ratio = |count: f64| if total == 0 { 0.0 } else { count / total as f64 };

        Ok(Self {
            config_hash: compute_config_hash(config)?,
            routing_method: config.routing_method,
            end_time,
            events_processed,
            total_payments: total,
            succeeded,
            failed,
            timed_out,
            unfinished,
            success_rate: ratio(succeeded as f64),
            mean_attempts: ratio(attempts as f64),
            total_fees,
            groups_committed: network.groups.len(),
            payments: summaries,
            groups: network
                .groups
                .iter()
                .enumerate()
                .map(|(id, group)| GroupSummary::new(id, group, network))
                .collect(),
            edges: network.edges.iter().map(EdgeSummary::from).collect(),
        })
    }

    pub fn to_json(&self) -> Result<String, SimulationError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SimulationError::SerializationError(e.to_string()))
    }
}
