//! Group maintenance after payment settlement
//!
//! A settled payment may have moved balances inside any group touched by its
//! route, on either direction of each hop. Every such group is refreshed,
//! checked for structural damage, and then run through the leave policy.

use crate::core::context::SimContext;
use crate::events::EventKind;
use crate::groups::{GroupManager, REASON_BELOW_MIN_SIZE, REASON_UPDATE_VIOLATION};
use crate::models::event::GroupEvent;
use crate::models::group::{utilization_loss, Group, GroupId, GroupUpdate};
use crate::models::network::{Edge, EdgeId, Network, NodeId};
use crate::models::payment::PaymentId;
use tracing::debug;

/// Outcome of the leave policy for one member
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaveAssessment {
    pub utilization_loss: f64,
    pub used_since_join: u64,
    pub is_min_edge: bool,
    pub eligible: bool,
}

/// Apply the leave policy to a member, ignoring cooldown and the per-tick cap
///
/// A member is a candidate when its utilization loss reaches its tolerance,
/// or when it holds the group minimum and has forwarded more than
/// `k_used_on_min_edge` HTLCs since joining.
pub fn assess_member(edge: &Edge, group: &Group, k_used_on_min_edge: u64) -> LeaveAssessment {
    let utilization_loss = utilization_loss(group.group_cap, edge.balance);
    let is_min_edge = edge.balance == group.min_cap;
    let used_since_join = edge.flows_since_join();
    let eligible = utilization_loss >= edge.tolerance_tau
        || (is_min_edge && used_since_join > k_used_on_min_edge);

    LeaveAssessment {
        utilization_loss,
        used_since_join,
        is_min_edge,
        eligible,
    }
}

/// Member balances as seen by a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Observation {
    pub min: u64,
    pub max: u64,
    pub below_bounds: usize,
    pub above_bounds: usize,
    pub balances: Vec<u64>,
    pub violation: bool,
}

/// True if the group is empty, repeats a member, or two members share a node
pub(crate) fn structural_violation(network: &Network, group: &Group) -> bool {
    if group.edges.is_empty() || group.has_duplicate_member() {
        return true;
    }
    group.edges.iter().enumerate().any(|(i, &a)| {
        group.edges[i + 1..]
            .iter()
            .any(|&b| network.edge(a).shares_endpoint(network.edge(b)))
    })
}

pub(crate) fn observe(network: &Network, group: &Group) -> Observation {
    let balances: Vec<u64> = group
        .edges
        .iter()
        .map(|&edge| network.edge(edge).balance)
        .collect();

    Observation {
        min: balances.iter().copied().min().unwrap_or(0),
        max: balances.iter().copied().max().unwrap_or(0),
        below_bounds: balances.iter().filter(|&&b| b < group.bounds.min).count(),
        above_bounds: balances.iter().filter(|&&b| b > group.bounds.max).count(),
        violation: structural_violation(network, group),
        balances,
    }
}

impl GroupManager {
    /// Published capacity for observed extremes
    fn published_capacity(&self, group: &Group, min: u64) -> u64 {
        if self.config.group_cap_update {
            min
        } else {
            group.bounds.min
        }
    }

    /// Recompute extremes and capacity and append a history snapshot
    pub(crate) fn refresh(&self, network: &Network, group: &mut Group, now: u64) -> Observation {
        let observation = observe(network, group);
        self.apply(group, &observation, now);
        observation
    }

    fn apply(&self, group: &mut Group, observation: &Observation, now: u64) {
        group.min_cap = observation.min;
        group.max_cap = observation.max;
        group.group_cap = self.published_capacity(group, observation.min);
        group.history.push(GroupUpdate {
            time: now,
            group_cap: group.group_cap,
            edge_balances: observation.balances.clone(),
        });
    }

    /// Refresh a committed group; returns whether it is structurally broken
    ///
    /// Balances outside the admission bounds are only reported in the log
    /// reason. An `update_group` record is written only when the published
    /// capacity or the extremes changed since the last record.
    pub fn update_group(&mut self, network: &mut Network, group_id: GroupId, now: u64) -> bool {
        let Some(group) = network.group(group_id) else {
            return false;
        };
        let observation = observe(network, group);
        let Some(group) = network.group_mut(group_id) else {
            return false;
        };
        self.apply(group, &observation, now);

        if let Some(id) = group.id {
            let stats = group.stats();
            if group.last_logged != Some(stats) {
                self.log.log(GroupEvent::UpdateGroup {
                    time: now,
                    group_id: id,
                    reason: format!(
                        "update;rv={};lo={};hi={}",
                        observation.below_bounds + observation.above_bounds,
                        observation.below_bounds,
                        observation.above_bounds
                    ),
                    size: group.edges.len(),
                    group_cap: stats.group_cap,
                    min: stats.min_cap,
                    max: stats.max_cap,
                });
                group.last_logged = Some(stats);
            }
        }

        observation.violation
    }

    /// Handle a group-update request for a settled route
    ///
    /// Visits each distinct open group reachable from the route's edges and
    /// their counter-edges, in route order.
    pub fn request_group_update(
        &mut self,
        ctx: &mut SimContext,
        network: &mut Network,
        route_edges: &[EdgeId],
        node: NodeId,
        payment: Option<PaymentId>,
    ) {
        let now = ctx.now();
        let mut touched: Vec<GroupId> = Vec::new();
        for &edge_id in route_edges {
            let counter = network.edge(edge_id).counter_edge_id;
            for id in [edge_id, counter] {
                if let Some(group_id) = network.edge(id).group {
                    if !touched.contains(&group_id) {
                        touched.push(group_id);
                    }
                }
            }
        }

        let mut rebuild_now = false;
        let mut rebuild_later = false;

        for group_id in touched {
            if !network.group(group_id).is_some_and(Group::is_open) {
                continue;
            }

            if self.update_group(network, group_id, now) {
                self.close_group(network, group_id, REASON_UPDATE_VIOLATION, now);
                self.release_members(network, group_id, now);
                rebuild_now = true;
                continue;
            }

            if self.apply_leave_policy(network, group_id, now) > 0 {
                rebuild_later = true;
            }
        }

        if rebuild_now {
            ctx.schedule_at(now, EventKind::ConstructGroups, node, payment);
        }
        if rebuild_later {
            ctx.schedule_at(
                now.saturating_add(self.broadcast_delay),
                EventKind::ConstructGroups,
                node,
                payment,
            );
        }
    }

    /// Evict eligible members; returns how many left
    fn apply_leave_policy(&mut self, network: &mut Network, group_id: GroupId, now: u64) -> usize {
        let Some(group) = network.group(group_id) else {
            return 0;
        };
        let leaving: Vec<(EdgeId, LeaveAssessment)> = group
            .edges
            .iter()
            .filter_map(|&edge_id| {
                let edge = network.edge(edge_id);
                if edge.in_cooldown(now, self.cooldown) {
                    return None;
                }
                let assessment = assess_member(edge, group, self.config.k_used_on_min_edge);
                assessment.eligible.then_some((edge_id, assessment))
            })
            .take(self.config.max_leaves_per_group_tick)
            .collect();

        if leaving.is_empty() {
            return 0;
        }

        for &(edge_id, assessment) in &leaving {
            if let Some(id) = network.group(group_id).and_then(|group| group.id) {
                self.log.log(GroupEvent::Leave {
                    time: now,
                    group_id: id,
                    edge_id,
                    reason: format!(
                        "UL={:.6};used={}",
                        assessment.utilization_loss, assessment.used_since_join
                    ),
                });
            }
            if let Some(group) = network.group_mut(group_id) {
                group.remove_member(edge_id);
            }
            network.edge_mut(edge_id).leave_group(now);
            self.backlog.push(network, edge_id);
            debug!(group = group_id, edge = edge_id, "member left");
        }

        let remaining = network.group(group_id).map_or(0, Group::size);
        if remaining < self.config.group_size_min {
            self.close_group(network, group_id, REASON_BELOW_MIN_SIZE, now);
            self.release_members(network, group_id, now);
        } else if let Some(group) = network.group(group_id) {
            // Departures can move the minimum; publish it without a snapshot
            let observation = observe(network, group);
            let cap = self.published_capacity(group, observation.min);
            if let Some(group) = network.group_mut(group_id) {
                group.min_cap = observation.min;
                group.max_cap = observation.max;
                group.group_cap = cap;
            }
        }

        leaving.len()
    }
}
