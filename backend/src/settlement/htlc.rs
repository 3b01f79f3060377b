//! HTLC forwarding, settlement and failure unwinding
//!
//! One handler per protocol step. Each handler runs to completion inside a
//! single event: it mutates the ledger and schedules the follow-up event.
//!
//! # Balance movement
//!
//! - Send/forward debit the outgoing edge by the hop amount
//! - Success credits the counter-edge of every hop, walking back to the sender
//! - Failure re-credits every hop that was debited; the failing hop itself
//!   never was
//!
//! Protocol failures (no balance, offline node) are recorded on the payment.
//! Ownership and policy violations mean a route or the bookkeeping is wrong
//! and abort the run.

use crate::core::context::SimContext;
use crate::events::{Event, EventKind};
use crate::models::network::{ChannelUpdate, EdgeId, LockedBalance, Network, NodeId, Policy};
use crate::models::payment::{
    Attempt, EdgeSnapshot, Payment, PaymentError, PaymentErrorKind, Route, RouteHop,
};
use crate::orchestrator::config::{HtlcConfig, SimulationConfig};
use crate::orchestrator::SimulationError;
use thiserror::Error;
use tracing::trace;

/// Forwarding that contradicts the edge's own policy
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("amount {amount} is below min_htlc {min_htlc}")]
    BelowMinHtlc { amount: u64, min_htlc: u64 },

    #[error("upstream amount {actual} does not equal {expected} (amount plus fee)")]
    FeeMismatch { expected: u64, actual: u64 },

    #[error("upstream timelock {actual} does not equal {expected}")]
    TimelockMismatch { expected: u32, actual: u32 },
}

/// Check that `next_hop` forwards exactly what `prev_hop` paid for
///
/// `next_policy` is the policy of the edge being forwarded on,
/// `prev_policy` the policy of the edge the HTLC arrived on.
pub fn check_forward_policy(
    next_policy: &Policy,
    prev_policy: &Policy,
    prev_hop: &RouteHop,
    next_hop: &RouteHop,
) -> Result<(), PolicyViolation> {
    if next_hop.amount_to_forward < next_policy.min_htlc {
        return Err(PolicyViolation::BelowMinHtlc {
            amount: next_hop.amount_to_forward,
            min_htlc: next_policy.min_htlc,
        });
    }

    let expected = next_hop.amount_to_forward + next_policy.fee(next_hop.amount_to_forward);
    if prev_hop.amount_to_forward != expected {
        return Err(PolicyViolation::FeeMismatch {
            expected,
            actual: prev_hop.amount_to_forward,
        });
    }

    let expected = next_hop.timelock + prev_policy.timelock;
    if prev_hop.timelock != expected {
        return Err(PolicyViolation::TimelockMismatch {
            expected,
            actual: prev_hop.timelock,
        });
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Mean forwarding interval plus |gaussian| jitter
pub(crate) fn hop_delay(ctx: &mut SimContext, config: &HtlcConfig) -> u64 {
    let jitter = (config.variance_forward_interval as f64 * ctx.rng().gaussian()).abs();
    config.average_forward_interval.saturating_add(jitter as u64)
}

fn ensure_owned(
    network: &Network,
    node: NodeId,
    edge: EdgeId,
    payment: &Payment,
) -> Result<(), SimulationError> {
    if network.node(node).open_edges.contains(&edge) {
        Ok(())
    } else {
        Err(SimulationError::EdgeNotOwned {
            edge,
            node,
            payment: payment.id,
        })
    }
}

fn route_mut(payment: &mut Payment) -> Result<&mut Route, SimulationError> {
    let id = payment.id;
    match payment.route.as_mut() {
        Some(route) if !route.is_empty() => Ok(route),
        _ => Err(SimulationError::RouteMissing(id)),
    }
}

fn hop_not_found(payment: &Payment, node: NodeId) -> SimulationError {
    SimulationError::HopNotFound {
        payment: payment.id,
        node,
    }
}

/// Take `amount` from an edge for a new HTLC
fn debit(network: &mut Network, edge_id: EdgeId, amount: u64) {
    let min_cap = network
        .edge(edge_id)
        .group
        .and_then(|id| network.group(id))
        .filter(|group| group.is_open())
        .map(|group| group.min_cap);

    let edge = network.edge_mut(edge_id);
    if min_cap == Some(edge.balance) {
        edge.min_cap_use_count += 1;
    }
    edge.balance -= amount;
    edge.tot_flows += 1;
}

fn credit(network: &mut Network, edge_id: EdgeId, amount: u64) {
    network.edge_mut(edge_id).balance += amount;
}

fn fail_event_kind(payment: &Payment, prev_node: NodeId) -> EventKind {
    if prev_node == payment.sender {
        EventKind::ReceiveFail
    } else {
        EventKind::ForwardFail
    }
}

fn success_event_kind(payment: &Payment, prev_node: NodeId) -> EventKind {
    if prev_node == payment.sender {
        EventKind::ReceiveSuccess
    } else {
        EventKind::ForwardSuccess
    }
}

/// Append the finished attempt to the payment history; returns its index
pub(crate) fn record_attempt(
    network: &Network,
    payment: &mut Payment,
    now: u64,
    is_succeeded: bool,
) -> usize {
    let hops = payment
        .route
        .as_ref()
        .map(|route| route.hops.clone())
        .unwrap_or_default();

    let route = hops
        .iter()
        .map(|hop| {
            let edge = network.edge(hop.edge_id);
            EdgeSnapshot {
                edge_id: edge.id,
                balance: edge.balance,
                group_cap: edge
                    .group
                    .and_then(|id| network.group(id))
                    .map(|group| group.group_cap),
                channel_update: edge.latest_channel_update(),
                sent_amount: hop.amount_to_forward,
            }
        })
        .collect();

    let (error_edge, error_kind) = match (is_succeeded, payment.error) {
        (false, Some(error)) => (hops.get(error.hop).map(|hop| hop.edge_id), Some(error.kind)),
        _ => (None, None),
    };

    payment.history.push(Attempt {
        attempt: payment.attempts,
        is_succeeded,
        end_time: now,
        error_edge,
        error_kind,
        route,
        hops,
    });
    payment.history.len() - 1
}

/// Store the lock interval of `hops` on their edges
fn record_locked_balances(network: &mut Network, hops: &[RouteHop], now: u64) {
    for hop in hops {
        let end = if hop.lock_start > hop.lock_end {
            now
        } else {
            hop.lock_end
        };
        network.edge_mut(hop.edge_id).locked_balances.push(LockedBalance {
            amount: hop.amount_to_forward,
            start: hop.lock_start,
            end,
        });
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Sender offers the HTLC on the first hop
pub fn send_payment(
    ctx: &mut SimContext,
    network: &mut Network,
    payment: &mut Payment,
    config: &SimulationConfig,
    event: &Event,
) -> Result<(), SimulationError> {
    let now = ctx.now();
    let node = event.node_id;
    let first = {
        let route = route_mut(payment)?;
        route.hops[0].lock_start = now;
        route.hops[0].clone()
    };
    ensure_owned(network, node, first.edge_id, payment)?;

    let offline = ctx.rng().bernoulli(config.htlc.faulty_node_prob);
    if offline && first.to != payment.receiver {
        payment.offline_node_count += 1;
        payment.error = Some(PaymentError {
            kind: PaymentErrorKind::OfflineNode,
            hop: 0,
        });
        trace!(payment = payment.id, node = first.to, "next node offline");
        ctx.schedule_at(
            now.saturating_add(config.htlc.offline_latency),
            EventKind::ReceiveFail,
            node,
            Some(payment.id),
        );
        return Ok(());
    }

    if first.amount_to_forward > network.edge(first.edge_id).balance {
        payment.no_balance_count += 1;
        payment.error = Some(PaymentError {
            kind: PaymentErrorKind::NoBalance,
            hop: 0,
        });
        trace!(payment = payment.id, edge = first.edge_id, "no balance on first hop");
        ctx.schedule_at(now, EventKind::ReceiveFail, node, Some(payment.id));
        return Ok(());
    }

    debit(network, first.edge_id, first.amount_to_forward);

    let kind = if first.to == payment.receiver {
        EventKind::ReceivePayment
    } else {
        EventKind::ForwardPayment
    };
    let time = now.saturating_add(hop_delay(ctx, &config.htlc));
    ctx.schedule_at(time, kind, first.to, Some(payment.id));
    Ok(())
}

/// Intermediate node forwards the HTLC on its outgoing hop
pub fn forward_payment(
    ctx: &mut SimContext,
    network: &mut Network,
    payment: &mut Payment,
    config: &SimulationConfig,
    event: &Event,
) -> Result<(), SimulationError> {
    let now = ctx.now();
    let node = event.node_id;
    let (next_index, next_hop, prev_hop) = {
        let route = route_mut(payment)?;
        let next_index = route.hop_from(node);
        let prev_index = route.hop_to(node);
        match (next_index, prev_index) {
            (Some(next), Some(prev)) => {
                route.hops[next].lock_start = now;
                (next, route.hops[next].clone(), route.hops[prev].clone())
            }
            _ => return Err(hop_not_found(payment, node)),
        }
    };
    let is_last_hop = next_hop.to == payment.receiver;
    ensure_owned(network, node, next_hop.edge_id, payment)?;

    let prev_node = prev_hop.from;
    let fail_kind = fail_event_kind(payment, prev_node);

    let offline = ctx.rng().bernoulli(config.htlc.faulty_node_prob);
    if offline && !is_last_hop {
        payment.offline_node_count += 1;
        payment.error = Some(PaymentError {
            kind: PaymentErrorKind::OfflineNode,
            hop: next_index,
        });
        trace!(payment = payment.id, node = next_hop.to, "next node offline");
        let time = now
            .saturating_add(hop_delay(ctx, &config.htlc))
            .saturating_add(config.htlc.offline_latency);
        ctx.schedule_at(time, fail_kind, prev_node, Some(payment.id));
        return Ok(());
    }

    let next_edge = network.edge(next_hop.edge_id);
    if next_hop.amount_to_forward > next_edge.balance {
        payment.no_balance_count += 1;
        payment.error = Some(PaymentError {
            kind: PaymentErrorKind::NoBalance,
            hop: next_index,
        });
        trace!(payment = payment.id, edge = next_hop.edge_id, "no balance");
        let time = now.saturating_add(hop_delay(ctx, &config.htlc));
        ctx.schedule_at(time, fail_kind, prev_node, Some(payment.id));
        return Ok(());
    }

    let prev_policy = network.edge(prev_hop.edge_id).policy;
    check_forward_policy(&next_edge.policy, &prev_policy, &prev_hop, &next_hop).map_err(
        |violation| SimulationError::PolicyViolation {
            edge: next_hop.edge_id,
            payment: payment.id,
            violation,
        },
    )?;

    debit(network, next_hop.edge_id, next_hop.amount_to_forward);

    let kind = if is_last_hop {
        EventKind::ReceivePayment
    } else {
        EventKind::ForwardPayment
    };
    let time = now.saturating_add(hop_delay(ctx, &config.htlc));
    ctx.schedule_at(time, kind, next_hop.to, Some(payment.id));
    Ok(())
}

/// Receiver settles the last hop and starts the success unwind
pub fn receive_payment(
    ctx: &mut SimContext,
    network: &mut Network,
    payment: &mut Payment,
    config: &SimulationConfig,
    event: &Event,
) -> Result<(), SimulationError> {
    let now = ctx.now();
    let node = event.node_id;
    let last = {
        let route = route_mut(payment)?;
        let index = route.len() - 1;
        route.hops[index].lock_end = now;
        route.hops[index].clone()
    };
    let backward = network.edge(last.edge_id).counter_edge_id;
    ensure_owned(network, node, backward, payment)?;

    credit(network, backward, last.amount_to_forward);

    let kind = success_event_kind(payment, last.from);
    let time = now.saturating_add(hop_delay(ctx, &config.htlc));
    ctx.schedule_at(time, kind, last.from, Some(payment.id));
    Ok(())
}

/// Intermediate node settles its incoming hop
pub fn forward_success(
    ctx: &mut SimContext,
    network: &mut Network,
    payment: &mut Payment,
    config: &SimulationConfig,
    event: &Event,
) -> Result<(), SimulationError> {
    let now = ctx.now();
    let node = event.node_id;
    let prev_hop = {
        let route = route_mut(payment)?;
        match route.hop_to(node) {
            Some(index) => {
                route.hops[index].lock_end = now;
                route.hops[index].clone()
            }
            None => return Err(hop_not_found(payment, node)),
        }
    };
    let backward = network.edge(prev_hop.edge_id).counter_edge_id;
    ensure_owned(network, node, backward, payment)?;

    credit(network, backward, prev_hop.amount_to_forward);

    let kind = success_event_kind(payment, prev_hop.from);
    let time = now.saturating_add(hop_delay(ctx, &config.htlc));
    ctx.schedule_at(time, kind, prev_hop.from, Some(payment.id));
    Ok(())
}

/// Sender learns the payment settled
pub fn receive_success(
    ctx: &mut SimContext,
    network: &mut Network,
    payment: &mut Payment,
    config: &SimulationConfig,
    event: &Event,
) -> Result<(), SimulationError> {
    let now = ctx.now();
    route_mut(payment)?;
    payment.end_time = Some(now);
    payment.is_success = true;

    let attempt = record_attempt(network, payment, now, true);
    if let Some(route) = payment.route.as_ref() {
        record_locked_balances(network, &route.hops, now);
    }

    let time = now.saturating_add(config.htlc.group_broadcast_delay);
    if config.groups_enabled() {
        ctx.schedule_at(time, EventKind::UpdateGroup, event.node_id, Some(payment.id));
    }
    ctx.schedule_at(
        time,
        EventKind::ChannelUpdateSuccess { attempt },
        event.node_id,
        Some(payment.id),
    );
    trace!(payment = payment.id, attempts = payment.attempts, "payment succeeded");
    Ok(())
}

/// Intermediate node releases its outgoing hop and passes the failure back
pub fn forward_fail(
    ctx: &mut SimContext,
    network: &mut Network,
    payment: &mut Payment,
    config: &SimulationConfig,
    event: &Event,
) -> Result<(), SimulationError> {
    let now = ctx.now();
    let node = event.node_id;
    let (next_hop, prev_node) = {
        let route = route_mut(payment)?;
        let next_index = route.hop_from(node);
        let prev_index = route.hop_to(node);
        match (next_index, prev_index) {
            (Some(next), Some(prev)) => {
                route.hops[next].lock_end = now;
                (route.hops[next].clone(), route.hops[prev].from)
            }
            _ => return Err(hop_not_found(payment, node)),
        }
    };
    ensure_owned(network, node, next_hop.edge_id, payment)?;

    credit(network, next_hop.edge_id, next_hop.amount_to_forward);

    let kind = fail_event_kind(payment, prev_node);
    let time = now.saturating_add(hop_delay(ctx, &config.htlc));
    ctx.schedule_at(time, kind, prev_node, Some(payment.id));
    Ok(())
}

/// Sender learns the attempt failed; releases the first hop and retries
pub fn receive_fail(
    ctx: &mut SimContext,
    network: &mut Network,
    payment: &mut Payment,
    config: &SimulationConfig,
    event: &Event,
) -> Result<(), SimulationError> {
    let now = ctx.now();
    let node = event.node_id;
    let error = payment
        .error
        .ok_or(SimulationError::ErrorMissing(payment.id))?;
    let (first, error_hop) = {
        let route = route_mut(payment)?;
        match route.hops.get(error.hop) {
            Some(hop) => (route.hops[0].clone(), hop.clone()),
            None => return Err(hop_not_found(payment, node)),
        }
    };

    // A failure on the first hop happened before anything was debited
    if error_hop.from != payment.sender {
        ensure_owned(network, node, first.edge_id, payment)?;
        credit(network, first.edge_id, first.amount_to_forward);
    }

    network
        .edge_mut(error_hop.edge_id)
        .channel_updates
        .push(ChannelUpdate {
            time: now,
            htlc_maximum: payment.amount,
        });

    let attempt = record_attempt(network, payment, now, false);
    if let Some(route) = payment.route.as_ref() {
        record_locked_balances(network, &route.hops[..=error.hop], now);
    }
    trace!(
        payment = payment.id,
        edge = error_hop.edge_id,
        kind = ?error.kind,
        "attempt failed"
    );

    ctx.schedule_at(now, EventKind::FindPath, payment.sender, Some(payment.id));
    ctx.schedule_at(
        now.saturating_add(config.htlc.group_broadcast_delay),
        EventKind::ChannelUpdateFail { attempt },
        node,
        Some(payment.id),
    );
    Ok(())
}
