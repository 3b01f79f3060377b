//! Path lookup for a payment attempt, including multi-path splitting

use crate::core::context::SimContext;
use crate::events::EventKind;
use crate::models::network::{EdgeId, Network};
use crate::models::payment::{Payment, PaymentId};
use crate::orchestrator::config::{RoutingMethod, SimulationConfig};
use crate::orchestrator::SimulationError;
use crate::routing::{build_route, PathHop, PathOracle, PathRequest};
use std::collections::HashSet;
use tracing::{debug, trace};

/// True if the sender still believes `path` can carry `amount` plus fees
///
/// The first hop is the sender's own edge, so its real balance is known.
pub fn path_still_viable<O: PathOracle>(
    oracle: &O,
    network: &Network,
    path: &[PathHop],
    amount: u64,
) -> bool {
    let capacity = path
        .iter()
        .enumerate()
        .map(|(i, hop)| {
            if i == 0 {
                network.edge(hop.edge_id).balance
            } else {
                oracle.estimate_capacity(network, hop.edge_id)
            }
        })
        .min()
        .unwrap_or(0);
    let fee = build_route(network, path, amount).total_fee;
    capacity >= amount + fee
}

/// Two paths over exactly the same edges
fn same_edges(a: &[PathHop], b: &[PathHop]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let edges: HashSet<EdgeId> = a.iter().map(|hop| hop.edge_id).collect();
    b.iter().all(|hop| edges.contains(&hop.edge_id))
}

fn search<O: PathOracle>(
    oracle: &O,
    network: &Network,
    payment: &Payment,
    amount: u64,
    fee_limit: u64,
    now: u64,
    excluded: &HashSet<EdgeId>,
) -> Option<Vec<PathHop>> {
    oracle.find_route(
        network,
        &PathRequest {
            source: payment.sender,
            destination: payment.receiver,
            amount,
            now,
            excluded,
            fee_limit,
        },
    )
}

/// Freeze `path` into the payment's route and send it now
fn dispatch(ctx: &mut SimContext, network: &Network, payment: &mut Payment, path: &[PathHop]) {
    payment.route = Some(build_route(network, path, payment.amount));
    payment.error = None;
    ctx.schedule_at(ctx.now(), EventKind::SendPayment, payment.sender, Some(payment.id));
}

/// Find a path for the next attempt of `payment_id`
///
/// The first attempt reuses the precomputed path while the sender still
/// believes it can carry the payment. Retries search again without the edges
/// earlier attempts failed on. A first attempt with no path is split in two
/// shards when multi-path is enabled.
#[allow(clippy::too_many_arguments)]
pub fn find_path<O: PathOracle>(
    ctx: &mut SimContext,
    network: &Network,
    payments: &mut Vec<Payment>,
    payment_id: PaymentId,
    config: &SimulationConfig,
    oracle: &O,
    initial_paths: &[Option<Vec<PathHop>>],
) -> Result<(), SimulationError> {
    let now = ctx.now();
    let method = config.routing_method;
    let payment = payments
        .get_mut(payment_id)
        .ok_or(SimulationError::PaymentNotFound(payment_id))?;

    payment.attempts += 1;

    if let Some(timeout) = config.htlc.payment_timeout {
        if now > payment.start_time.saturating_add(timeout) {
            payment.end_time = Some(now);
            payment.is_timeout = true;
            debug!(payment = payment_id, attempts = payment.attempts, "payment timed out");
            return Ok(());
        }
    }

    let no_exclusions = HashSet::new();
    let path = if payment.attempts == 1 {
        match initial_paths.get(payment_id).and_then(|p| p.as_ref()) {
            Some(path) if method == RoutingMethod::Baseline => Some(path.clone()),
            Some(path) if path_still_viable(oracle, network, path, payment.amount) => {
                Some(path.clone())
            }
            _ => search(
                oracle,
                network,
                payment,
                payment.amount,
                payment.max_fee_limit,
                now,
                &no_exclusions,
            ),
        }
    } else {
        let excluded: HashSet<EdgeId> = payment
            .history
            .iter()
            .filter_map(|attempt| attempt.error_edge)
            .collect();
        search(
            oracle,
            network,
            payment,
            payment.amount,
            payment.max_fee_limit,
            now,
            &excluded,
        )
    };

    if let Some(path) = path {
        trace!(payment = payment_id, attempt = payment.attempts, hops = path.len(), "path found");
        dispatch(ctx, network, payment, &path);
        return Ok(());
    }

    let can_split =
        config.htlc.mpp && !payment.is_shard && payment.attempts == 1 && payment.amount >= 2;
    if !can_split {
        payment.end_time = Some(now);
        debug!(payment = payment_id, attempts = payment.attempts, "no path");
        return Ok(());
    }

    let shard1_amount = payment.amount / 2;
    let shard2_amount = payment.amount - shard1_amount;
    let fee_limit = payment.max_fee_limit / 2;

    let Some(shard1_path) = search(oracle, network, payment, shard1_amount, fee_limit, now, &no_exclusions)
    else {
        payment.end_time = Some(now);
        return Ok(());
    };
    let Some(shard2_path) = search(oracle, network, payment, shard2_amount, fee_limit, now, &no_exclusions)
    else {
        payment.end_time = Some(now);
        return Ok(());
    };
    if method != RoutingMethod::Baseline && same_edges(&shard1_path, &shard2_path) {
        payment.end_time = Some(now);
        debug!(payment = payment_id, "shard paths identical, not splitting");
        return Ok(());
    }

    let shard1_id = payments.len();
    let shard2_id = shard1_id + 1;
    let parent = &mut payments[payment_id];
    let mut shard1 = parent.shard(shard1_id, shard1_amount);
    let mut shard2 = parent.shard(shard2_id, shard2_amount);
    parent.is_shard = true;
    parent.shards = Some([shard1_id, shard2_id]);

    dispatch(ctx, network, &mut shard1, &shard1_path);
    dispatch(ctx, network, &mut shard2, &shard2_path);
    payments.push(shard1);
    payments.push(shard2);

    debug!(payment = payment_id, shard1 = shard1_id, shard2 = shard2_id, "payment split");
    Ok(())
}
