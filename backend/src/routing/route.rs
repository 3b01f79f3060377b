//! Path to route transformation

use crate::models::network::Network;
use crate::models::payment::{Route, RouteHop};
use crate::routing::PathHop;

/// Timelock delta required by the receiver on the last hop
pub const FINAL_TIMELOCK: u32 = 40;

/// Freeze `path` into a route delivering `amount` to the last node
///
/// Walks the path backwards: the last hop forwards `amount` with
/// [`FINAL_TIMELOCK`]; every earlier hop forwards the next hop's amount plus
/// the fee the next hop's edge charges, and adds its own edge's timelock.
pub fn build_route(network: &Network, path: &[PathHop], amount: u64) -> Route {
    let mut hops: Vec<RouteHop> = Vec::with_capacity(path.len());
    let mut next: Option<(u64, u32, usize)> = None;

    for (index, hop) in path.iter().enumerate().rev() {
        let (amount_to_forward, timelock) = match next {
            None => (amount, FINAL_TIMELOCK),
            Some((next_amount, next_timelock, next_index)) => {
                let next_policy = network.edge(path[next_index].edge_id).policy;
                let policy = network.edge(hop.edge_id).policy;
                (
                    next_amount + next_policy.fee(next_amount),
                    next_timelock + policy.timelock,
                )
            }
        };

        hops.push(RouteHop {
            edge_id: hop.edge_id,
            from: hop.from,
            to: hop.to,
            amount_to_forward,
            timelock,
            lock_start: 0,
            lock_end: 0,
        });
        next = Some((amount_to_forward, timelock, index));
    }
    hops.reverse();

    let total_amount = hops.first().map_or(amount, |hop| hop.amount_to_forward);
    let total_timelock = hops.first().map_or(0, |hop| hop.timelock);
    Route {
        hops,
        total_amount,
        total_fee: total_amount - amount,
        total_timelock,
    }
}
