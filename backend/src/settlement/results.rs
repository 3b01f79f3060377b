//! Channel-update broadcasts
//!
//! Fold the outcome of a finished attempt into the sender's node-pair
//! history. No balances move here.

use crate::models::network::Network;
use crate::models::payment::{Payment, PaymentErrorKind};
use crate::models::NodeId;

/// Record every hop of a successful attempt as a success
pub fn channel_update_success(
    network: &mut Network,
    node: NodeId,
    payment: &Payment,
    attempt: usize,
    now: u64,
) {
    let Some(attempt) = payment.history.get(attempt) else {
        return;
    };
    let results = network.node_mut(node);
    for hop in &attempt.hops {
        results.record_pair_success(hop.from, hop.to, hop.amount_to_forward, now);
    }
}

/// Record a failed attempt
///
/// Failures on the sender's own first hop are not folded. An offline node
/// poisons the pair in both directions; a balance failure credits the hops
/// before it with a success.
pub fn channel_update_fail(
    network: &mut Network,
    node: NodeId,
    payment: &Payment,
    attempt: usize,
    now: u64,
) {
    let Some(attempt) = payment.history.get(attempt) else {
        return;
    };
    let (Some(error_hop), Some(kind)) = (attempt.error_hop(), attempt.error_kind) else {
        return;
    };
    if error_hop.from == payment.sender {
        return;
    }

    let results = network.node_mut(node);
    match kind {
        PaymentErrorKind::OfflineNode => {
            results.record_pair_fail(error_hop.from, error_hop.to, 0, now);
            results.record_pair_fail(error_hop.to, error_hop.from, 0, now);
        }
        PaymentErrorKind::NoBalance => {
            for hop in &attempt.hops {
                if hop.edge_id == error_hop.edge_id {
                    results.record_pair_fail(hop.from, hop.to, hop.amount_to_forward, now);
                    break;
                }
                results.record_pair_success(hop.from, hop.to, hop.amount_to_forward, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::{Attempt, RouteHop};

    fn hop(edge_id: usize, from: usize, to: usize, amount: u64) -> RouteHop {
        RouteHop {
            edge_id,
            from,
            to,
            amount_to_forward: amount,
            timelock: 40,
            lock_start: 0,
            lock_end: 0,
        }
    }

    fn failed_payment(kind: PaymentErrorKind, error_edge: usize) -> Payment {
        let mut payment = Payment::new(0, 0, 3, 100, 0, 50);
        payment.history.push(Attempt {
            attempt: 1,
            is_succeeded: false,
            end_time: 10,
            error_edge: Some(error_edge),
            error_kind: Some(kind),
            route: Vec::new(),
            hops: vec![hop(10, 0, 1, 120), hop(20, 1, 2, 110), hop(30, 2, 3, 100)],
        });
        payment
    }

    #[test]
    fn test_no_balance_marks_prefix_success() {
        let mut network = Network::with_nodes(4);
        let payment = failed_payment(PaymentErrorKind::NoBalance, 30);
        channel_update_fail(&mut network, 0, &payment, 0, 500);

        let node = network.node(0);
        assert_eq!(node.pair_result(0, 1).unwrap().success_amount, 120);
        assert_eq!(node.pair_result(1, 2).unwrap().success_amount, 110);
        assert_eq!(node.pair_result(2, 3).unwrap().fail_amount, 100);
    }

    #[test]
    fn test_offline_fails_both_directions() {
        let mut network = Network::with_nodes(4);
        let payment = failed_payment(PaymentErrorKind::OfflineNode, 20);
        channel_update_fail(&mut network, 0, &payment, 0, 500);

        let node = network.node(0);
        assert_eq!(node.pair_result(1, 2).unwrap().fail_time, 500);
        assert_eq!(node.pair_result(2, 1).unwrap().fail_time, 500);
        assert!(node.pair_result(0, 1).is_none());
    }

    #[test]
    fn test_first_hop_failure_is_ignored() {
        let mut network = Network::with_nodes(4);
        let payment = failed_payment(PaymentErrorKind::NoBalance, 10);
        channel_update_fail(&mut network, 0, &payment, 0, 500);
        assert!(network.node(0).results.is_empty());
    }
}
