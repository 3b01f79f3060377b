//! Ahead-of-time initial paths
//!
//! Every payment's first path is computed once, in parallel, before the
//! event loop starts. The network is only read here, so each payment's
//! search is independent.

use crate::models::network::{EdgeId, Network};
use crate::models::payment::Payment;
use crate::routing::{PathHop, PathOracle, PathRequest};
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::debug;

/// Initial path per payment, indexed like `payments`
pub fn precompute_initial_paths<O: PathOracle>(
    oracle: &O,
    network: &Network,
    payments: &[Payment],
) -> Vec<Option<Vec<PathHop>>> {
    let excluded: HashSet<EdgeId> = HashSet::new();
    let paths: Vec<Option<Vec<PathHop>>> = payments
        .par_iter()
        .map(|payment| {
            oracle.find_route(
                network,
                &PathRequest {
                    source: payment.sender,
                    destination: payment.receiver,
                    amount: payment.amount,
                    now: payment.start_time,
                    excluded: &excluded,
                    fee_limit: payment.max_fee_limit,
                },
            )
        })
        .collect();

    debug!(
        payments = payments.len(),
        routable = paths.iter().filter(|p| p.is_some()).count(),
        "initial paths computed"
    );
    paths
}
