//! Group construction
//!
//! One pass over the balance-sorted backlog. Every queued edge is tried as a
//! seed at most once per pass. From the seed the pass walks outward through
//! its neighbours in balance order, alternating towards smaller and larger
//! balances, and admits every edge that fits the seed's bounds and touches no
//! node already covered by the group.
//!
//! A seed that cannot fill a group stays queued and the pass moves on to the
//! next seed, so a pass makes at most one attempt per queued edge.

use crate::core::context::SimContext;
use crate::groups::GroupManager;
use crate::models::event::{GroupEvent, JoinRole};
use crate::models::group::{AdmissionBounds, Group};
use crate::models::network::{EdgeId, Network};
use crate::orchestrator::config::{Admission, Tolerance};
use tracing::{debug, trace};

/// Admission window derived from the seed balance
///
/// ```
/// use pcn_simulator_core_rs::groups::admission_bounds;
/// use pcn_simulator_core_rs::orchestrator::config::Admission;
///
/// let bounds = admission_bounds(1_000, &Admission::Symmetric { limit_rate: 0.1 });
/// assert_eq!((bounds.min, bounds.max), (900, 1_100));
///
/// let bounds = admission_bounds(1_000, &Admission::Ratio { min_ratio: 0.5, max_ratio: 2.0 });
/// assert_eq!((bounds.min, bounds.max), (500, 2_000));
/// ```
pub fn admission_bounds(balance: u64, admission: &Admission) -> AdmissionBounds {
    match *admission {
        Admission::Symmetric { limit_rate } => {
            let delta = (balance as f64 * limit_rate) as u64;
            AdmissionBounds {
                min: balance.saturating_sub(delta),
                max: balance.checked_add(delta).unwrap_or(u64::MAX),
            }
        }
        Admission::Ratio {
            min_ratio,
            max_ratio,
        } => AdmissionBounds {
            min: (balance as f64 * min_ratio) as u64,
            max: (balance as f64 * max_ratio) as u64,
        },
    }
}

/// Whether `candidate` may join a group currently made of `members`
fn can_join(network: &Network, bounds: &AdmissionBounds, members: &[EdgeId], candidate: EdgeId) -> bool {
    let edge = network.edge(candidate);
    if edge.group.is_some() || edge.is_closed || !bounds.admits(edge.balance) {
        return false;
    }
    members.iter().all(|&member| {
        member != candidate && !network.edge(member).shares_endpoint(edge)
    })
}

impl GroupManager {
    /// Try to build groups out of the backlog
    ///
    /// Returns the number of groups committed.
    pub fn construct_groups(&mut self, ctx: &mut SimContext, network: &mut Network) -> usize {
        if self.backlog.is_empty() {
            return 0;
        }

        let now = ctx.now();
        let group_size = self.config.group_size;
        self.backlog.sort_by_balance(network);
        let mut order = self.backlog.to_vec();
        let mut committed = 0;
        let mut index = 0;

        // Every entry before `index` has already failed as a seed this pass
        while index < order.len() {
            let seed = order[index];
            self.attempt_counter += 1;
            let attempt_id = self.attempt_counter;
            self.log.log(GroupEvent::ConstructBegin {
                time: now,
                seed_id: seed,
                attempt_id,
            });

            let bounds = admission_bounds(network.edge(seed).balance, &self.config.admission);
            let members = gather_members(network, &order, index, &bounds, group_size);

            if members.len() < group_size {
                self.log.log(GroupEvent::ConstructAbort {
                    time: now,
                    seed_id: seed,
                    attempt_id,
                    size: members.len(),
                    needed: group_size,
                });
                trace!(seed, attempt_id, size = members.len(), "construction aborted");
                index += 1;
                continue;
            }

            let before = order[..index]
                .iter()
                .filter(|edge| !members.contains(edge))
                .count();
            order.retain(|edge| !members.contains(edge));
            for &member in &members {
                self.backlog.remove(network, member);
            }
            self.commit(ctx, network, seed, attempt_id, bounds, members);
            committed += 1;
            index = before;
        }

        // Seeds that failed stay queued in balance order
        self.backlog.set_order(order);
        committed
    }

    fn commit(
        &mut self,
        ctx: &mut SimContext,
        network: &mut Network,
        seed: EdgeId,
        attempt_id: u64,
        bounds: AdmissionBounds,
        members: Vec<EdgeId>,
    ) {
        let now = ctx.now();
        let group_id = network.groups.len();
        let mut group = Group::provisional(seed, attempt_id, bounds, now);
        group.id = Some(group_id);
        group.edges = members;
        self.refresh(network, &mut group, now);
        group.last_logged = Some(group.stats());

        self.log.log(GroupEvent::ConstructCommit {
            time: now,
            group_id,
            seed_id: seed,
            attempt_id,
            members: group.members_string(),
            group_cap: group.group_cap,
            min: group.min_cap,
            max: group.max_cap,
        });

        for (position, &member) in group.edges.iter().enumerate() {
            let tau = match self.config.tolerance {
                Tolerance::Fixed { tau } => tau,
                Tolerance::Uniform { min, max } => ctx.rng().uniform(min, max),
            };
            let edge = network.edge_mut(member);
            edge.group = Some(group_id);
            edge.join_time = Some(now);
            edge.flows_at_join = edge.tot_flows;
            edge.min_cap_use_count = 0;
            edge.tolerance_tau = tau;

            self.log.log(GroupEvent::Join {
                time: now,
                group_id,
                edge_id: member,
                role: if position == 0 {
                    JoinRole::Seed
                } else {
                    JoinRole::Member
                },
                seed_id: seed,
                attempt_id,
            });
        }

        debug!(
            group = group_id,
            size = group.edges.len(),
            group_cap = group.group_cap,
            "group committed"
        );
        network.groups.push(group);
    }
}

/// Seed plus admissible neighbours, nearest first
fn gather_members(
    network: &Network,
    order: &[EdgeId],
    seed_index: usize,
    bounds: &AdmissionBounds,
    group_size: usize,
) -> Vec<EdgeId> {
    let mut members = vec![order[seed_index]];
    let mut below = seed_index.checked_sub(1);
    let mut above = Some(seed_index + 1).filter(|&i| i < order.len());

    while members.len() < group_size && (below.is_some() || above.is_some()) {
        // Sorted order: once both sides are out of bounds nothing further fits
        if let (Some(lo), Some(hi)) = (below, above) {
            if network.edge(order[lo]).balance < bounds.min
                && network.edge(order[hi]).balance > bounds.max
            {
                break;
            }
        }

        if let Some(lo) = below {
            if can_join(network, bounds, &members, order[lo]) {
                members.push(order[lo]);
                if members.len() == group_size {
                    break;
                }
            }
            below = lo.checked_sub(1);
        }

        if let Some(hi) = above {
            if can_join(network, bounds, &members, order[hi]) {
                members.push(order[hi]);
                if members.len() == group_size {
                    break;
                }
            }
            above = Some(hi + 1).filter(|&i| i < order.len());
        }
    }

    members
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_bounds_saturate() {
        let bounds = admission_bounds(u64::MAX - 1, &Admission::Symmetric { limit_rate: 0.5 });
        assert_eq!(bounds.max, u64::MAX);

        let bounds = admission_bounds(10, &Admission::Symmetric { limit_rate: 1.0 });
        assert_eq!(bounds.min, 0);
        assert_eq!(bounds.max, 20);
    }
}
