//! Group Lifecycle Manager
//!
//! Builds groups out of the construction backlog, keeps their published
//! capacity current, evicts members whose utilization loss exceeds their
//! tolerance, and closes groups exactly once.
//!
//! - `backlog`: deduplicated queue of ungrouped edges
//! - `construction`: greedy seed-and-expand group building
//! - `maintenance`: capacity refresh, leave policy, dissolution

pub mod backlog;
pub mod construction;
pub mod maintenance;

pub use backlog::Backlog;
pub use construction::admission_bounds;
pub use maintenance::{assess_member, LeaveAssessment};

use crate::models::event::{GroupEvent, GroupEventLog};
use crate::models::group::GroupId;
use crate::models::network::{EdgeId, Network};
use crate::orchestrator::config::{GroupConfig, HtlcConfig};
use tracing::debug;

/// Close reason when a payment update finds a structural violation
pub const REASON_UPDATE_VIOLATION: &str = "update_violation";
/// Close reason when departures shrink a group below its minimum size
pub const REASON_BELOW_MIN_SIZE: &str = "below_min_size";
/// Close reason for groups still open when the run ends
pub const REASON_SIMULATION_END: &str = "simulation_end";

/// Owner of the backlog, the attempt counter and the group event log
#[derive(Debug, Clone)]
pub struct GroupManager {
    config: GroupConfig,
    /// Post-leave cooldown (ms)
    cooldown: u64,
    broadcast_delay: u64,
    backlog: Backlog,
    attempt_counter: u64,
    log: GroupEventLog,
}

impl GroupManager {
    pub fn new(config: GroupConfig, htlc: &HtlcConfig) -> Self {
        let cooldown = config.cooldown_hops * htlc.average_forward_interval;
        Self {
            config,
            cooldown,
            broadcast_delay: htlc.group_broadcast_delay,
            backlog: Backlog::new(),
            attempt_counter: 0,
            log: GroupEventLog::new(),
        }
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    pub fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    pub fn log(&self) -> &GroupEventLog {
        &self.log
    }

    /// Construction attempts made so far
    pub fn attempts(&self) -> u64 {
        self.attempt_counter
    }

    /// Queue every ungrouped edge of the network
    pub fn enqueue_ungrouped(&mut self, network: &mut Network) {
        for edge in 0..network.num_edges() {
            if network.edge(edge).group.is_none() && !network.edge(edge).is_closed {
                self.backlog.push(network, edge);
            }
        }
    }

    /// Queue a single edge (e.g. one of a newly opened channel)
    pub fn enqueue(&mut self, network: &mut Network, edge: EdgeId) -> bool {
        self.backlog.push(network, edge)
    }

    /// Close a group once
    ///
    /// The first call stamps the closing time and logs the members at that
    /// moment; later calls do nothing and return `false`.
    pub fn close_group(&mut self, network: &mut Network, group_id: GroupId, reason: &str, now: u64) -> bool {
        let Some(group) = network.group_mut(group_id) else {
            return false;
        };
        if group.is_closed.is_some() {
            return false;
        }
        group.is_closed = Some(now);
        let members = group.members_string();
        if let Some(id) = group.id {
            self.log.log(GroupEvent::Close {
                time: now,
                group_id: id,
                reason: reason.to_string(),
                members,
            });
        }
        debug!(group = group_id, reason, time = now, "group closed");
        true
    }

    /// Clear membership of every member of a closed group and re-queue them
    ///
    /// The group keeps its member list as it was at close. A listed edge that
    /// already belongs to another group is left alone.
    pub(crate) fn release_members(&mut self, network: &mut Network, group_id: GroupId, now: u64) {
        let members = network
            .group(group_id)
            .map(|group| group.edges.clone())
            .unwrap_or_default();
        for edge in members {
            if network.edge(edge).group == Some(group_id) {
                network.edge_mut(edge).leave_group(now);
                self.backlog.push(network, edge);
            }
        }
    }

    /// Close every group still open
    pub fn close_open_groups(&mut self, network: &mut Network, reason: &str, now: u64) -> usize {
        let mut closed = 0;
        for group_id in 0..network.groups.len() {
            if self.close_group(network, group_id, reason, now) {
                closed += 1;
            }
        }
        closed
    }
}
