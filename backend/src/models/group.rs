//! Channel groups
//!
//! A group pools edges of similar balance and publishes a single routable
//! capacity for all of them. Groups are created provisional (`id == None`),
//! committed once construction succeeds, and closed at most once.
//!
//! # Critical Invariants
//!
//! 1. **Disjoint endpoints**: no two members share a from/to node
//! 2. **Unique members**: no member id appears twice
//! 3. **Close once**: `is_closed` goes from `None` to `Some(time)` exactly once

use crate::models::network::EdgeId;
use serde::{Deserialize, Serialize};

pub type GroupId = usize;

/// Balance window an edge must fall in to join a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionBounds {
    pub min: u64,
    pub max: u64,
}

impl AdmissionBounds {
    pub fn admits(&self, balance: u64) -> bool {
        balance >= self.min && balance <= self.max
    }
}

/// Capacity snapshot taken on every group update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUpdate {
    pub time: u64,
    pub group_cap: u64,
    pub edge_balances: Vec<u64>,
}

/// Values last written to the group-event log for a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedStats {
    pub group_cap: u64,
    pub min_cap: u64,
    pub max_cap: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// `None` while provisional
    pub id: Option<GroupId>,
    /// Members in join order
    pub edges: Vec<EdgeId>,
    pub bounds: AdmissionBounds,
    /// Observed member balance extremes
    pub min_cap: u64,
    pub max_cap: u64,
    /// Published routable capacity
    pub group_cap: u64,
    pub constructed_time: u64,
    /// Closing time; `None` while open
    pub is_closed: Option<u64>,
    pub history: Vec<GroupUpdate>,
    pub seed_edge: EdgeId,
    pub attempt_id: u64,
    pub last_logged: Option<LoggedStats>,
}

impl Group {
    pub fn provisional(seed_edge: EdgeId, attempt_id: u64, bounds: AdmissionBounds, now: u64) -> Self {
        Self {
            id: None,
            edges: Vec::new(),
            bounds,
            min_cap: 0,
            max_cap: 0,
            group_cap: 0,
            constructed_time: now,
            is_closed: None,
            history: Vec::new(),
            seed_edge,
            attempt_id,
            last_logged: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_closed.is_none()
    }

    pub fn size(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, edge: EdgeId) -> bool {
        self.edges.contains(&edge)
    }

    /// Remove a member by id; returns whether it was present
    pub fn remove_member(&mut self, edge: EdgeId) -> bool {
        let before = self.edges.len();
        self.edges.retain(|&member| member != edge);
        self.edges.len() != before
    }

    /// True if some member id repeats
    pub fn has_duplicate_member(&self) -> bool {
        self.edges
            .iter()
            .enumerate()
            .any(|(i, edge)| self.edges[i + 1..].contains(edge))
    }

    /// Member ids joined by `-`
    pub fn members_string(&self) -> String {
        self.edges
            .iter()
            .map(|edge| edge.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn stats(&self) -> LoggedStats {
        LoggedStats {
            group_cap: self.group_cap,
            min_cap: self.min_cap,
            max_cap: self.max_cap,
        }
    }

    /// Mean utilization loss over the latest capacity snapshot
    pub fn mean_utilization_loss(&self) -> f64 {
        let Some(last) = self.history.last() else {
            return 0.0;
        };
        if last.edge_balances.is_empty() {
            return 0.0;
        }
        let total: f64 = last
            .edge_balances
            .iter()
            .map(|&balance| utilization_loss(last.group_cap, balance))
            .sum();
        total / last.edge_balances.len() as f64
    }
}

/// Fraction of `balance` hidden behind the published capacity
///
/// `clamp(1 - group_cap / balance, 0, 1)`, and 0 for an empty edge.
///
/// ```
/// use pcn_simulator_core_rs::models::group::utilization_loss;
///
/// assert!((utilization_loss(80, 100) - 0.2).abs() < 1e-12);
/// assert_eq!(utilization_loss(80, 0), 0.0);
/// assert_eq!(utilization_loss(120, 100), 0.0);
/// ```
pub fn utilization_loss(group_cap: u64, balance: u64) -> f64 {
    if balance == 0 {
        return 0.0;
    }
    (1.0 - group_cap as f64 / balance as f64).clamp(0.0, 1.0)
}
