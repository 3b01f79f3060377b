//! Construction backlog
//!
//! FIFO of ungrouped edges waiting to be placed in a group. The edge's
//! `in_backlog` flag is the only duplicate check, so an edge is queued at most
//! once no matter how often it is released.

use crate::models::network::{EdgeId, Network};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default)]
pub struct Backlog {
    entries: VecDeque<EdgeId>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `edge` unless it is already queued; returns whether it was added
    pub fn push(&mut self, network: &mut Network, edge: EdgeId) -> bool {
        let e = network.edge_mut(edge);
        if e.in_backlog {
            return false;
        }
        e.in_backlog = true;
        self.entries.push_back(edge);
        true
    }

    /// Drop `edge` from the queue; returns whether it was queued
    pub fn remove(&mut self, network: &mut Network, edge: EdgeId) -> bool {
        if !network.edge(edge).in_backlog {
            return false;
        }
        network.edge_mut(edge).in_backlog = false;
        self.entries.retain(|&queued| queued != edge);
        true
    }

    /// Stable sort by current balance, ascending
    pub fn sort_by_balance(&mut self, network: &Network) {
        self.entries
            .make_contiguous()
            .sort_by_key(|&edge| network.edge(edge).balance);
    }

    /// Replace the queue order; every id must already be queued
    pub(crate) fn set_order(&mut self, order: Vec<EdgeId>) {
        self.entries = order.into();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EdgeId> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<EdgeId> {
        self.entries.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::network::Policy;

    fn network() -> Network {
        let mut network = Network::with_nodes(3);
        network.open_channel(0, 1, 300, 100, Policy::default(), Policy::default(), 0).unwrap();
        network.open_channel(1, 2, 200, 100, Policy::default(), Policy::default(), 0).unwrap();
        network
    }

    #[test]
    fn test_push_is_deduplicated() {
        let mut network = network();
        let mut backlog = Backlog::new();
        assert!(backlog.push(&mut network, 0));
        assert!(!backlog.push(&mut network, 0));
        assert_eq!(backlog.len(), 1);
        assert!(network.edge(0).in_backlog);
    }

    #[test]
    fn test_remove_clears_flag() {
        let mut network = network();
        let mut backlog = Backlog::new();
        backlog.push(&mut network, 2);
        assert!(backlog.remove(&mut network, 2));
        assert!(!backlog.remove(&mut network, 2));
        assert!(!network.edge(2).in_backlog);
        assert!(backlog.is_empty());
    }

    #[test]
    fn test_sort_is_stable_by_balance() {
        let mut network = network();
        let mut backlog = Backlog::new();
        for edge in 0..4 {
            backlog.push(&mut network, edge);
        }
        backlog.sort_by_balance(&network);
        // balances: e0=300, e1=100, e2=200, e3=100
        assert_eq!(backlog.to_vec(), vec![1, 3, 2, 0]);
    }
}
