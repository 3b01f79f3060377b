//! Payments, routes and attempt history
//!
//! A payment owns its current route and an append-only history of attempts.
//! Multi-path payments are modelled as a parent payment that never travels
//! itself plus two shard payments that do.

use crate::models::network::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};

pub type PaymentId = usize;

/// One hop of a frozen route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHop {
    pub edge_id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    /// Amount this hop's edge forwards, downstream fees included
    pub amount_to_forward: u64,
    pub timelock: u32,
    pub lock_start: u64,
    pub lock_end: u64,
}

/// Route computed for a single attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub hops: Vec<RouteHop>,
    /// Amount leaving the sender (payment amount plus all fees)
    pub total_amount: u64,
    pub total_fee: u64,
    pub total_timelock: u32,
}

impl Route {
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Index of the hop whose edge leaves `node`
    pub fn hop_from(&self, node: NodeId) -> Option<usize> {
        self.hops.iter().position(|hop| hop.from == node)
    }

    /// Index of the hop whose edge enters `node`
    pub fn hop_to(&self, node: NodeId) -> Option<usize> {
        self.hops.iter().position(|hop| hop.to == node)
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.hops.iter().map(|hop| hop.edge_id)
    }
}

/// Protocol-level failure of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorKind {
    NoBalance,
    OfflineNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentError {
    pub kind: PaymentErrorKind,
    /// Index into the current route
    pub hop: usize,
}

/// State of one route edge when an attempt finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub edge_id: EdgeId,
    pub balance: u64,
    pub group_cap: Option<u64>,
    pub channel_update: Option<u64>,
    pub sent_amount: u64,
}

/// Record of a finished attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Attempt number (1-based)
    pub attempt: u32,
    pub is_succeeded: bool,
    pub end_time: u64,
    pub error_edge: Option<EdgeId>,
    pub error_kind: Option<PaymentErrorKind>,
    pub route: Vec<EdgeSnapshot>,
    /// Frozen route, kept so channel-update broadcasts read the attempt they
    /// report on even after a retry replaced the live route
    pub hops: Vec<RouteHop>,
}

impl Attempt {
    /// The hop the attempt failed at
    pub fn error_hop(&self) -> Option<&RouteHop> {
        let edge = self.error_edge?;
        self.hops.iter().find(|hop| hop.edge_id == edge)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub sender: NodeId,
    pub receiver: NodeId,
    pub amount: u64,
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub max_fee_limit: u64,

    pub is_success: bool,
    pub is_timeout: bool,
    pub attempts: u32,
    pub no_balance_count: u32,
    pub offline_node_count: u32,

    /// Set on both shards and on a split parent
    pub is_shard: bool,
    /// Shards this payment was split into
    pub shards: Option<[PaymentId; 2]>,
    pub parent: Option<PaymentId>,

    pub route: Option<Route>,
    pub error: Option<PaymentError>,
    pub history: Vec<Attempt>,
}

impl Payment {
    pub fn new(
        id: PaymentId,
        sender: NodeId,
        receiver: NodeId,
        amount: u64,
        start_time: u64,
        max_fee_limit: u64,
    ) -> Self {
        Self {
            id,
            sender,
            receiver,
            amount,
            start_time,
            end_time: None,
            max_fee_limit,
            is_success: false,
            is_timeout: false,
            attempts: 0,
            no_balance_count: 0,
            offline_node_count: 0,
            is_shard: false,
            shards: None,
            parent: None,
            route: None,
            error: None,
            history: Vec::new(),
        }
    }

    /// Create a shard of `self` carrying `amount`
    ///
    /// Shards start at attempt 1: they were routed as part of the parent's
    /// first attempt.
    pub fn shard(&self, id: PaymentId, amount: u64) -> Self {
        let mut shard = Self::new(
            id,
            self.sender,
            self.receiver,
            amount,
            self.start_time,
            self.max_fee_limit / 2,
        );
        shard.attempts = 1;
        shard.is_shard = true;
        shard.parent = Some(self.id);
        shard
    }

    /// A payment is finished once it has an end time
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Total fee paid on the current route
    pub fn fee_paid(&self) -> u64 {
        self.route.as_ref().map(|route| route.total_fee).unwrap_or(0)
    }
}
