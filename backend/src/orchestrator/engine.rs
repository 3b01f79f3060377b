//! Simulation Engine
//!
//! Main event loop tying the ledger, the HTLC state machine and the group
//! lifecycle manager together.
//!
//! # Architecture
//!
//! ```text
//! Simulation::new
//! 1. Validate config and payments
//! 2. Group routing: enqueue every edge, run one construction pass at t = 0
//! 3. Precompute every payment's initial path (worker pool)
//! 4. Schedule FindPath at each payment's start time
//!
//! Simulation::step
//! 1. Pop the earliest event (clock advances to its time)
//! 2. Dispatch by kind to one handler
//! 3. Handler mutates the ledger and schedules follow-ups
//!
//! Queue drained
//! 1. Close every group still open ("simulation_end")
//! ```
//!
//! # Example
//!
//! ```rust
//! use pcn_simulator_core_rs::models::{Network, Payment, Policy};
//! use pcn_simulator_core_rs::orchestrator::{Simulation, SimulationConfig};
//! use pcn_simulator_core_rs::routing::DijkstraOracle;
//!
//! let mut network = Network::with_nodes(2);
//! network
//!     .open_channel(0, 1, 1_000_000, 1_000_000, Policy::default(), Policy::default(), 0)
//!     .unwrap();
//! let payments = vec![Payment::new(0, 0, 1, 10_000, 0, 1_000)];
//!
//! let config = SimulationConfig::default();
//! let oracle = DijkstraOracle::new(config.routing_method);
//! let mut simulation = Simulation::new(config, network, payments, oracle).unwrap();
//! let report = simulation.run().unwrap();
//! assert_eq!(report.succeeded, 1);
//! ```

use crate::core::context::SimContext;
use crate::events::{Event, EventKind};
use crate::groups::{GroupManager, REASON_SIMULATION_END};
use crate::models::network::{EdgeId, Network, NetworkError, NodeId};
use crate::models::payment::{Payment, PaymentId};
use crate::orchestrator::checkpoint::{compute_config_hash, NetworkSnapshot};
use crate::orchestrator::config::{Admission, SimulationConfig, Tolerance};
use crate::orchestrator::report::SimulationReport;
use crate::routing::{precompute_initial_paths, PathHop, PathOracle};
use crate::settlement::{
    channel_update_fail, channel_update_success, find_path, forward_fail, forward_payment,
    forward_success, receive_fail, receive_payment, receive_success, send_payment,
    PolicyViolation,
};
use crate::topology::open_random_channel;
use thiserror::Error;
use tracing::{debug, info, trace};

// ============================================================================
// Errors
// ============================================================================

/// Fatal simulation errors
///
/// Protocol failures (no balance, offline node, no path, timeout) are
/// recorded on the payment and never surface here.
#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("edge {edge} is not owned by node {node} (payment {payment})")]
    EdgeNotOwned {
        edge: EdgeId,
        node: NodeId,
        payment: PaymentId,
    },

    #[error("policy violation on edge {edge} (payment {payment}): {violation}")]
    PolicyViolation {
        edge: EdgeId,
        payment: PaymentId,
        violation: PolicyViolation,
    },

    #[error("{kind} event carries no payment")]
    MissingPayment { kind: &'static str },

    #[error("payment {0} not found")]
    PaymentNotFound(PaymentId),

    #[error("payment {0} has no route")]
    RouteMissing(PaymentId),

    #[error("payment {payment} has no hop at node {node}")]
    HopNotFound { payment: PaymentId, node: NodeId },

    #[error("payment {0} failed without an error record")]
    ErrorMissing(PaymentId),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("state validation failed: {0}")]
    StateValidationError(String),
}

type PaymentHandler = fn(
    &mut SimContext,
    &mut Network,
    &mut Payment,
    &SimulationConfig,
    &Event,
) -> Result<(), SimulationError>;

// ============================================================================
// Validation
// ============================================================================

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<(), SimulationError> {
    if condition {
        Ok(())
    } else {
        Err(SimulationError::InvalidConfig(message()))
    }
}

fn unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Reject parameter combinations the engine cannot run with
pub fn validate_config(config: &SimulationConfig) -> Result<(), SimulationError> {
    let htlc = &config.htlc;
    check(unit_interval(htlc.faulty_node_prob), || {
        format!("faulty_node_prob must be in [0, 1], got {}", htlc.faulty_node_prob)
    })?;

    let groups = &config.groups;
    check(groups.group_size > 0, || "group_size must be positive".to_string())?;
    check(
        groups.group_size_min >= 1 && groups.group_size_min <= groups.group_size,
        || {
            format!(
                "group_size_min must be in [1, {}], got {}",
                groups.group_size, groups.group_size_min
            )
        },
    )?;
    check(groups.max_leaves_per_group_tick >= 1, || {
        "max_leaves_per_group_tick must be at least 1".to_string()
    })?;

    match groups.admission {
        Admission::Symmetric { limit_rate } => check(unit_interval(limit_rate), || {
            format!("limit_rate must be in [0, 1], got {}", limit_rate)
        })?,
        Admission::Ratio {
            min_ratio,
            max_ratio,
        } => check(
            min_ratio.is_finite() && max_ratio.is_finite() && 0.0 <= min_ratio && min_ratio <= max_ratio,
            || format!("ratio bounds must satisfy 0 <= min <= max, got [{}, {}]", min_ratio, max_ratio),
        )?,
    }

    match groups.tolerance {
        Tolerance::Fixed { tau } => check(unit_interval(tau), || {
            format!("tolerance must be in [0, 1], got {}", tau)
        })?,
        Tolerance::Uniform { min, max } => check(
            unit_interval(min) && unit_interval(max) && min <= max,
            || format!("tolerance range must satisfy 0 <= min <= max <= 1, got [{}, {}]", min, max),
        )?,
    }

    Ok(())
}

fn validate_payments(network: &Network, payments: &[Payment]) -> Result<(), SimulationError> {
    let nodes = network.num_nodes();
    for (index, payment) in payments.iter().enumerate() {
        check(payment.id == index, || {
            format!("payment at position {} has id {}", index, payment.id)
        })?;
        check(payment.sender < nodes && payment.receiver < nodes, || {
            format!("payment {} references an unknown node", payment.id)
        })?;
        check(payment.sender != payment.receiver, || {
            format!("payment {} is sent to its own sender", payment.id)
        })?;
        check(payment.amount > 0, || format!("payment {} has zero amount", payment.id))?;
    }
    Ok(())
}

// ============================================================================
// Simulation
// ============================================================================

/// A single simulation run
///
/// Owns the ledger, the payments and the run context; the oracle is the only
/// external collaborator.
pub struct Simulation<O: PathOracle> {
    config: SimulationConfig,
    ctx: SimContext,
    network: Network,
    payments: Vec<Payment>,
    oracle: O,
    groups: GroupManager,
    initial_paths: Vec<Option<Vec<PathHop>>>,
    events_processed: u64,
    finished: bool,
}

impl<O: PathOracle> Simulation<O> {
    /// Set up a run
    ///
    /// # Errors
    /// `InvalidConfig` when the config or a payment is malformed.
    pub fn new(
        config: SimulationConfig,
        mut network: Network,
        payments: Vec<Payment>,
        oracle: O,
    ) -> Result<Self, SimulationError> {
        validate_config(&config)?;
        validate_payments(&network, &payments)?;

        let mut ctx = SimContext::new(config.rng_seed);
        let mut groups = GroupManager::new(config.groups.clone(), &config.htlc);

        if config.groups_enabled() {
            groups.enqueue_ungrouped(&mut network);
            let committed = groups.construct_groups(&mut ctx, &mut network);
            info!(groups = committed, queued = groups.backlog().len(), "initial groups constructed");
        }

        // Initial paths see the published group capacities
        let initial_paths = precompute_initial_paths(&oracle, &network, &payments);

        for payment in &payments {
            ctx.schedule_at(
                payment.start_time,
                EventKind::FindPath,
                payment.sender,
                Some(payment.id),
            );
        }

        info!(
            nodes = network.num_nodes(),
            channels = network.channels.len(),
            payments = payments.len(),
            method = ?config.routing_method,
            "simulation initialized"
        );

        Ok(Self {
            config,
            ctx,
            network,
            payments,
            oracle,
            groups,
            initial_paths,
            events_processed: 0,
            finished: false,
        })
    }

    /// Process events until the queue is empty, then close open groups
    pub fn run(&mut self) -> Result<SimulationReport, SimulationError> {
        while self.step()? {}
        info!(
            events = self.events_processed,
            end_time = self.ctx.now(),
            completed = self.completed_payments(),
            "simulation finished"
        );
        self.report()
    }

    /// Dispatch one event
    ///
    /// Returns `false` once the queue is empty; the first such call runs the
    /// end-of-simulation sweep.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        let Some(event) = self.ctx.next_event() else {
            self.finish();
            return Ok(false);
        };
        self.events_processed += 1;
        trace!(time = event.time, kind = event.kind.name(), node = event.node_id, payment = ?event.payment_id, "dispatch");
        self.dispatch(&event)?;
        Ok(true)
    }

    fn dispatch(&mut self, event: &Event) -> Result<(), SimulationError> {
        let now = self.ctx.now();
        match event.kind {
            EventKind::FindPath => {
                let id = payment_of(event)?;
                find_path(
                    &mut self.ctx,
                    &self.network,
                    &mut self.payments,
                    id,
                    &self.config,
                    &self.oracle,
                    &self.initial_paths,
                )
            }
            EventKind::SendPayment => self.with_payment(event, send_payment),
            EventKind::ForwardPayment => self.with_payment(event, forward_payment),
            EventKind::ReceivePayment => self.with_payment(event, receive_payment),
            EventKind::ForwardSuccess => self.with_payment(event, forward_success),
            EventKind::ReceiveSuccess => self.with_payment(event, receive_success),
            EventKind::ForwardFail => self.with_payment(event, forward_fail),
            EventKind::ReceiveFail => self.with_payment(event, receive_fail),
            EventKind::ChannelUpdateSuccess { attempt } => {
                let id = payment_of(event)?;
                let payment = self.payments.get(id).ok_or(SimulationError::PaymentNotFound(id))?;
                channel_update_success(&mut self.network, event.node_id, payment, attempt, now);
                Ok(())
            }
            EventKind::ChannelUpdateFail { attempt } => {
                let id = payment_of(event)?;
                let payment = self.payments.get(id).ok_or(SimulationError::PaymentNotFound(id))?;
                channel_update_fail(&mut self.network, event.node_id, payment, attempt, now);
                Ok(())
            }
            EventKind::UpdateGroup => {
                if !self.config.groups_enabled() {
                    return Ok(());
                }
                let route_edges: Vec<EdgeId> = self
                    .payment(event)?
                    .route
                    .as_ref()
                    .map(|route| route.edge_ids().collect())
                    .unwrap_or_default();
                self.groups.request_group_update(
                    &mut self.ctx,
                    &mut self.network,
                    &route_edges,
                    event.node_id,
                    event.payment_id,
                );
                Ok(())
            }
            EventKind::ConstructGroups => {
                if self.config.groups_enabled() {
                    let committed = self.groups.construct_groups(&mut self.ctx, &mut self.network);
                    debug!(time = now, committed, queued = self.groups.backlog().len(), "construction pass");
                }
                Ok(())
            }
            EventKind::OpenChannel => {
                let channel = open_random_channel(&mut self.network, self.ctx.rng(), now)?;
                if self.config.groups_enabled() {
                    let edges = [self.network.channel(channel).edge1, self.network.channel(channel).edge2];
                    for edge in edges {
                        self.groups.enqueue(&mut self.network, edge);
                    }
                }
                debug!(time = now, channel, "channel opened");
                Ok(())
            }
        }
    }

    fn with_payment(&mut self, event: &Event, handler: PaymentHandler) -> Result<(), SimulationError> {
        let id = payment_of(event)?;
        let payment = self
            .payments
            .get_mut(id)
            .ok_or(SimulationError::PaymentNotFound(id))?;
        handler(&mut self.ctx, &mut self.network, payment, &self.config, event)
    }

    fn payment(&self, event: &Event) -> Result<&Payment, SimulationError> {
        let id = payment_of(event)?;
        self.payments.get(id).ok_or(SimulationError::PaymentNotFound(id))
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let now = self.ctx.now();
        let closed = self
            .groups
            .close_open_groups(&mut self.network, REASON_SIMULATION_END, now);
        debug!(time = now, closed, "open groups closed");
    }

    /// Schedule a network-growth event
    pub fn schedule_open_channel(&mut self, time: u64, node: NodeId) {
        self.ctx.schedule_at(time, EventKind::OpenChannel, node, None);
    }

    /// Issued payments that have ended (success, failure or timeout)
    ///
    /// A split payment ends when both of its shards have.
    pub fn completed_payments(&self) -> usize {
        self.payments
            .iter()
            .filter(|payment| payment.parent.is_none())
            .filter(|payment| match payment.shards {
                Some(shards) => shards
                    .iter()
                    .all(|&shard| self.payments.get(shard).is_some_and(Payment::is_finished)),
                None => payment.is_finished(),
            })
            .count()
    }

    pub fn report(&self) -> Result<SimulationReport, SimulationError> {
        SimulationReport::build(
            &self.config,
            &self.network,
            &self.payments,
            self.events_processed,
            self.ctx.now(),
        )
    }

    /// Serializable picture of the current ledger
    pub fn snapshot(&self) -> Result<NetworkSnapshot, SimulationError> {
        Ok(NetworkSnapshot {
            time: self.ctx.now(),
            rng_state: self.ctx.rng_state(),
            pending_events: self.ctx.pending_events(),
            channels: self.network.channels.clone(),
            edges: self.network.edges.clone(),
            groups: self.network.groups.clone(),
            payments: self.payments.clone(),
            config_hash: compute_config_hash(&self.config)?,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn group_manager(&self) -> &GroupManager {
        &self.groups
    }

    pub fn now(&self) -> u64 {
        self.ctx.now()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

fn payment_of(event: &Event) -> Result<PaymentId, SimulationError> {
    event.payment_id.ok_or(SimulationError::MissingPayment {
        kind: event.kind.name(),
    })
}
