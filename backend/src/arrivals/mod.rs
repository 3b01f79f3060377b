//! Payment generation
//!
//! Deterministic workload for a run: payments arrive as a Poisson process
//! (exponential inter-arrival times), each between two distinct uniformly
//! chosen nodes, with amount and fee limit drawn from configured
//! distributions.
//!
//! # Key Principles
//!
//! 1. **Determinism**: Same seed + same config → same payments
//! 2. **Positive amounts**: every sampled amount is at least 1 msat
//!
//! # Example
//!
//! ```
//! use pcn_simulator_core_rs::arrivals::{generate_payments, AmountDistribution, PaymentConfig};
//! use pcn_simulator_core_rs::rng::RngManager;
//!
//! let config = PaymentConfig {
//!     n_payments: 10,
//!     payment_rate: 5.0,
//!     amount: AmountDistribution::Uniform { min: 1_000, max: 50_000 },
//!     max_fee_limit: AmountDistribution::Normal { mean: 5_000_000.0, std_dev: 0.0 },
//! };
//! let mut rng = RngManager::new(42);
//! let payments = generate_payments(&config, 20, &mut rng).unwrap();
//! assert_eq!(payments.len(), 10);
//! assert!(payments.iter().all(|p| p.sender != p.receiver));
//! ```

use crate::models::network::NodeId;
use crate::models::payment::Payment;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ArrivalError {
    #[error("payments need at least two nodes, have {0}")]
    NotEnoughNodes(usize),

    #[error("payment rate must be positive, got {0}")]
    InvalidRate(f64),
}

/// Amount distribution (msat)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum AmountDistribution {
    /// `|mean + std_dev * N(0,1)|`
    Normal { mean: f64, std_dev: f64 },

    /// Uniform between min and max (inclusive)
    Uniform { min: u64, max: u64 },
}

impl AmountDistribution {
    /// Draw one amount, never below 1
    pub fn sample(&self, rng: &mut RngManager) -> u64 {
        let amount = match *self {
            AmountDistribution::Normal { mean, std_dev } => {
                (mean + std_dev * rng.gaussian()).abs() as u64
            }
            AmountDistribution::Uniform { min, max } if min >= max => min,
            AmountDistribution::Uniform { min, max } => match (max - min).checked_add(1) {
                Some(span) => min + rng.next() % span,
                None => rng.next(),
            },
        };
        amount.max(1)
    }
}

/// Payment workload of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub n_payments: usize,

    /// Mean payments per second
    pub payment_rate: f64,

    pub amount: AmountDistribution,

    pub max_fee_limit: AmountDistribution,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            n_payments: 1_000,
            payment_rate: 10.0,
            amount: AmountDistribution::Normal {
                mean: 100_000.0,
                std_dev: 10_000.0,
            },
            max_fee_limit: AmountDistribution::Normal {
                mean: 5_000_000.0,
                std_dev: 0.0,
            },
        }
    }
}

/// Generate `config.n_payments` payments among `n_nodes` nodes
///
/// Ids are assigned in arrival order starting from 0. The first payment
/// arrives one inter-arrival time after 0.
pub fn generate_payments(
    config: &PaymentConfig,
    n_nodes: usize,
    rng: &mut RngManager,
) -> Result<Vec<Payment>, ArrivalError> {
    if n_nodes < 2 {
        return Err(ArrivalError::NotEnoughNodes(n_nodes));
    }
    if config.payment_rate.is_nan() || config.payment_rate <= 0.0 {
        return Err(ArrivalError::InvalidRate(config.payment_rate));
    }

    let mean_interval_ms = 1_000.0 / config.payment_rate;
    let mut time = 0u64;
    let mut payments = Vec::with_capacity(config.n_payments);

    for id in 0..config.n_payments {
        time += rng.exponential(mean_interval_ms) as u64;
        let (sender, receiver) = pick_endpoints(n_nodes, rng);
        let amount = config.amount.sample(rng);
        let fee_limit = config.max_fee_limit.sample(rng);
        payments.push(Payment::new(id, sender, receiver, amount, time, fee_limit));
    }

    Ok(payments)
}

fn pick_endpoints(n_nodes: usize, rng: &mut RngManager) -> (NodeId, NodeId) {
    let sender = rng.index(n_nodes);
    let mut receiver = rng.index(n_nodes);
    while receiver == sender {
        receiver = rng.index(n_nodes);
    }
    (sender, receiver)
}
