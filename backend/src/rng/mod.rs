//! Deterministic random number generation
//!
//! Uses xorshift64* for fast, reproducible draws. Every stochastic decision in
//! the simulation (forwarding jitter, offline faults, member tolerances,
//! payment arrivals, topology) goes through this module.

mod xorshift;

pub use xorshift::RngManager;
