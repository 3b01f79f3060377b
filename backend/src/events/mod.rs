//! Discrete events and the time-ordered scheduler
//!
//! - `types`: the closed set of event kinds and the immutable `Event` record
//! - `queue`: the priority queue that defines dispatch order

pub mod queue;
pub mod types;

pub use queue::EventQueue;
pub use types::{Event, EventKind};
