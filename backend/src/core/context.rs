//! Per-run simulation context
//!
//! Owns the three pieces of mutable run-global state: the clock, the event
//! queue and the RNG. It is created when a simulation starts, threaded through
//! every handler, and dropped with the simulation.

use crate::core::time::SimClock;
use crate::events::{Event, EventKind, EventQueue};
use crate::models::network::NodeId;
use crate::models::payment::PaymentId;
use crate::rng::RngManager;

#[derive(Debug, Clone)]
pub struct SimContext {
    clock: SimClock,
    queue: EventQueue,
    rng: RngManager,
}

impl SimContext {
    pub fn new(rng_seed: u64) -> Self {
        Self {
            clock: SimClock::new(),
            queue: EventQueue::new(),
            rng: RngManager::new(rng_seed),
        }
    }

    /// Current simulation time (ms)
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn rng(&mut self) -> &mut RngManager {
        &mut self.rng
    }

    pub fn rng_state(&self) -> u64 {
        self.rng.get_state()
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Enqueue an event
    pub fn schedule(&mut self, event: Event) {
        self.queue.schedule(event);
    }

    /// Shorthand for scheduling `kind` at `time` for `node_id`
    pub fn schedule_at(
        &mut self,
        time: u64,
        kind: EventKind,
        node_id: NodeId,
        payment_id: Option<PaymentId>,
    ) {
        self.queue.schedule(Event::new(time, kind, node_id, payment_id));
    }

    /// Pop the earliest event and advance the clock to its time
    pub fn next_event(&mut self) -> Option<Event> {
        let event = self.queue.next()?;
        self.clock.advance_to(event.time);
        Some(event)
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }
}
