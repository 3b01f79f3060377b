//! Event queue with deterministic ordering.
//!
//! Events are ordered by:
//! 1. Time (earlier first)
//! 2. Sequence number (insertion order, FIFO for equal times)
//!
//! Equal-time ordering is observable (it decides which of two payments takes a
//! balance first), so it is pinned to insertion order rather than left to the
//! heap layout.

use crate::events::types::Event;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Key for ordering events in the queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    /// When this event should be processed.
    pub time: u64,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Time-ordered event scheduler
///
/// `schedule` and `next` are both O(log n).
///
/// # Example
/// ```
/// use pcn_simulator_core_rs::events::{Event, EventKind, EventQueue};
///
/// let mut queue = EventQueue::new();
/// queue.schedule(Event::new(5, EventKind::FindPath, 0, Some(0)));
/// queue.schedule(Event::new(3, EventKind::FindPath, 0, Some(1)));
///
/// assert_eq!(queue.next().unwrap().time, 3);
/// assert_eq!(queue.next().unwrap().time, 5);
/// assert!(queue.next().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: BTreeMap<EventKey, Event>,
    sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            sequence: 0,
        }
    }

    /// Insert an event
    pub fn schedule(&mut self, event: Event) {
        let key = EventKey {
            time: event.time,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.events.insert(key, event);
    }

    /// Remove and return the earliest event
    pub fn next(&mut self) -> Option<Event> {
        self.events.pop_first().map(|(_, event)| event)
    }

    /// Time of the earliest pending event
    pub fn peek_time(&self) -> Option<u64> {
        self.events.keys().next().map(|key| key.time)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
