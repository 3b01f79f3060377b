//! Event Scheduler Tests
//!
//! Dispatch order and clock advancement:
//! - Earliest event first
//! - Equal times dispatch in scheduling order
//! - The clock follows the dispatched event and never regresses

use pcn_simulator_core_rs::events::{Event, EventKind, EventQueue};
use pcn_simulator_core_rs::SimContext;

// ============================================================================
// Test Helpers
// ============================================================================

/// Event at `time` tagged by `node` so dispatch order is observable
fn tagged(time: u64, node: usize) -> Event {
    Event::new(time, EventKind::FindPath, node, Some(node))
}

// ============================================================================
// Queue Ordering
// ============================================================================

#[test]
fn test_dispatch_order_5_3_3_7() {
    let mut ctx = SimContext::new(1);
    for (node, time) in [5, 3, 3, 7].into_iter().enumerate() {
        ctx.schedule(tagged(time, node));
    }

    let mut dispatched = Vec::new();
    while let Some(event) = ctx.next_event() {
        assert_eq!(ctx.now(), event.time, "clock must equal the dispatched time");
        dispatched.push((event.time, event.node_id));
    }

    assert_eq!(dispatched, vec![(3, 1), (3, 2), (5, 0), (7, 3)]);
}

#[test]
fn test_clock_never_regresses() {
    let mut ctx = SimContext::new(1);
    for (node, time) in [40, 10, 30, 10, 20, 0, 40].into_iter().enumerate() {
        ctx.schedule(tagged(time, node));
    }

    let mut last = 0;
    while let Some(event) = ctx.next_event() {
        assert!(event.time >= last);
        assert_eq!(ctx.now(), event.time);
        last = event.time;
    }
    assert_eq!(ctx.now(), 40);
    assert_eq!(ctx.pending_events(), 0);
}

#[test]
fn test_events_scheduled_during_dispatch_at_current_time_run_after_queued_peers() {
    let mut ctx = SimContext::new(1);
    ctx.schedule(tagged(10, 0));
    ctx.schedule(tagged(10, 1));

    let first = ctx.next_event().unwrap();
    assert_eq!(first.node_id, 0);

    // A handler scheduling "now" lands behind events already queued for now
    ctx.schedule_at(ctx.now(), EventKind::SendPayment, 9, Some(9));

    let order: Vec<usize> = std::iter::from_fn(|| ctx.next_event()).map(|e| e.node_id).collect();
    assert_eq!(order, vec![1, 9]);
}

#[test]
fn test_bare_queue_peek_and_len() {
    let mut queue = EventQueue::new();
    assert!(queue.is_empty());
    assert_eq!(queue.peek_time(), None);

    queue.schedule(tagged(8, 0));
    queue.schedule(tagged(2, 1));
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.peek_time(), Some(2));

    assert_eq!(queue.next().map(|e| e.node_id), Some(1));
    assert_eq!(queue.next().map(|e| e.node_id), Some(0));
    assert!(queue.next().is_none());
}

#[test]
fn test_network_events_carry_no_payment() {
    let event = Event::new(0, EventKind::ConstructGroups, 0, None);
    assert!(event.payment_id.is_none());
    assert!(!event.kind.is_payment_transition());
    assert_eq!(event.kind.name(), "construct_groups");
}
