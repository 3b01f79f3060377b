//! Group Lifecycle Tests
//!
//! Construction, capacity refresh, leave policy and close semantics:
//! - Construction never pairs edges that share a node
//! - A refresh publishes the new minimum and logs only on change
//! - Departures below the minimum size close the group and requeue members
//! - At most the configured number of members leave per update; members in
//!   their post-leave cooldown stay
//! - Close happens once; structural damage closes immediately
//! - A construction pass terminates even when no group can fill

use pcn_simulator_core_rs::events::EventKind;
use pcn_simulator_core_rs::groups::GroupManager;
use pcn_simulator_core_rs::models::{GroupEvent, Network, Payment, Policy};
use pcn_simulator_core_rs::orchestrator::{
    Admission, GroupConfig, HtlcConfig, RoutingMethod, SimulationConfig, Tolerance,
};
use pcn_simulator_core_rs::routing::DijkstraOracle;
use pcn_simulator_core_rs::{SimContext, Simulation};

// ============================================================================
// Test Helpers
// ============================================================================

fn pairs_config() -> GroupConfig {
    GroupConfig {
        group_size: 2,
        group_size_min: 2,
        admission: Admission::Symmetric { limit_rate: 0.1 },
        ..GroupConfig::default()
    }
}

/// Four disjoint channels (0-1), (2-3), (4-5), (6-7), 1000 on each side
fn disjoint_channels() -> Network {
    let mut network = Network::with_nodes(8);
    for node in (0..8).step_by(2) {
        network
            .open_channel(node, node + 1, 1_000, 1_000, Policy::default(), Policy::default(), 0)
            .unwrap();
    }
    network
}

/// Manager with its initial construction pass already run
fn constructed(network: &mut Network, ctx: &mut SimContext) -> GroupManager {
    let mut manager = GroupManager::new(pairs_config(), &HtlcConfig::default());
    manager.enqueue_ungrouped(network);
    let committed = manager.construct_groups(ctx, network);
    assert_eq!(committed, 4);
    manager
}

fn reasons(manager: &GroupManager, event_type: &str) -> Vec<String> {
    manager
        .log()
        .events_of_type(event_type)
        .into_iter()
        .filter_map(|event| match event {
            GroupEvent::Leave { reason, .. }
            | GroupEvent::UpdateGroup { reason, .. }
            | GroupEvent::Close { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_construction_pairs_disjoint_edges() {
    let mut network = disjoint_channels();
    let mut ctx = SimContext::new(1);
    let manager = constructed(&mut network, &mut ctx);

    let members: Vec<Vec<usize>> = network.groups.iter().map(|g| g.edges.clone()).collect();
    assert_eq!(members, vec![vec![0, 2], vec![1, 3], vec![4, 6], vec![5, 7]]);

    for (id, group) in network.groups.iter().enumerate() {
        assert_eq!(group.id, Some(id));
        assert_eq!(group.group_cap, 1_000);
        for &edge in &group.edges {
            assert_eq!(network.edge(edge).group, Some(id));
            assert!(!network.edge(edge).in_backlog);
        }
    }

    assert!(manager.backlog().is_empty());
    assert_eq!(manager.log().events_of_type("construct_commit").len(), 4);
    assert_eq!(manager.log().events_of_type("join").len(), 8);
    assert_eq!(manager.attempts(), 4);
}

#[test]
fn test_construction_terminates_when_no_group_fills() {
    let mut network = Network::with_nodes(4);
    network.open_channel(0, 1, 500, 500, Policy::default(), Policy::default(), 0).unwrap();
    network.open_channel(2, 3, 500, 500, Policy::default(), Policy::default(), 0).unwrap();

    let config = GroupConfig {
        group_size: 5,
        group_size_min: 5,
        ..GroupConfig::default()
    };
    let mut manager = GroupManager::new(config, &HtlcConfig::default());
    let mut ctx = SimContext::new(1);
    manager.enqueue_ungrouped(&mut network);

    assert_eq!(manager.construct_groups(&mut ctx, &mut network), 0);
    assert_eq!(manager.log().events_of_type("construct_begin").len(), 4);
    assert_eq!(manager.log().events_of_type("construct_abort").len(), 4);
    assert_eq!(manager.backlog().len(), 4);
    assert!(network.groups.is_empty());

    // Requeueing is deduplicated
    assert!(!manager.enqueue(&mut network, 0));
    assert_eq!(manager.backlog().len(), 4);
}

// ============================================================================
// Refresh and Leave Policy
// ============================================================================

#[test]
fn test_refresh_then_departure_closes_group() {
    let mut network = disjoint_channels();
    let mut ctx = SimContext::new(1);
    let mut manager = constructed(&mut network, &mut ctx);

    network.edge_mut(0).balance = 800;
    manager.request_group_update(&mut ctx, &mut network, &[0], 0, None);

    assert_eq!(reasons(&manager, "update_group"), vec!["update;rv=1;lo=1;hi=0"]);
    let update = manager.log().events_of_type("update_group")[0].clone();
    assert_eq!(
        update,
        GroupEvent::UpdateGroup {
            time: 0,
            group_id: 0,
            reason: "update;rv=1;lo=1;hi=0".to_string(),
            size: 2,
            group_cap: 800,
            min: 800,
            max: 1_000,
        }
    );

    // Edge 2 hides 20% of its balance behind the new minimum
    assert_eq!(reasons(&manager, "leave"), vec!["UL=0.200000;used=0"]);
    assert_eq!(
        manager.log().events_of_type("close")[0],
        &GroupEvent::Close {
            time: 0,
            group_id: 0,
            reason: "below_min_size".to_string(),
            members: "0".to_string(),
        }
    );

    // Group 1 (reached through the counter-edge) was unchanged
    assert!(manager.log().events_for_group(1).iter().all(|e| e.event_type() == "construct_commit" || e.event_type() == "join"));
    assert!(network.groups[1].is_open());

    assert_eq!(network.edge(0).group, None);
    assert_eq!(network.edge(2).group, None);
    assert_eq!(network.edge(2).last_leave_time, Some(0));
    assert_eq!(manager.backlog().len(), 2);

    // Rebuild request follows the broadcast delay
    assert_eq!(ctx.pending_events(), 1);
    let rebuild = ctx.next_event().unwrap();
    assert_eq!(rebuild.kind, EventKind::ConstructGroups);

    // 800 and 1000 are outside each other's 10% window
    assert_eq!(manager.construct_groups(&mut ctx, &mut network), 0);
    assert_eq!(manager.log().events_of_type("construct_abort").len(), 2);
}

#[test]
fn test_unchanged_refresh_logs_nothing() {
    let mut network = disjoint_channels();
    let mut ctx = SimContext::new(1);
    let mut manager = constructed(&mut network, &mut ctx);
    let logged = manager.log().len();

    assert!(!manager.update_group(&mut network, 2, 50));
    assert_eq!(manager.log().len(), logged);
    assert_eq!(network.groups[2].history.len(), 2, "commit plus refresh snapshot");
}

/// Three disjoint channels grouped in threes: group 0 = [0, 2, 4]
fn triple_groups(network: &mut Network, ctx: &mut SimContext) -> GroupManager {
    let config = GroupConfig {
        group_size: 3,
        group_size_min: 2,
        max_leaves_per_group_tick: 1,
        ..pairs_config()
    };
    let mut manager = GroupManager::new(config, &HtlcConfig::default());
    manager.enqueue_ungrouped(network);
    assert_eq!(manager.construct_groups(ctx, network), 2);
    assert_eq!(network.groups[0].edges, vec![0, 2, 4]);
    manager
}

fn three_channels() -> Network {
    let mut network = Network::with_nodes(6);
    for node in (0..6).step_by(2) {
        network
            .open_channel(node, node + 1, 1_000, 1_000, Policy::default(), Policy::default(), 0)
            .unwrap();
    }
    network
}

#[test]
fn test_leaves_capped_per_update() {
    let mut network = three_channels();
    let mut ctx = SimContext::new(1);
    let mut manager = triple_groups(&mut network, &mut ctx);

    // Edges 2 and 4 both lose 40% behind the new minimum
    network.edge_mut(0).balance = 600;
    manager.request_group_update(&mut ctx, &mut network, &[0], 0, None);

    assert_eq!(reasons(&manager, "leave"), vec!["UL=0.400000;used=0"]);
    let group = &network.groups[0];
    assert!(group.is_open());
    assert_eq!(group.edges, vec![0, 4]);
    assert_eq!(group.group_cap, 600);
    assert_eq!(network.edge(2).group, None);
    assert_eq!(network.edge(4).group, Some(0));

    // The next update takes the second candidate and dissolves the group
    manager.request_group_update(&mut ctx, &mut network, &[0], 0, None);
    assert_eq!(reasons(&manager, "leave").len(), 2);
    assert_eq!(reasons(&manager, "close"), vec!["below_min_size"]);
    assert!(!network.groups[0].is_open());
}

#[test]
fn test_member_in_cooldown_does_not_leave() {
    let mut network = three_channels();
    let mut ctx = SimContext::new(1);
    let mut manager = triple_groups(&mut network, &mut ctx);

    // Edge 2 left another group at t=0; the cooldown is 5 × 100 ms
    network.edge_mut(2).last_leave_time = Some(0);
    network.edge_mut(0).balance = 600;
    manager.request_group_update(&mut ctx, &mut network, &[0], 0, None);

    let leaves: Vec<usize> = manager
        .log()
        .events_of_type("leave")
        .into_iter()
        .filter_map(|event| match event {
            GroupEvent::Leave { edge_id, .. } => Some(*edge_id),
            _ => None,
        })
        .collect();
    assert_eq!(leaves, vec![4]);
    assert_eq!(network.groups[0].edges, vec![0, 2]);
    assert_eq!(network.edge(2).group, Some(0));
}

// ============================================================================
// Close Semantics
// ============================================================================

#[test]
fn test_close_is_idempotent() {
    let mut network = disjoint_channels();
    let mut ctx = SimContext::new(1);
    let mut manager = constructed(&mut network, &mut ctx);

    assert!(manager.close_group(&mut network, 3, "first", 10));
    assert!(!manager.close_group(&mut network, 3, "second", 20));

    assert_eq!(network.groups[3].is_closed, Some(10));
    assert_eq!(reasons(&manager, "close"), vec!["first"]);
    assert_eq!(manager.close_open_groups(&mut network, "simulation_end", 30), 3);
    assert_eq!(manager.close_open_groups(&mut network, "simulation_end", 40), 0);
}

#[test]
fn test_structural_violation_closes_and_rebuilds_now() {
    let mut network = disjoint_channels();
    let mut ctx = SimContext::new(1);
    let mut manager = constructed(&mut network, &mut ctx);

    // Corrupt group 2 with a repeated member
    network.groups[2].edges.push(4);
    manager.request_group_update(&mut ctx, &mut network, &[4], 4, None);

    assert_eq!(reasons(&manager, "close"), vec!["update_violation"]);
    assert!(!network.groups[2].is_open());
    assert_eq!(network.edge(4).group, None);
    assert_eq!(network.edge(6).group, None);
    assert!(network.edge(4).in_backlog);

    let rebuild = ctx.next_event().unwrap();
    assert_eq!(rebuild.kind, EventKind::ConstructGroups);
    assert_eq!(rebuild.time, 0);
}

#[test]
fn test_release_skips_edges_of_other_groups() {
    let mut network = disjoint_channels();
    let mut ctx = SimContext::new(1);
    let mut manager = constructed(&mut network, &mut ctx);

    // Group 0 lists edge 5 of group 3 and repeats edge 0
    network.groups[0].edges.extend([5, 0]);
    manager.request_group_update(&mut ctx, &mut network, &[0], 0, None);

    assert_eq!(reasons(&manager, "close"), vec!["update_violation"]);
    assert_eq!(network.edge(0).group, None);
    assert_eq!(network.edge(2).group, None);
    assert_eq!(manager.backlog().len(), 2);

    assert_eq!(network.edge(5).group, Some(3));
    assert!(!network.edge(5).in_backlog);
    assert!(network.groups[3].is_open());
}

// ============================================================================
// Through the Engine
// ============================================================================

#[test]
fn test_settled_payment_triggers_group_update() {
    let config = SimulationConfig {
        routing_method: RoutingMethod::GroupRouting,
        groups: pairs_config(),
        ..SimulationConfig::default()
    };
    let oracle = DijkstraOracle::new(config.routing_method);
    let payments = vec![Payment::new(0, 0, 1, 200, 0, 0)];
    let mut simulation = Simulation::new(config, disjoint_channels(), payments, oracle).unwrap();
    assert_eq!(simulation.network().groups.len(), 4);

    let report = simulation.run().unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.groups_committed, 4);

    let manager = simulation.group_manager();
    let network = simulation.network();

    // Leaving resets the per-membership counters
    assert_eq!(network.edge(0).tot_flows, 1);
    assert_eq!(network.edge(0).min_cap_use_count, 0);
    assert_eq!(network.edge(0).last_leave_time, Some(200));

    // Both directions of the channel dissolved their groups
    assert_eq!(
        reasons(manager, "leave"),
        vec!["UL=0.200000;used=0", "UL=0.166667;used=0"]
    );
    assert_eq!(
        reasons(manager, "close"),
        vec!["below_min_size", "below_min_size", "simulation_end", "simulation_end"]
    );
    assert_eq!(reasons(manager, "update_group"), vec!["update;rv=1;lo=1;hi=0", "update;rv=1;lo=0;hi=1"]);

    // Every group ends closed; nothing was rebuilt
    assert!(network.groups.iter().all(|g| g.is_closed.is_some()));
    assert_eq!(manager.log().events_of_type("construct_commit").len(), 4);
}

#[test]
fn test_report_counts_forwards_on_group_minimum() {
    // A wide tolerance keeps every member in place after the payment
    let config = SimulationConfig {
        routing_method: RoutingMethod::GroupRouting,
        groups: GroupConfig {
            tolerance: Tolerance::Fixed { tau: 0.5 },
            ..pairs_config()
        },
        ..SimulationConfig::default()
    };
    let oracle = DijkstraOracle::new(config.routing_method);
    let payments = vec![Payment::new(0, 0, 1, 200, 0, 0)];
    let mut simulation = Simulation::new(config, disjoint_channels(), payments, oracle).unwrap();

    let report = simulation.run().unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(simulation.group_manager().log().events_of_type("leave").is_empty());

    let edge = &report.edges[0];
    assert_eq!(edge.balance, 800);
    assert_eq!(edge.tot_flows, 1);
    assert_eq!(edge.min_cap_use_count, 1);
    assert_eq!(edge.group, Some(0));
    assert_eq!(edge.locked_balances.len(), 1);
    assert_eq!(report.edges[1].min_cap_use_count, 0);

    let history = &report.payments[0].history;
    assert_eq!(history.len(), 1);
    assert!(history[0].is_succeeded);
    assert_eq!(history[0].route[0].edge_id, 0);
}
