//! Snapshot and Config Hash Tests
//!
//! - Snapshots survive a JSON round trip and still validate
//! - Mid-run snapshots allow in-flight HTLCs, drained ones do not
//! - Config hash is stable and sensitive to every section

use pcn_simulator_core_rs::models::{Network, Payment, Policy};
use pcn_simulator_core_rs::orchestrator::{
    compute_config_hash, validate_snapshot, NetworkSnapshot, RoutingMethod, SimulationConfig,
};
use pcn_simulator_core_rs::routing::DijkstraOracle;
use pcn_simulator_core_rs::{Simulation, SimulationError};

// ============================================================================
// Test Helpers
// ============================================================================

fn line_simulation() -> Simulation<DijkstraOracle> {
    let mut network = Network::with_nodes(3);
    network.open_channel(0, 1, 5_000, 5_000, Policy::default(), Policy::default(), 0).unwrap();
    network.open_channel(1, 2, 5_000, 5_000, Policy::default(), Policy::default(), 0).unwrap();
    let payments = vec![
        Payment::new(0, 0, 2, 1_000, 0, 100),
        Payment::new(1, 2, 0, 2_000, 50, 100),
    ];

    let config = SimulationConfig {
        routing_method: RoutingMethod::Ideal,
        ..SimulationConfig::default()
    };
    let oracle = DijkstraOracle::new(config.routing_method);
    Simulation::new(config, network, payments, oracle).unwrap()
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn test_mid_run_snapshot_roundtrip() {
    let mut simulation = line_simulation();
    // FindPath and SendPayment of the first payment: one HTLC in flight
    simulation.step().unwrap();
    simulation.step().unwrap();

    let snapshot = simulation.snapshot().unwrap();
    assert!(snapshot.pending_events > 0);
    assert_eq!(snapshot.edges[0].balance, 4_000);
    validate_snapshot(&snapshot).unwrap();

    let json = snapshot.to_json().unwrap();
    let restored = NetworkSnapshot::from_json(&json).unwrap();
    assert_eq!(restored.time, snapshot.time);
    assert_eq!(restored.rng_state, snapshot.rng_state);
    assert_eq!(restored.config_hash, snapshot.config_hash);
    assert_eq!(restored.payments.len(), 2);
    validate_snapshot(&restored).unwrap();

    // The same picture with an empty queue is a leak
    let mut drained = restored;
    drained.pending_events = 0;
    assert!(matches!(
        validate_snapshot(&drained),
        Err(SimulationError::StateValidationError(_))
    ));
}

#[test]
fn test_final_snapshot_conserves_every_channel() {
    let mut simulation = line_simulation();
    let report = simulation.run().unwrap();
    assert_eq!(report.succeeded, 2);

    let snapshot = simulation.snapshot().unwrap();
    assert_eq!(snapshot.pending_events, 0);
    assert_eq!(snapshot.time, report.end_time);
    validate_snapshot(&snapshot).unwrap();
}

#[test]
fn test_malformed_snapshot_json_is_serialization_error() {
    assert!(matches!(
        NetworkSnapshot::from_json("{\"time\": 1"),
        Err(SimulationError::SerializationError(_))
    ));
}

// ============================================================================
// Config Hash
// ============================================================================

#[test]
fn test_config_hash_stable_and_sensitive() {
    let base = SimulationConfig::default();
    let hash = compute_config_hash(&base).unwrap();
    assert_eq!(hash.len(), 64);
    assert_eq!(hash, compute_config_hash(&base.clone()).unwrap());

    let mut seed = base.clone();
    seed.rng_seed += 1;
    let mut htlc = base.clone();
    htlc.htlc.offline_latency += 1;
    let mut groups = base.clone();
    groups.groups.group_size_min -= 1;
    let mut workload = base.clone();
    workload.payments.n_payments += 1;

    for changed in [seed, htlc, groups, workload] {
        assert_ne!(compute_config_hash(&changed).unwrap(), hash);
    }
}

#[test]
fn test_config_hash_ignores_json_field_order() {
    let a: SimulationConfig =
        serde_json::from_str(r#"{"rng_seed": 3, "routing_method": "ideal"}"#).unwrap();
    let b: SimulationConfig =
        serde_json::from_str(r#"{"routing_method": "ideal", "rng_seed": 3}"#).unwrap();
    assert_eq!(compute_config_hash(&a).unwrap(), compute_config_hash(&b).unwrap());
}
