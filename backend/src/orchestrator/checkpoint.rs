//! Checkpoint - Simulation State Snapshots
//!
//! A serializable picture of the ledger, the groups and the payments at one
//! instant, used to inspect a run and to check its invariants.
//!
//! # Critical Invariants
//!
//! - **Balance Conservation**: the two directions of a channel never hold more
//!   than its capacity, and hold exactly its capacity once the queue is empty
//! - **Group Structure**: no open group repeats a member or has two members
//!   sharing a node
//! - **Membership Consistency**: every member of an open group points at it,
//!   and an edge only points at a group that lists it
//! - **Config Matching**: the config hash identifies the run

use crate::models::group::Group;
use crate::models::network::{Channel, Edge};
use crate::models::payment::Payment;
use crate::orchestrator::SimulationError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete ledger state at one simulation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    /// Simulation time (ms)
    pub time: u64,

    /// RNG state at time of snapshot
    pub rng_state: u64,

    /// Events still queued
    pub pending_events: usize,

    pub channels: Vec<Channel>,
    pub edges: Vec<Edge>,
    pub groups: Vec<Group>,
    pub payments: Vec<Payment>,

    /// SHA256 hash of the run's config
    pub config_hash: String,
}

impl NetworkSnapshot {
    pub fn to_json(&self) -> Result<String, SimulationError> {
        serde_json::to_string(self).map_err(|e| {
            SimulationError::SerializationError(format!("Snapshot serialization failed: {}", e))
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(json).map_err(|e| {
            SimulationError::SerializationError(format!("Snapshot deserialization failed: {}", e))
        })
    }
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of config
///
/// Uses canonical JSON serialization with sorted keys so the hash does not
/// depend on field order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation Functions
// ============================================================================

fn invalid(message: String) -> SimulationError {
    SimulationError::StateValidationError(message)
}

/// Validate snapshot integrity
///
/// Checks channel balance conservation, group structure and membership
/// consistency.
pub fn validate_snapshot(snapshot: &NetworkSnapshot) -> Result<(), SimulationError> {
    let edge = |id: usize| {
        snapshot
            .edges
            .get(id)
            .ok_or_else(|| invalid(format!("Unknown edge {}", id)))
    };

    // 1. Balance conservation
    let quiescent = snapshot.pending_events == 0;
    for channel in &snapshot.channels {
        let held = edge(channel.edge1)?.balance + edge(channel.edge2)?.balance;
        if held > channel.capacity || (quiescent && held != channel.capacity) {
            return Err(invalid(format!(
                "Balance conservation violated on channel {}: capacity {}, held {}",
                channel.id, channel.capacity, held
            )));
        }
    }

    // 2. Group structure
    for (group_id, group) in snapshot.groups.iter().enumerate() {
        if !group.is_open() {
            continue;
        }
        if group.has_duplicate_member() {
            return Err(invalid(format!("Group {} repeats a member", group_id)));
        }
        for (i, &a) in group.edges.iter().enumerate() {
            for &b in &group.edges[i + 1..] {
                if edge(a)?.shares_endpoint(edge(b)?) {
                    return Err(invalid(format!(
                        "Group {} members {} and {} share a node",
                        group_id, a, b
                    )));
                }
            }
            if edge(a)?.group != Some(group_id) {
                return Err(invalid(format!(
                    "Edge {} is listed in group {} but points elsewhere",
                    a, group_id
                )));
            }
        }
    }

    // 3. Membership consistency
    for e in &snapshot.edges {
        if let Some(group_id) = e.group {
            let member = snapshot
                .groups
                .get(group_id)
                .is_some_and(|group| group.contains(e.id));
            if !member {
                return Err(invalid(format!(
                    "Edge {} points at group {} without being a member",
                    e.id, group_id
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::group::AdmissionBounds;
    use crate::models::network::{Network, Policy};

    fn snapshot_of(network: &Network) -> NetworkSnapshot {
        NetworkSnapshot {
            time: 0,
            rng_state: 1,
            pending_events: 0,
            channels: network.channels.clone(),
            edges: network.edges.clone(),
            groups: network.groups.clone(),
            payments: Vec::new(),
            config_hash: String::new(),
        }
    }

    fn two_channels() -> Network {
        let mut network = Network::with_nodes(4);
        network.open_channel(0, 1, 60, 40, Policy::default(), Policy::default(), 0).unwrap();
        network.open_channel(2, 3, 50, 50, Policy::default(), Policy::default(), 0).unwrap();
        network
    }

    #[test]
    fn test_compute_config_hash_deterministic() {
        #[derive(Serialize)]
        struct TestConfig {
            value: i32,
            name: String,
        }

        let hash1 = compute_config_hash(&TestConfig { value: 42, name: "test".to_string() }).unwrap();
        let hash2 = compute_config_hash(&TestConfig { value: 42, name: "test".to_string() }).unwrap();
        let hash3 = compute_config_hash(&TestConfig { value: 43, name: "test".to_string() }).unwrap();

        assert_eq!(hash1, hash2, "Same config should produce same hash");
        assert_ne!(hash1, hash3, "Different configs should produce different hashes");
    }

    #[test]
    fn test_valid_snapshot_roundtrips() {
        let mut network = two_channels();
        let mut group = Group::provisional(0, 1, AdmissionBounds { min: 40, max: 70 }, 0);
        group.id = Some(0);
        group.edges = vec![0, 2];
        network.groups.push(group);
        network.edge_mut(0).group = Some(0);
        network.edge_mut(2).group = Some(0);

        let snapshot = snapshot_of(&network);
        validate_snapshot(&snapshot).unwrap();

        let restored = NetworkSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(restored.edges.len(), 4);
        validate_snapshot(&restored).unwrap();
    }

    #[test]
    fn test_in_flight_balance_allowed_only_while_events_pending() {
        let mut network = two_channels();
        network.edge_mut(0).balance -= 10;

        let mut snapshot = snapshot_of(&network);
        assert!(validate_snapshot(&snapshot).is_err());

        snapshot.pending_events = 3;
        validate_snapshot(&snapshot).unwrap();

        snapshot.edges[1].balance += 20;
        assert!(validate_snapshot(&snapshot).is_err());
    }

    #[test]
    fn test_shared_endpoint_group_rejected() {
        let mut network = two_channels();
        let mut group = Group::provisional(0, 1, AdmissionBounds { min: 0, max: 100 }, 0);
        group.id = Some(0);
        group.edges = vec![0, 1];
        network.groups.push(group);
        network.edge_mut(0).group = Some(0);
        network.edge_mut(1).group = Some(0);

        assert!(matches!(
            validate_snapshot(&snapshot_of(&network)),
            Err(SimulationError::StateValidationError(_))
        ));
    }

    #[test]
    fn test_closed_group_keeps_members_pointing_at_it() {
        let mut network = two_channels();
        let mut group = Group::provisional(0, 1, AdmissionBounds { min: 0, max: 100 }, 0);
        group.id = Some(0);
        group.edges = vec![0, 2];
        group.is_closed = Some(9);
        network.groups.push(group);
        network.edge_mut(0).group = Some(0);
        network.edge_mut(2).group = Some(0);

        validate_snapshot(&snapshot_of(&network)).unwrap();
    }

    #[test]
    fn test_dangling_membership_rejected() {
        let mut network = two_channels();
        network.edge_mut(3).group = Some(0);
        assert!(validate_snapshot(&snapshot_of(&network)).is_err());
    }
}
