use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical status of a cluster, decoupled from provider state strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    /// No provider record exists for the cluster name.
    NotExists,
    Creating,
    Running,
    Deleting,
    Failed,
    /// Any provider state we do not recognize. Deliberately distinct from
    /// Running and Failed so an unknown state is never acted on as either.
    Orphaned,
}

impl ClusterStatus {
    /// Map a provider-reported state string to the canonical status.
    pub fn from_provider_state(state: &str) -> Self {
        match state {
            "ERROR" => ClusterStatus::Failed,
            "RUNNING" => ClusterStatus::Running,
            "CREATING" => ClusterStatus::Creating,
            "DELETING" => ClusterStatus::Deleting,
            // the provider briefly reports UPDATING during resize; the
            // cluster is still usable
            "UPDATING" => ClusterStatus::Running,
            _ => ClusterStatus::Orphaned,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Worker,
    Unknown,
}

/// A single cluster node with its reachable address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub role: NodeRole,
    /// Internal or external address depending on the resolved topology.
    /// Absent when the node's instance record could not be described.
    pub ip: Option<String>,
    /// Creation time in epoch millis, or -1 when unparsable.
    pub created_millis: i64,
    /// Extra facts about the node (`ip.internal`, `ip.external`, ...).
    pub properties: HashMap<String, String>,
}

impl Node {
    /// Placeholder for a node whose instance describe call 404'd, which
    /// can happen briefly right after cluster creation.
    pub fn unknown(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            role: NodeRole::Unknown,
            ip: None,
            created_millis: -1,
            properties: HashMap::new(),
        }
    }
}

/// Point-in-time snapshot of a cluster; re-fetched on every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub status: ClusterStatus,
    pub nodes: Vec<Node>,
    pub labels: HashMap<String, String>,
}

/// Peering relationship between the resolved network and the system
/// network the orchestrator runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeeringState {
    Active,
    Inactive,
    None,
}

/// Opaque reference to a provider long-running operation. Owned by the
/// caller until it resolves or polling is abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub name: String,
}

impl OperationHandle {
    pub fn new(name: impl Into<String>) -> Self {
        OperationHandle { name: name.into() }
    }
}

/// Outcome of polling a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Done,
    Failed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_states_map_to_canonical_status() {
        assert_eq!(ClusterStatus::from_provider_state("ERROR"), ClusterStatus::Failed);
        assert_eq!(ClusterStatus::from_provider_state("RUNNING"), ClusterStatus::Running);
        assert_eq!(ClusterStatus::from_provider_state("CREATING"), ClusterStatus::Creating);
        assert_eq!(ClusterStatus::from_provider_state("DELETING"), ClusterStatus::Deleting);
        assert_eq!(ClusterStatus::from_provider_state("UPDATING"), ClusterStatus::Running);
    }

    #[test]
    fn unrecognized_provider_state_is_orphaned() {
        for state in ["STOPPING", "STARTING", "SOME_FUTURE_STATE", "", "running"] {
            assert_eq!(
                ClusterStatus::from_provider_state(state),
                ClusterStatus::Orphaned,
                "state {state:?} must map to Orphaned, not Running or Failed",
            );
        }
    }

    #[test]
    fn unknown_node_has_no_address_and_sentinel_timestamp() {
        let node = Node::unknown("cluster-w-1");
        assert_eq!(node.role, NodeRole::Unknown);
        assert!(node.ip.is_none());
        assert_eq!(node.created_millis, -1);
        assert!(node.properties.is_empty());
    }
}
