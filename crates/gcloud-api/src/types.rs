use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Cluster types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub cluster_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ClusterConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ClusterStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_config: Option<InstanceGroupConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_config: Option<InstanceGroupConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gce_cluster_config: Option<GceClusterConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_config: Option<SoftwareConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_instances: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_type_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_config: Option<DiskConfig>,
    /// Populated by the provider on reads; never sent on create.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_disk_size_gb: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_local_ssds: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceClusterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnetwork_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_ip_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,
}

/// Provider-reported cluster status. The state is left as a string so
/// unrecognized future states survive deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ── Long-running operations ──────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationError {
    pub code: Option<i32>,
    pub message: Option<String>,
}

// ── Network types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkList {
    pub items: Option<Vec<Network>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    /// Full subnetwork self-links, e.g.
    /// `https://www.googleapis.com/compute/v1/projects/<p>/regions/<r>/subnetworks/<n>`.
    pub subnetworks: Option<Vec<String>>,
    pub auto_create_subnetworks: Option<bool>,
    pub peerings: Option<Vec<NetworkPeering>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPeering {
    pub name: Option<String>,
    /// Self-link of the peer network.
    pub network: Option<String>,
    pub state: Option<String>,
}

// ── Firewall types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallList {
    pub items: Option<Vec<Firewall>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firewall {
    pub name: Option<String>,
    /// Self-link of the network the rule applies to.
    pub network: Option<String>,
    pub direction: Option<String>,
    pub allowed: Option<Vec<FirewallAllowed>>,
    pub target_tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirewallAllowed {
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: Option<String>,
    pub ports: Option<Vec<String>>,
}

// ── Instance types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: Option<String>,
    /// RFC 3339 with offset, e.g. `2018-04-16T12:09:03.943-07:00`.
    pub creation_timestamp: Option<String>,
    pub network_interfaces: Option<Vec<NetworkInterface>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub network: Option<String>,
    #[serde(rename = "networkIP")]
    pub network_ip: Option<String>,
    pub access_configs: Option<Vec<AccessConfig>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(rename = "natIP")]
    pub nat_ip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_deserializes_provider_shape() {
        let raw = r#"{
            "name": "default",
            "autoCreateSubnetworks": true,
            "subnetworks": [
                "https://www.googleapis.com/compute/v1/projects/p/regions/us-east1/subnetworks/default"
            ],
            "peerings": [
                {"name": "peer", "network": "https://www.googleapis.com/compute/v1/projects/sys/global/networks/sysnet", "state": "ACTIVE"}
            ]
        }"#;
        let network: Network = serde_json::from_str(raw).unwrap();
        assert_eq!(network.name, "default");
        assert_eq!(network.auto_create_subnetworks, Some(true));
        assert_eq!(network.subnetworks.as_ref().unwrap().len(), 1);
        let peering = &network.peerings.as_ref().unwrap()[0];
        assert_eq!(peering.state.as_deref(), Some("ACTIVE"));
    }

    #[test]
    fn firewall_allowed_uses_provider_field_names() {
        let raw = r#"{
            "name": "allow-ssh",
            "network": "https://www.googleapis.com/compute/v1/projects/p/global/networks/default",
            "direction": "INGRESS",
            "allowed": [{"IPProtocol": "tcp", "ports": ["22"]}],
            "targetTags": ["ssh-allowed"]
        }"#;
        let firewall: Firewall = serde_json::from_str(raw).unwrap();
        let allowed = &firewall.allowed.as_ref().unwrap()[0];
        assert_eq!(allowed.ip_protocol.as_deref(), Some("tcp"));
        assert_eq!(allowed.ports.as_ref().unwrap(), &["22".to_string()]);
        assert_eq!(firewall.target_tags.as_ref().unwrap(), &["ssh-allowed".to_string()]);
    }

    #[test]
    fn instance_ip_fields_use_provider_casing() {
        let raw = r#"{
            "name": "cluster-m-0",
            "creationTimestamp": "2018-04-16T12:09:03.943-07:00",
            "networkInterfaces": [
                {"network": ".../networks/default", "networkIP": "10.0.0.2",
                 "accessConfigs": [{"natIP": "35.1.2.3"}]}
            ]
        }"#;
        let instance: Instance = serde_json::from_str(raw).unwrap();
        let iface = &instance.network_interfaces.as_ref().unwrap()[0];
        assert_eq!(iface.network_ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(
            iface.access_configs.as_ref().unwrap()[0].nat_ip.as_deref(),
            Some("35.1.2.3")
        );
    }

    #[test]
    fn cluster_create_body_omits_unset_fields() {
        let cluster = Cluster {
            cluster_name: "c".into(),
            config: Some(ClusterConfig {
                gce_cluster_config: Some(GceClusterConfig {
                    network_uri: Some("projects/p/global/networks/default".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            labels: None,
            status: None,
        };
        let body = serde_json::to_value(&cluster).unwrap();
        assert_eq!(body["clusterName"], "c");
        let gce = &body["config"]["gceClusterConfig"];
        assert_eq!(gce["networkUri"], "projects/p/global/networks/default");
        // subnetworkUri was not set and must not appear (mutually exclusive)
        assert!(gce.get("subnetworkUri").is_none());
        assert!(body.get("status").is_none());
    }

    #[test]
    fn operation_done_defaults_to_false() {
        let op: Operation = serde_json::from_str(r#"{"name": "projects/p/regions/r/operations/1"}"#).unwrap();
        assert!(!op.done);
        assert!(op.error.is_none());
    }
}
