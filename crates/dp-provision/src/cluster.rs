//! Cluster lifecycle operations against the provider API.
//!
//! Create and delete return as soon as the provider acknowledges the
//! request with a long-running operation; callers poll the returned
//! handle. Every provider call goes through the error classifier.

use std::collections::HashMap;

use chrono::DateTime;
use gcloud_api::{self as api, ClusterApiClient, ComputeClient, Credentials, fetch_access_token};
use tracing::{debug, info};

use crate::classify::{Disposition, classify};
use crate::config::ProvisioningConfig;
use crate::environment::EnvironmentInfo;
use crate::network::{self, NetworkTopology, zone_region};
use crate::retry::{RetryPolicy, RetryScheduler};
use crate::types::{Cluster, ClusterStatus, Node, NodeRole, OperationHandle, OperationStatus};
use crate::{Error, Result};

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Client for provisioning and decommissioning clusters. Stateless across
/// calls beyond the held API connections and the immutable configuration;
/// safe for concurrent use across different cluster names.
pub struct ClusterLifecycleClient {
    conf: ProvisioningConfig,
    topology: NetworkTopology,
    clusters: ClusterApiClient,
    compute: ComputeClient,
}

impl ClusterLifecycleClient {
    /// Build a client from a resolved configuration: obtain a credential,
    /// resolve the network topology, and store the configuration with the
    /// resolved network and subnet injected.
    pub async fn from_config(
        conf: ProvisioningConfig,
        private_instance: bool,
        env: &dyn EnvironmentInfo,
    ) -> Result<Self> {
        let http = reqwest::Client::new();
        let credentials = match &conf.account_key {
            Some(key) => Credentials::ServiceAccountKey(key.clone()),
            None => Credentials::ApplicationDefault,
        };
        let token = fetch_access_token(&http, &credentials)
            .await
            .map_err(credential_err)?;

        let clusters = ClusterApiClient::new(token.clone());
        let compute = ComputeClient::new(token);

        let topology = network::resolve_topology(&conf, private_instance, env, &compute).await?;
        let conf = conf.with_network(topology.network.clone(), topology.subnet.clone());

        Ok(Self {
            conf,
            topology,
            clusters,
            compute,
        })
    }

    /// The configuration in effect, with the resolved network injected.
    pub fn config(&self) -> &ProvisioningConfig {
        &self.conf
    }

    pub fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    // ── Lifecycle operations ─────────────────────────────────────────

    /// Submit a cluster create request and return the acknowledgment
    /// handle. The cluster is not yet running when this returns.
    pub async fn create(
        &self,
        name: &str,
        image_version: &str,
        labels: &HashMap<String, String>,
    ) -> Result<OperationHandle> {
        let request = build_cluster_request(&self.conf, &self.topology, name, image_version, labels);

        match self
            .clusters
            .create_cluster(&self.conf.project_id, &self.conf.region, &request)
            .await
        {
            Ok(op) => {
                info!(cluster = name, operation = %op.name, "cluster create submitted");
                Ok(OperationHandle::new(op.name))
            }
            Err(e) => Err(create_err(name, e)),
        }
    }

    /// Submit a cluster delete request. A cluster that no longer exists
    /// is success by idempotence and yields `None`.
    pub async fn delete(&self, name: &str) -> Result<Option<OperationHandle>> {
        match self
            .clusters
            .delete_cluster(&self.conf.project_id, &self.conf.region, name)
            .await
        {
            Ok(op) => {
                info!(cluster = name, operation = %op.name, "cluster delete submitted");
                Ok(Some(OperationHandle::new(op.name)))
            }
            Err(e) => match classify(&e) {
                Disposition::NotFound => {
                    debug!(cluster = name, "cluster already absent on delete");
                    Ok(None)
                }
                Disposition::Retryable => Err(Error::Retryable(e)),
                Disposition::Fatal => Err(e.into()),
            },
        }
    }

    /// Canonical status of the cluster; absence maps to
    /// [`ClusterStatus::NotExists`] rather than an error.
    pub async fn status(&self, name: &str) -> Result<ClusterStatus> {
        Ok(self
            .fetch_cluster(name)
            .await?
            .map(|cluster| provider_status(&cluster))
            .unwrap_or(ClusterStatus::NotExists))
    }

    /// Full cluster record with its nodes and their addresses, or `None`
    /// if the cluster does not exist.
    pub async fn get(&self, name: &str) -> Result<Option<Cluster>> {
        let Some(cluster) = self.fetch_cluster(name).await? else {
            return Ok(None);
        };

        let mut nodes = Vec::new();
        for (role, group) in [
            (NodeRole::Master, master_config(&cluster)),
            (NodeRole::Worker, worker_config(&cluster)),
        ] {
            let Some(group) = group else { continue };
            for instance_name in group.instance_names.clone().unwrap_or_default() {
                let described = self
                    .compute
                    .get_instance(&self.conf.project_id, &self.conf.zone, &instance_name)
                    .await;
                nodes.push(node_from_describe(
                    &instance_name,
                    role,
                    described,
                    &self.topology.network,
                    self.topology.use_internal_ip,
                )?);
            }
        }

        Ok(Some(Cluster {
            name: cluster.cluster_name.clone(),
            status: provider_status(&cluster),
            nodes,
            labels: cluster.labels.unwrap_or_default(),
        }))
    }

    async fn fetch_cluster(&self, name: &str) -> Result<Option<api::Cluster>> {
        match self
            .clusters
            .get_cluster(&self.conf.project_id, &self.conf.region, name)
            .await
        {
            Ok(cluster) => Ok(Some(cluster)),
            Err(e) => match classify(&e) {
                Disposition::NotFound => Ok(None),
                Disposition::Retryable => Err(Error::Retryable(e)),
                Disposition::Fatal => Err(e.into()),
            },
        }
    }

    fn classified(&self, e: api::Error) -> Error {
        match classify(&e) {
            Disposition::Retryable => Error::Retryable(e),
            _ => e.into(),
        }
    }

    // ── Long-running operations ──────────────────────────────────────

    /// Single poll of a long-running operation.
    pub async fn operation_status(&self, handle: &OperationHandle) -> Result<OperationStatus> {
        match self.clusters.get_operation(&handle.name).await {
            Ok(op) => Ok(operation_outcome(&op)),
            Err(e) => Err(self.classified(e)),
        }
    }

    /// Poll an operation at the configured interval until it resolves or
    /// the policy's budget runs out; a still-pending result after budget
    /// exhaustion is returned as [`OperationStatus::Pending`].
    pub async fn await_operation(
        &self,
        handle: &OperationHandle,
        policy: RetryPolicy,
    ) -> Result<OperationStatus> {
        let mut scheduler = RetryScheduler::new(policy);
        loop {
            match self.operation_status(handle).await? {
                OperationStatus::Pending => {}
                resolved => return Ok(resolved),
            }
            match scheduler.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Ok(OperationStatus::Pending),
            }
        }
    }

    /// Polling policy for awaiting a create acknowledgment's completion:
    /// budget of `pollCreateDelay` plus up to `pollCreateJitter`.
    pub fn create_poll_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.conf.poll_interval)
            .with_budget(self.conf.poll_create_delay)
            .with_jitter(self.conf.poll_create_jitter)
    }

    /// Polling policy for awaiting a delete's completion.
    pub fn delete_poll_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.conf.poll_interval).with_budget(self.conf.poll_delete_delay)
    }
}

// credentials that cannot be obtained are a deployment problem the
// caller can fix, not a provider failure
fn credential_err(e: api::Error) -> Error {
    match e {
        api::Error::Auth(message) => Error::Configuration(message),
        other => other.into(),
    }
}

fn create_err(name: &str, e: api::Error) -> Error {
    if e.status().is_some_and(|s| s.as_u16() == 409) {
        return Error::AlreadyExists(name.to_string());
    }
    match classify(&e) {
        Disposition::Retryable => Error::Retryable(e),
        _ => e.into(),
    }
}

fn provider_status(cluster: &api::Cluster) -> ClusterStatus {
    cluster
        .status
        .as_ref()
        .map(|s| ClusterStatus::from_provider_state(&s.state))
        .unwrap_or(ClusterStatus::Orphaned)
}

fn master_config(cluster: &api::Cluster) -> Option<&api::InstanceGroupConfig> {
    cluster.config.as_ref()?.master_config.as_ref()
}

fn worker_config(cluster: &api::Cluster) -> Option<&api::InstanceGroupConfig> {
    cluster.config.as_ref()?.worker_config.as_ref()
}

fn operation_outcome(op: &api::Operation) -> OperationStatus {
    if !op.done {
        return OperationStatus::Pending;
    }
    match &op.error {
        Some(err) => OperationStatus::Failed {
            message: err.message.clone().unwrap_or_default(),
        },
        None => OperationStatus::Done,
    }
}

/// Assemble the provider create request from the resolved configuration.
/// Pure: no builder state is shared across concurrent creates.
fn build_cluster_request(
    conf: &ProvisioningConfig,
    topology: &NetworkTopology,
    name: &str,
    image_version: &str,
    labels: &HashMap<String, String>,
) -> api::Cluster {
    let mut metadata = HashMap::new();
    if let Some(key) = &conf.public_key {
        metadata.insert("ssh-keys".to_string(), format!("{}:{}", key.user, key.key));
    }
    // project-level metadata may turn on os-login, which would disable
    // the metadata ssh keys above
    metadata.insert("enable-oslogin".to_string(), "false".to_string());

    let host_project = conf.network_host_project();
    let mut gce = api::GceClusterConfig {
        zone_uri: Some(conf.zone.clone()),
        service_account_scopes: Some(vec![CLOUD_PLATFORM_SCOPE.to_string()]),
        metadata: Some(metadata),
        tags: (!topology.firewall_tags.is_empty()).then(|| topology.firewall_tags.clone()),
        internal_ip_only: topology.use_internal_ip.then_some(true),
        ..Default::default()
    };
    // subnets are unique within a region, not within a network, which is
    // why these two fields are mutually exclusive
    match &topology.subnet {
        Some(subnet) if subnet.contains('/') => {
            gce.subnetwork_uri = Some(subnet.clone());
        }
        Some(subnet) => {
            gce.subnetwork_uri = Some(format!(
                "projects/{host_project}/regions/{}/subnetworks/{subnet}",
                zone_region(&conf.zone)
            ));
        }
        None => {
            gce.network_uri = Some(format!(
                "projects/{host_project}/global/networks/{}",
                topology.network
            ));
        }
    }

    let mut properties = conf.cluster_properties.clone();
    // without this the provider treats zero workers as "use the default
    // of two", which breaks single-node clusters
    properties.insert(
        "dataproc:dataproc.allow.zero.workers".to_string(),
        "true".to_string(),
    );
    properties.insert(
        "dataproc:dataproc.logging.stackdriver.enable".to_string(),
        conf.stackdriver_logging_enabled.to_string(),
    );
    properties.insert(
        "dataproc:dataproc.monitoring.stackdriver.enable".to_string(),
        conf.stackdriver_monitoring_enabled.to_string(),
    );

    api::Cluster {
        cluster_name: name.to_string(),
        labels: Some(labels.clone()),
        status: None,
        config: Some(api::ClusterConfig {
            master_config: Some(instance_group(
                conf.master_num_nodes,
                conf.master_machine_type(),
                conf.master_disk_gb,
            )),
            worker_config: Some(instance_group(
                conf.worker_num_nodes,
                conf.worker_machine_type(),
                conf.worker_disk_gb,
            )),
            gce_cluster_config: Some(gce),
            software_config: Some(api::SoftwareConfig {
                image_version: Some(image_version.to_string()),
                properties: Some(properties),
            }),
        }),
    }
}

fn instance_group(num: i32, machine_type: String, disk_gb: i32) -> api::InstanceGroupConfig {
    api::InstanceGroupConfig {
        num_instances: Some(num),
        machine_type_uri: Some(machine_type),
        disk_config: Some(api::DiskConfig {
            boot_disk_size_gb: Some(disk_gb),
            num_local_ssds: Some(0),
        }),
        instance_names: None,
    }
}

/// Build a node record from an instance describe result. A 404 right
/// after cluster creation is a race, not a failure: it yields an Unknown
/// node with no address. An unparsable creation timestamp yields -1.
fn node_from_describe(
    name: &str,
    role: NodeRole,
    described: api::Result<api::Instance>,
    network: &str,
    use_internal_ip: bool,
) -> Result<Node> {
    let instance = match described {
        Ok(instance) => instance,
        Err(e) => {
            return match classify(&e) {
                Disposition::NotFound => Ok(Node::unknown(name)),
                Disposition::Retryable => Err(Error::Retryable(e)),
                Disposition::Fatal => Err(e.into()),
            };
        }
    };

    let mut properties = HashMap::new();
    for iface in instance.network_interfaces.unwrap_or_default() {
        let iface_network = iface
            .network
            .as_deref()
            .map(|n| n.rsplit('/').next().unwrap_or(n));
        if iface_network != Some(network) {
            continue;
        }
        // without an external IP the access config list is absent
        if let Some(access_configs) = &iface.access_configs {
            for access in access_configs {
                if let Some(nat_ip) = &access.nat_ip {
                    properties.insert("ip.external".to_string(), nat_ip.clone());
                    break;
                }
            }
        }
        if let Some(internal) = &iface.network_ip {
            properties.insert("ip.internal".to_string(), internal.clone());
        }
    }

    let created_millis = instance
        .creation_timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(-1);

    let ip_key = if use_internal_ip { "ip.internal" } else { "ip.external" };
    let ip = properties.get(ip_key).cloned();

    Ok(Node {
        name: name.to_string(),
        role,
        ip,
        created_millis,
        properties,
    })
}
