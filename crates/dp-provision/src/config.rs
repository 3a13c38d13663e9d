//! Validation and normalization of the flat property map callers supply.

use std::collections::HashMap;
use std::time::Duration;

use crate::environment::EnvironmentInfo;
use crate::{Error, Result};

/// Sentinel meaning "resolve this value from the environment".
pub const AUTO_DETECT: &str = "auto-detect";

const DEFAULT_MASTER_NUM_NODES: i32 = 1;
const DEFAULT_WORKER_NUM_NODES: i32 = 2;
const DEFAULT_CPUS: i32 = 4;
const DEFAULT_MEMORY_MB: i32 = 15 * 1024;
const DEFAULT_DISK_GB: i32 = 500;
const DEFAULT_POLL_CREATE_DELAY_SECS: u64 = 60;
const DEFAULT_POLL_CREATE_JITTER_SECS: u64 = 20;
const DEFAULT_POLL_DELETE_DELAY_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// The provider pins regional cluster endpoints; `global` is the
/// multi-region endpoint used unless the caller says otherwise.
const DEFAULT_REGION: &str = "global";

/// SSH public key installed on cluster nodes for control-plane access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPublicKey {
    pub user: String,
    pub key: String,
}

/// Validated provisioning configuration. Built once per request and never
/// mutated; [`ProvisioningConfig::with_network`] produces a new instance
/// with the resolved network facts injected.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    /// Explicit service-account key blob, or `None` to use the ambient
    /// compute identity.
    pub account_key: Option<String>,
    pub region: String,
    pub zone: String,
    pub project_id: String,
    pub network: Option<String>,
    /// Project hosting the network when it differs from `project_id`
    /// (shared-VPC setups).
    pub network_host_project_id: Option<String>,
    pub subnet: Option<String>,

    pub master_num_nodes: i32,
    pub master_cpus: i32,
    pub master_memory_mb: i32,
    pub master_disk_gb: i32,

    pub worker_num_nodes: i32,
    pub worker_cpus: i32,
    pub worker_memory_mb: i32,
    pub worker_disk_gb: i32,

    pub poll_create_delay: Duration,
    pub poll_create_jitter: Duration,
    pub poll_delete_delay: Duration,
    pub poll_interval: Duration,

    pub prefer_external_ip: bool,
    pub stackdriver_logging_enabled: bool,
    pub stackdriver_monitoring_enabled: bool,

    pub public_key: Option<SshPublicKey>,
    /// Free-form provider knobs, keys keep their `<prefix>:` namespace.
    pub cluster_properties: HashMap<String, String>,
}

impl ProvisioningConfig {
    /// Build a validated config from a raw property map, resolving
    /// auto-detect sentinels against the given environment.
    pub async fn resolve(
        properties: &HashMap<String, String>,
        public_key: Option<SshPublicKey>,
        env: &dyn EnvironmentInfo,
    ) -> Result<Self> {
        let account_key = get_string(properties, "accountKey");

        let project_id = match get_string(properties, "projectId") {
            Some(p) => p,
            None => env.project_id().await.ok_or_else(|| {
                Error::Configuration(
                    "unable to get project id from the environment; \
                     please explicitly set the project id and account key"
                        .to_string(),
                )
            })?,
        };

        let zone = match get_string(properties, "zone") {
            Some(z) => z,
            None => env.zone().await.ok_or_else(|| {
                Error::Configuration(
                    "unable to get zone from the environment; please explicitly set the zone"
                        .to_string(),
                )
            })?,
        };

        let region = get_string(properties, "region").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let network = get_string(properties, "network");
        let network_host_project_id = get_string(properties, "networkHostProjectId");
        let subnet = get_string(properties, "subnet");

        let master_num_nodes =
            get_i32(properties, "masterNumNodes", DEFAULT_MASTER_NUM_NODES)?;
        if master_num_nodes != 1 && master_num_nodes != 3 {
            return Err(Error::invalid_config(
                "masterNumNodes",
                master_num_nodes.to_string(),
                "master nodes must be either 1 or 3",
            ));
        }

        let worker_num_nodes =
            get_i32(properties, "workerNumNodes", DEFAULT_WORKER_NUM_NODES)?;
        if worker_num_nodes == 1 {
            return Err(Error::invalid_config(
                "workerNumNodes",
                worker_num_nodes.to_string(),
                "worker nodes must either be zero for a single node cluster, \
                 or at least 2 for a multi node cluster",
            ));
        }

        let master_cpus = get_i32(properties, "masterCPUs", DEFAULT_CPUS)?;
        let worker_cpus = get_i32(properties, "workerCPUs", DEFAULT_CPUS)?;
        let master_memory_mb = get_i32(properties, "masterMemoryMB", DEFAULT_MEMORY_MB)?;
        let worker_memory_mb = get_i32(properties, "workerMemoryMB", DEFAULT_MEMORY_MB)?;
        let master_disk_gb = get_i32(properties, "masterDiskGB", DEFAULT_DISK_GB)?;
        let worker_disk_gb = get_i32(properties, "workerDiskGB", DEFAULT_DISK_GB)?;

        let poll_create_delay =
            get_secs(properties, "pollCreateDelay", DEFAULT_POLL_CREATE_DELAY_SECS)?;
        let poll_create_jitter =
            get_secs(properties, "pollCreateJitter", DEFAULT_POLL_CREATE_JITTER_SECS)?;
        let poll_delete_delay =
            get_secs(properties, "pollDeleteDelay", DEFAULT_POLL_DELETE_DELAY_SECS)?;
        let poll_interval = get_secs(properties, "pollInterval", DEFAULT_POLL_INTERVAL_SECS)?;

        let prefer_external_ip = get_bool(properties, "preferExternalIP", false);
        let stackdriver_logging_enabled =
            get_bool(properties, "stackdriverLoggingEnabled", true);
        let stackdriver_monitoring_enabled =
            get_bool(properties, "stackdriverMonitoringEnabled", true);

        let cluster_properties = properties
            .iter()
            .filter(|(key, _)| is_cluster_property(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(ProvisioningConfig {
            account_key,
            region,
            zone,
            project_id,
            network,
            network_host_project_id,
            subnet,
            master_num_nodes,
            master_cpus,
            master_memory_mb,
            master_disk_gb,
            worker_num_nodes,
            worker_cpus,
            worker_memory_mb,
            worker_disk_gb,
            poll_create_delay,
            poll_create_jitter,
            poll_delete_delay,
            poll_interval,
            prefer_external_ip,
            stackdriver_logging_enabled,
            stackdriver_monitoring_enabled,
            public_key,
            cluster_properties,
        })
    }

    /// Clone with the resolved network and subnet injected; every other
    /// field is preserved.
    pub fn with_network(&self, network: impl Into<String>, subnet: Option<String>) -> Self {
        ProvisioningConfig {
            network: Some(network.into()),
            subnet,
            ..self.clone()
        }
    }

    /// Project hosting the network, falling back to the cluster project.
    pub fn network_host_project(&self) -> &str {
        match self.network_host_project_id.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => &self.project_id,
        }
    }

    pub fn master_machine_type(&self) -> String {
        machine_type(self.master_cpus, self.master_memory_mb)
    }

    pub fn worker_machine_type(&self) -> String {
        machine_type(self.worker_cpus, self.worker_memory_mb)
    }
}

// TODO: pre-defined cpu/memory combinations have dedicated names
// (4cpu/15gb is n1-standard-4); those could be selected when they match.
fn machine_type(cpus: i32, memory_mb: i32) -> String {
    format!("custom-{cpus}-{memory_mb}")
}

/// A key addresses a provider-namespaced cluster property when it starts
/// with `<alnum-or-dash prefix>:`. Matching keys pass through verbatim so
/// unmapped provider knobs stay configurable.
fn is_cluster_property(key: &str) -> bool {
    match key.split_once(':') {
        Some((prefix, _)) => {
            !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        None => false,
    }
}

// callers only send empty strings, never missing keys; both mean unset,
// and the auto-detect sentinel also counts as unset for string values
fn get_string(properties: &HashMap<String, String>, key: &str) -> Option<String> {
    properties
        .get(key)
        .filter(|v| !v.is_empty() && *v != AUTO_DETECT)
        .cloned()
}

fn get_i32(properties: &HashMap<String, String>, key: &str, default: i32) -> Result<i32> {
    let raw = match properties.get(key) {
        Some(v) if !v.is_empty() => v,
        _ => return Ok(default),
    };
    match raw.parse::<i32>() {
        Ok(val) if val >= 0 => Ok(val),
        _ => Err(Error::invalid_config(
            key,
            raw.clone(),
            "must be a valid, non-negative integer",
        )),
    }
}

fn get_secs(properties: &HashMap<String, String>, key: &str, default: u64) -> Result<Duration> {
    let raw = match properties.get(key) {
        Some(v) if !v.is_empty() => v,
        _ => return Ok(Duration::from_secs(default)),
    };
    match raw.parse::<u64>() {
        Ok(val) => Ok(Duration::from_secs(val)),
        Err(_) => Err(Error::invalid_config(
            key,
            raw.clone(),
            "must be a valid, non-negative number of seconds",
        )),
    }
}

fn get_bool(properties: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match properties.get(key) {
        Some(v) if !v.is_empty() => v.eq_ignore_ascii_case("true"),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::NotOnCloud;
    use async_trait::async_trait;

    struct OnCloud;

    #[async_trait]
    impl EnvironmentInfo for OnCloud {
        async fn project_id(&self) -> Option<String> {
            Some("ambient-project".to_string())
        }

        async fn zone(&self) -> Option<String> {
            Some("us-east1-b".to_string())
        }

        async fn network(&self) -> Option<String> {
            Some("ambient-net".to_string())
        }
    }

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        map.entry("projectId".to_string())
            .or_insert_with(|| "proj".to_string());
        map.entry("zone".to_string())
            .or_insert_with(|| "us-east1-b".to_string());
        map
    }

    async fn resolve(pairs: &[(&str, &str)]) -> Result<ProvisioningConfig> {
        ProvisioningConfig::resolve(&props(pairs), None, &NotOnCloud).await
    }

    #[tokio::test]
    async fn defaults_are_applied() {
        let conf = resolve(&[]).await.unwrap();
        assert_eq!(conf.master_num_nodes, 1);
        assert_eq!(conf.worker_num_nodes, 2);
        assert_eq!(conf.master_cpus, 4);
        assert_eq!(conf.worker_memory_mb, 15 * 1024);
        assert_eq!(conf.master_disk_gb, 500);
        assert_eq!(conf.region, "global");
        assert_eq!(conf.poll_create_delay, Duration::from_secs(60));
        assert_eq!(conf.poll_create_jitter, Duration::from_secs(20));
        assert_eq!(conf.poll_delete_delay, Duration::from_secs(30));
        assert_eq!(conf.poll_interval, Duration::from_secs(2));
        assert!(!conf.prefer_external_ip);
        assert!(conf.stackdriver_logging_enabled);
        assert!(conf.stackdriver_monitoring_enabled);
        assert!(conf.network.is_none());
        assert!(conf.subnet.is_none());
    }

    #[tokio::test]
    async fn worker_count_of_one_is_rejected() {
        let err = resolve(&[("workerNumNodes", "1")]).await.unwrap_err();
        match err {
            Error::InvalidConfig { key, value, .. } => {
                assert_eq!(key, "workerNumNodes");
                assert_eq!(value, "1");
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }

        for valid in ["0", "2", "10"] {
            assert!(resolve(&[("workerNumNodes", valid)]).await.is_ok());
        }
    }

    #[tokio::test]
    async fn master_count_must_be_one_or_three() {
        for invalid in ["0", "2", "4"] {
            assert!(resolve(&[("masterNumNodes", invalid)]).await.is_err());
        }
        for valid in ["1", "3"] {
            assert!(resolve(&[("masterNumNodes", valid)]).await.is_ok());
        }
    }

    #[tokio::test]
    async fn numeric_fields_reject_garbage_and_negatives() {
        for (key, value) in [("masterCPUs", "four"), ("workerDiskGB", "-5"), ("pollInterval", "2s")] {
            let err = resolve(&[(key, value)]).await.unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains(key), "error must name the key: {msg}");
            assert!(msg.contains(value), "error must name the value: {msg}");
        }
    }

    #[tokio::test]
    async fn auto_detect_resolves_from_environment() {
        let mut map = HashMap::new();
        map.insert("projectId".to_string(), AUTO_DETECT.to_string());
        map.insert("zone".to_string(), String::new());
        let conf = ProvisioningConfig::resolve(&map, None, &OnCloud).await.unwrap();
        assert_eq!(conf.project_id, "ambient-project");
        assert_eq!(conf.zone, "us-east1-b");
    }

    #[tokio::test]
    async fn auto_detect_off_cloud_is_a_configuration_error() {
        let mut map = HashMap::new();
        map.insert("projectId".to_string(), AUTO_DETECT.to_string());
        let err = ProvisioningConfig::resolve(&map, None, &NotOnCloud)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("project id"));
    }

    #[tokio::test]
    async fn boolean_properties_parse_case_insensitively() {
        for truthy in ["true", "True", "TRUE"] {
            let conf = resolve(&[("preferExternalIP", truthy)]).await.unwrap();
            assert!(conf.prefer_external_ip, "value {truthy:?}");
        }
        // anything else reads as false rather than erroring
        for falsy in ["false", "False", "yes", "1"] {
            let conf = resolve(&[("preferExternalIP", falsy)]).await.unwrap();
            assert!(!conf.prefer_external_ip, "value {falsy:?}");
        }
    }

    #[tokio::test]
    async fn namespaced_properties_pass_through_verbatim() {
        let conf = resolve(&[
            ("dataproc:dataproc.conscrypt.provider.enable", "false"),
            ("yarn:yarn.nodemanager.pmem-check-enabled", "false"),
            ("capacity-scheduler:maximum-am-resource-percent", "0.5"),
            ("plainKey", "ignored"),
            ("bad key:rejected", "ignored"),
            (":rejected", "ignored"),
        ])
        .await
        .unwrap();
        assert_eq!(conf.cluster_properties.len(), 3);
        assert_eq!(
            conf.cluster_properties["dataproc:dataproc.conscrypt.provider.enable"],
            "false"
        );
        assert!(conf.cluster_properties.contains_key("yarn:yarn.nodemanager.pmem-check-enabled"));
        assert!(
            conf.cluster_properties
                .contains_key("capacity-scheduler:maximum-am-resource-percent")
        );
    }

    #[tokio::test]
    async fn with_network_preserves_everything_else() {
        let conf = resolve(&[
            ("network", "old-net"),
            ("workerNumNodes", "4"),
            ("preferExternalIP", "true"),
            ("dataproc:some.knob", "on"),
        ])
        .await
        .unwrap();
        let overridden = conf.with_network("new-net", Some("new-subnet".to_string()));

        assert_eq!(overridden.network.as_deref(), Some("new-net"));
        assert_eq!(overridden.subnet.as_deref(), Some("new-subnet"));
        assert_eq!(overridden.project_id, conf.project_id);
        assert_eq!(overridden.zone, conf.zone);
        assert_eq!(overridden.worker_num_nodes, 4);
        assert!(overridden.prefer_external_ip);
        assert_eq!(overridden.cluster_properties, conf.cluster_properties);
        assert_eq!(overridden.poll_create_delay, conf.poll_create_delay);
    }

    #[tokio::test]
    async fn network_host_project_falls_back_to_project_id() {
        let conf = resolve(&[]).await.unwrap();
        assert_eq!(conf.network_host_project(), "proj");

        let conf = resolve(&[("networkHostProjectId", "shared-vpc-host")]).await.unwrap();
        assert_eq!(conf.network_host_project(), "shared-vpc-host");
    }

    #[tokio::test]
    async fn machine_type_is_custom_shape() {
        let conf = resolve(&[("masterCPUs", "8"), ("masterMemoryMB", "30720")]).await.unwrap();
        assert_eq!(conf.master_machine_type(), "custom-8-30720");
        assert_eq!(conf.worker_machine_type(), "custom-4-15360");
    }
}
