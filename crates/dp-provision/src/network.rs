//! Resolution of the network, subnet, and firewall topology a cluster
//! must launch into.
//!
//! The decision steps (peering inference, subnet choice, firewall
//! discovery) are pure functions over provider snapshots; only the
//! orchestration at the top issues API calls.

use gcloud_api::{ComputeClient, Firewall, Network};
use tracing::info;

use crate::classify::{Disposition, classify};
use crate::config::ProvisioningConfig;
use crate::environment::EnvironmentInfo;
use crate::types::PeeringState;
use crate::{Error, Result};

/// Ports a cluster node must be reachable on for the control plane to
/// manage it. Provisioning refuses to proceed without an ingress path
/// for each of them.
const REQUIRED_PORTS: &[(&str, u16)] = &[("SSH", 22)];

/// Resolved network facts, injected back into the configuration before
/// any cluster request is built.
#[derive(Debug, Clone)]
pub struct NetworkTopology {
    pub network: String,
    /// Subnet self-link or name; `None` only when the network auto-creates
    /// subnets.
    pub subnet: Option<String>,
    pub use_internal_ip: bool,
    /// Instance tags that attach the discovered firewall rules.
    pub firewall_tags: Vec<String>,
}

/// Determine the network to use, its peering relationship to the system
/// network, the region-appropriate subnet, and the firewall target tags.
pub async fn resolve_topology(
    conf: &ProvisioningConfig,
    private_instance: bool,
    env: &dyn EnvironmentInfo,
    compute: &ComputeClient,
) -> Result<NetworkTopology> {
    let system_project = env.project_id().await;
    let system_network = env.network().await;
    let host_project = conf.network_host_project().to_string();

    let network = match conf.network.clone() {
        Some(n) => Some(n),
        // running in the same project the cluster is provisioned into:
        // default to the network this host is attached to
        None if system_project.as_deref() == Some(conf.project_id.as_str()) => {
            system_network.clone()
        }
        None => Some(find_network(compute, &host_project).await?),
    };
    let network = network.ok_or_else(|| {
        Error::Configuration(
            "unable to automatically detect a network; please explicitly set a network"
                .to_string(),
        )
    })?;

    let info = fetch_network_info(compute, &host_project, &network).await?;

    let system_network_path = match (&system_project, &system_network) {
        (Some(project), Some(name)) => Some(network_self_link(project, name)),
        _ => None,
    };
    let peering = peering_state(system_network_path.as_deref(), &info);

    if conf.prefer_external_ip && peering == PeeringState::Active {
        info!(
            network = %network,
            project = %host_project,
            "peering to the system network is ACTIVE; preferExternalIP can be \
             set to false to launch clusters with internal IP only"
        );
    }

    // private instances always stay internal; otherwise internal IP is
    // used when the caller did not prefer external and the cluster lands
    // either in the system's own network or in one actively peered to it
    let same_network = Some(network.as_str()) == system_network.as_deref()
        && Some(host_project.as_str()) == system_project.as_deref();
    let use_internal_ip = private_instance
        || (!conf.prefer_external_ip && (same_network || peering == PeeringState::Active));

    let subnets = info.subnetworks.clone().unwrap_or_default();
    if let Some(requested) = &conf.subnet
        && !subnet_exists(&subnets, requested)
    {
        return Err(Error::Configuration(format!(
            "subnet '{requested}' does not exist in network '{network}' in project \
             '{host_project}'; please use a different subnet"
        )));
    }

    // networks with custom subnets require one to be named in the request
    let auto_create = info.auto_create_subnetworks.unwrap_or(false);
    let subnet = if auto_create {
        conf.subnet.clone()
    } else {
        if subnets.is_empty() {
            return Err(Error::Configuration(format!(
                "network '{network}' in project '{host_project}' does not contain any \
                 subnets; please create a subnet or use a different network"
            )));
        }
        Some(choose_subnet(&network, &subnets, conf.subnet.as_deref(), &conf.zone)?)
    };

    let firewalls = compute
        .list_firewalls(&host_project)
        .await
        .map_err(provider_err)?;
    let firewall_tags =
        firewall_target_tags(&firewalls.items.unwrap_or_default(), &network, &host_project)?;

    info!(
        network = %network,
        subnet = subnet.as_deref().unwrap_or("<auto>"),
        use_internal_ip,
        "resolved cluster network topology"
    );

    Ok(NetworkTopology {
        network,
        subnet,
        use_internal_ip,
        firewall_tags,
    })
}

// topology reads are side-effect free; transient failures are retryable
// at the whole-operation level
fn provider_err(e: gcloud_api::Error) -> Error {
    match classify(&e) {
        Disposition::Retryable => Error::Retryable(e),
        _ => Error::Api(e),
    }
}

async fn find_network(compute: &ComputeClient, project: &str) -> Result<String> {
    let networks = compute.list_networks(project).await.map_err(provider_err)?;
    networks
        .items
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|n| n.name)
        .ok_or_else(|| {
            Error::Configuration(format!(
                "unable to find any networks in project '{project}'; \
                 please create a network in the project"
            ))
        })
}

async fn fetch_network_info(
    compute: &ComputeClient,
    project: &str,
    network: &str,
) -> Result<Network> {
    match compute.get_network(project, network).await {
        Ok(info) => Ok(info),
        Err(e) if classify(&e) == Disposition::NotFound => Err(Error::Configuration(format!(
            "unable to find network '{network}' in project '{project}'; \
             please specify another network"
        ))),
        Err(e) => Err(provider_err(e)),
    }
}

/// Networks are global resources; this is the canonical self-link form
/// peering entries refer to.
pub fn network_self_link(project: &str, network: &str) -> String {
    format!("https://www.googleapis.com/compute/v1/projects/{project}/global/networks/{network}")
}

/// Infer the peering state between the resolved network and the system
/// network. `None` system path (not running on the cloud) or an absent
/// peering list both mean no peering; the first matching entry wins.
pub fn peering_state(system_network_path: Option<&str>, info: &Network) -> PeeringState {
    let Some(system_path) = system_network_path else {
        return PeeringState::None;
    };
    let Some(peerings) = &info.peerings else {
        return PeeringState::None;
    };
    for peering in peerings {
        if peering.network.as_deref() != Some(system_path) {
            continue;
        }
        return if peering.state.as_deref() == Some("ACTIVE") {
            PeeringState::Active
        } else {
            PeeringState::Inactive
        };
    }
    PeeringState::None
}

/// Whether the requested subnet appears in the network's subnet list,
/// by exact self-link or by bare name.
pub fn subnet_exists(subnets: &[String], subnet: &str) -> bool {
    subnets
        .iter()
        .any(|s| s == subnet || s.ends_with(&format!("subnetworks/{subnet}")))
}

/// Pick the subnet for the cluster: the requested one if named, otherwise
/// the first subnet in the same region as the zone. Zones are always
/// `<region>-<letter>`.
pub fn choose_subnet(
    network: &str,
    subnets: &[String],
    requested: Option<&str>,
    zone: &str,
) -> Result<String> {
    let region = zone_region(zone);
    for subnet in subnets {
        if let Some(name) = requested
            && !subnet.ends_with(&format!("subnetworks/{name}"))
        {
            continue;
        }
        if subnet.contains(&format!("{region}/subnetworks")) {
            return Ok(subnet.clone());
        }
    }
    Err(Error::Configuration(format!(
        "could not find any subnets in network '{network}' for region '{region}'; \
         please specify a subnet that is in the same region as the selected zone"
    )))
}

pub fn zone_region(zone: &str) -> &str {
    match zone.rfind('-') {
        Some(idx) => &zone[..idx],
        None => zone,
    }
}

/// Scan ingress firewall rules on the chosen network and collect the
/// target tags that grant the required ports. Fails when some required
/// port has no ingress path at all.
pub fn firewall_target_tags(
    firewalls: &[Firewall],
    network: &str,
    host_project: &str,
) -> Result<Vec<String>> {
    let mut required: Vec<(&str, u16)> = REQUIRED_PORTS.to_vec();
    let mut tags = Vec::new();

    for firewall in firewalls {
        // the rule's network is a self-link; compare by trailing segment
        let rule_network = firewall
            .network
            .as_deref()
            .map(|n| n.rsplit('/').next().unwrap_or(n));
        if rule_network != Some(network) {
            continue;
        }
        if firewall.direction.as_deref() != Some("INGRESS") {
            continue;
        }
        let Some(allowed) = &firewall.allowed else {
            continue;
        };

        for entry in allowed {
            let mut add_tag = false;
            match entry.ip_protocol.as_deref() {
                Some("ALL") => {
                    required.clear();
                    add_tag = true;
                }
                Some("tcp") => {
                    let covers_ssh = match &entry.ports {
                        None => true,
                        Some(ports) => ports.iter().any(|p| p == "22"),
                    };
                    if covers_ssh {
                        required.retain(|(name, _)| *name != "SSH");
                        add_tag = true;
                    }
                }
                _ => {}
            }
            if add_tag
                && let Some(target_tags) = &firewall.target_tags
                && let Some(first) = target_tags.first()
            {
                tags.push(first.clone());
            }
        }
    }

    if !required.is_empty() {
        let ports = required
            .iter()
            .map(|(_, port)| port.to_string())
            .collect::<Vec<_>>()
            .join(",");
        return Err(Error::Configuration(format!(
            "could not find an ingress firewall rule for network '{network}' in project \
             '{host_project}' for ports '{ports}'; please create a rule to allow incoming \
             traffic on those ports for your IP range"
        )));
    }
    Ok(tags)
}
