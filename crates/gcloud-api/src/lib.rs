//! Typed Rust client for the Google Cloud APIs used to provision clusters.
//!
//! Covers the subset needed for cluster lifecycle management:
//! the Dataproc clusters API (create, get, delete, operations) and the
//! Compute API (networks, firewalls, instances), plus the VM metadata
//! endpoint and OAuth2 access-token acquisition.

mod auth;
mod metadata;
mod types;

pub use auth::*;
pub use metadata::*;
pub use types::*;

const CLUSTER_BASE_URL: &str = "https://dataproc.googleapis.com/v1";
const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("credential error: {0}")]
    Auth(String),
}

impl Error {
    /// HTTP status of the failure, if the provider got far enough to answer.
    /// Transport-level failures have no status.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Request(e) => e.status(),
            Error::Auth(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Api { endpoint, status, body });
    }
    Ok(resp)
}

/// Client for the managed-cluster REST API.
#[derive(Clone)]
pub struct ClusterApiClient {
    token: String,
    http: reqwest::Client,
}

impl ClusterApiClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn clusters_url(&self, project: &str, region: &str) -> String {
        format!("{CLUSTER_BASE_URL}/projects/{project}/regions/{region}/clusters")
    }

    // ── Clusters ─────────────────────────────────────────────────────

    /// Submit a cluster create request. Returns the initial long-running
    /// operation acknowledgment, not cluster readiness.
    pub async fn create_cluster(
        &self,
        project: &str,
        region: &str,
        cluster: &Cluster,
    ) -> Result<Operation> {
        let resp = self
            .http
            .post(self.clusters_url(project, region))
            .header("Authorization", self.auth())
            .json(cluster)
            .send()
            .await?;

        check(resp, "create cluster")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn delete_cluster(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Operation> {
        let resp = self
            .http
            .delete(format!("{}/{name}", self.clusters_url(project, region)))
            .header("Authorization", self.auth())
            .send()
            .await?;

        check(resp, "delete cluster")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn get_cluster(&self, project: &str, region: &str, name: &str) -> Result<Cluster> {
        let resp = self
            .http
            .get(format!("{}/{name}", self.clusters_url(project, region)))
            .header("Authorization", self.auth())
            .send()
            .await?;

        check(resp, "get cluster")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Fetch a long-running operation by its fully-qualified name,
    /// e.g. `projects/<p>/regions/<r>/operations/<id>`.
    pub async fn get_operation(&self, name: &str) -> Result<Operation> {
        let resp = self
            .http
            .get(format!("{CLUSTER_BASE_URL}/{name}"))
            .header("Authorization", self.auth())
            .send()
            .await?;

        check(resp, "get operation")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }
}

/// Client for the Compute REST API (networks, firewalls, instances).
#[derive(Clone)]
pub struct ComputeClient {
    token: String,
    http: reqwest::Client,
}

impl ComputeClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    // ── Networks ─────────────────────────────────────────────────────

    pub async fn list_networks(&self, project: &str) -> Result<NetworkList> {
        let resp = self
            .http
            .get(format!("{COMPUTE_BASE_URL}/projects/{project}/global/networks"))
            .header("Authorization", self.auth())
            .send()
            .await?;

        check(resp, "list networks")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn get_network(&self, project: &str, network: &str) -> Result<Network> {
        let resp = self
            .http
            .get(format!(
                "{COMPUTE_BASE_URL}/projects/{project}/global/networks/{network}"
            ))
            .header("Authorization", self.auth())
            .send()
            .await?;

        check(resp, "get network")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Firewalls ────────────────────────────────────────────────────

    pub async fn list_firewalls(&self, project: &str) -> Result<FirewallList> {
        let resp = self
            .http
            .get(format!("{COMPUTE_BASE_URL}/projects/{project}/global/firewalls"))
            .header("Authorization", self.auth())
            .send()
            .await?;

        check(resp, "list firewalls")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Instances ────────────────────────────────────────────────────

    pub async fn get_instance(&self, project: &str, zone: &str, name: &str) -> Result<Instance> {
        let resp = self
            .http
            .get(format!(
                "{COMPUTE_BASE_URL}/projects/{project}/zones/{zone}/instances/{name}"
            ))
            .header("Authorization", self.auth())
            .send()
            .await?;

        check(resp, "get instance")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }
}
