//! Provisioning core for ephemeral data-processing clusters.
//!
//! Turns a flat property map into a validated configuration, resolves the
//! network/subnet/firewall topology the cluster must launch into, and
//! drives cluster create/delete/status/describe against the provider API.
//! Provider failures are classified into retryable vs. fatal at the single
//! boundary where provider calls are made.

pub mod classify;
pub mod cluster;
pub mod config;
pub mod environment;
pub mod network;
pub mod retry;
pub mod types;

pub use classify::{Disposition, classify};
pub use cluster::ClusterLifecycleClient;
pub use config::{AUTO_DETECT, ProvisioningConfig, SshPublicKey};
pub use environment::{EnvironmentInfo, GceEnvironment, NotOnCloud};
pub use network::NetworkTopology;
pub use retry::{RetryPolicy, RetryScheduler, retry_with_backoff};
pub use types::{
    Cluster, ClusterStatus, Node, NodeRole, OperationHandle, OperationStatus, PeeringState,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A config property failed validation. Carries enough context to fix
    /// the input without consulting logs.
    #[error("invalid config '{key}' = '{value}': {constraint}")]
    InvalidConfig {
        key: String,
        value: String,
        constraint: String,
    },

    /// Under-specified or unresolvable configuration (e.g. no network
    /// could be determined). Never retryable.
    #[error("{0}")]
    Configuration(String),

    /// A cluster with the requested name already exists.
    #[error("cluster '{0}' already exists")]
    AlreadyExists(String),

    /// Transient provider failure; the caller may retry the whole
    /// operation after backoff.
    #[error("retryable provisioning failure: {0}")]
    Retryable(#[source] gcloud_api::Error),

    /// Any provider error not recognized by the classifier, surfaced
    /// unmodified so full diagnostic detail reaches the caller.
    #[error(transparent)]
    Api(#[from] gcloud_api::Error),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Retryable(_))
    }

    pub(crate) fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Error::InvalidConfig {
            key: key.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
