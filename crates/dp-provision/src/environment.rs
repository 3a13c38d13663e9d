//! Injectable view of the environment the orchestrator itself runs in.
//!
//! Auto-detected config values (project id, zone, network) come from the
//! cloud metadata endpoint when running on a compute instance. The trait
//! lets tests and off-cloud deployments substitute a fixed answer without
//! touching real network calls.

use async_trait::async_trait;
use gcloud_api::MetadataClient;

/// Environment facts about the host the provisioner runs on. `None` means
/// "not running in this environment", which is never a fatal condition by
/// itself; the caller decides whether the missing value was required.
#[async_trait]
pub trait EnvironmentInfo: Send + Sync {
    async fn project_id(&self) -> Option<String>;
    async fn zone(&self) -> Option<String>;
    async fn network(&self) -> Option<String>;
}

/// Environment info backed by the compute metadata endpoint.
#[derive(Clone, Default)]
pub struct GceEnvironment {
    metadata: MetadataClient,
}

impl GceEnvironment {
    pub fn new(metadata: MetadataClient) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl EnvironmentInfo for GceEnvironment {
    async fn project_id(&self) -> Option<String> {
        self.metadata.project_id().await.ok()
    }

    async fn zone(&self) -> Option<String> {
        self.metadata.zone().await.ok()
    }

    async fn network(&self) -> Option<String> {
        self.metadata.network().await.ok()
    }
}

/// Environment for deployments that do not run on the target cloud;
/// every lookup answers "not here".
pub struct NotOnCloud;

#[async_trait]
impl EnvironmentInfo for NotOnCloud {
    async fn project_id(&self) -> Option<String> {
        None
    }

    async fn zone(&self) -> Option<String> {
        None
    }

    async fn network(&self) -> Option<String> {
        None
    }
}
