use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result, check};

const METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1";

/// Time to wait for the metadata server before concluding we are not
/// running on the cloud.
const METADATA_TIMEOUT: Duration = Duration::from_secs(3);

/// Client for the VM metadata endpoint that exists on compute instances.
///
/// Lookups fail fast when not running on the cloud; callers treat any
/// failure as "no ambient environment", not a fatal error.
#[derive(Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base: String,
}

impl Default for MetadataClient {
    fn default() -> Self {
        Self::new(METADATA_BASE_URL)
    }
}

impl MetadataClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }

    async fn get(&self, resource: &str) -> Result<String> {
        let resp = self
            .http
            .get(format!("{}/{resource}", self.base))
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_TIMEOUT)
            .send()
            .await?;

        check(resp, "metadata lookup")
            .await?
            .text()
            .await
            .map_err(Error::from)
    }

    /// Project id of the instance's project.
    pub async fn project_id(&self) -> Result<String> {
        self.get("project/project-id").await
    }

    /// Zone name, stripped of the `projects/<number>/zones/` prefix.
    pub async fn zone(&self) -> Result<String> {
        let zone = self.get("instance/zone").await?;
        Ok(last_path_segment(&zone))
    }

    /// Name of the network the instance's first interface is attached to.
    pub async fn network(&self) -> Result<String> {
        let network = self.get("instance/network-interfaces/0/network").await?;
        Ok(last_path_segment(&network))
    }

    /// Access token for the instance's default service account.
    pub async fn service_account_token(&self) -> Result<String> {
        let raw = self
            .get("instance/service-accounts/default/token")
            .await?;
        let token: TokenResponse = serde_json::from_str(&raw)
            .map_err(|e| Error::Auth(format!("malformed metadata token response: {e}")))?;
        Ok(token.access_token)
    }
}

#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
}

// metadata values come back as resource paths like
// `projects/<number>/zones/us-east1-b`; only the final segment is useful
fn last_path_segment(value: &str) -> String {
    value.rsplit('/').next().unwrap_or(value).to_string()
}
