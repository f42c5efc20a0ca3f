//! Packet provider
//!
//! Fetches the user-data as the provisioning config from the Packet
//! metadata service, and reports stage outcomes to the machine's
//! phone-home endpoint so the platform dashboard can track the boot.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::Provider;
use crate::error::IgnitionError;
use crate::fetch::{config_headers, FetchOptions, Fetcher};

const METADATA_BASE_URL: &str = "https://metadata.packet.net";

#[derive(Debug, Deserialize)]
struct Metadata {
    phone_home_url: String,
}

pub struct Packet {
    base_url: String,
}

impl Packet {
    pub fn new() -> Self {
        Self {
            base_url: METADATA_BASE_URL.to_string(),
        }
    }

    /// Create with a custom base URL (for testing)
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
        }
    }

    async fn phone_home_url(&self) -> Result<String, IgnitionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let metadata: Metadata = client
            .get(format!("{}/metadata", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(metadata.phone_home_url)
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for Packet {
    fn name(&self) -> &'static str {
        "packet"
    }

    async fn fetch_config(&self, fetcher: &mut Fetcher) -> Result<Vec<u8>, IgnitionError> {
        let url = format!("{}/userdata", self.base_url);
        let opts = FetchOptions {
            headers: config_headers(),
            ..Default::default()
        };
        match fetcher.fetch_to_buffer(&url, opts).await {
            Ok(raw) => Ok(raw),
            Err(IgnitionError::NotFound) => {
                debug!("no userdata available");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn post_status(
        &self,
        stage: &str,
        _fetcher: &Fetcher,
        result: Result<(), &IgnitionError>,
    ) -> Result<(), IgnitionError> {
        let phone_home_url = self.phone_home_url().await?;
        let event = match result {
            Ok(()) => json!({
                "type": "provisioning.104",
                "body": format!("ignition stage {stage} succeeded"),
            }),
            Err(e) => json!({
                "type": "provisioning.104.01",
                "body": format!("ignition stage {stage} failed: {e}"),
            }),
        };
        debug!("posting status for stage {:?} to {:?}", stage, phone_home_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let response = client
            .post(format!("{phone_home_url}/events"))
            .json(&event)
            .send()
            .await?;
        if !response.status().is_success() {
            warn!("status post returned {}", response.status());
            return Err(IgnitionError::provider(format!(
                "status post returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
