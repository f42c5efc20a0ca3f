//! EC2 provider
//!
//! Fetches the user-data as the provisioning config from the EC2
//! Instance Metadata Service, and seeds the fetcher with an S3 region
//! hint derived from the instance's availability zone.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::Provider;
use crate::error::IgnitionError;
use crate::fetch::{config_headers, FetchOptions, Fetcher};

/// EC2 metadata service base URL (link-local address)
const IMDS_BASE_URL: &str = "http://169.254.169.254";

pub struct Ec2 {
    base_url: String,
}

impl Ec2 {
    pub fn new() -> Self {
        Self {
            base_url: IMDS_BASE_URL.to_string(),
        }
    }

    /// Create with a custom base URL (for testing)
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
        }
    }

    async fn availability_zone(&self) -> Option<String> {
        let url = format!(
            "{}/latest/meta-data/placement/availability-zone",
            self.base_url
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .ok()?;
        let response = client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }
}

impl Default for Ec2 {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for Ec2 {
    fn name(&self) -> &'static str {
        "ec2"
    }

    async fn fetch_config(&self, fetcher: &mut Fetcher) -> Result<Vec<u8>, IgnitionError> {
        let url = format!("{}/latest/user-data", self.base_url);
        let opts = FetchOptions {
            headers: config_headers(),
            ..Default::default()
        };
        match fetcher.fetch_to_buffer(&url, opts).await {
            Ok(raw) => Ok(raw),
            // 404 means the instance has no user-data configured
            Err(IgnitionError::NotFound) => {
                debug!("no user-data available");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn new_fetcher(&self, timeout: Duration) -> Result<Fetcher, IgnitionError> {
        let mut fetcher = Fetcher::new(timeout);
        match self.availability_zone().await {
            // Region is the AZ minus the trailing zone letter
            // (e.g. us-east-1a -> us-east-1)
            Some(az) if az.len() > 1 => {
                let region = az[..az.len() - 1].to_string();
                debug!("using S3 region hint {:?}", region);
                fetcher.s3_region_hint = Some(region);
            }
            _ => warn!("could not determine availability zone"),
        }
        Ok(fetcher)
    }
}
