//! OpenStack provider
//!
//! Looks for the config on an attached config-drive first, then asks the
//! metadata service.

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use super::Provider;
use crate::error::IgnitionError;
use crate::fetch::{config_headers, FetchOptions, Fetcher};

/// OpenStack metadata service user-data URL (link-local address)
const METADATA_USERDATA_URL: &str = "http://169.254.169.254/openstack/latest/user_data";

/// Config-drive mount locations to check
const CONFIG_DRIVE_PATHS: &[&str] = &["/media/configdrive", "/mnt/config", "/config-2"];

const CONFIG_DRIVE_USERDATA: &str = "openstack/latest/user_data";

pub struct OpenStack {
    metadata_url: String,
}

impl OpenStack {
    pub fn new() -> Self {
        Self {
            metadata_url: METADATA_USERDATA_URL.to_string(),
        }
    }

    /// Create with a custom metadata URL (for testing)
    pub fn with_metadata_url(url: &str) -> Self {
        Self {
            metadata_url: url.to_string(),
        }
    }

    async fn read_config_drive() -> Option<Vec<u8>> {
        for base in CONFIG_DRIVE_PATHS {
            let path = std::path::Path::new(base).join(CONFIG_DRIVE_USERDATA);
            if let Ok(raw) = fs::read(&path).await {
                info!("reading config from config-drive at {:?}", path);
                return Some(raw);
            }
        }
        None
    }
}

impl Default for OpenStack {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for OpenStack {
    fn name(&self) -> &'static str {
        "openstack"
    }

    async fn fetch_config(&self, fetcher: &mut Fetcher) -> Result<Vec<u8>, IgnitionError> {
        if let Some(raw) = Self::read_config_drive().await {
            return Ok(raw);
        }
        debug!("no config-drive found, trying the metadata service");
        let opts = FetchOptions {
            headers: config_headers(),
            ..Default::default()
        };
        match fetcher.fetch_to_buffer(&self.metadata_url, opts).await {
            Ok(raw) => Ok(raw),
            Err(IgnitionError::NotFound) => {
                debug!("metadata service has no user_data");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
