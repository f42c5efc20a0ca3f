//! File provider
//!
//! Reads the config from a well-known local path. Used for installs
//! where the image was seeded with a config ahead of first boot.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use super::Provider;
use crate::error::IgnitionError;
use crate::fetch::Fetcher;

const DEFAULT_CONFIG_PATH: &str = "/etc/ignition.json";

pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for FileProvider {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }
}

#[async_trait]
impl Provider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn fetch_config(&self, _fetcher: &mut Fetcher) -> Result<Vec<u8>, IgnitionError> {
        match fs::read(&self.path).await {
            Ok(raw) => {
                info!("reading config from {:?}", self.path);
                Ok(raw)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {:?}", self.path);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}
