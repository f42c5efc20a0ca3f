//! No-op provider for platforms with no config source of their own
//! (bare metal, PXE). The config, if any, arrives via other means.

use async_trait::async_trait;

use super::Provider;
use crate::error::IgnitionError;
use crate::fetch::Fetcher;

pub struct Noop {
    name: &'static str,
}

impl Noop {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Provider for Noop {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_config(&self, _fetcher: &mut Fetcher) -> Result<Vec<u8>, IgnitionError> {
        Ok(Vec::new())
    }
}
