//! Configuration providers
//!
//! A provider is a named strategy for obtaining the raw configuration
//! bytes for a specific platform. Each one can also customize how the
//! run's fetcher is built and report status back to the platform after a
//! stage completes.

pub mod ec2;
pub mod file;
pub mod noop;
pub mod openstack;
pub mod packet;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::IgnitionError;
use crate::fetch::Fetcher;

/// Trait for platform configuration providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name of this provider (e.g. "ec2", "packet")
    fn name(&self) -> &'static str;

    /// Fetch the raw configuration bytes for this platform. An empty
    /// result means the platform has no configuration to apply.
    async fn fetch_config(&self, fetcher: &mut Fetcher) -> Result<Vec<u8>, IgnitionError>;

    /// Build the fetcher for the run. The default is a bare fetcher;
    /// providers override this to pre-seed platform specifics such as a
    /// region hint.
    async fn new_fetcher(&self, timeout: Duration) -> Result<Fetcher, IgnitionError> {
        Ok(Fetcher::new(timeout))
    }

    /// Report the outcome of a stage back to the platform. Most
    /// platforms have nowhere to report to.
    async fn post_status(
        &self,
        _stage: &str,
        _fetcher: &Fetcher,
        _result: Result<(), &IgnitionError>,
    ) -> Result<(), IgnitionError> {
        Ok(())
    }
}

/// The immutable provider registry, built once at startup.
pub type ProviderRegistry = BTreeMap<&'static str, Box<dyn Provider>>;

/// Build the registry of known providers.
pub fn registry() -> ProviderRegistry {
    let providers: Vec<Box<dyn Provider>> = vec![
        Box::new(ec2::Ec2::new()),
        Box::new(openstack::OpenStack::new()),
        Box::new(packet::Packet::new()),
        Box::new(file::FileProvider::default()),
        Box::new(noop::Noop::new("pxe")),
        Box::new(noop::Noop::new("metal")),
    ];
    providers.into_iter().map(|p| (p.name(), p)).collect()
}

/// The provider names, for CLI help and validation.
pub fn names(registry: &ProviderRegistry) -> Vec<&'static str> {
    registry.keys().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contents() {
        let registry = registry();
        for name in ["ec2", "openstack", "packet", "file", "pxe", "metal"] {
            assert!(registry.contains_key(name), "missing provider {name}");
        }
        assert_eq!(names(&registry).len(), registry.len());
    }

    #[tokio::test]
    async fn test_default_fetcher_is_bare() {
        let registry = registry();
        let provider = registry.get("metal").unwrap();
        let fetcher = provider
            .new_fetcher(Duration::from_secs(1))
            .await
            .unwrap();
        assert!(fetcher.s3_region_hint.is_none());
    }
}
