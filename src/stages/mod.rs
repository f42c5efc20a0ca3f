//! Provisioning stages
//!
//! Provisioning is split into three stages run as separate invocations:
//! `fetch` (force early config acquisition, before the network config it
//! may carry is needed), then `disks` (partition and format), then
//! `files` (materialize files and units). The ordering between
//! invocations is enforced by the init system's unit dependencies; each
//! run executes exactly one stage.

pub mod disks;
pub mod fetch;
pub mod files;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::IgnitionError;
use crate::fetch::Fetcher;

/// Per-run state handed to a stage.
pub struct StageContext<'a> {
    /// Root of the filesystem being provisioned.
    pub root: &'a Path,
    pub fetcher: &'a mut Fetcher,
}

/// Trait for provisioning stages.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name of this stage (e.g. "disks")
    fn name(&self) -> &'static str;

    /// Bring the system into the state the config describes for this
    /// stage's slice of the work.
    async fn run(
        &self,
        ctx: &mut StageContext<'_>,
        config: &Config,
    ) -> Result<(), IgnitionError>;
}

/// The immutable stage registry, built once at startup.
pub type StageRegistry = BTreeMap<&'static str, Box<dyn Stage>>;

/// Build the registry of known stages.
pub fn registry() -> StageRegistry {
    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(fetch::FetchStage),
        Box::new(disks::DisksStage),
        Box::new(files::FilesStage),
    ];
    stages.into_iter().map(|s| (s.name(), s)).collect()
}

/// The stage names, for CLI help and validation.
pub fn names(registry: &StageRegistry) -> Vec<&'static str> {
    registry.keys().copied().collect()
}
