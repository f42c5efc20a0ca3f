//! Run engine
//!
//! One invocation runs one stage for one provider. The engine owns the
//! per-run state, acquires the config (from the on-disk cache when a
//! previous stage already fetched it, otherwise from the provider), and
//! dispatches to the stage.

use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::IgnitionError;
use crate::fetch::Fetcher;
use crate::providers::Provider;
use crate::stages::{StageContext, StageRegistry};
use crate::util::log_op;

pub struct Engine<'a> {
    /// Root of the filesystem being provisioned.
    pub root: PathBuf,
    /// Where the config is cached between stages.
    pub config_cache: PathBuf,
    pub provider: &'a dyn Provider,
    pub fetcher: Fetcher,
    pub stages: &'a StageRegistry,
}

impl<'a> Engine<'a> {
    /// Run the named stage to completion.
    pub async fn run(&mut self, stage_name: &str) -> Result<(), IgnitionError> {
        let stage = self
            .stages
            .get(stage_name)
            .ok_or_else(|| IgnitionError::stage(stage_name, "unknown stage"))?;

        let config = self.acquire_config().await?;

        info!("running stage {:?}", stage_name);
        let mut ctx = StageContext {
            root: &self.root,
            fetcher: &mut self.fetcher,
        };
        log_op(format!("stage {stage_name}"), stage.run(&mut ctx, &config)).await
    }

    /// Obtain the config: from the cache written by an earlier stage, or
    /// freshly from the provider, caching the normalized rendering for
    /// the stages that follow. Either way the config's certificate
    /// authorities are folded into this run's fetcher.
    async fn acquire_config(&mut self) -> Result<Config, IgnitionError> {
        match fs::read(&self.config_cache).await {
            Ok(raw) => {
                debug!("reading config from cache at {:?}", self.config_cache);
                let config = Config::parse(&raw)?;
                self.fetcher.update_authorities(&config).await?;
                return Ok(config);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let raw = log_op(
            "fetching config",
            self.provider.fetch_config(&mut self.fetcher),
        )
        .await?;
        let config = Config::parse(&raw)?;
        self.fetcher.update_authorities(&config).await?;

        if let Some(parent) = self.config_cache.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.config_cache, serde_json::to_vec(&config)?).await?;
        debug!("cached config at {:?}", self.config_cache);
        Ok(config)
    }
}
