//! Fetch stage
//!
//! The engine acquires (and caches) the config before dispatching any
//! stage, so by the time this stage runs its work is already done. It
//! exists so the init system can force config acquisition at a precise
//! point in boot, before the stages that consume it.

use async_trait::async_trait;

use super::{Stage, StageContext};
use crate::config::Config;
use crate::error::IgnitionError;

pub struct FetchStage;

#[async_trait]
impl Stage for FetchStage {
    fn name(&self) -> &'static str {
        "fetch"
    }

    async fn run(
        &self,
        _ctx: &mut StageContext<'_>,
        _config: &Config,
    ) -> Result<(), IgnitionError> {
        Ok(())
    }
}
