//! Disks stage
//!
//! Partitions disks and creates filesystems. Work on a single device is
//! strictly ordered (wait, probe, reconcile, format-or-skip); ordering
//! across devices is unspecified.

pub mod filesystems;

use async_trait::async_trait;
use tracing::info;

use super::{Stage, StageContext};
use crate::config::{Config, Disk};
use crate::distro;
use crate::error::IgnitionError;
use crate::util::{device, log_op, run_cmd};

pub struct DisksStage;

#[async_trait]
impl Stage for DisksStage {
    fn name(&self) -> &'static str {
        "disks"
    }

    async fn run(
        &self,
        ctx: &mut StageContext<'_>,
        config: &Config,
    ) -> Result<(), IgnitionError> {
        create_partitions(ctx, config).await?;
        filesystems::create_filesystems(ctx, config).await?;
        Ok(())
    }
}

async fn create_partitions(
    ctx: &mut StageContext<'_>,
    config: &Config,
) -> Result<(), IgnitionError> {
    if config.storage.disks.is_empty() {
        return Ok(());
    }

    let devices: Vec<String> = config
        .storage
        .disks
        .iter()
        .map(|d| d.device.clone())
        .collect();
    device::wait_on_devices_and_create_aliases(&devices, "disks", ctx.fetcher.timeout()).await?;

    for disk in &config.storage.disks {
        log_op(
            format!("partitioning {:?}", disk.device),
            partition_disk(disk),
        )
        .await?;
    }
    Ok(())
}

async fn partition_disk(disk: &Disk) -> Result<(), IgnitionError> {
    let mut args = sgdisk_args(disk);
    if args.is_empty() {
        info!("disk {:?} has no partition operations", disk.device);
        return Ok(());
    }
    let alias = device::device_alias(&disk.device);
    args.push(alias.to_string_lossy().into_owned());
    run_cmd(distro::SGDISK_CMD, &args).await?;
    Ok(())
}

/// Build the single sgdisk invocation applying every operation on a disk.
fn sgdisk_args(disk: &Disk) -> Vec<String> {
    let mut args = Vec::new();
    if disk.wipe_table {
        args.push("--zap-all".to_string());
    }
    for part in &disk.partitions {
        let start = part
            .start_mib
            .map(|s| format!("{s}M"))
            .unwrap_or_else(|| "0".to_string());
        let size = part
            .size_mib
            .map(|s| format!("+{s}M"))
            .unwrap_or_else(|| "0".to_string());
        args.push(format!("--new={}:{}:{}", part.number, start, size));
        if let Some(label) = &part.label {
            args.push(format!("--change-name={}:{}", part.number, label));
        }
        if let Some(type_guid) = &part.type_guid {
            args.push(format!("--typecode={}:{}", part.number, type_guid));
        }
        if let Some(guid) = &part.guid {
            args.push(format!("--partition-guid={}:{}", part.number, guid));
        }
    }
    args
}
