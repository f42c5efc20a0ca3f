//! Filesystem creation
//!
//! For each configured filesystem the observed state of the device is
//! reconciled against the desired state before anything destructive
//! happens: format, skip, or fail. Filesystems are processed by a worker
//! pool bounded by the host's parallelism, and per-filesystem errors are
//! aggregated rather than short-circuiting their peers.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::{Config, Mount};
use crate::distro;
use crate::error::IgnitionError;
use crate::stages::StageContext;
use crate::util::blkid::{self, FilesystemInfo};
use crate::util::{device, log_op, run_cmd};

/// The action the reconcile policy selected for one filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemAction {
    Format,
    Skip,
}

pub(super) async fn create_filesystems(
    ctx: &mut StageContext<'_>,
    config: &Config,
) -> Result<(), IgnitionError> {
    let mounts: Vec<Mount> = config
        .storage
        .filesystems
        .iter()
        .filter_map(|fs| fs.mount.clone())
        .collect();
    if mounts.is_empty() {
        return Ok(());
    }

    let devices: Vec<String> = mounts.iter().map(|m| m.device.clone()).collect();
    device::wait_on_devices_and_create_aliases(&devices, "filesystems", ctx.fetcher.timeout())
        .await?;

    // Create filesystems concurrently, up to one worker per hardware
    // thread. Workers share no state; results flow back through the set.
    let concurrency = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut workers = JoinSet::new();
    for mount in mounts {
        let semaphore = Arc::clone(&semaphore);
        workers.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            create_filesystem(&mount)
                .await
                .map_err(|e| format!("{}: {}", mount.device, e))
        });
    }

    let mut errors = Vec::new();
    while let Some(result) = workers.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(message)) => errors.push(message),
            Err(e) => errors.push(format!("filesystem worker failed: {e}")),
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(IgnitionError::Filesystems(errors.join("\n")))
    }
}

async fn create_filesystem(mount: &Mount) -> Result<(), IgnitionError> {
    let info = log_op(
        format!("determining filesystem type of {:?}", mount.device),
        blkid::filesystem_info(&mount.device),
    )
    .await?;

    match reconcile(mount, &info)? {
        FilesystemAction::Skip => {
            info!(
                "filesystem at {:?} is already correctly formatted, skipping mkfs",
                mount.device
            );
            Ok(())
        }
        FilesystemAction::Format => {
            let (tool, mut args) = mkfs_argv(mount)?;
            let alias = device::device_alias(&mount.device);
            args.push(alias.to_string_lossy().into_owned());
            log_op(
                format!(
                    "creating {:?} filesystem on {:?}",
                    mount.format, mount.device
                ),
                run_cmd(tool, &args),
            )
            .await?;
            Ok(())
        }
    }
}

/// Decide what to do with a device given its observed filesystem and the
/// desired one. The decision is made before any destructive action.
pub fn reconcile(
    mount: &Mount,
    info: &FilesystemInfo,
) -> Result<FilesystemAction, IgnitionError> {
    if let Some(create) = &mount.create {
        if !create.force && !info.format.is_empty() {
            error!(
                "filesystem detected at {:?} (found {}) and force was not requested",
                mount.device, info.format
            );
            return Err(IgnitionError::BadFilesystem);
        }
        return Ok(FilesystemAction::Format);
    }

    if mount.wipe_filesystem {
        return Ok(FilesystemAction::Format);
    }

    // A filesystem carrying the vendor's OEM label is preserved even
    // when its other attributes disagree with the config.
    let format_matches = info.format == mount.format || info.label == "OEM";
    let label_matches = mount
        .label
        .as_ref()
        .map_or(true, |label| &info.label == label);
    let uuid_matches = mount.uuid.as_ref().map_or(true, |uuid| {
        canonicalize_filesystem_uuid(&info.format, &info.uuid)
            == canonicalize_filesystem_uuid(&mount.format, uuid)
    });
    if format_matches && label_matches && uuid_matches {
        return Ok(FilesystemAction::Skip);
    }
    if !info.format.is_empty() {
        error!(
            "filesystem at {:?} is not of the correct type, label, or UUID \
             (found {}, {:?}, {}) and a filesystem wipe was not requested",
            mount.device, info.format, info.label, info.uuid
        );
        return Err(IgnitionError::BadFilesystem);
    }
    Ok(FilesystemAction::Format)
}

/// Build the formatter invocation for a filesystem. User-provided
/// create-options come first, then the format-specific flags.
pub fn mkfs_argv(mount: &Mount) -> Result<(&'static str, Vec<String>), IgnitionError> {
    let mut args: Vec<String> = match &mount.create {
        Some(create) => create.options.clone(),
        None => mount.options.clone(),
    };
    let uuid = mount
        .uuid
        .as_ref()
        .map(|u| canonicalize_filesystem_uuid(&mount.format, u));

    let tool = match mount.format.as_str() {
        "btrfs" => {
            args.push("--force".to_string());
            if let Some(uuid) = uuid {
                args.push("-U".to_string());
                args.push(uuid);
            }
            if let Some(label) = &mount.label {
                args.push("-L".to_string());
                args.push(label.clone());
            }
            distro::BTRFS_MKFS_CMD
        }
        "ext4" => {
            args.push("-F".to_string());
            if let Some(uuid) = uuid {
                args.push("-U".to_string());
                args.push(uuid);
            }
            if let Some(label) = &mount.label {
                args.push("-L".to_string());
                args.push(label.clone());
            }
            distro::EXT4_MKFS_CMD
        }
        "xfs" => {
            args.push("-f".to_string());
            if let Some(uuid) = uuid {
                args.push("-m".to_string());
                args.push(format!("uuid={uuid}"));
            }
            if let Some(label) = &mount.label {
                args.push("-L".to_string());
                args.push(label.clone());
            }
            distro::XFS_MKFS_CMD
        }
        "swap" => {
            args.push("-f".to_string());
            if let Some(uuid) = uuid {
                args.push("-U".to_string());
                args.push(uuid);
            }
            if let Some(label) = &mount.label {
                args.push("-L".to_string());
                args.push(label.clone());
            }
            distro::SWAP_MKFS_CMD
        }
        "vfat" => {
            // mkfs.vfat has no force flag; it always destroys whatever
            // is on the device.
            if let Some(uuid) = uuid {
                args.push("-i".to_string());
                args.push(uuid);
            }
            if let Some(label) = &mount.label {
                args.push("-n".to_string());
                args.push(label.clone());
            }
            distro::VFAT_MKFS_CMD
        }
        other => return Err(IgnitionError::UnsupportedFormat(other.to_string())),
    };
    Ok((tool, args))
}

/// The minimum canonicalization required to make two valid equivalent
/// UUIDs compare equal; no attempt is made to fully validate them.
pub fn canonicalize_filesystem_uuid(format: &str, uuid: &str) -> String {
    let uuid = uuid.to_lowercase();
    if format == "vfat" {
        // FAT uses a 32-bit volume ID instead of a UUID. Probes format
        // it as A1B2-C3D4 but the formatter rejects the dash, so strip
        // it; configs are accepted in either form.
        if uuid.len() >= 5 && uuid.as_bytes()[4] == b'-' {
            return format!("{}{}", &uuid[..4], &uuid[5..]);
        }
    }
    uuid
}
