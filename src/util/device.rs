//! Device waiting and per-run aliasing
//!
//! Provisioning races udev: a device named in the config may not exist
//! yet when its stage runs. Each named device is polled until it exists
//! and can be opened, then exposed under a stable per-run alias path so
//! later mkfs/mount invocations are insulated from renames.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tracing::{debug, info};

use crate::distro;
use crate::error::IgnitionError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The alias path for a device. The alias embeds the configured device
/// path, so two different devices can never share an alias within a run.
pub fn device_alias(device: &str) -> PathBuf {
    Path::new(distro::DEV_ALIAS_DIR).join(device.trim_start_matches('/'))
}

/// Block until `device` exists and is openable.
pub async fn wait_on_device(
    device: &str,
    context: &str,
    timeout: Duration,
) -> Result<(), IgnitionError> {
    let wait = async {
        loop {
            if fs::File::open(device).await.is_ok() {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| IgnitionError::Timeout(format!("device {device} ({context})")))?;
    debug!("device {:?} is ready ({})", device, context);
    Ok(())
}

/// Create the per-run alias for `device`, pointing at its resolved path.
/// A stale alias from an earlier wait in the same run is replaced only if
/// it points at the same physical device.
pub async fn create_device_alias(device: &str) -> Result<PathBuf, IgnitionError> {
    let target = fs::canonicalize(device).await?;
    let alias = device_alias(device);
    if let Some(parent) = alias.parent() {
        fs::create_dir_all(parent).await?;
    }
    match fs::read_link(&alias).await {
        Ok(existing) if existing == target => return Ok(alias),
        Ok(_) => {
            fs::remove_file(&alias).await?;
        }
        Err(_) => {}
    }
    fs::symlink(&target, &alias).await?;
    info!("created device alias {:?} -> {:?}", alias, target);
    Ok(alias)
}

/// Wait for every device in `devices` and create an alias for each.
pub async fn wait_on_devices_and_create_aliases(
    devices: &[String],
    context: &str,
    timeout: Duration,
) -> Result<(), IgnitionError> {
    for device in devices {
        wait_on_device(device, context, timeout).await?;
        create_device_alias(device).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_alias_embeds_path() {
        let alias = device_alias("/dev/disk/by-label/ROOT");
        assert_eq!(
            alias,
            Path::new(distro::DEV_ALIAS_DIR).join("dev/disk/by-label/ROOT")
        );
        assert_ne!(alias, device_alias("/dev/disk/by-label/OEM"));
    }

    #[tokio::test]
    async fn test_wait_on_device_times_out() {
        let err = wait_on_device(
            "/nonexistent/device/path",
            "test",
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IgnitionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_wait_on_existing_path() {
        // Any openable path satisfies the wait; a regular file will do.
        let file = tempfile::NamedTempFile::new().unwrap();
        wait_on_device(
            file.path().to_str().unwrap(),
            "test",
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    }
}
