//! OEM backend
//!
//! `oem:` URLs name files provided by the platform vendor. The lookaside
//! directory is checked first; on a miss the OEM partition is mounted
//! (ext4, falling back to btrfs) and read directly. The mount is shared
//! for the rest of the run and released when the fetcher goes away.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::mount::MsFlags;
use tokio::fs;
use tracing::{error, info, warn};
use url::Url;

use crate::distro;
use crate::error::IgnitionError;
use crate::fetch::Fetcher;
use crate::util::device;

/// A mounted OEM partition. Unmounted and removed on drop; an unmount
/// failure at that point is logged and not escalated.
pub struct OemMount {
    mount_path: PathBuf,
}

impl OemMount {
    pub async fn new(timeout: Duration) -> Result<Self, IgnitionError> {
        device::wait_on_device(distro::OEM_DEVICE_PATH, "oem", timeout).await?;

        let mount_path =
            Path::new(distro::OEM_MOUNT_BASE).join(format!("oem-{}", std::process::id()));
        fs::create_dir_all(&mount_path).await?;

        info!(
            "mounting {:?} at {:?}",
            distro::OEM_DEVICE_PATH,
            mount_path
        );
        if let Err(ext4_err) = nix::mount::mount(
            Some(distro::OEM_DEVICE_PATH),
            &mount_path,
            Some("ext4"),
            MsFlags::empty(),
            None::<&str>,
        ) {
            warn!(
                "failed to mount ext4 device {:?}, trying btrfs: {}",
                distro::OEM_DEVICE_PATH,
                ext4_err
            );
            if let Err(btrfs_err) = nix::mount::mount(
                Some(distro::OEM_DEVICE_PATH),
                &mount_path,
                Some("btrfs"),
                MsFlags::empty(),
                None::<&str>,
            ) {
                let _ = std::fs::remove_dir(&mount_path);
                return Err(IgnitionError::failed(format!(
                    "failed to mount btrfs device {:?} at {:?}: {}",
                    distro::OEM_DEVICE_PATH,
                    mount_path,
                    btrfs_err
                )));
            }
        }
        Ok(Self { mount_path })
    }

    pub fn path(&self) -> &Path {
        &self.mount_path
    }
}

impl Drop for OemMount {
    fn drop(&mut self) {
        info!("unmounting {:?}", self.mount_path);
        if let Err(e) = nix::mount::umount(&self.mount_path) {
            warn!("failed to unmount {:?}: {}", self.mount_path, e);
            return;
        }
        if let Err(e) = std::fs::remove_dir(&self.mount_path) {
            warn!("failed to remove {:?}: {}", self.mount_path, e);
        }
    }
}

/// Open the file an `oem:` URL names, from the lookaside directory or
/// the mounted OEM partition.
pub(crate) async fn open(fetcher: &mut Fetcher, url: &Url) -> Result<fs::File, IgnitionError> {
    let path = url.path().to_string();
    if !path.starts_with('/') {
        error!("oem path is not absolute: {:?}", path);
        return Err(IgnitionError::PathNotAbsolute(path));
    }
    let relative = path.trim_start_matches('/');

    let lookaside = Path::new(distro::OEM_LOOKASIDE_DIR).join(relative);
    match fs::File::open(&lookaside).await {
        Ok(file) => return Ok(file),
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            error!("failed to read oem config: {}", e);
            return Err(IgnitionError::failed("unable to read oem config"));
        }
        Err(_) => {}
    }

    info!(
        "oem config not found in {:?}, looking on oem partition",
        distro::OEM_LOOKASIDE_DIR
    );

    let timeout = fetcher.timeout();
    let slot = fetcher.oem_mount();
    if slot.is_none() {
        let mount = OemMount::new(timeout).await.map_err(|e| {
            error!("failed to mount oem partition: {}", e);
            IgnitionError::failed("unable to mount oem partition")
        })?;
        *slot = Some(mount);
    }
    let mounted = slot
        .as_ref()
        .map(|m| m.path().join(relative))
        .ok_or_else(|| IgnitionError::failed("oem partition not mounted"))?;

    fs::File::open(&mounted).await.map_err(|e| {
        error!("failed to read oem config: {}", e);
        IgnitionError::failed("unable to read oem config")
    })
}
