//! Filesystem node helpers: paths under the provisioning root, ownership,
//! permissions, and SELinux relabeling

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::{chown, Gid, Uid};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::{NodeGroup, NodeUser};
use crate::distro;
use crate::error::IgnitionError;
use crate::util::run_cmd;

/// Join an absolute configured path beneath the provisioning root.
pub fn join_under_root(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

/// Apply mode and ownership to an existing node. `follow` controls
/// whether a symlink itself or its target is modified.
pub async fn apply_node_attrs(
    path: &Path,
    mode: Option<u32>,
    user: Option<&NodeUser>,
    group: Option<&NodeGroup>,
    follow: bool,
) -> Result<(), IgnitionError> {
    if let Some(mode) = mode {
        debug!("setting mode {:o} on {:?}", mode, path);
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    }

    let uid = user.and_then(|u| u.id);
    let gid = group.and_then(|g| g.id);
    if uid.is_some() || gid.is_some() {
        debug!("setting ownership {:?}:{:?} on {:?}", uid, gid, path);
        if follow {
            chown(path, uid.map(Uid::from_raw), gid.map(Gid::from_raw))
                .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
        } else {
            std::os::unix::fs::lchown(path, uid, gid)?;
        }
    }
    Ok(())
}

/// Restore the SELinux context of `path` recursively. Best-effort: hosts
/// without SELinux tooling provision cleanly, so failure is logged only.
pub async fn relabel(path: &Path) {
    let args = vec!["-R".to_string(), path.to_string_lossy().into_owned()];
    if let Err(e) = run_cmd(distro::RESTORECON_CMD, &args).await {
        warn!("failed to relabel {:?}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_under_root() {
        let root = Path::new("/sysroot");
        assert_eq!(
            join_under_root(root, "/etc/hostname"),
            PathBuf::from("/sysroot/etc/hostname")
        );
        assert_eq!(
            join_under_root(root, "etc/hostname"),
            PathBuf::from("/sysroot/etc/hostname")
        );
    }

    #[tokio::test]
    async fn test_apply_mode() {
        let file = tempfile::NamedTempFile::new().unwrap();
        apply_node_attrs(file.path(), Some(0o600), None, None, true)
            .await
            .unwrap();
        let meta = std::fs::metadata(file.path()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o600);
    }
}
