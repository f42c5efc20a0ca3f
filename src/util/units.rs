//! systemd unit layout: unit files, dropin directories, preset directives,
//! and masking

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::Unit;
use crate::distro;
use crate::error::IgnitionError;

/// Path of a systemd unit file beneath the provisioning root.
pub fn systemd_unit_path(root: &Path, name: &str) -> PathBuf {
    root.join(distro::SYSTEMD_UNIT_DIR).join(name)
}

/// Path of a networkd unit file beneath the provisioning root.
pub fn networkd_unit_path(root: &Path, name: &str) -> PathBuf {
    root.join(distro::NETWORKD_UNIT_DIR).join(name)
}

/// Dropin directory for a unit: `<unit dir>/<name>.d`.
pub fn dropin_dir(unit_path: &Path) -> PathBuf {
    let mut dir = unit_path.as_os_str().to_owned();
    dir.push(".d");
    PathBuf::from(dir)
}

/// The preset file beneath the provisioning root.
pub fn preset_path(root: &Path) -> PathBuf {
    root.join(distro::PRESET_PATH)
}

async fn append_preset_line(root: &Path, line: String) -> Result<(), IgnitionError> {
    let path = preset_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    // reruns must converge on the same preset contents
    if let Ok(existing) = fs::read_to_string(&path).await {
        if existing.lines().any(|l| l == line.trim_end()) {
            return Ok(());
        }
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Record an enable directive for `unit` in the preset file.
pub async fn enable_unit(root: &Path, unit: &Unit) -> Result<(), IgnitionError> {
    append_preset_line(root, format!("enable {}\n", unit.name)).await
}

/// Record a disable directive for `unit` in the preset file.
pub async fn disable_unit(root: &Path, unit: &Unit) -> Result<(), IgnitionError> {
    append_preset_line(root, format!("disable {}\n", unit.name)).await
}

/// Mask `unit` by symlinking its unit path to /dev/null.
pub async fn mask_unit(root: &Path, unit: &Unit) -> Result<(), IgnitionError> {
    let path = systemd_unit_path(root, &unit.name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    match fs::symlink_metadata(&path).await {
        Ok(_) => fs::remove_file(&path).await?,
        Err(_) => {}
    }
    fs::symlink("/dev/null", &path).await?;
    info!("masked unit {:?}", unit.name);
    Ok(())
}
