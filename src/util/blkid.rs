//! Filesystem probing via lsblk
//!
//! The probe shells out to `lsblk` in JSON mode and deserializes the
//! single-device answer, so the reconcile logic always works from fresh
//! kernel state rather than anything cached in-process.

use serde::Deserialize;
use tracing::info;

use crate::distro;
use crate::error::IgnitionError;
use crate::util::run_cmd;

/// Observed filesystem attributes of a block device. Fields are empty
/// strings when the device carries no filesystem signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesystemInfo {
    pub format: String,
    pub uuid: String,
    pub label: String,
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    fstype: Option<String>,
    uuid: Option<String>,
    label: Option<String>,
}

/// Probe the filesystem type, UUID, and label of `device`.
pub async fn filesystem_info(device: &str) -> Result<FilesystemInfo, IgnitionError> {
    let args = vec![
        "-J".to_string(),
        "--nodeps".to_string(),
        "-o".to_string(),
        "FSTYPE,UUID,LABEL".to_string(),
        device.to_string(),
    ];
    let raw = run_cmd(distro::LSBLK_CMD, &args).await?;
    let parsed: LsblkOutput = serde_json::from_str(&raw)?;
    let dev = parsed
        .blockdevices
        .into_iter()
        .next()
        .ok_or_else(|| IgnitionError::failed(format!("no lsblk output for {device}")))?;

    let info = FilesystemInfo {
        format: dev.fstype.unwrap_or_default(),
        uuid: dev.uuid.unwrap_or_default(),
        label: dev.label.unwrap_or_default(),
    };
    info!(
        "found {:?} filesystem at {:?} with uuid {:?} and label {:?}",
        info.format, device, info.uuid, info.label
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lsblk_output() {
        let raw = r#"{
            "blockdevices": [
                {"fstype": "ext4", "uuid": "fefe-1234", "label": "DATA"}
            ]
        }"#;
        let parsed: LsblkOutput = serde_json::from_str(raw).unwrap();
        let dev = &parsed.blockdevices[0];
        assert_eq!(dev.fstype.as_deref(), Some("ext4"));
        assert_eq!(dev.label.as_deref(), Some("DATA"));
    }

    #[test]
    fn test_parse_lsblk_blank_device() {
        let raw = r#"{"blockdevices": [{"fstype": null, "uuid": null, "label": null}]}"#;
        let parsed: LsblkOutput = serde_json::from_str(raw).unwrap();
        assert!(parsed.blockdevices[0].fstype.is_none());
    }
}
