//! Configuration tree parsing and types
//!
//! The declarative configuration consumed by the stages. The schema
//! validation and version-to-version translation live outside this crate;
//! what arrives here is a normalized JSON document, deserialized verbatim.

use serde::{Deserialize, Serialize};

use crate::error::IgnitionError;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub ignition: Ignition,
    pub storage: Storage,
    pub systemd: Systemd,
    pub networkd: Networkd,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Ignition {
    pub version: Option<String>,
    pub security: Security,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Security {
    pub tls: Tls,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Tls {
    /// URLs whose bytes are additional trust roots for subsequent HTTPS
    /// fetches.
    pub certificate_authorities: Vec<Resource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Storage {
    pub disks: Vec<Disk>,
    pub filesystems: Vec<Filesystem>,
    pub files: Vec<File>,
    pub directories: Vec<Directory>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Disk {
    pub device: String,
    pub wipe_table: bool,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Partition {
    pub number: u32,
    pub label: Option<String>,
    pub size_mib: Option<u64>,
    pub start_mib: Option<u64>,
    pub type_guid: Option<String>,
    pub guid: Option<String>,
}

/// A filesystem entry. Only the `mount` sub-record drives work; entries
/// without one are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Filesystem {
    pub mount: Option<Mount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Mount {
    pub device: String,
    pub format: String,
    pub label: Option<String>,
    pub uuid: Option<String>,
    pub wipe_filesystem: bool,
    pub options: Vec<String>,
    pub create: Option<Create>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Create {
    pub force: bool,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct File {
    pub path: String,
    pub mode: Option<u32>,
    pub user: Option<NodeUser>,
    pub group: Option<NodeGroup>,
    pub contents: Resource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Directory {
    pub path: String,
    pub mode: Option<u32>,
    pub user: Option<NodeUser>,
    pub group: Option<NodeGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Link {
    pub path: String,
    pub target: String,
    pub hard: bool,
    pub user: Option<NodeUser>,
    pub group: Option<NodeGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeUser {
    pub id: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeGroup {
    pub id: Option<u32>,
}

/// A fetchable resource: a source URL plus how to verify and decode it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Resource {
    pub source: String,
    pub compression: Option<String>,
    pub verification: Verification,
    pub http_headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Verification {
    /// `<algorithm>-<hex digest>`, e.g. `sha512-ab12...`
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Systemd {
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Unit {
    pub name: String,
    #[serde(default)]
    pub contents: String,
    /// Deprecated; superseded by `enabled` when that is present.
    pub enable: bool,
    pub enabled: Option<bool>,
    pub mask: bool,
    pub dropins: Vec<Dropin>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Dropin {
    pub name: String,
    #[serde(default)]
    pub contents: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Networkd {
    pub units: Vec<NetworkdUnit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkdUnit {
    pub name: String,
    #[serde(default)]
    pub contents: String,
    pub dropins: Vec<Dropin>,
}

impl Config {
    /// Parse a configuration from raw JSON bytes. Empty input yields an
    /// empty configuration (a provider with nothing to say).
    pub fn parse(raw: &[u8]) -> Result<Self, IgnitionError> {
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_storage_config() {
        let raw = br#"{
            "ignition": { "version": "2.2.0" },
            "storage": {
                "filesystems": [{
                    "mount": {
                        "device": "/dev/disk/by-label/ROOT",
                        "format": "ext4",
                        "label": "ROOT",
                        "wipeFilesystem": true
                    }
                }],
                "files": [{
                    "path": "/foo/bar",
                    "mode": 420,
                    "contents": { "source": "data:,hello" }
                }]
            }
        }"#;
        let config = Config::parse(raw).unwrap();
        assert_eq!(config.ignition.version.as_deref(), Some("2.2.0"));
        let mount = config.storage.filesystems[0].mount.as_ref().unwrap();
        assert_eq!(mount.format, "ext4");
        assert!(mount.wipe_filesystem);
        assert_eq!(config.storage.files[0].mode, Some(420));
    }

    #[test]
    fn test_parse_units() {
        let raw = br#"{
            "systemd": {
                "units": [{
                    "name": "example.service",
                    "enable": true,
                    "enabled": false,
                    "dropins": [{ "name": "debug.conf", "contents": "[Service]\n" }]
                }]
            },
            "networkd": {
                "units": [{ "name": "00-eth0.network", "contents": "[Match]\nName=eth0\n" }]
            }
        }"#;
        let config = Config::parse(raw).unwrap();
        let unit = &config.systemd.units[0];
        assert!(unit.enable);
        assert_eq!(unit.enabled, Some(false));
        assert!(unit.contents.is_empty());
        assert_eq!(unit.dropins.len(), 1);
        assert_eq!(config.networkd.units[0].name, "00-eth0.network");
    }

    #[test]
    fn test_parse_empty_input() {
        let config = Config::parse(b"").unwrap();
        assert!(config.storage.files.is_empty());
        let config = Config::parse(b"  \n").unwrap();
        assert!(config.systemd.units.is_empty());
    }
}
