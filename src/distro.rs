//! Distribution-specific constants
//!
//! Tool names and well-known paths used when provisioning. These are the
//! seams between the engine and the host it runs on; everything here can
//! be overridden at compile time by editing this module, nothing reads
//! the environment at runtime.

/// Directory holding per-run device aliases.
pub const DEV_ALIAS_DIR: &str = "/run/ignition/dev_aliases";

/// Well-known directory holding platform-provided configuration files,
/// checked before mounting the OEM partition.
pub const OEM_LOOKASIDE_DIR: &str = "/usr/share/oem";

/// The OEM partition device.
pub const OEM_DEVICE_PATH: &str = "/dev/disk/by-label/OEM";

/// Where mountpoints for the OEM partition are created.
pub const OEM_MOUNT_BASE: &str = "/mnt";

/// systemd unit directory, relative to the root being provisioned.
pub const SYSTEMD_UNIT_DIR: &str = "etc/systemd/system";

/// systemd-networkd unit directory, relative to the root being provisioned.
pub const NETWORKD_UNIT_DIR: &str = "etc/systemd/network";

/// Preset file encoding enable/disable directives, relative to the root.
pub const PRESET_PATH: &str = "etc/systemd/system-preset/20-ignition.preset";

pub const SGDISK_CMD: &str = "sgdisk";
pub const BTRFS_MKFS_CMD: &str = "mkfs.btrfs";
pub const EXT4_MKFS_CMD: &str = "mkfs.ext4";
pub const XFS_MKFS_CMD: &str = "mkfs.xfs";
pub const SWAP_MKFS_CMD: &str = "mkswap";
pub const VFAT_MKFS_CMD: &str = "mkfs.vfat";
pub const LSBLK_CMD: &str = "lsblk";
pub const RESTORECON_CMD: &str = "restorecon";
