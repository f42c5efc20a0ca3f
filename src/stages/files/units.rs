//! systemd and networkd unit creation
//!
//! Writes unit files and their dropins, applies enable/disable/mask
//! directives, and relabels what it wrote. A unit with empty contents is
//! not written, but its dropins still are; the dropin directory is
//! relabeled once per unit.

use std::path::Path;

use tokio::fs;
use tracing::warn;

use crate::config::{Config, NetworkdUnit, Unit};
use crate::error::IgnitionError;
use crate::stages::StageContext;
use crate::util::files::relabel;
use crate::util::{log_op, units};

pub(super) async fn create_units(
    ctx: &mut StageContext<'_>,
    config: &Config,
) -> Result<(), IgnitionError> {
    let mut preset_touched = false;
    for unit in &config.systemd.units {
        write_systemd_unit(ctx.root, unit).await?;

        // `enabled` is authoritative when present; the deprecated
        // `enable` only applies in its absence.
        match unit.enabled {
            Some(true) => {
                log_op(
                    format!("enabling unit {:?}", unit.name),
                    units::enable_unit(ctx.root, unit),
                )
                .await?;
                preset_touched = true;
            }
            Some(false) => {
                log_op(
                    format!("disabling unit {:?}", unit.name),
                    units::disable_unit(ctx.root, unit),
                )
                .await?;
                preset_touched = true;
            }
            None => {
                if unit.enable {
                    warn!("the enable field has been deprecated in favor of enabled");
                    log_op(
                        format!("enabling unit {:?}", unit.name),
                        units::enable_unit(ctx.root, unit),
                    )
                    .await?;
                    preset_touched = true;
                }
            }
        }

        if unit.mask {
            log_op(
                format!("masking unit {:?}", unit.name),
                units::mask_unit(ctx.root, unit),
            )
            .await?;
        }
    }
    // and relabel the preset file itself if we enabled/disabled something
    if preset_touched {
        relabel(&units::preset_path(ctx.root)).await;
    }

    for unit in &config.networkd.units {
        write_networkd_unit(ctx.root, unit).await?;
    }
    Ok(())
}

async fn write_unit_file(path: &Path, contents: &str) -> Result<(), IgnitionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, contents).await?;
    Ok(())
}

async fn write_systemd_unit(root: &Path, unit: &Unit) -> Result<(), IgnitionError> {
    log_op(format!("processing unit {:?}", unit.name), async {
        let unit_path = units::systemd_unit_path(root, &unit.name);

        let mut relabeled_dropin_dir = false;
        for dropin in &unit.dropins {
            if dropin.contents.is_empty() {
                continue;
            }
            let dir = units::dropin_dir(&unit_path);
            let path = dir.join(&dropin.name);
            log_op(
                format!("writing systemd drop-in {:?} at {:?}", dropin.name, path),
                write_unit_file(&path, &dropin.contents),
            )
            .await?;
            if !relabeled_dropin_dir {
                relabel(&dir).await;
                relabeled_dropin_dir = true;
            }
        }

        if unit.contents.is_empty() {
            return Ok(());
        }
        log_op(
            format!("writing unit {:?} at {:?}", unit.name, unit_path),
            write_unit_file(&unit_path, &unit.contents),
        )
        .await?;
        relabel(&unit_path).await;
        Ok(())
    })
    .await
}

async fn write_networkd_unit(root: &Path, unit: &NetworkdUnit) -> Result<(), IgnitionError> {
    log_op(format!("processing unit {:?}", unit.name), async {
        let unit_path = units::networkd_unit_path(root, &unit.name);

        for dropin in &unit.dropins {
            if dropin.contents.is_empty() {
                continue;
            }
            let dir = units::dropin_dir(&unit_path);
            let path = dir.join(&dropin.name);
            log_op(
                format!("writing networkd drop-in {:?} at {:?}", dropin.name, path),
                write_unit_file(&path, &dropin.contents),
            )
            .await?;
            relabel(&path).await;
        }

        if unit.contents.is_empty() {
            return Ok(());
        }
        log_op(
            format!("writing unit {:?} at {:?}", unit.name, unit_path),
            write_unit_file(&unit_path, &unit.contents),
        )
        .await?;
        relabel(&unit_path).await;
        Ok(())
    })
    .await
}
