//! Files stage
//!
//! Materializes the configured filesystem nodes under the provisioning
//! root: directories first so parents exist, then regular files, then
//! links, then systemd and networkd units.

pub mod units;

use async_trait::async_trait;
use tokio::fs;

use super::{Stage, StageContext};
use crate::config::{Config, Directory, File, Link};
use crate::error::IgnitionError;
use crate::fetch::FetchOptions;
use crate::util::files::{apply_node_attrs, join_under_root, relabel};
use crate::util::log_op;

/// Mode applied to files and directories that don't specify one.
const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

pub struct FilesStage;

#[async_trait]
impl Stage for FilesStage {
    fn name(&self) -> &'static str {
        "files"
    }

    async fn run(
        &self,
        ctx: &mut StageContext<'_>,
        config: &Config,
    ) -> Result<(), IgnitionError> {
        for dir in &config.storage.directories {
            log_op(
                format!("creating directory {:?}", dir.path),
                create_directory(ctx, dir),
            )
            .await?;
        }
        for file in &config.storage.files {
            log_op(format!("writing file {:?}", file.path), write_file(ctx, file)).await?;
        }
        for link in &config.storage.links {
            log_op(format!("creating link {:?}", link.path), create_link(ctx, link)).await?;
        }
        units::create_units(ctx, config).await?;
        Ok(())
    }
}

async fn create_directory(
    ctx: &mut StageContext<'_>,
    dir: &Directory,
) -> Result<(), IgnitionError> {
    let path = join_under_root(ctx.root, &dir.path);
    fs::create_dir_all(&path).await?;
    apply_node_attrs(
        &path,
        Some(dir.mode.unwrap_or(DEFAULT_DIR_MODE)),
        dir.user.as_ref(),
        dir.group.as_ref(),
        true,
    )
    .await?;
    relabel(&path).await;
    Ok(())
}

/// Fetch a file's contents into a temporary file beside its destination,
/// apply its attributes, then atomically rename it into place.
async fn write_file(ctx: &mut StageContext<'_>, file: &File) -> Result<(), IgnitionError> {
    let final_path = join_under_root(ctx.root, &file.path);
    let parent = final_path
        .parent()
        .ok_or_else(|| IgnitionError::PathNotAbsolute(file.path.clone()))?
        .to_path_buf();
    fs::create_dir_all(&parent).await?;

    let opts = FetchOptions::for_resource(&file.contents)?;
    let tmp = tempfile::NamedTempFile::new_in(&parent)?;
    let mut dest = fs::File::from_std(tmp.reopen()?);
    ctx.fetcher.fetch(&file.contents.source, &mut dest, opts).await?;
    drop(dest);

    apply_node_attrs(
        tmp.path(),
        Some(file.mode.unwrap_or(DEFAULT_FILE_MODE)),
        file.user.as_ref(),
        file.group.as_ref(),
        true,
    )
    .await?;

    tmp.persist(&final_path).map_err(|e| e.error)?;
    relabel(&final_path).await;
    Ok(())
}

async fn create_link(ctx: &mut StageContext<'_>, link: &Link) -> Result<(), IgnitionError> {
    let path = join_under_root(ctx.root, &link.path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    // replace any node left by an earlier run so reruns converge
    if fs::symlink_metadata(&path).await.is_ok() {
        fs::remove_file(&path).await?;
    }

    if link.hard {
        let target = join_under_root(ctx.root, &link.target);
        fs::hard_link(&target, &path).await?;
    } else {
        // the target is used verbatim and need not exist
        fs::symlink(&link.target, &path).await?;
    }
    apply_node_attrs(&path, None, link.user.as_ref(), link.group.as_ref(), false).await?;
    relabel(&path).await;
    Ok(())
}
