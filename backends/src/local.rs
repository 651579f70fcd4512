use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_recursion::async_recursion;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use admission::DEFAULT_BUFFER_SIZE;
use common::config::TransferConfig;
use common::error::{TransferError, TransferResult};
use common::fileinfo::FileInfo;
use common::path::TransferPath;
use common::progress::{Reporter, Stats, Summary};

use crate::strategy::{Strategy, deny_existing, unsupported_path};

/// Per-directory trash folder used by soft deletes.
pub const TRASH_DIR: &str = ".ferry-trash";

/// Local-disk backend. Runs outside admission control entirely: disk
/// concurrency is bounded by the runtime, not by endpoint budgets.
#[derive(Debug, Default)]
pub struct LocalStrategy;

impl LocalStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Permanently empties `dir`'s trash folder and removes it. Returns
    /// the number of parked entries that were purged.
    pub async fn purge_trash(&self, stats: &Stats, dir: &Path) -> Result<u64, TransferError> {
        let trash = dir.join(TRASH_DIR);
        let mut entries = match tokio::fs::read_dir(&trash).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error.into()),
        };
        let mut purged = 0u64;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await?;
            } else {
                tokio::fs::remove_file(entry.path()).await?;
            }
            stats.add_entry_removed();
            purged += 1;
        }
        drop(entries);
        tokio::fs::remove_dir(&trash).await?;
        Ok(purged)
    }
}

#[async_trait::async_trait]
impl Strategy for LocalStrategy {
    #[tracing::instrument(level = "debug", skip(self, stats, config, progress))]
    async fn copy(
        &self,
        stats: &Stats,
        src: &TransferPath,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        let (Some(src_path), Some(dst_path)) = (src.as_local(), dst.as_local()) else {
            return Err(unsupported_path("copy", if src.is_local() { dst } else { src }));
        };
        if src_path == dst_path {
            return Err(TransferError::invalid_operation(format!(
                "source and destination are the same entry: {src}"
            )));
        }
        let metadata = stat_local(src_path).await?;
        if !config.overwrite && tokio::fs::symlink_metadata(dst_path).await.is_ok() {
            return Err(deny_existing(dst));
        }
        let buffer = config.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let summary = if metadata.is_symlink() {
            copy_symlink(src_path, dst_path, config.overwrite).await?
        } else if metadata.is_dir() {
            if dst_path.starts_with(src_path) {
                return Err(TransferError::invalid_operation(format!(
                    "cannot copy {src} into itself"
                )));
            }
            let total = if progress.is_enabled() {
                tree_size(src_path).await?
            } else {
                0
            };
            copy_tree(
                src_path.to_path_buf(),
                dst_path.to_path_buf(),
                config.overwrite,
                buffer,
                total,
                Arc::new(AtomicU64::new(0)),
                progress.clone(),
            )
            .await?
        } else {
            if let Some(parent) = dst_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            copy_one_file(
                src_path.to_path_buf(),
                dst_path.to_path_buf(),
                buffer,
                metadata.len(),
                Arc::new(AtomicU64::new(0)),
                progress.clone(),
            )
            .await?
        };
        stats.absorb(summary);
        Ok(dst.clone())
    }

    #[tracing::instrument(level = "debug", skip(self, stats, config, progress))]
    async fn mv(
        &self,
        stats: &Stats,
        src: &TransferPath,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        let (Some(src_path), Some(dst_path)) = (src.as_local(), dst.as_local()) else {
            return Err(unsupported_path("move", if src.is_local() { dst } else { src }));
        };
        let metadata = stat_local(src_path).await?;
        if !config.overwrite && tokio::fs::symlink_metadata(dst_path).await.is_ok() {
            return Err(deny_existing(dst));
        }
        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::rename(src_path, dst_path).await {
            Ok(()) => {
                let size = if metadata.is_file() { metadata.len() } else { 0 };
                stats.add_file_moved();
                progress.report(size, size);
                Ok(dst.clone())
            }
            Err(error) => {
                // rename cannot cross filesystems; fall back to copy plus
                // permanent source removal
                tracing::debug!(
                    "rename into {} failed ({error}), copying then removing",
                    dst_path.display()
                );
                Strategy::copy(self, stats, src, dst, config, progress).await?;
                remove_entry(src_path, &metadata).await?;
                stats.add_entry_removed();
                stats.add_file_moved();
                Ok(dst.clone())
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, stats))]
    async fn delete(&self, stats: &Stats, path: &TransferPath, permanent: bool) -> TransferResult {
        let Some(local) = path.as_local() else {
            return Err(unsupported_path("delete", path));
        };
        stat_local(local).await?;
        if permanent {
            remove_recursively(local, stats).await?;
            return Ok(path.clone());
        }
        let parent = local.parent().unwrap_or(Path::new("."));
        let trash = parent.join(TRASH_DIR);
        tokio::fs::create_dir_all(&trash).await?;
        let name = local
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "entry".to_string());
        let stamped = format!("{}-{name}", chrono::Local::now().format("%Y%m%dT%H%M%S%3f"));
        let target = trash.join(stamped);
        match tokio::fs::rename(local, &target).await {
            Ok(()) => {
                stats.add_entry_removed();
                Ok(TransferPath::Local(target))
            }
            Err(error) => {
                tracing::warn!(
                    "could not park {} in its trash ({error}), removing permanently",
                    local.display()
                );
                remove_recursively(local, stats).await?;
                Ok(path.clone())
            }
        }
    }

    async fn exists(&self, path: &TransferPath) -> Result<bool, TransferError> {
        let Some(local) = path.as_local() else {
            return Err(unsupported_path("exists", path));
        };
        match tokio::fs::symlink_metadata(local).await {
            Ok(_) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, stats))]
    async fn rename(&self, stats: &Stats, path: &TransferPath, new_name: &str) -> TransferResult {
        if new_name.contains('/') || new_name.is_empty() {
            return Err(TransferError::invalid_operation(format!(
                "{new_name:?} is not a valid entry name"
            )));
        }
        let Some(local) = path.as_local() else {
            return Err(unsupported_path("rename", path));
        };
        stat_local(local).await?;
        let renamed = path.with_name(new_name).ok_or_else(|| {
            TransferError::invalid_operation(format!("{path} has no name to replace"))
        })?;
        let target = renamed
            .as_local()
            .ok_or_else(|| unsupported_path("rename", &renamed))?;
        if tokio::fs::symlink_metadata(target).await.is_ok() {
            return Err(deny_existing(&renamed));
        }
        tokio::fs::rename(local, target).await?;
        stats.add_file_moved();
        Ok(renamed.clone())
    }

    async fn create_directory(&self, path: &TransferPath) -> TransferResult {
        let Some(local) = path.as_local() else {
            return Err(unsupported_path("create directory", path));
        };
        tokio::fs::create_dir_all(local).await?;
        Ok(path.clone())
    }

    async fn info(&self, path: &TransferPath) -> Result<FileInfo, TransferError> {
        let Some(local) = path.as_local() else {
            return Err(unsupported_path("info", path));
        };
        let metadata = stat_local(local).await?;
        Ok(FileInfo::from(&metadata))
    }
}

async fn stat_local(path: &Path) -> Result<std::fs::Metadata, TransferError> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(metadata),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Err(
            TransferError::not_found(format!("{}", path.display())),
        ),
        Err(error) => Err(error.into()),
    }
}

async fn remove_entry(path: &Path, metadata: &std::fs::Metadata) -> Result<(), TransferError> {
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await?;
    } else {
        tokio::fs::remove_file(path).await?;
    }
    Ok(())
}

#[async_recursion]
async fn remove_recursively(path: &Path, stats: &Stats) -> Result<(), TransferError> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            remove_recursively(&entry.path(), stats).await?;
        }
        drop(entries);
        tokio::fs::remove_dir(path).await?;
    } else {
        tokio::fs::remove_file(path).await?;
    }
    stats.add_entry_removed();
    Ok(())
}

async fn copy_symlink(src: &Path, dst: &Path, overwrite: bool) -> Result<Summary, TransferError> {
    let link = tokio::fs::read_link(src).await?;
    if let Err(error) = tokio::fs::symlink(&link, dst).await {
        if overwrite && error.kind() == std::io::ErrorKind::AlreadyExists {
            tokio::fs::remove_file(dst).await?;
            tokio::fs::symlink(&link, dst).await?;
        } else {
            return Err(error.into());
        }
    }
    Ok(Summary {
        files_copied: 1,
        ..Summary::default()
    })
}

async fn copy_one_file(
    src: PathBuf,
    dst: PathBuf,
    buffer: usize,
    total: u64,
    aggregate: Arc<AtomicU64>,
    progress: Reporter,
) -> Result<Summary, TransferError> {
    let mut reader = tokio::fs::File::open(&src).await?;
    let mut writer = tokio::fs::File::create(&dst).await?;
    let mut buf = vec![0u8; buffer];
    let mut copied = 0u64;
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        writer.write_all(&buf[..read]).await?;
        copied += read as u64;
        let seen = aggregate.fetch_add(read as u64, Ordering::Relaxed) + read as u64;
        progress.report(seen, total);
    }
    writer.flush().await?;
    Ok(Summary {
        files_copied: 1,
        bytes_copied: copied,
        ..Summary::default()
    })
}

#[async_recursion]
async fn copy_tree(
    src: PathBuf,
    dst: PathBuf,
    overwrite: bool,
    buffer: usize,
    total: u64,
    aggregate: Arc<AtomicU64>,
    progress: Reporter,
) -> Result<Summary, TransferError> {
    tokio::fs::create_dir_all(&dst).await?;
    let mut summary = Summary {
        directories_created: 1,
        ..Summary::default()
    };
    let mut entries = tokio::fs::read_dir(&src).await?;
    let mut join_set = tokio::task::JoinSet::new();
    while let Some(entry) = entries.next_entry().await? {
        let entry_src = entry.path();
        let entry_dst = dst.join(entry.file_name());
        let file_type = entry.file_type().await?;
        let aggregate = aggregate.clone();
        let progress = progress.clone();
        if file_type.is_symlink() {
            join_set.spawn(async move { copy_symlink(&entry_src, &entry_dst, overwrite).await });
        } else if file_type.is_dir() {
            join_set.spawn(copy_tree(
                entry_src, entry_dst, overwrite, buffer, total, aggregate, progress,
            ));
        } else {
            join_set.spawn(copy_one_file(
                entry_src, entry_dst, buffer, total, aggregate, progress,
            ));
        }
    }
    // ReadDir keeps a descriptor open; release it before waiting on the
    // spawned subtree
    drop(entries);
    while let Some(joined) = join_set.join_next().await {
        let child =
            joined.map_err(|error| TransferError::other(format!("copy task failed: {error}")))??;
        summary = summary + child;
    }
    Ok(summary)
}

#[async_recursion]
async fn tree_size(path: &Path) -> Result<u64, TransferError> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut size = 0u64;
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            size += tree_size(&entry.path()).await?;
        } else if file_type.is_file() {
            size += entry.metadata().await?.len();
        }
    }
    Ok(size)
}
