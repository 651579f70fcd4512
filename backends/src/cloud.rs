use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use admission::{AdmissionControl, EndpointKey, Priority, Protocol};
use common::config::TransferConfig;
use common::error::{TransferError, TransferResult};
use common::fileinfo::FileInfo;
use common::path::{Provider, TransferPath};
use common::progress::{Reporter, Stats};

use crate::remote::BoxedRead;
use crate::stage::StagingFile;
use crate::strategy::{Strategy, deny_existing, unsupported_path};

/// Provider-SDK seam. One implementation per cloud service.
///
/// Items are addressed by whatever locator the provider hands out:
/// opaque IDs for ID-based services, slash-joined paths for path-based
/// ones. The strategy never interprets locators beyond threading them
/// back into later calls.
#[async_trait::async_trait]
pub trait CloudOps: Send + Sync {
    /// Check and lazily restore authentication; an `Err` here aborts the
    /// surrounding operation before any transfer is attempted.
    async fn ensure_auth(&self) -> Result<(), TransferError>;

    /// Signed-in account label, used to tag the admission key.
    async fn account(&self) -> Result<Option<String>, TransferError>;

    async fn stat(&self, id_or_path: &str) -> Result<Option<FileInfo>, TransferError>;

    async fn exists(&self, id_or_path: &str) -> Result<bool, TransferError> {
        Ok(self.stat(id_or_path).await?.is_some())
    }

    async fn download(&self, id_or_path: &str) -> Result<BoxedRead, TransferError>;

    async fn upload(
        &self,
        parent: Option<&str>,
        name: &str,
        size_hint: u64,
        data: BoxedRead,
    ) -> Result<(), TransferError>;

    /// Server-side copy; the default says the provider has no such
    /// primitive and the caller falls back to staging.
    async fn copy_item(
        &self,
        _id_or_path: &str,
        _dst_parent: Option<&str>,
        _dst_name: &str,
    ) -> Result<bool, TransferError> {
        Ok(false)
    }

    /// Re-parent an item without touching its data. Returns the item's
    /// locator after the move (ID-based providers keep it unchanged).
    async fn move_item(
        &self,
        id_or_path: &str,
        dst_parent: Option<&str>,
    ) -> Result<String, TransferError>;

    async fn rename_item(&self, id_or_path: &str, new_name: &str) -> Result<(), TransferError>;

    /// `permanent = false` keeps the entry recoverable on providers with
    /// a trash.
    async fn delete(&self, id_or_path: &str, permanent: bool) -> Result<(), TransferError>;

    async fn mkdir(&self, parent: Option<&str>, name: &str) -> Result<(), TransferError>;
}

struct Locator {
    provider: Provider,
    parent: Option<String>,
    name: String,
    id: String,
}

fn locate(path: &TransferPath, operation: &str) -> Result<Locator, TransferError> {
    match (path, path.cloud_id_or_path()) {
        (
            TransferPath::Cloud {
                provider,
                parent,
                name,
            },
            Some(id),
        ) => Ok(Locator {
            provider: *provider,
            parent: parent.clone(),
            name: name.clone(),
            id,
        }),
        _ => Err(unsupported_path(operation, path)),
    }
}

fn folder_transfer_error() -> TransferError {
    TransferError::invalid_operation(
        "cloud folder transfers are not supported, transfer items individually",
    )
}

/// Strategy over the registered cloud providers.
///
/// Every operation authenticates first and runs under the provider's
/// admission key; once a provider reports its signed-in account the key
/// is refined to `cloud://provider/account` so separate accounts get
/// separate concurrency budgets.
pub struct CloudStrategy {
    providers: DashMap<Provider, Arc<dyn CloudOps>>,
    accounts: DashMap<Provider, String>,
    admission: Arc<AdmissionControl>,
}

impl CloudStrategy {
    pub fn new(admission: Arc<AdmissionControl>) -> Self {
        Self {
            providers: DashMap::new(),
            accounts: DashMap::new(),
            admission,
        }
    }

    pub fn register(&self, provider: Provider, ops: Arc<dyn CloudOps>) {
        self.providers.insert(provider, ops);
    }

    fn key_for(&self, provider: Provider) -> EndpointKey {
        match self.accounts.get(&provider) {
            Some(account) => {
                EndpointKey::new(format!("cloud://{provider}/{}", account.value()))
            }
            None => EndpointKey::new(format!("cloud://{provider}")),
        }
    }

    fn ops_for(&self, provider: Provider) -> Result<Arc<dyn CloudOps>, TransferError> {
        self.providers
            .get(&provider)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                TransferError::invalid_operation(format!("no {provider} client is registered"))
            })
    }

    async fn client(&self, provider: Provider) -> Result<Arc<dyn CloudOps>, TransferError> {
        let ops = self.ops_for(provider)?;
        ops.ensure_auth().await?;
        if !self.accounts.contains_key(&provider)
            && let Ok(Some(account)) = ops.account().await
        {
            tracing::debug!("tagging {provider} admission key with account {account}");
            self.accounts.insert(provider, account);
        }
        Ok(ops)
    }

    async fn throttled<T, F, Fut>(
        &self,
        provider: Provider,
        priority: Priority,
        op: F,
    ) -> Result<T, TransferError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let key = self.key_for(provider);
        self.admission
            .with_throttle(Protocol::Cloud, &key, priority, op)
            .await
    }

    fn buffer_for(&self, provider: Provider, config: &TransferConfig) -> usize {
        config
            .buffer_size
            .unwrap_or_else(|| self.admission.buffer_size(&self.key_for(provider)))
    }

    async fn copy_within(
        &self,
        stats: &Stats,
        src_loc: Locator,
        dst_loc: Locator,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        let buffer = self.buffer_for(src_loc.provider, config);
        self.throttled(src_loc.provider, config.priority, || async {
            let ops = self.client(src_loc.provider).await?;
            let info = ops
                .stat(&src_loc.id)
                .await?
                .ok_or_else(|| TransferError::not_found(src_loc.id.clone()))?;
            if info.is_dir() {
                return Err(folder_transfer_error());
            }
            if !config.overwrite && ops.exists(&dst_loc.id).await? {
                return Err(deny_existing(dst));
            }
            if ops
                .copy_item(&src_loc.id, dst_loc.parent.as_deref(), &dst_loc.name)
                .await?
            {
                stats.add_bytes_copied(info.size);
                stats.add_file_copied();
                progress.report(info.size, info.size);
                return Ok(dst.clone());
            }
            tracing::debug!("{} has no copy primitive, staging", src_loc.provider);
            let stage = StagingFile::allocate(config.staging_dir.as_deref());
            let scratch = Stats::new();
            let staged = async {
                pull_to_file(
                    ops.as_ref(),
                    &src_loc.id,
                    stage.path(),
                    info.size,
                    buffer,
                    &scratch,
                    &progress.stage(0, 2),
                )
                .await?;
                push_from_file(
                    ops.as_ref(),
                    stage.path(),
                    dst_loc.parent.as_deref(),
                    &dst_loc.name,
                    stats,
                    &progress.stage(1, 2),
                )
                .await
            }
            .await;
            match staged {
                Ok(()) => {
                    stage.remove().await?;
                    Ok(dst.clone())
                }
                Err(error) => {
                    stage.remove().await.ok();
                    Err(error)
                }
            }
        })
        .await
    }

    async fn copy_across(
        &self,
        stats: &Stats,
        src_loc: Locator,
        dst_loc: Locator,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        let stage = StagingFile::allocate(config.staging_dir.as_deref());
        let scratch = Stats::new();
        let src_buffer = self.buffer_for(src_loc.provider, config);
        let downloaded = self
            .throttled(src_loc.provider, config.priority, || async {
                let ops = self.client(src_loc.provider).await?;
                let info = ops
                    .stat(&src_loc.id)
                    .await?
                    .ok_or_else(|| TransferError::not_found(src_loc.id.clone()))?;
                if info.is_dir() {
                    return Err(folder_transfer_error());
                }
                pull_to_file(
                    ops.as_ref(),
                    &src_loc.id,
                    stage.path(),
                    info.size,
                    src_buffer,
                    &scratch,
                    &progress.stage(0, 2),
                )
                .await
            })
            .await;
        if let Err(error) = downloaded {
            stage.remove().await.ok();
            return Err(error);
        }

        let uploaded = self
            .throttled(dst_loc.provider, config.priority, || async {
                let ops = self.client(dst_loc.provider).await?;
                if !config.overwrite && ops.exists(&dst_loc.id).await? {
                    return Err(deny_existing(dst));
                }
                push_from_file(
                    ops.as_ref(),
                    stage.path(),
                    dst_loc.parent.as_deref(),
                    &dst_loc.name,
                    stats,
                    &progress.stage(1, 2),
                )
                .await
            })
            .await;
        match uploaded {
            Ok(()) => {
                stage.remove().await?;
                Ok(dst.clone())
            }
            Err(error) => {
                stage.remove().await.ok();
                Err(error)
            }
        }
    }

    async fn download_to_local(
        &self,
        stats: &Stats,
        src_loc: Locator,
        local_dst: &std::path::Path,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        let buffer = self.buffer_for(src_loc.provider, config);
        self.throttled(src_loc.provider, config.priority, || async {
            let ops = self.client(src_loc.provider).await?;
            let info = ops
                .stat(&src_loc.id)
                .await?
                .ok_or_else(|| TransferError::not_found(src_loc.id.clone()))?;
            if info.is_dir() {
                return Err(folder_transfer_error());
            }
            if !config.overwrite && tokio::fs::symlink_metadata(local_dst).await.is_ok() {
                return Err(deny_existing(dst));
            }
            if let Some(parent) = local_dst.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            pull_to_file(
                ops.as_ref(),
                &src_loc.id,
                local_dst,
                info.size,
                buffer,
                stats,
                progress,
            )
            .await?;
            Ok(dst.clone())
        })
        .await
    }

    async fn upload_from_local(
        &self,
        stats: &Stats,
        local_src: &std::path::Path,
        dst_loc: Locator,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        self.throttled(dst_loc.provider, config.priority, || async {
            let ops = self.client(dst_loc.provider).await?;
            let metadata = match tokio::fs::symlink_metadata(local_src).await {
                Ok(metadata) => metadata,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    return Err(TransferError::not_found(format!(
                        "{}",
                        local_src.display()
                    )));
                }
                Err(error) => return Err(error.into()),
            };
            if metadata.is_dir() {
                return Err(folder_transfer_error());
            }
            if !config.overwrite && ops.exists(&dst_loc.id).await? {
                return Err(deny_existing(dst));
            }
            push_from_file(
                ops.as_ref(),
                local_src,
                dst_loc.parent.as_deref(),
                &dst_loc.name,
                stats,
                progress,
            )
            .await?;
            Ok(dst.clone())
        })
        .await
    }

    /// A move relocates; its source removal is always permanent.
    async fn remove_moved_source(
        &self,
        stats: &Stats,
        src: &TransferPath,
    ) -> Result<(), TransferError> {
        match src {
            TransferPath::Local(path) => {
                tokio::fs::remove_file(path).await?;
                stats.add_entry_removed();
                Ok(())
            }
            _ => Strategy::delete(self, stats, src, true).await.map(|_| ()),
        }
    }
}

#[async_trait::async_trait]
impl Strategy for CloudStrategy {
    #[tracing::instrument(level = "debug", skip(self, stats, config, progress))]
    async fn copy(
        &self,
        stats: &Stats,
        src: &TransferPath,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        match (locate(src, "copy").ok(), locate(dst, "copy").ok()) {
            (Some(src_loc), Some(dst_loc)) if src_loc.provider == dst_loc.provider => {
                self.copy_within(stats, src_loc, dst_loc, dst, config, progress)
                    .await
            }
            (Some(src_loc), Some(dst_loc)) => {
                self.copy_across(stats, src_loc, dst_loc, dst, config, progress)
                    .await
            }
            (Some(src_loc), None) => {
                let TransferPath::Local(local_dst) = dst else {
                    return Err(unsupported_path("copy", dst));
                };
                self.download_to_local(stats, src_loc, local_dst, dst, config, progress)
                    .await
            }
            (None, Some(dst_loc)) => {
                let TransferPath::Local(local_src) = src else {
                    return Err(unsupported_path("copy", src));
                };
                self.upload_from_local(stats, local_src, dst_loc, dst, config, progress)
                    .await
            }
            (None, None) => Err(unsupported_path("copy", src)),
        }
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
        if let (Ok(src_loc), Ok(dst_loc)) = (locate(src, "move"), locate(dst, "move"))
            && src_loc.provider == dst_loc.provider
        {
            return self
                .throttled(src_loc.provider, config.priority, || async {
                    let ops = self.client(src_loc.provider).await?;
                    let info = ops
                        .stat(&src_loc.id)
                        .await?
                        .ok_or_else(|| TransferError::not_found(src_loc.id.clone()))?;
                    if !config.overwrite && ops.exists(&dst_loc.id).await? {
                        return Err(deny_existing(dst));
                    }
                    let mut current = src_loc.id.clone();
                    if src_loc.parent != dst_loc.parent {
                        current = ops
                            .move_item(&current, dst_loc.parent.as_deref())
                            .await?;
                    }
                    if src_loc.name != dst_loc.name {
                        ops.rename_item(&current, &dst_loc.name).await?;
                    }
                    stats.add_file_moved();
                    progress.report(info.size, info.size);
                    Ok(dst.clone())
                })
                .await;
        }

        // cross provider (or one side local): copy, then drop the source
        // only once the copy fully succeeded
        let copied = Strategy::copy(self, stats, src, dst, config, progress).await?;
        self.remove_moved_source(stats, src).await?;
        stats.add_file_moved();
        Ok(copied)
    }

    #[tracing::instrument(level = "debug", skip(self, stats))]
    async fn delete(&self, stats: &Stats, path: &TransferPath, permanent: bool) -> TransferResult {
        let loc = locate(path, "delete")?;
        self.throttled(loc.provider, Priority::Low, || async {
            let ops = self.client(loc.provider).await?;
            if ops.stat(&loc.id).await?.is_none() {
                return Err(TransferError::not_found(loc.id.clone()));
            }
            ops.delete(&loc.id, permanent).await?;
            stats.add_entry_removed();
            Ok(path.clone())
        })
        .await
    }

    async fn exists(&self, path: &TransferPath) -> Result<bool, TransferError> {
        let loc = locate(path, "exists")?;
        self.throttled(loc.provider, Priority::Low, || async {
            let ops = self.client(loc.provider).await?;
            ops.exists(&loc.id).await
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, stats))]
    async fn rename(&self, stats: &Stats, path: &TransferPath, new_name: &str) -> TransferResult {
        if new_name.contains('/') || new_name.is_empty() {
            return Err(TransferError::invalid_operation(format!(
                "{new_name:?} is not a valid entry name"
            )));
        }
        let loc = locate(path, "rename")?;
        let renamed = path.with_name(new_name).ok_or_else(|| {
            TransferError::invalid_operation(format!("{path} has no name to replace"))
        })?;
        let renamed_loc = locate(&renamed, "rename")?;
        self.throttled(loc.provider, Priority::Low, || async {
            let ops = self.client(loc.provider).await?;
            if ops.stat(&loc.id).await?.is_none() {
                return Err(TransferError::not_found(loc.id.clone()));
            }
            if ops.exists(&renamed_loc.id).await? {
                return Err(deny_existing(&renamed));
            }
            ops.rename_item(&loc.id, new_name).await?;
            stats.add_file_moved();
            Ok(renamed.clone())
        })
        .await
    }

    async fn create_directory(&self, path: &TransferPath) -> TransferResult {
        let loc = locate(path, "create directory")?;
        self.throttled(loc.provider, Priority::Low, || async {
            let ops = self.client(loc.provider).await?;
            ops.mkdir(loc.parent.as_deref(), &loc.name).await?;
            Ok(path.clone())
        })
        .await
    }

    async fn info(&self, path: &TransferPath) -> Result<FileInfo, TransferError> {
        let loc = locate(path, "info")?;
        self.throttled(loc.provider, Priority::Low, || async {
            let ops = self.client(loc.provider).await?;
            ops.stat(&loc.id)
                .await?
                .ok_or_else(|| TransferError::not_found(loc.id.clone()))
        })
        .await
    }
}

/// Live progress for uploads whose byte stream the provider consumes
/// internally.
struct CountingReader {
    inner: BoxedRead,
    reported: u64,
    total: u64,
    progress: Reporter,
}

impl CountingReader {
    fn new(inner: BoxedRead, total: u64, progress: Reporter) -> Self {
        Self {
            inner,
            reported: 0,
            total,
            progress,
        }
    }
}

impl tokio::io::AsyncRead for CountingReader {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match std::pin::Pin::new(&mut this.inner).poll_read(cx, buf) {
            std::task::Poll::Ready(Ok(())) => {
                let read = (buf.filled().len() - before) as u64;
                if read > 0 {
                    this.reported += read;
                    this.progress.report(this.reported, this.total);
                }
                std::task::Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

async fn pull_to_file(
    ops: &dyn CloudOps,
    id: &str,
    local: &std::path::Path,
    size: u64,
    buffer: usize,
    stats: &Stats,
    progress: &Reporter,
) -> Result<(), TransferError> {
    let mut reader = ops.download(id).await?;
    let mut file = tokio::fs::File::create(local).await?;
    let mut buf = vec![0u8; buffer];
    let mut copied = 0u64;
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        file.write_all(&buf[..read]).await?;
        copied += read as u64;
        stats.add_bytes_copied(read as u64);
        progress.report(copied, size);
    }
    file.flush().await?;
    stats.add_file_copied();
    progress.report(copied, size);
    Ok(())
}

async fn push_from_file(
    ops: &dyn CloudOps,
    local: &std::path::Path,
    parent: Option<&str>,
    name: &str,
    stats: &Stats,
    progress: &Reporter,
) -> Result<(), TransferError> {
    let size = tokio::fs::metadata(local).await?.len();
    let file = tokio::fs::File::open(local).await?;
    let reader = CountingReader::new(Box::new(file), size, progress.clone());
    ops.upload(parent, name, size, Box::new(reader)).await?;
    stats.add_bytes_copied(size);
    stats.add_file_copied();
    progress.report(size, size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCloud;
    use common::error::ErrorKind;
    use common::path::resolve;
    use common::testutils;

    fn strategy_with(provider: Provider, cloud: MemoryCloud) -> CloudStrategy {
        let strategy = CloudStrategy::new(Arc::new(AdmissionControl::new()));
        strategy.register(provider, Arc::new(cloud));
        strategy
    }

    #[tokio::test]
    async fn signed_out_accounts_short_circuit_before_any_transfer() -> anyhow::Result<()> {
        let cloud = MemoryCloud::new("me@example.com");
        cloud.insert_file("docs/q3.pdf", b"pdf".to_vec());
        cloud.sign_out();
        let strategy = strategy_with(Provider::Dropbox, cloud.clone());
        let dir = testutils::create_temp_dir()?;

        let error = strategy
            .copy(
                &Stats::new(),
                &resolve("cloud://dropbox/docs/q3.pdf")?,
                &TransferPath::Local(dir.join("q3.pdf")),
                &TransferConfig::default(),
                &Reporter::none(),
            )
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::AuthRequired);
        // nothing ran against the provider
        assert!(cloud.operations().is_empty(), "{:?}", cloud.operations());

        cloud.sign_in();
        strategy
            .copy(
                &Stats::new(),
                &resolve("cloud://dropbox/docs/q3.pdf")?,
                &TransferPath::Local(dir.join("q3.pdf")),
                &TransferConfig::default(),
                &Reporter::none(),
            )
            .await?;
        assert_eq!(testutils::read_file(dir.join("q3.pdf")).await?, b"pdf");
        Ok(())
    }

    #[tokio::test]
    async fn same_provider_moves_are_metadata_only() -> anyhow::Result<()> {
        let cloud = MemoryCloud::new("me@example.com");
        cloud.insert_file("inbox/report.pdf", vec![7u8; 900]);
        let strategy = strategy_with(Provider::GoogleDrive, cloud.clone());
        let stats = Stats::new();

        strategy
            .mv(
                &stats,
                &resolve("cloud://google/inbox/report.pdf")?,
                &resolve("cloud://google/archive/2026-q3.pdf")?,
                &TransferConfig::default(),
                &Reporter::none(),
            )
            .await?;

        assert!(cloud.entry_exists("archive/2026-q3.pdf"));
        assert!(!cloud.entry_exists("inbox/report.pdf"));
        let operations = cloud.operations();
        assert_eq!(
            operations,
            vec![
                "move inbox/report.pdf -> archive/report.pdf",
                "rename archive/report.pdf -> archive/2026-q3.pdf",
            ]
        );
        assert_eq!(stats.summary().files_moved, 1);
        assert_eq!(stats.bytes_copied(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn same_provider_renames_skip_the_move_call() -> anyhow::Result<()> {
        let cloud = MemoryCloud::new("me@example.com");
        cloud.insert_file("inbox/report.pdf", b"pdf".to_vec());
        let strategy = strategy_with(Provider::GoogleDrive, cloud.clone());

        strategy
            .mv(
                &Stats::new(),
                &resolve("cloud://google/inbox/report.pdf")?,
                &resolve("cloud://google/inbox/final.pdf")?,
                &TransferConfig::default(),
                &Reporter::none(),
            )
            .await?;

        assert_eq!(
            cloud.operations(),
            vec!["rename inbox/report.pdf -> inbox/final.pdf"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn same_provider_copies_use_the_copy_primitive() -> anyhow::Result<()> {
        let cloud = MemoryCloud::new("me@example.com");
        cloud.insert_file("a.bin", vec![1u8; 128]);
        let strategy = strategy_with(Provider::OneDrive, cloud.clone());
        let (progress, calls) = testutils::recording_reporter();
        let stats = Stats::new();

        strategy
            .copy(
                &stats,
                &resolve("cloud://onedrive/a.bin")?,
                &resolve("cloud://onedrive/b.bin")?,
                &TransferConfig::default(),
                &progress,
            )
            .await?;

        assert_eq!(cloud.contents("b.bin"), Some(vec![1u8; 128]));
        assert_eq!(cloud.operations(), vec!["copy a.bin -> b.bin"]);
        assert_eq!(*calls.lock().unwrap(), vec![(128, 128)]);
        Ok(())
    }

    #[tokio::test]
    async fn providers_without_copy_stage_locally() -> anyhow::Result<()> {
        let cloud = MemoryCloud::without_copy_support("me@example.com");
        cloud.insert_file("a.bin", vec![2u8; 64]);
        let strategy = strategy_with(Provider::Dropbox, cloud.clone());
        let staging = testutils::create_temp_dir()?;
        let config = TransferConfig {
            staging_dir: Some(staging.clone()),
            ..TransferConfig::default()
        };

        strategy
            .copy(
                &Stats::new(),
                &resolve("cloud://dropbox/a.bin")?,
                &resolve("cloud://dropbox/b.bin")?,
                &config,
                &Reporter::none(),
            )
            .await?;

        assert_eq!(cloud.contents("b.bin"), Some(vec![2u8; 64]));
        assert_eq!(
            cloud.operations(),
            vec!["download a.bin", "upload b.bin"]
        );
        assert_eq!(std::fs::read_dir(&staging)?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn cross_provider_copies_stage_through_local_disk() -> anyhow::Result<()> {
        let dropbox = MemoryCloud::new("me@dropbox");
        dropbox.insert_file("shared/pitch.key", vec![3u8; 256]);
        let drive = MemoryCloud::new("me@gmail.com");
        let strategy = CloudStrategy::new(Arc::new(AdmissionControl::new()));
        strategy.register(Provider::Dropbox, Arc::new(dropbox.clone()));
        strategy.register(Provider::GoogleDrive, Arc::new(drive.clone()));
        let staging = testutils::create_temp_dir()?;
        let config = TransferConfig {
            staging_dir: Some(staging.clone()),
            ..TransferConfig::default()
        };
        let (progress, calls) = testutils::recording_reporter();

        strategy
            .copy(
                &Stats::new(),
                &resolve("cloud://dropbox/shared/pitch.key")?,
                &resolve("cloud://google/backup/pitch.key")?,
                &config,
                &progress,
            )
            .await?;

        assert_eq!(drive.contents("backup/pitch.key"), Some(vec![3u8; 256]));
        assert_eq!(dropbox.operations(), vec!["download shared/pitch.key"]);
        assert_eq!(drive.operations(), vec!["upload backup/pitch.key"]);
        // two-phase sweep, no residue
        assert_eq!(calls.lock().unwrap().last(), Some(&(512, 512)));
        assert_eq!(std::fs::read_dir(&staging)?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn cross_provider_moves_keep_the_source_on_upload_failure() -> anyhow::Result<()> {
        let dropbox = MemoryCloud::new("me@dropbox");
        dropbox.insert_file("out/a.jpg", vec![4u8; 32]);
        let drive = MemoryCloud::new("me@gmail.com");
        drive.sign_out();
        let strategy = CloudStrategy::new(Arc::new(AdmissionControl::new()));
        strategy.register(Provider::Dropbox, Arc::new(dropbox.clone()));
        strategy.register(Provider::GoogleDrive, Arc::new(drive.clone()));
        let staging = testutils::create_temp_dir()?;
        let config = TransferConfig {
            staging_dir: Some(staging.clone()),
            ..TransferConfig::default()
        };

        let result = strategy
            .mv(
                &Stats::new(),
                &resolve("cloud://dropbox/out/a.jpg")?,
                &resolve("cloud://google/in/a.jpg")?,
                &config,
                &Reporter::none(),
            )
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::AuthRequired);
        assert!(dropbox.entry_exists("out/a.jpg"));
        assert!(!drive.entry_exists("in/a.jpg"));
        assert_eq!(std::fs::read_dir(&staging)?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn delete_forwards_the_permanent_flag() -> anyhow::Result<()> {
        let cloud = MemoryCloud::new("me@example.com");
        cloud.insert_file("old/a.txt", b"a".to_vec());
        cloud.insert_file("old/b.txt", b"b".to_vec());
        let strategy = strategy_with(Provider::Dropbox, cloud.clone());
        let stats = Stats::new();

        strategy
            .delete(&stats, &resolve("cloud://dropbox/old/a.txt")?, false)
            .await?;
        strategy
            .delete(&stats, &resolve("cloud://dropbox/old/b.txt")?, true)
            .await?;

        assert_eq!(
            cloud.operations(),
            vec![
                "delete old/a.txt permanent=false",
                "delete old/b.txt permanent=true",
            ]
        );
        assert_eq!(stats.summary().entries_removed, 2);
        Ok(())
    }

    #[tokio::test]
    async fn unregistered_providers_are_invalid_operations() -> anyhow::Result<()> {
        let strategy = CloudStrategy::new(Arc::new(AdmissionControl::new()));
        let error = strategy
            .exists(&resolve("cloud://onedrive/x")?)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidOperation);
        assert!(error.message().contains("onedrive"), "{error}");
        Ok(())
    }
}
