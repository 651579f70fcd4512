use std::sync::Arc;
use std::time::Duration;

use admission::AdmissionControl;
use backends::{
    CloudOps, CloudStrategy, FtpStrategy, LocalStrategy, NoTransport, SftpStrategy, SmbStrategy,
    Strategy, bridge_copy,
};
use common::config::TransferConfig;
use common::error::{TransferError, TransferResult};
use common::fileinfo::FileInfo;
use common::path::{Provider, TransferPath, resolve};
use common::progress::{Reporter, Stats, Summary};

/// Thin coordination layer over the protocol strategies.
///
/// The orchestrator resolves raw path strings, performs the uniform
/// overwrite pre-check, picks the owning strategy (or pair, for
/// cross-protocol bridging) and forwards the call. It holds no adaptive
/// state of its own; throttling decisions live entirely in the
/// [`AdmissionControl`] the strategies share.
pub struct Orchestrator {
    admission: Arc<AdmissionControl>,
    local: LocalStrategy,
    smb: SmbStrategy,
    sftp: SftpStrategy,
    ftp: FtpStrategy,
    cloud: CloudStrategy,
    stats: Stats,
}

impl Orchestrator {
    pub fn new(
        admission: Arc<AdmissionControl>,
        smb: SmbStrategy,
        sftp: SftpStrategy,
        ftp: FtpStrategy,
        cloud: CloudStrategy,
    ) -> Self {
        Self {
            admission,
            local: LocalStrategy::new(),
            smb,
            sftp,
            ftp,
            cloud,
            stats: Stats::new(),
        }
    }

    /// Orchestrator without wire clients: remote paths resolve and
    /// dispatch, then fail explaining that no transport is configured.
    /// This is what the stock `ferry` binary runs.
    pub fn disconnected(admission: Arc<AdmissionControl>, io_timeout: Duration) -> Self {
        let creds: Arc<dyn backends::CredentialSource> = Arc::new(backends::NoCredentials);
        let smb = SmbStrategy::new(
            Arc::new(NoTransport::new("smb")),
            creds.clone(),
            admission.clone(),
            io_timeout,
        );
        let sftp = SftpStrategy::new(
            Arc::new(NoTransport::new("sftp")),
            creds.clone(),
            admission.clone(),
            io_timeout,
        );
        let ftp = FtpStrategy::new(
            Arc::new(NoTransport::new("ftp")),
            creds,
            admission.clone(),
            io_timeout,
        );
        let cloud = CloudStrategy::new(admission.clone());
        Self::new(admission, smb, sftp, ftp, cloud)
    }

    /// Wire a provider SDK into the cloud strategy.
    pub fn register_cloud_provider(&self, provider: Provider, ops: Arc<dyn CloudOps>) {
        self.cloud.register(provider, ops);
    }

    pub fn admission(&self) -> &Arc<AdmissionControl> {
        &self.admission
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn summary(&self) -> Summary {
        self.stats.summary()
    }

    fn strategy_for(&self, path: &TransferPath) -> &dyn Strategy {
        match path {
            TransferPath::Local(_) => &self.local,
            TransferPath::Smb { .. } => &self.smb,
            TransferPath::Sftp { .. } => &self.sftp,
            TransferPath::Ftp { .. } => &self.ftp,
            TransferPath::Cloud { .. } => &self.cloud,
        }
    }

    /// Destination check applied before any strategy-specific work, so
    /// "destination already exists" reports identically for every backend
    /// and no partial side effects happen first.
    async fn deny_existing_destination(
        &self,
        dst: &TransferPath,
        config: &TransferConfig,
    ) -> Result<(), TransferError> {
        if !config.overwrite && self.strategy_for(dst).exists(dst).await? {
            return Err(TransferError::already_exists(format!(
                "{dst} already exists (pass overwrite to replace it)"
            )));
        }
        Ok(())
    }

    fn noted<T>(&self, result: Result<T, TransferError>) -> Result<T, TransferError> {
        if result.is_err() {
            self.stats.add_error();
        }
        result
    }

    #[tracing::instrument(level = "info", skip(self, config, progress))]
    pub async fn copy(
        &self,
        src: &str,
        dst: &str,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        let result = self.copy_resolved(src, dst, config, progress).await;
        self.noted(result)
    }

    async fn copy_resolved(
        &self,
        src: &str,
        dst: &str,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        let src = resolve(src)?;
        let dst = resolve(dst)?;
        self.deny_existing_destination(&dst, config).await?;
        if same_strategy(&src, &dst) {
            // one strategy owns both sides: local pair, or any mix where
            // the strategy itself dispatches download/upload/fast paths
            let owner = if src.is_local() { &dst } else { &src };
            return self
                .strategy_for(owner)
                .copy(&self.stats, &src, &dst, config, progress)
                .await;
        }
        bridge_copy(
            self.strategy_for(&src),
            self.strategy_for(&dst),
            &self.stats,
            &src,
            &dst,
            config,
            progress,
        )
        .await
    }

    #[tracing::instrument(level = "info", skip(self, config, progress))]
    pub async fn mv(
        &self,
        src: &str,
        dst: &str,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        let result = self.mv_resolved(src, dst, config, progress).await;
        self.noted(result)
    }

    async fn mv_resolved(
        &self,
        src: &str,
        dst: &str,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        let src = resolve(src)?;
        let dst = resolve(dst)?;
        self.deny_existing_destination(&dst, config).await?;
        if same_strategy(&src, &dst) {
            let owner = if src.is_local() { &dst } else { &src };
            return self
                .strategy_for(owner)
                .mv(&self.stats, &src, &dst, config, progress)
                .await;
        }
        // two different remote schemes: bridged copy, and the source is
        // removed only once the upload has confirmed
        let copied = bridge_copy(
            self.strategy_for(&src),
            self.strategy_for(&dst),
            &self.stats,
            &src,
            &dst,
            config,
            progress,
        )
        .await?;
        self.strategy_for(&src)
            .delete(&self.stats, &src, true)
            .await?;
        self.stats.add_file_moved();
        Ok(copied)
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn delete(&self, path: &str, permanent: bool) -> TransferResult {
        let result = async {
            let path = resolve(path)?;
            self.strategy_for(&path)
                .delete(&self.stats, &path, permanent)
                .await
        }
        .await;
        self.noted(result)
    }

    pub async fn exists(&self, path: &str) -> Result<bool, TransferError> {
        let result = async {
            let path = resolve(path)?;
            self.strategy_for(&path).exists(&path).await
        }
        .await;
        self.noted(result)
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn rename(&self, path: &str, new_name: &str) -> TransferResult {
        let result = async {
            let path = resolve(path)?;
            self.strategy_for(&path)
                .rename(&self.stats, &path, new_name)
                .await
        }
        .await;
        self.noted(result)
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn create_directory(&self, path: &str) -> TransferResult {
        let result = async {
            let path = resolve(path)?;
            let created = self.strategy_for(&path).create_directory(&path).await?;
            self.stats.add_directory_created();
            Ok(created)
        }
        .await;
        self.noted(result)
    }

    pub async fn info(&self, path: &str) -> Result<FileInfo, TransferError> {
        let result = async {
            let path = resolve(path)?;
            self.strategy_for(&path).info(&path).await
        }
        .await;
        self.noted(result)
    }

    /// Empty a local directory's trash folder. Returns the number of
    /// parked entries purged.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn purge_trash(&self, dir: &str) -> Result<u64, TransferError> {
        let result = async {
            let path = resolve(dir)?;
            let Some(local) = path.as_local() else {
                return Err(TransferError::invalid_operation(format!(
                    "{path} is not a local directory, only local deletes use a trash"
                )));
            };
            self.local.purge_trash(&self.stats, local).await
        }
        .await;
        self.noted(result)
    }
}

/// Whether one strategy owns the whole transfer: both sides the same
/// scheme, or one side local (the remote strategy handles its own
/// download/upload dispatch).
fn same_strategy(src: &TransferPath, dst: &TransferPath) -> bool {
    src.protocol() == dst.protocol() || src.is_local() || dst.is_local()
}
