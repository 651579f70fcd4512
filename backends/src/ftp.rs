use std::sync::Arc;
use std::time::Duration;

use admission::{AdmissionControl, Protocol};
use common::config::TransferConfig;
use common::error::{TransferError, TransferResult};
use common::fileinfo::FileInfo;
use common::path::TransferPath;
use common::progress::{Reporter, Stats};

use crate::creds::{CredentialSource, NoCredentials};
use crate::remote::{Connect, DEFAULT_IO_TIMEOUT, NoTransport, RemoteEngine};
use crate::strategy::Strategy;

/// FTP backend: `ftp://host[:port]/path`.
///
/// Plain FTP servers have no copy primitive, so same-endpoint copies
/// normally take the staged download/upload fallback.
pub struct FtpStrategy {
    engine: RemoteEngine,
}

impl FtpStrategy {
    pub fn new(
        connector: Arc<dyn Connect>,
        credentials: Arc<dyn CredentialSource>,
        admission: Arc<AdmissionControl>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            engine: RemoteEngine::new(Protocol::Ftp, connector, credentials, admission, io_timeout),
        }
    }

    pub fn disconnected(admission: Arc<AdmissionControl>) -> Self {
        Self::new(
            Arc::new(NoTransport::new("ftp")),
            Arc::new(NoCredentials),
            admission,
            DEFAULT_IO_TIMEOUT,
        )
    }
}

#[async_trait::async_trait]
impl Strategy for FtpStrategy {
    async fn copy(
        &self,
        stats: &Stats,
        src: &TransferPath,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        self.engine.copy(stats, src, dst, config, progress).await
    }

    async fn mv(
        &self,
        stats: &Stats,
        src: &TransferPath,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        self.engine.mv(stats, src, dst, config, progress).await
    }

    async fn delete(&self, stats: &Stats, path: &TransferPath, permanent: bool) -> TransferResult {
        self.engine.delete(stats, path, permanent).await
    }

    async fn exists(&self, path: &TransferPath) -> Result<bool, TransferError> {
        self.engine.exists(path).await
    }

    async fn rename(&self, stats: &Stats, path: &TransferPath, new_name: &str) -> TransferResult {
        self.engine.rename(stats, path, new_name).await
    }

    async fn create_directory(&self, path: &TransferPath) -> TransferResult {
        self.engine.create_directory(path).await
    }

    async fn info(&self, path: &TransferPath) -> Result<FileInfo, TransferError> {
        self.engine.info(path).await
    }
}
