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

/// SMB share backend: `smb://host[:port]/share/path`.
///
/// All heavy lifting lives in [`RemoteEngine`]; this type pins the
/// protocol mapping (share-relative paths, port 445 default) and the
/// connector wiring.
pub struct SmbStrategy {
    engine: RemoteEngine,
}

impl SmbStrategy {
    pub fn new(
        connector: Arc<dyn Connect>,
        credentials: Arc<dyn CredentialSource>,
        admission: Arc<AdmissionControl>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            engine: RemoteEngine::new(Protocol::Smb, connector, credentials, admission, io_timeout),
        }
    }

    /// Strategy without a wire client; every operation explains that no
    /// SMB transport is configured.
    pub fn disconnected(admission: Arc<AdmissionControl>) -> Self {
        Self::new(
            Arc::new(NoTransport::new("smb")),
            Arc::new(NoCredentials),
            admission,
            DEFAULT_IO_TIMEOUT,
        )
    }
}

#[async_trait::async_trait]
impl Strategy for SmbStrategy {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryFs};
    use common::error::ErrorKind;
    use common::path::resolve;
    use common::testutils;

    fn strategy_with(host: &str, fs: MemoryFs) -> SmbStrategy {
        let connector = MemoryConnector::new();
        connector.insert(host, 445, fs);
        SmbStrategy::new(
            Arc::new(connector),
            Arc::new(NoCredentials),
            Arc::new(AdmissionControl::new()),
            DEFAULT_IO_TIMEOUT,
        )
    }

    #[tokio::test]
    async fn round_trips_files_through_a_share() -> anyhow::Result<()> {
        let fs = MemoryFs::new();
        fs.insert_dir("backup");
        let strategy = strategy_with("nas", fs.clone());
        let dir = testutils::create_temp_dir()?;
        let src = dir.join("report.pdf");
        tokio::fs::write(&src, vec![3u8; 600]).await?;
        let remote = resolve("smb://nas/backup/report.pdf")?;
        let stats = Stats::new();

        strategy
            .copy(
                &stats,
                &TransferPath::Local(src.clone()),
                &remote,
                &TransferConfig::default(),
                &Reporter::none(),
            )
            .await?;
        assert_eq!(fs.contents("backup/report.pdf"), Some(vec![3u8; 600]));

        let fetched = dir.join("fetched.pdf");
        strategy
            .copy(
                &stats,
                &remote,
                &TransferPath::Local(fetched.clone()),
                &TransferConfig::default(),
                &Reporter::none(),
            )
            .await?;
        assert_eq!(testutils::read_file(&fetched).await?, vec![3u8; 600]);
        assert_eq!(stats.summary().files_copied, 2);
        assert_eq!(stats.bytes_copied(), 1200);
        Ok(())
    }

    #[tokio::test]
    async fn same_share_copies_use_the_server_fast_path() -> anyhow::Result<()> {
        let fs = MemoryFs::new();
        fs.insert_dir("share");
        fs.insert_file("share/a.bin", vec![9u8; 256]);
        let strategy = strategy_with("nas", fs.clone());
        let (progress, calls) = testutils::recording_reporter();
        let stats = Stats::new();

        strategy
            .copy(
                &stats,
                &resolve("smb://nas/share/a.bin")?,
                &resolve("smb://nas/share/b.bin")?,
                &TransferConfig::default(),
                &progress,
            )
            .await?;

        assert_eq!(fs.contents("share/b.bin"), Some(vec![9u8; 256]));
        // a single whole-file report, not the two-phase staged sweep
        assert_eq!(*calls.lock().unwrap(), vec![(256, 256)]);
        assert_eq!(stats.bytes_copied(), 256);
        Ok(())
    }

    #[tokio::test]
    async fn same_endpoint_moves_rename_and_create_parents() -> anyhow::Result<()> {
        let fs = MemoryFs::new();
        fs.insert_dir("share");
        fs.insert_file("share/a.txt", b"a".to_vec());
        let strategy = strategy_with("nas", fs.clone());
        let stats = Stats::new();

        strategy
            .mv(
                &stats,
                &resolve("smb://nas/share/a.txt")?,
                &resolve("smb://nas/share/deep/sub/a.txt")?,
                &TransferConfig::default(),
                &Reporter::none(),
            )
            .await?;

        assert!(fs.entry_exists("share/deep/sub/a.txt"));
        assert!(!fs.entry_exists("share/a.txt"));
        assert!(fs.paths().contains(&"share/deep".to_string()));
        assert_eq!(stats.summary().files_moved, 1);
        assert_eq!(stats.bytes_copied(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn deletes_share_trees_recursively() -> anyhow::Result<()> {
        let fs = MemoryFs::new();
        fs.insert_dir("share");
        fs.insert_dir("share/logs");
        fs.insert_file("share/logs/a.log", b"a".to_vec());
        fs.insert_dir("share/logs/deep");
        fs.insert_file("share/logs/deep/b.log", b"b".to_vec());
        let strategy = strategy_with("nas", fs.clone());
        let stats = Stats::new();

        strategy
            .delete(&stats, &resolve("smb://nas/share/logs")?, true)
            .await?;

        assert!(!fs.entry_exists("share/logs"));
        assert!(fs.entry_exists("share"));
        assert_eq!(stats.summary().entries_removed, 4);
        Ok(())
    }

    #[tokio::test]
    async fn missing_sources_map_to_not_found() -> anyhow::Result<()> {
        let fs = MemoryFs::new();
        fs.insert_dir("share");
        let strategy = strategy_with("nas", fs);
        let dir = testutils::create_temp_dir()?;

        let error = strategy
            .copy(
                &Stats::new(),
                &resolve("smb://nas/share/ghost.txt")?,
                &TransferPath::Local(dir.join("out.txt")),
                &TransferConfig::default(),
                &Reporter::none(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn disconnected_builds_explain_the_missing_transport() -> anyhow::Result<()> {
        let strategy = SmbStrategy::disconnected(Arc::new(AdmissionControl::new()));
        let error = strategy
            .exists(&resolve("smb://nas/share/x")?)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidOperation);
        assert!(error.message().contains("no smb transport"), "{error}");
        Ok(())
    }
}
