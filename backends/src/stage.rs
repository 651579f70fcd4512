use rand::Rng;

use common::config::TransferConfig;
use common::error::{TransferError, TransferResult};
use common::path::TransferPath;
use common::progress::{Reporter, Stats};

use crate::strategy::Strategy;

/// Local scratch file bridging two endpoints that cannot talk to each
/// other directly.
///
/// The name is unique per process and allocation; `Drop` removes whatever
/// is left behind so a cancelled bridge cannot leak staged data. Call
/// [`StagingFile::remove`] on the normal paths to surface deletion errors.
#[derive(Debug)]
pub struct StagingFile {
    path: std::path::PathBuf,
    removed: bool,
}

impl StagingFile {
    pub fn allocate(staging_dir: Option<&std::path::Path>) -> Self {
        let dir = staging_dir
            .map(std::path::Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let suffix: String = rand::rng()
            .sample_iter(&rand::distr::Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let name = format!("ferry-stage-{}-{}", std::process::id(), suffix);
        Self {
            path: dir.join(name),
            removed: false,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn as_transfer_path(&self) -> TransferPath {
        TransferPath::Local(self.path.clone())
    }

    pub async fn remove(mut self) -> Result<(), TransferError> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.removed {
            std::fs::remove_file(&self.path).ok();
        }
    }
}

/// Copies `src` to `dst` through a local staging file when the two sides
/// cannot reach each other: download with `src_strategy`, upload with
/// `dst_strategy`, each phase reporting into its half of the progress
/// range. The staging file is deleted on success and on failure.
pub async fn bridge_copy(
    src_strategy: &dyn Strategy,
    dst_strategy: &dyn Strategy,
    stats: &Stats,
    src: &TransferPath,
    dst: &TransferPath,
    config: &TransferConfig,
    progress: &Reporter,
) -> TransferResult {
    let stage = StagingFile::allocate(config.staging_dir.as_deref());
    let stage_path = stage.as_transfer_path();
    tracing::debug!("bridging {} -> {} via {:?}", src, dst, stage.path());

    // the scratch download is an implementation detail, only the upload
    // counts toward the run
    let staged_stats = Stats::new();
    let download = src_strategy
        .copy(&staged_stats, src, &stage_path, config, &progress.stage(0, 2))
        .await;
    if let Err(error) = download {
        stage.remove().await.ok();
        return Err(error);
    }

    let upload = dst_strategy
        .copy(stats, &stage_path, dst, config, &progress.stage(1, 2))
        .await;
    if upload.is_err() {
        // cleanup trouble must not mask the upload failure
        stage.remove().await.ok();
        return upload;
    }
    stage.remove().await?;
    upload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalStrategy;
    use common::error::ErrorKind;
    use common::fileinfo::FileInfo;
    use common::testutils;

    /// Upload that dies mid-flight and replaces the staging file with a
    /// directory, so the bridge's cleanup cannot succeed either.
    struct WreckedUpload;

    #[async_trait::async_trait]
    impl Strategy for WreckedUpload {
        async fn copy(
            &self,
            _stats: &Stats,
            src: &TransferPath,
            _dst: &TransferPath,
            _config: &TransferConfig,
            _progress: &Reporter,
        ) -> TransferResult {
            let staged = src.as_local().expect("bridge uploads read local staging");
            tokio::fs::remove_file(staged).await.ok();
            tokio::fs::create_dir(staged).await.ok();
            Err(TransferError::network("connection dropped mid-upload"))
        }

        async fn mv(
            &self,
            _stats: &Stats,
            _src: &TransferPath,
            _dst: &TransferPath,
            _config: &TransferConfig,
            _progress: &Reporter,
        ) -> TransferResult {
            unreachable!("bridge only copies")
        }

        async fn delete(
            &self,
            _stats: &Stats,
            _path: &TransferPath,
            _permanent: bool,
        ) -> TransferResult {
            unreachable!("bridge only copies")
        }

        async fn exists(&self, _path: &TransferPath) -> Result<bool, TransferError> {
            Ok(false)
        }

        async fn rename(
            &self,
            _stats: &Stats,
            _path: &TransferPath,
            _new_name: &str,
        ) -> TransferResult {
            unreachable!("bridge only copies")
        }

        async fn create_directory(&self, _path: &TransferPath) -> TransferResult {
            unreachable!("bridge only copies")
        }

        async fn info(&self, _path: &TransferPath) -> Result<FileInfo, TransferError> {
            unreachable!("bridge only copies")
        }
    }

    #[tokio::test]
    async fn upload_errors_survive_cleanup_failures() -> anyhow::Result<()> {
        let tmp_dir = testutils::create_temp_dir()?;
        let src_file = tmp_dir.join("payload.bin");
        tokio::fs::write(&src_file, vec![9u8; 64]).await?;
        let staging = testutils::create_temp_dir()?;
        let config = TransferConfig {
            staging_dir: Some(staging.clone()),
            ..Default::default()
        };
        let stats = Stats::new();

        let error = bridge_copy(
            &LocalStrategy::new(),
            &WreckedUpload,
            &stats,
            &TransferPath::Local(src_file),
            &TransferPath::Local(tmp_dir.join("out.bin")),
            &config,
            &Reporter::none(),
        )
        .await
        .unwrap_err();

        // the failed cleanup must not replace the upload error
        assert_eq!(error.kind(), ErrorKind::Network);
        assert!(error.message().contains("mid-upload"), "{error}");
        tokio::fs::remove_dir_all(&staging).await?;
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[test]
    fn allocations_are_unique_and_prefixed() {
        let first = StagingFile::allocate(None);
        let second = StagingFile::allocate(None);
        assert_ne!(first.path(), second.path());
        let name = first.path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("ferry-stage-"), "{name}");
    }

    #[tokio::test]
    async fn drop_removes_leftovers() -> anyhow::Result<()> {
        let tmp_dir = common::testutils::create_temp_dir()?;
        let staged_path = {
            let stage = StagingFile::allocate(Some(&tmp_dir));
            tokio::fs::write(stage.path(), b"partial").await?;
            stage.path().to_path_buf()
        };
        assert!(!staged_path.exists());

        let stage = StagingFile::allocate(Some(&tmp_dir));
        tokio::fs::write(stage.path(), b"done").await?;
        stage.remove().await?;
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }

    #[tokio::test]
    async fn removing_a_never_written_stage_is_fine() {
        let stage = StagingFile::allocate(None);
        assert!(stage.remove().await.is_ok());
    }
}
