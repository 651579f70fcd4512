use common::config::TransferConfig;
use common::error::{TransferError, TransferResult};
use common::fileinfo::FileInfo;
use common::path::TransferPath;
use common::progress::{Reporter, Stats};

/// Uniform operation contract every backend implements.
///
/// Paths arrive pre-resolved; a strategy only ever sees paths it is
/// responsible for (plus the local side of an upload or download) and
/// answers `InvalidOperation` for anything else. `Ok` values carry the
/// final path of the affected entry.
#[async_trait::async_trait]
pub trait Strategy: Send + Sync {
    async fn copy(
        &self,
        stats: &Stats,
        src: &TransferPath,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult;

    async fn mv(
        &self,
        stats: &Stats,
        src: &TransferPath,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult;

    async fn delete(&self, stats: &Stats, path: &TransferPath, permanent: bool) -> TransferResult;

    async fn exists(&self, path: &TransferPath) -> Result<bool, TransferError>;

    async fn rename(&self, stats: &Stats, path: &TransferPath, new_name: &str) -> TransferResult;

    async fn create_directory(&self, path: &TransferPath) -> TransferResult;

    async fn info(&self, path: &TransferPath) -> Result<FileInfo, TransferError>;
}

pub(crate) fn unsupported_path(operation: &str, path: &TransferPath) -> TransferError {
    TransferError::invalid_operation(format!(
        "{operation} does not support {path} (wrong backend for this path)"
    ))
}

/// Destination pre-check shared by the copy/move entry points.
pub(crate) fn deny_existing(dst: &TransferPath) -> TransferError {
    TransferError::already_exists(format!("{dst} already exists (pass overwrite to replace it)"))
}
