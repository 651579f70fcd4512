use std::sync::Arc;
use std::time::Duration;

use async_recursion::async_recursion;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use admission::{AdmissionControl, EndpointKey, Priority, Protocol};
use common::config::TransferConfig;
use common::error::{TransferError, TransferResult};
use common::fileinfo::FileInfo;
use common::path::TransferPath;
use common::progress::{Reporter, Stats};

use crate::creds::{CredentialSource, Credentials};
use crate::stage::StagingFile;
use crate::strategy::{deny_existing, unsupported_path};

pub type BoxedRead = Box<dyn tokio::io::AsyncRead + Send + Unpin>;
pub type BoxedWrite = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;

pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Network location of a remote filesystem. Two paths on the same
/// endpoint (same host, port and login) share sessions and can use
/// server-side fast paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
}

impl Endpoint {
    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(format!("{}://{}:{}", self.protocol, self.host, self.port))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Wire-client seam: one connected session against a remote filesystem.
///
/// Paths are endpoint-relative strings (`share/dir/file` for SMB,
/// absolute `/dir/file` for SFTP and FTP). Implementations map their
/// protocol's failures into the transfer taxonomy at this boundary.
#[async_trait::async_trait]
pub trait RemoteFsSession: Send + Sync {
    /// `Ok(None)` when the entry does not exist.
    async fn stat(&self, path: &str) -> Result<Option<FileInfo>, TransferError>;
    /// Direct children of a directory as `(name, info)` pairs.
    async fn list(&self, path: &str) -> Result<Vec<(String, FileInfo)>, TransferError>;
    async fn open_read(&self, path: &str) -> Result<BoxedRead, TransferError>;
    async fn open_write(&self, path: &str) -> Result<BoxedWrite, TransferError>;
    async fn rename(&self, from: &str, to: &str) -> Result<(), TransferError>;
    /// Server-side copy; `Ok(false)` when the server cannot do it.
    async fn copy_file(&self, from: &str, to: &str) -> Result<bool, TransferError>;
    async fn remove_file(&self, path: &str) -> Result<(), TransferError>;
    async fn remove_dir(&self, path: &str) -> Result<(), TransferError>;
    /// Create a directory chain, tolerating existing components.
    async fn mkdirp(&self, path: &str) -> Result<(), TransferError>;
}

/// Collaborator seam that turns an endpoint plus credentials into a live
/// session. The stock binaries wire [`NoTransport`]; embedders provide
/// real clients.
#[async_trait::async_trait]
pub trait Connect: Send + Sync {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn RemoteFsSession>, TransferError>;
}

/// Connector for builds without a wire client; every connection attempt
/// explains what is missing.
#[derive(Debug)]
pub struct NoTransport {
    scheme: &'static str,
}

impl NoTransport {
    pub fn new(scheme: &'static str) -> Self {
        Self { scheme }
    }
}

#[async_trait::async_trait]
impl Connect for NoTransport {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        _credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn RemoteFsSession>, TransferError> {
        Err(TransferError::invalid_operation(format!(
            "no {} transport is configured, cannot reach {}",
            self.scheme, endpoint
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    host: String,
    port: u16,
    user: Option<String>,
    credentials: Option<Credentials>,
}

/// Shared implementation behind the SMB, SFTP and FTP strategies.
///
/// The engine owns session caching, admission integration, per-chunk I/O
/// deadlines and the copy/move dispatch (download, upload, server-side
/// fast path, staged fallback). The per-protocol strategy types add only
/// their `TransferPath` mapping and connector defaults.
pub struct RemoteEngine {
    protocol: Protocol,
    connector: Arc<dyn Connect>,
    credentials: Arc<dyn CredentialSource>,
    admission: Arc<AdmissionControl>,
    sessions: dashmap::DashMap<SessionKey, Arc<dyn RemoteFsSession>>,
    io_timeout: Duration,
}

impl RemoteEngine {
    pub fn new(
        protocol: Protocol,
        connector: Arc<dyn Connect>,
        credentials: Arc<dyn CredentialSource>,
        admission: Arc<AdmissionControl>,
        io_timeout: Duration,
    ) -> Self {
        debug_assert!(matches!(
            protocol,
            Protocol::Smb | Protocol::Sftp | Protocol::Ftp
        ));
        Self {
            protocol,
            connector,
            credentials,
            admission,
            sessions: dashmap::DashMap::new(),
            io_timeout,
        }
    }

    /// Maps a path onto this engine's protocol: the endpoint plus the
    /// session-relative path string.
    fn locate(
        &self,
        path: &TransferPath,
        operation: &str,
    ) -> Result<(Endpoint, String), TransferError> {
        match (self.protocol, path) {
            (
                Protocol::Smb,
                TransferPath::Smb {
                    host,
                    port,
                    share,
                    path,
                },
            ) => Ok((
                Endpoint {
                    protocol: Protocol::Smb,
                    host: host.clone(),
                    port: *port,
                    user: None,
                },
                if path.is_empty() {
                    share.clone()
                } else {
                    format!("{share}/{path}")
                },
            )),
            (
                Protocol::Sftp,
                TransferPath::Sftp {
                    user,
                    host,
                    port,
                    path,
                },
            ) => Ok((
                Endpoint {
                    protocol: Protocol::Sftp,
                    host: host.clone(),
                    port: *port,
                    user: user.clone(),
                },
                path.clone(),
            )),
            (Protocol::Ftp, TransferPath::Ftp { host, port, path }) => Ok((
                Endpoint {
                    protocol: Protocol::Ftp,
                    host: host.clone(),
                    port: *port,
                    user: None,
                },
                path.clone(),
            )),
            _ => Err(unsupported_path(operation, path)),
        }
    }

    async fn session(
        &self,
        endpoint: &Endpoint,
        limit: Duration,
    ) -> Result<Arc<dyn RemoteFsSession>, TransferError> {
        let credentials = self.credentials.lookup(endpoint).await?;
        let key = SessionKey {
            host: endpoint.host.clone(),
            port: endpoint.port,
            user: endpoint.user.clone(),
            credentials,
        };
        if let Some(session) = self.sessions.get(&key) {
            return Ok(session.clone());
        }
        let session = deadline(
            limit,
            self.connector.connect(endpoint, key.credentials.as_ref()),
        )
        .await?;
        tracing::debug!("connected a new {} session", endpoint);
        self.sessions.insert(key, session.clone());
        Ok(session)
    }

    fn limit_for(&self, key: &EndpointKey) -> Duration {
        if self.admission.is_degraded(key) {
            self.io_timeout * 2
        } else {
            self.io_timeout
        }
    }

    fn buffer_for(&self, key: &EndpointKey, config: &TransferConfig) -> usize {
        config
            .buffer_size
            .unwrap_or_else(|| self.admission.buffer_size(key))
    }

    async fn throttled<T, F, Fut>(
        &self,
        endpoint: &Endpoint,
        priority: Priority,
        op: F,
    ) -> Result<T, TransferError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let key = endpoint.key();
        self.admission
            .with_throttle(self.protocol, &key, priority, op)
            .await
    }

    #[tracing::instrument(level = "debug", skip(self, stats, config, progress))]
    pub async fn copy(
        &self,
        stats: &Stats,
        src: &TransferPath,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        match (self.locate(src, "copy").ok(), self.locate(dst, "copy").ok()) {
            (Some(src_loc), Some(dst_loc)) => {
                self.copy_remote_to_remote(stats, src_loc, dst_loc, dst, config, progress)
                    .await
            }
            (Some(src_loc), None) => {
                let TransferPath::Local(local_dst) = dst else {
                    return Err(unsupported_path("copy", dst));
                };
                self.download(stats, src_loc, local_dst, dst, config, progress)
                    .await
            }
            (None, Some(dst_loc)) => {
                let TransferPath::Local(local_src) = src else {
                    return Err(unsupported_path("copy", src));
                };
                self.upload(stats, local_src, dst_loc, dst, config, progress)
                    .await
            }
            (None, None) => Err(unsupported_path("copy", src)),
        }
    }

    async fn download(
        &self,
        stats: &Stats,
        (endpoint, remote_src): (Endpoint, String),
        local_dst: &std::path::Path,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        self.throttled(&endpoint, config.priority, || async {
            let key = endpoint.key();
            let limit = self.limit_for(&key);
            let buffer = self.buffer_for(&key, config);
            let session = self.session(&endpoint, limit).await?;
            let info = deadline(limit, session.stat(&remote_src))
                .await?
                .ok_or_else(|| TransferError::not_found(format!("{endpoint}: {remote_src}")))?;
            if !config.overwrite && tokio::fs::symlink_metadata(local_dst).await.is_ok() {
                return Err(deny_existing(dst));
            }
            if info.is_dir() {
                pull_tree(session.as_ref(), &remote_src, local_dst, limit, buffer, stats).await?;
            } else {
                if let Some(parent) = local_dst.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                pull_file(
                    session.as_ref(),
                    &remote_src,
                    local_dst,
                    info.size,
                    limit,
                    buffer,
                    stats,
                    progress,
                )
                .await?;
            }
            Ok(dst.clone())
        })
        .await
    }

    async fn upload(
        &self,
        stats: &Stats,
        local_src: &std::path::Path,
        (endpoint, remote_dst): (Endpoint, String),
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        self.throttled(&endpoint, config.priority, || async {
            let key = endpoint.key();
            let limit = self.limit_for(&key);
            let buffer = self.buffer_for(&key, config);
            let session = self.session(&endpoint, limit).await?;
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
            if !config.overwrite
                && deadline(limit, session.stat(&remote_dst)).await?.is_some()
            {
                return Err(deny_existing(dst));
            }
            if let Some(parent) = remote_parent(&remote_dst) {
                deadline(limit, session.mkdirp(parent)).await?;
            }
            if metadata.is_dir() {
                push_tree(session.as_ref(), local_src, &remote_dst, limit, buffer, stats).await?;
            } else {
                push_file(
                    session.as_ref(),
                    local_src,
                    &remote_dst,
                    limit,
                    buffer,
                    stats,
                    progress,
                )
                .await?;
            }
            Ok(dst.clone())
        })
        .await
    }

    async fn copy_remote_to_remote(
        &self,
        stats: &Stats,
        (src_endpoint, src_path): (Endpoint, String),
        (dst_endpoint, dst_path): (Endpoint, String),
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        if src_endpoint == dst_endpoint {
            return self
                .throttled(&src_endpoint, config.priority, || async {
                    let key = src_endpoint.key();
                    let limit = self.limit_for(&key);
                    let buffer = self.buffer_for(&key, config);
                    let session = self.session(&src_endpoint, limit).await?;
                    let info = deadline(limit, session.stat(&src_path)).await?.ok_or_else(
                        || TransferError::not_found(format!("{src_endpoint}: {src_path}")),
                    )?;
                    if info.is_dir() {
                        return Err(directory_bridge_error());
                    }
                    if !config.overwrite
                        && deadline(limit, session.stat(&dst_path)).await?.is_some()
                    {
                        return Err(deny_existing(dst));
                    }
                    if let Some(parent) = remote_parent(&dst_path) {
                        deadline(limit, session.mkdirp(parent)).await?;
                    }
                    if deadline(limit, session.copy_file(&src_path, &dst_path)).await? {
                        stats.add_bytes_copied(info.size);
                        stats.add_file_copied();
                        progress.report(info.size, info.size);
                        return Ok(dst.clone());
                    }
                    tracing::debug!("server cannot copy {src_path} itself, staging locally");
                    let stage = StagingFile::allocate(config.staging_dir.as_deref());
                    let scratch = Stats::new();
                    let staged = async {
                        pull_file(
                            session.as_ref(),
                            &src_path,
                            stage.path(),
                            info.size,
                            limit,
                            buffer,
                            &scratch,
                            &progress.stage(0, 2),
                        )
                        .await?;
                        push_file(
                            session.as_ref(),
                            stage.path(),
                            &dst_path,
                            limit,
                            buffer,
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
                .await;
        }

        // different endpoints: stage locally, each phase under its own
        // endpoint's admission slot
        let stage = StagingFile::allocate(config.staging_dir.as_deref());
        let scratch = Stats::new();
        let downloaded = self
            .throttled(&src_endpoint, config.priority, || async {
                let key = src_endpoint.key();
                let limit = self.limit_for(&key);
                let buffer = self.buffer_for(&key, config);
                let session = self.session(&src_endpoint, limit).await?;
                let info = deadline(limit, session.stat(&src_path)).await?.ok_or_else(
                    || TransferError::not_found(format!("{src_endpoint}: {src_path}")),
                )?;
                if info.is_dir() {
                    return Err(directory_bridge_error());
                }
                pull_file(
                    session.as_ref(),
                    &src_path,
                    stage.path(),
                    info.size,
                    limit,
                    buffer,
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
            .throttled(&dst_endpoint, config.priority, || async {
                let key = dst_endpoint.key();
                let limit = self.limit_for(&key);
                let buffer = self.buffer_for(&key, config);
                let session = self.session(&dst_endpoint, limit).await?;
                if !config.overwrite
                    && deadline(limit, session.stat(&dst_path)).await?.is_some()
                {
                    return Err(deny_existing(dst));
                }
                if let Some(parent) = remote_parent(&dst_path) {
                    deadline(limit, session.mkdirp(parent)).await?;
                }
                push_file(
                    session.as_ref(),
                    stage.path(),
                    &dst_path,
                    limit,
                    buffer,
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

    #[tracing::instrument(level = "debug", skip(self, stats, config, progress))]
    pub async fn mv(
        &self,
        stats: &Stats,
        src: &TransferPath,
        dst: &TransferPath,
        config: &TransferConfig,
        progress: &Reporter,
    ) -> TransferResult {
        if let (Ok((src_endpoint, src_path)), Ok((dst_endpoint, dst_path))) =
            (self.locate(src, "move"), self.locate(dst, "move"))
            && src_endpoint == dst_endpoint
        {
            return self
                .throttled(&src_endpoint, config.priority, || async {
                    let key = src_endpoint.key();
                    let limit = self.limit_for(&key);
                    let session = self.session(&src_endpoint, limit).await?;
                    let info = deadline(limit, session.stat(&src_path)).await?.ok_or_else(
                        || TransferError::not_found(format!("{src_endpoint}: {src_path}")),
                    )?;
                    if !config.overwrite
                        && deadline(limit, session.stat(&dst_path)).await?.is_some()
                    {
                        return Err(deny_existing(dst));
                    }
                    if let Some(parent) = remote_parent(&dst_path) {
                        deadline(limit, session.mkdirp(parent)).await?;
                    }
                    deadline(limit, session.rename(&src_path, &dst_path)).await?;
                    stats.add_file_moved();
                    progress.report(info.size, info.size);
                    Ok(dst.clone())
                })
                .await;
        }

        // cross endpoint (or one side local): copy, then drop the source
        // only once the copy fully succeeded
        let copied = self.copy(stats, src, dst, config, progress).await?;
        self.remove_moved_source(stats, src).await?;
        stats.add_file_moved();
        Ok(copied)
    }

    /// A move relocates; its source removal is always permanent.
    async fn remove_moved_source(&self, stats: &Stats, src: &TransferPath) -> Result<(), TransferError> {
        match src {
            TransferPath::Local(path) => {
                let metadata = tokio::fs::symlink_metadata(path).await?;
                if metadata.is_dir() {
                    tokio::fs::remove_dir_all(path).await?;
                } else {
                    tokio::fs::remove_file(path).await?;
                }
                stats.add_entry_removed();
                Ok(())
            }
            _ => self.delete(stats, src, true).await.map(|_| ()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, stats))]
    pub async fn delete(
        &self,
        stats: &Stats,
        path: &TransferPath,
        permanent: bool,
    ) -> TransferResult {
        let (endpoint, remote_path) = self.locate(path, "delete")?;
        if !permanent {
            tracing::debug!("remote deletes are always permanent");
        }
        self.throttled(&endpoint, Priority::Low, || async {
            let key = endpoint.key();
            let limit = self.limit_for(&key);
            let session = self.session(&endpoint, limit).await?;
            let info = deadline(limit, session.stat(&remote_path))
                .await?
                .ok_or_else(|| TransferError::not_found(format!("{endpoint}: {remote_path}")))?;
            if info.is_dir() {
                remove_tree(session.as_ref(), &remote_path, limit, stats).await?;
            } else {
                deadline(limit, session.remove_file(&remote_path)).await?;
                stats.add_entry_removed();
            }
            Ok(path.clone())
        })
        .await
    }

    pub async fn exists(&self, path: &TransferPath) -> Result<bool, TransferError> {
        let (endpoint, remote_path) = self.locate(path, "exists")?;
        self.throttled(&endpoint, Priority::Low, || async {
            let limit = self.limit_for(&endpoint.key());
            let session = self.session(&endpoint, limit).await?;
            Ok(deadline(limit, session.stat(&remote_path)).await?.is_some())
        })
        .await
    }

    pub async fn info(&self, path: &TransferPath) -> Result<FileInfo, TransferError> {
        let (endpoint, remote_path) = self.locate(path, "info")?;
        self.throttled(&endpoint, Priority::Low, || async {
            let limit = self.limit_for(&endpoint.key());
            let session = self.session(&endpoint, limit).await?;
            deadline(limit, session.stat(&remote_path))
                .await?
                .ok_or_else(|| TransferError::not_found(format!("{endpoint}: {remote_path}")))
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, stats))]
    pub async fn rename(
        &self,
        stats: &Stats,
        path: &TransferPath,
        new_name: &str,
    ) -> TransferResult {
        if new_name.contains('/') || new_name.is_empty() {
            return Err(TransferError::invalid_operation(format!(
                "{new_name:?} is not a valid entry name"
            )));
        }
        let (endpoint, remote_path) = self.locate(path, "rename")?;
        let renamed = path.with_name(new_name).ok_or_else(|| {
            TransferError::invalid_operation(format!("{path} has no name to replace"))
        })?;
        let (_, renamed_path) = self.locate(&renamed, "rename")?;
        self.throttled(&endpoint, Priority::Low, || async {
            let key = endpoint.key();
            let limit = self.limit_for(&key);
            let session = self.session(&endpoint, limit).await?;
            if deadline(limit, session.stat(&remote_path)).await?.is_none() {
                return Err(TransferError::not_found(format!(
                    "{endpoint}: {remote_path}"
                )));
            }
            if deadline(limit, session.stat(&renamed_path)).await?.is_some() {
                return Err(deny_existing(&renamed));
            }
            deadline(limit, session.rename(&remote_path, &renamed_path)).await?;
            stats.add_file_moved();
            Ok(renamed.clone())
        })
        .await
    }

    pub async fn create_directory(&self, path: &TransferPath) -> TransferResult {
        let (endpoint, remote_path) = self.locate(path, "create directory")?;
        self.throttled(&endpoint, Priority::Low, || async {
            let limit = self.limit_for(&endpoint.key());
            let session = self.session(&endpoint, limit).await?;
            deadline(limit, session.mkdirp(&remote_path)).await?;
            Ok(path.clone())
        })
        .await
    }
}

fn directory_bridge_error() -> TransferError {
    TransferError::invalid_operation(
        "directory copies between remote endpoints are not supported, copy through a local path",
    )
}

async fn deadline<T>(
    limit: Duration,
    operation: impl Future<Output = Result<T, TransferError>>,
) -> Result<T, TransferError> {
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(TransferError::timeout(format!(
            "remote I/O exceeded {limit:?}"
        ))),
    }
}

fn remote_parent(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => Some(parent),
        _ => None,
    }
}

fn join_remote(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

#[allow(clippy::too_many_arguments)]
async fn pull_file(
    session: &dyn RemoteFsSession,
    remote_src: &str,
    local_dst: &std::path::Path,
    size: u64,
    limit: Duration,
    buffer: usize,
    stats: &Stats,
    progress: &Reporter,
) -> Result<(), TransferError> {
    let mut reader = deadline(limit, session.open_read(remote_src)).await?;
    let mut file = tokio::fs::File::create(local_dst).await?;
    let mut buf = vec![0u8; buffer];
    let mut copied = 0u64;
    loop {
        let read = deadline(limit, async { Ok(reader.read(&mut buf).await?) }).await?;
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

async fn push_file(
    session: &dyn RemoteFsSession,
    local_src: &std::path::Path,
    remote_dst: &str,
    limit: Duration,
    buffer: usize,
    stats: &Stats,
    progress: &Reporter,
) -> Result<(), TransferError> {
    let size = tokio::fs::metadata(local_src).await?.len();
    let mut file = tokio::fs::File::open(local_src).await?;
    let mut writer = deadline(limit, session.open_write(remote_dst)).await?;
    let mut buf = vec![0u8; buffer];
    let mut copied = 0u64;
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        deadline(limit, async { Ok(writer.write_all(&buf[..read]).await?) }).await?;
        copied += read as u64;
        stats.add_bytes_copied(read as u64);
        progress.report(copied, size);
    }
    deadline(limit, async { Ok(writer.shutdown().await?) }).await?;
    stats.add_file_copied();
    progress.report(copied, size);
    Ok(())
}

#[async_recursion]
async fn pull_tree(
    session: &dyn RemoteFsSession,
    remote_root: &str,
    local_root: &std::path::Path,
    limit: Duration,
    buffer: usize,
    stats: &Stats,
) -> Result<(), TransferError> {
    tokio::fs::create_dir_all(local_root).await?;
    stats.add_directory_created();
    for (name, info) in deadline(limit, session.list(remote_root)).await? {
        let child_remote = join_remote(remote_root, &name);
        let child_local = local_root.join(&name);
        if info.is_dir() {
            pull_tree(session, &child_remote, &child_local, limit, buffer, stats).await?;
        } else {
            pull_file(
                session,
                &child_remote,
                &child_local,
                info.size,
                limit,
                buffer,
                stats,
                &Reporter::none(),
            )
            .await?;
        }
    }
    Ok(())
}

#[async_recursion]
async fn push_tree(
    session: &dyn RemoteFsSession,
    local_root: &std::path::Path,
    remote_root: &str,
    limit: Duration,
    buffer: usize,
    stats: &Stats,
) -> Result<(), TransferError> {
    deadline(limit, session.mkdirp(remote_root)).await?;
    stats.add_directory_created();
    let mut entries = tokio::fs::read_dir(local_root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let child_remote = join_remote(remote_root, &name);
        if entry.file_type().await?.is_dir() {
            push_tree(session, &entry.path(), &child_remote, limit, buffer, stats).await?;
        } else {
            push_file(
                session,
                &entry.path(),
                &child_remote,
                limit,
                buffer,
                stats,
                &Reporter::none(),
            )
            .await?;
        }
    }
    Ok(())
}

#[async_recursion]
async fn remove_tree(
    session: &dyn RemoteFsSession,
    remote_root: &str,
    limit: Duration,
    stats: &Stats,
) -> Result<(), TransferError> {
    for (name, info) in deadline(limit, session.list(remote_root)).await? {
        let child = join_remote(remote_root, &name);
        if info.is_dir() {
            remove_tree(session, &child, limit, stats).await?;
        } else {
            deadline(limit, session.remove_file(&child)).await?;
            stats.add_entry_removed();
        }
    }
    deadline(limit, session.remove_dir(remote_root)).await?;
    stats.add_entry_removed();
    Ok(())
}
