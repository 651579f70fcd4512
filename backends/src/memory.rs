//! In-memory stand-ins for the wire-client seams.
//!
//! [`MemoryFs`] implements [`RemoteFsSession`] over a flat key/value tree
//! and [`MemoryCloud`] implements [`CloudOps`] with an operation log.
//! They back the test suites and let embedders exercise the strategy
//! layer without a server.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use dashmap::DashMap;
use tokio::io::AsyncReadExt;

use common::error::TransferError;
use common::fileinfo::FileInfo;

use crate::cloud::CloudOps;
use crate::creds::Credentials;
use crate::remote::{BoxedRead, BoxedWrite, Connect, Endpoint, RemoteFsSession};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    File(Vec<u8>),
    Dir,
}

impl Node {
    fn info(&self) -> FileInfo {
        match self {
            Node::File(bytes) => FileInfo::file(bytes.len() as u64),
            Node::Dir => FileInfo::directory(),
        }
    }
}

/// Keys are slash-separated relative paths; the root is the empty key.
fn canonical(path: &str) -> String {
    path.trim_matches('/').to_string()
}

struct FsState {
    nodes: DashMap<String, Node>,
    server_copy: bool,
    stalled: AtomicBool,
    fail_writes: AtomicBool,
}

/// In-memory remote filesystem.
///
/// `new()` behaves like a server with a native copy primitive (SMB-like),
/// `without_server_copy()` like one without (FTP-like). `stall()` parks
/// every session call forever so timeout paths can be driven under
/// `start_paused` test runtimes, and `fail_writes()` rejects uploads
/// mid-stream.
#[derive(Clone)]
pub struct MemoryFs {
    state: Arc<FsState>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::with_server_copy(true)
    }

    pub fn without_server_copy() -> Self {
        Self::with_server_copy(false)
    }

    fn with_server_copy(server_copy: bool) -> Self {
        Self {
            state: Arc::new(FsState {
                nodes: DashMap::new(),
                server_copy,
                stalled: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    pub fn stall(&self, on: bool) {
        self.state.stalled.store(on, Ordering::Relaxed);
    }

    pub fn fail_writes(&self, on: bool) {
        self.state.fail_writes.store(on, Ordering::Relaxed);
    }

    pub fn insert_file(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.state
            .nodes
            .insert(canonical(path), Node::File(bytes.into()));
    }

    pub fn insert_dir(&self, path: &str) {
        self.state.nodes.insert(canonical(path), Node::Dir);
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.node_at(path) {
            Some(Node::File(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn entry_exists(&self, path: &str) -> bool {
        self.state.nodes.contains_key(&canonical(path))
    }

    /// Cloned snapshot so no shard guard is held across later mutations.
    fn node_at(&self, path: &str) -> Option<Node> {
        self.state
            .nodes
            .get(&canonical(path))
            .map(|entry| entry.value().clone())
    }

    /// All stored keys, sorted, for tree-shape assertions.
    pub fn paths(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.state.nodes.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    async fn gate(&self) {
        if self.state.stalled.load(Ordering::Relaxed) {
            std::future::pending::<()>().await;
        }
    }

    fn children_of(&self, base: &str) -> Vec<(String, FileInfo)> {
        let prefix = if base.is_empty() {
            String::new()
        } else {
            format!("{base}/")
        };
        let mut children: Vec<_> = self
            .state
            .nodes
            .iter()
            .filter_map(|entry| {
                let rest = entry.key().strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    return None;
                }
                Some((rest.to_string(), entry.value().info()))
            })
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        children
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RemoteFsSession for MemoryFs {
    async fn stat(&self, path: &str) -> Result<Option<FileInfo>, TransferError> {
        self.gate().await;
        if canonical(path).is_empty() {
            return Ok(Some(FileInfo::directory()));
        }
        Ok(self.node_at(path).map(|node| node.info()))
    }

    async fn list(&self, path: &str) -> Result<Vec<(String, FileInfo)>, TransferError> {
        self.gate().await;
        let key = canonical(path);
        if !key.is_empty() && !matches!(self.node_at(path), Some(Node::Dir)) {
            return Err(TransferError::not_found(format!("{path} is not a directory")));
        }
        Ok(self.children_of(&key))
    }

    async fn open_read(&self, path: &str) -> Result<BoxedRead, TransferError> {
        self.gate().await;
        match self.node_at(path) {
            Some(Node::File(bytes)) => Ok(Box::new(std::io::Cursor::new(bytes))),
            Some(Node::Dir) => Err(TransferError::invalid_operation(format!(
                "{path} is a directory"
            ))),
            None => Err(TransferError::not_found(path.to_string())),
        }
    }

    async fn open_write(&self, path: &str) -> Result<BoxedWrite, TransferError> {
        self.gate().await;
        Ok(Box::new(MemoryWriter {
            state: self.state.clone(),
            path: canonical(path),
            buf: Vec::new(),
        }))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), TransferError> {
        self.gate().await;
        let from = canonical(from);
        let to = canonical(to);
        let (_, node) = self
            .state
            .nodes
            .remove(&from)
            .ok_or_else(|| TransferError::not_found(from.clone()))?;
        if node == Node::Dir {
            let moved: Vec<_> = self
                .state
                .nodes
                .iter()
                .filter_map(|entry| {
                    let rest = entry.key().strip_prefix(&format!("{from}/"))?;
                    Some((entry.key().clone(), format!("{to}/{rest}")))
                })
                .collect();
            for (old, new) in moved {
                if let Some((_, child)) = self.state.nodes.remove(&old) {
                    self.state.nodes.insert(new, child);
                }
            }
        }
        self.state.nodes.insert(to, node);
        Ok(())
    }

    async fn copy_file(&self, from: &str, to: &str) -> Result<bool, TransferError> {
        self.gate().await;
        if !self.state.server_copy {
            return Ok(false);
        }
        match self.node_at(from) {
            Some(Node::File(bytes)) => {
                self.state.nodes.insert(canonical(to), Node::File(bytes));
                Ok(true)
            }
            Some(Node::Dir) => Err(TransferError::invalid_operation(format!(
                "{from} is a directory"
            ))),
            None => Err(TransferError::not_found(from.to_string())),
        }
    }

    async fn remove_file(&self, path: &str) -> Result<(), TransferError> {
        self.gate().await;
        match self.node_at(path) {
            Some(Node::File(_)) => {
                self.state.nodes.remove(&canonical(path));
                Ok(())
            }
            Some(Node::Dir) => Err(TransferError::invalid_operation(format!(
                "{path} is a directory"
            ))),
            None => Err(TransferError::not_found(path.to_string())),
        }
    }

    async fn remove_dir(&self, path: &str) -> Result<(), TransferError> {
        self.gate().await;
        let key = canonical(path);
        if key.is_empty() {
            return Err(TransferError::invalid_operation(
                "cannot remove the filesystem root",
            ));
        }
        if !matches!(self.node_at(path), Some(Node::Dir)) {
            return Err(TransferError::not_found(path.to_string()));
        }
        if !self.children_of(&key).is_empty() {
            return Err(TransferError::invalid_operation(format!(
                "{path} is not empty"
            )));
        }
        self.state.nodes.remove(&key);
        Ok(())
    }

    async fn mkdirp(&self, path: &str) -> Result<(), TransferError> {
        self.gate().await;
        let key = canonical(path);
        if key.is_empty() {
            return Ok(());
        }
        let mut built = String::new();
        for segment in key.split('/') {
            if !built.is_empty() {
                built.push('/');
            }
            built.push_str(segment);
            match self.node_at(&built) {
                Some(Node::File(_)) => {
                    return Err(TransferError::already_exists(format!(
                        "{built} exists and is not a directory"
                    )));
                }
                Some(Node::Dir) => {}
                None => {
                    self.state.nodes.insert(built.clone(), Node::Dir);
                }
            }
        }
        Ok(())
    }
}

/// Buffers writes and commits the file when the caller shuts down, the
/// way a real upload stream materializes server-side on close.
struct MemoryWriter {
    state: Arc<FsState>,
    path: String,
    buf: Vec<u8>,
}

impl tokio::io::AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        if this.state.fail_writes.load(Ordering::Relaxed) {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write rejected by test fixture",
            )));
        }
        this.buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let bytes = std::mem::take(&mut this.buf);
        this.state.nodes.insert(this.path.clone(), Node::File(bytes));
        Poll::Ready(Ok(()))
    }
}

/// Connector serving [`MemoryFs`] fixtures by `host:port`, counting
/// connections so session-reuse behavior can be asserted.
#[derive(Default)]
pub struct MemoryConnector {
    endpoints: DashMap<(String, u16), MemoryFs>,
    connects: DashMap<(String, u16), usize>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, host: &str, port: u16, fs: MemoryFs) {
        self.endpoints.insert((host.to_string(), port), fs);
    }

    pub fn connect_count(&self, host: &str, port: u16) -> usize {
        self.connects
            .get(&(host.to_string(), port))
            .map(|count| *count)
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl Connect for MemoryConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        _credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn RemoteFsSession>, TransferError> {
        let key = (endpoint.host.clone(), endpoint.port);
        let fs = self
            .endpoints
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                TransferError::network(format!("no fixture filesystem for {endpoint}"))
            })?;
        *self.connects.entry(key).or_insert(0) += 1;
        Ok(Arc::new(fs))
    }
}

struct CloudState {
    nodes: DashMap<String, Node>,
    account: String,
    authed: AtomicBool,
    supports_copy: bool,
    fail_uploads: AtomicBool,
    log: std::sync::Mutex<Vec<String>>,
}

impl CloudState {
    fn log(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

/// In-memory cloud provider with an operation log.
///
/// The log records the provider calls that actually ran, so tests can
/// tell a metadata-only move from a staged download/upload round trip.
#[derive(Clone)]
pub struct MemoryCloud {
    state: Arc<CloudState>,
}

impl MemoryCloud {
    pub fn new(account: &str) -> Self {
        Self::with_copy_support(account, true)
    }

    pub fn without_copy_support(account: &str) -> Self {
        Self::with_copy_support(account, false)
    }

    fn with_copy_support(account: &str, supports_copy: bool) -> Self {
        Self {
            state: Arc::new(CloudState {
                nodes: DashMap::new(),
                account: account.to_string(),
                authed: AtomicBool::new(true),
                supports_copy,
                fail_uploads: AtomicBool::new(false),
                log: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn sign_out(&self) {
        self.state.authed.store(false, Ordering::Relaxed);
    }

    pub fn sign_in(&self) {
        self.state.authed.store(true, Ordering::Relaxed);
    }

    /// Make every upload fail mid-call, as a quota or consistency error
    /// from a real provider would.
    pub fn fail_uploads(&self, on: bool) {
        self.state.fail_uploads.store(on, Ordering::Relaxed);
    }

    pub fn insert_file(&self, id_or_path: &str, bytes: impl Into<Vec<u8>>) {
        self.state
            .nodes
            .insert(canonical(id_or_path), Node::File(bytes.into()));
    }

    pub fn contents(&self, id_or_path: &str) -> Option<Vec<u8>> {
        match self.node_at(id_or_path) {
            Some(Node::File(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn entry_exists(&self, id_or_path: &str) -> bool {
        self.state.nodes.contains_key(&canonical(id_or_path))
    }

    fn node_at(&self, id_or_path: &str) -> Option<Node> {
        self.state
            .nodes
            .get(&canonical(id_or_path))
            .map(|entry| entry.value().clone())
    }

    pub fn operations(&self) -> Vec<String> {
        self.state.log.lock().unwrap().clone()
    }
}

fn cloud_key(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => canonical(&format!("{parent}/{name}")),
        None => canonical(name),
    }
}

#[async_trait::async_trait]
impl CloudOps for MemoryCloud {
    async fn ensure_auth(&self) -> Result<(), TransferError> {
        if self.state.authed.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(TransferError::auth_required(format!(
                "account {} is signed out",
                self.state.account
            )))
        }
    }

    async fn account(&self) -> Result<Option<String>, TransferError> {
        Ok(Some(self.state.account.clone()))
    }

    async fn stat(&self, id_or_path: &str) -> Result<Option<FileInfo>, TransferError> {
        Ok(self.node_at(id_or_path).map(|node| node.info()))
    }

    async fn download(&self, id_or_path: &str) -> Result<BoxedRead, TransferError> {
        self.state.log(format!("download {}", canonical(id_or_path)));
        match self.node_at(id_or_path) {
            Some(Node::File(bytes)) => Ok(Box::new(std::io::Cursor::new(bytes))),
            Some(Node::Dir) => Err(TransferError::invalid_operation(format!(
                "{id_or_path} is a folder"
            ))),
            None => Err(TransferError::not_found(id_or_path.to_string())),
        }
    }

    async fn upload(
        &self,
        parent: Option<&str>,
        name: &str,
        _size_hint: u64,
        mut data: BoxedRead,
    ) -> Result<(), TransferError> {
        let key = cloud_key(parent, name);
        if self.state.fail_uploads.load(Ordering::Relaxed) {
            return Err(TransferError::network(format!(
                "upload of {key} rejected by test fixture"
            )));
        }
        self.state.log(format!("upload {key}"));
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes).await?;
        self.state.nodes.insert(key, Node::File(bytes));
        Ok(())
    }

    async fn copy_item(
        &self,
        id_or_path: &str,
        dst_parent: Option<&str>,
        dst_name: &str,
    ) -> Result<bool, TransferError> {
        if !self.state.supports_copy {
            return Ok(false);
        }
        let src = canonical(id_or_path);
        let dst = cloud_key(dst_parent, dst_name);
        match self.node_at(&src) {
            Some(Node::File(bytes)) => {
                self.state.log(format!("copy {src} -> {dst}"));
                self.state.nodes.insert(dst, Node::File(bytes));
                Ok(true)
            }
            Some(Node::Dir) => Err(TransferError::invalid_operation(format!(
                "{id_or_path} is a folder"
            ))),
            None => Err(TransferError::not_found(id_or_path.to_string())),
        }
    }

    async fn move_item(
        &self,
        id_or_path: &str,
        dst_parent: Option<&str>,
    ) -> Result<String, TransferError> {
        let src = canonical(id_or_path);
        let name = src.rsplit('/').next().unwrap_or(&src).to_string();
        let dst = cloud_key(dst_parent, &name);
        let (_, node) = self
            .state
            .nodes
            .remove(&src)
            .ok_or_else(|| TransferError::not_found(id_or_path.to_string()))?;
        self.state.log(format!("move {src} -> {dst}"));
        self.state.nodes.insert(dst.clone(), node);
        Ok(dst)
    }

    async fn rename_item(&self, id_or_path: &str, new_name: &str) -> Result<(), TransferError> {
        let src = canonical(id_or_path);
        let dst = match src.rsplit_once('/') {
            Some((parent, _)) => format!("{parent}/{new_name}"),
            None => new_name.to_string(),
        };
        let (_, node) = self
            .state
            .nodes
            .remove(&src)
            .ok_or_else(|| TransferError::not_found(id_or_path.to_string()))?;
        self.state.log(format!("rename {src} -> {dst}"));
        self.state.nodes.insert(dst, node);
        Ok(())
    }

    async fn delete(&self, id_or_path: &str, permanent: bool) -> Result<(), TransferError> {
        let key = canonical(id_or_path);
        if self.state.nodes.remove(&key).is_none() {
            return Err(TransferError::not_found(id_or_path.to_string()));
        }
        self.state.log(format!("delete {key} permanent={permanent}"));
        Ok(())
    }

    async fn mkdir(&self, parent: Option<&str>, name: &str) -> Result<(), TransferError> {
        let key = cloud_key(parent, name);
        self.state.log(format!("mkdir {key}"));
        self.state.nodes.insert(key, Node::Dir);
        Ok(())
    }
}
