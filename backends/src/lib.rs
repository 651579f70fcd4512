//! Protocol strategies for the ferry tools.
//!
//! Every backend implements the [`Strategy`] contract: copy, move, delete,
//! exists, rename, create-directory and info, with results expressed in the
//! shared transfer taxonomy. The orchestrator in `ferry-tools-ferry` picks
//! the strategy (or pair of strategies) for a path and forwards the call;
//! nothing protocol-specific leaks past this crate.
//!
//! # Layout
//!
//! - [`local`] - local disk, including the per-directory trash used by soft
//!   deletes. Never throttled.
//! - [`remote`] - the engine shared by the SMB, SFTP and FTP strategies:
//!   session caching, admission integration, per-chunk I/O deadlines and the
//!   download/upload/server-side/staged copy dispatch. The wire clients
//!   behind it are collaborator seams ([`remote::RemoteFsSession`] and
//!   [`remote::Connect`]).
//! - [`smb`], [`sftp`], [`ftp`] - thin per-protocol types over the engine.
//! - [`cloud`] - multi-provider strategy over the [`cloud::CloudOps`] seam;
//!   authentication is checked before every call and same-provider moves are
//!   metadata-only.
//! - [`stage`] - the local staging file bridging endpoints that cannot talk
//!   to each other directly.
//! - [`creds`] - the credential-lookup seam, keyed by endpoint.
//! - [`memory`] - in-memory session and provider implementations backing the
//!   test suites.
//!
//! All remote work runs inside `AdmissionControl::with_throttle`, so a
//! struggling endpoint slows its own queue down without affecting others.

pub mod cloud;
pub mod creds;
pub mod ftp;
pub mod local;
pub mod memory;
pub mod remote;
pub mod sftp;
pub mod smb;
pub mod stage;
mod strategy;

pub use cloud::{CloudOps, CloudStrategy};
pub use creds::{CredentialSource, Credentials, NoCredentials, StaticCredentials};
pub use ftp::FtpStrategy;
pub use local::{LocalStrategy, TRASH_DIR};
pub use remote::{
    BoxedRead, BoxedWrite, Connect, DEFAULT_IO_TIMEOUT, Endpoint, NoTransport, RemoteEngine,
    RemoteFsSession,
};
pub use sftp::SftpStrategy;
pub use smb::SmbStrategy;
pub use stage::{StagingFile, bridge_copy};
pub use strategy::Strategy;
