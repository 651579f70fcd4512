//! Shared vocabulary for the ferry tools: the path resolver, the transfer
//! error taxonomy, progress plumbing and the binary run harness.
//!
//! Everything here is protocol-agnostic. The protocol strategies live in
//! `ferry-tools-backends`; the adaptive throttling layer lives in
//! `ferry-tools-admission`.

pub mod config;
pub mod error;
pub mod exec;
pub mod fileinfo;
pub mod path;
pub mod progress;
pub mod testutils;

pub use config::{OutputConfig, RuntimeConfig, TransferConfig};
pub use error::{ErrorKind, TransferError, TransferResult};
pub use exec::run;
pub use fileinfo::{FileInfo, FileKind};
pub use path::{ParseError, Provider, TransferPath, normalize, resolve};
pub use progress::{ProgressFn, Reporter, Stats, Summary};
