//! Multi-protocol file transfer tool - `ferry`
//!
//! `ferry` moves, copies and deletes files across heterogeneous storage
//! backends from one set of commands:
//!
//! ```bash
//! # local copy, like cp but with the same semantics as every other backend
//! ferry cp /data/report.pdf /backup/report.pdf --summary
//!
//! # upload to an SMB share, download from SFTP
//! ferry cp /data/report.pdf smb://nas/backup/report.pdf
//! ferry cp sftp://deploy@files/srv/logs.tar.gz /tmp/logs.tar.gz --progress
//!
//! # cross-protocol move, staged through a local temporary file
//! ferry mv sftp://h/a.jpg cloud://dropbox/folder/a.jpg
//!
//! # soft delete into the per-directory trash, then empty it later
//! ferry rm /data/old-report.pdf
//! ferry purge /data
//! ```
//!
//! Path syntax: plain paths are local, `smb://host[:port]/share/path`,
//! `sftp://[user@]host[:port]/path`, `ftp://host[:port]/path` and
//! `cloud://{provider}/{idOrPath}` (providers: `google_drive`, `dropbox`,
//! `onedrive`) are remote. Malformed spellings (backslashes, doubled or
//! missing slashes) are normalized before classification.
//!
//! Every remote operation runs under per-endpoint adaptive admission
//! control: a link that keeps timing out has its concurrency stepped down
//! and its I/O deadlines stretched until it recovers. `--network-limit`
//! caps concurrency per endpoint globally.
//!
//! The stock binary ships without wire clients for SMB/SFTP/FTP and
//! without cloud SDKs; those are injection seams
//! ([`backends::Connect`], [`backends::CloudOps`]) for embedders. Remote
//! paths resolve and dispatch, then fail with a clear "no transport is
//! configured" error. Local operations are fully served.

pub mod orchestrator;

pub use orchestrator::Orchestrator;
