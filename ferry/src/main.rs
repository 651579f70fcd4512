use anyhow::anyhow;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use admission::{AdmissionControl, Priority};
use common::config::{OutputConfig, RuntimeConfig, TransferConfig};
use common::progress::{Reporter, Summary};
use ferry_tools_ferry::Orchestrator;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ferry",
    version,
    about = "Move files between local disks, SMB/SFTP/FTP servers and cloud drives through one set of commands",
    long_about = "`ferry` carries files across storage boundaries: local filesystems, SMB shares, \
SFTP and FTP servers, and cloud drive accounts, with the same commands everywhere.

Paths name their endpoint with a scheme; anything without a scheme is local:

    /photos/a.jpg
    smb://nas/backup/a.jpg
    sftp://alice@files:2222/home/alice/a.jpg
    ftp://mirror/pub/a.jpg
    cloud://dropbox/folder/a.jpg

When the two sides of a copy cannot reach each other directly, ferry stages the \
file through local disk automatically. Every networked endpoint is guarded by an \
adaptive admission controller that backs off when the endpoint starts timing out \
and restores concurrency once it recovers.

EXAMPLES:
    # Local copy with a summary
    ferry cp /data/a.bin /backup/a.bin --summary

    # Upload to an SMB share, replacing the existing file
    ferry cp /data/a.bin smb://nas/backup/a.bin --overwrite

    # Move between two different servers (staged through local disk)
    ferry mv sftp://files/out/a.jpg cloud://dropbox/in/a.jpg --progress

    # Soft-delete locally (recoverable from the trash folder), then empty it
    ferry rm /data/old.bin
    ferry purge /data"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    // Progress & output
    /// Print summary at the end
    #[arg(long, global = true, help_heading = "Progress & output")]
    summary: bool,

    /// Print the summary as JSON instead of text
    #[arg(long, global = true, help_heading = "Progress & output")]
    json: bool,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", global = true, help_heading = "Progress & output")]
    quiet: bool,

    // Performance & throttling
    /// Cap concurrent network operations per endpoint (overrides the adaptive limit's upper bound)
    #[arg(long, global = true, value_name = "N", help_heading = "Performance & throttling")]
    network_limit: Option<usize>,

    /// Read buffer size (accepts "128KiB", "1MiB", or plain bytes; default: per-endpoint recommendation)
    #[arg(long, global = true, value_name = "SIZE", help_heading = "Performance & throttling")]
    read_buffer: Option<bytesize::ByteSize>,

    /// Run network operations at high priority (may briefly oversubscribe a degraded endpoint)
    #[arg(long, global = true, help_heading = "Performance & throttling")]
    high_priority: bool,

    /// Per-chunk network I/O timeout (accepts "30s", "2min"; doubled while an endpoint is degraded)
    #[arg(long, global = true, default_value = "30s", value_name = "DURATION", help_heading = "Performance & throttling")]
    io_timeout: humantime::Duration,

    // Advanced settings
    /// Directory for staging files during cross-endpoint transfers (default: system temp)
    #[arg(long, global = true, value_name = "DIR", help_heading = "Advanced settings")]
    staging_dir: Option<std::path::PathBuf>,

    /// Number of worker threads (0 = number of CPU cores)
    #[arg(long, global = true, default_value = "0", value_name = "N", help_heading = "Advanced settings")]
    max_workers: usize,

    /// Number of blocking worker threads (0 = Tokio default of 512)
    #[arg(long, global = true, default_value = "0", value_name = "N", help_heading = "Advanced settings")]
    max_blocking_threads: usize,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Copy a file or directory tree
    Cp {
        src: String,
        dst: String,
        /// Replace an existing destination entry
        #[arg(short, long)]
        overwrite: bool,
        /// Show transfer progress on stderr
        #[arg(long)]
        progress: bool,
    },
    /// Move a file or directory tree (staged copy + delete across servers)
    Mv {
        src: String,
        dst: String,
        /// Replace an existing destination entry
        #[arg(short, long)]
        overwrite: bool,
        /// Show transfer progress on stderr
        #[arg(long)]
        progress: bool,
    },
    /// Delete an entry (local deletes are soft by default, recoverable with `purge`)
    Rm {
        path: String,
        /// Skip the trash folder and delete immediately
        #[arg(long)]
        permanent: bool,
    },
    /// Create a directory, including missing parents
    Mkdir { path: String },
    /// Print metadata for an entry
    Stat { path: String },
    /// Report whether an entry exists (prints true/false)
    Exists { path: String },
    /// Empty the trash folder of a local directory
    Purge { dir: String },
}

fn progress_reporter(enabled: bool) -> Reporter {
    if !enabled {
        return Reporter::none();
    }
    Reporter::new(Arc::new(|bytes, total, elapsed| {
        let rate = if elapsed.as_secs_f64() > 0.0 {
            (bytes as f64 / elapsed.as_secs_f64()) as u64
        } else {
            0
        };
        eprint!(
            "\r{} / {} ({}/s)   ",
            bytesize::ByteSize(bytes),
            bytesize::ByteSize(total),
            bytesize::ByteSize(rate)
        );
        if bytes >= total {
            eprintln!();
        }
    }))
}

async fn async_main(args: Args) -> anyhow::Result<Summary> {
    let admission = Arc::new(AdmissionControl::new());
    admission.set_user_network_limit(args.network_limit);
    let orchestrator = Orchestrator::disconnected(admission, *args.io_timeout);
    let config = TransferConfig {
        overwrite: false,
        priority: if args.high_priority {
            Priority::High
        } else {
            Priority::Low
        },
        buffer_size: args.read_buffer.map(|size| size.0 as usize),
        staging_dir: args.staging_dir.clone(),
    };
    config
        .validate()
        .map_err(|message| anyhow!("{message}"))?;

    let operation = run_command(&orchestrator, &args, config);
    let cancel = tokio_util::sync::CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });
    match cancel.run_until_cancelled(operation).await {
        Some(result) => result?,
        None => {
            tracing::warn!("interrupted, partial work may remain");
            return Err(anyhow!("interrupted"));
        }
    }
    Ok(orchestrator.summary())
}

async fn run_command(
    orchestrator: &Orchestrator,
    args: &Args,
    config: TransferConfig,
) -> anyhow::Result<()> {
    match &args.command {
        Command::Cp {
            src,
            dst,
            overwrite,
            progress,
        } => {
            let config = config.overwrite(*overwrite);
            orchestrator
                .copy(src, dst, &config, &progress_reporter(*progress))
                .await?;
        }
        Command::Mv {
            src,
            dst,
            overwrite,
            progress,
        } => {
            let config = config.overwrite(*overwrite);
            orchestrator
                .mv(src, dst, &config, &progress_reporter(*progress))
                .await?;
        }
        Command::Rm { path, permanent } => {
            orchestrator.delete(path, *permanent).await?;
        }
        Command::Mkdir { path } => {
            orchestrator.create_directory(path).await?;
        }
        Command::Stat { path } => {
            let info = orchestrator.info(path).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{info}");
            }
        }
        Command::Exists { path } => {
            println!("{}", orchestrator.exists(path).await?);
        }
        Command::Purge { dir } => {
            let purged = orchestrator.purge_trash(dir).await?;
            tracing::info!("purged {purged} trashed entries from {dir}");
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    let output = OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        // the JSON rendering replaces the text summary below
        print_summary: args.summary && !args.json,
    };
    let runtime = RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let json = args.json;
    let func = || async_main(args);
    let Some(summary) = common::run(output, runtime, func) else {
        std::process::exit(1);
    };
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(rendered) => println!("{rendered}"),
            Err(error) => {
                tracing::error!("{:#}", error);
                std::process::exit(1);
            }
        }
    }
}
