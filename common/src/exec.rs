use anyhow::Context;

use crate::config::{OutputConfig, RuntimeConfig};

fn init_tracing(output: &OutputConfig) {
    let directive = if output.quiet {
        "off"
    } else {
        match output.verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    // an explicit RUST_LOG wins over the -v/-q mapping
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn build_runtime(runtime: &RuntimeConfig) -> anyhow::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    builder.build().context("failed to build the async runtime")
}

/// Binary entry-point harness: installs the tracing subscriber, builds the
/// runtime, runs `func` on it and prints the summary when requested.
///
/// Returns `None` when `func` failed; callers translate that into a nonzero
/// exit code.
pub fn run<F, Fut, Summary>(output: OutputConfig, runtime: RuntimeConfig, func: F) -> Option<Summary>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
    Summary: std::fmt::Display,
{
    init_tracing(&output);
    let runtime = match build_runtime(&runtime) {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("{:#}", error);
            return None;
        }
    };
    match runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::error!("{:#}", error);
            None
        }
    }
}
