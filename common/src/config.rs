//! Configuration types for runtime and transfer settings

use admission::Priority;

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

/// Per-operation transfer settings, passed through to the strategies.
#[derive(Debug, Clone, Default)]
pub struct TransferConfig {
    /// Replace an existing destination entry
    pub overwrite: bool,
    /// Admission priority for the networked backends
    pub priority: Priority,
    /// Read buffer size override (None = per-endpoint recommendation)
    pub buffer_size: Option<usize>,
    /// Staging directory for cross-endpoint bridges (None = system temp)
    pub staging_dir: Option<std::path::PathBuf>,
}

impl TransferConfig {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_size == Some(0) {
            return Err("read buffer size must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn buffer_size(mut self, buffer_size: Option<usize>) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}
