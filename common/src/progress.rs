use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Progress observer: `(bytes_transferred, total_bytes, elapsed)`.
pub type ProgressFn = dyn Fn(u64, u64, std::time::Duration) + Send + Sync;

/// Cloneable handle strategies report transfer progress through.
///
/// A reporter can be restricted to one stage of a larger transfer with
/// [`Reporter::stage`]; staged reports are rescaled so the observer sees a
/// single monotone sweep over the whole operation (a download-then-upload
/// bridge reports `[0, 0.5]` then `[0.5, 1.0]`).
#[derive(Clone)]
pub struct Reporter {
    callback: Option<Arc<ProgressFn>>,
    started: std::time::Instant,
    stage_index: u64,
    stage_count: u64,
}

impl Reporter {
    pub fn new(callback: Arc<ProgressFn>) -> Self {
        Self {
            callback: Some(callback),
            started: std::time::Instant::now(),
            stage_index: 0,
            stage_count: 1,
        }
    }

    /// Reporter that drops every report.
    pub fn none() -> Self {
        Self {
            callback: None,
            started: std::time::Instant::now(),
            stage_index: 0,
            stage_count: 1,
        }
    }

    /// Derived reporter covering stage `index` of `count` equal phases.
    /// Shares the parent's clock so `elapsed` spans the whole operation.
    pub fn stage(&self, index: u64, count: u64) -> Self {
        debug_assert!(count > 0 && index < count);
        Self {
            callback: self.callback.clone(),
            started: self.started,
            stage_index: index,
            stage_count: count,
        }
    }

    pub fn report(&self, bytes: u64, total: u64) {
        if let Some(callback) = &self.callback {
            callback(
                self.stage_index * total + bytes,
                self.stage_count * total,
                self.started.elapsed(),
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.callback.is_some()
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("enabled", &self.is_enabled())
            .field("stage", &(self.stage_index, self.stage_count))
            .finish()
    }
}

/// Shared per-run counters. Strategies bump these as work completes; the
/// harness renders the final [`Summary`].
#[derive(Debug, Default)]
pub struct Stats {
    files_copied: AtomicU64,
    bytes_copied: AtomicU64,
    files_moved: AtomicU64,
    entries_removed: AtomicU64,
    directories_created: AtomicU64,
    errors: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file_copied(&self) {
        self.files_copied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_copied(&self, bytes: u64) {
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_file_moved(&self) {
        self.files_moved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_entry_removed(&self) {
        self.entries_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_directory_created(&self) {
        self.directories_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds counters accumulated by a detached subtree of work (fanned
    /// out tasks summing into a [`Summary`]) back into this set.
    pub fn absorb(&self, summary: Summary) {
        self.files_copied
            .fetch_add(summary.files_copied, Ordering::Relaxed);
        self.bytes_copied
            .fetch_add(summary.bytes_copied, Ordering::Relaxed);
        self.files_moved
            .fetch_add(summary.files_moved, Ordering::Relaxed);
        self.entries_removed
            .fetch_add(summary.entries_removed, Ordering::Relaxed);
        self.directories_created
            .fetch_add(summary.directories_created, Ordering::Relaxed);
        self.errors.fetch_add(summary.errors, Ordering::Relaxed);
    }

    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> Summary {
        Summary {
            files_copied: self.files_copied.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            files_moved: self.files_moved.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
            directories_created: self.directories_created.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Summary {
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub files_moved: u64,
    pub entries_removed: u64,
    pub directories_created: u64,
    pub errors: u64,
}

impl std::ops::Add for Summary {
    type Output = Summary;
    fn add(self, other: Summary) -> Summary {
        Summary {
            files_copied: self.files_copied + other.files_copied,
            bytes_copied: self.bytes_copied + other.bytes_copied,
            files_moved: self.files_moved + other.files_moved,
            entries_removed: self.entries_removed + other.entries_removed,
            directories_created: self.directories_created + other.directories_created,
            errors: self.errors + other.errors,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
             files copied: {}\n\
             files moved: {}\n\
             entries removed: {}\n\
             directories created: {}\n\
             errors: {}",
            bytesize::ByteSize(self.bytes_copied),
            self.files_copied,
            self.files_moved,
            self.entries_removed,
            self.directories_created,
            self.errors,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_reporter() -> (Reporter, Arc<Mutex<Vec<(u64, u64)>>>) {
        let calls: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(vec![]));
        let sink = calls.clone();
        let reporter = Reporter::new(Arc::new(move |bytes, total, _elapsed| {
            sink.lock().unwrap().push((bytes, total));
        }));
        (reporter, calls)
    }

    #[test]
    fn unstaged_reports_pass_through() {
        let (reporter, calls) = recording_reporter();
        reporter.report(10, 100);
        reporter.report(100, 100);
        assert_eq!(*calls.lock().unwrap(), vec![(10, 100), (100, 100)]);
    }

    #[test]
    fn staged_reports_scale_into_half_ranges() {
        let (reporter, calls) = recording_reporter();
        let download = reporter.stage(0, 2);
        let upload = reporter.stage(1, 2);
        download.report(50, 100);
        download.report(100, 100);
        upload.report(0, 100);
        upload.report(100, 100);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![(50, 200), (100, 200), (100, 200), (200, 200)]
        );
    }

    #[test]
    fn none_reporter_swallows_reports() {
        let reporter = Reporter::none();
        assert!(!reporter.is_enabled());
        reporter.report(1, 1);
        assert!(!reporter.stage(0, 2).is_enabled());
    }

    #[test]
    fn stats_snapshot_and_summary_addition() {
        let stats = Stats::new();
        stats.add_file_copied();
        stats.add_bytes_copied(1024);
        stats.add_bytes_copied(512);
        stats.add_file_moved();
        stats.add_error();
        let summary = stats.summary();
        assert_eq!(summary.files_copied, 1);
        assert_eq!(summary.bytes_copied, 1536);

        let doubled = summary + summary;
        assert_eq!(doubled.bytes_copied, 3072);
        assert_eq!(doubled.errors, 2);
    }

    #[test]
    fn summary_renders_every_counter() {
        let rendered = Summary {
            files_copied: 3,
            bytes_copied: 1024,
            files_moved: 1,
            entries_removed: 2,
            directories_created: 4,
            errors: 0,
        }
        .to_string();
        assert!(rendered.contains("files copied: 3"), "{rendered}");
        assert!(rendered.contains("directories created: 4"), "{rendered}");
        assert!(rendered.contains("errors: 0"), "{rendered}");
    }
}
