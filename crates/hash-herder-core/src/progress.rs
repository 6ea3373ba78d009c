/// Trait for reporting run progress.
///
/// The CLI implements it with indicatif; tests use `SilentReporter`.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_count_start(&self) {}
    fn on_count_complete(&self, _total_files: usize) {}
    fn on_root_start(&self, _root: &str, _previously_processed: usize) {}
    fn on_file_done(&self, _processed: u64, _total_files: usize, _current_path: &str) {}
    fn on_run_complete(&self, _processed: u64, _duration_secs: f64) {}
    fn on_interrupted(&self, _processed: u64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
