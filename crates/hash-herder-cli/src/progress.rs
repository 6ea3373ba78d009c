use colored::*;
use hash_herder_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Count phase: spinner (total unknown until the walk finishes)
/// - Processing phase: progress bar over the counted files
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
    verb: &'static str,
}

impl CliReporter {
    pub fn new(verb: &'static str) -> Self {
        Self {
            bar: Mutex::new(None),
            verb,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        match self.bar.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.lock();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICK_CHARS)
}

fn bar_style(verb: &str) -> ProgressStyle {
    let template = format!(
        "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} files ({{eta}} remaining)",
        verb
    );
    ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS)
}

impl ProgressReporter for CliReporter {
    fn on_count_start(&self) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        pb.set_message("Counting files...");
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_count_complete(&self, total_files: usize) {
        self.finish_bar();
        eprintln!("  {} Found {} files", "✓".green(), total_files);

        let pb = ProgressBar::new(total_files as u64);
        pb.set_style(bar_style(self.verb));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_root_start(&self, root: &str, previously_processed: usize) {
        let guard = self.lock();
        if let Some(pb) = guard.as_ref() {
            if previously_processed > 0 {
                pb.println(format!(
                    "  {} {} ({} files done in an earlier run)",
                    "↻".yellow(),
                    root,
                    previously_processed
                ));
            } else {
                pb.println(format!("  {} {}", "→".cyan(), root));
            }
        }
    }

    fn on_file_done(&self, processed: u64, total_files: usize, _current_path: &str) {
        let guard = self.lock();
        if let Some(pb) = guard.as_ref() {
            if pb.length() != Some(total_files as u64) {
                pb.set_length(total_files as u64);
            }
            pb.set_position(processed);
        }
    }

    fn on_run_complete(&self, processed: u64, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} Processed {} files in {:.2}s",
            "✓".green(),
            processed,
            duration_secs
        );
    }

    fn on_interrupted(&self, processed: u64) {
        self.finish_bar();
        eprintln!(
            "  {} Interrupted after {} files",
            "!".yellow().bold(),
            processed
        );
    }
}
