//! Progress reporting for pipeline runs.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use keg_pm::{InstallState, PipelineListener, Stage};
use std::sync::Mutex;
use std::time::Duration;

/// Creates spinners and bars, or hidden ones when disabled
pub struct ProgressManager {
    multi: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            enabled,
        }
    }

    /// Create a spinner for indeterminate operations
    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Drives one spinner per pipeline stage
pub struct StageReporter {
    progress: ProgressManager,
    label: String,
    current: Mutex<Option<(Stage, ProgressBar)>>,
}

impl StageReporter {
    pub fn new(progress: ProgressManager, label: impl Into<String>) -> Self {
        Self {
            progress,
            label: label.into(),
            current: Mutex::new(None),
        }
    }

    fn message(&self, stage: Stage) -> String {
        match stage {
            Stage::Resolve => format!("Resolving {}", self.label),
            Stage::Fetch => format!("Fetching {}", self.label),
            Stage::Verify => "Verifying sha256".to_string(),
            Stage::Provision => "Provisioning environment".to_string(),
            Stage::Install => format!("Installing {}", self.label),
            Stage::Accept => "Running acceptance check".to_string(),
        }
    }

    /// Byte counts from the fetcher's progress callback
    pub fn download_progress(&self, downloaded: u64, total: u64) {
        let Ok(current) = self.current.lock() else {
            return;
        };
        if let Some((Stage::Fetch, bar)) = current.as_ref() {
            let amount = if total > 0 {
                format!("{} / {}", format_bytes(downloaded), format_bytes(total))
            } else {
                format_bytes(downloaded)
            };
            bar.set_message(format!("{} ({})", self.message(Stage::Fetch), amount));
        }
    }

    fn finish_current(&self, ok: bool) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        if let Some((stage, bar)) = current.take() {
            let mark = if ok { "✓" } else { "✗" };
            bar.finish_with_message(format!("{} {}", mark, self.message(stage)));
        }
    }
}

impl PipelineListener for StageReporter {
    fn stage_started(&self, stage: Stage) {
        self.finish_current(true);
        let bar = self.progress.create_spinner(&self.message(stage));
        if let Ok(mut current) = self.current.lock() {
            *current = Some((stage, bar));
        }
    }

    fn transition(&self, _from: InstallState, to: InstallState) {
        match to {
            InstallState::Failed(_) => self.finish_current(false),
            InstallState::Accepted => self.finish_current(true),
            _ => {}
        }
    }
}

/// Helper to format bytes for display
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
