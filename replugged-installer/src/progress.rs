//! Terminal rendering of download progress.

use indicatif::{ProgressBar, ProgressStyle};
use replugged_core::{DownloadEvent, DownloadProgress, DownloadReceiver};

/// Resolution of the bar; fractions are scaled to this.
const BAR_STEPS: u64 = 1000;

pub struct DownloadBar {
    pb: ProgressBar,
    indeterminate: bool,
}

impl DownloadBar {
    pub fn new() -> Self {
        let pb = ProgressBar::new(BAR_STEPS);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {percent}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message("Downloading Replugged");
        Self {
            pb,
            indeterminate: false,
        }
    }

    fn update(&mut self, progress: &DownloadProgress) {
        if progress.is_indeterminate() {
            if !self.indeterminate {
                // Size unknown: fall back to a spinner with a byte count.
                self.indeterminate = true;
                self.pb.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
            }
            self.pb
                .set_message(format!("Downloading Replugged ({} bytes)", progress.bytes_received));
            self.pb.tick();
        } else {
            self.pb
                .set_position((progress.fraction * BAR_STEPS as f64).round() as u64);
        }
    }

    /// Renders events until a terminal one arrives.
    pub async fn follow(mut self, events: &mut DownloadReceiver) {
        while let Some(event) = events.recv().await {
            match event {
                DownloadEvent::Progress(progress) => self.update(&progress),
                DownloadEvent::Done => {
                    self.pb.finish_with_message("✔ Replugged downloaded");
                    return;
                }
                DownloadEvent::Error(e) => {
                    self.pb.abandon_with_message(format!("✖ {}", e));
                    return;
                }
            }
        }
        self.pb.finish_and_clear();
    }
}
