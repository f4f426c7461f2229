//! Terminal progress rendering for non-quiet runs.
//!
//! Grounded on the teacher's `src/ui/progress.rs` (`indicatif`/`console`
//! spinner-per-worker style), rehomed onto polling [`StatusReporter`]'s
//! files instead of an in-process event channel, since phases here run as
//! external subprocesses rather than in-process tasks.

use crate::phase::Track;
use crate::status_reporter::StatusRecord;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Live MultiProgress display, one spinner per track, driven by polling
/// `.pf/status/<track>.status`.
pub struct ProgressUi {
    done: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl ProgressUi {
    pub fn spawn(status_dir: PathBuf) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = done.clone();

        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{prefix:>9.bold.dim} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let bars: Vec<(Track, ProgressBar)> = [Track::A, Track::B, Track::C]
            .into_iter()
            .map(|track| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style.clone());
                bar.set_prefix(format!("track {track}"));
                bar.set_message("waiting");
                (track, bar)
            })
            .collect();

        let handle = tokio::spawn(async move {
            while !done_clone.load(Ordering::SeqCst) {
                for (track, bar) in &bars {
                    let path = status_dir.join(format!("{track}.status"));
                    if let Ok(text) = std::fs::read_to_string(&path) {
                        if let Ok(record) = serde_json::from_str::<StatusRecord>(&text) {
                            bar.set_message(format!("{} ({}/{})", record.current, record.completed, record.total));
                        }
                    }
                    bar.tick();
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            for (_, bar) in &bars {
                bar.finish_and_clear();
            }
        });

        Self { done, handle }
    }

    /// Signal the polling task to stop and wait for it to tear down its bars.
    pub async fn stop(self) {
        self.done.store(true, Ordering::SeqCst);
        let _ = self.handle.await;
    }
}

/// Print one phase's final result line to the terminal.
pub fn print_phase_line(name: &str, success: bool, timed_out: bool, duration_s: f64) {
    let marker = if timed_out {
        style("TIMEOUT").yellow()
    } else if success {
        style("OK").green()
    } else {
        style("FAIL").red()
    };
    println!("{marker:>7} {name} ({duration_s:.1}s)");
}
