//! RunLogger: single append-only `.pf/pipeline.log`, flushed after every
//! record so a crash leaves a usable log.
//!
//! Grounded on the teacher's `src/audit/logger.rs` persistence discipline,
//! adapted from a JSON-document-per-save model to a line-buffered append
//! log per `spec.md` §4.7.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct RunLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLogger {
    pub fn new(pf_dir: &Path) -> Result<Self> {
        let path = pf_dir.join("pipeline.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Log write failures are printed to stderr and do
    /// not abort the run (`spec.md` §7).
    pub fn record(&self, message: &str) {
        let line = format!("[{}] {}\n", Utc::now().to_rfc3339(), message);
        let mut file = self.file.lock().expect("run logger lock poisoned");
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            eprintln!("[WARN] failed to write pipeline.log: {e}");
        }
    }

    pub fn phase_started(&self, phase: &str) {
        self.record(&format!("PHASE_STARTED {phase}"));
        tracing::info!(phase, "phase started");
    }

    pub fn phase_finished(&self, phase: &str, exit_code: i32, success: bool) {
        self.record(&format!(
            "PHASE_FINISHED {phase} exit_code={exit_code} success={success}"
        ));
        tracing::info!(phase, exit_code, success, "phase finished");
    }

    pub fn phase_timed_out(&self, phase: &str) {
        self.record(&format!("PHASE_TIMEOUT {phase}"));
        tracing::warn!(phase, "phase timed out");
    }

    pub fn interrupted(&self) {
        self.record("INTERRUPTED");
        tracing::warn!("run interrupted by user");
    }

    /// Append full captured output (stdout or stderr) for a phase.
    pub fn append_output(&self, phase: &str, stream: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        self.record(&format!("--- {phase} {stream} ---\n{text}\n--- end {phase} {stream} ---"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn new_creates_log_file() {
        let dir = TempDir::new().unwrap();
        let logger = RunLogger::new(dir.path()).unwrap();
        assert!(logger.path().exists());
    }

    #[test]
    fn records_are_appended_in_order() {
        let dir = TempDir::new().unwrap();
        let logger = RunLogger::new(dir.path()).unwrap();
        logger.phase_started("index");
        logger.phase_finished("index", 0, true);
        let content = std::fs::read_to_string(logger.path()).unwrap();
        let idx_start = content.find("PHASE_STARTED index").unwrap();
        let idx_finish = content.find("PHASE_FINISHED index").unwrap();
        assert!(idx_start < idx_finish);
    }

    #[test]
    fn reopening_preserves_prior_records() {
        let dir = TempDir::new().unwrap();
        {
            let logger = RunLogger::new(dir.path()).unwrap();
            logger.record("first run record");
        }
        let logger = RunLogger::new(dir.path()).unwrap();
        logger.record("second run record");
        let content = std::fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("first run record"));
        assert!(content.contains("second run record"));
    }
}
