//! StatusReporter: ephemeral, advisory per-track progress files.
//!
//! Grounded on the teacher's `PhaseEvent::Progress` shape
//! (`src/dag/executor.rs`) rehomed onto a truncate-and-overwrite JSON file
//! sink per `spec.md` §4.7, instead of an in-process event channel.

use crate::phase::Track;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub track: String,
    pub current: String,
    pub completed: usize,
    pub total: usize,
    pub timestamp: String,
    pub elapsed: f64,
}

pub struct StatusReporter {
    status_dir: PathBuf,
    start: Instant,
}

impl StatusReporter {
    pub fn new(pf_dir: &Path) -> std::io::Result<Self> {
        let status_dir = pf_dir.join("status");
        std::fs::create_dir_all(&status_dir)?;
        Ok(Self {
            status_dir,
            start: Instant::now(),
        })
    }

    fn path_for(&self, track: Track) -> PathBuf {
        self.status_dir.join(format!("{track}.status"))
    }

    /// Truncate-and-overwrite the status file for one track. Unsynchronized
    /// last-writer-wins by design (`spec.md` §4.7) — only the owning track
    /// ever writes its own file.
    pub fn update(&self, track: Track, current: &str, completed: usize, total: usize) {
        let record = StatusRecord {
            track: track.to_string(),
            current: current.to_string(),
            completed,
            total,
            timestamp: chrono::Utc::now().to_rfc3339(),
            elapsed: self.start.elapsed().as_secs_f64(),
        };
        if let Ok(json) = serde_json::to_string(&record) {
            if let Err(e) = std::fs::write(self.path_for(track), json) {
                tracing::warn!(track = %track, error = %e, "failed to write status file");
            }
        }
    }

    pub fn mark_interrupted(&self, track: Track) {
        self.update(track, "INTERRUPTED", 0, 0);
    }

    pub fn read(&self, track: Track) -> Option<StatusRecord> {
        let text = std::fs::read_to_string(self.path_for(track)).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Delete all status files at the end of the run (`spec.md` §4.7).
    pub fn clear(&self) {
        for track in [Track::A, Track::B, Track::C] {
            let _ = std::fs::remove_file(self.path_for(track));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn update_then_read_roundtrips() {
        let dir = TempDir::new().unwrap();
        let reporter = StatusReporter::new(dir.path()).unwrap();
        reporter.update(Track::A, "taint-analyze", 1, 3);
        let record = reporter.read(Track::A).unwrap();
        assert_eq!(record.track, "a");
        assert_eq!(record.current, "taint-analyze");
        assert_eq!(record.completed, 1);
        assert_eq!(record.total, 3);
    }

    #[test]
    fn each_track_writes_its_own_file() {
        let dir = TempDir::new().unwrap();
        let reporter = StatusReporter::new(dir.path()).unwrap();
        reporter.update(Track::A, "x", 0, 1);
        reporter.update(Track::B, "y", 0, 1);
        assert!(dir.path().join("status").join("a.status").exists());
        assert!(dir.path().join("status").join("b.status").exists());
    }

    #[test]
    fn clear_removes_all_status_files() {
        let dir = TempDir::new().unwrap();
        let reporter = StatusReporter::new(dir.path()).unwrap();
        reporter.update(Track::A, "x", 0, 1);
        reporter.update(Track::C, "z", 0, 1);
        reporter.clear();
        assert!(reporter.read(Track::A).is_none());
        assert!(reporter.read(Track::C).is_none());
    }

    #[test]
    fn mark_interrupted_sets_sentinel_current() {
        let dir = TempDir::new().unwrap();
        let reporter = StatusReporter::new(dir.path()).unwrap();
        reporter.mark_interrupted(Track::B);
        assert_eq!(reporter.read(Track::B).unwrap().current, "INTERRUPTED");
    }
}
