//! Archiver: relocates the previous run's `.pf/` contents into history
//! before the current run writes anything.
//!
//! Grounded on the original Python `_archive` command
//! (`examples/original_source/theauditor/commands/_archive.py`): same cache
//! set, same directory naming, same `_metadata.json` field set, same
//! best-effort per-file move semantics.

use crate::config::RunKind;
use crate::errors::ArchiverError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directories preserved across runs unless `wipe_cache` is requested.
pub const CACHE_DIRS: &[&str] = &[".cache", "context", "ml"];

/// Metadata sealed alongside an archived run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub run_id: String,
    pub run_type: String,
    pub diff_spec: Option<String>,
    pub timestamp: String,
    pub archived_at: String,
    pub files_archived: usize,
    pub files_skipped: usize,
    pub caches_preserved: usize,
    pub wipe_cache_requested: bool,
}

/// Result of one archive operation.
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    /// `None` when `.pf/` was absent or empty (a no-op).
    pub archive_dir: Option<PathBuf>,
    pub metadata: Option<ArchiveMetadata>,
}

pub struct Archiver;

impl Archiver {
    /// Sanitize a diff spec for use as a directory name component:
    /// `.. / \ : ~ ^ space` all become `_`.
    pub fn sanitize(spec: &str) -> String {
        spec.chars()
            .map(|c| match c {
                '.' | '/' | '\\' | ':' | '~' | '^' | ' ' => '_',
                other => other,
            })
            .collect()
    }

    /// Archive the previous run's `.pf/` contents. `pf_dir` is `<root>/.pf`.
    pub fn archive(
        pf_dir: &Path,
        run_kind: &RunKind,
        wipe_cache: bool,
    ) -> Result<ArchiveOutcome, ArchiverError> {
        if !pf_dir.exists() {
            return Ok(ArchiveOutcome {
                archive_dir: None,
                metadata: None,
            });
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(pf_dir)
            .map_err(|source| ArchiverError::CreateHistoryDir {
                path: pf_dir.to_path_buf(),
                source,
            })?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.file_name().map(|n| n != "history").unwrap_or(true))
            .collect();
        entries.sort();

        if entries.is_empty() {
            return Ok(ArchiveOutcome {
                archive_dir: None,
                metadata: None,
            });
        }

        let history_dir = pf_dir.join("history");
        let dest_base = history_dir.join(run_kind.as_str());

        let timestamp_str = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let dir_name = match run_kind {
            RunKind::Diff(spec) => format!("{}_{}", Self::sanitize(spec), timestamp_str),
            RunKind::Full => timestamp_str.clone(),
        };
        let archive_dest = dest_base.join(&dir_name);

        std::fs::create_dir_all(&archive_dest).map_err(|source| ArchiverError::CreateHistoryDir {
            path: archive_dest.clone(),
            source,
        })?;

        let mut files_archived = 0usize;
        let mut files_skipped = 0usize;
        let mut caches_preserved = 0usize;

        for item in entries {
            let name = item.file_name().unwrap().to_string_lossy().to_string();
            if CACHE_DIRS.contains(&name.as_str()) && !wipe_cache {
                tracing::info!(dir = %name, "preserving cache directory");
                caches_preserved += 1;
                continue;
            }

            let dest = archive_dest.join(&name);
            match std::fs::rename(&item, &dest) {
                Ok(()) => files_archived += 1,
                Err(e) => {
                    tracing::warn!(item = %item.display(), error = %e, "could not archive item");
                    files_skipped += 1;
                }
            }
        }

        let metadata = ArchiveMetadata {
            run_id: uuid::Uuid::new_v4().to_string(),
            run_type: run_kind.as_str().to_string(),
            diff_spec: match run_kind {
                RunKind::Diff(spec) => Some(spec.clone()),
                RunKind::Full => None,
            },
            timestamp: timestamp_str,
            archived_at: Utc::now().to_rfc3339(),
            files_archived,
            files_skipped,
            caches_preserved,
            wipe_cache_requested: wipe_cache,
        };

        let metadata_path = archive_dest.join("_metadata.json");
        let json = serde_json::to_string_pretty(&metadata).expect("metadata serializes");
        std::fs::write(&metadata_path, json).map_err(|source| ArchiverError::WriteMetadata {
            path: metadata_path.clone(),
            source,
        })?;

        Ok(ArchiveOutcome {
            archive_dir: Some(archive_dest),
            metadata: Some(metadata),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(Archiver::sanitize("main..HEAD"), "main__HEAD");
        assert_eq!(Archiver::sanitize("a/b\\c:d~e^f g"), "a_b_c_d_e_f_g");
    }

    #[test]
    fn archive_on_missing_pf_is_noop() {
        let dir = TempDir::new().unwrap();
        let pf_dir = dir.path().join(".pf");
        let outcome = Archiver::archive(&pf_dir, &RunKind::Full, false).unwrap();
        assert!(outcome.archive_dir.is_none());
        assert!(outcome.metadata.is_none());
    }

    #[test]
    fn archive_on_empty_pf_is_noop() {
        let dir = TempDir::new().unwrap();
        let pf_dir = dir.path().join(".pf");
        std::fs::create_dir_all(&pf_dir).unwrap();
        let outcome = Archiver::archive(&pf_dir, &RunKind::Full, false).unwrap();
        assert!(outcome.archive_dir.is_none());
    }

    #[test]
    fn archive_moves_raw_and_readthis_preserves_cache() {
        let dir = TempDir::new().unwrap();
        let pf_dir = dir.path().join(".pf");
        std::fs::create_dir_all(pf_dir.join("raw")).unwrap();
        std::fs::write(pf_dir.join("raw").join("index.json"), "{}").unwrap();
        std::fs::create_dir_all(pf_dir.join("readthis")).unwrap();
        std::fs::create_dir_all(pf_dir.join(".cache")).unwrap();
        std::fs::write(pf_dir.join(".cache").join("ast.bin"), "x").unwrap();

        let outcome = Archiver::archive(&pf_dir, &RunKind::Full, false).unwrap();
        let archive_dir = outcome.archive_dir.unwrap();
        let metadata = outcome.metadata.unwrap();

        assert!(archive_dir.join("raw").join("index.json").exists());
        assert!(archive_dir.join("readthis").exists());
        assert!(!archive_dir.join(".cache").exists());
        assert!(pf_dir.join(".cache").exists(), "cache must remain in place");
        assert_eq!(metadata.files_archived, 2);
        assert_eq!(metadata.caches_preserved, 1);
        assert!(!metadata.wipe_cache_requested);

        let metadata_file = archive_dir.join("_metadata.json");
        assert!(metadata_file.exists());
    }

    #[test]
    fn wipe_cache_archives_cache_too() {
        let dir = TempDir::new().unwrap();
        let pf_dir = dir.path().join(".pf");
        std::fs::create_dir_all(pf_dir.join(".cache")).unwrap();

        let outcome = Archiver::archive(&pf_dir, &RunKind::Full, true).unwrap();
        let archive_dir = outcome.archive_dir.unwrap();
        assert!(archive_dir.join(".cache").exists());
        assert!(!pf_dir.join(".cache").exists());
    }

    #[test]
    fn diff_run_uses_sanitized_spec_in_dirname() {
        let dir = TempDir::new().unwrap();
        let pf_dir = dir.path().join(".pf");
        std::fs::create_dir_all(pf_dir.join("raw")).unwrap();

        let outcome = Archiver::archive(&pf_dir, &RunKind::Diff("main..HEAD".to_string()), false).unwrap();
        let archive_dir = outcome.archive_dir.unwrap();
        let name = archive_dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("main__HEAD_"));
        assert_eq!(outcome.metadata.unwrap().diff_spec.as_deref(), Some("main..HEAD"));
    }

    #[test]
    fn metadata_sums_match_regular_file_count_minus_one() {
        // Property 5 from spec.md §8: archived-file counts sum to the number
        // of regular files in the sealed directory minus one (the metadata
        // file itself).
        let dir = TempDir::new().unwrap();
        let pf_dir = dir.path().join(".pf");
        std::fs::create_dir_all(pf_dir.join("raw")).unwrap();
        std::fs::write(pf_dir.join("raw").join("a.json"), "{}").unwrap();
        std::fs::write(pf_dir.join("pipeline.log"), "log").unwrap();

        let outcome = Archiver::archive(&pf_dir, &RunKind::Full, false).unwrap();
        let archive_dir = outcome.archive_dir.unwrap();
        let metadata = outcome.metadata.unwrap();

        let regular_files = walkdir::WalkDir::new(&archive_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count();

        assert_eq!(metadata.files_archived + metadata.caches_preserved, regular_files - 1);
    }
}
