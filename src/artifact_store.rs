//! ArtifactStore: owns `.pf/raw/` and enforces write-once immutability.
//!
//! Atomic writes follow `spec.md` §9's write-to-sibling-tempfile-then-rename
//! recipe rather than relying on shell move semantics.

use crate::errors::ArtifactStoreError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct ArtifactStore {
    raw_dir: PathBuf,
    written: Mutex<HashSet<String>>,
}

impl ArtifactStore {
    /// Create the store, ensuring `.pf/raw/` exists. Failing to create it
    /// aborts the whole run per `spec.md` §4.4.
    pub fn new(pf_dir: &Path) -> Result<Self, ArtifactStoreError> {
        let raw_dir = pf_dir.join("raw");
        std::fs::create_dir_all(&raw_dir).map_err(|source| ArtifactStoreError::CreateRawDir {
            path: raw_dir.clone(),
            source,
        })?;
        Ok(Self {
            raw_dir,
            written: Mutex::new(HashSet::new()),
        })
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// Write `contents` to `.pf/raw/<name>` atomically (tempfile + rename).
    /// Refuses to overwrite a name already written this run.
    pub fn write(&self, name: &str, contents: &[u8]) -> Result<PathBuf, ArtifactStoreError> {
        {
            let mut written = self.written.lock().expect("artifact store lock poisoned");
            if !written.insert(name.to_string()) {
                return Err(ArtifactStoreError::AlreadyWritten {
                    name: name.to_string(),
                });
            }
        }

        let dest = self.raw_dir.join(name);
        let tmp = self.raw_dir.join(format!(".{name}.tmp"));

        std::fs::write(&tmp, contents).map_err(|source| ArtifactStoreError::AtomicWriteFailed {
            name: name.to_string(),
            source,
        })?;
        std::fs::rename(&tmp, &dest).map_err(|source| ArtifactStoreError::AtomicWriteFailed {
            name: name.to_string(),
            source,
        })?;

        Ok(dest)
    }

    /// Read an artifact back, if it exists. Missing artifacts are not an
    /// error — callers proceed with whatever exists (`spec.md` §4.4).
    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.raw_dir.join(name)).ok()
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.raw_dir.join(name)
    }

    /// List every artifact currently on disk, sorted by name.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.raw_dir)
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| !n.starts_with('.'))
            .collect();
        names.sort();
        names
    }
}
