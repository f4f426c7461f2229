//! Typed error hierarchy for the pipeline.
//!
//! One enum per component, plus a top-level `PipelineError` that wraps each
//! with `#[from]` so callers crossing component boundaries can use `?`
//! without manual conversions.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the Archiver.
#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("failed to create history directory at {path}: {source}")]
    CreateHistoryDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write archive metadata at {path}: {source}")]
    WriteMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the PhasePlanner.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("duplicate phase name in catalog: {0}")]
    DuplicatePhase(String),

    #[error("phase '{phase}' declares unknown dependency '{dependency}'")]
    UnknownDependency { phase: String, dependency: String },

    #[error("invalid timeout override for phase '{phase}': {value}")]
    InvalidTimeoutOverride { phase: String, value: String },
}

/// Errors from the StageRunner.
#[derive(Debug, Error)]
pub enum StageRunnerError {
    #[error("failed to spawn phase '{phase}': {source}")]
    SpawnFailed {
        phase: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create capture file at {path}: {source}")]
    CaptureFileFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the ArtifactStore.
#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    #[error("failed to create raw artifact directory at {path}: {source}")]
    CreateRawDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact '{name}' was already written this run and cannot be overwritten")]
    AlreadyWritten { name: String },

    #[error("failed to write artifact '{name}' atomically: {source}")]
    AtomicWriteFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the Chunker.
#[derive(Debug, Error)]
pub enum ChunkerError {
    #[error("failed to read artifact {path}: {source}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write chunk {path}: {source}")]
    WriteChunk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON/JSONL artifact {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the SummaryBuilder.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("failed to walk artifact tree at {path}: {source}")]
    WalkFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to write summary document {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for the whole pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Archiver(#[from] ArchiverError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    StageRunner(#[from] StageRunnerError),

    #[error(transparent)]
    ArtifactStore(#[from] ArtifactStoreError),

    #[error(transparent)]
    Chunker(#[from] ChunkerError),

    #[error(transparent)]
    Summary(#[from] SummaryError),

    #[error("Foundation phase '{phase}' failed: {reason}")]
    FoundationFailed { phase: String, reason: String },

    #[error("DataPrep phase '{phase}' failed: {reason}")]
    DataPrepFailed { phase: String, reason: String },

    #[error("run interrupted by user")]
    Interrupted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
