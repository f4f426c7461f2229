//! Pipeline configuration: limits, timeouts, and runtime options.
//!
//! Layered the way the teacher's `Config`/`ForgeConfig` pair is: an optional
//! `pf.toml` file provides defaults, environment variables override it, and
//! CLI flags (applied by the caller after [`PipelineConfig::load`]) win last.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Limits and timeouts that govern the pipeline, per `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound for a single artifact the indexer will accept.
    pub max_file_size: u64,
    /// Target chunk size for the Chunker.
    pub max_chunk_size: usize,
    /// Hard cap on chunks per artifact.
    pub max_chunks_per_file: usize,
    /// Fallback phase timeout, in seconds.
    pub default_timeout_s: u64,
    /// Per-phase timeout overrides, in seconds, keyed by phase name.
    pub phase_timeout: HashMap<String, u64>,
    /// Soft extraction budget in KB (reported, never enforced — see
    /// `spec.md` §9 Open Questions).
    pub extraction_budget_kb: u64,
    /// Batch size hint for database writers.
    pub db_batch_size: u64,
    /// Seconds to wait after a termination signal before escalating to a
    /// forced kill, matching the original pipeline's `wait(timeout=5)`.
    pub termination_grace_s: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            max_chunk_size: 65_536,
            max_chunks_per_file: 100,
            default_timeout_s: 1800,
            phase_timeout: HashMap::new(),
            extraction_budget_kb: 1_500,
            db_batch_size: 500,
            termination_grace_s: 5,
        }
    }
}

const ENV_PREFIX: &str = "PF";

impl PipelineConfig {
    /// Load from an optional `pf.toml` at `project_root`, then apply
    /// environment variable overrides.
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut config = match Self::from_file(project_root)? {
            Some(cfg) => cfg,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(project_root: &Path) -> Result<Option<Self>> {
        let path = project_root.join("pf.toml");
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(config))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("PF_TIMEOUT_SECONDS") {
            self.default_timeout_s = v;
        }
        if let Some(v) = env_u64("PF_LIMITS_MAX_FILE_SIZE") {
            self.max_file_size = v;
        }
        if let Some(v) = env_u64("PF_LIMITS_MAX_CHUNK_SIZE") {
            self.max_chunk_size = v as usize;
        }
        if let Some(v) = env_u64("PF_DB_BATCH_SIZE") {
            self.db_batch_size = v;
        }
    }

    /// Look up `PF_TIMEOUT_<PHASE>_SECONDS` for a specific phase name,
    /// falling back to `phase_timeout[name]`, then `default_timeout_s`.
    pub fn timeout_for(&self, phase_name: &str) -> u64 {
        let env_key = format!(
            "{ENV_PREFIX}_TIMEOUT_{}_SECONDS",
            phase_name.to_uppercase().replace('-', "_")
        );
        if let Some(v) = env_u64(&env_key) {
            return v;
        }
        self.phase_timeout
            .get(phase_name)
            .copied()
            .unwrap_or(self.default_timeout_s)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

/// Runtime options passed to the pipeline entry point (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub root: PathBuf,
    pub quiet: bool,
    pub offline: bool,
    pub exclude_self: bool,
    pub wipe_cache: bool,
    pub run_kind: RunKind,
}

/// Kind of run, used for archive directory naming (`spec.md` §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunKind {
    Full,
    Diff(String),
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Full => "full",
            RunKind::Diff(_) => "diff",
        }
    }
}
