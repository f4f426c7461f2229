//! Top-level orchestrator: wires Archiver, PhasePlanner, StageRunner,
//! ArtifactStore, Chunker, and SummaryBuilder together for one run.
//!
//! Grounded on the teacher's `src/orchestrator/runner.rs`, which plays the
//! same "own the whole run, delegate each concern" role.

use crate::archiver::Archiver;
use crate::artifact_store::ArtifactStore;
use crate::chunker::Chunker;
use crate::config::{PipelineConfig, PipelineOptions};
use crate::errors::{ArtifactStoreError, PipelineError};
use crate::planner::{AllAvailable, PhasePlanner};
use crate::run_logger::RunLogger;
use crate::signal::{install_handler, StopFlag};
use crate::stage_runner::StageRunner;
use crate::status_reporter::StatusReporter;
use crate::summary_builder::{SeverityCounts, SummaryBuilder};
use crate::ui::ProgressUi;
use serde_json::Value;

/// Distinguished exit code for a user-interrupted run (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Run the pipeline to completion and return the process exit code it
/// should surface, per `spec.md` §6.
pub async fn run(options: PipelineOptions) -> Result<i32, PipelineError> {
    let config = PipelineConfig::load(&options.root).map_err(PipelineError::Other)?;
    let pf_dir = options.root.join(".pf");

    let stop = StopFlag::new();
    install_handler(stop.clone());

    let archive_outcome = Archiver::archive(&pf_dir, &options.run_kind, options.wipe_cache)?;
    if let Some(dir) = &archive_outcome.archive_dir {
        tracing::info!(archive_dir = %dir.display(), "archived previous run");
    }

    std::fs::create_dir_all(&pf_dir)
        .map_err(|e| PipelineError::Other(anyhow::anyhow!("failed to create {}: {e}", pf_dir.display())))?;

    let store = ArtifactStore::new(&pf_dir)?;
    let logger = RunLogger::new(&pf_dir).map_err(PipelineError::Other)?;
    let status = StatusReporter::new(&pf_dir)
        .map_err(|e| PipelineError::Other(anyhow::anyhow!("failed to create status dir: {e}")))?;

    let phases = PhasePlanner::plan(&AllAvailable, &config, &options);
    tracing::info!(phase_count = phases.len(), "plan resolved");

    let progress = (!options.quiet).then(|| ProgressUi::spawn(pf_dir.join("status")));

    let grace_period = std::time::Duration::from_secs(config.termination_grace_s);
    let stage_outcome = StageRunner::run_all(phases, &stop, &logger, &status, grace_period).await;

    if let Some(progress) = progress {
        progress.stop().await;
    }
    if !options.quiet {
        for (phase, outcome) in &stage_outcome.results {
            crate::ui::print_phase_line(&phase.name, outcome.success, outcome.timed_out, outcome.duration.as_secs_f64());
        }
    }

    // Each phase promises to have written its own artifacts under
    // `.pf/raw/`; captured stdout is also preserved there when a phase
    // used it as its output channel.
    for (phase, outcome) in &stage_outcome.results {
        if outcome.stdout.is_empty() {
            continue;
        }
        let name = format!("{}.json", phase.name);
        match store.write(&name, &outcome.stdout) {
            Ok(_) => {}
            Err(ArtifactStoreError::AlreadyWritten { .. }) => {
                // The phase already wrote its own artifact directly; stdout was incidental.
            }
            Err(e) => return Err(e.into()),
        }
    }

    let chunker = Chunker::new(&config);
    let readthis_dir = pf_dir.join("readthis");
    let mut chunk_outcomes = Vec::new();
    for name in store.list() {
        if let Some(bytes) = store.read(&name) {
            match chunker.chunk(&readthis_dir, &name, &bytes) {
                Ok(outcome) => chunk_outcomes.push((name, outcome)),
                Err(e) => tracing::warn!(artifact = %name, error = %e, "chunking failed for this artifact"),
            }
        }
    }
    if let Err(e) = chunker.write_extraction_summary(&readthis_dir, &chunk_outcomes) {
        tracing::warn!(error = %e, "failed to write extraction_summary.json");
    }

    let findings = store
        .read("fce.json")
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .map(|doc| SummaryBuilder::count_severities(&doc))
        .unwrap_or_else(SeverityCounts::default);

    SummaryBuilder::build(&pf_dir, &stage_outcome, findings)?;
    status.clear();

    if stage_outcome.interrupted {
        logger.interrupted();
        return Ok(INTERRUPTED_EXIT_CODE);
    }
    if stage_outcome.aborted_at.is_some() {
        return Ok(3);
    }

    Ok(match findings.status() {
        "CRITICAL" => 2,
        "HIGH" | "MEDIUM" | "LOW" => 1,
        _ => 0,
    })
}
