//! PhasePlanner: resolves the phase catalog, assigns stages and timeouts,
//! and builds argument vectors.
//!
//! Grounded on the teacher's `src/dag/builder.rs` (catalog-to-graph
//! construction style) and the original Python `pipelines.py`
//! (`COMMAND_TIMEOUTS` table and its env-var override naming).

use crate::config::{PipelineConfig, PipelineOptions};
use crate::phase::{Phase, Stage, Track};
use std::time::Duration;

/// Collaborator that knows which analysis commands actually exist in this
/// installation. The planner intersects its fixed catalog with this set;
/// phases the catalog doesn't recognize are logged and omitted, never
/// re-added or reordered (`spec.md` §4.2).
pub trait CommandCatalog {
    fn is_available(&self, phase_name: &str) -> bool;
}

/// A catalog that reports every phase as available — used by tests and by
/// callers that have already resolved availability themselves.
pub struct AllAvailable;

impl CommandCatalog for AllAvailable {
    fn is_available(&self, _phase_name: &str) -> bool {
        true
    }
}

struct PhaseTemplate {
    name: &'static str,
    description: &'static str,
    stage: Stage,
    findings_bearing: bool,
    accepts_exclude_self: bool,
}

/// The fixed, ordered phase catalog. Order here is the declaration order
/// used to break ties within a track (`spec.md` §4.3: "Within a track,
/// phases run in declaration order").
fn catalog() -> &'static [PhaseTemplate] {
    &[
        // Foundation — strictly sequential, first. Failure aborts the run.
        PhaseTemplate {
            name: "index",
            description: "Build the relational symbol/call/import index",
            stage: Stage::Foundation,
            findings_bearing: false,
            accepts_exclude_self: true,
        },
        PhaseTemplate {
            name: "detect-frameworks",
            description: "Detect frameworks and write the canonical framework list",
            stage: Stage::Foundation,
            findings_bearing: false,
            accepts_exclude_self: false,
        },
        // DataPrep — strictly sequential, after Foundation. Failure aborts.
        PhaseTemplate {
            name: "workset",
            description: "Select the workset of files under analysis",
            stage: Stage::DataPrep,
            findings_bearing: false,
            accepts_exclude_self: false,
        },
        PhaseTemplate {
            name: "graph-build",
            description: "Construct the dependency/call graph",
            stage: Stage::DataPrep,
            findings_bearing: false,
            accepts_exclude_self: false,
        },
        PhaseTemplate {
            name: "cfg",
            description: "Extract control-flow graphs",
            stage: Stage::DataPrep,
            findings_bearing: false,
            accepts_exclude_self: false,
        },
        PhaseTemplate {
            name: "churn",
            description: "Compute churn metadata",
            stage: Stage::DataPrep,
            findings_bearing: false,
            accepts_exclude_self: false,
        },
        // Parallel — Track A: taint, alone.
        PhaseTemplate {
            name: "taint-analyze",
            description: "Run data-flow taint analysis",
            stage: Stage::Parallel(Track::A),
            findings_bearing: true,
            accepts_exclude_self: false,
        },
        // Parallel — Track B: static analysis and graph post-processing.
        PhaseTemplate {
            name: "lint",
            description: "Run linters",
            stage: Stage::Parallel(Track::B),
            findings_bearing: true,
            accepts_exclude_self: false,
        },
        PhaseTemplate {
            name: "detect-patterns",
            description: "Run security/quality pattern detectors",
            stage: Stage::Parallel(Track::B),
            findings_bearing: true,
            accepts_exclude_self: false,
        },
        PhaseTemplate {
            name: "graph-analyze",
            description: "Analyze graph density and cycles",
            stage: Stage::Parallel(Track::B),
            findings_bearing: false,
            accepts_exclude_self: false,
        },
        PhaseTemplate {
            name: "viz",
            description: "Export graph visualizations",
            stage: Stage::Parallel(Track::B),
            findings_bearing: false,
            accepts_exclude_self: false,
        },
        // Parallel — Track C: network-touching, skipped entirely offline.
        PhaseTemplate {
            name: "deps",
            description: "Inventory third-party dependencies",
            stage: Stage::Parallel(Track::C),
            findings_bearing: false,
            accepts_exclude_self: false,
        },
        PhaseTemplate {
            name: "docs",
            description: "Fetch and summarize dependency documentation",
            stage: Stage::Parallel(Track::C),
            findings_bearing: false,
            accepts_exclude_self: false,
        },
        // Final — strictly sequential, last.
        PhaseTemplate {
            name: "fce",
            description: "Correlate facts across phases into findings",
            stage: Stage::Final,
            findings_bearing: true,
            accepts_exclude_self: false,
        },
        PhaseTemplate {
            name: "report",
            description: "Generate the human-readable report",
            stage: Stage::Final,
            findings_bearing: false,
            accepts_exclude_self: false,
        },
        PhaseTemplate {
            name: "summary",
            description: "Build the aggregated run summary",
            stage: Stage::Final,
            findings_bearing: false,
            accepts_exclude_self: false,
        },
    ]
}

pub struct PhasePlanner;

impl PhasePlanner {
    /// Resolve the catalog against `catalog`, assign stages/timeouts, and
    /// build argument vectors. Track C is dropped entirely when
    /// `options.offline` is set.
    pub fn plan(
        catalog: &dyn CommandCatalog,
        config: &PipelineConfig,
        options: &PipelineOptions,
    ) -> Vec<Phase> {
        let mut phases = Vec::new();

        for template in self::catalog() {
            if options.offline && template.stage == Stage::Parallel(Track::C) {
                tracing::info!(phase = template.name, "skipping network-touching phase (offline)");
                continue;
            }

            if !catalog.is_available(template.name) {
                tracing::info!(phase = template.name, "phase not available in this installation, omitting");
                continue;
            }

            let timeout = Duration::from_secs(config.timeout_for(template.name));
            let mut args = vec![format!("pf-phase-{}", template.name), "--root".to_string(), options.root.display().to_string()];
            if template.accepts_exclude_self && options.exclude_self {
                args.push("--exclude-self".to_string());
            }

            let mut phase = Phase::new(template.name, template.description, args, template.stage, timeout);
            if template.findings_bearing {
                phase = phase.findings_bearing();
            }
            if template.accepts_exclude_self {
                phase = phase.with_exclude_self();
            }
            phases.push(phase);
        }

        phases
    }
}
