//! SummaryBuilder: writes the two human/tool-facing summary documents that
//! close out a run — `allfiles.md` and `audit_summary.json`.
//!
//! Grounded on the original Python pipeline's final-stage report writer
//! (`examples/original_source/theauditor/pipelines.py`, the `report` and
//! `summary` command invocations) for the document shapes, and on the
//! teacher's `src/audit/logger.rs` for writing JSON documents with
//! `serde_json` + `chrono` timestamps.

use crate::artifact_store::ArtifactStore;
use crate::errors::SummaryError;
use crate::stage_runner::StageOutcome;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }

    /// Overall status label, highest severity present wins.
    pub fn status(&self) -> &'static str {
        if self.critical > 0 {
            "CRITICAL"
        } else if self.high > 0 {
            "HIGH"
        } else if self.medium > 0 {
            "MEDIUM"
        } else if self.low > 0 {
            "LOW"
        } else {
            "CLEAN"
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseMetric {
    pub name: String,
    pub stage: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub duration_s: f64,
    pub timed_out: bool,
    pub interrupted: bool,
}

/// The run's status label (findings severity) and its failure label
/// (whether the pipeline itself aborted) are independent axes: a run can
/// be CLEAN and still have failed to complete, or CRITICAL and have
/// completed every phase (`spec.md` §4.6).
#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    pub run_id: String,
    pub generated_at: String,
    pub status: String,
    pub pipeline_failed: bool,
    pub aborted_at: Option<String>,
    pub total_duration_s: f64,
    pub findings: SeverityCounts,
    pub phases: Vec<PhaseMetric>,
}

pub struct SummaryBuilder;

impl SummaryBuilder {
    /// Count findings by severity out of a parsed FCE/report document. Any
    /// entry whose `severity` field doesn't match a known label is ignored
    /// rather than guessed at.
    pub fn count_severities(document: &Value) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        let findings = document
            .get("all_findings")
            .or_else(|| document.get("findings"))
            .and_then(Value::as_array);

        let Some(findings) = findings else {
            return counts;
        };

        for finding in findings {
            let severity = finding.get("severity").and_then(Value::as_str).unwrap_or("").to_ascii_lowercase();
            match severity.as_str() {
                "critical" => counts.critical += 1,
                "high" => counts.high += 1,
                "medium" => counts.medium += 1,
                "low" => counts.low += 1,
                _ => {}
            }
        }
        counts
    }

    /// Build `audit_summary.json` and `allfiles.md` from a completed
    /// [`StageOutcome`] and a parsed findings document. Written directly
    /// under `.pf/`, not through [`ArtifactStore`]: these documents are
    /// regenerated every run and never write-once.
    pub fn build(pf_dir: &Path, outcome: &StageOutcome, findings: SeverityCounts) -> Result<(), SummaryError> {
        let total_duration_s: f64 = outcome.results.iter().map(|(_, o)| o.duration.as_secs_f64()).sum();

        let phases: Vec<PhaseMetric> = outcome
            .results
            .iter()
            .map(|(phase, o)| PhaseMetric {
                name: phase.name.clone(),
                stage: format!("{:?}", phase.stage),
                success: o.success,
                exit_code: o.exit_code,
                duration_s: o.duration.as_secs_f64(),
                timed_out: o.timed_out,
                interrupted: o.interrupted,
            })
            .collect();

        let summary = AuditSummary {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            status: findings.status().to_string(),
            pipeline_failed: outcome.aborted_at.is_some() || outcome.interrupted,
            aborted_at: outcome.aborted_at.clone(),
            total_duration_s,
            findings,
            phases,
        };

        let summary_path = pf_dir.join("audit_summary.json");
        let json = serde_json::to_string_pretty(&summary).expect("AuditSummary serializes");
        std::fs::write(&summary_path, json).map_err(|source| SummaryError::WriteFailed {
            path: summary_path.clone(),
            source,
        })?;

        let allfiles_path = pf_dir.join("allfiles.md");
        let markdown = Self::render_allfiles(pf_dir, total_duration_s)?;
        std::fs::write(&allfiles_path, markdown).map_err(|source| SummaryError::WriteFailed {
            path: allfiles_path.clone(),
            source,
        })?;

        Ok(())
    }

    /// Walk the whole `.pf/` tree — `raw/`, `readthis/`, `status/`,
    /// `history/`, `pipeline.log`, and the summary documents themselves —
    /// and group every file it finds by its parent directory, the way
    /// `spec.md` §4.6 describes `allfiles.md`.
    fn render_allfiles(pf_dir: &Path, total_duration_s: f64) -> Result<String, SummaryError> {
        let mut by_dir: BTreeMap<String, Vec<(String, u64)>> = BTreeMap::new();
        let mut grand_total = 0u64;

        for entry in walkdir::WalkDir::new(pf_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            grand_total += size;

            let rel = entry.path().strip_prefix(pf_dir).unwrap_or(entry.path());
            let group = match rel.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
                _ => ".".to_string(),
            };
            let name = rel.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            by_dir.entry(group).or_default().push((name, size));
        }

        let mut out = String::new();
        out.push_str("# Artifact Tree\n\n");
        for (dir, mut files) in by_dir {
            files.sort_by(|a, b| a.0.cmp(&b.0));
            out.push_str(&format!("## {dir}\n\n"));
            for (name, size) in &files {
                out.push_str(&format!("- `{name}` ({size} bytes)\n"));
            }
            out.push('\n');
        }
        out.push_str(&format!("Total artifact bytes: {grand_total}\n"));
        out.push_str(&format!("Run duration: {total_duration_s:.2}s\n"));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Phase, Stage};
    use crate::stage_runner::PhaseOutcome;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn count_severities_ignores_unknown_labels() {
        let doc = json!({"all_findings": [
            {"severity": "Critical"},
            {"severity": "high"},
            {"severity": "weird"},
            {"severity": "low"},
        ]});
        let counts = SummaryBuilder::count_severities(&doc);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.high, 1);
        assert_eq!(counts.low, 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn status_picks_highest_severity_present() {
        let counts = SeverityCounts { critical: 0, high: 1, medium: 5, low: 0 };
        assert_eq!(counts.status(), "HIGH");
        assert_eq!(SeverityCounts::default().status(), "CLEAN");
    }

    #[test]
    fn build_writes_both_documents() {
        let dir = TempDir::new().unwrap();
        let pf_dir = dir.path().join(".pf");
        let store = ArtifactStore::new(&pf_dir).unwrap();
        store.write("index.json", b"{}").unwrap();

        let phase = Phase::new("index", "Index", vec!["idx".into()], Stage::Foundation, Duration::from_secs(60));
        let outcome = StageOutcome {
            results: vec![(
                phase,
                PhaseOutcome {
                    exit_code: Some(0),
                    success: true,
                    timed_out: false,
                    interrupted: false,
                    duration: Duration::from_secs(2),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                },
            )],
            aborted_at: None,
            interrupted: false,
        };

        SummaryBuilder::build(&pf_dir, &outcome, SeverityCounts::default()).unwrap();
        assert!(pf_dir.join("audit_summary.json").exists());
        assert!(pf_dir.join("allfiles.md").exists());

        let json: Value = serde_json::from_str(&std::fs::read_to_string(pf_dir.join("audit_summary.json")).unwrap()).unwrap();
        assert_eq!(json["status"], "CLEAN");
        assert_eq!(json["pipeline_failed"], false);
    }

    #[test]
    fn pipeline_failed_is_independent_of_findings_status() {
        let dir = TempDir::new().unwrap();
        let pf_dir = dir.path().join(".pf");
        std::fs::create_dir_all(&pf_dir).unwrap();

        let outcome = StageOutcome {
            results: Vec::new(),
            aborted_at: Some("index".to_string()),
            interrupted: false,
        };

        // Zero findings (CLEAN) but the pipeline still aborted.
        SummaryBuilder::build(&pf_dir, &outcome, SeverityCounts::default()).unwrap();
        let json: Value = serde_json::from_str(&std::fs::read_to_string(pf_dir.join("audit_summary.json")).unwrap()).unwrap();
        assert_eq!(json["status"], "CLEAN");
        assert_eq!(json["pipeline_failed"], true);
        assert_eq!(json["aborted_at"], "index");
    }
}
