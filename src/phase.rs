//! Phase, Stage and Track definitions.
//!
//! A [`Phase`] is a single analysis step run as a subprocess. Phases are
//! assigned to a [`Stage`] by the planner; within the `Parallel` stage a
//! phase additionally belongs to one of three [`Track`]s.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One of the three concurrent workers in the Parallel stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    /// Taint analysis, alone — the most memory-intensive phase.
    A,
    /// Static analysis and graph post-processing.
    B,
    /// Network-touching phases; skipped entirely when offline.
    C,
}

impl Track {
    /// Lowercase single-letter name used for status files (`a`/`b`/`c`).
    pub fn as_str(self) -> &'static str {
        match self {
            Track::A => "a",
            Track::B => "b",
            Track::C => "c",
        }
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution stage. Stages run strictly in declaration order; only
/// `Parallel` permits concurrency, and only across its three tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Foundation,
    DataPrep,
    Parallel(Track),
    Final,
}

impl Stage {
    /// Ordinal used to sort stages into their execution order.
    pub fn order(self) -> u8 {
        match self {
            Stage::Foundation => 0,
            Stage::DataPrep => 1,
            Stage::Parallel(_) => 2,
            Stage::Final => 3,
        }
    }

    /// Whether a failure in this stage aborts the whole run.
    pub fn is_fatal_on_failure(self) -> bool {
        matches!(self, Stage::Foundation | Stage::DataPrep)
    }
}

/// A single analysis phase: an executable subprocess with an argument
/// vector, a timeout, and a stage assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    /// Unique name within a run, e.g. `"index"`, `"taint-analyze"`.
    pub name: String,
    /// Human-readable description, used in logs and status records.
    pub description: String,
    /// The executable and its argument vector, e.g. `["auditor-index", "--root", "."]`.
    pub args: Vec<String>,
    /// Stage this phase belongs to.
    pub stage: Stage,
    /// Wall-clock timeout, finite and bounded by configuration.
    pub timeout: Duration,
    /// Whether exit codes 1 and 2 encode severity (high/critical) rather
    /// than failure. Any other phase treats any nonzero code as failure.
    pub treats_nonzero_as_findings: bool,
    /// Whether this phase accepts an `--exclude-self` flag (only the
    /// indexer does, per `spec.md` §4.2).
    pub accepts_exclude_self: bool,
}

impl Phase {
    /// Create a new phase with an explicit stage and timeout.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        args: Vec<String>,
        stage: Stage,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args,
            stage,
            timeout,
            treats_nonzero_as_findings: false,
            accepts_exclude_self: false,
        }
    }

    /// Mark this phase as findings-bearing (exit codes 0/1/2 are success).
    pub fn findings_bearing(mut self) -> Self {
        self.treats_nonzero_as_findings = true;
        self
    }

    /// Mark this phase as accepting `--exclude-self`.
    pub fn with_exclude_self(mut self) -> Self {
        self.accepts_exclude_self = true;
        self
    }

    /// Whether the given exit code counts as success for this phase.
    pub fn exit_code_is_success(&self, code: i32) -> bool {
        if self.treats_nonzero_as_findings {
            matches!(code, 0 | 1 | 2)
        } else {
            code == 0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_findings_phase_only_zero_succeeds() {
        let p = Phase::new("index", "Index", vec!["idx".into()], Stage::Foundation, Duration::from_secs(600));
        assert!(p.exit_code_is_success(0));
        assert!(!p.exit_code_is_success(1));
        assert!(!p.exit_code_is_success(2));
    }

    #[test]
    fn findings_bearing_phase_accepts_0_1_2() {
        let p = Phase::new("fce", "Correlate", vec!["fce".into()], Stage::Final, Duration::from_secs(1800))
            .findings_bearing();
        assert!(p.exit_code_is_success(0));
        assert!(p.exit_code_is_success(1));
        assert!(p.exit_code_is_success(2));
        assert!(!p.exit_code_is_success(3));
    }

    #[test]
    fn stage_order_is_foundation_dataprep_parallel_final() {
        assert!(Stage::Foundation.order() < Stage::DataPrep.order());
        assert!(Stage::DataPrep.order() < Stage::Parallel(Track::A).order());
        assert!(Stage::Parallel(Track::A).order() < Stage::Final.order());
        // All tracks order equally within Parallel.
        assert_eq!(Stage::Parallel(Track::A).order(), Stage::Parallel(Track::C).order());
    }

    #[test]
    fn only_foundation_and_dataprep_are_fatal() {
        assert!(Stage::Foundation.is_fatal_on_failure());
        assert!(Stage::DataPrep.is_fatal_on_failure());
        assert!(!Stage::Parallel(Track::A).is_fatal_on_failure());
        assert!(!Stage::Final.is_fatal_on_failure());
    }

    #[test]
    fn track_display_is_lowercase_letter() {
        assert_eq!(Track::A.to_string(), "a");
        assert_eq!(Track::B.to_string(), "b");
        assert_eq!(Track::C.to_string(), "c");
    }
}
