//! StageRunner: spawns phases as subprocesses, sequences the four stages,
//! and fans the Parallel stage out across its three tracks.
//!
//! Grounded on the teacher's `src/orchestrator/runner.rs` (subprocess spawn
//! with piped output capture) and `src/dag/executor.rs` (concurrent track
//! execution), adapted from the original Python `run_subprocess_with_interrupt`
//! / `run_command_chain` 100ms poll loop in
//! `examples/original_source/theauditor/pipelines.py`.

use crate::errors::StageRunnerError;
use crate::phase::{Phase, Stage, Track};
use crate::run_logger::RunLogger;
use crate::signal::StopFlag;
use crate::status_reporter::StatusReporter;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Outcome of running one phase to completion, timeout, or interruption.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub interrupted: bool,
    pub duration: Duration,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Result of running every stage, in order, for one pipeline run.
#[derive(Debug, Default)]
pub struct StageOutcome {
    pub results: Vec<(Phase, PhaseOutcome)>,
    /// Set to the name of the Foundation/DataPrep phase whose failure
    /// aborted the run, if any.
    pub aborted_at: Option<String>,
    pub interrupted: bool,
}

pub struct StageRunner;

impl StageRunner {
    /// Spawn one phase, poll every 100ms for completion, timeout, or an
    /// external stop request, and capture its full stdout/stderr.
    pub async fn run_phase(phase: &Phase, stop: &StopFlag, grace_period: Duration) -> Result<PhaseOutcome, StageRunnerError> {
        let mut cmd = Command::new(&phase.args[0]);
        cmd.args(&phase.args[1..]);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| StageRunnerError::SpawnFailed {
            phase: phase.name.clone(),
            source,
        })?;

        let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let start = Instant::now();
        let mut timed_out = false;
        let mut interrupted = false;

        let exit_code = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status.code(),
                Ok(None) => {}
                Err(source) => {
                    return Err(StageRunnerError::SpawnFailed {
                        phase: phase.name.clone(),
                        source,
                    });
                }
            }

            if stop.is_set() {
                interrupted = true;
                break None;
            }
            if start.elapsed() >= phase.timeout {
                timed_out = true;
                break None;
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        };

        let exit_code = match exit_code {
            Some(code) => Some(code),
            None => {
                // Timed out or interrupted: ask the child to terminate,
                // give it `grace_period` to exit on its own, then escalate
                // to a forced kill — the same terminate/wait/kill sequence
                // as the original pipeline's subprocess handling.
                Self::terminate_then_kill(&mut child, grace_period).await;
                None
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let duration = start.elapsed();

        let success = !timed_out
            && !interrupted
            && exit_code.map(|c| phase.exit_code_is_success(c)).unwrap_or(false);

        Ok(PhaseOutcome {
            exit_code,
            success,
            timed_out,
            interrupted,
            duration,
            stdout,
            stderr,
        })
    }

    /// Send a termination signal, wait up to `grace_period` for the child to
    /// exit on its own, then escalate to `SIGKILL`. On unix this sends a real
    /// `SIGTERM` first; elsewhere there's no portable terminate-only signal,
    /// so the grace period is skipped and the kill is immediate.
    async fn terminate_then_kill(child: &mut tokio::process::Child, grace_period: Duration) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // SAFETY: `pid` is the live child's own pid, owned by this
                // `Child` for as long as we hold `&mut child`.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
            if tokio::time::timeout(grace_period, child.wait()).await.is_ok() {
                return;
            }
        }
        let _ = child.start_kill();
        let _ = child.wait().await;
    }

    async fn run_track(
        phases: &[Phase],
        track: Track,
        stop: &StopFlag,
        logger: &RunLogger,
        status: &StatusReporter,
        grace_period: Duration,
    ) -> (Vec<(Phase, PhaseOutcome)>, bool) {
        let mut results = Vec::new();
        let total = phases.len();
        for (i, phase) in phases.iter().enumerate() {
            if stop.is_set() {
                status.mark_interrupted(track);
                return (results, true);
            }
            status.update(track, &phase.name, i, total);
            logger.phase_started(&phase.name);
            match Self::run_phase(phase, stop, grace_period).await {
                Ok(outcome) => {
                    if outcome.timed_out {
                        logger.phase_timed_out(&phase.name);
                    } else {
                        logger.phase_finished(&phase.name, outcome.exit_code.unwrap_or(-1), outcome.success);
                    }
                    logger.append_output(&phase.name, "stdout", &String::from_utf8_lossy(&outcome.stdout));
                    logger.append_output(&phase.name, "stderr", &String::from_utf8_lossy(&outcome.stderr));
                    let interrupted = outcome.interrupted;
                    results.push((phase.clone(), outcome));
                    if interrupted {
                        status.mark_interrupted(track);
                        return (results, true);
                    }
                }
                Err(e) => {
                    tracing::error!(phase = %phase.name, error = %e, "failed to spawn phase");
                    results.push((
                        phase.clone(),
                        PhaseOutcome {
                            exit_code: None,
                            success: false,
                            timed_out: false,
                            interrupted: false,
                            duration: Duration::ZERO,
                            stdout: Vec::new(),
                            stderr: Vec::new(),
                        },
                    ));
                }
            }
        }
        status.update(track, "done", total, total);
        (results, false)
    }

    async fn run_sequential_stage(
        phases: &[Phase],
        stop: &StopFlag,
        logger: &RunLogger,
        grace_period: Duration,
    ) -> (Vec<(Phase, PhaseOutcome)>, Option<String>, bool) {
        let mut results = Vec::new();
        for phase in phases {
            if stop.is_set() {
                return (results, None, true);
            }
            logger.phase_started(&phase.name);
            let outcome = match Self::run_phase(phase, stop, grace_period).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(phase = %phase.name, error = %e, "failed to spawn phase");
                    return (results, Some(phase.name.clone()), false);
                }
            };
            if outcome.timed_out {
                logger.phase_timed_out(&phase.name);
            } else {
                logger.phase_finished(&phase.name, outcome.exit_code.unwrap_or(-1), outcome.success);
            }
            let interrupted = outcome.interrupted;
            let succeeded = outcome.success;
            let name = phase.name.clone();
            results.push((phase.clone(), outcome));
            if interrupted {
                return (results, None, true);
            }
            if !succeeded {
                return (results, Some(name), false);
            }
        }
        (results, None, false)
    }

    /// Run every stage in order: Foundation, DataPrep, Parallel (three
    /// tracks concurrently), Final. Foundation/DataPrep failures abort
    /// immediately; Parallel-stage failures accumulate and Final still
    /// runs (`spec.md` §4.3).
    pub async fn run_all(
        phases: Vec<Phase>,
        stop: &StopFlag,
        logger: &RunLogger,
        status: &StatusReporter,
        grace_period: Duration,
    ) -> StageOutcome {
        let of = |stage: Stage| -> Vec<Phase> { phases.iter().filter(|p| p.stage == stage).cloned().collect() };

        let foundation = of(Stage::Foundation);
        let (mut results, aborted_at, interrupted) =
            Self::run_sequential_stage(&foundation, stop, logger, grace_period).await;
        if aborted_at.is_some() || interrupted {
            return StageOutcome { results, aborted_at, interrupted };
        }

        let dataprep = of(Stage::DataPrep);
        let (dp_results, aborted_at, interrupted) =
            Self::run_sequential_stage(&dataprep, stop, logger, grace_period).await;
        results.extend(dp_results);
        if aborted_at.is_some() || interrupted {
            return StageOutcome { results, aborted_at, interrupted };
        }

        let track_a = of(Stage::Parallel(Track::A));
        let track_b = of(Stage::Parallel(Track::B));
        let track_c = of(Stage::Parallel(Track::C));

        let (a_res, b_res, c_res) = tokio::join!(
            Self::run_track(&track_a, Track::A, stop, logger, status, grace_period),
            Self::run_track(&track_b, Track::B, stop, logger, status, grace_period),
            Self::run_track(&track_c, Track::C, stop, logger, status, grace_period),
        );

        let parallel_interrupted = a_res.1 || b_res.1 || c_res.1;
        results.extend(a_res.0);
        results.extend(b_res.0);
        results.extend(c_res.0);

        if parallel_interrupted {
            return StageOutcome {
                results,
                aborted_at: None,
                interrupted: true,
            };
        }

        let finale = of(Stage::Final);
        let (final_results, aborted_at, interrupted) =
            Self::run_sequential_stage(&finale, stop, logger, grace_period).await;
        results.extend(final_results);

        StageOutcome { results, aborted_at, interrupted }
    }
}
