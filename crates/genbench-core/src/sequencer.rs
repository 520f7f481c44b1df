use std::fmt;
use std::time::{Duration, Instant};

use genbench_common::config::WorkloadConfig;
use genbench_common::ErrorCategory;
use genbench_obs::telemetry::{self as t, Telemetry};
use genbench_obs::{wait_for_shutdown, ErrorRecorder};
use serde::Serialize;
use tokio::sync::watch;

use crate::ledger::ResultsLedger;
use crate::supervisor::Supervisor;
use crate::types::{RunOutcome, RunRequest};

/// End-of-suite figures. Duration statistics cover successful runs only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteSummary {
    pub total: usize,
    pub attempted: usize,
    pub successes: usize,
    pub total_seconds: f64,
    pub mean_seconds: Option<f64>,
    pub min_seconds: Option<f64>,
    pub max_seconds: Option<f64>,
}

impl SuiteSummary {
    pub fn from_outcomes(total: usize, outcomes: &[RunOutcome], wall: Duration) -> Self {
        let durations: Vec<f64> = outcomes.iter().filter(|o| o.success).map(|o| o.duration_seconds).collect();
        let (mean_seconds, min_seconds, max_seconds) = if durations.is_empty() {
            (None, None, None)
        } else {
            (
                Some(durations.iter().sum::<f64>() / durations.len() as f64),
                durations.iter().copied().reduce(f64::min),
                durations.iter().copied().reduce(f64::max),
            )
        };
        Self {
            total,
            attempted: outcomes.len(),
            successes: durations.len(),
            total_seconds: wall.as_secs_f64(),
            mean_seconds,
            min_seconds,
            max_seconds,
        }
    }

    pub fn log(&self) {
        tracing::info!(target: "suite", "=== Test Suite Summary ===");
        tracing::info!(target: "suite", successes = self.successes, total = self.total, "Tests completed: {self}");
        tracing::info!(target: "suite", "Total time: {:.2} seconds", self.total_seconds);
        if let (Some(mean), Some(min), Some(max)) = (self.mean_seconds, self.min_seconds, self.max_seconds) {
            tracing::info!(target: "suite", "Average time per successful video: {mean:.2} seconds");
            tracing::info!(target: "suite", "Fastest generation: {min:.2} seconds");
            tracing::info!(target: "suite", "Slowest generation: {max:.2} seconds");
        }
        tracing::info!(target: "suite", "=== End of Test Suite ===");
    }
}

impl fmt::Display for SuiteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}/{}", self.successes, self.total) }
}

#[derive(Debug)]
pub struct SuiteReport {
    pub outcomes: Vec<RunOutcome>,
    pub summary: SuiteSummary,
    pub interrupted: bool,
}

/// Runs prompts strictly one after another with a fixed cooldown in between.
pub struct Sequencer {
    supervisor: Supervisor,
    workload: WorkloadConfig,
    ledger: ResultsLedger,
    recorder: ErrorRecorder,
    telemetry: Telemetry,
    cooldown: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Sequencer {
    pub fn new(
        supervisor: Supervisor,
        workload: WorkloadConfig,
        ledger: ResultsLedger,
        recorder: ErrorRecorder,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let telemetry = recorder.telemetry().clone();
        Self { supervisor, workload, ledger, recorder, telemetry, cooldown: Duration::from_secs(30), shutdown }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self { self.cooldown = cooldown; self }

    pub fn ledger(&self) -> &ResultsLedger { &self.ledger }

    /// One outcome per prompt, in order, whatever the individual verdicts.
    /// An interrupt stops the loop between runs (or kills the in-flight child,
    /// whose run is then not recorded); the summary is produced either way.
    pub async fn run_suite(&mut self, prompts: &[String]) -> SuiteReport {
        let requests = RunRequest::from_prompts(prompts);
        let total = requests.len();
        let suite_start = Instant::now();
        let mut shutdown = self.shutdown.clone();
        let mut interrupted = false;

        tracing::info!(target: "suite", total, "=== Starting Video Generation Test Suite ===");
        self.telemetry.set(t::TOTAL_TESTS, total as f64);

        for request in &requests {
            if *shutdown.borrow() {
                interrupted = true;
                break;
            }
            tracing::info!(target: "suite", test = request.index, "Starting video generation test {}/{}", request.index, total);
            tracing::info!(target: "suite", test = request.index, "Prompt: {}", request.prompt);
            self.telemetry.set(t::CURRENT_TEST, request.index as f64);

            let argv = self.workload.argv(request.index, &request.prompt);
            let started = Instant::now();
            let outcome = tokio::select! {
                outcome = self.supervisor.run(request, &argv) => outcome,
                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::warn!(target: "suite", test = request.index, "Test suite interrupted during test {}; run discarded", request.index);
                    interrupted = true;
                    break;
                }
            };
            let outcome = RunOutcome {
                index: request.index,
                prompt: request.prompt.clone(),
                duration_seconds: started.elapsed().as_secs_f64(),
                ..outcome
            };

            self.telemetry.set(t::RUN_DURATION, outcome.duration_seconds);
            self.telemetry.record_run(outcome.success);
            if let Err(e) = self.ledger.append(outcome) {
                self.recorder.record(ErrorCategory::FileError, format!("Failed to save test results: {e}"), false);
            }

            if request.index < total {
                tracing::info!(target: "suite", "Cooling down for {} seconds...", self.cooldown.as_secs_f64());
                tokio::select! {
                    _ = tokio::time::sleep(self.cooldown) => {}
                    _ = wait_for_shutdown(&mut shutdown) => {
                        tracing::warn!(target: "suite", "Test suite interrupted during cooldown");
                        interrupted = true;
                        break;
                    }
                }
            }
        }

        let summary = SuiteSummary::from_outcomes(total, self.ledger.outcomes(), suite_start.elapsed());
        if interrupted {
            tracing::warn!(target: "suite", "Test suite interrupted by user");
        }
        summary.log();
        SuiteReport { outcomes: self.ledger.outcomes().to_vec(), summary, interrupted }
    }
}
