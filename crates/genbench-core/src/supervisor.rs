//! Owns one workload invocation from spawn to verdict.
//!
//! stdout is classified line by line while it streams; stderr is drained
//! concurrently so a chatty child cannot block on a full pipe, and only its
//! tail is kept and judged once stdout has closed. Nothing here returns an error to the caller: every
//! failure becomes a `RunOutcome` with `success = false`.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant, SystemTime};

use chrono::{Local, SubsecRound};
use genbench_common::config::ArtifactConfig;
use genbench_common::ErrorCategory;
use genbench_obs::telemetry::{self as t, Telemetry};
use genbench_obs::ErrorRecorder;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::artifact;
use crate::classifier::OutputClassifier;
use crate::types::{RunOutcome, RunRequest};

#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("empty workload command")]
    EmptyCommand,
    #[error("failed to spawn {program}: {source}")]
    Spawn { program: String, source: std::io::Error },
    #[error("child {0} pipe was not captured")]
    MissingPipe(&'static str),
    #[error("failed reading child {stream}: {source}")]
    Read { stream: &'static str, source: std::io::Error },
    #[error("failed waiting for child: {0}")]
    Wait(std::io::Error),
    #[error("workload exceeded {0:?} and was killed")]
    TimedOut(Duration),
}

/// Bytes of stderr kept per run; older output is discarded.
pub const DEFAULT_STDERR_LIMIT: usize = 64 * 1024;

/// What the child showed us before it exited.
#[derive(Debug, Default)]
struct Observation {
    exit_code: Option<i32>,
    found_success: bool,
    error_lines: usize,
}

impl Observation {
    fn succeeded(&self) -> bool { self.exit_code == Some(0) && self.error_lines == 0 && self.found_success }
}

#[derive(Clone)]
pub struct Supervisor {
    classifier: OutputClassifier,
    telemetry: Telemetry,
    recorder: ErrorRecorder,
    artifacts: Option<ArtifactConfig>,
    timeout: Option<Duration>,
    stderr_limit: usize,
}

impl Supervisor {
    pub fn new(classifier: OutputClassifier, recorder: ErrorRecorder) -> Self {
        let telemetry = recorder.telemetry().clone();
        Self { classifier, telemetry, recorder, artifacts: None, timeout: None, stderr_limit: DEFAULT_STDERR_LIMIT }
    }

    pub fn with_artifacts(mut self, cfg: Option<ArtifactConfig>) -> Self { self.artifacts = cfg; self }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self { self.timeout = timeout; self }

    pub fn with_stderr_limit(mut self, bytes: usize) -> Self { self.stderr_limit = bytes.max(1); self }

    pub async fn run(&self, request: &RunRequest, argv: &[String]) -> RunOutcome {
        let started_at = Local::now().naive_local().trunc_subsecs(0);
        let spawned_at = SystemTime::now();
        let clock = Instant::now();

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.execute(request, argv))
                .await
                .unwrap_or(Err(SupervisorError::TimedOut(limit))),
            None => self.execute(request, argv).await,
        };

        let (exit_code, mut success) = match result {
            Ok(obs) => {
                self.report_verdict(request.index, &obs);
                (obs.exit_code, obs.succeeded())
            }
            Err(e) => {
                self.recorder.record(ErrorCategory::RuntimeError, format!("test {}: {e}", request.index), false);
                (None, false)
            }
        };
        let duration_seconds = clock.elapsed().as_secs_f64();

        let mut artifact_path = None;
        if success {
            if let Some(cfg) = &self.artifacts {
                match artifact::collect(cfg, request.index, spawned_at) {
                    Ok(Some(path)) => {
                        tracing::info!(target: "supervisor", test = request.index, artifact = %path.display(), "Saved generated artifact");
                        artifact_path = Some(path);
                    }
                    Ok(None) => {
                        tracing::error!(target: "supervisor", test = request.index, dir = %cfg.dir.display(), "Test {} exited cleanly but produced no artifact", request.index);
                        success = false;
                    }
                    Err(e) => {
                        self.recorder.record(ErrorCategory::FileError, format!("test {}: {e}", request.index), false);
                        success = false;
                    }
                }
            }
        }

        if success {
            tracing::info!(target: "supervisor", test = request.index, "Test {} completed successfully", request.index);
            tracing::info!(target: "supervisor", test = request.index, "Generation time: {:.2} seconds", duration_seconds);
        }

        RunOutcome {
            index: request.index,
            prompt: request.prompt.clone(),
            duration_seconds,
            success,
            started_at,
            exit_code,
            artifact_path,
        }
    }

    async fn execute(&self, request: &RunRequest, argv: &[String]) -> Result<Observation, SupervisorError> {
        let (program, args) = argv.split_first().ok_or(SupervisorError::EmptyCommand)?;
        tracing::debug!(target: "supervisor", test = request.index, command = %argv.join(" "), "Running command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn { program: program.clone(), source })?;
        let stdout = child.stdout.take().ok_or(SupervisorError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(SupervisorError::MissingPipe("stderr"))?;

        let mut obs = Observation::default();
        let (stdout_res, stderr_res) = tokio::join!(
            self.consume_stdout(stdout, request.index, &mut obs),
            drain(stderr, self.stderr_limit),
        );
        stdout_res?;
        let tail = stderr_res?;
        if tail.dropped > 0 {
            tracing::warn!(target: "supervisor", test = request.index, dropped_bytes = tail.dropped, "stderr exceeded {} bytes; judging its tail only", self.stderr_limit);
        }

        // Success markers do not excuse stderr; only noise does.
        let errors: Vec<&str> = tail
            .text
            .lines()
            .filter(|line| !line.trim().is_empty() && !self.classifier.is_noise(line))
            .collect();
        if !errors.is_empty() {
            tracing::error!(target: "supervisor", test = request.index, lines = errors.len(), "Error in test {}:", request.index);
            let messages = errors.iter().map(|line| format!("test {}: {line}", request.index)).collect();
            self.recorder.record_all(ErrorCategory::ProcessError, messages).await;
        }
        obs.error_lines = errors.len();

        let status = child.wait().await.map_err(SupervisorError::Wait)?;
        obs.exit_code = exit_code(status);
        Ok(obs)
    }

    async fn consume_stdout<R>(&self, stdout: R, index: usize, obs: &mut Observation) -> Result<(), SupervisorError>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|source| SupervisorError::Read { stream: "stdout", source })?;
            if n == 0 {
                return Ok(());
            }
            let line = String::from_utf8_lossy(&buf);
            // Progress bars redraw with carriage returns; each redraw is its own update.
            for segment in line.split('\r') {
                let c = self.classifier.classify(segment);
                if let Some(rate) = c.progress_rate {
                    self.telemetry.set(t::ITERATIONS_PER_SECOND, rate);
                }
                let text = segment.trim();
                if c.is_success_marker {
                    obs.found_success = true;
                    tracing::info!(target: "workload", test = index, "{text}");
                } else if c.is_noise {
                    tracing::debug!(target: "workload", test = index, "{text}");
                } else if !text.is_empty() {
                    tracing::info!(target: "workload", test = index, "{text}");
                }
            }
        }
    }

    fn report_verdict(&self, index: usize, obs: &Observation) {
        if obs.succeeded() {
            return;
        }
        match obs.exit_code {
            Some(0) if obs.error_lines > 0 => {
                tracing::error!(target: "supervisor", test = index, "Test {index} reported {} error line(s) on stderr", obs.error_lines)
            }
            Some(0) => tracing::error!(target: "supervisor", test = index, "Test {index} did not show completion indicators"),
            Some(code) => tracing::error!(target: "supervisor", test = index, exit_code = code, "Test {index} failed with return code {code}"),
            None => tracing::error!(target: "supervisor", test = index, "Test {index} terminated without an exit code"),
        }
    }
}

struct StderrTail {
    text: String,
    dropped: usize,
}

/// Reads stderr to EOF, keeping at most `limit` trailing bytes. When bytes were
/// dropped the partial first line is dropped with them.
async fn drain<R: AsyncRead + Unpin>(mut stderr: R, limit: usize) -> Result<StderrTail, SupervisorError> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut dropped = 0;
    loop {
        let n = stderr
            .read(&mut chunk)
            .await
            .map_err(|source| SupervisorError::Read { stream: "stderr", source })?;
        if n == 0 {
            break;
        }
        kept.extend_from_slice(&chunk[..n]);
        if kept.len() > limit {
            let excess = kept.len() - limit;
            kept.drain(..excess);
            dropped += excess;
        }
    }
    if dropped > 0 {
        if let Some(pos) = kept.iter().position(|&b| b == b'\n') {
            kept.drain(..=pos);
            dropped += pos + 1;
        }
    }
    Ok(StderrTail { text: String::from_utf8_lossy(&kept).into_owned(), dropped })
}

/// Signal deaths are reported the way shells do, as `128 + signal`.
fn exit_code(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return Some(128 + sig);
        }
    }
    None
}
