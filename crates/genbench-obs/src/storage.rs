//! Periodic fio throughput probe.

use std::time::Duration;

use genbench_common::config::StorageConfig;
use genbench_common::ErrorCategory;
use tokio::process::Command;
use tokio::sync::watch;

use crate::recorder::ErrorRecorder;
use crate::telemetry::{self as t, Telemetry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    Read,
    Write,
}

impl IoDirection {
    pub fn test_name(self) -> &'static str {
        match self { Self::Read => "read_test", Self::Write => "write_test" }
    }
    pub fn rw(self) -> &'static str {
        match self { Self::Read => "read", Self::Write => "write" }
    }
    pub fn gauge(self) -> &'static str {
        match self { Self::Read => t::STORAGE_READ, Self::Write => t::STORAGE_WRITE }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("failed to launch {program}: {source}")]
    Spawn { program: String, source: std::io::Error },
    #[error("{test} exited with {status:?}: {stderr}")]
    Failed { test: &'static str, status: Option<i32>, stderr: String },
    #[error("unparsable fio output: {0}")]
    Parse(String),
}

pub fn fio_args(cfg: &StorageConfig, dir: IoDirection) -> Vec<String> {
    vec![
        format!("--name={}", dir.test_name()),
        format!("--rw={}", dir.rw()),
        format!("--size={}", cfg.size),
        format!("--directory={}", cfg.directory.display()),
        "--direct=1".into(),
        format!("--bs={}", cfg.block_size),
        format!("--ioengine={}", cfg.ioengine),
        "--output-format=json".into(),
    ]
}

/// Extracts `jobs[0].<read|write>.bw` (KiB/s) from fio JSON output as MB/s.
pub fn parse_fio_bandwidth(json: &str, dir: IoDirection) -> Result<f64, StorageError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| StorageError::Parse(e.to_string()))?;
    value
        .pointer(&format!("/jobs/0/{}/bw", dir.rw()))
        .and_then(serde_json::Value::as_f64)
        .map(|kib| kib / 1024.0)
        .ok_or_else(|| StorageError::Parse(format!("missing jobs[0].{}.bw", dir.rw())))
}

pub struct StorageProber {
    cfg: StorageConfig,
    telemetry: Telemetry,
    recorder: ErrorRecorder,
    program: String,
}

impl StorageProber {
    pub fn new(cfg: StorageConfig, recorder: ErrorRecorder) -> Self {
        let telemetry = recorder.telemetry().clone();
        Self { cfg, telemetry, recorder, program: "fio".into() }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self { self.program = program.into(); self }

    pub async fn probe(&self, dir: IoDirection) -> Result<f64, StorageError> {
        let out = Command::new(&self.program)
            .args(fio_args(&self.cfg, dir))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| StorageError::Spawn { program: self.program.clone(), source })?;
        if !out.status.success() {
            return Err(StorageError::Failed {
                test: dir.test_name(),
                status: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        parse_fio_bandwidth(&String::from_utf8_lossy(&out.stdout), dir)
    }

    /// Runs the read then the write test, updating gauges for those that succeed.
    pub async fn run_once(&self) -> Vec<(IoDirection, Result<f64, StorageError>)> {
        let mut results = Vec::with_capacity(2);
        for dir in [IoDirection::Read, IoDirection::Write] {
            let res = self.probe(dir).await;
            match &res {
                Ok(speed) => {
                    self.telemetry.set(dir.gauge(), *speed);
                    tracing::info!(target: "storage", test = dir.test_name(), mbps = *speed, "{} completed: {:.2} MB/s", dir.test_name(), speed);
                }
                Err(e) => { self.recorder.record(ErrorCategory::StorageError, format!("Error running {}: {e}", dir.test_name()), false); }
            }
            results.push((dir, res));
        }
        results
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.cfg.interval_secs.max(1));
        loop {
            tokio::select! {
                _ = self.run_once() => {}
                _ = crate::wait_for_shutdown(&mut shutdown) => break,
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = crate::wait_for_shutdown(&mut shutdown) => break,
            }
        }
        tracing::info!(target: "storage", "storage probe stopped");
    }
}
