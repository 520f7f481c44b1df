//! Continuous host telemetry loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use genbench_common::ErrorCategory;
use tokio::sync::watch;

use crate::host::{io_rates, DiskIoCounters, HostMetrics};
use crate::recorder::ErrorRecorder;
use crate::telemetry::{self as t, Telemetry};

pub struct Collector {
    metrics: Arc<dyn HostMetrics>,
    telemetry: Telemetry,
    recorder: ErrorRecorder,
    interval: Duration,
    prev_io: Option<(DiskIoCounters, Instant)>,
}

impl Collector {
    pub fn new(metrics: Arc<dyn HostMetrics>, recorder: ErrorRecorder, interval: Duration) -> Self {
        let telemetry = recorder.telemetry().clone();
        Self { metrics, telemetry, recorder, interval, prev_io: None }
    }

    /// One polling pass. A failed reading is recorded and skipped until the next pass.
    pub fn tick(&mut self) {
        match self.metrics.gpus() {
            Ok(gpus) => {
                if let Some(gpu) = gpus.first() {
                    self.telemetry.set(t::GPU_UTILIZATION, gpu.utilization_pct);
                    self.telemetry.set(t::GPU_MEMORY_USED, gpu.memory_used_mb);
                    self.telemetry.set(t::GPU_MEMORY_AVAILABLE, gpu.memory_free_mb());
                    if let Some(temp) = gpu.temperature_c { self.telemetry.set(t::GPU_TEMPERATURE, temp); }
                }
            }
            Err(e) => { self.recorder.record(ErrorCategory::GpuMetricError, e.to_string(), false); }
        }

        match self.metrics.cpu_percent() {
            Ok(pct) => { self.telemetry.set(t::CPU_UTILIZATION, pct); }
            Err(e) => { self.recorder.record(ErrorCategory::CpuMetricError, e.to_string(), false); }
        }

        match self.metrics.memory() {
            Ok(mem) => {
                self.telemetry.set(t::MEMORY_USED, mem.used_pct);
                self.telemetry.set(t::MEMORY_AVAILABLE, mem.available_mb);
            }
            Err(e) => { self.recorder.record(ErrorCategory::MemoryMetricError, e.to_string(), false); }
        }

        match self.metrics.disk_io() {
            Ok(counters) => {
                let now = (counters, Instant::now());
                if let Some(prev) = self.prev_io {
                    let (read, write) = io_rates(prev, now);
                    self.telemetry.set(t::DISK_READ, read);
                    self.telemetry.set(t::DISK_WRITE, write);
                }
                self.prev_io = Some(now);
            }
            Err(e) => { self.recorder.record(ErrorCategory::DiskMetricError, e.to_string(), false); }
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(target: "collector", interval_ms = self.interval.as_millis() as u64, "Started system metrics collection");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                _ = crate::wait_for_shutdown(&mut shutdown) => break,
            }
        }
        tracing::info!(target: "collector", "system metrics collection stopped");
    }
}
