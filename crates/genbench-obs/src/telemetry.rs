//! Pull-based metrics exporter state.
//!
//! Every observation is a prometheus gauge or counter held in a registry owned
//! by one `Telemetry` instance. Gauges are atomic, so the benchmark loop and
//! the sidecar loops may write through clones of the same handle.

use std::collections::HashMap;
use std::sync::Arc;

use genbench_common::ErrorCategory;
use prometheus::{Gauge, IntCounterVec, Opts, Registry};

pub const ITERATIONS_PER_SECOND: &str = "video_generation_iterations_per_second";
pub const CURRENT_TEST: &str = "video_generation_current_test";
pub const TOTAL_TESTS: &str = "video_generation_total_tests";
pub const RUN_DURATION: &str = "video_generation_duration_seconds";
pub const GPU_UTILIZATION: &str = "gpu_utilization_percent";
pub const GPU_MEMORY_USED: &str = "gpu_memory_used_mb";
pub const GPU_MEMORY_AVAILABLE: &str = "gpu_memory_available_mb";
pub const GPU_TEMPERATURE: &str = "gpu_temperature_celsius";
pub const CPU_UTILIZATION: &str = "cpu_utilization_percent";
pub const MEMORY_USED: &str = "memory_used_percent";
pub const MEMORY_AVAILABLE: &str = "memory_available_mb";
pub const DISK_READ: &str = "disk_read_bytes_per_sec";
pub const DISK_WRITE: &str = "disk_write_bytes_per_sec";
pub const STORAGE_READ: &str = "storage_read_speed_mbps";
pub const STORAGE_WRITE: &str = "storage_write_speed_mbps";

const GAUGES: &[(&str, &str)] = &[
    (ITERATIONS_PER_SECOND, "Iterations per second for video generation"),
    (CURRENT_TEST, "Index of the test currently running"),
    (TOTAL_TESTS, "Number of tests in the suite"),
    (RUN_DURATION, "Duration of the last completed run in seconds"),
    (GPU_UTILIZATION, "GPU utilization percentage"),
    (GPU_MEMORY_USED, "GPU memory used in MB"),
    (GPU_MEMORY_AVAILABLE, "Available GPU memory in MB"),
    (GPU_TEMPERATURE, "GPU temperature in Celsius"),
    (CPU_UTILIZATION, "CPU utilization percentage"),
    (MEMORY_USED, "Memory utilization percentage"),
    (MEMORY_AVAILABLE, "Available memory in MB"),
    (DISK_READ, "Disk read MB per second"),
    (DISK_WRITE, "Disk write MB per second"),
    (STORAGE_READ, "Storage read speed in MB/s"),
    (STORAGE_WRITE, "Storage write speed in MB/s"),
];

#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    gauges: HashMap<&'static str, Gauge>,
    errors: IntCounterVec,
    runs: IntCounterVec,
}

impl Telemetry {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let mut gauges = HashMap::with_capacity(GAUGES.len());
        for (name, help) in GAUGES {
            let gauge = Gauge::with_opts(Opts::new(*name, *help))?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(*name, gauge);
        }
        let errors = IntCounterVec::new(Opts::new("system_errors_total", "Total number of errors"), &["type"])?;
        registry.register(Box::new(errors.clone()))?;
        let runs = IntCounterVec::new(
            Opts::new("video_generation_runs_total", "Completed workload runs by result"),
            &["result"],
        )?;
        registry.register(Box::new(runs.clone()))?;
        Ok(Self { inner: Arc::new(Inner { registry, gauges, errors, runs }) })
    }

    /// Sets a named gauge. Unknown names are ignored and reported as `false`.
    pub fn set(&self, name: &str, value: f64) -> bool {
        match self.inner.gauges.get(name) {
            Some(g) => { g.set(value); true }
            None => {
                tracing::debug!(target: "telemetry", name, "ignoring unknown gauge");
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> { self.inner.gauges.get(name).map(Gauge::get) }

    pub fn record_error(&self, category: ErrorCategory) {
        self.inner.errors.with_label_values(&[category.as_str()]).inc();
    }

    pub fn error_count(&self, category: ErrorCategory) -> u64 {
        self.inner.errors.with_label_values(&[category.as_str()]).get()
    }

    pub fn record_run(&self, success: bool) {
        self.inner.runs.with_label_values(&[run_label(success)]).inc();
    }

    pub fn run_count(&self, success: bool) -> u64 {
        self.inner.runs.with_label_values(&[run_label(success)]).get()
    }

    pub fn registry(&self) -> &Registry { &self.inner.registry }
}

fn run_label(success: bool) -> &'static str { if success { "success" } else { "failure" } }
