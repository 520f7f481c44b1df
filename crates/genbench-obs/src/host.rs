//! Host and GPU state readers.
//!
//! Every sub-metric is read independently; `snapshot` keeps whatever succeeded
//! so a machine without GPUs (or without `/proc`) still yields a partial view.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

const MB: f64 = 1024.0 * 1024.0;
const SECTOR_BYTES: u64 = 512;

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("gpu query failed: {0}")]
    Gpu(String),
    #[error("{what} unavailable: {reason}")]
    Unavailable { what: &'static str, reason: String },
    #[error("io error reading {path}: {source}")]
    Io { path: String, source: std::io::Error },
}

impl ProbeError {
    fn unavailable(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable { what, reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuState {
    pub id: u32,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub utilization_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
}

impl GpuState {
    pub fn memory_free_mb(&self) -> f64 { (self.memory_total_mb - self.memory_used_mb).max(0.0) }
}

/// Point-in-time host view. Absent fields failed to read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<Vec<GpuState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryReading {
    pub used_pct: f64,
    pub available_mb: f64,
}

/// Cumulative block device counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskIoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

pub trait GpuReader: Send + Sync {
    fn read(&self) -> Result<Vec<GpuState>, ProbeError>;
}

/// Individual host readings, each allowed to fail on its own.
pub trait HostMetrics: Send + Sync {
    fn gpus(&self) -> Result<Vec<GpuState>, ProbeError>;
    fn cpu_percent(&self) -> Result<f64, ProbeError>;
    fn memory(&self) -> Result<MemoryReading, ProbeError>;
    fn disk_percent(&self) -> Result<f64, ProbeError>;
    fn disk_io(&self) -> Result<DiskIoCounters, ProbeError>;
}

pub trait HostProbe: Send + Sync {
    fn capture(&self) -> Result<HostSnapshot, ProbeError>;
}

/// Composes a partial snapshot, dropping sub-metrics that failed.
pub fn snapshot(metrics: &dyn HostMetrics) -> HostSnapshot {
    fn keep<T>(what: &str, r: Result<T, ProbeError>) -> Option<T> {
        r.map_err(|e| tracing::debug!(target: "host", what, error = %e, "sub-metric omitted")).ok()
    }
    HostSnapshot {
        gpu: keep("gpu", metrics.gpus()),
        memory_pct: keep("memory", metrics.memory()).map(|m| m.used_pct),
        cpu_pct: keep("cpu", metrics.cpu_percent()),
        disk_pct: keep("disk", metrics.disk_percent()),
    }
}

pub struct NvidiaSmi {
    program: String,
}

impl NvidiaSmi {
    pub fn new() -> Self { Self { program: "nvidia-smi".into() } }
    pub fn with_program(program: impl Into<String>) -> Self { Self { program: program.into() } }
}

impl Default for NvidiaSmi {
    fn default() -> Self { Self::new() }
}

impl GpuReader for NvidiaSmi {
    fn read(&self) -> Result<Vec<GpuState>, ProbeError> {
        let out = Command::new(&self.program)
            .args([
                "--query-gpu=index,memory.used,memory.total,utilization.gpu,temperature.gpu",
                "--format=csv,noheader,nounits",
            ])
            .output()
            .map_err(|e| ProbeError::Gpu(format!("{}: {e}", self.program)))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(ProbeError::Gpu(format!("{} exited with {}: {}", self.program, out.status, stderr.trim())));
        }
        parse_nvidia_smi(&String::from_utf8_lossy(&out.stdout))
    }
}

/// Parses `index, memory.used, memory.total, utilization.gpu, temperature.gpu` rows.
pub fn parse_nvidia_smi(text: &str) -> Result<Vec<GpuState>, ProbeError> {
    let mut gpus = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        if cols.len() < 4 {
            return Err(ProbeError::Gpu(format!("unexpected row: {line}")));
        }
        let num = |i: usize| cols[i].parse::<f64>().map_err(|_| ProbeError::Gpu(format!("bad value {:?} in row: {line}", cols[i])));
        gpus.push(GpuState {
            id: cols[0].parse().map_err(|_| ProbeError::Gpu(format!("bad index in row: {line}")))?,
            memory_used_mb: num(1)?,
            memory_total_mb: num(2)?,
            utilization_pct: num(3)?,
            temperature_c: cols.get(4).and_then(|t| t.parse().ok()),
        });
    }
    Ok(gpus)
}

#[cfg(feature = "nvidia")]
pub struct NvmlReader {
    nvml: nvml_wrapper::Nvml,
}

#[cfg(feature = "nvidia")]
impl NvmlReader {
    pub fn init() -> Result<Self, ProbeError> {
        let nvml = nvml_wrapper::Nvml::init().map_err(|e| ProbeError::Gpu(e.to_string()))?;
        Ok(Self { nvml })
    }
}

#[cfg(feature = "nvidia")]
impl GpuReader for NvmlReader {
    fn read(&self) -> Result<Vec<GpuState>, ProbeError> {
        use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
        let gpu_err = |e: nvml_wrapper::error::NvmlError| ProbeError::Gpu(e.to_string());
        let count = self.nvml.device_count().map_err(gpu_err)?;
        let mut gpus = Vec::with_capacity(count as usize);
        for id in 0..count {
            let device = self.nvml.device_by_index(id).map_err(gpu_err)?;
            let mem = device.memory_info().map_err(gpu_err)?;
            let util = device.utilization_rates().map_err(gpu_err)?;
            gpus.push(GpuState {
                id,
                memory_used_mb: mem.used as f64 / MB,
                memory_total_mb: mem.total as f64 / MB,
                utilization_pct: util.gpu as f64,
                temperature_c: device.temperature(TemperatureSensor::Gpu).ok().map(f64::from),
            });
        }
        Ok(gpus)
    }
}

/// NVML when built with the `nvidia` feature and a driver is present, `nvidia-smi` otherwise.
pub fn default_gpu_reader() -> Box<dyn GpuReader> {
    #[cfg(feature = "nvidia")]
    match NvmlReader::init() {
        Ok(r) => return Box::new(r),
        Err(e) => tracing::warn!(target: "host", error = %e, "NVML unavailable, falling back to nvidia-smi"),
    }
    Box::new(NvidiaSmi::new())
}

pub struct HostReader {
    system: Mutex<System>,
    /// Last CPU reading, reused while sysinfo's minimum update interval has not elapsed.
    last_cpu: Mutex<Option<(Instant, f64)>>,
    gpu: Box<dyn GpuReader>,
    disk_path: PathBuf,
    diskstats: PathBuf,
}

impl HostReader {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self { Self::with_gpu_reader(disk_path, default_gpu_reader()) }

    pub fn with_gpu_reader(disk_path: impl Into<PathBuf>, gpu: Box<dyn GpuReader>) -> Self {
        let mut system = System::new();
        // Prime the CPU counters so the first reading has a baseline.
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
            last_cpu: Mutex::new(None),
            gpu,
            disk_path: disk_path.into(),
            diskstats: PathBuf::from("/proc/diskstats"),
        }
    }

    pub fn with_diskstats(mut self, path: impl Into<PathBuf>) -> Self { self.diskstats = path.into(); self }

    fn system(&self) -> Result<std::sync::MutexGuard<'_, System>, ProbeError> {
        self.system.lock().map_err(|_| ProbeError::unavailable("system", "reader lock poisoned"))
    }
}

impl HostMetrics for HostReader {
    fn gpus(&self) -> Result<Vec<GpuState>, ProbeError> { self.gpu.read() }

    fn cpu_percent(&self) -> Result<f64, ProbeError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProbeError::unavailable("cpu", "unsupported platform"));
        }
        let mut sys = self.system()?;
        let mut last = self.last_cpu.lock().map_err(|_| ProbeError::unavailable("cpu", "reading lock poisoned"))?;
        if let Some((at, pct)) = *last {
            if at.elapsed() < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL {
                return Ok(pct);
            }
        }
        sys.refresh_cpu();
        let pct = sys.global_cpu_info().cpu_usage() as f64;
        *last = Some((Instant::now(), pct));
        Ok(pct)
    }

    fn memory(&self) -> Result<MemoryReading, ProbeError> {
        let mut sys = self.system()?;
        sys.refresh_memory();
        let total = sys.total_memory();
        if total == 0 {
            return Err(ProbeError::unavailable("memory", "total memory reported as zero"));
        }
        let available = sys.available_memory();
        Ok(MemoryReading {
            used_pct: (total.saturating_sub(available)) as f64 / total as f64 * 100.0,
            available_mb: available as f64 / MB,
        })
    }

    fn disk_percent(&self) -> Result<f64, ProbeError> {
        let disks = Disks::new_with_refreshed_list();
        let mounts = disks.list().iter().map(|d| (d.mount_point(), d.total_space(), d.available_space()));
        disk_usage_for(&self.disk_path, mounts)
            .ok_or_else(|| ProbeError::unavailable("disk", format!("no filesystem found for {}", self.disk_path.display())))
    }

    fn disk_io(&self) -> Result<DiskIoCounters, ProbeError> {
        let text = std::fs::read_to_string(&self.diskstats)
            .map_err(|source| ProbeError::Io { path: self.diskstats.display().to_string(), source })?;
        parse_diskstats(&text)
    }
}

impl HostProbe for HostReader {
    fn capture(&self) -> Result<HostSnapshot, ProbeError> { Ok(snapshot(self)) }
}

/// Used-space percentage of the filesystem with the longest mount point containing `path`.
pub fn disk_usage_for<'a>(path: &Path, mounts: impl Iterator<Item = (&'a Path, u64, u64)>) -> Option<f64> {
    mounts
        .filter(|(mount, total, _)| *total > 0 && path.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.as_os_str().len())
        .map(|(_, total, available)| total.saturating_sub(available) as f64 / total as f64 * 100.0)
}

/// Sums sector counters of whole devices in `/proc/diskstats` format.
///
/// Partitions are skipped when their parent device is listed, as are loop,
/// ram and device-mapper entries, so bytes are not counted twice.
pub fn parse_diskstats(text: &str) -> Result<DiskIoCounters, ProbeError> {
    let rows: Vec<(&str, u64, u64)> = text
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 10 { return None; }
            let read = cols[5].parse().ok()?;
            let written = cols[9].parse().ok()?;
            Some((cols[2], read, written))
        })
        .collect();
    if rows.is_empty() {
        return Err(ProbeError::unavailable("disk io", "no parsable rows in diskstats"));
    }
    let names: Vec<&str> = rows.iter().map(|r| r.0).collect();
    let mut total = DiskIoCounters::default();
    for (name, read, written) in &rows {
        if ["loop", "ram", "dm-", "zram"].iter().any(|p| name.starts_with(p)) { continue; }
        if names.iter().any(|parent| parent != name && is_partition_of(name, parent)) { continue; }
        total.read_bytes += read * SECTOR_BYTES;
        total.write_bytes += written * SECTOR_BYTES;
    }
    Ok(total)
}

fn is_partition_of(name: &str, parent: &str) -> bool {
    match name.strip_prefix(parent) {
        Some(rest) => {
            let rest = rest.strip_prefix('p').filter(|r| !r.is_empty()).unwrap_or(rest);
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Converts two counter samples into MB/s rates.
pub fn io_rates(prev: (DiskIoCounters, Instant), now: (DiskIoCounters, Instant)) -> (f64, f64) {
    let secs = now.1.saturating_duration_since(prev.1).as_secs_f64().max(1e-3);
    let read = now.0.read_bytes.saturating_sub(prev.0.read_bytes) as f64 / MB / secs;
    let write = now.0.write_bytes.saturating_sub(prev.0.write_bytes) as f64 / MB / secs;
    (read, write)
}
