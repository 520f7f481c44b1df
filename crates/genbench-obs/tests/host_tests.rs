use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use genbench_obs::host::{
    disk_usage_for, io_rates, parse_diskstats, parse_nvidia_smi, snapshot, DiskIoCounters, GpuReader, GpuState,
    HostMetrics, HostReader, MemoryReading, NvidiaSmi, ProbeError,
};
use genbench_obs::HostProbe;

struct FailingGpu;
impl GpuReader for FailingGpu {
    fn read(&self) -> Result<Vec<GpuState>, ProbeError> { Err(ProbeError::Gpu("no driver".into())) }
}

struct PartialHost;
impl HostMetrics for PartialHost {
    fn gpus(&self) -> Result<Vec<GpuState>, ProbeError> { Err(ProbeError::Gpu("no driver".into())) }
    fn cpu_percent(&self) -> Result<f64, ProbeError> { Ok(12.5) }
    fn memory(&self) -> Result<MemoryReading, ProbeError> { Ok(MemoryReading { used_pct: 40.0, available_mb: 2048.0 }) }
    fn disk_percent(&self) -> Result<f64, ProbeError> { Err(ProbeError::Gpu("unused".into())) }
    fn disk_io(&self) -> Result<DiskIoCounters, ProbeError> { Ok(DiskIoCounters::default()) }
}

#[test]
fn parses_nvidia_smi_rows() {
    let gpus = parse_nvidia_smi("0, 1024, 81920, 37, 55\n1, 0, 81920, 0, [N/A]\n").unwrap();
    assert_eq!(gpus.len(), 2);
    assert_eq!(gpus[0].id, 0);
    assert_eq!(gpus[0].memory_free_mb(), 80896.0);
    assert_eq!(gpus[0].temperature_c, Some(55.0));
    assert_eq!(gpus[1].temperature_c, None);
    assert!(parse_nvidia_smi("").unwrap().is_empty());
    assert!(parse_nvidia_smi("0, lots, 1, 2, 3").is_err());
}

#[test]
fn snapshot_omits_failed_sub_metrics() {
    let snap = snapshot(&PartialHost);
    assert!(snap.gpu.is_none());
    assert_eq!(snap.cpu_pct, Some(12.5));
    assert_eq!(snap.memory_pct, Some(40.0));
    assert!(snap.disk_pct.is_none());
    let json = serde_json::to_value(&snap).unwrap();
    assert!(json.get("gpu").is_none());
    assert_eq!(json["cpu_pct"], 12.5);
}

#[test]
fn missing_gpu_tool_still_yields_snapshot() {
    let reader = HostReader::with_gpu_reader("/", Box::new(NvidiaSmi::with_program("definitely-not-nvidia-smi")));
    assert!(reader.gpus().is_err());
    let snap = reader.capture().unwrap();
    assert!(snap.gpu.is_none());
}

#[test]
fn reader_with_failing_gpu_and_missing_diskstats() {
    let reader = HostReader::with_gpu_reader("/", Box::new(FailingGpu)).with_diskstats("/nonexistent/diskstats");
    assert!(matches!(reader.disk_io(), Err(ProbeError::Io { .. })));
    assert!(reader.capture().is_ok());
}

#[test]
fn diskstats_skips_partitions_and_virtual_devices() {
    let text = "\
   8       0 sda 100 0 2000 0 50 0 4000 0 0 0 0
   8       1 sda1 90 0 1800 0 40 0 3000 0 0 0 0
 259       0 nvme0n1 10 0 100 0 5 0 200 0 0 0 0
 259       1 nvme0n1p1 10 0 100 0 5 0 200 0 0 0 0
   7       0 loop0 999 0 999 0 999 0 999 0 0 0 0
 253       0 dm-0 999 0 999 0 999 0 999 0 0 0 0
";
    let c = parse_diskstats(text).unwrap();
    assert_eq!(c.read_bytes, (2000 + 100) * 512);
    assert_eq!(c.write_bytes, (4000 + 200) * 512);
    assert!(parse_diskstats("garbage").is_err());
}

#[test]
fn diskstats_file_is_read_from_configured_path() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "   8       0 sdb 1 0 8 0 1 0 16 0 0 0 0").unwrap();
    let reader = HostReader::with_gpu_reader("/", Box::new(FailingGpu)).with_diskstats(f.path());
    assert_eq!(reader.disk_io().unwrap(), DiskIoCounters { read_bytes: 4096, write_bytes: 8192 });
}

#[test]
fn disk_usage_picks_longest_mount() {
    let mounts = vec![(Path::new("/"), 1000u64, 900u64), (Path::new("/workspace"), 200, 50)];
    let pct = disk_usage_for(Path::new("/workspace/data"), mounts.clone().into_iter()).unwrap();
    assert_eq!(pct, 75.0);
    let pct = disk_usage_for(Path::new("/tmp"), mounts.into_iter()).unwrap();
    assert!((pct - 10.0).abs() < 1e-9);
    assert!(disk_usage_for(Path::new("relative"), std::iter::empty()).is_none());
}

#[test]
fn io_rates_are_mb_per_second() {
    let t0 = Instant::now();
    let t1 = t0 + Duration::from_secs(2);
    let a = DiskIoCounters { read_bytes: 0, write_bytes: 0 };
    let b = DiskIoCounters { read_bytes: 4 * 1024 * 1024, write_bytes: 2 * 1024 * 1024 };
    assert_eq!(io_rates((a, t0), (b, t1)), (2.0, 1.0));
}

#[test]
fn back_to_back_cpu_reads_reuse_the_last_sample() {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return;
    }
    let reader = HostReader::with_gpu_reader("/", Box::new(FailingGpu));
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    let first = reader.cpu_percent().unwrap();
    let second = reader.cpu_percent().unwrap();
    assert_eq!(first, second);
    let snap = reader.capture().unwrap();
    assert_eq!(snap.cpu_pct, Some(first));
}
