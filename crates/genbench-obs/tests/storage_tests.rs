use std::path::PathBuf;
use std::sync::Arc;

use genbench_common::config::StorageConfig;
use genbench_common::ErrorCategory;
use genbench_obs::host::ProbeError;
use genbench_obs::storage::{fio_args, parse_fio_bandwidth, IoDirection, StorageError, StorageProber};
use genbench_obs::{ErrorRecorder, HostProbe, HostSnapshot, Telemetry};

struct NoProbe;
impl HostProbe for NoProbe {
    fn capture(&self) -> Result<HostSnapshot, ProbeError> { Ok(HostSnapshot::default()) }
}

#[test]
fn builds_fio_command_line() {
    let cfg = StorageConfig { directory: PathBuf::from("/scratch"), ..StorageConfig::default() };
    let args = fio_args(&cfg, IoDirection::Write);
    assert_eq!(args[0], "--name=write_test");
    assert!(args.contains(&"--rw=write".to_string()));
    assert!(args.contains(&"--directory=/scratch".to_string()));
    assert!(args.contains(&"--bs=4M".to_string()));
    assert!(args.contains(&"--output-format=json".to_string()));
}

#[test]
fn parses_bandwidth_in_mb_per_second() {
    let json = r#"{"jobs":[{"jobname":"read_test","read":{"bw":2097152},"write":{"bw":0}}]}"#;
    assert_eq!(parse_fio_bandwidth(json, IoDirection::Read).unwrap(), 2048.0);
    assert_eq!(parse_fio_bandwidth(json, IoDirection::Write).unwrap(), 0.0);
    assert!(matches!(parse_fio_bandwidth("{\"jobs\":[]}", IoDirection::Read), Err(StorageError::Parse(_))));
    assert!(matches!(parse_fio_bandwidth("not json", IoDirection::Read), Err(StorageError::Parse(_))));
}

#[tokio::test]
async fn missing_fio_is_recorded_and_not_fatal() {
    let tel = Telemetry::new().unwrap();
    let rec = ErrorRecorder::new(tel.clone(), Arc::new(NoProbe));
    let prober = StorageProber::new(StorageConfig::default(), rec).with_program("definitely-not-fio");
    let results = prober.run_once().await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| matches!(r, Err(StorageError::Spawn { .. }))));
    assert_eq!(tel.error_count(ErrorCategory::StorageError), 2);
}
