#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use genbench_common::config::WorkloadConfig;
use genbench_obs::host::ProbeError;
use genbench_obs::{ErrorRecorder, HostProbe, HostSnapshot, Telemetry};

pub struct NoProbe;

impl HostProbe for NoProbe {
    fn capture(&self) -> Result<HostSnapshot, ProbeError> { Ok(HostSnapshot::default()) }
}

/// Counts how many host snapshots were taken.
#[derive(Default)]
pub struct CountingProbe(pub AtomicUsize);

impl HostProbe for CountingProbe {
    fn capture(&self) -> Result<HostSnapshot, ProbeError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(HostSnapshot::default())
    }
}

pub fn counting_recorder() -> (Telemetry, ErrorRecorder, Arc<CountingProbe>) {
    let tel = Telemetry::new().unwrap();
    let probe = Arc::new(CountingProbe::default());
    let rec = ErrorRecorder::new(tel.clone(), probe.clone());
    (tel, rec, probe)
}

pub fn recorder() -> (Telemetry, ErrorRecorder) {
    let tel = Telemetry::new().unwrap();
    let rec = ErrorRecorder::new(tel.clone(), Arc::new(NoProbe));
    (tel, rec)
}

pub fn sh(script: &str) -> Vec<String> { vec!["sh".into(), "-c".into(), script.into()] }

/// Workload running `script` with `$1` = prompt and `$2` = index.
pub fn sh_workload(script: &str) -> WorkloadConfig {
    WorkloadConfig {
        program: "sh".into(),
        args: vec!["-c".into(), script.into(), "sh".into(), "{prompt}".into(), "{index}".into()],
        required_paths: Vec::new(),
    }
}
