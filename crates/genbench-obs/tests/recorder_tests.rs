use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use genbench_common::ErrorCategory;
use genbench_obs::host::ProbeError;
use genbench_obs::{Disposition, ErrorRecorder, HostProbe, HostSnapshot, SystemState, Telemetry};

struct FixedProbe;
impl HostProbe for FixedProbe {
    fn capture(&self) -> Result<HostSnapshot, ProbeError> {
        Ok(HostSnapshot { cpu_pct: Some(3.0), ..Default::default() })
    }
}

struct BrokenProbe;
impl HostProbe for BrokenProbe {
    fn capture(&self) -> Result<HostSnapshot, ProbeError> { Err(ProbeError::Gpu("driver gone".into())) }
}

#[test]
fn record_counts_and_snapshots() {
    let tel = Telemetry::new().unwrap();
    let rec = ErrorRecorder::new(tel.clone(), Arc::new(FixedProbe));
    let ev = rec.record(ErrorCategory::ProcessError, "CUDA out of memory", false);
    assert_eq!(ev.category, ErrorCategory::ProcessError);
    assert_eq!(ev.message, "CUDA out of memory");
    assert_eq!(ev.disposition(), Disposition::Continue);
    assert!(matches!(ev.system_state, SystemState::Snapshot(ref s) if s.cpu_pct == Some(3.0)));
    assert_eq!(tel.error_count(ErrorCategory::ProcessError), 1);
    assert_eq!(tel.error_count(ErrorCategory::FileError), 0);
}

#[test]
fn failed_capture_degrades_to_placeholder() {
    let rec = ErrorRecorder::new(Telemetry::new().unwrap(), Arc::new(BrokenProbe));
    let ev = rec.record(ErrorCategory::RuntimeError, "spawn failed", false);
    match &ev.system_state {
        SystemState::Unavailable(text) => assert!(text.starts_with("Error collecting system state")),
        other => panic!("unexpected state {other:?}"),
    }
    let json = serde_json::to_value(&ev).unwrap();
    assert_eq!(json["category"], "runtime_error");
    assert!(json["system_state"].is_string());
}

#[test]
fn fatal_event_requests_termination() {
    let rec = ErrorRecorder::new(Telemetry::new().unwrap(), Arc::new(FixedProbe));
    let ev = rec.record(ErrorCategory::FatalError, "metrics server failed", true);
    assert!(ev.fatal);
    assert_eq!(ev.disposition(), Disposition::Terminate(1));
}

struct CountingProbe(AtomicUsize);
impl HostProbe for CountingProbe {
    fn capture(&self) -> Result<HostSnapshot, ProbeError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(HostSnapshot { memory_pct: Some(50.0), ..Default::default() })
    }
}

#[tokio::test]
async fn record_all_takes_a_single_snapshot() {
    let tel = Telemetry::new().unwrap();
    let probe = Arc::new(CountingProbe(AtomicUsize::new(0)));
    let rec = ErrorRecorder::new(tel.clone(), probe.clone());
    let lines = vec!["Traceback (most recent call last):".to_string(), "ValueError: bad".to_string()];
    let events = rec.record_all(ErrorCategory::ProcessError, lines).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].message, "ValueError: bad");
    assert!(events.iter().all(|e| !e.fatal && e.system_state == events[0].system_state));
    assert_eq!(tel.error_count(ErrorCategory::ProcessError), 2);
    assert_eq!(probe.0.load(Ordering::SeqCst), 1);

    assert!(rec.record_all(ErrorCategory::ProcessError, Vec::new()).await.is_empty());
    assert_eq!(probe.0.load(Ordering::SeqCst), 1);
}
