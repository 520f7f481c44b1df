use chrono::NaiveDate;
use genbench_core::{ResultsLedger, RunOutcome};

fn outcome(index: usize, success: bool) -> RunOutcome {
    RunOutcome {
        index,
        prompt: format!("prompt {index}"),
        duration_seconds: 10.0 * index as f64,
        success,
        started_at: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(12, 0, index as u32).unwrap(),
        exit_code: Some(if success { 0 } else { 1 }),
        artifact_path: None,
    }
}

#[test]
fn each_append_rewrites_full_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test_results.json");
    let mut ledger = ResultsLedger::new(&path);
    for k in 1..=3 {
        ledger.append(outcome(k, k % 2 == 1)).unwrap();
        let on_disk = ResultsLedger::load(&path).unwrap();
        assert_eq!(on_disk.len(), k);
        assert_eq!(on_disk, ledger.outcomes());
    }
}

#[test]
fn crash_between_runs_keeps_prior_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    {
        let mut ledger = ResultsLedger::new(&path);
        ledger.append(outcome(1, true)).unwrap();
        ledger.append(outcome(2, false)).unwrap();
    }
    // a half-written temp file left behind by a crash must not matter
    std::fs::write(dir.path().join(".tmpHALF"), b"[{\"test_number\": 3, \"pro").unwrap();
    let reloaded = ResultsLedger::load(&path).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded[1].index, 2);
}

#[test]
fn uses_historical_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    let mut ledger = ResultsLedger::new(&path);
    ledger.append(outcome(1, true)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let rec = &json[0];
    assert_eq!(rec["test_number"], 1);
    assert_eq!(rec["prompt"], "prompt 1");
    assert_eq!(rec["duration"], 10.0);
    assert_eq!(rec["success"], true);
    assert_eq!(rec["timestamp"], "2025-03-01 12:00:01");
    assert!(rec.get("artifact_path").is_none());
}

#[test]
fn failed_write_keeps_record_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = ResultsLedger::new(dir.path().join("missing").join("results.json"));
    assert!(ledger.append(outcome(1, true)).is_err());
    assert_eq!(ledger.len(), 1);
}
