use genbench_common::config::ClassifierConfig;
use genbench_core::OutputClassifier;

#[test]
fn empty_line_is_heartbeat() {
    let c = OutputClassifier::default();
    assert!(c.classify("").is_heartbeat());
    assert!(c.classify("   \r\n").is_heartbeat());
}

#[test]
fn extracts_progress_rate() {
    let c = OutputClassifier::default();
    let out = c.classify(" 40%|████      | 20/50 [00:41<01:10,  2.37it/s]");
    assert_eq!(out.progress_rate, Some(2.37));
    assert!(out.is_noise);
    assert_eq!(out.error_text, None);
    assert_eq!(c.parse_rate("speed 12 it/s"), Some(12.0));
}

#[test]
fn malformed_rate_is_ignored() {
    let c = OutputClassifier::default();
    let out = c.classify("throughput: ??it/s");
    assert_eq!(out.progress_rate, None);
    assert_eq!(c.parse_rate("it/s at start"), None);
    assert_eq!(c.parse_rate("1.2.3it/s"), None);
}

#[test]
fn success_marker_wins_over_error_text() {
    let c = OutputClassifier::default();
    let out = c.classify("Completed on device cuda:0 with warnings: error budget ok");
    assert!(out.is_success_marker);
    assert!(!out.is_noise);
    assert_eq!(out.error_text, None);
    assert!(c.classify("100%|██████████| 50/50").is_success_marker);
}

#[test]
fn noise_never_reports_error_text() {
    let c = OutputClassifier::default();
    for line in ["CUDA error: exit code 1", "using device 0, fatal banner", "  3%|▎ | 1/30 Traceback"] {
        let out = c.classify(line);
        assert!(out.is_noise, "{line}");
        assert_eq!(out.error_text, None, "{line}");
    }
}

#[test]
fn other_lines_carry_error_text_verbatim() {
    let c = OutputClassifier::default();
    let out = c.classify("RuntimeError: out of memory\n");
    assert!(!out.is_noise && !out.is_success_marker);
    assert_eq!(out.error_text.as_deref(), Some("RuntimeError: out of memory"));
}

#[test]
fn marker_tables_are_configurable() {
    let c = OutputClassifier::new(&ClassifierConfig {
        success_markers: vec!["DONE".into()],
        noise_markers: vec!["[warn]".into()],
        rate_unit: "frames/s".into(),
    });
    assert!(c.classify("DONE").is_success_marker);
    assert!(!c.classify("Completed").is_success_marker);
    assert!(c.classify("[warn] slow").is_noise);
    assert_eq!(c.classify("render 3.5frames/s").progress_rate, Some(3.5));
}

#[test]
fn error_text_keeps_indentation() {
    let c = OutputClassifier::default();
    let out = c.classify("  File \"generate.py\", line 12, in <module>\r\n");
    assert_eq!(out.error_text.as_deref(), Some("  File \"generate.py\", line 12, in <module>"));
}
