use std::path::Path;

use genbench_common::config::BenchConfig;

/// Checks the environment the suite needs before any workload is launched.
/// Returns one message per missing path.
pub fn check(cfg: &BenchConfig) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();
    for path in &cfg.workload.required_paths {
        if !path.exists() {
            problems.push(format!("Required path not found at: {}", path.display()));
        }
    }
    let results_dir = cfg.results_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    if !results_dir.is_dir() {
        problems.push(format!("Results directory not found at: {}", results_dir.display()));
    }
    if let Some(artifact) = &cfg.artifact {
        if !artifact.dir.is_dir() {
            problems.push(format!("Artifact directory not found at: {}", artifact.dir.display()));
        }
    }

    if problems.is_empty() {
        tracing::info!(target: "preflight", program = %cfg.workload.program, "Environment verification successful");
        Ok(())
    } else {
        for p in &problems {
            tracing::error!(target: "preflight", "{p}");
        }
        tracing::error!(target: "preflight", "Please ensure all required files are in place before running tests");
        Err(problems)
    }
}
