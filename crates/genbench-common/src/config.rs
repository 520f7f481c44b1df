use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{BenchError, Result};

pub const DEFAULT_WORKSPACE: &str = "/workspace";

pub const DEFAULT_PROMPTS: [&str; 6] = [
    "A serene mountain landscape with flowing waterfalls and lush forests, cinematic style",
    "A futuristic cityscape at night with flying vehicles and neon lights, cyberpunk style",
    "A dramatic ocean storm with massive waves and lightning, realistic style",
    "A peaceful garden with butterflies and blooming flowers, dreamy style",
    "A desert oasis under a starry night sky with shooting stars, artistic style",
    "A leisurely tropical island white sand shore with realistic palms on the beach with their branches slowly swaying over blue turquoise waters, realistic style",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub workload: WorkloadConfig,
    pub prompts: Vec<String>,
    pub cooldown_secs: u64,
    /// Unset means a hung workload blocks the suite indefinitely.
    pub run_timeout_secs: Option<u64>,
    pub results_path: PathBuf,
    pub artifact: Option<ArtifactConfig>,
    pub classifier: ClassifierConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub program: String,
    /// `{prompt}` and `{index}` are substituted per run.
    pub args: Vec<String>,
    pub required_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
    #[serde(default = "default_artifact_pattern")]
    pub pattern: String,
    pub dest_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub success_markers: Vec<String>,
    pub noise_markers: Vec<String>,
    pub rate_unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub interval_secs: u64,
    pub disk_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub directory: PathBuf,
    pub size: String,
    pub block_size: String,
    pub ioengine: String,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub bind: String,
    pub suite_port: u16,
    pub collect_port: u16,
    pub storage_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub level: String,
    pub file: bool,
}

fn default_artifact_pattern() -> String { "*.mp4".into() }

impl BenchConfig {
    pub fn for_workspace(ws: &Path) -> Self {
        Self {
            workload: WorkloadConfig::for_workspace(ws),
            prompts: DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
            cooldown_secs: 30,
            run_timeout_secs: None,
            results_path: ws.join("test_results.json"),
            artifact: None,
            classifier: ClassifierConfig::default(),
            telemetry: TelemetryConfig { interval_secs: 1, disk_path: ws.to_path_buf() },
            storage: StorageConfig::for_workspace(ws),
            metrics: MetricsConfig::default(),
            log: LogConfig { dir: ws.join("logs"), level: "info".into(), file: true },
        }
    }

    /// `GENBENCH_CONFIG` names a YAML file; otherwise defaults plus `GENBENCH_*` overrides.
    pub fn load() -> Result<Self> {
        if let Ok(path) = env::var("GENBENCH_CONFIG") {
            return Self::from_file(Path::new(&path));
        }
        Ok(Self::from_env_vars(|key| env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BenchError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_yaml(&text).map_err(|e| BenchError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_yaml(text: &str) -> core::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn from_env_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ws = lookup("GENBENCH_WORKSPACE").unwrap_or_else(|| DEFAULT_WORKSPACE.into());
        let mut cfg = Self::for_workspace(Path::new(&ws));
        if let Some(v) = lookup("GENBENCH_RESULTS_PATH") { cfg.results_path = PathBuf::from(v); }
        if let Some(v) = lookup("GENBENCH_LOG_DIR") { cfg.log.dir = PathBuf::from(v); }
        if let Some(v) = lookup("GENBENCH_COOLDOWN_SECS").and_then(|v| v.parse().ok()) { cfg.cooldown_secs = v; }
        if let Some(v) = lookup("GENBENCH_RUN_TIMEOUT_SECS").and_then(|v| v.parse().ok()) { cfg.run_timeout_secs = Some(v); }
        if let Some(v) = lookup("GENBENCH_METRICS_PORT").and_then(|v| v.parse().ok()) { cfg.metrics.suite_port = v; }
        cfg
    }

    pub fn cooldown(&self) -> Duration { Duration::from_secs(self.cooldown_secs) }

    pub fn run_timeout(&self) -> Option<Duration> { self.run_timeout_secs.map(Duration::from_secs) }
}

impl Default for BenchConfig {
    fn default() -> Self { Self::for_workspace(Path::new(DEFAULT_WORKSPACE)) }
}

impl WorkloadConfig {
    pub fn for_workspace(ws: &Path) -> Self {
        let repo = ws.join("Wan2.1");
        let script = repo.join("generate.py");
        let ckpt = repo.join("Wan2.1-T2V-14B");
        Self {
            program: "python".into(),
            args: vec![
                script.display().to_string(),
                "--task".into(),
                "t2v-14B".into(),
                "--size".into(),
                "832*480".into(),
                "--ckpt_dir".into(),
                ckpt.display().to_string(),
                "--prompt".into(),
                "{prompt}".into(),
            ],
            required_paths: vec![script, ckpt],
        }
    }

    pub fn argv(&self, index: usize, prompt: &str) -> Vec<String> {
        let index = index.to_string();
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|a| a.replace("{index}", &index).replace("{prompt}", prompt)))
            .collect()
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self { Self::for_workspace(Path::new(DEFAULT_WORKSPACE)) }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            success_markers: vec!["Completed".into(), "100%".into()],
            noise_markers: vec!["%|".into(), "CUDA".into(), "device".into()],
            rate_unit: "it/s".into(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self { Self { interval_secs: 1, disk_path: PathBuf::from(DEFAULT_WORKSPACE) } }
}

impl StorageConfig {
    pub fn for_workspace(ws: &Path) -> Self {
        Self {
            directory: ws.to_path_buf(),
            size: "1G".into(),
            block_size: "4M".into(),
            ioengine: "libaio".into(),
            interval_secs: 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self { Self::for_workspace(Path::new(DEFAULT_WORKSPACE)) }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), suite_port: 8082, collect_port: 8083, storage_port: 8084 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { dir: Path::new(DEFAULT_WORKSPACE).join("logs"), level: "info".into(), file: true }
    }
}
