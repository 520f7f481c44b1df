use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use genbench_api::ExporterState;
use genbench_common::config::{BenchConfig, LogConfig};
use genbench_common::ErrorCategory;
use genbench_core::{preflight, OutputClassifier, ResultsLedger, Sequencer, Supervisor};
use genbench_obs::collector::Collector;
use genbench_obs::storage::StorageProber;
use genbench_obs::{Disposition, ErrorRecorder, HostProbe, HostReader, Telemetry};
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "genbench", version, about = "GPU video-generation benchmark harness")]
struct Cli {
    /// YAML configuration file; overrides GENBENCH_CONFIG and GENBENCH_* variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every prompt once, in order, and persist the results ledger
    Suite(SuiteArgs),
    /// Export host and GPU telemetry until interrupted
    Collect,
    /// Probe storage throughput with fio until interrupted
    Storage,
    /// Print one host snapshot as JSON
    Snapshot,
    /// Verify the workload environment without running anything
    Check,
    Version,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Suite(_) => "suite",
            Self::Collect => "collect",
            Self::Storage => "storage",
            Self::Snapshot => "snapshot",
            Self::Check => "check",
            Self::Version => "version",
        }
    }
}

#[derive(Args, Debug)]
struct SuiteArgs {
    /// Seconds to wait between runs
    #[arg(long)]
    cooldown: Option<u64>,
    /// Where to write the results ledger
    #[arg(long)]
    results: Option<PathBuf>,
    /// Kill a run that takes longer than this many seconds
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long)]
    skip_preflight: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Commands::Version = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let loaded = match &cli.config {
        Some(path) => BenchConfig::from_file(path),
        None => BenchConfig::load(),
    };
    // Without a usable config there is no log directory to honour.
    let guard = init_tracing(loaded.as_ref().ok().map(|c| &c.log), cli.command.name());

    let code = match run(cli, loaded).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(critical = true, "Fatal error occurred - terminating process: {e:#}");
            1
        }
    };
    drop(guard);
    std::process::exit(code);
}

async fn run(cli: Cli, loaded: genbench_common::Result<BenchConfig>) -> anyhow::Result<i32> {
    let telemetry = Telemetry::new().context("failed to create metrics registry")?;
    let disk_path = loaded.as_ref().map(|c| c.telemetry.disk_path.clone()).unwrap_or_else(|_| PathBuf::from("/"));
    let host = Arc::new(HostReader::new(disk_path));
    let recorder = ErrorRecorder::new(telemetry.clone(), host.clone());

    let cfg = match loaded {
        Ok(cfg) => cfg,
        Err(e) => return Ok(fatal(&recorder, format!("Failed to load configuration: {e}"))),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("shutdown signal received");
            let _ = signal_tx.send(true);
        }
    });

    let result = match cli.command {
        Commands::Suite(args) => suite(cfg, args, recorder.clone(), &shutdown_tx, shutdown_rx).await,
        Commands::Collect => collect(cfg, host, recorder.clone(), &shutdown_tx, shutdown_rx).await,
        Commands::Storage => storage(cfg, recorder.clone(), &shutdown_tx, shutdown_rx).await,
        Commands::Snapshot => snapshot(host.as_ref()),
        Commands::Check => Ok(check(&cfg, &recorder)),
        Commands::Version => Ok(0),
    };
    Ok(result.unwrap_or_else(|e| fatal(&recorder, format!("{e:#}"))))
}

async fn suite(
    mut cfg: BenchConfig,
    args: SuiteArgs,
    recorder: ErrorRecorder,
    shutdown_tx: &watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<i32> {
    if let Some(secs) = args.cooldown { cfg.cooldown_secs = secs; }
    if let Some(path) = args.results { cfg.results_path = path; }
    if let Some(secs) = args.timeout { cfg.run_timeout_secs = Some(secs); }

    if !args.skip_preflight && preflight::check(&cfg).is_err() {
        return Ok(fatal(&recorder, "Environment verification failed"));
    }

    let state = ExporterState::new(recorder.telemetry().clone()).with_results(&cfg.results_path);
    let server = match start_exporter(&cfg.metrics.bind, cfg.metrics.suite_port, state, &recorder, shutdown_rx.clone()).await {
        Ok(server) => server,
        Err(code) => return Ok(code),
    };

    let supervisor = Supervisor::new(OutputClassifier::new(&cfg.classifier), recorder.clone())
        .with_artifacts(cfg.artifact.clone())
        .with_timeout(cfg.run_timeout());
    let ledger = ResultsLedger::new(&cfg.results_path);
    let mut sequencer = Sequencer::new(supervisor, cfg.workload.clone(), ledger, recorder, shutdown_rx)
        .with_cooldown(cfg.cooldown());
    let report = sequencer.run_suite(&cfg.prompts).await;
    tracing::info!(results = %cfg.results_path.display(), summary = %report.summary, "Results written");

    let _ = shutdown_tx.send(true);
    let _ = server.await;
    Ok(if report.interrupted { EXIT_INTERRUPTED } else { 0 })
}

async fn collect(
    cfg: BenchConfig,
    host: Arc<HostReader>,
    recorder: ErrorRecorder,
    shutdown_tx: &watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<i32> {
    let state = ExporterState::new(recorder.telemetry().clone());
    let server = match start_exporter(&cfg.metrics.bind, cfg.metrics.collect_port, state, &recorder, shutdown_rx.clone()).await {
        Ok(server) => server,
        Err(code) => return Ok(code),
    };
    let interval = Duration::from_secs(cfg.telemetry.interval_secs.max(1));
    Collector::new(host, recorder, interval).run(shutdown_rx).await;
    let _ = shutdown_tx.send(true);
    let _ = server.await;
    Ok(0)
}

async fn storage(
    cfg: BenchConfig,
    recorder: ErrorRecorder,
    shutdown_tx: &watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<i32> {
    let state = ExporterState::new(recorder.telemetry().clone());
    let server = match start_exporter(&cfg.metrics.bind, cfg.metrics.storage_port, state, &recorder, shutdown_rx.clone()).await {
        Ok(server) => server,
        Err(code) => return Ok(code),
    };
    tracing::info!(directory = %cfg.storage.directory.display(), "Starting storage performance monitoring");
    StorageProber::new(cfg.storage.clone(), recorder).run(shutdown_rx).await;
    let _ = shutdown_tx.send(true);
    let _ = server.await;
    Ok(0)
}

fn snapshot(host: &dyn HostProbe) -> anyhow::Result<i32> {
    let snap = host.capture().context("failed to capture host state")?;
    println!("{}", serde_json::to_string(&snap)?);
    Ok(0)
}

fn check(cfg: &BenchConfig, recorder: &ErrorRecorder) -> i32 {
    match preflight::check(cfg) {
        Ok(()) => 0,
        Err(_) => fatal(recorder, "Environment verification failed"),
    }
}

/// Binds the scrape endpoint. A port that cannot be bound is fatal.
async fn start_exporter(
    host: &str,
    port: u16,
    state: ExporterState,
    recorder: &ErrorRecorder,
    shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>, i32> {
    match genbench_api::bind(host, port).await {
        Ok(listener) => Ok(tokio::spawn(async move {
            if let Err(e) = genbench_api::serve(listener, state, shutdown).await {
                tracing::error!(error = %e, "metrics server stopped");
            }
        })),
        Err(e) => Err(fatal(recorder, format!("Failed to start metrics server on {host}:{port}: {e}"))),
    }
}

fn fatal(recorder: &ErrorRecorder, message: impl Into<String>) -> i32 {
    match recorder.record(ErrorCategory::FatalError, message, true).disposition() {
        Disposition::Terminate(code) => code,
        Disposition::Continue => 0,
    }
}

fn init_tracing(log: Option<&LogConfig>, command: &str) -> Option<WorkerGuard> {
    let level = log.map(|l| l.level.as_str()).unwrap_or("info");
    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let mut file_error = None;
    let mut guard = None;
    let file_layer = log.filter(|l| l.file).and_then(|l| {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let appender = std::fs::create_dir_all(&l.dir)
            .map_err(|e| e.to_string())
            .and_then(|()| {
                RollingFileAppender::builder()
                    .rotation(Rotation::NEVER)
                    .filename_prefix(format!("genbench-{command}-{stamp}"))
                    .filename_suffix("log")
                    .build(&l.dir)
                    .map_err(|e| e.to_string())
            });
        match appender {
            Ok(appender) => {
                let (writer, g) = tracing_appender::non_blocking(appender);
                guard = Some(g);
                Some(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
            }
            Err(e) => {
                file_error = Some(format!("log file in {} unavailable: {e}", l.dir.display()));
                None
            }
        }
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(std::io::stdout().is_terminal());

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("{e}");
    }
    guard
}
