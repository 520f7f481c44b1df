//! Observability: metrics exporter state, host/GPU snapshots, error recording
//! and the long-running telemetry and storage loops.

use tokio::sync::watch;

pub mod collector;
pub mod host;
pub mod recorder;
pub mod storage;
pub mod telemetry;

pub use host::{HostMetrics, HostProbe, HostReader, HostSnapshot};
pub use recorder::{Disposition, ErrorEvent, ErrorRecorder, SystemState};
pub use telemetry::Telemetry;

/// Resolves once `true` is published. A dropped sender never resolves.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
