use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use genbench_common::ErrorCategory;
use serde::Serialize;

use crate::host::{HostProbe, HostSnapshot};
use crate::telemetry::Telemetry;

/// Host state attached to an error; a textual placeholder when capture failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SystemState {
    Snapshot(HostSnapshot),
    Unavailable(String),
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot(s) => match serde_json::to_string(s) {
                Ok(json) => f.write_str(&json),
                Err(_) => write!(f, "{s:?}"),
            },
            Self::Unavailable(reason) => f.write_str(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Terminate(i32),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub timestamp: DateTime<Local>,
    pub category: ErrorCategory,
    pub message: String,
    pub fatal: bool,
    pub system_state: SystemState,
}

impl ErrorEvent {
    /// What the top-level driver should do. Only fatal events terminate.
    pub fn disposition(&self) -> Disposition {
        if self.fatal { Disposition::Terminate(1) } else { Disposition::Continue }
    }
}

/// Counts, snapshots and logs errors. Never exits the process itself.
#[derive(Clone)]
pub struct ErrorRecorder {
    telemetry: Telemetry,
    probe: Arc<dyn HostProbe>,
}

impl ErrorRecorder {
    pub fn new(telemetry: Telemetry, probe: Arc<dyn HostProbe>) -> Self { Self { telemetry, probe } }

    pub fn telemetry(&self) -> &Telemetry { &self.telemetry }

    pub fn record(&self, category: ErrorCategory, message: impl Into<String>, fatal: bool) -> ErrorEvent {
        let system_state = system_state(self.probe.as_ref());
        self.record_with_state(category, message, fatal, system_state)
    }

    /// Records several non-fatal errors that share one host snapshot. The
    /// capture runs on the blocking pool since it may shell out to the GPU tool.
    pub async fn record_all(&self, category: ErrorCategory, messages: Vec<String>) -> Vec<ErrorEvent> {
        if messages.is_empty() {
            return Vec::new();
        }
        let probe = Arc::clone(&self.probe);
        let system_state = tokio::task::spawn_blocking(move || system_state(probe.as_ref()))
            .await
            .unwrap_or_else(|e| SystemState::Unavailable(format!("Error collecting system state: {e}")));
        messages
            .into_iter()
            .map(|message| self.record_with_state(category, message, false, system_state.clone()))
            .collect()
    }

    fn record_with_state(
        &self,
        category: ErrorCategory,
        message: impl Into<String>,
        fatal: bool,
        system_state: SystemState,
    ) -> ErrorEvent {
        self.telemetry.record_error(category);
        let event = ErrorEvent { timestamp: Local::now(), category, message: message.into(), fatal, system_state };

        tracing::error!(category = %event.category, "Error occurred: {}", event.message);
        tracing::error!(category = %event.category, system_state = %event.system_state, "System state at error");
        if fatal {
            tracing::error!(critical = true, category = %event.category, "Fatal error occurred - terminating process");
        }
        event
    }
}

fn system_state(probe: &dyn HostProbe) -> SystemState {
    match probe.capture() {
        Ok(snapshot) => SystemState::Snapshot(snapshot),
        Err(e) => SystemState::Unavailable(format!("Error collecting system state: {e}")),
    }
}
