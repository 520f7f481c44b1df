//! Shared error taxonomy and configuration for the benchmark harness.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod config;

pub type Result<T> = core::result::Result<T, BenchError>;

#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

/// Error categories as reported on the `system_errors_total{type}` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ProcessError,
    RuntimeError,
    FileError,
    GpuMetricError,
    CpuMetricError,
    MemoryMetricError,
    DiskMetricError,
    MetricCollectionError,
    StorageError,
    FatalError,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 10] = [
        Self::ProcessError,
        Self::RuntimeError,
        Self::FileError,
        Self::GpuMetricError,
        Self::CpuMetricError,
        Self::MemoryMetricError,
        Self::DiskMetricError,
        Self::MetricCollectionError,
        Self::StorageError,
        Self::FatalError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessError => "process_error",
            Self::RuntimeError => "runtime_error",
            Self::FileError => "file_error",
            Self::GpuMetricError => "gpu_metric_error",
            Self::CpuMetricError => "cpu_metric_error",
            Self::MemoryMetricError => "memory_metric_error",
            Self::DiskMetricError => "disk_metric_error",
            Self::MetricCollectionError => "metric_collection_error",
            Self::StorageError => "storage_error",
            Self::FatalError => "fatal_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
