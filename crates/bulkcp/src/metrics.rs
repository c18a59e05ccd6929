//! Best-effort performance reporting.
//!
//! The summary is emitted after the run and is never on the correctness
//! path; a sink that drops it on the floor is a valid sink.

use serde::Serialize;
use tracing::info;

/// End-of-run performance summary.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Provider schemes involved (sources and destination).
    pub provider_schemes: Vec<String>,

    /// A local-filesystem destination was involved.
    pub has_file_dst: bool,

    /// A cloud destination was involved.
    pub has_cloud_dst: bool,

    /// Parallel execution was enabled.
    pub parallel: bool,

    /// Remote-to-remote copies were routed through the local process.
    pub daisy_chain: bool,

    /// The run was a move rather than a copy.
    pub is_move: bool,

    /// Objects copied.
    pub objects_copied: u64,

    /// Bytes transferred.
    pub bytes_transferred: u64,

    /// Wall-clock elapsed seconds.
    pub elapsed_seconds: f64,

    /// Throughput in bytes per second; zero when elapsed is zero.
    pub bytes_per_second: f64,
}

/// Metrics collaborator.
pub trait MetricsSink: Send + Sync {
    fn record_summary(&self, summary: &PerformanceSummary);
}

/// Sink that reports through the log stream.
#[derive(Debug, Default)]
pub struct LogMetricsSink;

impl LogMetricsSink {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsSink for LogMetricsSink {
    fn record_summary(&self, summary: &PerformanceSummary) {
        info!(
            "Run {}: {} objects, {} bytes in {:.1}s ({:.0} B/s) [providers: {}, parallel: {}, daisy-chain: {}]",
            summary.run_id,
            summary.objects_copied,
            summary.bytes_transferred,
            summary.elapsed_seconds,
            summary.bytes_per_second,
            summary.provider_schemes.join(","),
            summary.parallel,
            summary.daisy_chain
        );
    }
}
