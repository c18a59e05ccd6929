//! # bulkcp
//!
//! Bulk copy/move orchestration library for files and storage objects.
//!
//! This library provides the core engine for copying batches of items
//! between local and cloud-style locations with support for:
//!
//! - **Recursive container copies** with deterministic destination naming
//! - **Parallel transfers** with a bounded worker pool
//! - **Resume capability** via a durable append-only manifest
//! - **Move semantics** (copy then delete) with strict deletion accounting
//! - **Continue-on-error mode** that fails the run only at the end
//!
//! ## Example
//!
//! ```rust,no_run
//! use bulkcp::{CopySession, CopySessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> bulkcp::Result<()> {
//!     let config = CopySessionConfig {
//!         recursive: true,
//!         workers: 4,
//!         ..Default::default()
//!     };
//!     let args = vec!["data/".to_string(), "backup/".to_string()];
//!     let result = CopySession::new(config).run(&args).await?;
//!     println!("Copied {} bytes", result.bytes_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod expand;
pub mod locator;
pub mod manifest;
pub mod metrics;
pub mod naming;
pub mod orchestrator;
pub mod resolve;
pub mod stats;
pub mod storage;
pub mod transfer;

// Re-exports for convenient access
pub use config::{CopySessionConfig, GzipMode, GzipPolicy, GzipScope};
pub use error::{CopyError, Result};
pub use executor::{CopyExecutor, CopyOutcome, SkipReason};
pub use expand::{CopyTask, ExpandedItem, LocalExpander, NameExpander, TaskIterator};
pub use locator::Locator;
pub use manifest::{Manifest, ManifestRecord, RecordStatus};
pub use metrics::{LogMetricsSink, MetricsSink, PerformanceSummary};
pub use orchestrator::{CatWriter, CopyRunResult, CopySession};
pub use resolve::{DestinationInfo, Resolved, SourceSpec};
pub use stats::SharedStats;
pub use storage::{LocalStorageClient, StorageClient};
pub use transfer::{LocalTransferEngine, TransferEngine, TransferRequest, TransferSuccess};
