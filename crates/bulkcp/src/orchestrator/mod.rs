//! Copy session orchestrator - main workflow coordinator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{self, CopySessionConfig};
use crate::error::{CopyError, Result};
use crate::executor::{CopyExecutor, CopyOutcome};
use crate::expand::{LocalExpander, NameExpander, RecursionFlag, SourceLineReader, TaskIterator};
use crate::manifest::Manifest;
use crate::metrics::{LogMetricsSink, MetricsSink, PerformanceSummary};
use crate::resolve::{self, ExpansionPair, Resolved};
use crate::stats::SharedStats;
use crate::storage::{LocalStorageClient, StorageClient};
use crate::transfer::{LocalTransferEngine, TransferEngine};

/// Concatenation collaborator for stream/pipe destinations.
#[async_trait::async_trait]
pub trait CatWriter: Send + Sync {
    async fn concatenate(&self, sources: &[String]) -> Result<()>;
}

/// Copy session orchestrator.
pub struct CopySession {
    config: CopySessionConfig,
    storage: Arc<dyn StorageClient>,
    engine: Arc<dyn TransferEngine>,
    expander: Arc<dyn NameExpander>,
    metrics: Arc<dyn MetricsSink>,
    cat_writer: Option<Arc<dyn CatWriter>>,
    source_reader: Option<SourceLineReader>,
}

/// Result of a copy/move run.
#[derive(Debug, Clone, Serialize)]
pub struct CopyRunResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub elapsed_seconds: f64,

    /// Objects successfully copied.
    pub objects_copied: u64,

    /// Objects skipped (no-clobber, resume, unsupported types).
    pub objects_skipped: u64,

    /// Objects that failed permanently.
    pub objects_failed: u64,

    /// Total bytes transferred.
    pub bytes_transferred: u64,

    /// Average throughput (bytes/second); zero when elapsed is zero.
    pub bytes_per_second: f64,
}

impl CopyRunResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Default)]
struct OutcomeCounters {
    copied: u64,
    skipped: u64,
    failed: u64,
}

impl CopySession {
    /// Create a session wired to the local filesystem.
    pub fn new(config: CopySessionConfig) -> Self {
        Self {
            config,
            storage: Arc::new(LocalStorageClient::new()),
            engine: Arc::new(LocalTransferEngine::new()),
            expander: Arc::new(LocalExpander::new()),
            metrics: Arc::new(LogMetricsSink::new()),
            cat_writer: None,
            source_reader: None,
        }
    }

    /// Replace the storage client collaborator.
    pub fn with_storage(mut self, storage: Arc<dyn StorageClient>) -> Self {
        self.storage = storage;
        self
    }

    /// Replace the transfer engine collaborator.
    pub fn with_engine(mut self, engine: Arc<dyn TransferEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Replace the name expansion collaborator.
    pub fn with_expander(mut self, expander: Arc<dyn NameExpander>) -> Self {
        self.expander = expander;
        self
    }

    /// Replace the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Attach the concatenation collaborator for stream destinations.
    pub fn with_cat_writer(mut self, cat_writer: Arc<dyn CatWriter>) -> Self {
        self.cat_writer = Some(cat_writer);
        self
    }

    /// Attach the line reader supplying sources in stream-input mode.
    pub fn with_source_reader(mut self, reader: SourceLineReader) -> Self {
        self.source_reader = Some(reader);
        self
    }

    /// Run the copy/move session over `args` (last argument = destination).
    pub async fn run(mut self, args: &[String]) -> Result<CopyRunResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        config::validate(&self.config)?;

        let pairs = match resolve::resolve_invocation(args, &self.config, &*self.storage).await? {
            Resolved::Copy(pairs) => pairs,
            Resolved::Concatenate { sources } => {
                info!("Destination is a stream; delegating to concatenation");
                let cat = self.cat_writer.as_ref().ok_or_else(|| {
                    CopyError::Config(
                        "destination is a stream but no concatenation collaborator is configured"
                            .into(),
                    )
                })?;
                cat.concatenate(&sources).await?;
                return Ok(build_result(
                    run_id,
                    started_at,
                    OutcomeCounters::default(),
                    0,
                ));
            }
        };

        let manifest = match &self.config.manifest_path {
            Some(path) => Some(Arc::new(Manifest::open(path)?)),
            None => None,
        };

        let stats = Arc::new(SharedStats::new());
        let recursion = RecursionFlag::new(self.config.recursive);
        let executor = Arc::new(CopyExecutor::new(
            self.config.clone(),
            self.storage.clone(),
            self.engine.clone(),
            manifest,
            stats.clone(),
            recursion.clone(),
        ));

        let mut iter = TaskIterator::new(
            pairs.clone(),
            self.expander.clone(),
            &self.config,
            recursion,
            self.source_reader.take(),
        );

        // Size estimation runs on its own enumeration, purely for display.
        // Single-pass (stream-fed) iterations cannot support it.
        if iter.restartable() && self.config.parallel() {
            self.spawn_seek_ahead(pairs);
        }

        info!(
            "Starting {} run {} with {} workers",
            if self.config.perform_move { "move" } else { "copy" },
            run_id,
            self.config.workers
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut join_set: JoinSet<Result<CopyOutcome>> = JoinSet::new();
        let mut counters = OutcomeCounters::default();
        let mut terminal: Option<CopyError> = None;

        while terminal.is_none() {
            let task = match iter.next_task().await {
                Some(Ok(task)) => task,
                Some(Err(e)) => {
                    // Expansion failures of one source are absorbable like
                    // transfer failures; config errors are not.
                    if self.config.continue_on_error
                        && matches!(e, CopyError::Transfer { .. } | CopyError::Io(_))
                    {
                        warn!("{}", e);
                        stats.record_failure();
                        counters.failed += 1;
                        continue;
                    }
                    terminal = Some(e);
                    break;
                }
                None => break,
            };

            // Drain finished workers before dispatching more, so a terminal
            // failure stops new dispatch promptly.
            while let Some(joined) = join_set.try_join_next() {
                note_joined(joined, &mut counters, &mut terminal, &self.config);
            }
            if terminal.is_some() {
                break;
            }

            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let executor = executor.clone();
            join_set.spawn(async move {
                let result = executor.execute(&task).await;
                drop(permit);
                result
            });
        }

        // In-flight tasks always run to completion, even after a terminal
        // failure stopped new dispatch.
        while let Some(joined) = join_set.join_next().await {
            note_joined(joined, &mut counters, &mut terminal, &self.config);
        }

        counters.failed = counters.failed.max(stats.failures());
        let result = build_result(run_id, started_at, counters, stats.bytes());

        self.emit_summary(&result, &iter);

        info!(
            "Run {}: {} copied, {} skipped, {} failed, {} bytes in {:.1}s",
            result.run_id,
            result.objects_copied,
            result.objects_skipped,
            result.objects_failed,
            result.bytes_transferred,
            result.elapsed_seconds
        );

        if let Some(e) = terminal {
            return Err(e);
        }
        let failures = stats.failures();
        if failures > 0 {
            return Err(CopyError::BatchFailure { count: failures });
        }
        Ok(result)
    }

    /// Best-effort size estimation over an independent enumeration.
    fn spawn_seek_ahead(&self, pairs: Vec<ExpansionPair>) {
        let expander = self.expander.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let recursion = RecursionFlag::new(config.recursive);
            let mut iter = TaskIterator::new(pairs, expander, &config, recursion, None);
            let mut objects: u64 = 0;
            let mut bytes: u64 = 0;
            while let Some(item) = iter.next_task().await {
                match item {
                    Ok(task) => {
                        objects += 1;
                        bytes += task.size.unwrap_or(0);
                    }
                    Err(e) => {
                        debug!("Size estimation stopped: {}", e);
                        return;
                    }
                }
            }
            info!(
                "Estimated work: {} objects, {} bytes",
                objects, bytes
            );
        });
    }

    fn emit_summary(&self, result: &CopyRunResult, iter: &TaskIterator) {
        let summary = PerformanceSummary {
            run_id: result.run_id.clone(),
            provider_schemes: iter.provider_schemes().iter().cloned().collect(),
            has_file_dst: iter.has_file_dst(),
            has_cloud_dst: iter.has_cloud_dst(),
            parallel: self.config.parallel(),
            daisy_chain: self.config.daisy_chain,
            is_move: self.config.perform_move,
            objects_copied: result.objects_copied,
            bytes_transferred: result.bytes_transferred,
            elapsed_seconds: result.elapsed_seconds,
            bytes_per_second: result.bytes_per_second,
        };
        self.metrics.record_summary(&summary);
    }
}

fn note_joined(
    joined: std::result::Result<Result<CopyOutcome>, tokio::task::JoinError>,
    counters: &mut OutcomeCounters,
    terminal: &mut Option<CopyError>,
    config: &CopySessionConfig,
) {
    match joined {
        Ok(Ok(CopyOutcome::Success { result_locator, .. })) => {
            counters.copied += 1;
            if config.print_result_url {
                info!("Created {}", result_locator.url_string());
            }
        }
        Ok(Ok(CopyOutcome::Skipped(_))) => {
            counters.skipped += 1;
        }
        Ok(Ok(CopyOutcome::Failed { .. })) => {
            counters.failed += 1;
        }
        Ok(Err(e)) => {
            error!("{}", e);
            if terminal.is_none() {
                *terminal = Some(e);
            }
        }
        Err(e) => {
            error!("Copy task panicked: {}", e);
            if terminal.is_none() {
                *terminal = Some(CopyError::transfer("worker", format!("task panicked: {}", e)));
            }
        }
    }
}

fn build_result(
    run_id: String,
    started_at: DateTime<Utc>,
    counters: OutcomeCounters,
    bytes_transferred: u64,
) -> CopyRunResult {
    let completed_at = Utc::now();
    let elapsed = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
    let bytes_per_second = if elapsed > 0.0 {
        bytes_transferred as f64 / elapsed
    } else {
        0.0
    };
    let status = if counters.failed > 0 { "failed" } else { "completed" };
    CopyRunResult {
        run_id,
        status: status.to_string(),
        started_at,
        completed_at,
        elapsed_seconds: elapsed,
        objects_copied: counters.copied,
        objects_skipped: counters.skipped,
        objects_failed: counters.failed,
        bytes_transferred,
        bytes_per_second,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn args(list: &[&Path]) -> Vec<String> {
        list.iter()
            .map(|p| p.to_str().unwrap().to_string())
            .collect()
    }

    fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
        for (rel, content) in files {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    #[tokio::test]
    async fn test_recursive_parallel_copy() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        std::fs::create_dir_all(&dst).unwrap();
        write_tree(
            &src,
            &[
                ("a.txt", b"aaaa".as_slice()),
                ("sub/b.txt", b"bb".as_slice()),
                ("sub/deep/c.txt", b"c".as_slice()),
            ],
        );

        let config = CopySessionConfig {
            recursive: true,
            workers: 4,
            ..Default::default()
        };
        let result = CopySession::new(config)
            .run(&args(&[&src, &dst]))
            .await
            .unwrap();

        assert_eq!(result.objects_copied, 3);
        assert_eq!(result.objects_failed, 0);
        assert_eq!(result.bytes_transferred, 7);
        assert_eq!(result.status, "completed");
        assert_eq!(std::fs::read(dst.join("a.txt")).unwrap(), b"aaaa");
        assert_eq!(std::fs::read(dst.join("sub/b.txt")).unwrap(), b"bb");
        assert_eq!(std::fs::read(dst.join("sub/deep/c.txt")).unwrap(), b"c");
    }

    #[tokio::test]
    async fn test_continue_mode_fails_at_end_with_count() {
        let dir = tempdir().unwrap();
        let good1 = dir.path().join("good1.txt");
        let good2 = dir.path().join("good2.txt");
        let missing = dir.path().join("missing.txt");
        let dst = dir.path().join("dst");
        std::fs::write(&good1, b"1").unwrap();
        std::fs::write(&good2, b"2").unwrap();
        std::fs::create_dir_all(&dst).unwrap();

        let config = CopySessionConfig {
            continue_on_error: true,
            ..Default::default()
        };
        let err = CopySession::new(config)
            .run(&args(&[&good1, &missing, &good2, &dst]))
            .await
            .unwrap_err();

        assert!(matches!(err, CopyError::BatchFailure { count: 1 }));
        // Survivors were still copied.
        assert!(dst.join("good1.txt").exists());
        assert!(dst.join("good2.txt").exists());
    }

    #[tokio::test]
    async fn test_fail_fast_propagates_first_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let dst = dir.path().join("dst");
        std::fs::create_dir_all(&dst).unwrap();

        let err = CopySession::new(CopySessionConfig::default())
            .run(&args(&[&missing, &dst]))
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::Transfer { .. }));
    }

    #[tokio::test]
    async fn test_move_deletes_sources() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        std::fs::create_dir_all(&dst).unwrap();
        write_tree(&src, &[("a.txt", b"a".as_slice()), ("sub/b.txt", b"b".as_slice())]);

        let config = CopySessionConfig {
            perform_move: true,
            ..Default::default()
        };
        let result = CopySession::new(config)
            .run(&args(&[&src, &dst]))
            .await
            .unwrap();

        assert_eq!(result.objects_copied, 2);
        assert!(dst.join("a.txt").exists());
        assert!(dst.join("sub/b.txt").exists());
        assert!(!src.join("a.txt").exists());
        assert!(!src.join("sub/b.txt").exists());
    }

    #[tokio::test]
    async fn test_manifest_resume_skips_completed_sources() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let manifest = dir.path().join("cp.log");
        std::fs::create_dir_all(&dst).unwrap();
        write_tree(&src, &[("a.txt", b"aa".as_slice())]);

        let config = CopySessionConfig {
            recursive: true,
            manifest_path: Some(manifest.clone()),
            ..Default::default()
        };
        let first = CopySession::new(config.clone())
            .run(&args(&[&src, &dst]))
            .await
            .unwrap();
        assert_eq!(first.objects_copied, 1);

        // Second invocation finds the OK record and re-copies nothing, even
        // though the destination file was removed in between.
        std::fs::remove_file(dst.join("a.txt")).unwrap();
        let second = CopySession::new(config)
            .run(&args(&[&src, &dst]))
            .await
            .unwrap();
        assert_eq!(second.objects_copied, 0);
        assert_eq!(second.objects_skipped, 1);
        assert!(!dst.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_conflicting_flags_fail_before_any_work() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"x").unwrap();

        let config = CopySessionConfig {
            preserve_acl: true,
            canned_acl: Some("public-read".into()),
            ..Default::default()
        };
        let err = CopySession::new(config)
            .run(&args(&[&src, dir.path()]))
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::Config(_)));
    }

    #[tokio::test]
    async fn test_stream_destination_uses_cat_writer() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct RecordingCat(Mutex<Vec<String>>);

        #[async_trait::async_trait]
        impl CatWriter for RecordingCat {
            async fn concatenate(&self, sources: &[String]) -> Result<()> {
                self.0.lock().unwrap().extend_from_slice(sources);
                Ok(())
            }
        }

        let cat = Arc::new(RecordingCat::default());
        let result = CopySession::new(CopySessionConfig::default())
            .with_cat_writer(cat.clone())
            .run(&["a.txt".to_string(), "b.txt".to_string(), "-".to_string()])
            .await
            .unwrap();

        assert_eq!(result.objects_copied, 0);
        assert_eq!(
            *cat.0.lock().unwrap(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
    }
}
