//! Per-task copy/move execution.
//!
//! One [`CopyExecutor`] instance is shared by every worker; all per-task
//! state lives on the stack. Order is fixed per task: preflight checks,
//! destination naming, transfer, source deletion (move), manifest terminal
//! line, stats update.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CopySessionConfig;
use crate::error::{CopyError, Result};
use crate::expand::{CopyTask, RecursionFlag};
use crate::locator::Locator;
use crate::manifest::{Manifest, RecordStatus};
use crate::naming;
use crate::stats::SharedStats;
use crate::storage::StorageClient;
use crate::transfer::{TransferEngine, TransferRequest, TransferSignal};

/// Why a task produced no bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Synthetic zero-byte container marker; dropped silently.
    Placeholder,
    /// Manifest already records this source as completed.
    AlreadyCompleted,
    /// Destination exists and the session forbids clobbering.
    NoClobber,
    /// Source object type the engine cannot transfer.
    Unsupported,
    /// Destination claimed by a concurrent task.
    ConcurrentConflict,
}

/// Outcome of one task, matched exhaustively by the dispatcher.
#[derive(Debug, Clone)]
pub enum CopyOutcome {
    Success {
        bytes: u64,
        result_locator: Locator,
        hash: Option<String>,
    },
    Skipped(SkipReason),
    /// Absorbed per-item failure (continue-on-error mode only).
    Failed { detail: String },
}

/// Executes one [`CopyTask`] end to end.
pub struct CopyExecutor {
    config: CopySessionConfig,
    storage: Arc<dyn StorageClient>,
    engine: Arc<dyn TransferEngine>,
    manifest: Option<Arc<Manifest>>,
    stats: Arc<SharedStats>,
    recursion: RecursionFlag,
}

impl CopyExecutor {
    pub fn new(
        config: CopySessionConfig,
        storage: Arc<dyn StorageClient>,
        engine: Arc<dyn TransferEngine>,
        manifest: Option<Arc<Manifest>>,
        stats: Arc<SharedStats>,
        recursion: RecursionFlag,
    ) -> Self {
        Self {
            config,
            storage,
            engine,
            manifest,
            stats,
            recursion,
        }
    }

    pub fn stats(&self) -> &Arc<SharedStats> {
        &self.stats
    }

    /// Run one task. `Err` is terminal for the run; absorbed per-item
    /// failures come back as `Ok(CopyOutcome::Failed)`.
    pub async fn execute(&self, task: &CopyTask) -> Result<CopyOutcome> {
        self.preflight(task)?;

        // The destination-must-name-a-container check comes before any skip:
        // a bad destination is a conflict even when this particular task
        // would have been dropped.
        if task.is_multi_source && !task.destination.exists_as_container {
            self.ensure_destination_container(&task.destination.locator)
                .await?;
        }

        if task.source.is_container_placeholder() {
            debug!("Skipping container placeholder {}", task.source);
            return Ok(CopyOutcome::Skipped(SkipReason::Placeholder));
        }

        let source_key = task.source.url_string();
        if let Some(manifest) = &self.manifest {
            if manifest.was_successful(&source_key) {
                debug!("Skipping already-completed source {}", task.source);
                return Ok(CopyOutcome::Skipped(SkipReason::AlreadyCompleted));
            }
        }

        // A move of a container match behaves like a recursive delete+copy
        // for everything that follows.
        if self.config.perform_move && task.is_container_match {
            self.recursion.force_on();
        }

        let destination = match naming::resolve_destination(task, &self.config, &*self.storage)
            .await
        {
            Ok(dst) => dst,
            Err(e @ CopyError::Config(_)) => return Err(e),
            Err(e) => return self.absorb_failure(task, &source_key, e),
        };

        if let Some(manifest) = &self.manifest {
            manifest.initialize(
                &source_key,
                &destination.url_string(),
                task.size.unwrap_or(0),
            );
        }

        let request = self.build_request(task, destination);
        match self.engine.transfer(&request).await {
            Ok(success) => {
                if self.config.perform_move {
                    self.delete_source(&task.source).await?;
                }
                if let Some(manifest) = &self.manifest {
                    if let Some(hash) = &success.hash {
                        manifest.set_hash(&source_key, hash);
                    }
                    if let Some(upload_id) = &success.upload_id {
                        manifest.set_upload_id(&source_key, upload_id);
                    }
                    manifest.set_result(
                        &source_key,
                        success.bytes_transferred,
                        RecordStatus::Ok,
                        None,
                    )?;
                }
                self.stats.add_bytes(success.bytes_transferred);
                Ok(CopyOutcome::Success {
                    bytes: success.bytes_transferred,
                    result_locator: success.result_locator,
                    hash: success.hash,
                })
            }
            Err(TransferSignal::Exists) => {
                debug!("Skipping existing destination for {}", task.source);
                self.record_skip(&source_key, "noclobber")?;
                Ok(CopyOutcome::Skipped(SkipReason::NoClobber))
            }
            Err(TransferSignal::Unsupported(kind)) => {
                if self.config.skip_unsupported {
                    warn!("Skipping {} with unsupported type: {}", task.source, kind);
                    self.record_skip(&source_key, &format!("unsupported type: {}", kind))?;
                    Ok(CopyOutcome::Skipped(SkipReason::Unsupported))
                } else {
                    let err = CopyError::transfer(
                        source_key.clone(),
                        format!("unsupported object type: {}", kind),
                    );
                    self.absorb_failure(task, &source_key, err)
                }
            }
            Err(TransferSignal::DestinationInUse) => {
                // A concurrent task won the destination; not a failure.
                warn!(
                    "Destination for {} already claimed by a concurrent task",
                    task.source
                );
                Ok(CopyOutcome::Skipped(SkipReason::ConcurrentConflict))
            }
            Err(TransferSignal::Failure(e)) => self.absorb_failure(task, &source_key, e),
        }
    }

    /// Config-level checks that bypass continue-on-error entirely.
    fn preflight(&self, task: &CopyTask) -> Result<()> {
        if task.source.is_provider_only() {
            return Err(CopyError::Config(format!(
                "source {} names a provider with no bucket or object",
                task.source
            )));
        }
        if self.config.preserve_posix && task.source.is_stream() {
            return Err(CopyError::Config(
                "cannot preserve POSIX attributes when copying from a stream".into(),
            ));
        }
        if self.config.parallel() && task.source.is_stream() {
            return Err(CopyError::Config(
                "cannot copy from a stream with parallel execution enabled".into(),
            ));
        }
        Ok(())
    }

    async fn ensure_destination_container(&self, dst: &Locator) -> Result<()> {
        match self.storage.exists(dst).await {
            Ok(true) => Err(CopyError::Conflict(format!(
                "destination {} must be a container when copying multiple sources",
                dst
            ))),
            Ok(false) => self.storage.create_container(dst).await.map_err(|e| {
                CopyError::Conflict(format!("could not create destination container {}: {}", dst, e))
            }),
            Err(e) => Err(e),
        }
    }

    async fn delete_source(&self, source: &Locator) -> Result<()> {
        self.storage
            .delete(source, source.generation())
            .await
            .map_err(|e| CopyError::PostCopyDeletion {
                item: source.to_string(),
                message: e.to_string(),
            })
    }

    fn build_request(&self, task: &CopyTask, destination: Locator) -> TransferRequest {
        let gzip = self
            .config
            .gzip_policy()
            .filter(|p| p.applies_to(&task.source.final_component()));
        TransferRequest {
            source: task.source.clone(),
            destination,
            source_size: task.size,
            gzip,
            storage_class: self.config.dest_storage_class.clone(),
            preserve_acl: self.config.preserve_acl,
            canned_acl: self.config.canned_acl.clone(),
            preserve_posix: self.config.preserve_posix,
            no_clobber: self.config.no_clobber,
            daisy_chain: self.config.daisy_chain,
        }
    }

    fn record_skip(&self, source_key: &str, detail: &str) -> Result<()> {
        if let Some(manifest) = &self.manifest {
            manifest.set_result(source_key, 0, RecordStatus::Skip, Some(detail))?;
        }
        Ok(())
    }

    /// Count the failure, write its manifest line, and either absorb it
    /// (continue-on-error) or propagate it. Config and post-copy-deletion
    /// errors never reach here.
    fn absorb_failure(
        &self,
        task: &CopyTask,
        source_key: &str,
        error: CopyError,
    ) -> Result<CopyOutcome> {
        self.stats.record_failure();
        let detail = error.to_string();
        if let Some(manifest) = &self.manifest {
            // Best effort when the record was never initialized (naming
            // failures happen before manifest initialization).
            if manifest
                .set_result(source_key, 0, RecordStatus::Error, Some(&detail))
                .is_err()
            {
                manifest.initialize(source_key, &task.destination.locator.url_string(), 0);
                manifest.set_result(source_key, 0, RecordStatus::Error, Some(&detail))?;
            }
        }
        if self.config.continue_on_error {
            warn!("{}", detail);
            Ok(CopyOutcome::Failed { detail })
        } else {
            Err(error)
        }
    }
}
