//! Deterministic destination naming.
//!
//! Evaluated once per task: container-descent matches keep their path
//! relative to the expansion root, everything else keeps only its final
//! component. Guards against container/item kind clashes and self-copies.

use crate::config::CopySessionConfig;
use crate::error::{CopyError, Result};
use crate::expand::CopyTask;
use crate::locator::Locator;
use crate::storage::StorageClient;

/// Compute the final destination locator for `task`.
pub async fn resolve_destination(
    task: &CopyTask,
    config: &CopySessionConfig,
    storage: &dyn StorageClient,
) -> Result<Locator> {
    let dst = &task.destination.locator;

    if config.dest_storage_class.is_some() && !dst.is_cloud() {
        return Err(CopyError::Config(format!(
            "a destination storage class requires a cloud destination, got {}",
            dst
        )));
    }
    if dst.is_cloud() && dst.generation().is_some() {
        return Err(CopyError::Config(format!(
            "destination {} is version-pinned; copies must target the live version",
            dst
        )));
    }

    let relative = if task.is_container_match {
        // Matched by descending into `spec_root`; keep the sub-path.
        task.source
            .relative_to(&task.spec_root)
            .unwrap_or_else(|| task.source.final_component())
    } else {
        task.source.final_component()
    };

    let nests_under_destination =
        task.destination.exists_as_container || task.is_multi_source || task.is_container_match;
    let resolved = if nests_under_destination {
        dst.join(&relative)
    } else {
        // Single named source onto a non-container destination: the
        // destination is the literal output name.
        dst.clone()
    };

    // Textual self-copy guard first; it needs no storage lookup and holds
    // for cloud and local locators alike.
    if resolved.to_string() == task.source.to_string() {
        return Err(CopyError::Conflict(format!(
            "source and destination are the same item: {}",
            task.source
        )));
    }
    if storage.is_container(&resolved).await? {
        return Err(CopyError::Conflict(format!(
            "destination {} already exists as a container",
            resolved
        )));
    }

    Ok(resolved)
}
