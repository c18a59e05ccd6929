//! Low-level store operations consumed by the engine.
//!
//! The engine only needs existence/container checks, container creation and
//! delete-by-locator; byte transfer lives behind
//! [`crate::transfer::TransferEngine`].

use async_trait::async_trait;

use crate::error::{CopyError, Result};
use crate::locator::Locator;

/// Storage API client collaborator.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Whether any item (plain or container) exists at `locator`.
    async fn exists(&self, locator: &Locator) -> Result<bool>;

    /// Whether `locator` names an existing container (directory, bucket, or
    /// prefix acting as one).
    async fn is_container(&self, locator: &Locator) -> Result<bool>;

    /// Create a container. Racing a concurrent creation is not an error.
    async fn create_container(&self, locator: &Locator) -> Result<()>;

    /// Delete the item at `locator`, by generation when pinned.
    async fn delete(&self, locator: &Locator, generation: Option<u64>) -> Result<()>;
}

/// Local-filesystem storage client.
#[derive(Debug, Default)]
pub struct LocalStorageClient;

impl LocalStorageClient {
    pub fn new() -> Self {
        Self
    }

    fn require_path<'a>(&self, locator: &'a Locator) -> Result<&'a std::path::Path> {
        locator.as_path().ok_or_else(|| {
            CopyError::Config(format!(
                "no storage client available for scheme '{}' ({})",
                locator.scheme(),
                locator
            ))
        })
    }
}

#[async_trait]
impl StorageClient for LocalStorageClient {
    async fn exists(&self, locator: &Locator) -> Result<bool> {
        let path = self.require_path(locator)?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn is_container(&self, locator: &Locator) -> Result<bool> {
        let path = self.require_path(locator)?;
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_container(&self, locator: &Locator) -> Result<()> {
        let path = self.require_path(locator)?;
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn delete(&self, locator: &Locator, _generation: Option<u64>) -> Result<()> {
        let path = self.require_path(locator)?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}
