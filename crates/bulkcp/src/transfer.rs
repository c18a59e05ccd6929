//! Transfer engine seam and the local-filesystem implementation.
//!
//! Byte-level mechanics (chunked I/O, checksum verification, resumable
//! protocols, compression) belong to the engine behind [`TransferEngine`];
//! the executor only interprets its outcome signal.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::config::GzipPolicy;
use crate::error::{CopyError, Result};
use crate::locator::Locator;

/// Per-task request handed to the transfer engine.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source: Locator,
    pub destination: Locator,
    /// Prefetched source size, when expansion already knows it.
    pub source_size: Option<u64>,
    pub gzip: Option<GzipPolicy>,
    pub storage_class: Option<String>,
    pub preserve_acl: bool,
    pub canned_acl: Option<String>,
    pub preserve_posix: bool,
    pub no_clobber: bool,
    pub daisy_chain: bool,
}

/// Successful transfer outcome.
#[derive(Debug, Clone)]
pub struct TransferSuccess {
    pub bytes_transferred: u64,
    /// Locator of the written item, version-pinned where the store supports it.
    pub result_locator: Locator,
    pub hash: Option<String>,
    /// Resumable-transfer identifier, if one was used.
    pub upload_id: Option<String>,
}

/// Non-success signal from the transfer engine.
#[derive(Debug)]
pub enum TransferSignal {
    /// Destination exists and the session forbids clobbering.
    Exists,
    /// Source has an object type the engine cannot transfer.
    Unsupported(String),
    /// Destination already claimed by a concurrent task.
    DestinationInUse,
    /// Any other failure.
    Failure(CopyError),
}

/// Outcome of one transfer attempt.
pub type TransferResult = std::result::Result<TransferSuccess, TransferSignal>;

/// Byte-transfer collaborator.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    async fn transfer(&self, request: &TransferRequest) -> TransferResult;
}

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Local file-to-file transfer engine with content hashing.
#[derive(Debug, Default)]
pub struct LocalTransferEngine;

impl LocalTransferEngine {
    pub fn new() -> Self {
        Self
    }

    async fn copy_file(
        &self,
        src: &std::path::Path,
        dst: &std::path::Path,
    ) -> Result<(u64, String)> {
        let reader = tokio::fs::File::open(src).await?;
        self.copy_reader(reader, dst).await
    }

    async fn copy_reader<R: AsyncRead + Unpin>(
        &self,
        mut reader: R,
        dst: &std::path::Path,
    ) -> Result<(u64, String)> {
        if let Some(parent) = dst.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut writer = tokio::fs::File::create(dst).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut total: u64 = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            writer.write_all(&buf[..n]).await?;
            total += n as u64;
        }
        writer.flush().await?;
        Ok((total, hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl TransferEngine for LocalTransferEngine {
    async fn transfer(&self, request: &TransferRequest) -> TransferResult {
        let dst = match request.destination.as_path() {
            Some(p) => p,
            None => {
                return Err(TransferSignal::Failure(CopyError::transfer(
                    request.source.to_string(),
                    format!(
                        "no transfer engine for scheme '{}'",
                        request.destination.scheme()
                    ),
                )))
            }
        };

        if request.no_clobber {
            match tokio::fs::try_exists(dst).await {
                Ok(true) => return Err(TransferSignal::Exists),
                Ok(false) => {}
                Err(e) => return Err(TransferSignal::Failure(e.into())),
            }
        }

        let result = if request.source.is_stream() {
            self.copy_reader(tokio::io::stdin(), dst).await
        } else {
            match request.source.as_path() {
                Some(src) => self.copy_file(src, dst).await,
                None => {
                    return Err(TransferSignal::Failure(CopyError::transfer(
                        request.source.to_string(),
                        format!("no transfer engine for scheme '{}'", request.source.scheme()),
                    )))
                }
            }
        };

        match result {
            Ok((bytes, hash)) => Ok(TransferSuccess {
                bytes_transferred: bytes,
                result_locator: request.destination.clone(),
                hash: Some(hash),
                upload_id: None,
            }),
            Err(CopyError::Io(e)) => Err(TransferSignal::Failure(CopyError::transfer(
                request.source.to_string(),
                e.to_string(),
            ))),
            Err(e) => Err(TransferSignal::Failure(e)),
        }
    }
}
