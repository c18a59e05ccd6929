//! Durable per-run manifest ledger enabling resumable batch copies.
//!
//! The manifest is an append-only JSON-Lines file keyed by source locator.
//! Each attempted source gets exactly one terminal line (`OK`, `skip` or
//! `error`); re-invoking against an existing manifest appends, and sources
//! whose latest record is `OK` or `skip` are treated as already satisfied.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CopyError, Result};

/// Terminal status of one attempted source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "skip")]
    Skip,
    #[serde(rename = "error")]
    Error,
}

/// One manifest line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Source locator (ledger key).
    pub source: String,

    /// Resolved destination locator.
    pub destination: String,

    /// Source size in bytes, when known.
    #[serde(default)]
    pub source_size: u64,

    /// Bytes actually transferred.
    #[serde(default)]
    pub bytes_transferred: u64,

    /// Content hash of the written item, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// Transfer start time (UTC).
    pub start_time: DateTime<Utc>,

    /// Transfer completion time (UTC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Resumable-transfer identifier, if one was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,

    /// Final status.
    pub status: RecordStatus,

    /// Single-line failure or skip detail (line terminators stripped).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

struct ManifestInner {
    file: File,
    records: HashMap<String, ManifestRecord>,
}

/// Append/update-only ledger keyed by source locator.
///
/// Records are keyed per source, so concurrent workers in a correct run
/// never contend on the same record; the inner lock only serializes the
/// file append itself.
pub struct Manifest {
    path: PathBuf,
    inner: Mutex<ManifestInner>,
}

impl Manifest {
    /// Open (or create) the ledger at `path`, loading any prior records.
    pub fn open(path: &Path) -> Result<Self> {
        let mut records = HashMap::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ManifestRecord>(&line) {
                    // Last record per source wins.
                    Ok(record) => {
                        records.insert(record.source.clone(), record);
                    }
                    Err(e) => {
                        warn!(
                            "Skipping unparsable manifest line {} in {}: {}",
                            lineno + 1,
                            path.display(),
                            e
                        );
                    }
                }
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(ManifestInner { file, records }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the latest record for `source` is `OK` or `skip`.
    pub fn was_successful(&self, source: &str) -> bool {
        let inner = self.inner.lock().expect("manifest lock poisoned");
        matches!(
            inner.records.get(source).map(|r| r.status),
            Some(RecordStatus::Ok) | Some(RecordStatus::Skip)
        )
    }

    /// Start tracking an attempt. In-memory only; the single durable line
    /// per source is written by [`set_result`].
    ///
    /// [`set_result`]: Manifest::set_result
    pub fn initialize(&self, source: &str, destination: &str, source_size: u64) {
        let mut inner = self.inner.lock().expect("manifest lock poisoned");
        inner.records.insert(
            source.to_string(),
            ManifestRecord {
                source: source.to_string(),
                destination: destination.to_string(),
                source_size,
                bytes_transferred: 0,
                hash: None,
                start_time: Utc::now(),
                end_time: None,
                upload_id: None,
                status: RecordStatus::Pending,
                detail: None,
            },
        );
    }

    /// Attach a content hash to the pending record for `source`.
    pub fn set_hash(&self, source: &str, hash: &str) {
        let mut inner = self.inner.lock().expect("manifest lock poisoned");
        if let Some(record) = inner.records.get_mut(source) {
            record.hash = Some(hash.to_string());
        }
    }

    /// Attach a resumable-upload identifier to the pending record.
    pub fn set_upload_id(&self, source: &str, upload_id: &str) {
        let mut inner = self.inner.lock().expect("manifest lock poisoned");
        if let Some(record) = inner.records.get_mut(source) {
            record.upload_id = Some(upload_id.to_string());
        }
    }

    /// Write the terminal line for `source` and flush it durably.
    pub fn set_result(
        &self,
        source: &str,
        bytes_transferred: u64,
        status: RecordStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("manifest lock poisoned");
        let record = inner
            .records
            .get_mut(source)
            .ok_or_else(|| CopyError::Manifest(format!("no record initialized for {}", source)))?;
        record.bytes_transferred = bytes_transferred;
        record.end_time = Some(Utc::now());
        record.status = status;
        record.detail = detail.map(strip_line_terminators);

        let line = serde_json::to_string(&*record)?;
        let file = &mut inner.file;
        writeln!(file, "{}", line)?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

fn strip_line_terminators(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}
