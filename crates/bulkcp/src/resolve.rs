//! Source/destination resolution.
//!
//! Normalizes the raw argument list into source specs plus exactly one
//! destination, resolving once whether the destination already exists as a
//! container. Resolving two different (source-list, destination) pairs to
//! the same literal destination concurrently is explicitly unspecified
//! behavior; no cross-pair synchronization is attempted.

use serde::{Deserialize, Serialize};

use crate::config::CopySessionConfig;
use crate::error::{CopyError, Result};
use crate::locator::Locator;
use crate::storage::StorageClient;

/// One raw source locator, possibly wildcarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub raw: String,
    pub locator: Locator,
}

impl SourceSpec {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let locator = Locator::parse(&raw);
        Self { raw, locator }
    }

    /// Textual wildcard check; actual expansion is the expander's concern.
    pub fn contains_wildcard(&self) -> bool {
        self.raw.contains(['*', '?', '['])
    }
}

/// Resolved destination plus its cached container-existence flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationInfo {
    pub locator: Locator,
    pub exists_as_container: bool,
}

/// The source side of one expansion pair.
#[derive(Debug, Clone)]
pub enum SourceList {
    /// Positional source arguments.
    Fixed(Vec<SourceSpec>),
    /// Sources arrive lazily, one per line, from an external stream.
    Stream,
}

/// One (source-list, destination) pair fixed for expansion.
#[derive(Debug, Clone)]
pub struct ExpansionPair {
    pub sources: SourceList,
    pub destination: DestinationInfo,
}

/// What a raw invocation resolved to.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// Normal copy/move run.
    Copy(Vec<ExpansionPair>),
    /// Destination is the standard output stream or a named pipe; the run
    /// is delegated to an external concatenation collaborator.
    Concatenate { sources: Vec<String> },
}

/// Resolve raw positional arguments into expansion pairs.
///
/// The last argument is the destination. In stream mode there must be
/// exactly one positional argument (the destination) and sources are read
/// later, one per line, by the task iterator.
pub async fn resolve_invocation(
    args: &[String],
    config: &CopySessionConfig,
    storage: &dyn StorageClient,
) -> Result<Resolved> {
    if args.is_empty() {
        return Err(CopyError::Config(
            "wrong number of arguments: a destination is required".into(),
        ));
    }

    let dst_raw = args.last().expect("checked non-empty");
    let dst = Locator::parse(dst_raw);

    if dst.is_stream() || is_named_pipe(&dst).await {
        if config.preserve_posix {
            return Err(CopyError::Config(
                "cannot preserve POSIX attributes with a stream or a named pipe".into(),
            ));
        }
        return Ok(Resolved::Concatenate {
            sources: args[..args.len() - 1].to_vec(),
        });
    }

    let sources = if config.read_sources_from_stdin {
        if args.len() != 1 {
            return Err(CopyError::Config(
                "source locators cannot be specified together with stream-input mode".into(),
            ));
        }
        SourceList::Stream
    } else {
        if args.len() < 2 {
            return Err(CopyError::Config(
                "wrong number of arguments: need at least one source and a destination".into(),
            ));
        }
        SourceList::Fixed(
            args[..args.len() - 1]
                .iter()
                .map(SourceSpec::new)
                .collect(),
        )
    };

    // Container existence is resolved exactly once per destination and
    // cached for the whole run.
    let exists_as_container = storage.is_container(&dst).await?;
    Ok(Resolved::Copy(vec![ExpansionPair {
        sources,
        destination: DestinationInfo {
            locator: dst,
            exists_as_container,
        },
    }]))
}

#[cfg(unix)]
async fn is_named_pipe(locator: &Locator) -> bool {
    use std::os::unix::fs::FileTypeExt;
    match locator.as_path() {
        Some(path) => tokio::fs::metadata(path)
            .await
            .map(|m| m.file_type().is_fifo())
            .unwrap_or(false),
        None => false,
    }
}

#[cfg(not(unix))]
async fn is_named_pipe(_locator: &Locator) -> bool {
    false
}
