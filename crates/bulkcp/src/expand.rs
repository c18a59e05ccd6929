//! Name expansion seam and the per-item task iterator.
//!
//! The [`NameExpander`] collaborator turns one source spec into a lazy,
//! channel-backed sequence of matched items; the [`TaskIterator`] flat-maps
//! those sequences into [`CopyTask`]s bound to a fixed destination context,
//! accumulating provider/destination metadata as a side effect.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::CopySessionConfig;
use crate::error::{CopyError, Result};
use crate::locator::Locator;
use crate::resolve::{DestinationInfo, ExpansionPair, SourceList, SourceSpec};

/// One matched item from name expansion.
#[derive(Debug, Clone)]
pub struct ExpandedItem {
    pub locator: Locator,
    /// Matched by descending into a container rather than named directly.
    pub is_container_match: bool,
    /// Prefetched size, when the expansion already knows it.
    pub size: Option<u64>,
}

/// Expansion flags beyond recursion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandFlags {
    pub all_versions: bool,
    pub exclude_symlinks: bool,
}

/// Wildcard/container expansion collaborator.
#[async_trait]
pub trait NameExpander: Send + Sync {
    /// Expand one source spec into a lazy item sequence.
    async fn expand(
        &self,
        spec: &SourceSpec,
        recursive: bool,
        flags: ExpandFlags,
    ) -> Result<mpsc::Receiver<Result<ExpandedItem>>>;
}

/// Recursion policy shared between the iterator and the executor: a move of
/// a container-level match forces recursion on for the remainder of the run.
#[derive(Debug, Clone, Default)]
pub struct RecursionFlag(Arc<AtomicBool>);

impl RecursionFlag {
    pub fn new(initial: bool) -> Self {
        Self(Arc::new(AtomicBool::new(initial)))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn force_on(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// One expanded (source, destination-context) pair, produced once by the
/// task iterator and consumed exactly once by the executor.
#[derive(Debug, Clone)]
pub struct CopyTask {
    /// Concrete expanded source locator.
    pub source: Locator,
    /// Root locator of the spec that matched it.
    pub spec_root: Locator,
    /// Matched via container descent.
    pub is_container_match: bool,
    /// Part of a multi-source request.
    pub is_multi_source: bool,
    /// Prefetched source size.
    pub size: Option<u64>,
    /// Fixed destination context.
    pub destination: DestinationInfo,
}

/// Reader supplying source locators one per line in stream mode.
pub type SourceLineReader = Box<dyn AsyncBufRead + Send + Unpin>;

enum SpecFeed {
    Fixed(VecDeque<SourceSpec>),
    Stream(SourceLineReader),
}

impl SpecFeed {
    async fn next(&mut self) -> Result<Option<SourceSpec>> {
        match self {
            SpecFeed::Fixed(queue) => Ok(queue.pop_front()),
            SpecFeed::Stream(reader) => loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await? == 0 {
                    return Ok(None);
                }
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    return Ok(Some(SourceSpec::new(trimmed)));
                }
            },
        }
    }
}

struct ActivePair {
    destination: DestinationInfo,
    is_multi_source: bool,
    feed: SpecFeed,
    current: Option<(mpsc::Receiver<Result<ExpandedItem>>, Locator)>,
}

/// Lazy sequence of [`CopyTask`]s across all expansion pairs.
///
/// Task order follows expansion enumeration order per source spec, in the
/// order specs were supplied; there is no cross-spec ordering guarantee.
pub struct TaskIterator {
    pending: VecDeque<ExpansionPair>,
    active: Option<ActivePair>,
    expander: Arc<dyn NameExpander>,
    recursion: RecursionFlag,
    perform_move: bool,
    flags: ExpandFlags,
    line_reader: Option<SourceLineReader>,
    restartable: bool,
    provider_schemes: BTreeSet<String>,
    has_file_dst: bool,
    has_cloud_dst: bool,
}

impl TaskIterator {
    pub fn new(
        pairs: Vec<ExpansionPair>,
        expander: Arc<dyn NameExpander>,
        config: &CopySessionConfig,
        recursion: RecursionFlag,
        line_reader: Option<SourceLineReader>,
    ) -> Self {
        let restartable = !pairs
            .iter()
            .any(|p| matches!(p.sources, SourceList::Stream));
        Self {
            pending: pairs.into(),
            active: None,
            expander,
            recursion,
            perform_move: config.perform_move,
            flags: ExpandFlags {
                all_versions: config.all_versions,
                exclude_symlinks: config.exclude_symlinks,
            },
            line_reader,
            restartable,
            provider_schemes: BTreeSet::new(),
            has_file_dst: false,
            has_cloud_dst: false,
        }
    }

    /// Whether a second enumeration pass (size estimation) is possible.
    /// Stream-fed sources are strictly single-pass.
    pub fn restartable(&self) -> bool {
        self.restartable
    }

    /// Provider schemes seen so far, for the performance summary.
    pub fn provider_schemes(&self) -> &BTreeSet<String> {
        &self.provider_schemes
    }

    pub fn has_file_dst(&self) -> bool {
        self.has_file_dst
    }

    pub fn has_cloud_dst(&self) -> bool {
        self.has_cloud_dst
    }

    /// Pull the next task, or `None` when every pair is exhausted.
    pub async fn next_task(&mut self) -> Option<Result<CopyTask>> {
        loop {
            if let Some(active) = self.active.as_mut() {
                if let Some((rx, root)) = active.current.as_mut() {
                    match rx.recv().await {
                        Some(Ok(item)) => {
                            self.provider_schemes.insert(item.locator.scheme().to_string());
                            return Some(Ok(CopyTask {
                                source: item.locator,
                                spec_root: root.clone(),
                                is_container_match: item.is_container_match,
                                is_multi_source: active.is_multi_source,
                                size: item.size,
                                destination: active.destination.clone(),
                            }));
                        }
                        Some(Err(e)) => return Some(Err(e)),
                        None => {
                            active.current = None;
                            continue;
                        }
                    }
                }
                match active.feed.next().await {
                    Ok(Some(spec)) => {
                        let recursive = self.recursion.get() || self.perform_move;
                        let root = spec.locator.clone();
                        match self.expander.expand(&spec, recursive, self.flags).await {
                            Ok(rx) => {
                                active.current = Some((rx, root));
                                continue;
                            }
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    Ok(None) => {
                        self.active = None;
                        continue;
                    }
                    Err(e) => return Some(Err(e)),
                }
            }

            let pair = self.pending.pop_front()?;
            self.has_file_dst |= pair.destination.locator.is_file();
            self.has_cloud_dst |= pair.destination.locator.is_cloud();
            self.provider_schemes
                .insert(pair.destination.locator.scheme().to_string());

            let (feed, is_multi_source) = match pair.sources {
                SourceList::Fixed(specs) => {
                    let multi = specs.len() > 1 || specs.iter().any(|s| s.contains_wildcard());
                    (SpecFeed::Fixed(specs.into()), multi)
                }
                SourceList::Stream => match self.line_reader.take() {
                    Some(reader) => (SpecFeed::Stream(reader), true),
                    None => {
                        return Some(Err(CopyError::Config(
                            "stream-input mode requires a source line reader".into(),
                        )))
                    }
                },
            };
            self.active = Some(ActivePair {
                destination: pair.destination,
                is_multi_source,
                feed,
                current: None,
            });
        }
    }
}

/// Local-filesystem name expander.
///
/// Containers are directories; wildcard matching belongs to a dedicated
/// expansion service and is declined here.
#[derive(Debug, Default)]
pub struct LocalExpander;

impl LocalExpander {
    pub fn new() -> Self {
        Self
    }
}

const EXPAND_CHANNEL_CAPACITY: usize = 64;

#[async_trait]
impl NameExpander for LocalExpander {
    async fn expand(
        &self,
        spec: &SourceSpec,
        recursive: bool,
        flags: ExpandFlags,
    ) -> Result<mpsc::Receiver<Result<ExpandedItem>>> {
        if spec.contains_wildcard() {
            return Err(CopyError::Config(format!(
                "wildcard expansion is not available for local source {}",
                spec.raw
            )));
        }
        // A stream source is a single item of unknown size; there is
        // nothing to enumerate.
        if spec.locator.is_stream() {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx
                .send(Ok(ExpandedItem {
                    locator: Locator::Stream,
                    is_container_match: false,
                    size: None,
                }))
                .await;
            return Ok(rx);
        }
        let root = match spec.locator.as_path() {
            Some(p) => p.to_path_buf(),
            None => {
                return Err(CopyError::Config(format!(
                    "no name expansion available for scheme '{}' ({})",
                    spec.locator.scheme(),
                    spec.raw
                )))
            }
        };
        let raw = spec.raw.clone();
        let (tx, rx) = mpsc::channel(EXPAND_CHANNEL_CAPACITY);

        tokio::task::spawn_blocking(move || {
            let meta = match std::fs::symlink_metadata(&root) {
                Ok(m) => m,
                Err(_) => {
                    let _ = tx.blocking_send(Err(CopyError::transfer(
                        raw,
                        "no items matched this source",
                    )));
                    return;
                }
            };

            if meta.file_type().is_symlink() && flags.exclude_symlinks {
                return;
            }

            if meta.is_dir() || (meta.file_type().is_symlink() && root.is_dir()) {
                if !recursive {
                    warn!("Omitting directory {}; use recursive mode to copy it", raw);
                    return;
                }
                walk_dir(&root, &tx, flags);
            } else {
                let size = std::fs::metadata(&root).map(|m| m.len()).ok();
                let _ = tx.blocking_send(Ok(ExpandedItem {
                    locator: Locator::File { path: root },
                    is_container_match: false,
                    size,
                }));
            }
        });

        Ok(rx)
    }
}

fn walk_dir(
    dir: &std::path::Path,
    tx: &mpsc::Sender<Result<ExpandedItem>>,
    flags: ExpandFlags,
) -> bool {
    let entries = match std::fs::read_dir(dir) {
        Ok(iter) => {
            let mut entries: Vec<_> = match iter.collect::<std::io::Result<Vec<_>>>() {
                Ok(v) => v,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e.into()));
                    return false;
                }
            };
            entries.sort_by_key(|e| e.file_name());
            entries
        }
        Err(e) => {
            let _ = tx.blocking_send(Err(e.into()));
            return false;
        }
    };

    for entry in entries {
        let path = entry.path();
        let is_symlink = entry
            .file_type()
            .map(|t| t.is_symlink())
            .unwrap_or(false);
        if is_symlink && flags.exclude_symlinks {
            continue;
        }
        // Follows symlinks, so sizes and kinds reflect the link target.
        let meta = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                let _ = tx.blocking_send(Err(e.into()));
                return false;
            }
        };
        if meta.is_dir() {
            // Never follow directory symlinks; cycles otherwise.
            if is_symlink {
                warn!("Omitting directory symlink {}", path.display());
                continue;
            }
            if !walk_dir(&path, tx, flags) {
                return false;
            }
        } else if tx
            .blocking_send(Ok(ExpandedItem {
                locator: Locator::File { path },
                is_container_match: true,
                size: Some(meta.len()),
            }))
            .is_err()
        {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn iterator_for(
        pairs: Vec<ExpansionPair>,
        config: &CopySessionConfig,
        reader: Option<SourceLineReader>,
    ) -> TaskIterator {
        TaskIterator::new(
            pairs,
            Arc::new(LocalExpander::new()),
            config,
            RecursionFlag::new(config.recursive),
            reader,
        )
    }

    fn pair(sources: SourceList, dst: &std::path::Path, exists: bool) -> ExpansionPair {
        ExpansionPair {
            sources,
            destination: DestinationInfo {
                locator: Locator::File {
                    path: dst.to_path_buf(),
                },
                exists_as_container: exists,
            },
        }
    }

    async fn collect(iter: &mut TaskIterator) -> Vec<CopyTask> {
        let mut tasks = Vec::new();
        while let Some(task) = iter.next_task().await {
            tasks.push(task.unwrap());
        }
        tasks
    }

    #[tokio::test]
    async fn test_single_file_yields_flat_match() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let config = CopySessionConfig::default();
        let mut iter = iterator_for(
            vec![pair(
                SourceList::Fixed(vec![SourceSpec::new(file.to_str().unwrap())]),
                dir.path(),
                true,
            )],
            &config,
            None,
        );
        let tasks = collect(&mut iter).await;
        assert_eq!(tasks.len(), 1);
        assert!(!tasks[0].is_container_match);
        assert!(!tasks[0].is_multi_source);
        assert_eq!(tasks[0].size, Some(1));
        assert!(iter.restartable());
    }

    #[tokio::test]
    async fn test_recursive_walk_marks_container_matches_in_order() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("b.txt"), b"b").unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        std::fs::write(root.join("sub/c.txt"), b"c").unwrap();

        let config = CopySessionConfig {
            recursive: true,
            ..Default::default()
        };
        let mut iter = iterator_for(
            vec![pair(
                SourceList::Fixed(vec![SourceSpec::new(root.to_str().unwrap())]),
                dir.path(),
                true,
            )],
            &config,
            None,
        );
        let tasks = collect(&mut iter).await;
        let names: Vec<String> = tasks.iter().map(|t| t.source.final_component()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert!(tasks.iter().all(|t| t.is_container_match));
        assert!(tasks
            .iter()
            .all(|t| t.spec_root == Locator::File { path: root.clone() }));
    }

    #[tokio::test]
    async fn test_directory_without_recursion_is_omitted() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();

        let config = CopySessionConfig::default();
        let mut iter = iterator_for(
            vec![pair(
                SourceList::Fixed(vec![SourceSpec::new(root.to_str().unwrap())]),
                dir.path(),
                true,
            )],
            &config,
            None,
        );
        assert!(collect(&mut iter).await.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_specs_set_multi_source() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let config = CopySessionConfig::default();
        let mut iter = iterator_for(
            vec![pair(
                SourceList::Fixed(vec![
                    SourceSpec::new(a.to_str().unwrap()),
                    SourceSpec::new(b.to_str().unwrap()),
                ]),
                dir.path(),
                true,
            )],
            &config,
            None,
        );
        let tasks = collect(&mut iter).await;
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.is_multi_source));
    }

    #[tokio::test]
    async fn test_stream_mode_reads_lines_and_is_not_restartable() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();
        let input = format!("{}\n\n{}\n", a.display(), b.display());

        let config = CopySessionConfig {
            read_sources_from_stdin: true,
            ..Default::default()
        };
        let reader: SourceLineReader = Box::new(tokio::io::BufReader::new(std::io::Cursor::new(
            input.into_bytes(),
        )));
        let mut iter = iterator_for(
            vec![pair(SourceList::Stream, dir.path(), true)],
            &config,
            Some(reader),
        );
        assert!(!iter.restartable());
        let tasks = collect(&mut iter).await;
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.is_multi_source));
    }

    #[tokio::test]
    async fn test_stream_source_yields_single_item() {
        let dir = tempdir().unwrap();
        let config = CopySessionConfig::default();
        let mut iter = iterator_for(
            vec![pair(
                SourceList::Fixed(vec![SourceSpec::new("-")]),
                &dir.path().join("out.txt"),
                false,
            )],
            &config,
            None,
        );
        let tasks = collect(&mut iter).await;
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].source.is_stream());
        assert!(!tasks[0].is_container_match);
        assert_eq!(tasks[0].size, None);
    }

    #[tokio::test]
    async fn test_move_forces_recursive_expansion() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();

        // No recursive flag, but a move still descends like `mv` does.
        let config = CopySessionConfig {
            perform_move: true,
            ..Default::default()
        };
        let mut iter = iterator_for(
            vec![pair(
                SourceList::Fixed(vec![SourceSpec::new(root.to_str().unwrap())]),
                dir.path(),
                true,
            )],
            &config,
            None,
        );
        let tasks = collect(&mut iter).await;
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_surfaces_error() {
        let dir = tempdir().unwrap();
        let config = CopySessionConfig::default();
        let mut iter = iterator_for(
            vec![pair(
                SourceList::Fixed(vec![SourceSpec::new(
                    dir.path().join("missing").to_str().unwrap(),
                )]),
                dir.path(),
                true,
            )],
            &config,
            None,
        );
        let result = iter.next_task().await.unwrap();
        assert!(matches!(result, Err(CopyError::Transfer { .. })));
    }
}
