//! Session configuration types.
//!
//! A [`CopySessionConfig`] is built once from raw flags, checked by
//! [`super::validate`], and treated as read-only by every component after
//! that. No field is mutated past validation; the one run-time policy shift
//! (a move of a container match forcing recursion on) lives in the executor,
//! not here.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Immutable per-invocation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopySessionConfig {
    /// Descend into containers (directories, bucket prefixes).
    pub recursive: bool,

    /// Copy all object versions, not just the live one.
    pub all_versions: bool,

    /// Never replace an existing destination item.
    pub no_clobber: bool,

    /// Keep going after per-item failures; fail the run at the end.
    pub continue_on_error: bool,

    /// Route remote-to-remote copies through the local process.
    pub daisy_chain: bool,

    /// Read source locators one per line from an external stream.
    pub read_sources_from_stdin: bool,

    /// Print the version-specific result locator of each copied object.
    pub print_result_url: bool,

    /// Durable manifest ledger path; `Some` enables manifest/resume mode.
    pub manifest_path: Option<PathBuf>,

    /// Preserve source ACLs on cloud-to-cloud copies.
    pub preserve_acl: bool,

    /// Canned ACL applied to written objects.
    pub canned_acl: Option<String>,

    /// Preserve POSIX metadata (uid/gid/mode/times).
    pub preserve_posix: bool,

    /// Storage class for written cloud objects.
    pub dest_storage_class: Option<String>,

    /// Wire-gzip (transport encoding) extension list.
    pub gzip_wire_exts: Option<Vec<String>>,

    /// Wire-gzip for all files regardless of extension.
    pub gzip_wire_all: bool,

    /// Local-gzip (content encoding) extension list.
    pub gzip_local_exts: Option<Vec<String>>,

    /// Local-gzip for all files regardless of extension.
    pub gzip_local_all: bool,

    /// Skip objects with unsupported types instead of failing.
    pub skip_unsupported: bool,

    /// Perform a move: copy, then delete the source.
    pub perform_move: bool,

    /// Do not follow or copy symbolic links.
    pub exclude_symlinks: bool,

    /// Worker pool size; values above 1 enable parallel execution.
    pub workers: usize,
}

impl Default for CopySessionConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            all_versions: false,
            no_clobber: false,
            continue_on_error: false,
            daisy_chain: false,
            read_sources_from_stdin: false,
            print_result_url: false,
            manifest_path: None,
            preserve_acl: false,
            canned_acl: None,
            preserve_posix: false,
            dest_storage_class: None,
            gzip_wire_exts: None,
            gzip_wire_all: false,
            gzip_local_exts: None,
            gzip_local_all: false,
            skip_unsupported: false,
            perform_move: false,
            exclude_symlinks: false,
            workers: 1,
        }
    }
}

impl CopySessionConfig {
    /// Parallel execution requested.
    pub fn parallel(&self) -> bool {
        self.workers > 1
    }

    /// Manifest/resume mode enabled.
    pub fn use_manifest(&self) -> bool {
        self.manifest_path.is_some()
    }

    /// Collapsed gzip policy, valid only after [`super::validate`].
    pub fn gzip_policy(&self) -> Option<GzipPolicy> {
        let (mode, exts, all) = if self.gzip_wire_all || self.gzip_wire_exts.is_some() {
            (GzipMode::Wire, self.gzip_wire_exts.clone(), self.gzip_wire_all)
        } else if self.gzip_local_all || self.gzip_local_exts.is_some() {
            (
                GzipMode::Local,
                self.gzip_local_exts.clone(),
                self.gzip_local_all,
            )
        } else {
            return None;
        };
        let scope = if all {
            GzipScope::AllFiles
        } else {
            GzipScope::Extensions(exts.unwrap_or_default())
        };
        Some(GzipPolicy { mode, scope })
    }
}

/// How compressed bytes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GzipMode {
    /// Compress on the wire only; stored bytes stay uncompressed.
    Wire,
    /// Compress before upload; stored bytes are compressed.
    Local,
}

/// Which files a gzip mode applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GzipScope {
    Extensions(Vec<String>),
    AllFiles,
}

/// Validated gzip policy handed to the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GzipPolicy {
    pub mode: GzipMode,
    pub scope: GzipScope,
}

impl GzipPolicy {
    /// Whether this policy applies to a file with the given name.
    pub fn applies_to(&self, name: &str) -> bool {
        match &self.scope {
            GzipScope::AllFiles => true,
            GzipScope::Extensions(exts) => name
                .rsplit_once('.')
                .map(|(_, ext)| exts.iter().any(|e| e == ext))
                .unwrap_or(false),
        }
    }
}
