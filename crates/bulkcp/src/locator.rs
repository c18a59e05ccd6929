//! Locator model: normalized paths and storage-object references.
//!
//! A [`Locator`] is either a cloud object reference (`scheme://bucket/object`,
//! optionally pinned to a generation with `#N`), a local filesystem path, or
//! the process standard stream (`-`).

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A normalized path or storage-object identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locator {
    /// Cloud object reference.
    Cloud {
        /// Provider scheme, e.g. `gs` or `s3`.
        scheme: String,
        /// Bucket name; empty for a provider-only reference.
        bucket: String,
        /// Object name; empty for a bucket reference.
        object: String,
        /// Pinned object generation, if any.
        generation: Option<u64>,
    },
    /// Local filesystem path.
    File { path: PathBuf },
    /// Standard input/output stream (`-`).
    Stream,
}

impl Locator {
    /// Parse a raw locator string.
    pub fn parse(raw: &str) -> Self {
        if raw == "-" {
            return Locator::Stream;
        }
        if let Some((scheme, rest)) = raw.split_once("://") {
            let (rest, generation) = match rest.rsplit_once('#') {
                Some((head, gen)) => match gen.parse::<u64>() {
                    Ok(g) => (head, Some(g)),
                    Err(_) => (rest, None),
                },
                None => (rest, None),
            };
            let (bucket, object) = match rest.split_once('/') {
                Some((b, o)) => (b.to_string(), o.to_string()),
                None => (rest.to_string(), String::new()),
            };
            return Locator::Cloud {
                scheme: scheme.to_string(),
                bucket,
                object,
                generation,
            };
        }
        Locator::File {
            path: PathBuf::from(raw),
        }
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self, Locator::Cloud { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Locator::File { .. })
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Locator::Stream)
    }

    /// Provider-only reference: a cloud URL with no bucket component.
    pub fn is_provider_only(&self) -> bool {
        matches!(self, Locator::Cloud { bucket, .. } if bucket.is_empty())
    }

    /// Cloud bucket reference with no object component.
    pub fn is_bucket(&self) -> bool {
        matches!(
            self,
            Locator::Cloud { bucket, object, .. } if !bucket.is_empty() && object.is_empty()
        )
    }

    /// Synthetic zero-byte marker object representing an empty container
    /// (object name ending in `/`).
    pub fn is_container_placeholder(&self) -> bool {
        matches!(
            self,
            Locator::Cloud { object, .. } if !object.is_empty() && object.ends_with('/')
        )
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            Locator::Cloud { generation, .. } => *generation,
            _ => None,
        }
    }

    /// Provider scheme for cloud locators, `"file"` otherwise.
    pub fn scheme(&self) -> &str {
        match self {
            Locator::Cloud { scheme, .. } => scheme,
            Locator::File { .. } => "file",
            Locator::Stream => "file",
        }
    }

    /// Final path component of the object or file name.
    pub fn final_component(&self) -> String {
        match self {
            Locator::Cloud { object, .. } => object
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string(),
            Locator::File { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Locator::Stream => String::new(),
        }
    }

    /// Append a relative path (always `/`-delimited) to this locator.
    pub fn join(&self, rel: &str) -> Locator {
        match self {
            Locator::Cloud {
                scheme,
                bucket,
                object,
                ..
            } => {
                let object = if object.is_empty() {
                    rel.to_string()
                } else {
                    format!("{}/{}", object.trim_end_matches('/'), rel)
                };
                Locator::Cloud {
                    scheme: scheme.clone(),
                    bucket: bucket.clone(),
                    object,
                    generation: None,
                }
            }
            Locator::File { path } => {
                let mut joined = path.clone();
                for part in rel.split('/') {
                    joined.push(part);
                }
                Locator::File { path: joined }
            }
            Locator::Stream => Locator::Stream,
        }
    }

    /// Path of `self` relative to `root`, `/`-delimited. Returns `None` when
    /// `self` does not sit under `root`.
    pub fn relative_to(&self, root: &Locator) -> Option<String> {
        match (self, root) {
            (
                Locator::Cloud {
                    scheme: s1,
                    bucket: b1,
                    object: o1,
                    ..
                },
                Locator::Cloud {
                    scheme: s2,
                    bucket: b2,
                    object: o2,
                    ..
                },
            ) => {
                if s1 != s2 || b1 != b2 {
                    return None;
                }
                let prefix = o2.trim_end_matches('/');
                if prefix.is_empty() {
                    return Some(o1.clone());
                }
                // The prefix must end on a `/` boundary: `root` does not
                // contain `rootx/y`.
                let rest = o1.strip_prefix(prefix)?;
                if rest.is_empty() {
                    Some(String::new())
                } else if let Some(rest) = rest.strip_prefix('/') {
                    Some(rest.to_string())
                } else {
                    None
                }
            }
            (Locator::File { path }, Locator::File { path: root }) => path
                .strip_prefix(root)
                .ok()
                .map(|rest| {
                    rest.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                }),
            _ => None,
        }
    }

    /// Local path for file locators.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Locator::File { path } => Some(path.as_path()),
            _ => None,
        }
    }

    /// Canonical textual form, used for manifest keys and the self-copy guard.
    pub fn url_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Cloud {
                scheme,
                bucket,
                object,
                generation,
            } => {
                write!(f, "{}://{}", scheme, bucket)?;
                if !object.is_empty() {
                    write!(f, "/{}", object)?;
                }
                if let Some(g) = generation {
                    write!(f, "#{}", g)?;
                }
                Ok(())
            }
            Locator::File { path } => write!(f, "{}", path.display()),
            Locator::Stream => write!(f, "-"),
        }
    }
}
