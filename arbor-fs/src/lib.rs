//! Local filesystem adapter: directories as a hierarchical [`Source`]
//! whose children are their entries.

use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use arbor_cache::{ArborError, Node, NodeMetadata, Result, Source};

/// What a directory entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsNodeKind {
    Directory,
    File,
    Symlink,
    Other,
}

/// A filesystem path as a cacheable node.
///
/// The identifier is the normalized path string ('/'-separated, no
/// trailing separator except for the root), so the same directory keys
/// identically however it was spelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsNode {
    identifier: String,
    kind: FsNodeKind,
}

impl FsNode {
    /// Probe `path` and build a node of the discovered kind.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = fs::symlink_metadata(path)
            .await
            .map_err(|error| fetch_error(&path.to_string_lossy(), &error))?;
        let kind = if meta.is_dir() {
            FsNodeKind::Directory
        } else if meta.is_file() {
            FsNodeKind::File
        } else if meta.file_type().is_symlink() {
            FsNodeKind::Symlink
        } else {
            FsNodeKind::Other
        };
        Ok(Self {
            identifier: normalize_path(path),
            kind,
        })
    }

    /// Build a directory node without touching the filesystem.
    pub fn directory(path: impl AsRef<Path>) -> Self {
        Self {
            identifier: normalize_path(path.as_ref()),
            kind: FsNodeKind::Directory,
        }
    }

    pub fn kind(&self) -> FsNodeKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FsNodeKind::Directory
    }

    /// The normalized path string.
    pub fn path(&self) -> &str {
        &self.identifier
    }
}

#[async_trait]
impl Node for FsNode {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn metadata(&self) -> Result<NodeMetadata> {
        let meta = fs::metadata(&self.identifier)
            .await
            .map_err(|error| fetch_error(&self.identifier, &error))?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs_f64());
        Ok(NodeMetadata {
            modified,
            size: Some(meta.len()),
        })
    }
}

/// Filesystem [`Source`]: enumerating a directory node lists its
/// entries; files and other non-directories have no children.
#[derive(Debug, Default, Clone)]
pub struct FsSource;

impl FsSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Source for FsSource {
    type Node = FsNode;

    async fn children(&self, node: &FsNode) -> Result<Vec<FsNode>> {
        if !node.is_dir() {
            return Ok(Vec::new());
        }

        let mut reader = fs::read_dir(node.path())
            .await
            .map_err(|error| fetch_error(node.path(), &error))?;
        let mut children = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|error| fetch_error(node.path(), &error))?
        {
            let kind = match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => FsNodeKind::Directory,
                Ok(file_type) if file_type.is_file() => FsNodeKind::File,
                Ok(file_type) if file_type.is_symlink() => FsNodeKind::Symlink,
                Ok(_) => FsNodeKind::Other,
                Err(error) => {
                    warn!("Unreadable entry type under {}: {}", node.path(), error);
                    FsNodeKind::Other
                }
            };
            children.push(FsNode {
                identifier: normalize_path(&entry.path()),
                kind,
            });
        }
        // Directory iteration order is platform-defined; keep it stable.
        children.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        debug!("Enumerated {} entries under {}", children.len(), node.path());
        Ok(children)
    }
}

/// Canonical path string: '/'-separated, no trailing separator except
/// for the root itself.
fn normalize_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    if raw.len() > 1 {
        let trimmed = raw.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        raw
    }
}

fn fetch_error(target: &str, error: &io::Error) -> ArborError {
    ArborError::fetch(target, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/b/")), "/a/b");
        assert_eq!(normalize_path(Path::new("/a/b")), "/a/b");
        assert_eq!(normalize_path(Path::new("/")), "/");
    }

    #[tokio::test]
    async fn test_from_path_detects_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("f.txt");
        tokio::fs::write(&file_path, b"data").await.unwrap();

        let dir_node = FsNode::from_path(dir.path()).await.unwrap();
        assert!(dir_node.is_dir());

        let file_node = FsNode::from_path(&file_path).await.unwrap();
        assert_eq!(file_node.kind(), FsNodeKind::File);
        assert!(!file_node.is_dir());
    }

    #[tokio::test]
    async fn test_missing_path_is_an_error() {
        let err = FsNode::from_path("/definitely/not/here").await.unwrap_err();
        assert!(matches!(err, ArborError::SourceFetch { .. }));
    }
}
