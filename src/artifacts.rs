//! Artifact repository
//!
//! The tracking core only records where a run's artifacts live; the bytes
//! are handled by an [`ArtifactRepository`]. The local realization stores
//! files under a root directory.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::entities::FileInfo;
use crate::error::{Result, TrackingError};
use crate::validation::normalize_path;

#[async_trait]
pub trait ArtifactRepository: Send + Sync + 'static {
    /// Copy a local file or directory into the repository, under
    /// `artifact_path` when given
    async fn put(&self, local_path: &Path, artifact_path: Option<&str>) -> Result<()>;

    /// Direct children of `path` (the root when `None`), sorted by path
    async fn list(&self, path: Option<&str>) -> Result<Vec<FileInfo>>;
}

/// Repository rooted in a local directory
#[derive(Debug, Clone)]
pub struct LocalArtifactRepository {
    root: PathBuf,
}

impl LocalArtifactRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build from an artifact URI: a plain path or a `file://` URI.
    ///
    /// Returns `None` for remote schemes (`s3://`, `hdfs://`, ...).
    pub fn from_uri(uri: &str) -> Option<Self> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Some(Self::new(path));
        }
        if uri.contains("://") {
            return None;
        }
        Some(Self::new(uri))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the repository root lies under the local location `base`,
    /// compared lexically without touching the filesystem
    pub fn is_within(&self, base: &str) -> bool {
        let root = normalize_path(&self.root.to_string_lossy());
        let base = normalize_path(base.strip_prefix("file://").unwrap_or(base));

        if root == ".." || root.starts_with("../") {
            return false;
        }
        if base == "." {
            return !root.starts_with('/');
        }
        Path::new(&root).starts_with(&base)
    }

    /// Resolve a repository-relative path, rejecting anything that would
    /// leave the root
    fn resolve(&self, relative: Option<&str>) -> Result<PathBuf> {
        let Some(relative) = relative.filter(|p| !p.is_empty()) else {
            return Ok(self.root.clone());
        };

        let mut resolved = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(TrackingError::invalid_parameter(format!(
                        "Invalid artifact path '{}': must be relative and stay inside the artifact root",
                        relative
                    )))
                }
            }
        }
        Ok(resolved)
    }

    fn relative_display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Recursive copy with tokio fs; directories are walked iteratively
async fn copy_recursive(source: &Path, destination: &Path) -> Result<()> {
    let mut pending = vec![(source.to_path_buf(), destination.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        let metadata = tokio::fs::metadata(&from).await?;
        if metadata.is_dir() {
            tokio::fs::create_dir_all(&to).await?;
            let mut entries = tokio::fs::read_dir(&from).await?;
            while let Some(entry) = entries.next_entry().await? {
                pending.push((entry.path(), to.join(entry.file_name())));
            }
        } else {
            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&from, &to).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl ArtifactRepository for LocalArtifactRepository {
    async fn put(&self, local_path: &Path, artifact_path: Option<&str>) -> Result<()> {
        let metadata = match tokio::fs::metadata(local_path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TrackingError::invalid_parameter(format!(
                    "Local artifact path '{}' does not exist",
                    local_path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let target_dir = self.resolve(artifact_path)?;
        let destination = if metadata.is_dir() {
            target_dir
        } else {
            let Some(file_name) = local_path.file_name() else {
                return Err(TrackingError::invalid_parameter(format!(
                    "Local artifact path '{}' has no file name",
                    local_path.display()
                )));
            };
            target_dir.join(file_name)
        };

        copy_recursive(local_path, &destination).await?;

        tracing::debug!(
            source = %local_path.display(),
            destination = %destination.display(),
            "Artifact stored"
        );
        Ok(())
    }

    async fn list(&self, path: Option<&str>) -> Result<Vec<FileInfo>> {
        let directory = self.resolve(path)?;

        match tokio::fs::metadata(&directory).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }

        let mut entries = tokio::fs::read_dir(&directory).await?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            files.push(FileInfo {
                path: self.relative_display(&entry.path()),
                is_dir: metadata.is_dir(),
                file_size: if metadata.is_dir() {
                    None
                } else {
                    Some(metadata.len())
                },
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}
