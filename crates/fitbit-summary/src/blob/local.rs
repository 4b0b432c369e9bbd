//! Directory-backed bucket for offline runs

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::BlobStore;
use crate::error::{Result, SummaryError};

/// A bucket mirrored on the local filesystem
///
/// Object paths are `/`-separated and relative to `root/<bucket>`, so a tree
/// downloaded from storage can be ingested unchanged.
pub struct LocalBlobStore {
    bucket: String,
    bucket_dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let bucket_dir = root.as_ref().join(&bucket);
        Self { bucket, bucket_dir }
    }

    /// Directory holding the bucket's objects
    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    /// Resolve an object path, rejecting anything that escapes the bucket
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(SummaryError::invalid_param(format!(
                "invalid object path '{}'",
                path
            )));
        }
        Ok(self.bucket_dir.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        if !self.bucket_dir.is_dir() {
            return Err(SummaryError::NotFound(format!(
                "bucket directory {}",
                self.bucket_dir.display()
            )));
        }

        let bucket_dir = self.bucket_dir.clone();
        let mut files = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            collect_files(&bucket_dir, "", &mut files).map(|_| files)
        })
        .await
        .map_err(|e| SummaryError::Other(format!("directory walk failed: {}", e)))??;

        let prefix = prefix.trim_start_matches('/');
        files.retain(|p| p.starts_with(prefix));
        files.sort();
        files.truncate(limit);
        Ok(files)
    }

    async fn download(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SummaryError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Recursively collect file paths relative to the bucket directory
fn collect_files(dir: &Path, relative: &str, out: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = super::join_path(relative, &name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_files(&entry.path(), &rel, out)?;
        } else if file_type.is_file() {
            out.push(rel);
        }
    }
    Ok(())
}
