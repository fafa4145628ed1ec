// src/file_store.rs
//
// FileSystemObjectStore implementation for POSIX file I/O
// This provides the same ObjectStore interface for local filesystem operations

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::object_store::ObjectStore;
use crate::uri_utils::file_uri_to_path;

/// FileSystem adapter that implements ObjectStore for local files.
///
/// URI Mapping:
/// - `file:///absolute/path/to/file` -> `/absolute/path/to/file`
/// - `file://./relative/path/to/file` -> `./relative/path/to/file`
#[derive(Debug, Clone, Default)]
pub struct FileSystemObjectStore;

impl FileSystemObjectStore {
    pub fn new() -> Self {
        Self
    }

    /// Recursively collect files from a directory
    async fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let mut entries = fs::read_dir(&current)
                .await
                .with_context(|| format!("Failed to read directory {}", current.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let ty = entry.file_type().await?;
                if ty.is_dir() {
                    stack.push(path);
                } else if ty.is_file() {
                    files.push(path);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FileSystemObjectStore {
    async fn get(&self, uri: &str) -> Result<Bytes> {
        let path = file_uri_to_path(uri)?;
        let data = fs::read(&path)
            .await
            .with_context(|| format!("Failed to read file {}", path.display()))?;
        Ok(Bytes::from(data))
    }

    async fn list(&self, uri_prefix: &str) -> Result<Vec<String>> {
        let path = file_uri_to_path(uri_prefix)?;
        if !path.exists() {
            bail!("Path does not exist: {}", path.display());
        }
        let mut files = Vec::new();
        if path.is_file() {
            files.push(path);
        } else {
            Self::collect_files(&path, &mut files).await?;
        }
        files.sort(); // Ensure consistent ordering
        Ok(files
            .into_iter()
            .map(|p| format!("file://{}", p.display()))
            .collect())
    }
}
