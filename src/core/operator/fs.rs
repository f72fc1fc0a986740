//! Local filesystem operator

use super::{check_relative, dir_prefix, Entry, EntryStream, Metadata, Operator};
use crate::error::{BookshelfError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Operator over a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsOperator {
    root: PathBuf,
}

impl FsOperator {
    /// Wrap an existing root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsOperator { root: root.into() }
    }

    /// Create the root directory if needed and wrap it
    pub async fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .await
            .map_err(|e| BookshelfError::backend(root.display().to_string(), e))?;
        Ok(FsOperator::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        check_relative(path)?;
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(trimmed))
        }
    }

    /// Resolve symlinks and refuse anything that lands outside the root
    async fn confine(&self, path: &str, full: &Path) -> Result<PathBuf> {
        let real = fs::canonicalize(full)
            .await
            .map_err(|e| BookshelfError::from_io(path, e))?;
        let root = fs::canonicalize(&self.root)
            .await
            .map_err(|e| BookshelfError::backend(path, e))?;
        if !real.starts_with(&root) {
            return Err(BookshelfError::invalid_path(
                path,
                "resolves outside the storage root",
            ));
        }
        Ok(real)
    }
}

#[async_trait]
impl Operator for FsOperator {
    fn scheme(&self) -> &'static str {
        "fs"
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path)?;
        debug!("fs read {}", path);
        let real = self.confine(path, &full).await?;

        // A directory has no content, same as on the object backends
        let meta = fs::metadata(&real)
            .await
            .map_err(|e| BookshelfError::from_io(path, e))?;
        if meta.is_dir() {
            return Err(BookshelfError::NotFound {
                path: path.to_string(),
            });
        }
        let data = fs::read(&real)
            .await
            .map_err(|e| BookshelfError::from_io(path, e))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let full = self.resolve(path)?;
        if path.ends_with('/') {
            return Err(BookshelfError::invalid_path(path, "cannot write to a directory"));
        }
        debug!("fs write {} ({} bytes)", path, data.len());

        let parent = full
            .parent()
            .ok_or_else(|| BookshelfError::invalid_path(path, "no parent directory"))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|e| BookshelfError::backend(path, e))?;

        // Stage next to the target under a hidden name, then rename into place
        // so readers never observe a partially written file.
        let file_name = full
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BookshelfError::invalid_path(path, "no file name"))?;
        let staging = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
        if let Err(e) = fs::write(&staging, &data).await {
            let _ = fs::remove_file(&staging).await;
            return Err(BookshelfError::backend(path, e));
        }
        if let Err(e) = fs::rename(&staging, &full).await {
            let _ = fs::remove_file(&staging).await;
            return Err(BookshelfError::backend(path, e));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        debug!("fs delete {}", path);
        let meta = match fs::symlink_metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(BookshelfError::backend(path, e)),
        };

        let result = if meta.is_dir() {
            fs::remove_dir_all(&full).await
        } else {
            fs::remove_file(&full).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BookshelfError::backend(path, e)),
        }
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let full = self.resolve(path)?;
        let real = self.confine(path, &full).await?;
        let meta = fs::metadata(&real)
            .await
            .map_err(|e| BookshelfError::from_io(path, e))?;
        Ok(Metadata {
            size: if meta.is_dir() { 0 } else { meta.len() },
            is_dir: meta.is_dir(),
        })
    }

    async fn list(&self, prefix: &str) -> Result<EntryStream> {
        let full = self.resolve(prefix)?;
        let prefix = dir_prefix(prefix);
        debug!("fs list {}", prefix);

        let read_dir = match fs::read_dir(&full).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(stream::empty().boxed()),
            Err(e) => return Err(BookshelfError::backend(prefix, e)),
        };

        let entries = stream::try_unfold(read_dir, move |mut read_dir| {
            let prefix = prefix.clone();
            async move {
                let next = read_dir
                    .next_entry()
                    .await
                    .map_err(|e| BookshelfError::backend(prefix.clone(), e))?;
                let Some(dir_entry) = next else {
                    return Ok(None);
                };

                let name = dir_entry.file_name().to_string_lossy().into_owned();
                let is_dir = dir_entry
                    .file_type()
                    .await
                    .map(|t| t.is_dir())
                    .map_err(|e| BookshelfError::backend(format!("{}{}", prefix, name), e))?;
                let path = format!("{}{}", prefix, name);
                let entry = if is_dir {
                    Entry::dir(path)
                } else {
                    Entry::file(path)
                };
                Ok(Some((entry, read_dir)))
            }
        });

        Ok(entries.boxed())
    }
}
