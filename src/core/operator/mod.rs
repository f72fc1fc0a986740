//! Storage operator abstraction
//!
//! An [`Operator`] is the uniform capability set every storage backend offers:
//! read, write, delete, exists, stat and list over opaque relative paths.
//! Callers never know which backend they are talking to; the concrete
//! implementation is picked once at startup by [`build_operator`].
//!
//! Paths are `/`-separated and relative to the backend root. Directory paths
//! end with `/`. Listing is one level deep and returns a lazy stream whose
//! order is backend-defined.

mod fs;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use fs::FsOperator;
pub use memory::MemoryOperator;
#[cfg(feature = "s3")]
pub use s3::S3Operator;

use crate::config::{Config, StorageBackend};
use crate::error::{BookshelfError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::info;

/// Lazy, non-restartable sequence of listing entries
pub type EntryStream = BoxStream<'static, Result<Entry>>;

/// One listing entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    path: String,
}

impl Entry {
    /// Create an entry for a file
    pub fn file(path: impl Into<String>) -> Self {
        Entry { path: path.into() }
    }

    /// Create an entry for a directory; a trailing `/` is added if missing
    pub fn dir(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        Entry { path }
    }

    /// Full operator path. Directories carry a trailing `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Last path segment without the directory marker
    pub fn name(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }
}

/// Result of [`Operator::stat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub size: u64,
    pub is_dir: bool,
}

/// Backend-agnostic storage capability set
///
/// Implementations are shared immutably across every concurrent request, so
/// all methods take `&self`.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Short backend name (`fs`, `memory`, `s3`)
    fn scheme(&self) -> &'static str;

    /// Read a whole file. Fails with `NotFound` if absent.
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write a whole file, creating parents as needed. Last writer wins.
    async fn write(&self, path: &str, data: Bytes) -> Result<()>;

    /// Delete a file or a directory tree. Deleting an absent path succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Size and kind of a path. Fails with `NotFound` if absent.
    async fn stat(&self, path: &str) -> Result<Metadata>;

    /// Immediate children of a directory. An absent directory lists empty.
    async fn list(&self, prefix: &str) -> Result<EntryStream>;

    async fn exists(&self, path: &str) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(BookshelfError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Normalize a listing prefix to `""` or `"dir/"`
pub(crate) fn dir_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Reject operator paths that could leave the backend root
pub(crate) fn check_relative(path: &str) -> Result<()> {
    if path.starts_with('/') || path.contains('\\') || path.contains('\0') {
        return Err(BookshelfError::invalid_path(path, "not a relative path"));
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(BookshelfError::invalid_path(path, "parent traversal"));
    }
    Ok(())
}

/// Construct the operator selected by configuration
pub async fn build_operator(config: &Config) -> Result<Arc<dyn Operator>> {
    let operator: Arc<dyn Operator> = match config.storage_backend {
        StorageBackend::Fs => Arc::new(FsOperator::create(&config.storage_root).await?),
        StorageBackend::Memory => Arc::new(MemoryOperator::new()),
        #[cfg(feature = "s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| BookshelfError::Config("s3 backend requires s3_bucket".into()))?;
            Arc::new(
                S3Operator::connect(bucket, config.s3_endpoint.clone(), config.s3_region.clone())
                    .await,
            )
        }
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => {
            return Err(BookshelfError::Config(
                "s3 backend requires building with the `s3` feature".into(),
            ))
        }
    };

    info!("Storage operator initialized: {}", operator.scheme());
    Ok(operator)
}
