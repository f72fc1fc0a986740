//! In-memory operator
//!
//! Directories are implicit: a directory exists while at least one file lives
//! beneath it.

use super::{check_relative, dir_prefix, Entry, EntryStream, Metadata, Operator};
use crate::error::{BookshelfError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct MemoryOperator {
    files: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn has_children(files: &BTreeMap<String, Bytes>, dir: &str) -> bool {
        files
            .range(dir.to_string()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(dir))
    }
}

#[async_trait]
impl Operator for MemoryOperator {
    fn scheme(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        check_relative(path)?;
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| BookshelfError::NotFound {
                path: path.to_string(),
            })
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        check_relative(path)?;
        if path.is_empty() || path.ends_with('/') {
            return Err(BookshelfError::invalid_path(path, "cannot write to a directory"));
        }
        self.files.write().insert(path.to_string(), data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        check_relative(path)?;
        let dir = dir_prefix(path);
        let mut files = self.files.write();
        files.remove(path.trim_end_matches('/'));
        if !dir.is_empty() {
            files.retain(|key, _| !key.starts_with(&dir));
        } else {
            files.clear();
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        check_relative(path)?;
        let files = self.files.read();
        if !path.ends_with('/') {
            if let Some(data) = files.get(path) {
                return Ok(Metadata {
                    size: data.len() as u64,
                    is_dir: false,
                });
            }
        }

        let dir = dir_prefix(path);
        if dir.is_empty() || Self::has_children(&files, &dir) {
            Ok(Metadata {
                size: 0,
                is_dir: true,
            })
        } else {
            Err(BookshelfError::NotFound {
                path: path.to_string(),
            })
        }
    }

    async fn list(&self, prefix: &str) -> Result<EntryStream> {
        check_relative(prefix)?;
        let dir = dir_prefix(prefix);
        let files = self.files.read();

        let mut children = BTreeSet::new();
        for key in files.range(dir.clone()..).map(|(k, _)| k) {
            let Some(rest) = key.strip_prefix(&dir) else {
                break;
            };
            let entry = match rest.split_once('/') {
                Some((child, _)) => Entry::dir(format!("{}{}", dir, child)),
                None => Entry::file(key.clone()),
            };
            children.insert(entry.path().to_string());
        }

        let entries: Vec<Result<Entry>> = children
            .into_iter()
            .map(|path| {
                Ok(if path.ends_with('/') {
                    Entry::dir(path)
                } else {
                    Entry::file(path)
                })
            })
            .collect();
        Ok(stream::iter(entries).boxed())
    }
}
