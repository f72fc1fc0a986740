//! Object storage operator (S3 and S3-compatible endpoints)
//!
//! Keys map one-to-one onto operator paths. Directories do not exist as
//! objects; listing uses the `/` delimiter and reports common prefixes as
//! directory entries.

use super::{check_relative, dir_prefix, Entry, EntryStream, Metadata, Operator};
use crate::error::{BookshelfError, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

/// Operator backed by one S3 bucket
#[derive(Debug, Clone)]
pub struct S3Operator {
    client: Client,
    bucket: String,
}

/// Continuation state for paginated listings
enum Page {
    First,
    Next(String),
    Done,
}

impl S3Operator {
    /// Wrap an already configured client
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        S3Operator {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the ambient AWS configuration
    ///
    /// `endpoint` selects an S3-compatible service; path-style addressing is
    /// used so that local endpoints work without DNS tricks.
    pub async fn connect(bucket: String, endpoint: Option<String>, region: String) -> Self {
        info!("Connecting to bucket {} (region {})", bucket, region);
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region));
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();
        S3Operator::new(Client::from_conf(conf), bucket)
    }

    /// Every key under `dir`, recursively
    async fn keys_under(&self, dir: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(dir)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| BookshelfError::backend(dir, e))?;
            keys.extend(resp.contents().iter().filter_map(|o| o.key().map(String::from)));
            match resp.next_continuation_token() {
                Some(next) if resp.is_truncated().unwrap_or(false) => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl Operator for S3Operator {
    fn scheme(&self) -> &'static str {
        "s3"
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        check_relative(path)?;
        debug!("s3 read {}", path);
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    BookshelfError::NotFound {
                        path: path.to_string(),
                    }
                } else {
                    BookshelfError::backend(path, e)
                }
            })?;
        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| BookshelfError::backend(path, e))?;
        Ok(body.into_bytes())
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        check_relative(path)?;
        if path.is_empty() || path.ends_with('/') {
            return Err(BookshelfError::invalid_path(path, "cannot write to a directory"));
        }
        debug!("s3 write {} ({} bytes)", path, data.len());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| BookshelfError::backend(path, e))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        check_relative(path)?;
        debug!("s3 delete {}", path);
        let key = path.trim_end_matches('/');
        if !key.is_empty() {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| BookshelfError::backend(path, e))?;
        }

        let dir = dir_prefix(path);
        for child in self.keys_under(&dir).await? {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&child)
                .send()
                .await
                .map_err(|e| BookshelfError::backend(child.clone(), e))?;
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        check_relative(path)?;
        if !path.ends_with('/') {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(path)
                .send()
                .await
            {
                Ok(head) => {
                    return Ok(Metadata {
                        size: head.content_length().unwrap_or(0).max(0) as u64,
                        is_dir: false,
                    })
                }
                Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {}
                Err(e) => return Err(BookshelfError::backend(path, e)),
            }
        }

        let dir = dir_prefix(path);
        let probe = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&dir)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| BookshelfError::backend(path, e))?;
        if dir.is_empty() || !probe.contents().is_empty() {
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
        debug!("s3 list {}", dir);
        let client = self.client.clone();
        let bucket = self.bucket.clone();

        let pages = stream::try_unfold(Page::First, move |page| {
            let client = client.clone();
            let bucket = bucket.clone();
            let dir = dir.clone();
            async move {
                let token = match page {
                    Page::Done => return Ok(None),
                    Page::First => None,
                    Page::Next(token) => Some(token),
                };
                let resp = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(&dir)
                    .delimiter("/")
                    .set_continuation_token(token)
                    .send()
                    .await
                    .map_err(|e| BookshelfError::backend(dir.clone(), e))?;

                let mut entries: Vec<Result<Entry>> = resp
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix())
                    .map(|p| Ok(Entry::dir(p)))
                    .collect();
                entries.extend(
                    resp.contents()
                        .iter()
                        .filter_map(|o| o.key())
                        .filter(|key| *key != dir)
                        .map(|key| Ok(Entry::file(key))),
                );

                let next = match resp.next_continuation_token() {
                    Some(token) if resp.is_truncated().unwrap_or(false) => {
                        Page::Next(token.to_string())
                    }
                    _ => Page::Done,
                };
                Ok::<_, BookshelfError>(Some((stream::iter(entries), next)))
            }
        });

        Ok(pages.try_flatten().boxed())
    }
}
