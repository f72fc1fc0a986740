//! Audited operation surface
//!
//! [`BookStore`] is the one entry point callers use. Every public method is
//! one audited operation:
//!
//! 1. Arguments are validated synchronously. A rejection is journaled with a
//!    zero duration and returned without touching storage.
//! 2. An [`AuditScope`](crate::core::audit::AuditScope) starts the timer.
//! 3. The operation runs against the shared [`Operator`].
//! 4. The scope records the outcome. If the calling task is dropped first,
//!    the scope records the attempt as cancelled.
//!
//! Composite operations (glob, grep, archive) journal once for the whole
//! call, never for their internal reads.

use crate::config::Config;
use crate::core::archive::{self, ArchiveStream};
use crate::core::audit::{build_journal, AuditJournal, OperationKind};
use crate::core::catalog::{discover_books, BookSummary, CatalogCache};
use crate::core::layout::{validate_segment, BookId, BookPath, BOOKS_DIR, STATIC_DIR};
use crate::core::operator::{build_operator, Operator};
use crate::core::search::{
    self, compile_regex, GlobPattern, GrepOptions, GrepOutcome, DEFAULT_GREP_FILTER,
};
use crate::error::{BookshelfError, Result};
use crate::utils::{file_hash, guess_content_type};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use mime::Mime;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Limits applied by the store
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    pub grep: GrepOptions,
    /// How long a `list_books` result may be reused; zero disables the cache
    pub catalog_cache_ttl: Duration,
}

/// Whether a write created the file or replaced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    /// Path relative to the book root
    pub path: String,
    pub content: Bytes,
    pub size: u64,
    /// Hex SHA-256 of `content`
    pub file_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub path: String,
    pub size: u64,
    pub file_hash: String,
    pub mode: WriteMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    pub path: String,
    /// False when the path was already absent
    pub existed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetInfo {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: String,
    pub content: Bytes,
    pub content_type: Mime,
    pub size: u64,
}

/// A streaming book archive
pub struct BookArchive {
    /// Suggested file name, `{book_id}.tar.zst`
    pub name: String,
    pub stream: ArchiveStream,
}

/// Audited access to books on one storage backend
pub struct BookStore {
    operator: Arc<dyn Operator>,
    journal: AuditJournal,
    options: StoreOptions,
    catalog: CatalogCache,
}

impl BookStore {
    pub fn new(operator: Arc<dyn Operator>, journal: AuditJournal, options: StoreOptions) -> Self {
        BookStore {
            catalog: CatalogCache::new(options.catalog_cache_ttl),
            operator,
            journal,
            options,
        }
    }

    /// Build the operator and journal selected by `config`
    ///
    /// Must run inside a tokio runtime; the journal spawns its writer task.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let operator = build_operator(config).await?;
        let journal = build_journal(config)?;
        info!(
            "Book store ready (backend={}, audit={})",
            operator.scheme(),
            config.database_url
        );
        Ok(Self::new(operator, journal, config.store_options()))
    }

    pub fn operator(&self) -> &Arc<dyn Operator> {
        &self.operator
    }

    pub fn journal(&self) -> &AuditJournal {
        &self.journal
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Journal a validation failure, passing the result through
    fn validated<T>(
        &self,
        operation: OperationKind,
        raw_path: impl FnOnce() -> String,
        agent_id: &str,
        result: Result<T>,
    ) -> Result<T> {
        if let Err(e) = &result {
            debug!("{} rejected: {}", operation, e);
            self.journal
                .log_rejected(operation, raw_path(), agent_id, e);
        }
        result
    }

    /// Run `fut` inside a timed audit scope
    async fn audited<T, F>(
        &self,
        operation: OperationKind,
        path: String,
        agent_id: &str,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let scope = self.journal.scope(operation, path, agent_id);
        let result = fut.await;
        scope.finish(&result);
        result
    }

    fn parse_book(&self, operation: OperationKind, book_id: &str, agent_id: &str) -> Result<BookId> {
        self.validated(
            operation,
            || format!("{}/{}/", BOOKS_DIR, book_id),
            agent_id,
            BookId::new(book_id),
        )
    }

    fn parse_path(
        &self,
        operation: OperationKind,
        book_id: &str,
        path: &str,
        agent_id: &str,
    ) -> Result<BookPath> {
        let parsed = BookId::new(book_id).and_then(|book| BookPath::parse(&book, path));
        self.validated(
            operation,
            || format!("{}/{}/{}", BOOKS_DIR, book_id, path),
            agent_id,
            parsed,
        )
    }

    fn parse_summary(
        &self,
        operation: OperationKind,
        book_id: &str,
        lesson_path: &str,
        agent_id: &str,
    ) -> Result<BookPath> {
        let parsed = BookId::new(book_id)
            .and_then(|book| BookPath::parse(&book, lesson_path))
            .and_then(|lesson| lesson.summary());
        self.validated(
            operation,
            || format!("{}/{}/{}", BOOKS_DIR, book_id, lesson_path),
            agent_id,
            parsed,
        )
    }

    async fn read_at(&self, path: &BookPath) -> Result<ReadResult> {
        let content = self.operator.read(&path.physical()).await?;
        Ok(ReadResult {
            path: path.relative().to_string(),
            size: content.len() as u64,
            file_hash: file_hash(&content),
            content,
        })
    }

    async fn write_at(&self, path: &BookPath, content: Bytes) -> Result<WriteResult> {
        let physical = path.physical();
        let mode = if self.operator.exists(&physical).await? {
            WriteMode::Updated
        } else {
            WriteMode::Created
        };
        let size = content.len() as u64;
        let hash = file_hash(&content);
        self.operator.write(&physical, content).await?;
        self.catalog.invalidate();
        Ok(WriteResult {
            path: path.relative().to_string(),
            size,
            file_hash: hash,
            mode,
        })
    }

    async fn delete_at(&self, path: &BookPath) -> Result<DeleteResult> {
        let physical = path.physical();
        let existed = self.operator.exists(&physical).await?;
        self.operator.delete(&physical).await?;
        self.catalog.invalidate();
        Ok(DeleteResult {
            path: path.relative().to_string(),
            existed,
        })
    }

    /// Books currently present under `books/`
    pub async fn list_books(&self, agent_id: &str) -> Result<Vec<BookSummary>> {
        self.audited(
            OperationKind::ListBooks,
            format!("{}/", BOOKS_DIR),
            agent_id,
            async {
                if let Some(books) = self.catalog.get() {
                    return Ok(books);
                }
                let generation = self.catalog.generation();
                let books = discover_books(self.operator.as_ref()).await?;
                self.catalog.put(generation, &books);
                Ok(books)
            },
        )
        .await
    }

    /// Read a file under `content/`, `static/`, or `book.yaml`
    pub async fn read_content(&self, book_id: &str, path: &str, agent_id: &str) -> Result<ReadResult> {
        let op = OperationKind::ReadContent;
        let path = self.parse_path(op, book_id, path, agent_id)?;
        self.audited(op, path.physical(), agent_id, self.read_at(&path))
            .await
    }

    /// Create or overwrite a file. Never touches a lesson's summary.
    pub async fn write_content(
        &self,
        book_id: &str,
        path: &str,
        content: impl Into<Bytes>,
        agent_id: &str,
    ) -> Result<WriteResult> {
        let op = OperationKind::WriteContent;
        let path = self.parse_path(op, book_id, path, agent_id)?;
        self.audited(op, path.physical(), agent_id, self.write_at(&path, content.into()))
            .await
    }

    /// Delete a file or directory. Deleting an absent path succeeds.
    pub async fn delete_content(&self, book_id: &str, path: &str, agent_id: &str) -> Result<DeleteResult> {
        let op = OperationKind::DeleteContent;
        let path = self.parse_path(op, book_id, path, agent_id)?;
        self.audited(op, path.physical(), agent_id, self.delete_at(&path))
            .await
    }

    /// Read the summary sidecar of a lesson
    pub async fn read_summary(
        &self,
        book_id: &str,
        lesson_path: &str,
        agent_id: &str,
    ) -> Result<ReadResult> {
        let op = OperationKind::ReadSummary;
        let path = self.parse_summary(op, book_id, lesson_path, agent_id)?;
        self.audited(op, path.physical(), agent_id, self.read_at(&path))
            .await
    }

    pub async fn write_summary(
        &self,
        book_id: &str,
        lesson_path: &str,
        content: impl Into<Bytes>,
        agent_id: &str,
    ) -> Result<WriteResult> {
        let op = OperationKind::WriteSummary;
        let path = self.parse_summary(op, book_id, lesson_path, agent_id)?;
        self.audited(op, path.physical(), agent_id, self.write_at(&path, content.into()))
            .await
    }

    pub async fn delete_summary(
        &self,
        book_id: &str,
        lesson_path: &str,
        agent_id: &str,
    ) -> Result<DeleteResult> {
        let op = OperationKind::DeleteSummary;
        let path = self.parse_summary(op, book_id, lesson_path, agent_id)?;
        self.audited(op, path.physical(), agent_id, self.delete_at(&path))
            .await
    }

    /// Store `static/{asset_type}/{filename}`
    pub async fn upload_asset(
        &self,
        book_id: &str,
        asset_type: &str,
        filename: &str,
        data: impl Into<Bytes>,
        agent_id: &str,
    ) -> Result<WriteResult> {
        let op = OperationKind::UploadAsset;
        let parsed = BookId::new(book_id).and_then(|book| BookPath::asset(&book, asset_type, filename));
        let path = self.validated(
            op,
            || format!("{}/{}/{}/{}/{}", BOOKS_DIR, book_id, STATIC_DIR, asset_type, filename),
            agent_id,
            parsed,
        )?;
        self.audited(op, path.physical(), agent_id, self.write_at(&path, data.into()))
            .await
    }

    /// Fetch `static/{asset_type}/{filename}` with a guessed content type
    pub async fn get_asset(
        &self,
        book_id: &str,
        asset_type: &str,
        filename: &str,
        agent_id: &str,
    ) -> Result<Asset> {
        let op = OperationKind::GetAsset;
        let parsed = BookId::new(book_id).and_then(|book| BookPath::asset(&book, asset_type, filename));
        let path = self.validated(
            op,
            || format!("{}/{}/{}/{}/{}", BOOKS_DIR, book_id, STATIC_DIR, asset_type, filename),
            agent_id,
            parsed,
        )?;
        self.audited(op, path.physical(), agent_id, async {
            let content = self.operator.read(&path.physical()).await?;
            Ok(Asset {
                path: path.relative().to_string(),
                content_type: guess_content_type(path.relative()),
                size: content.len() as u64,
                content,
            })
        })
        .await
    }

    /// Files under `static/` (or `static/{asset_type}/`), sorted by path
    pub async fn list_assets(
        &self,
        book_id: &str,
        asset_type: Option<&str>,
        agent_id: &str,
    ) -> Result<Vec<AssetInfo>> {
        let op = OperationKind::ListAssets;
        let start = match asset_type {
            Some(kind) => format!("{}/{}/", STATIC_DIR, kind),
            None => format!("{}/", STATIC_DIR),
        };
        let parsed = BookId::new(book_id).and_then(|book| {
            if let Some(kind) = asset_type {
                validate_segment(kind)
                    .map_err(|reason| BookshelfError::invalid_path(kind, reason))?;
            }
            Ok(book)
        });
        let book = self.validated(
            op,
            || format!("{}/{}/{}", BOOKS_DIR, book_id, start),
            agent_id,
            parsed,
        )?;

        let root = book.root();
        self.audited(op, format!("{}{}", root, start), agent_id, async {
            let mut files = search::walk_files(self.operator.as_ref(), &root, &start).await?;
            files.sort();
            let mut assets = Vec::with_capacity(files.len());
            for path in files {
                let meta = self.operator.stat(&format!("{}{}", root, path)).await?;
                assets.push(AssetInfo {
                    path,
                    size: meta.size,
                });
            }
            Ok(assets)
        })
        .await
    }

    /// Book-relative paths matching a glob, sorted
    pub async fn glob(&self, book_id: &str, pattern: &str, agent_id: &str) -> Result<Vec<String>> {
        let op = OperationKind::GlobSearch;
        let parsed = BookId::new(book_id)
            .and_then(|book| GlobPattern::new(pattern).map(|pattern| (book, pattern)));
        let (book, pattern) = self.validated(
            op,
            || format!("{}/{}/{}", BOOKS_DIR, book_id, pattern),
            agent_id,
            parsed,
        )?;

        self.audited(
            op,
            format!("{}{}", book.root(), pattern),
            agent_id,
            search::glob(self.operator.as_ref(), &book, &pattern),
        )
        .await
    }

    /// Lines matching `pattern` in files selected by `glob_filter`
    ///
    /// `max_results` may lower, never raise, the configured limit.
    pub async fn grep(
        &self,
        book_id: &str,
        pattern: &str,
        glob_filter: Option<&str>,
        max_results: Option<usize>,
        agent_id: &str,
    ) -> Result<GrepOutcome> {
        let op = OperationKind::GrepSearch;
        let filter = glob_filter.unwrap_or(DEFAULT_GREP_FILTER);
        let parsed = BookId::new(book_id).and_then(|book| {
            let regex = compile_regex(pattern)?;
            let files = GlobPattern::new(filter)?;
            Ok((book, regex, files))
        });
        let (book, regex, files) = self.validated(
            op,
            || format!("{}/{}/{}", BOOKS_DIR, book_id, filter),
            agent_id,
            parsed,
        )?;

        let mut options = self.options.grep;
        if let Some(limit) = max_results {
            options.max_results = options.max_results.min(limit.max(1));
        }

        self.audited(op, format!("{}{}", book.root(), filter), agent_id, async {
            let candidates = search::glob(self.operator.as_ref(), &book, &files).await?;
            let outcome =
                search::grep(self.operator.as_ref(), &book.root(), &candidates, &regex, options)
                    .await;
            if !outcome.skipped.is_empty() {
                debug!(
                    "grep in {} skipped {} of {} files",
                    book,
                    outcome.skipped.len(),
                    candidates.len()
                );
            }
            Ok(outcome)
        })
        .await
    }

    /// Stream the whole book as `tar` + `zstd`
    ///
    /// Fails with `NotFound` before streaming if the book does not exist.
    /// Once streaming starts, a failed read ends the stream with an `Err`
    /// item; the journal entry is written when the stream completes, fails,
    /// or is dropped by the consumer.
    pub async fn get_book_archive(&self, book_id: &str, agent_id: &str) -> Result<BookArchive> {
        let op = OperationKind::GetBookArchive;
        let book = self.parse_book(op, book_id, agent_id)?;
        let root = book.root();
        let scope = self.journal.scope(op, root.clone(), agent_id);

        let prepared: Result<Vec<String>> = async {
            if !self.operator.exists(&root).await? {
                return Err(BookshelfError::NotFound { path: root.clone() });
            }
            let everything = GlobPattern::new(DEFAULT_GREP_FILTER)?;
            search::glob(self.operator.as_ref(), &book, &everything).await
        }
        .await;
        let files = match prepared {
            Ok(files) => files,
            Err(e) => {
                let failed = Err(e);
                scope.finish::<BookArchive>(&failed);
                return failed;
            }
        };

        let (mut tx, stream) = ArchiveStream::channel();
        let operator = Arc::clone(&self.operator);
        tokio::spawn(async move {
            let result = archive::produce(operator.as_ref(), &root, &files, &mut tx).await;
            if let Err(e) = &result {
                if !matches!(e, BookshelfError::Cancelled) {
                    let _ = tx.send(Err(BookshelfError::Archive(e.to_string()))).await;
                }
            }
            scope.finish(&result);
        });

        Ok(BookArchive {
            name: archive::archive_name(book.as_str()),
            stream,
        })
    }

    /// Whole archive in memory
    pub async fn get_book_archive_bytes(&self, book_id: &str, agent_id: &str) -> Result<Vec<u8>> {
        let mut archive = self.get_book_archive(book_id, agent_id).await?;
        let mut bytes = Vec::new();
        while let Some(chunk) = archive.stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes)
    }

    /// Remove a book and everything under it
    pub async fn delete_book(&self, book_id: &str, agent_id: &str) -> Result<DeleteResult> {
        let op = OperationKind::DeleteBook;
        let book = self.parse_book(op, book_id, agent_id)?;
        let root = BookPath::root(&book);
        self.audited(op, root.physical(), agent_id, async {
            let mut result = self.delete_at(&root).await?;
            result.path = book.as_str().to_string();
            Ok(result)
        })
        .await
    }
}
