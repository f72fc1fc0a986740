//! # Bookshelf - Audited Storage for Hierarchical Book Content
//!
//! `bookshelf` stores books (a `content/` lesson tree, a `static/` asset tree
//! and a `book.yaml`) on a pluggable storage backend and records every
//! operation in an append-only audit journal.
//!
//! - **Backend-agnostic storage** through the [`Operator`] trait
//!   (filesystem, memory, S3 behind the `s3` feature)
//! - **Audit journal** with a non-blocking, best-effort writer
//! - **Search**: glob over paths, grep over file contents
//! - **Archives**: a whole book streamed as `tar` + `zstd`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bookshelf::{AuditJournal, BookStore, MemoryOperator, MemorySink, StoreOptions};
//! use std::sync::Arc;
//!
//! # async fn example() -> bookshelf::Result<()> {
//! let journal = AuditJournal::start(Arc::new(MemorySink::new()), 1);
//! let store = BookStore::new(Arc::new(MemoryOperator::new()), journal, StoreOptions::default());
//!
//! // Books are created by their first write
//! store
//!     .write_content("ai-native-python", "content/01-Intro/README.md", "# Intro", "alice")
//!     .await?;
//!
//! let read = store
//!     .read_content("ai-native-python", "content/01-Intro/README.md", "alice")
//!     .await?;
//! assert_eq!(&read.content[..], b"# Intro");
//!
//! let lessons = store.glob("ai-native-python", "content/**/*.md", "alice").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## From Configuration
//!
//! ```rust,no_run
//! use bookshelf::{BookStore, Config};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load(Some("bookshelf.toml".as_ref()))?;
//! let store = BookStore::from_config(&config).await?;
//! let books = store.list_books("system").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod server;
pub mod store;
pub mod utils;

pub use crate::config::{Config, ConfigOverrides, StorageBackend};
pub use crate::core::audit::{
    AuditJournal, AuditRecord, AuditSink, AuditStatus, MemorySink, OperationKind, SqliteSink,
};
pub use crate::core::catalog::BookSummary;
pub use crate::core::layout::{BookId, BookPath};
pub use crate::core::operator::{Entry, FsOperator, MemoryOperator, Metadata, Operator};
#[cfg(feature = "s3")]
pub use crate::core::operator::S3Operator;
pub use crate::core::search::{GlobPattern, GrepMatch, GrepOutcome, SkipReason};
pub use crate::error::{BookshelfError, ErrorKind, Result};
pub use crate::store::{
    Asset, AssetInfo, BookArchive, BookStore, DeleteResult, ReadResult, StoreOptions, WriteMode,
    WriteResult,
};
