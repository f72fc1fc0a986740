//! Book catalog
//!
//! The catalog is the `books/` directory itself: every visible
//! subdirectory is a book. Discovery costs one listing per call, which the
//! optional [`CatalogCache`] can absorb for a bounded time.

use crate::core::layout::BOOKS_DIR;
use crate::core::operator::Operator;
use crate::error::Result;
use futures::TryStreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// One discovered book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub book_id: String,
    /// Scheme of the operator the book lives on
    pub storage_backend: String,
}

/// List the books under `books/`, sorted by id
///
/// Only directories count. Hidden names (leading `.`) and a nested `books`
/// directory are ignored.
pub async fn discover_books(op: &dyn Operator) -> Result<Vec<BookSummary>> {
    let mut entries = op.list(&format!("{}/", BOOKS_DIR)).await?;
    let mut books = Vec::new();

    while let Some(entry) = entries.try_next().await? {
        let name = entry.name();
        if !entry.is_dir() || name.starts_with('.') || name == BOOKS_DIR {
            continue;
        }
        books.push(BookSummary {
            book_id: name.to_string(),
            storage_backend: op.scheme().to_string(),
        });
    }

    books.sort_by(|a, b| a.book_id.cmp(&b.book_id));
    debug!("Discovered {} books", books.len());
    Ok(books)
}

/// Time-bounded cache of the last discovery result
///
/// A zero TTL disables caching entirely. Each invalidation bumps a
/// generation, and a result discovered under an older generation is never
/// stored.
#[derive(Debug)]
pub struct CatalogCache {
    ttl: Duration,
    generation: AtomicU64,
    entry: Mutex<Option<(Instant, Vec<BookSummary>)>>,
}

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        CatalogCache {
            ttl,
            generation: AtomicU64::new(0),
            entry: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Cached books, if present and fresh
    pub fn get(&self) -> Option<Vec<BookSummary>> {
        if !self.is_enabled() {
            return None;
        }
        let entry = self.entry.lock();
        match entry.as_ref() {
            Some((stored, books)) if stored.elapsed() < self.ttl => Some(books.clone()),
            _ => None,
        }
    }

    /// Read before discovery starts and hand back to [`put`](Self::put)
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Store `books` unless an invalidation happened since `generation`
    pub fn put(&self, generation: u64, books: &[BookSummary]) {
        if !self.is_enabled() {
            return;
        }
        let mut entry = self.entry.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("Discarding catalog discovered before an invalidation");
            return;
        }
        *entry = Some((Instant::now(), books.to_vec()));
    }

    /// Drop the cached result; called after every successful mutation
    pub fn invalidate(&self) {
        let mut entry = self.entry.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entry.take();
    }
}
