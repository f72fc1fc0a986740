//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bookshelf::core::operator::{EntryStream, Metadata};
use bookshelf::{
    AuditJournal, AuditRecord, BookStore, BookshelfError, MemoryOperator, MemorySink, Operator,
    Result, StoreOptions,
};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Memory operator with call counting, fault injection, and listing shuffles
#[derive(Default)]
pub struct TestOperator {
    inner: MemoryOperator,
    calls: AtomicUsize,
    failing_reads: Mutex<HashSet<String>>,
    stalled_reads: Mutex<HashSet<String>>,
    fail_writes: AtomicBool,
    reverse_listing: AtomicBool,
    list_gate: Mutex<Option<(String, Arc<ListGate>)>>,
}

/// Holds one listing open after it has snapshotted its entries
#[derive(Default)]
pub struct ListGate {
    entered: Notify,
    released: Notify,
}

impl ListGate {
    /// Wait until the gated listing has taken its snapshot
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the gated listing return
    pub fn release(&self) {
        self.released.notify_one();
    }
}

impl TestOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total operator calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Reads of `path` fail with a backend error
    pub fn fail_read(&self, path: &str) {
        self.failing_reads.lock().insert(path.to_string());
    }

    /// Reads of `path` never complete
    pub fn stall_read(&self, path: &str) {
        self.stalled_reads.lock().insert(path.to_string());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Return listings in reverse order
    pub fn reverse_listing(&self, reverse: bool) {
        self.reverse_listing.store(reverse, Ordering::SeqCst);
    }

    /// Hold the next listing of `prefix` until the returned gate is released
    pub fn gate_list(&self, prefix: &str) -> Arc<ListGate> {
        let gate = Arc::new(ListGate::default());
        *self.list_gate.lock() = Some((prefix.to_string(), gate.clone()));
        gate
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Operator for TestOperator {
    fn scheme(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.tick();
        let stalled = self.stalled_reads.lock().contains(path);
        if stalled {
            futures::future::pending::<()>().await;
        }
        let failing = self.failing_reads.lock().contains(path);
        if failing {
            return Err(BookshelfError::backend(path, "injected read failure"));
        }
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        self.tick();
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BookshelfError::backend(path, "injected write failure"));
        }
        self.inner.write(path, data).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.tick();
        self.inner.delete(path).await
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        self.tick();
        self.inner.stat(path).await
    }

    async fn list(&self, prefix: &str) -> Result<EntryStream> {
        self.tick();
        let entries = self.inner.list(prefix).await?;
        let gate = {
            let mut slot = self.list_gate.lock();
            let gated = matches!(slot.as_ref(), Some((gated, _)) if gated == prefix);
            if gated {
                slot.take().map(|(_, gate)| gate)
            } else {
                None
            }
        };
        let reverse = self.reverse_listing.load(Ordering::SeqCst);
        if gate.is_none() && !reverse {
            return Ok(entries);
        }

        let mut collected: Vec<_> = entries.try_collect().await?;
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.released.notified().await;
        }
        if reverse {
            collected.reverse();
        }
        Ok(stream::iter(collected.into_iter().map(Ok)).boxed())
    }
}

/// Store over `op` with an in-memory journal
pub fn store_with(op: Arc<dyn Operator>, options: StoreOptions) -> (BookStore, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let journal = AuditJournal::start(sink.clone(), 2);
    (BookStore::new(op, journal, options), sink)
}

pub fn memory_store() -> (BookStore, Arc<MemorySink>) {
    store_with(Arc::new(MemoryOperator::new()), StoreOptions::default())
}

/// Flush the journal and return every record written so far
pub async fn records(store: &BookStore, sink: &MemorySink) -> Vec<AuditRecord> {
    store.journal().flush().await;
    sink.records()
}

/// A small but complete book
pub const SAMPLE_BOOK: &[(&str, &[u8])] = &[
    ("book.yaml", b"book_id: sample\ntitle: Sample Book\n"),
    ("content/01-Intro/README.md", b"# Intro\n"),
    ("content/01-Intro/01-Setup/README.md", b"# Setup\n"),
    (
        "content/01-Intro/01-Setup/01-install.md",
        b"# Install\nRun the installer.\nThen verify.\n",
    ),
    (
        "content/01-Intro/01-Setup/01-install.summary.md",
        b"Install and verify.\n",
    ),
    ("content/02-Core/README.md", b"# Core\nThe core ideas.\n"),
    ("static/images/logo.png", &[0x89, b'P', b'N', b'G', 0, 0, 1]),
    ("static/slides/intro.pdf", b"%PDF-1.4 fake"),
];

pub async fn seed_book(store: &BookStore, book_id: &str) {
    for (path, data) in SAMPLE_BOOK {
        store
            .write_content(book_id, path, Bytes::from_static(*data), "seed")
            .await
            .unwrap();
    }
}
