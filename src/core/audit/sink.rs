//! Audit sink trait and the in-memory sink

use super::AuditRecord;
use crate::error::{BookshelfError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Durable destination for audit records
///
/// `append` is blocking and is always called from a blocking-capable thread.
pub trait AuditSink: Send + Sync + 'static {
    fn append(&self, record: &AuditRecord) -> Result<()>;
}

/// Sink that keeps records in memory
///
/// Can be switched into a failing mode to exercise the swallow path.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
    failures: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every appended record, in append order
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Make subsequent appends fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of appends rejected while failing
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl AuditSink for MemorySink {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(BookshelfError::Audit("memory sink is failing".to_string()));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }
}
