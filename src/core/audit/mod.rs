//! Audit journal for bookshelf operations
//!
//! Provides an append-only trail of every operation attempt with:
//! - Non-blocking `log_operation` backed by an unbounded channel
//! - Background writer task that appends through an [`AuditSink`]
//! - Bounded write concurrency (one pooled sink connection per record)
//! - Cancellation-safe scopes that still record interrupted operations
//!
//! The journal is best-effort. A failing sink is reported through `tracing`
//! and never reaches the caller of the primary operation.

mod sink;
mod sqlite;

pub use sink::{AuditSink, MemorySink};
pub use sqlite::SqliteSink;

use crate::config::Config;
use crate::error::{BookshelfError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, warn};

/// Operation types recorded in the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ListBooks,
    ReadContent,
    WriteContent,
    DeleteContent,
    ReadSummary,
    WriteSummary,
    DeleteSummary,
    UploadAsset,
    GetAsset,
    ListAssets,
    GlobSearch,
    GrepSearch,
    GetBookArchive,
    DeleteBook,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ListBooks => "list_books",
            OperationKind::ReadContent => "read_content",
            OperationKind::WriteContent => "write_content",
            OperationKind::DeleteContent => "delete_content",
            OperationKind::ReadSummary => "read_summary",
            OperationKind::WriteSummary => "write_summary",
            OperationKind::DeleteSummary => "delete_summary",
            OperationKind::UploadAsset => "upload_asset",
            OperationKind::GetAsset => "get_asset",
            OperationKind::ListAssets => "list_assets",
            OperationKind::GlobSearch => "glob_search",
            OperationKind::GrepSearch => "grep_search",
            OperationKind::GetBookArchive => "get_book_archive",
            OperationKind::DeleteBook => "delete_book",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an operation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Error => "ERROR",
        }
    }
}

/// One journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub operation: OperationKind,
    /// Operator path the operation targeted
    pub path: String,
    /// Caller on whose behalf the operation ran
    pub agent_id: String,
    pub status: AuditStatus,
    /// Wall-clock duration of the primary I/O
    pub execution_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a record stamped with the current time
    pub fn new(
        operation: OperationKind,
        path: impl Into<String>,
        agent_id: impl Into<String>,
        status: AuditStatus,
    ) -> Self {
        AuditRecord {
            operation,
            path: path.into(),
            agent_id: agent_id.into(),
            status,
            execution_time_ms: None,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_duration(mut self, execution_time_ms: u64) -> Self {
        self.execution_time_ms = Some(execution_time_ms);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

enum Command {
    Append(AuditRecord),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background audit writer
///
/// Cheap to clone; every clone feeds the same writer task.
#[derive(Clone)]
pub struct AuditJournal {
    tx: mpsc::UnboundedSender<Command>,
}

impl AuditJournal {
    /// Start the writer task on the current tokio runtime
    ///
    /// # Arguments
    /// * `sink` - Destination for records
    /// * `concurrency` - Maximum appends in flight (normally the sink's pool size)
    pub fn start(sink: Arc<dyn AuditSink>, concurrency: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(sink, concurrency.max(1), rx));
        AuditJournal { tx }
    }

    /// Append one record. Never blocks, never fails.
    pub fn log_operation(
        &self,
        operation: OperationKind,
        path: impl Into<String>,
        agent_id: impl Into<String>,
        status: AuditStatus,
        execution_time_ms: Option<u64>,
        error_message: Option<String>,
    ) {
        let mut record = AuditRecord::new(operation, path, agent_id, status);
        record.execution_time_ms = execution_time_ms;
        record.error_message = error_message;
        self.log(record);
    }

    /// Append a prepared record
    pub fn log(&self, record: AuditRecord) {
        debug!(
            "audit {} {} {} by {}",
            record.operation,
            record.status.as_str(),
            record.path,
            record.agent_id
        );
        if self.tx.send(Command::Append(record)).is_err() {
            warn!("Audit writer stopped; record dropped");
        }
    }

    /// Record an operation rejected before any I/O
    pub fn log_rejected(
        &self,
        operation: OperationKind,
        path: impl Into<String>,
        agent_id: impl Into<String>,
        error: &BookshelfError,
    ) {
        self.log_operation(
            operation,
            path,
            agent_id,
            AuditStatus::Error,
            Some(0),
            Some(error.to_string()),
        );
    }

    /// Open a timed scope for one primary operation
    pub fn scope(
        &self,
        operation: OperationKind,
        path: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> AuditScope {
        AuditScope {
            journal: self.clone(),
            operation,
            path: path.into(),
            agent_id: agent_id.into(),
            started: Instant::now(),
            finished: false,
        }
    }

    /// Wait until every record logged so far has been attempted
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_writer(
    sink: Arc<dyn AuditSink>,
    concurrency: usize,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let permits = Arc::new(Semaphore::new(concurrency));

    while let Some(command) = rx.recv().await {
        match command {
            Command::Append(record) => {
                let Ok(permit) = permits.clone().acquire_owned().await else {
                    break;
                };
                let sink = Arc::clone(&sink);
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    if let Err(e) = sink.append(&record) {
                        warn!(
                            "Audit write failed for {} {}: {}",
                            record.operation, record.path, e
                        );
                    }
                });
            }
            Command::Flush(done) => {
                // Holding every permit means no append is still running.
                if let Ok(all) = permits.acquire_many(concurrency as u32).await {
                    drop(all);
                }
                let _ = done.send(());
            }
        }
    }
    debug!("Audit writer stopped");
}

/// Timer and completion guard for one audited operation
///
/// Created after validation passes. [`AuditScope::finish`] records the
/// outcome; a scope dropped without finishing (the request task was
/// cancelled) records an `ERROR` with message `cancelled`.
pub struct AuditScope {
    journal: AuditJournal,
    operation: OperationKind,
    path: String,
    agent_id: String,
    started: Instant,
    finished: bool,
}

impl AuditScope {
    /// Milliseconds since the scope opened
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Record the outcome of the operation
    pub fn finish<T>(mut self, result: &Result<T>) {
        self.finished = true;
        let record = AuditRecord::new(
            self.operation,
            std::mem::take(&mut self.path),
            std::mem::take(&mut self.agent_id),
            if result.is_ok() {
                AuditStatus::Success
            } else {
                AuditStatus::Error
            },
        )
        .with_duration(self.elapsed_ms());
        let record = match result {
            Ok(_) => record,
            Err(e) => record.with_error(e.to_string()),
        };
        self.journal.log(record);
    }
}

impl Drop for AuditScope {
    fn drop(&mut self) {
        if !self.finished {
            let record = AuditRecord::new(
                self.operation,
                std::mem::take(&mut self.path),
                std::mem::take(&mut self.agent_id),
                AuditStatus::Error,
            )
            .with_duration(self.elapsed_ms())
            .with_error("cancelled");
            self.journal.log(record);
        }
    }
}

/// Construct the journal selected by configuration
pub fn build_journal(config: &Config) -> Result<AuditJournal> {
    let sink = SqliteSink::open(&config.database_url, config.audit_pool_size)?;
    let concurrency = sink.pool_size();
    Ok(AuditJournal::start(Arc::new(sink), concurrency))
}
