//! SQLite audit store
//!
//! Records land in the `audit_log` table. Connections live in a fixed pool
//! handed out through a bounded channel: each append takes one connection,
//! commits a single insert, and hands it back.

use super::{AuditRecord, AuditSink};
use crate::error::{BookshelfError, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use rusqlite::{params, Connection};
use std::time::Duration;
use tracing::info;

/// Schema applied on open
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audit_log (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp         TEXT    NOT NULL,
    operation         TEXT    NOT NULL,
    path              TEXT    NOT NULL,
    agent_id          TEXT    NOT NULL,
    status            TEXT    NOT NULL,
    execution_time_ms INTEGER,
    error_message     TEXT
);
CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log (timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_log_path ON audit_log (path);
";

/// Value of `database_url` that selects a private in-memory database
pub const IN_MEMORY: &str = ":memory:";

pub struct SqliteSink {
    checkout: Receiver<Connection>,
    checkin: Sender<Connection>,
    pool_size: usize,
}

impl SqliteSink {
    /// Open (or create) the audit database
    ///
    /// An in-memory database is private to its connection, so the pool is
    /// clamped to one connection in that case.
    pub fn open(database_url: &str, pool_size: usize) -> Result<Self> {
        let in_memory = database_url == IN_MEMORY;
        let pool_size = if in_memory { 1 } else { pool_size.max(1) };

        if !in_memory {
            if let Some(parent) = std::path::Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let (checkin, checkout) = bounded(pool_size);
        for i in 0..pool_size {
            let conn = Self::connect(database_url)?;
            if i == 0 {
                conn.execute_batch(SCHEMA).map_err(audit_error)?;
            }
            checkin
                .send(conn)
                .map_err(|_| BookshelfError::Audit("connection pool closed".to_string()))?;
        }

        info!(
            "Audit store opened at {} ({} connections)",
            database_url, pool_size
        );
        Ok(SqliteSink {
            checkout,
            checkin,
            pool_size,
        })
    }

    fn connect(database_url: &str) -> Result<Connection> {
        let conn = Connection::open(database_url).map_err(audit_error)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(audit_error)?;
        if database_url != IN_MEMORY {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
                .map_err(audit_error)?;
        }
        Ok(conn)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl AuditSink for SqliteSink {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        let conn = self
            .checkout
            .recv()
            .map_err(|_| BookshelfError::Audit("connection pool closed".to_string()))?;

        let result = conn.execute(
            "INSERT INTO audit_log
                (timestamp, operation, path, agent_id, status, execution_time_ms, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.timestamp.to_rfc3339(),
                record.operation.as_str(),
                record.path,
                record.agent_id,
                record.status.as_str(),
                record.execution_time_ms.map(|ms| ms as i64),
                record.error_message,
            ],
        );

        // Return the connection before reporting the outcome
        let _ = self.checkin.send(conn);
        result.map(|_| ()).map_err(audit_error)
    }
}

fn audit_error(err: rusqlite::Error) -> BookshelfError {
    BookshelfError::Audit(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::{AuditStatus, OperationKind};

    fn count_rows(path: &std::path::Path) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_append_persists_rows() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = temp_dir.path().join("audit.db");
        let sink = SqliteSink::open(db.to_str().unwrap(), 2).unwrap();

        let record = AuditRecord::new(
            OperationKind::WriteContent,
            "books/a/content/x.md",
            "alice",
            AuditStatus::Success,
        )
        .with_duration(3);
        sink.append(&record).unwrap();
        sink.append(&record).unwrap();

        assert_eq!(count_rows(&db), 2);
    }

    #[test]
    fn test_columns_round_trip() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = temp_dir.path().join("nested/dir/audit.db");
        let sink = SqliteSink::open(db.to_str().unwrap(), 1).unwrap();

        let record = AuditRecord::new(
            OperationKind::ReadContent,
            "books/a/content/missing.md",
            "bob",
            AuditStatus::Error,
        )
        .with_error("Not found: books/a/content/missing.md");
        sink.append(&record).unwrap();

        let conn = Connection::open(&db).unwrap();
        let (operation, status, ms, message): (String, String, Option<i64>, Option<String>) = conn
            .query_row(
                "SELECT operation, status, execution_time_ms, error_message FROM audit_log",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(operation, "read_content");
        assert_eq!(status, "ERROR");
        assert_eq!(ms, None);
        assert!(message.unwrap().contains("missing.md"));
    }

    #[test]
    fn test_in_memory_clamps_pool() {
        let sink = SqliteSink::open(IN_MEMORY, 8).unwrap();
        assert_eq!(sink.pool_size(), 1);

        let record = AuditRecord::new(
            OperationKind::ListBooks,
            "books/",
            "system",
            AuditStatus::Success,
        );
        sink.append(&record).unwrap();
    }

    #[test]
    fn test_concurrent_appends() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = temp_dir.path().join("audit.db");
        let sink = std::sync::Arc::new(SqliteSink::open(db.to_str().unwrap(), 4).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|thread_id| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let record = AuditRecord::new(
                            OperationKind::ReadContent,
                            format!("books/t{}/content/{}.md", thread_id, i),
                            "agent",
                            AuditStatus::Success,
                        );
                        sink.append(&record).unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(count_rows(&db), 100);
    }
}
