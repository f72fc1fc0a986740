//! Streaming book archives

mod common;

use bookshelf::core::archive::{unpack, CONTENT_TYPE};
use bookshelf::{AuditStatus, BookshelfError, ErrorKind, FsOperator, OperationKind, StoreOptions};
use common::{records, seed_book, store_with, TestOperator, SAMPLE_BOOK};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_archive_contains_exactly_the_book() {
    let temp_dir = TempDir::new().unwrap();
    let op = FsOperator::create(temp_dir.path()).await.unwrap();
    let (store, _) = store_with(Arc::new(op), StoreOptions::default());
    seed_book(&store, "sample").await;
    seed_book(&store, "neighbour").await;

    let archive = store.get_book_archive_bytes("sample", "r").await.unwrap();
    let files = unpack(&archive).unwrap();

    assert_eq!(files.len(), SAMPLE_BOOK.len());
    for (path, data) in SAMPLE_BOOK {
        assert_eq!(files.get(*path).map(Vec::as_slice), Some(*data), "{}", path);
    }
    assert_eq!(CONTENT_TYPE, "application/zstd");
}

#[tokio::test]
async fn test_archive_name_and_chunks() {
    let op = Arc::new(TestOperator::new());
    let (store, _) = store_with(op, StoreOptions::default());
    seed_book(&store, "sample").await;

    let mut archive = store.get_book_archive("sample", "r").await.unwrap();
    assert_eq!(archive.name, "sample.tar.zst");

    let mut chunks = 0;
    let mut bytes = Vec::new();
    while let Some(chunk) = archive.stream.next().await {
        bytes.extend_from_slice(&chunk.unwrap());
        chunks += 1;
    }
    assert!(chunks >= 1);
    assert_eq!(unpack(&bytes).unwrap().len(), SAMPLE_BOOK.len());
}

#[tokio::test]
async fn test_archive_is_reproducible() {
    let op = Arc::new(TestOperator::new());
    let (store, _) = store_with(op.clone(), StoreOptions::default());
    seed_book(&store, "sample").await;

    let first = store.get_book_archive_bytes("sample", "r").await.unwrap();
    op.reverse_listing(true);
    let second = store.get_book_archive_bytes("sample", "r").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_book_fails_before_streaming() {
    let op = Arc::new(TestOperator::new());
    let (store, sink) = store_with(op, StoreOptions::default());

    let err = store.get_book_archive("ghost", "r").await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let records = records(&store, &sink).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].operation, OperationKind::GetBookArchive);
    assert_eq!(records[0].status, AuditStatus::Error);
}

#[tokio::test]
async fn test_read_failure_aborts_the_stream() {
    let op = Arc::new(TestOperator::new());
    let (store, sink) = store_with(op.clone(), StoreOptions::default());
    seed_book(&store, "sample").await;
    op.fail_read("books/sample/content/02-Core/README.md");

    let mut archive = store.get_book_archive("sample", "r").await.unwrap();
    let mut items = Vec::new();
    while let Some(item) = archive.stream.next().await {
        items.push(item);
    }

    // The stream ends with exactly one error and nothing after it
    let last = items.pop().unwrap();
    assert!(matches!(last, Err(BookshelfError::Archive(_))));
    assert!(items.iter().all(|item| item.is_ok()));

    let records = records(&store, &sink).await;
    let archived = records
        .iter()
        .find(|r| r.operation == OperationKind::GetBookArchive)
        .unwrap();
    assert_eq!(archived.status, AuditStatus::Error);
    assert!(archived
        .error_message
        .as_deref()
        .unwrap()
        .contains("injected read failure"));
}

#[tokio::test]
async fn test_dropped_stream_is_recorded_as_cancelled() {
    let op = Arc::new(TestOperator::new());
    let (store, sink) = store_with(op, StoreOptions::default());
    seed_book(&store, "sample").await;

    let archive = store.get_book_archive("sample", "r").await.unwrap();
    drop(archive);

    // The producer notices on its next send
    let mut archived = None;
    for _ in 0..50 {
        let records = records(&store, &sink).await;
        archived = records
            .into_iter()
            .find(|r| r.operation == OperationKind::GetBookArchive);
        if archived.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let archived = archived.unwrap();
    assert_eq!(archived.status, AuditStatus::Error);
    assert!(archived.error_message.is_some());
}
