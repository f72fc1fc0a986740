//! Path escape rejection happens before any storage call

mod common;

use bookshelf::{AuditStatus, ErrorKind, OperationKind, StoreOptions};
use common::{records, store_with, TestOperator};
use proptest::prelude::*;
use std::sync::Arc;

const ESCAPES: &[&str] = &[
    "../../etc/passwd",
    "content/../../other-book/content/x.md",
    "content/01-A/../../../x.md",
    "static/..",
    "/../x",
    "content/./x.md",
    "content//x.md",
    "content\\..\\x.md",
    "content/.hidden/x.md",
    "notes/x.md",
    "",
];

#[tokio::test]
async fn test_escapes_rejected_without_operator_calls() {
    let op = Arc::new(TestOperator::new());
    let (store, sink) = store_with(op.clone(), StoreOptions::default());

    for path in ESCAPES {
        let err = store.read_content("book", path, "eve").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "path {:?}", path);

        let err = store.write_content("book", path, "x", "eve").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "path {:?}", path);

        let err = store.delete_content("book", path, "eve").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "path {:?}", path);
    }

    assert_eq!(op.calls(), 0);

    // Every rejection is still journaled, with zero duration
    let records = records(&store, &sink).await;
    assert_eq!(records.len(), ESCAPES.len() * 3);
    assert!(records
        .iter()
        .all(|r| r.status == AuditStatus::Error && r.execution_time_ms == Some(0)));
}

#[tokio::test]
async fn test_bad_book_ids_rejected() {
    let op = Arc::new(TestOperator::new());
    let (store, _) = store_with(op.clone(), StoreOptions::default());

    for book in ["", "..", ".tmp", "a/b", "books", "sp ace"] {
        let err = store
            .read_content(book, "content/x.md", "eve")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "book {:?}", book);
        assert!(store.get_book_archive_bytes(book, "eve").await.is_err());
        assert!(store.delete_book(book, "eve").await.is_err());
    }

    assert_eq!(op.calls(), 0);
}

#[tokio::test]
async fn test_bad_patterns_rejected() {
    let op = Arc::new(TestOperator::new());
    let (store, sink) = store_with(op.clone(), StoreOptions::default());

    let err = store.glob("book", "../**", "eve").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = store
        .grep("book", "(unclosed", None, None, "eve")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = store
        .upload_asset("book", "images", "../x.png", vec![1u8], "eve")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(op.calls(), 0);

    let records = records(&store, &sink).await;
    let operations: Vec<OperationKind> = records.iter().map(|r| r.operation).collect();
    assert!(operations.contains(&OperationKind::GlobSearch));
    assert!(operations.contains(&OperationKind::GrepSearch));
    assert!(operations.contains(&OperationKind::UploadAsset));
}

proptest! {
    #[test]
    fn prop_any_parent_segment_is_rejected(
        before in prop::collection::vec("[a-z0-9-]{1,8}", 0..3),
        after in prop::collection::vec("[a-z0-9-]{1,8}", 0..3),
        area in prop::sample::select(vec!["content", "static"]),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let op = Arc::new(TestOperator::new());
            let (store, _) = store_with(op.clone(), StoreOptions::default());

            let mut segments = vec![area.to_string()];
            segments.extend(before.iter().cloned());
            segments.push("..".to_string());
            segments.extend(after.iter().cloned());
            let path = segments.join("/");

            let err = store.read_content("book", &path, "prop").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert_eq!(op.calls(), 0);
        });
    }
}
