//! Line-level content search

use crate::core::operator::Operator;
use crate::error::{BookshelfError, Result};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::debug;

/// Bytes inspected when sniffing for binary content
const SNIFF_LEN: usize = 8 * 1024;

/// Compiled regex size cap
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Grep limits
#[derive(Debug, Clone, Copy)]
pub struct GrepOptions {
    /// Files larger than this are skipped without being read
    pub max_file_size: u64,
    /// Stop after this many matching lines
    pub max_results: usize,
}

impl Default for GrepOptions {
    fn default() -> Self {
        GrepOptions {
            max_file_size: 1024 * 1024,
            max_results: 1000,
        }
    }
}

/// One matching line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrepMatch {
    /// Path relative to the book root
    pub path: String,
    /// 1-based
    pub line_number: usize,
    pub line_text: String,
}

/// Why a candidate file was not searched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge { size: u64 },
    Binary,
    ReadFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

/// Grep result: always partial-tolerant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrepOutcome {
    pub matches: Vec<GrepMatch>,
    pub skipped: Vec<SkippedFile>,
    /// True if a matching line was dropped because of `max_results`
    pub truncated: bool,
    pub files_scanned: usize,
}

/// Compile a user-supplied regular expression
pub fn compile_regex(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| BookshelfError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Search `candidates` (paths relative to `root`) for lines matching `regex`
///
/// A candidate that cannot be stat'ed or read, is larger than
/// `max_file_size`, or does not look like UTF-8 text is recorded in
/// [`GrepOutcome::skipped`] and the scan moves on.
pub async fn grep(
    op: &dyn Operator,
    root: &str,
    candidates: &[String],
    regex: &Regex,
    options: GrepOptions,
) -> GrepOutcome {
    let mut outcome = GrepOutcome::default();

    for relative in candidates {
        if outcome.truncated {
            break;
        }

        let physical = format!("{}{}", root, relative);
        let skip = |reason| SkippedFile {
            path: relative.clone(),
            reason,
        };

        let size = match op.stat(&physical).await {
            Ok(meta) => meta.size,
            Err(e) => {
                outcome.skipped.push(skip(SkipReason::ReadFailed {
                    message: e.to_string(),
                }));
                continue;
            }
        };
        if size > options.max_file_size {
            outcome.skipped.push(skip(SkipReason::TooLarge { size }));
            continue;
        }

        let data = match op.read(&physical).await {
            Ok(data) => data,
            Err(e) => {
                debug!("grep skipping {}: {}", physical, e);
                outcome.skipped.push(skip(SkipReason::ReadFailed {
                    message: e.to_string(),
                }));
                continue;
            }
        };

        let text = match as_text(&data) {
            Some(text) => text,
            None => {
                outcome.skipped.push(skip(SkipReason::Binary));
                continue;
            }
        };

        outcome.files_scanned += 1;
        for (idx, line) in text.lines().enumerate() {
            if regex.is_match(line) {
                if outcome.matches.len() >= options.max_results {
                    outcome.truncated = true;
                    break;
                }
                outcome.matches.push(GrepMatch {
                    path: relative.clone(),
                    line_number: idx + 1,
                    line_text: line.to_string(),
                });
            }
        }

        tokio::task::yield_now().await;
    }

    outcome
}

/// UTF-8 text with no NUL in the leading bytes, or `None`
fn as_text(data: &[u8]) -> Option<&str> {
    let head = &data[..data.len().min(SNIFF_LEN)];
    if head.contains(&0) {
        return None;
    }
    std::str::from_utf8(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operator::MemoryOperator;
    use bytes::Bytes;

    async fn op_with(files: &[(&str, &[u8])]) -> MemoryOperator {
        let op = MemoryOperator::new();
        for (path, data) in files {
            op.write(&format!("books/a/{}", path), Bytes::copy_from_slice(data))
                .await
                .unwrap();
        }
        op
    }

    fn paths(files: &[&str]) -> Vec<String> {
        files.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_matches_are_one_based() {
        let op = op_with(&[("content/x.md", b"alpha\nbeta\nalphabet\n")]).await;
        let re = compile_regex("^alpha").unwrap();
        let outcome = grep(&op, "books/a/", &paths(&["content/x.md"]), &re, GrepOptions::default()).await;

        assert_eq!(outcome.files_scanned, 1);
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].line_number, 1);
        assert_eq!(outcome.matches[1].line_number, 3);
        assert_eq!(outcome.matches[1].line_text, "alphabet");
    }

    #[tokio::test]
    async fn test_crlf_lines() {
        let op = op_with(&[("content/x.md", b"one\r\ntwo\r\n")]).await;
        let re = compile_regex("two$").unwrap();
        let outcome = grep(&op, "books/a/", &paths(&["content/x.md"]), &re, GrepOptions::default()).await;
        assert_eq!(outcome.matches[0].line_text, "two");
    }

    #[tokio::test]
    async fn test_skips_binary_and_oversized() {
        let big = vec![b'a'; 64];
        let op = op_with(&[
            ("static/a.bin", b"ab\0cd"),
            ("static/b.txt", &big),
            ("static/c.txt", b"a"),
        ])
        .await;
        let re = compile_regex("a").unwrap();
        let options = GrepOptions {
            max_file_size: 16,
            max_results: 100,
        };
        let outcome = grep(
            &op,
            "books/a/",
            &paths(&["static/a.bin", "static/b.txt", "static/c.txt"]),
            &re,
            options,
        )
        .await;

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.skipped.len(), 2);
        assert_eq!(outcome.skipped[0].reason, SkipReason::Binary);
        assert_eq!(outcome.skipped[1].reason, SkipReason::TooLarge { size: 64 });
    }

    #[tokio::test]
    async fn test_missing_candidate_is_skipped() {
        let op = op_with(&[("content/x.md", b"hit")]).await;
        let re = compile_regex("hit").unwrap();
        let outcome = grep(
            &op,
            "books/a/",
            &paths(&["content/gone.md", "content/x.md"]),
            &re,
            GrepOptions::default(),
        )
        .await;

        assert_eq!(outcome.matches.len(), 1);
        assert!(matches!(outcome.skipped[0].reason, SkipReason::ReadFailed { .. }));
    }

    #[tokio::test]
    async fn test_truncates_at_max_results() {
        let op = op_with(&[("content/x.md", b"x\nx\nx\nx\n"), ("content/y.md", b"x\n")]).await;
        let re = compile_regex("x").unwrap();
        let options = GrepOptions {
            max_file_size: 1024,
            max_results: 3,
        };
        let outcome = grep(&op, "books/a/", &paths(&["content/x.md", "content/y.md"]), &re, options).await;

        assert_eq!(outcome.matches.len(), 3);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn test_exact_limit_is_not_truncated() {
        let op = op_with(&[("content/x.md", b"x
x
"), ("content/y.md", b"nothing
")]).await;
        let re = compile_regex("x").unwrap();
        let options = GrepOptions {
            max_file_size: 1024,
            max_results: 2,
        };
        let outcome = grep(&op, "books/a/", &paths(&["content/x.md", "content/y.md"]), &re, options).await;

        assert_eq!(outcome.matches.len(), 2);
        assert!(!outcome.truncated);
        assert_eq!(outcome.files_scanned, 2);
    }

    #[test]
    fn test_invalid_regex() {
        let err = compile_regex("(unclosed").unwrap_err();
        assert!(matches!(err, BookshelfError::InvalidPattern { .. }));
    }
}
