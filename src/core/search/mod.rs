//! Search over a book tree
//!
//! Both searches re-scan storage on every call; there is no index.
//! - [`glob`] walks the tree through [`Operator::list`], pruning hidden
//!   entries, and matches book-relative paths against a [`GlobPattern`]
//! - [`grep`] reads the files selected by a glob and matches lines against
//!   a regular expression, skipping oversized, binary, or unreadable files

mod grep;
mod pattern;

pub use grep::{compile_regex, grep, GrepMatch, GrepOptions, GrepOutcome, SkipReason, SkippedFile};
pub use pattern::GlobPattern;

use crate::core::layout::BookId;
use crate::core::operator::Operator;
use crate::error::Result;
use futures::TryStreamExt;

/// Pattern used when grep is given no file filter
pub const DEFAULT_GREP_FILTER: &str = "**/*";

/// Collect every file below `start`, as paths relative to `root`
///
/// `root` is an operator directory path ending in `/`; `start` is a
/// directory relative to it (`""` for the root itself). Entries whose name
/// starts with `.` are skipped along with everything beneath them.
pub async fn walk_files(op: &dyn Operator, root: &str, start: &str) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![format!("{}{}", root, start)];

    while let Some(dir) = pending.pop() {
        let mut entries = op.list(&dir).await?;
        while let Some(entry) = entries.try_next().await? {
            if entry.name().starts_with('.') {
                continue;
            }
            if entry.is_dir() {
                pending.push(entry.path().to_string());
            } else if let Some(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_string());
            }
        }
    }

    Ok(files)
}

/// Book-relative paths matching `pattern`, sorted lexicographically
///
/// Backend listing order is never trusted, so the same tree always yields
/// the same sequence.
pub async fn glob(op: &dyn Operator, book: &BookId, pattern: &GlobPattern) -> Result<Vec<String>> {
    let mut matches: Vec<String> = walk_files(op, &book.root(), &pattern.base_dir())
        .await?
        .into_iter()
        .filter(|path| pattern.matches(path))
        .collect();
    matches.sort();
    matches.dedup();
    Ok(matches)
}
