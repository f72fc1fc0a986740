//! Glob patterns over book-relative paths
//!
//! Supports wildcards:
//! - `*` - Matches any run of characters within one path segment (e.g., `content/*/README.md`, `*.md`)
//! - `?` - Matches exactly one character within a path segment
//! - `**` - Matches any number of path segments recursively (e.g., `content/**`)

use crate::error::{BookshelfError, Result};
use regex::Regex;
use std::fmt;

/// One compiled pattern segment
#[derive(Debug, Clone)]
enum Segment {
    /// `**`
    AnyDepth,
    /// No wildcard characters
    Literal(String),
    /// `*` or `?` somewhere inside the segment
    Wildcard(Regex),
}

/// Compiled glob pattern
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    segments: Vec<Segment>,
}

impl GlobPattern {
    /// Compile a pattern
    ///
    /// # Examples
    /// ```
    /// use bookshelf::core::search::GlobPattern;
    ///
    /// let pattern = GlobPattern::new("content/**/*.md").unwrap();
    /// assert!(pattern.matches("content/01-Part/02-Chapter/03-lesson.md"));
    /// assert!(!pattern.matches("static/images/logo.png"));
    /// ```
    pub fn new(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| BookshelfError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = pattern.strip_prefix('/').unwrap_or(pattern);
        if trimmed.is_empty() {
            return Err(invalid("empty pattern"));
        }

        let mut segments = Vec::new();
        for part in trimmed.split('/') {
            let segment = match part {
                "" => return Err(invalid("empty path segment")),
                "." | ".." => return Err(invalid("relative segments are not allowed")),
                "**" => {
                    // Consecutive ** collapse into one
                    if matches!(segments.last(), Some(Segment::AnyDepth)) {
                        continue;
                    }
                    Segment::AnyDepth
                }
                _ if part.contains('*') || part.contains('?') => Segment::Wildcard(
                    Regex::new(&Self::segment_regex(part)).map_err(|e| invalid(&e.to_string()))?,
                ),
                _ => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(GlobPattern {
            source: pattern.to_string(),
            segments,
        })
    }

    /// Translate one wildcard segment into an anchored regex
    fn segment_regex(segment: &str) -> String {
        let mut re = String::with_capacity(segment.len() * 2 + 2);
        re.push('^');
        let mut chars = segment.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    // `**` inside a segment behaves like `*`
                    while chars.peek() == Some(&'*') {
                        chars.next();
                    }
                    re.push_str("[^/]*");
                }
                '?' => re.push_str("[^/]"),
                other => re.push_str(&regex::escape(&other.to_string())),
            }
        }
        re.push('$');
        re
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check a book-relative path against the pattern
    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        Self::match_parts(&self.segments, &parts, 0, 0)
    }

    /// Leading literal directories, e.g. `content/` for `content/**/*.md`
    ///
    /// Walks can start here instead of at the book root.
    pub fn base_dir(&self) -> String {
        let mut base = String::new();
        let dirs = self.segments.len().saturating_sub(1);
        for segment in &self.segments[..dirs] {
            match segment {
                Segment::Literal(name) => {
                    base.push_str(name);
                    base.push('/');
                }
                _ => break,
            }
        }
        base
    }

    /// Recursively match pattern segments against path parts
    fn match_parts(pattern: &[Segment], path: &[&str], pat_idx: usize, path_idx: usize) -> bool {
        // Both exhausted - match
        if pat_idx >= pattern.len() && path_idx >= path.len() {
            return true;
        }

        // Pattern exhausted but path remains - no match
        if pat_idx >= pattern.len() {
            return false;
        }

        // Path exhausted but pattern remains - only matches if remaining pattern is all **
        if path_idx >= path.len() {
            return pattern[pat_idx..]
                .iter()
                .all(|p| matches!(p, Segment::AnyDepth));
        }

        match &pattern[pat_idx] {
            // ** matches zero or more segments
            Segment::AnyDepth => (0..=(path.len() - path_idx))
                .any(|skip| Self::match_parts(pattern, path, pat_idx + 1, path_idx + skip)),
            Segment::Wildcard(re) => {
                re.is_match(path[path_idx])
                    && Self::match_parts(pattern, path, pat_idx + 1, path_idx + 1)
            }
            Segment::Literal(name) => {
                name == path[path_idx]
                    && Self::match_parts(pattern, path, pat_idx + 1, path_idx + 1)
            }
        }
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> bool {
        GlobPattern::new(pattern).unwrap().matches(path)
    }

    #[test]
    fn test_exact_match() {
        assert!(matches("content/01-Part/README.md", "content/01-Part/README.md"));
        assert!(!matches("content/01-Part/README.md", "content/02-Part/README.md"));
    }

    #[test]
    fn test_single_wildcard() {
        assert!(matches("content/*/README.md", "content/01-Part/README.md"));
        assert!(!matches("content/*/README.md", "content/01-Part/02-Chapter/README.md"));
        assert!(!matches("content/*", "static/images"));
    }

    #[test]
    fn test_recursive_wildcard() {
        assert!(matches("content/**", "content/01-Part"));
        assert!(matches("content/**", "content/01-Part/02-Chapter/03-lesson.md"));
        assert!(!matches("content/**", "static/content/x.md"));
    }

    #[test]
    fn test_recursive_matches_zero_segments() {
        assert!(matches("**/*.md", "README.md"));
        assert!(matches("content/**/README.md", "content/README.md"));
        assert!(matches("**/*", "book.yaml"));
    }

    #[test]
    fn test_glob_patterns_in_segments() {
        // *.md pattern
        assert!(matches("content/*/*.md", "content/01-Part/README.md"));
        assert!(!matches("content/*/*.md", "content/01-Part/diagram.png"));

        // prefix pattern
        assert!(matches("content/01-*/README.md", "content/01-Intro/README.md"));
        assert!(!matches("content/01-*/README.md", "content/02-Intro/README.md"));

        // Multiple wildcards in segment
        assert!(matches(
            "**/*-*.summary.md",
            "content/01-a/02-b/03-lesson.summary.md"
        ));
    }

    #[test]
    fn test_question_mark() {
        assert!(matches("content/0?-Part/README.md", "content/01-Part/README.md"));
        assert!(!matches("content/0?-Part/README.md", "content/1-Part/README.md"));
        assert!(!matches("static/?.png", "static/ab.png"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("static/a+b(1).png", "static/a+b(1).png"));
        assert!(matches("static/*.png", "static/a+b(1).png"));
        assert!(!matches("static/*.png", "static/apng"));
    }

    #[test]
    fn test_rejects_bad_patterns() {
        assert!(GlobPattern::new("").is_err());
        assert!(GlobPattern::new("content//x").is_err());
        assert!(GlobPattern::new("../**").is_err());
        assert!(GlobPattern::new("content/./x").is_err());
    }

    #[test]
    fn test_base_dir() {
        assert_eq!(GlobPattern::new("content/**/*.md").unwrap().base_dir(), "content/");
        assert_eq!(
            GlobPattern::new("content/01-Part/README.md").unwrap().base_dir(),
            "content/01-Part/"
        );
        assert_eq!(GlobPattern::new("**/*").unwrap().base_dir(), "");
        assert_eq!(GlobPattern::new("*/x/*.md").unwrap().base_dir(), "");
    }

    #[test]
    fn test_collapsed_recursive_segments() {
        assert!(matches("**/**/*.md", "a.md"));
        assert!(matches("content/**/**", "content/x"));
    }
}
