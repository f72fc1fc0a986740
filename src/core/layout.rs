//! Book layout and path validation
//!
//! Every book lives under `books/{book_id}/` with a fixed shape:
//!
//! ```text
//! books/{book_id}/book.yaml
//! books/{book_id}/content/{NN-Part}/README.md
//! books/{book_id}/content/{NN-Part}/{NN-Chapter}/README.md
//! books/{book_id}/content/{NN-Part}/{NN-Chapter}/{NN-lesson}.md
//! books/{book_id}/content/{NN-Part}/{NN-Chapter}/{NN-lesson}.summary.md
//! books/{book_id}/static/{images|slides|...}/...
//! ```
//!
//! Validation here is synchronous and touches no storage. A logical path
//! that resolves to a [`BookPath`] can never leave its book root.

use crate::error::{BookshelfError, Result};
use std::fmt;

/// Directory that holds every book
pub const BOOKS_DIR: &str = "books";

/// Book metadata file at the book root
pub const BOOK_METADATA_FILE: &str = "book.yaml";

/// Top-level directory for lesson content
pub const CONTENT_DIR: &str = "content";

/// Top-level directory for static assets
pub const STATIC_DIR: &str = "static";

/// Suffix of lesson summary sidecars
pub const SUMMARY_SUFFIX: &str = ".summary.md";

const MAX_SEGMENT_LENGTH: usize = 255;
const MAX_BOOK_ID_LENGTH: usize = 128;

/// Validate one path segment
///
/// # Rules
/// - Non-empty, at most 255 bytes
/// - No leading `.` (rules out `.`, `..` and hidden entries)
/// - No `/`, `\`, or control characters
pub fn validate_segment(segment: &str) -> std::result::Result<(), String> {
    if segment.is_empty() {
        return Err("empty path segment".to_string());
    }
    if segment.len() > MAX_SEGMENT_LENGTH {
        return Err(format!(
            "segment too long (max {} bytes)",
            MAX_SEGMENT_LENGTH
        ));
    }
    if segment == ".." {
        return Err("parent traversal".to_string());
    }
    if segment.starts_with('.') {
        return Err(format!("segment '{}' may not start with '.'", segment));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| *c == '/' || *c == '\\' || c.is_control())
    {
        return Err(format!("segment contains forbidden character {:?}", c));
    }
    Ok(())
}

/// Validated book identifier
///
/// A book id is a single path segment restricted to URL-safe characters:
/// ASCII letters, digits, `-`, `_` and `.` (never leading).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BookId(String);

impl BookId {
    /// Create a new validated book id
    ///
    /// # Examples
    ///
    /// ```
    /// use bookshelf::core::layout::BookId;
    ///
    /// assert!(BookId::new("ai-native-python").is_ok());
    /// assert!(BookId::new("../etc").is_err());
    /// assert!(BookId::new(".hidden").is_err());
    /// ```
    pub fn new(book_id: impl Into<String>) -> Result<Self> {
        let book_id = book_id.into();
        let invalid = |reason: String| BookshelfError::InvalidBookId {
            book_id: book_id.clone(),
            reason,
        };

        validate_segment(&book_id).map_err(invalid)?;
        if book_id.len() > MAX_BOOK_ID_LENGTH {
            return Err(invalid(format!(
                "book id too long (max {} characters)",
                MAX_BOOK_ID_LENGTH
            )));
        }
        if !book_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(invalid(
                "book id must contain only letters, digits, '-', '_' and '.'".to_string(),
            ));
        }
        if book_id == BOOKS_DIR {
            return Err(invalid("'books' is reserved".to_string()));
        }

        Ok(BookId(book_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Operator path of the book root, with trailing `/`
    pub fn root(&self) -> String {
        format!("{}/{}/", BOOKS_DIR, self.0)
    }
}

impl AsRef<str> for BookId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which part of a book a path addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// Lesson tree under `content/`
    Content,
    /// Asset tree under `static/`
    Static,
    /// `book.yaml`
    Metadata,
    /// The whole book
    Root,
}

/// A validated path inside one book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookPath {
    book: BookId,
    relative: String,
    area: Area,
}

impl BookPath {
    /// Resolve a logical, book-relative path
    ///
    /// The path must sit under `content/` or `static/`, or be `book.yaml`.
    /// A single leading `/` is tolerated; empty segments, `..`, and hidden
    /// segments are rejected.
    pub fn parse(book: &BookId, logical: &str) -> Result<Self> {
        let relative = logical.strip_prefix('/').unwrap_or(logical);
        if relative.is_empty() {
            return Err(BookshelfError::invalid_path(logical, "empty path"));
        }

        for segment in relative.split('/') {
            validate_segment(segment).map_err(|reason| BookshelfError::invalid_path(logical, reason))?;
        }

        let area = match relative.split('/').next() {
            Some(CONTENT_DIR) => Area::Content,
            Some(STATIC_DIR) => Area::Static,
            Some(BOOK_METADATA_FILE) if relative == BOOK_METADATA_FILE => Area::Metadata,
            _ => {
                return Err(BookshelfError::invalid_path(
                    logical,
                    "path must be under content/ or static/, or be book.yaml",
                ))
            }
        };

        Ok(BookPath {
            book: book.clone(),
            relative: relative.to_string(),
            area,
        })
    }

    /// The book root itself, for whole-book operations
    pub fn root(book: &BookId) -> Self {
        BookPath {
            book: book.clone(),
            relative: String::new(),
            area: Area::Root,
        }
    }

    /// An asset path `static/{asset_type}/{filename}`
    pub fn asset(book: &BookId, asset_type: &str, filename: &str) -> Result<Self> {
        for segment in [asset_type, filename] {
            validate_segment(segment).map_err(|reason| {
                BookshelfError::invalid_path(format!("{}/{}", asset_type, filename), reason)
            })?;
        }
        Self::parse(book, &format!("{}/{}/{}", STATIC_DIR, asset_type, filename))
    }

    pub fn book(&self) -> &BookId {
        &self.book
    }

    pub fn area(&self) -> Area {
        self.area
    }

    /// Path relative to the book root
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Operator path: `books/{book_id}/{relative}`
    pub fn physical(&self) -> String {
        format!("{}{}", self.book.root(), self.relative)
    }

    /// Sidecar summary path for a lesson file
    ///
    /// `content/01-Part/02-Chapter/03-lesson.md` maps to
    /// `content/01-Part/02-Chapter/03-lesson.summary.md`.
    pub fn summary(&self) -> Result<BookPath> {
        match ContentNode::classify(&self.relative) {
            ContentNode::Lesson { .. } => {}
            _ => {
                return Err(BookshelfError::invalid_path(
                    self.relative.clone(),
                    "summaries exist only for lesson files",
                ))
            }
        }
        let stem = self
            .relative
            .strip_suffix(".md")
            .unwrap_or(&self.relative);
        Ok(BookPath {
            book: self.book.clone(),
            relative: format!("{}{}", stem, SUMMARY_SUFFIX),
            area: Area::Content,
        })
    }
}

impl fmt::Display for BookPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.physical())
    }
}

/// Shape of a file under `content/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentNode {
    /// `content/{part}/README.md`
    PartReadme { part: String },
    /// `content/{part}/{chapter}/README.md`
    ChapterReadme { part: String, chapter: String },
    /// `content/{part}/{chapter}/{lesson}.md`
    Lesson {
        part: String,
        chapter: String,
        lesson: String,
    },
    /// `content/{part}/{chapter}/{lesson}.summary.md`
    Summary {
        part: String,
        chapter: String,
        lesson: String,
    },
    /// Anything else under `content/`, or not under `content/` at all
    Other,
}

impl ContentNode {
    /// Classify a book-relative path
    pub fn classify(relative: &str) -> ContentNode {
        let segments: Vec<&str> = relative.split('/').collect();
        match segments.as_slice() {
            [CONTENT_DIR, part, "README.md"] if is_numbered(part) => ContentNode::PartReadme {
                part: part.to_string(),
            },
            [CONTENT_DIR, part, chapter, "README.md"] if is_numbered(part) && is_numbered(chapter) => {
                ContentNode::ChapterReadme {
                    part: part.to_string(),
                    chapter: chapter.to_string(),
                }
            }
            [CONTENT_DIR, part, chapter, file] if is_numbered(part) && is_numbered(chapter) => {
                if let Some(lesson) = file.strip_suffix(SUMMARY_SUFFIX) {
                    if is_numbered(lesson) {
                        return ContentNode::Summary {
                            part: part.to_string(),
                            chapter: chapter.to_string(),
                            lesson: lesson.to_string(),
                        };
                    }
                } else if let Some(lesson) = file.strip_suffix(".md") {
                    if is_numbered(lesson) {
                        return ContentNode::Lesson {
                            part: part.to_string(),
                            chapter: chapter.to_string(),
                            lesson: lesson.to_string(),
                        };
                    }
                }
                ContentNode::Other
            }
            _ => ContentNode::Other,
        }
    }
}

/// `NN-name`: one or more ASCII digits, a hyphen, then at least one character
fn is_numbered(segment: &str) -> bool {
    match segment.split_once('-') {
        Some((number, rest)) => {
            !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty()
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> BookId {
        BookId::new("ai-native-python").unwrap()
    }

    #[test]
    fn test_valid_book_ids() {
        assert!(BookId::new("a").is_ok());
        assert!(BookId::new("ai-native-python").is_ok());
        assert!(BookId::new("Book_2.v1").is_ok());
    }

    #[test]
    fn test_invalid_book_ids() {
        assert!(BookId::new("").is_err()); // empty
        assert!(BookId::new(".tmp").is_err()); // hidden
        assert!(BookId::new("..").is_err()); // traversal
        assert!(BookId::new("a/b").is_err()); // separator
        assert!(BookId::new("has space").is_err()); // not url-safe
        assert!(BookId::new("books").is_err()); // reserved
        assert!(BookId::new("x".repeat(129)).is_err()); // too long
    }

    #[test]
    fn test_parse_areas() {
        let b = book();
        assert_eq!(
            BookPath::parse(&b, "content/01-Part/README.md").unwrap().area(),
            Area::Content
        );
        assert_eq!(
            BookPath::parse(&b, "static/images/logo.png").unwrap().area(),
            Area::Static
        );
        assert_eq!(BookPath::parse(&b, "book.yaml").unwrap().area(), Area::Metadata);
        assert_eq!(
            BookPath::parse(&b, "/content/x.md").unwrap().relative(),
            "content/x.md"
        );
    }

    #[test]
    fn test_parse_rejects_escapes() {
        let b = book();
        assert!(BookPath::parse(&b, "../../etc/passwd").is_err());
        assert!(BookPath::parse(&b, "content/../../other/content/x.md").is_err());
        assert!(BookPath::parse(&b, "content/./x.md").is_err());
        assert!(BookPath::parse(&b, "content//x.md").is_err());
        assert!(BookPath::parse(&b, "content/x.md/").is_err());
        assert!(BookPath::parse(&b, "content\\x.md").is_err());
        assert!(BookPath::parse(&b, "").is_err());
    }

    #[test]
    fn test_parse_rejects_outside_layout() {
        let b = book();
        assert!(BookPath::parse(&b, "notes/x.md").is_err());
        assert!(BookPath::parse(&b, "book.yaml/extra").is_err());
        assert!(BookPath::parse(&b, "registry.yaml").is_err());
    }

    #[test]
    fn test_physical_path() {
        let b = book();
        let path = BookPath::parse(&b, "content/01-Part/README.md").unwrap();
        assert_eq!(
            path.physical(),
            "books/ai-native-python/content/01-Part/README.md"
        );
        assert_eq!(BookPath::root(&b).physical(), "books/ai-native-python/");
    }

    #[test]
    fn test_asset_path() {
        let b = book();
        let path = BookPath::asset(&b, "images", "diagram.png").unwrap();
        assert_eq!(path.relative(), "static/images/diagram.png");
        assert!(BookPath::asset(&b, "..", "x.png").is_err());
        assert!(BookPath::asset(&b, "images", "a/b.png").is_err());
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            ContentNode::classify("content/01-Intro/README.md"),
            ContentNode::PartReadme {
                part: "01-Intro".to_string()
            }
        );
        assert!(matches!(
            ContentNode::classify("content/01-Intro/02-Setup/README.md"),
            ContentNode::ChapterReadme { .. }
        ));
        assert!(matches!(
            ContentNode::classify("content/01-Intro/02-Setup/03-install.md"),
            ContentNode::Lesson { .. }
        ));
        assert!(matches!(
            ContentNode::classify("content/01-Intro/02-Setup/03-install.summary.md"),
            ContentNode::Summary { .. }
        ));
        assert_eq!(ContentNode::classify("content/notes.md"), ContentNode::Other);
        assert_eq!(ContentNode::classify("static/images/a.png"), ContentNode::Other);
    }

    #[test]
    fn test_summary_path() {
        let b = book();
        let lesson = BookPath::parse(&b, "content/01-Intro/02-Setup/03-install.md").unwrap();
        assert_eq!(
            lesson.summary().unwrap().relative(),
            "content/01-Intro/02-Setup/03-install.summary.md"
        );

        let readme = BookPath::parse(&b, "content/01-Intro/README.md").unwrap();
        assert!(readme.summary().is_err());

        let summary = BookPath::parse(&b, "content/01-Intro/02-Setup/03-install.summary.md").unwrap();
        assert!(summary.summary().is_err());
    }

    #[test]
    fn test_is_numbered() {
        assert!(is_numbered("01-Part"));
        assert!(is_numbered("7-x"));
        assert!(!is_numbered("Part-01"));
        assert!(!is_numbered("01-"));
        assert!(!is_numbered("01Part"));
    }
}
