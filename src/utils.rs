//! Content hashing and media type helpers

use mime::Mime;
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of data
pub fn compute_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hex rendering of a content hash, reported as `file_hash`
pub fn generate_etag(content_hash: &[u8; 32]) -> String {
    hex::encode(content_hash)
}

/// `file_hash` of a byte slice
pub fn file_hash(data: &[u8]) -> String {
    generate_etag(&compute_hash(data))
}

/// Guess a media type from the file extension
///
/// Unknown extensions fall back to `application/octet-stream`.
pub fn guess_content_type(path: &str) -> Mime {
    let ext = match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => ext.to_ascii_lowercase(),
        _ => return mime::APPLICATION_OCTET_STREAM,
    };

    let essence = match ext.as_str() {
        "txt" => return mime::TEXT_PLAIN,
        "json" => return mime::APPLICATION_JSON,
        "html" | "htm" => return mime::TEXT_HTML,
        "css" => return mime::TEXT_CSS,
        "js" => return mime::TEXT_JAVASCRIPT,
        "png" => return mime::IMAGE_PNG,
        "jpg" | "jpeg" => return mime::IMAGE_JPEG,
        "gif" => return mime::IMAGE_GIF,
        "svg" => return mime::IMAGE_SVG,
        "pdf" => return mime::APPLICATION_PDF,
        "md" | "markdown" => "text/markdown",
        "yaml" | "yml" => "application/yaml",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "zip" => "application/zip",
        "zst" => "application/zstd",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };
    essence.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash() {
        let data = b"Hello, World!";
        let hash = compute_hash(data);
        assert_eq!(hash.len(), 32);

        // Same data produces same hash
        assert_eq!(hash, compute_hash(data));

        // Different data produces different hash
        assert_ne!(hash, compute_hash(b"Different data"));
    }

    #[test]
    fn test_file_hash_is_hex_sha256() {
        // sha256("")
        assert_eq!(
            file_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(file_hash(b"abc").len(), 64);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("static/images/logo.PNG"), mime::IMAGE_PNG);
        assert_eq!(
            guess_content_type("content/01-Part/README.md").essence_str(),
            "text/markdown"
        );
        assert!(guess_content_type("static/slides/deck.pptx")
            .essence_str()
            .contains("presentationml"));
        assert_eq!(guess_content_type("static/files/noext"), mime::APPLICATION_OCTET_STREAM);
        assert_eq!(guess_content_type("static/files/.hidden"), mime::APPLICATION_OCTET_STREAM);
        assert_eq!(guess_content_type("static/dir.v1/noext"), mime::APPLICATION_OCTET_STREAM);
    }
}
