//! Streaming book archives
//!
//! A book is packed as a tar stream compressed with zstd. Files are read one
//! at a time and the compressed output is drained after every entry, so peak
//! memory is one file plus the encoder's window.
//!
//! Entry names are relative to the book root and appear in sorted order with
//! mode 0644 and mtime 0; the same tree always produces the same bytes.

use crate::core::operator::Operator;
use crate::error::{BookshelfError, Result};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, Stream};
use std::collections::BTreeMap;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// zstd compression level
pub const COMPRESSION_LEVEL: i32 = 3;

/// Chunks buffered between the producer task and the consumer
pub const CHANNEL_DEPTH: usize = 4;

/// MIME type of the archive body
pub const CONTENT_TYPE: &str = "application/zstd";

/// File name offered for a book archive
pub fn archive_name(book_id: &str) -> String {
    format!("{}.tar.zst", book_id)
}

fn archive_error(err: std::io::Error) -> BookshelfError {
    BookshelfError::Archive(err.to_string())
}

/// Incremental tar + zstd writer
pub struct ArchiveWriter {
    builder: tar::Builder<zstd::stream::write::Encoder<'static, Vec<u8>>>,
}

impl ArchiveWriter {
    pub fn new() -> Result<Self> {
        let encoder =
            zstd::stream::write::Encoder::new(Vec::new(), COMPRESSION_LEVEL).map_err(archive_error)?;
        Ok(ArchiveWriter {
            builder: tar::Builder::new(encoder),
        })
    }

    /// Append one regular file
    pub fn append(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        self.builder
            .append_data(&mut header, name, data)
            .map_err(archive_error)
    }

    /// Drain the compressed bytes produced so far
    pub fn take_chunk(&mut self) -> Bytes {
        Bytes::from(std::mem::take(self.builder.get_mut().get_mut()))
    }

    /// Write the tar trailer, flush the encoder, and return the final bytes
    pub fn finish(self) -> Result<Bytes> {
        let encoder = self.builder.into_inner().map_err(archive_error)?;
        let tail = encoder.finish().map_err(archive_error)?;
        Ok(Bytes::from(tail))
    }
}

/// Totals for a completed archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Read every file in `files` (relative to `root`) into an archive sent over `tx`
///
/// Any read failure aborts the whole archive. A closed receiver ends
/// production with [`BookshelfError::Cancelled`].
pub async fn produce(
    op: &dyn Operator,
    root: &str,
    files: &[String],
    tx: &mut mpsc::Sender<Result<Bytes>>,
) -> Result<ArchiveSummary> {
    let mut writer = ArchiveWriter::new()?;
    let mut summary = ArchiveSummary::default();

    for relative in files {
        let data = op.read(&format!("{}{}", root, relative)).await?;
        writer.append(relative, &data)?;
        summary.files += 1;
        summary.bytes_in += data.len() as u64;

        let chunk = writer.take_chunk();
        if !chunk.is_empty() {
            summary.bytes_out += chunk.len() as u64;
            tx.send(Ok(chunk))
                .await
                .map_err(|_| BookshelfError::Cancelled)?;
        }
    }

    let tail = writer.finish()?;
    summary.bytes_out += tail.len() as u64;
    tx.send(Ok(tail))
        .await
        .map_err(|_| BookshelfError::Cancelled)?;

    debug!(
        "Archived {} files from {} ({} -> {} bytes)",
        summary.files, root, summary.bytes_in, summary.bytes_out
    );
    Ok(summary)
}

/// Compressed archive bytes, in order
///
/// An `Err` item means the archive was aborted; no further items follow.
pub struct ArchiveStream {
    rx: mpsc::Receiver<Result<Bytes>>,
}

impl ArchiveStream {
    /// Channel pair: the sender feeds [`produce`], the stream goes to the caller
    pub fn channel() -> (mpsc::Sender<Result<Bytes>>, ArchiveStream) {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        (tx, ArchiveStream { rx })
    }
}

impl Stream for ArchiveStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

/// Decompress and unpack an archive into `name -> bytes`
pub fn unpack(archive: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let decoder = zstd::stream::read::Decoder::new(archive).map_err(archive_error)?;
    let mut reader = tar::Archive::new(decoder);
    let mut files = BTreeMap::new();

    for entry in reader.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        let name = entry
            .path()
            .map_err(archive_error)?
            .to_string_lossy()
            .into_owned();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data).map_err(archive_error)?;
        files.insert(name, data);
    }

    Ok(files)
}
