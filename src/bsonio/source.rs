//! BSON document source
//!
//! Reads a stream of length-prefixed BSON documents: 4-byte little-endian
//! total length (including the prefix itself), then the remainder, which
//! must end with a zero byte. A clean EOF at a document boundary ends the
//! stream; EOF inside a document is a format error.

use std::io::{ErrorKind, Read};

use bson::Document;

use super::errors::{BsonIoError, BsonIoResult};

/// Smallest legal document: length prefix plus terminator.
pub const MIN_DOCUMENT_SIZE: usize = 5;

/// Largest accepted document: the 16 MiB server ceiling plus slack for
/// oplog entries that wrap a maximum-size document.
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024 + 16 * 1024;

/// A source of raw BSON documents over any byte stream.
pub struct BsonSource<R: Read> {
    reader: R,
    /// Reusable document buffer; each worker owns its source, so documents
    /// handed out are copies and never shared across workers.
    buf: Vec<u8>,
    documents_read: u64,
}

impl<R: Read> BsonSource<R> {
    /// Creates a source over the given reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            documents_read: 0,
        }
    }

    /// Returns how many documents have been produced so far.
    pub fn documents_read(&self) -> u64 {
        self.documents_read
    }

    /// Reads the next document's raw bytes, including the length prefix.
    ///
    /// Returns `Ok(None)` on a clean EOF at a document boundary.
    pub fn read_next_raw(&mut self) -> BsonIoResult<Option<&[u8]>> {
        let mut len_buf = [0u8; 4];

        // A short read at the boundary is EOF; a short read after the first
        // byte is truncation.
        match read_exact_or_eof(&mut self.reader, &mut len_buf)? {
            FillResult::Eof => return Ok(None),
            FillResult::Partial(n) => {
                return Err(BsonIoError::truncated(format!(
                    "stream ended after {} of 4 length bytes",
                    n
                )));
            }
            FillResult::Full => {}
        }

        let total_len = u32::from_le_bytes(len_buf) as usize;
        if !(MIN_DOCUMENT_SIZE..=MAX_DOCUMENT_SIZE).contains(&total_len) {
            return Err(BsonIoError::invalid(format!(
                "document length {} out of range [{}, {}]",
                total_len, MIN_DOCUMENT_SIZE, MAX_DOCUMENT_SIZE
            )));
        }

        self.buf.clear();
        self.buf.resize(total_len, 0);
        self.buf[0..4].copy_from_slice(&len_buf);

        self.reader.read_exact(&mut self.buf[4..]).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                BsonIoError::truncated(format!(
                    "stream ended inside a {}-byte document",
                    total_len
                ))
            } else {
                BsonIoError::io("failed to read document body", e)
            }
        })?;

        if self.buf[total_len - 1] != 0 {
            return Err(BsonIoError::invalid(
                "document does not end with a zero byte",
            ));
        }

        self.documents_read += 1;
        Ok(Some(&self.buf))
    }

    /// Reads and decodes the next document.
    pub fn read_next(&mut self) -> BsonIoResult<Option<Document>> {
        match self.read_next_raw()? {
            None => Ok(None),
            Some(raw) => {
                let doc = Document::from_reader(&mut &raw[..]).map_err(|e| {
                    BsonIoError::invalid(format!("undecodable document: {}", e))
                })?;
                Ok(Some(doc))
            }
        }
    }

    /// Consumes the source, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

enum FillResult {
    Full,
    Eof,
    Partial(usize),
}

/// Fills `buf` completely, distinguishing EOF-before-anything from a
/// partial fill.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> BsonIoResult<FillResult> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 {
                    FillResult::Eof
                } else {
                    FillResult::Partial(filled)
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(BsonIoError::io("failed to read length prefix", e)),
        }
    }
    Ok(FillResult::Full)
}
