//! BSON document sink
//!
//! Writes length-prefixed BSON documents to any byte stream. All buffered
//! output is flushed on `finish`; dropping an unfinished sink flushes on a
//! best-effort basis.

use std::io::Write;

use bson::Document;

use super::errors::{BsonIoError, BsonIoResult};
use super::source::{MAX_DOCUMENT_SIZE, MIN_DOCUMENT_SIZE};

/// A sink accepting BSON documents over any byte stream.
pub struct BsonSink<W: Write> {
    /// Present until `finish` hands the writer back.
    writer: Option<W>,
    documents_written: u64,
}

impl<W: Write> BsonSink<W> {
    /// Creates a sink over the given writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
            documents_written: 0,
        }
    }

    /// Returns how many documents have been written so far.
    pub fn documents_written(&self) -> u64 {
        self.documents_written
    }

    fn writer(&mut self) -> &mut W {
        self.writer.as_mut().expect("sink already finished")
    }

    /// Writes a document's raw bytes, validating the framing first.
    pub fn write_raw(&mut self, raw: &[u8]) -> BsonIoResult<()> {
        if raw.len() < MIN_DOCUMENT_SIZE {
            return Err(BsonIoError::invalid(format!(
                "document of {} bytes is below the minimum of {}",
                raw.len(),
                MIN_DOCUMENT_SIZE
            )));
        }
        if raw.len() > MAX_DOCUMENT_SIZE {
            return Err(BsonIoError::invalid(format!(
                "document of {} bytes exceeds the maximum of {}",
                raw.len(),
                MAX_DOCUMENT_SIZE
            )));
        }
        let declared = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if declared != raw.len() {
            return Err(BsonIoError::invalid(format!(
                "length prefix {} does not match buffer length {}",
                declared,
                raw.len()
            )));
        }
        if raw[raw.len() - 1] != 0 {
            return Err(BsonIoError::invalid(
                "document does not end with a zero byte",
            ));
        }

        self.writer()
            .write_all(raw)
            .map_err(|e| BsonIoError::io("failed to write document", e))?;
        self.documents_written += 1;
        Ok(())
    }

    /// Encodes and writes a document.
    pub fn write_document(&mut self, doc: &Document) -> BsonIoResult<()> {
        doc.to_writer(self.writer())
            .map_err(|e| BsonIoError::invalid(format!("unencodable document: {}", e)))?;
        self.documents_written += 1;
        Ok(())
    }

    /// Flushes buffered output and hands back the underlying writer.
    pub fn finish(mut self) -> BsonIoResult<W> {
        let mut writer = self.writer.take().expect("sink already finished");
        writer
            .flush()
            .map_err(|e| BsonIoError::io("failed to flush sink", e))?;
        Ok(writer)
    }
}

impl<W: Write> Drop for BsonSink<W> {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}
