//! Byte stream composition
//!
//! BSON sources and sinks are generic over `Read`/`Write`; this module
//! supplies the concrete streams: buffered files, gzip wrapping chosen by
//! the `.gz` extension, and standard input/output for piped operation.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::errors::{BsonIoError, BsonIoResult};

/// Returns true if the path names a gzip-compressed file.
pub fn is_gzip_path(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

/// Opens a file for reading, transparently decompressing `.gz` files.
pub fn open_reader(path: &Path) -> BsonIoResult<Box<dyn Read + Send>> {
    let file = File::open(path)
        .map_err(|e| BsonIoError::io(format!("failed to open {}", path.display()), e))?;
    let buffered = BufReader::new(file);
    if is_gzip_path(path) {
        Ok(Box::new(MultiGzDecoder::new(buffered)))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Creates a file for writing, gzip-compressing when `gzip` is set.
///
/// The caller appends `.gz` to the path; compression is not inferred from
/// the name on the write side so that the two can never disagree.
pub fn create_writer(path: &Path, gzip: bool) -> BsonIoResult<Box<dyn Write + Send>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            BsonIoError::io(format!("failed to create {}", parent.display()), e)
        })?;
    }
    let file = File::create(path)
        .map_err(|e| BsonIoError::io(format!("failed to create {}", path.display()), e))?;
    let buffered = BufWriter::new(file);
    if gzip {
        Ok(Box::new(GzEncoder::new(buffered, Compression::default())))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Standard input as a document stream.
pub fn stdin_reader() -> Box<dyn Read + Send> {
    Box::new(io::stdin())
}

/// Standard output as a document stream.
pub fn stdout_writer() -> Box<dyn Write + Send> {
    Box::new(io::stdout())
}

/// Reads an entire (possibly gzipped) file, for small JSON side files.
pub fn read_file_bytes(path: &Path) -> BsonIoResult<Vec<u8>> {
    let mut reader = open_reader(path)?;
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| BsonIoError::io(format!("failed to read {}", path.display()), e))?;
    Ok(bytes)
}

/// Writes an entire file, gzip-compressing when `gzip` is set.
pub fn write_file_bytes(path: &Path, bytes: &[u8], gzip: bool) -> BsonIoResult<()> {
    let mut writer = create_writer(path, gzip)?;
    writer
        .write_all(bytes)
        .map_err(|e| BsonIoError::io(format!("failed to write {}", path.display()), e))?;
    writer
        .flush()
        .map_err(|e| BsonIoError::io(format!("failed to flush {}", path.display()), e))?;
    Ok(())
}
