//! Length-prefixed BSON document streams
//!
//! A source yields documents by reading the 4-byte little-endian length,
//! then the remainder, validating the trailing zero byte. A sink writes
//! the length-prefixed encoding and flushes on close. Both compose over
//! files, pipes, standard input/output, gzip streams, and archive
//! multiplexer/demultiplexer channels.

mod errors;
mod sink;
mod source;
mod stream;

pub use errors::{BsonIoError, BsonIoErrorCode, BsonIoResult};
pub use sink::BsonSink;
pub use source::{BsonSource, MAX_DOCUMENT_SIZE, MIN_DOCUMENT_SIZE};
pub use stream::{
    create_writer, is_gzip_path, open_reader, read_file_bytes, stdin_reader, stdout_writer,
    write_file_bytes,
};
