//! The archive container
//!
//! A framed, self-describing byte stream: one prelude message (tool and
//! server versions plus per-namespace metadata), then interleaved body
//! segments of raw BSON chunks bracketed by namespace headers and
//! end-of-namespace markers. Writing is serialized through one thread; a
//! single mutex-equivalent owns the wire while collection workers produce
//! in parallel.

mod errors;
mod format;
mod prelude;
mod reader;
mod writer;

pub use errors::{ArchiveError, ArchiveErrorCode, ArchiveResult};
pub use format::{
    read_message, Message, NAMESPACE_MAGIC, PRELUDE_MAGIC, TERMINATOR_MAGIC,
};
pub use prelude::{ArchivePrelude, PreludeEntry, FORMAT_VERSION, TOOL_VERSION};
pub use reader::{ArchiveEvent, ArchiveReader};
pub use writer::{ArchiveMultiplexer, ArchiveWriter, NamespaceSink};
