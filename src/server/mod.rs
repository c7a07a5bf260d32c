//! The server seam
//!
//! Dump and restore never talk to a driver directly; they consume the
//! [`ServerSession`] trait. A production adapter wraps a real driver
//! connection; [`MemoryServer`] is a full in-process implementation used
//! by the dry-run path and the test suites.

mod errors;
mod memory;
mod session;
mod version;

pub use errors::{
    write_code_ignorable, ServerError, ServerResult, WriteFailure, DOCUMENT_VALIDATION_FAILURE,
    DUPLICATE_KEY, MIXED_SCHEMA_NOT_ALLOWED, UNACKNOWLEDGED_WRITE,
};
pub use memory::{CollectionSnapshot, MemoryServer};
pub use session::{
    binary_to_uuid_hex, cmp_timestamps, uuid_hex_to_binary, BulkResult, CollectionKind,
    CollectionSpec, DocumentCursor, FindOptions, ServerInfo, ServerSession, Topology, VecCursor,
};
pub use version::ServerVersion;
