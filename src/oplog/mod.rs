//! The oplog engine
//!
//! Entry model, the per-entry filter and transform rules, and the
//! replayer that applies batches through the server's atomic multi-op
//! primitive.

mod entry;
mod errors;
mod filter;
mod replayer;
mod transform;

pub use entry::{OpKind, OplogEntry};
pub use errors::{OplogError, OplogErrorCode, OplogResult};
pub use filter::{is_resharding_related, should_skip, RESHARDING_COLLECTIONS};
pub use replayer::{OplogReplayer, ReplayOptions, ReplayStats, DEFAULT_BATCH_SIZE};
pub use transform::transform;
