//! The dump pipeline
//!
//! Enumerates namespaces into an intent plan, copies each collection
//! through a fixed worker pool into a directory tree or a multiplexed
//! archive, streams users/roles/auth-version after the user data, and
//! brackets the copy with replication-log positions when oplog capture is
//! on.

mod enumerate;
mod errors;
mod oplog_tail;
mod options;
mod output;
mod pipeline;

pub use enumerate::build_plan;
pub use errors::{DumpError, DumpErrorCode, DumpResult};
pub use oplog_tail::{dump_oplog, record_start, resharding_active};
pub use options::DumpOptions;
pub use output::{
    data_file_path, metadata_file_path, oplog_file_path, prelude_file_path, CollectionSink,
    DumpTarget, OPLOG_FILE, PRELUDE_FILE,
};
pub use pipeline::{DumpPipeline, DumpStats};
