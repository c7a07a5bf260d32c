//! The restore pipeline
//!
//! Plans a dump directory or archive into intents, rebuilds each
//! collection (drop, create with options and UUID, bulk document load,
//! index build with the version-gated rewrites), merges users and roles
//! through staging collections, and replays the oplog for point-in-time
//! consistency.

mod bulk;
mod collection;
mod errors;
mod options;
mod pipeline;
mod planner;
mod users_roles;

pub use bulk::{BulkLoader, InsertStats};
pub use collection::{restore_intent, CollectionStats, KnownCollections};
pub use errors::{RestoreError, RestoreErrorCode, RestoreResult};
pub use options::{RestoreOptions, DEFAULT_BULK_BUFFER_SIZE, DEFAULT_INSERTION_WORKERS};
pub use pipeline::{RestorePipeline, RestoreStats};
pub use planner::{build_plan, RestorePlan, RestoreSource};
pub use users_roles::{
    dump_auth_version, restore_users_roles, server_auth_version, validate_auth_versions,
};
