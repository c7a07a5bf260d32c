//! Restore configuration

use bson::Timestamp;

use crate::catalog::{NamespaceMatcher, NamespaceRenamer};
use crate::observability::Logger;

use super::errors::{RestoreError, RestoreResult};

/// Default insertion workers per collection.
pub const DEFAULT_INSERTION_WORKERS: usize = 4;

/// Default documents per bulk write.
pub const DEFAULT_BULK_BUFFER_SIZE: usize = 1000;

/// Configuration for one restore run.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Drop each target collection before recreating it
    pub drop: bool,
    /// Recreate collections with their dumped UUIDs (requires `drop`)
    pub preserve_uuid: bool,
    /// Convert the first per-document failure into a hard stop
    pub stop_on_error: bool,
    /// Preserve document order, pinning insertion workers to one
    pub maintain_insertion_order: bool,
    /// Skip server-side document validation on insert
    pub bypass_document_validation: bool,
    /// Keep the index `v` field instead of letting the server choose
    pub keep_index_version: bool,
    /// Rewrite legacy index key values and collapse the duplicates
    pub fix_legacy_indexes: bool,
    /// Rewrite hashed indexes on dotted fields to ascending
    pub fix_dotted_hashed_indexes: bool,
    /// Replay `oplog.bson` after the data load
    pub oplog_replay: bool,
    /// Exclusive upper bound for replayed entries
    pub oplog_limit: Option<Timestamp>,
    /// Namespaces to include (empty means all)
    pub ns_include: Vec<String>,
    /// Namespaces to exclude
    pub ns_exclude: Vec<String>,
    /// Rename sources, paired with `ns_to`
    pub ns_from: Vec<String>,
    /// Rename targets, paired with `ns_from`
    pub ns_to: Vec<String>,
    /// Target database for a single-db dump directory
    pub db: Option<String>,
    /// Also restore `$admin.system.users`-style single-db users/roles
    pub restore_db_users_and_roles: bool,
    /// Skip users/roles restoration entirely
    pub skip_users_and_roles: bool,
    /// Collection worker pool size
    pub num_parallel_collections: usize,
    /// Insertion workers per collection
    pub num_insertion_workers: usize,
    /// Documents per bulk write
    pub bulk_buffer_size: usize,
    /// Staging collection for the users merge
    pub temp_users_collection: String,
    /// Staging collection for the roles merge
    pub temp_roles_collection: String,
    pub logger: Logger,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            drop: false,
            preserve_uuid: false,
            stop_on_error: false,
            maintain_insertion_order: false,
            bypass_document_validation: false,
            keep_index_version: false,
            fix_legacy_indexes: false,
            fix_dotted_hashed_indexes: false,
            oplog_replay: false,
            oplog_limit: None,
            ns_include: Vec::new(),
            ns_exclude: Vec::new(),
            ns_from: Vec::new(),
            ns_to: Vec::new(),
            db: None,
            restore_db_users_and_roles: false,
            skip_users_and_roles: false,
            num_parallel_collections: 1,
            num_insertion_workers: DEFAULT_INSERTION_WORKERS,
            bulk_buffer_size: DEFAULT_BULK_BUFFER_SIZE,
            temp_users_collection: "tempusers".to_string(),
            temp_roles_collection: "temproles".to_string(),
            logger: Logger::default(),
        }
    }
}

impl RestoreOptions {
    /// Validates option combinations before any mutation.
    pub fn validate(&self) -> RestoreResult<()> {
        if self.preserve_uuid && !self.drop {
            return Err(RestoreError::validation(
                "cannot preserve UUIDs without dropping collections first",
            ));
        }
        if self.num_parallel_collections == 0 {
            return Err(RestoreError::validation(
                "the collection worker pool needs at least one worker",
            ));
        }
        if self.num_insertion_workers == 0 {
            return Err(RestoreError::validation(
                "each collection needs at least one insertion worker",
            ));
        }
        if self.bulk_buffer_size == 0 {
            return Err(RestoreError::validation(
                "the bulk buffer needs room for at least one document",
            ));
        }
        if self.oplog_limit.is_some() && !self.oplog_replay {
            return Err(RestoreError::validation(
                "an oplog limit requires oplog replay",
            ));
        }
        if self.restore_db_users_and_roles && self.db.is_none() {
            return Err(RestoreError::validation(
                "restoring single-db users and roles requires a target database",
            ));
        }
        Ok(())
    }

    /// Effective insertion worker count; maintain-order pins it to one.
    pub fn effective_insertion_workers(&self) -> usize {
        if self.maintain_insertion_order {
            1
        } else {
            self.num_insertion_workers
        }
    }

    /// The include matcher.
    pub fn include_matcher(&self) -> NamespaceMatcher {
        NamespaceMatcher::new(self.ns_include.iter().cloned())
    }

    /// The exclude matcher.
    pub fn exclude_matcher(&self) -> NamespaceMatcher {
        NamespaceMatcher::new(self.ns_exclude.iter().cloned())
    }

    /// The renamer, validated.
    pub fn renamer(&self) -> RestoreResult<NamespaceRenamer> {
        NamespaceRenamer::new(self.ns_from.iter().cloned(), self.ns_to.iter().cloned())
            .map_err(RestoreError::from)
    }
}
