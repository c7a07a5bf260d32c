//! Per-entry replay filters
//!
//! Entries dropped silently:
//! - anything under `config.system.sessions` (incl. sharded chunks of it);
//! - the `config.cache.*` collections;
//! - `startIndexBuild` and `abortIndexBuild` commands (two-phase index
//!   builds reduce to the commit, which is rewritten separately);
//! - no-ops, which exist only to advance timestamps.
//!
//! Resharding bookkeeping is not filtered; its appearance aborts the run.

use super::entry::{OpKind, OplogEntry};

/// The `config` collections whose presence marks an active resharding
/// operation.
pub const RESHARDING_COLLECTIONS: [&str; 3] = [
    "reshardingOperations",
    "localReshardingOperations.donor",
    "localReshardingOperations.recipient",
];

/// Returns true when replay must drop the entry.
pub fn should_skip(entry: &OplogEntry) -> bool {
    let ns = entry.ns();
    if ns.starts_with("config.system.sessions") {
        return true;
    }
    if ns.starts_with("config.cache.") {
        return true;
    }
    match entry.op() {
        OpKind::Noop => true,
        OpKind::Command => matches!(
            entry.command_name(),
            Some("startIndexBuild") | Some("abortIndexBuild")
        ),
        _ => false,
    }
}

/// Returns true when the entry shows a resharding operation starting or
/// running, which makes the stream unusable for a consistent restore.
pub fn is_resharding_related(entry: &OplogEntry) -> bool {
    if entry.db() != "config" {
        return false;
    }
    let Some(coll) = entry.ns().strip_prefix("config.") else {
        return false;
    };
    if RESHARDING_COLLECTIONS.contains(&coll) {
        return true;
    }
    // A create command for one of the bookkeeping collections
    if entry.op() == OpKind::Command && entry.command_name() == Some("create") {
        if let Some(object) = entry.object() {
            if let Ok(created) = object.get_str("create") {
                return RESHARDING_COLLECTIONS.contains(&created);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn entry(doc: bson::Document) -> OplogEntry {
        OplogEntry::from_document(doc).unwrap()
    }

    #[test]
    fn test_sessions_namespace_skipped() {
        assert!(should_skip(&entry(
            doc! {"op": "i", "ns": "config.system.sessions", "o": {}}
        )));
        assert!(should_skip(&entry(
            doc! {"op": "d", "ns": "config.system.sessions.chunk", "o": {}}
        )));
    }

    #[test]
    fn test_cache_namespace_skipped() {
        assert!(should_skip(&entry(
            doc! {"op": "u", "ns": "config.cache.collections", "o": {}, "o2": {}}
        )));
        assert!(!should_skip(&entry(
            doc! {"op": "i", "ns": "config.settings", "o": {}}
        )));
    }

    #[test]
    fn test_index_build_commands_skipped() {
        assert!(should_skip(&entry(doc! {
            "op": "c", "ns": "db1.$cmd",
            "o": {"startIndexBuild": "users", "indexBuildUUID": "x", "indexes": []},
        })));
        assert!(should_skip(&entry(doc! {
            "op": "c", "ns": "db1.$cmd",
            "o": {"abortIndexBuild": "users", "indexBuildUUID": "x"},
        })));
        assert!(!should_skip(&entry(doc! {
            "op": "c", "ns": "db1.$cmd",
            "o": {"commitIndexBuild": "users", "indexes": []},
        })));
    }

    #[test]
    fn test_noops_skipped() {
        assert!(should_skip(&entry(
            doc! {"op": "n", "ns": "", "o": {"msg": "periodic noop"}}
        )));
    }

    #[test]
    fn test_ordinary_writes_kept() {
        assert!(!should_skip(&entry(
            doc! {"op": "i", "ns": "db1.users", "o": {"_id": 1}}
        )));
        assert!(!should_skip(&entry(
            doc! {"op": "d", "ns": "db1.users", "o": {"_id": 1}}
        )));
    }

    #[test]
    fn test_resharding_detection() {
        assert!(is_resharding_related(&entry(
            doc! {"op": "i", "ns": "config.reshardingOperations", "o": {}}
        )));
        assert!(is_resharding_related(&entry(
            doc! {"op": "i", "ns": "config.localReshardingOperations.donor", "o": {}}
        )));
        assert!(is_resharding_related(&entry(doc! {
            "op": "c", "ns": "config.$cmd",
            "o": {"create": "localReshardingOperations.recipient"},
        })));
        assert!(!is_resharding_related(&entry(
            doc! {"op": "i", "ns": "config.settings", "o": {}}
        )));
        assert!(!is_resharding_related(&entry(
            doc! {"op": "i", "ns": "db1.reshardingOperations", "o": {}}
        )));
    }
}
