//! Per-entry replay transformations
//!
//! Two-phase index builds collapse to their commit: `commitIndexBuild` is
//! rewritten to a `createIndexes` command carrying the same index set on
//! the same namespace, with the build identifier dropped. `createIndexes`
//! itself passes through on servers that implement it and is lowered to
//! `system.indexes` inserts for the ancient ones that do not.

use bson::{doc, Bson, Document};

use crate::server::ServerVersion;

use super::entry::{OpKind, OplogEntry};
use super::errors::{OplogError, OplogResult};

/// First server version with the `createIndexes` command.
const CREATE_INDEXES_SINCE: ServerVersion = ServerVersion::new(2, 6, 0);

/// Rewrites one entry into the documents actually applied.
pub fn transform(entry: OplogEntry, server_version: ServerVersion) -> OplogResult<Vec<Document>> {
    if entry.op() != OpKind::Command {
        return Ok(vec![entry.into_document()]);
    }

    match entry.command_name() {
        Some("commitIndexBuild") => {
            let object = entry
                .object()
                .ok_or_else(|| OplogError::entry("commitIndexBuild without payload"))?;
            let coll = object
                .get_str("commitIndexBuild")
                .map_err(|_| OplogError::entry("commitIndexBuild without collection"))?;
            let indexes = object
                .get_array("indexes")
                .map_err(|_| OplogError::entry("commitIndexBuild without indexes"))?
                .clone();

            let rewritten_object = doc! {
                "createIndexes": coll,
                "indexes": indexes,
            };
            let mut rewritten = entry.as_document().clone();
            rewritten.insert("o", rewritten_object);
            let rewritten = OplogEntry::from_document(rewritten).expect("op/ns preserved");
            // The rewritten command takes the createIndexes path below
            transform(rewritten, server_version)
        }
        Some("createIndexes") => {
            if server_version >= CREATE_INDEXES_SINCE {
                return Ok(vec![entry.into_document()]);
            }
            lower_to_system_indexes(&entry)
        }
        _ => Ok(vec![entry.into_document()]),
    }
}

/// Lowers a `createIndexes` command to `system.indexes` inserts.
fn lower_to_system_indexes(entry: &OplogEntry) -> OplogResult<Vec<Document>> {
    let object = entry
        .object()
        .ok_or_else(|| OplogError::entry("createIndexes without payload"))?;
    let coll = object
        .get_str("createIndexes")
        .map_err(|_| OplogError::entry("createIndexes without collection"))?;
    let db = entry.db().to_string();

    let mut specs: Vec<Document> = Vec::new();
    if let Ok(indexes) = object.get_array("indexes") {
        for index in indexes {
            let index = index
                .as_document()
                .ok_or_else(|| OplogError::entry("index spec is not a document"))?;
            specs.push(index.clone());
        }
    } else {
        // The single-index command form carries the spec fields inline
        let mut spec = Document::new();
        for (key, value) in object {
            if key != "createIndexes" {
                spec.insert(key.clone(), value.clone());
            }
        }
        specs.push(spec);
    }

    let mut lowered = Vec::with_capacity(specs.len());
    for mut spec in specs {
        spec.insert("ns", Bson::String(format!("{}.{}", db, coll)));
        let mut insert = Document::new();
        if let Some(ts) = entry.timestamp() {
            insert.insert("ts", ts);
        }
        insert.insert("op", "i");
        insert.insert("ns", format!("{}.system.indexes", db));
        insert.insert("o", spec);
        lowered.push(insert);
    }
    Ok(lowered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Timestamp;

    fn entry(doc: Document) -> OplogEntry {
        OplogEntry::from_document(doc).unwrap()
    }

    #[test]
    fn test_plain_writes_pass_through() {
        let doc = doc! {"op": "i", "ns": "db1.users", "o": {"_id": 1}};
        let out = transform(entry(doc.clone()), ServerVersion::new(8, 0, 0)).unwrap();
        assert_eq!(out, vec![doc]);
    }

    #[test]
    fn test_commit_index_build_rewritten() {
        let doc = doc! {
            "ts": Timestamp { time: 4, increment: 0 },
            "op": "c",
            "ns": "db1.$cmd",
            "o": {
                "commitIndexBuild": "users",
                "indexBuildUUID": "b5c0e355",
                "indexes": [
                    {"v": 2, "key": {"a": 1}, "name": "a_1"},
                    {"v": 2, "key": {"b": -1}, "name": "b_-1"},
                ],
            },
        };
        let out = transform(entry(doc), ServerVersion::new(8, 0, 0)).unwrap();
        assert_eq!(out.len(), 1);

        let object = out[0].get_document("o").unwrap();
        assert_eq!(object.get_str("createIndexes").unwrap(), "users");
        assert_eq!(object.get_array("indexes").unwrap().len(), 2);
        assert!(!object.contains_key("indexBuildUUID"));
        // Namespace is preserved
        assert_eq!(out[0].get_str("ns").unwrap(), "db1.$cmd");
    }

    #[test]
    fn test_create_indexes_passes_through_on_supported_servers() {
        let doc = doc! {
            "op": "c",
            "ns": "db1.$cmd",
            "o": {"createIndexes": "users", "indexes": [{"key": {"a": 1}, "name": "a_1"}]},
        };
        let out = transform(entry(doc.clone()), ServerVersion::new(4, 4, 0)).unwrap();
        assert_eq!(out, vec![doc]);
    }

    #[test]
    fn test_create_indexes_lowered_for_ancient_servers() {
        let doc = doc! {
            "op": "c",
            "ns": "db1.$cmd",
            "o": {"createIndexes": "users", "indexes": [
                {"v": 1, "key": {"a": 1}, "name": "a_1"},
                {"v": 1, "key": {"b": 1}, "name": "b_1"},
            ]},
        };
        let out = transform(entry(doc), ServerVersion::new(2, 4, 0)).unwrap();
        assert_eq!(out.len(), 2);
        for insert in &out {
            assert_eq!(insert.get_str("op").unwrap(), "i");
            assert_eq!(insert.get_str("ns").unwrap(), "db1.system.indexes");
            assert_eq!(
                insert.get_document("o").unwrap().get_str("ns").unwrap(),
                "db1.users"
            );
        }
    }

    #[test]
    fn test_single_index_command_form_lowered() {
        let doc = doc! {
            "op": "c",
            "ns": "db1.$cmd",
            "o": {"createIndexes": "users", "v": 2, "key": {"a": 1}, "name": "a_1"},
        };
        let out = transform(entry(doc), ServerVersion::new(2, 4, 0)).unwrap();
        assert_eq!(out.len(), 1);
        let spec = out[0].get_document("o").unwrap();
        assert_eq!(spec.get_str("name").unwrap(), "a_1");
        assert_eq!(spec.get_str("ns").unwrap(), "db1.users");
    }
}
