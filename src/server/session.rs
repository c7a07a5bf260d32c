//! The driver seam
//!
//! Connection establishment, authentication, and TLS belong to a driver
//! and are out of scope; this trait captures the operations the dump and
//! restore pipelines actually consume, so the pipelines can run against a
//! real driver adapter or the in-memory server interchangeably.

use std::cmp::Ordering;

use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson, Document, Timestamp};
use uuid::Uuid;

use crate::catalog::Namespace;

use super::errors::{ServerError, ServerResult, WriteFailure};
use super::version::ServerVersion;

/// Cluster topology, as far as the tools care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Standalone,
    ReplicaSet,
    Sharded,
}

/// What the tools know about the connected server.
#[derive(Debug, Clone, Copy)]
pub struct ServerInfo {
    pub version: ServerVersion,
    pub topology: Topology,
    /// True when connected through a managed database proxy, which owns
    /// users, roles, and some system namespaces.
    pub managed_proxy: bool,
}

impl ServerInfo {
    /// Oplog capture requires a replication log, so a replica set (or the
    /// shard members of a cluster, which present as replica sets).
    pub fn has_oplog(&self) -> bool {
        self.topology == Topology::ReplicaSet
    }
}

/// Collection flavor reported by enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Collection,
    View,
    Timeseries,
}

impl CollectionKind {
    /// The `type` string used in listings and metadata files.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Collection => "collection",
            CollectionKind::View => "view",
            CollectionKind::Timeseries => "timeseries",
        }
    }

    /// Parses the listing/metadata `type` string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "collection" => Some(CollectionKind::Collection),
            "view" => Some(CollectionKind::View),
            "timeseries" => Some(CollectionKind::Timeseries),
            _ => None,
        }
    }
}

/// One collection as reported by `listCollections`.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    pub kind: CollectionKind,
    /// Creation options, order preserved
    pub options: Document,
    /// Collection UUID as lowercase hex, when the server reports one
    pub uuid: Option<String>,
}

/// Filter/hint options for a collection scan.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub filter: Option<Document>,
    /// Index hint; views reject hints, and ordinary scans leave the
    /// planner alone unless the caller insists
    pub hint: Option<Document>,
}

/// Outcome of one bulk insert.
#[derive(Debug, Clone, Default)]
pub struct BulkResult {
    pub inserted: u64,
    pub failures: Vec<WriteFailure>,
}

/// A forward-only cursor over raw BSON documents.
pub trait DocumentCursor: Send {
    /// Returns the next document's bytes, or `None` at cursor end.
    fn next_raw(&mut self) -> ServerResult<Option<Vec<u8>>>;
}

/// A cursor over an in-memory snapshot, used by adapters that buffer.
pub struct VecCursor {
    docs: std::vec::IntoIter<Vec<u8>>,
}

impl VecCursor {
    pub fn new(docs: Vec<Vec<u8>>) -> Self {
        Self {
            docs: docs.into_iter(),
        }
    }
}

impl DocumentCursor for VecCursor {
    fn next_raw(&mut self) -> ServerResult<Option<Vec<u8>>> {
        Ok(self.docs.next())
    }
}

/// The operations both tools consume from the driver.
///
/// Implementations must be safe to share across worker threads; the
/// connection pool underneath is expected to bound its own concurrency.
pub trait ServerSession: Send + Sync {
    /// Server version, topology, and proxy detection.
    fn info(&self) -> ServerResult<ServerInfo>;

    /// Database names, excluding none; callers filter.
    fn list_database_names(&self) -> ServerResult<Vec<String>>;

    /// Collections of one database with options and UUIDs.
    fn list_collections(&self, db: &str) -> ServerResult<Vec<CollectionSpec>>;

    /// Approximate collection size in bytes, used for intent size hints.
    fn collection_byte_size(&self, ns: &Namespace) -> ServerResult<u64>;

    /// Index specs of one collection, as flat documents.
    fn list_indexes(&self, ns: &Namespace) -> ServerResult<Vec<Document>>;

    /// Opens a scan over a collection or view.
    fn find(&self, ns: &Namespace, options: FindOptions) -> ServerResult<Box<dyn DocumentCursor>>;

    /// Bulk-inserts raw documents. Per-document failures come back in the
    /// result; a transport-level failure is an `Err`.
    fn insert_many(
        &self,
        ns: &Namespace,
        docs: &[Vec<u8>],
        ordered: bool,
        bypass_validation: bool,
    ) -> ServerResult<BulkResult>;

    /// Runs a database command, preserving key order.
    fn run_command(&self, db: &str, command: Document) -> ServerResult<Document>;

    /// Drops a collection; missing namespaces are not an error.
    fn drop_collection(&self, ns: &Namespace) -> ServerResult<()>;

    /// Applies replication-log-shaped entries atomically.
    fn apply_ops(&self, entries: &[Document]) -> ServerResult<Document> {
        let ops: Vec<Bson> = entries.iter().cloned().map(Bson::Document).collect();
        self.run_command("admin", doc! {"applyOps": ops})
    }

    /// The newest replication-log position.
    fn latest_oplog_position(&self) -> ServerResult<Timestamp>;

    /// A cursor over replication-log entries at or after `start`.
    fn oplog_since(&self, start: Timestamp) -> ServerResult<Box<dyn DocumentCursor>>;

    /// Returns true if the collection exists.
    fn collection_exists(&self, ns: &Namespace) -> ServerResult<bool> {
        Ok(self
            .list_collections(ns.db())?
            .iter()
            .any(|c| c.name == ns.coll()))
    }
}

/// Orders replication-log positions.
pub fn cmp_timestamps(a: Timestamp, b: Timestamp) -> Ordering {
    (a.time, a.increment).cmp(&(b.time, b.increment))
}

/// Decodes a dump's hex UUID into the binary form apply-ops expects.
pub fn uuid_hex_to_binary(uuid_hex: &str) -> ServerResult<Binary> {
    let parsed = Uuid::parse_str(uuid_hex)
        .map_err(|e| ServerError::connection(format!("invalid collection UUID '{}': {}", uuid_hex, e)))?;
    Ok(Binary {
        subtype: BinarySubtype::Uuid,
        bytes: parsed.as_bytes().to_vec(),
    })
}

/// Encodes a binary UUID back to the hex form metadata files carry.
pub fn binary_to_uuid_hex(binary: &Binary) -> Option<String> {
    if binary.subtype != BinarySubtype::Uuid || binary.bytes.len() != 16 {
        return None;
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&binary.bytes);
    Some(Uuid::from_bytes(bytes).simple().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp { time: 10, increment: 1 };
        let b = Timestamp { time: 10, increment: 2 };
        let c = Timestamp { time: 11, increment: 0 };
        assert_eq!(cmp_timestamps(a, b), Ordering::Less);
        assert_eq!(cmp_timestamps(b, c), Ordering::Less);
        assert_eq!(cmp_timestamps(c, c), Ordering::Equal);
    }

    #[test]
    fn test_uuid_roundtrip() {
        let hex = "699f503df64b4aa8a484a8052046fa3a";
        let binary = uuid_hex_to_binary(hex).unwrap();
        assert_eq!(binary.subtype, BinarySubtype::Uuid);
        assert_eq!(binary.bytes.len(), 16);
        assert_eq!(binary_to_uuid_hex(&binary).unwrap(), hex);
    }

    #[test]
    fn test_invalid_uuid_rejected() {
        assert!(uuid_hex_to_binary("not-a-uuid").is_err());
    }

    #[test]
    fn test_collection_kind_strings() {
        for kind in [
            CollectionKind::Collection,
            CollectionKind::View,
            CollectionKind::Timeseries,
        ] {
            assert_eq!(CollectionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CollectionKind::parse("index"), None);
    }

    #[test]
    fn test_vec_cursor_drains() {
        let mut cursor = VecCursor::new(vec![vec![1], vec![2]]);
        assert_eq!(cursor.next_raw().unwrap(), Some(vec![1]));
        assert_eq!(cursor.next_raw().unwrap(), Some(vec![2]));
        assert_eq!(cursor.next_raw().unwrap(), None);
    }
}
