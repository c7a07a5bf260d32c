//! Archive prelude
//!
//! The prelude is the first message of every archive and, in directory
//! mode, the optional `prelude.json[.gz]` at the output root: tool and
//! server versions, the format version, and one entry per dumped
//! namespace with its metadata JSON and size hint. Readers explore it as
//! a virtual directory tree without consuming any bodies.

use std::collections::BTreeMap;

use bson::Document;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::catalog::Namespace;

use super::errors::{ArchiveError, ArchiveResult};

/// Current archive format version.
pub const FORMAT_VERSION: u32 = 1;

/// The version string this build stamps into preludes.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One namespace recorded in the prelude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreludeEntry {
    pub db: String,
    pub collection: String,
    /// The collection's metadata file content (extended JSON), empty for
    /// streams with no metadata (the oplog)
    #[serde(default)]
    pub metadata: String,
    /// Size hint in bytes
    #[serde(default)]
    pub size: u64,
}

impl PreludeEntry {
    /// The namespace this entry describes.
    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.db, &self.collection)
    }
}

/// The archive prelude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivePrelude {
    pub tool_version: String,
    pub server_version: String,
    pub format_version: u32,
    /// When the dump was taken (RFC3339 format)
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub namespaces: Vec<PreludeEntry>,
}

impl ArchivePrelude {
    /// A prelude for a dump from the given server version, stamped with
    /// the current time.
    pub fn new(server_version: impl Into<String>) -> Self {
        let created_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        Self::with_timestamp(server_version, created_at)
    }

    /// A prelude with an explicit creation timestamp.
    pub fn with_timestamp(
        server_version: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            tool_version: TOOL_VERSION.to_string(),
            server_version: server_version.into(),
            format_version: FORMAT_VERSION,
            created_at: created_at.into(),
            namespaces: Vec::new(),
        }
    }

    /// Records one namespace.
    pub fn push(&mut self, db: &str, collection: &str, metadata: String, size: u64) {
        self.namespaces.push(PreludeEntry {
            db: db.to_string(),
            collection: collection.to_string(),
            metadata,
            size,
        });
    }

    /// Serializes to the archive message payload.
    pub fn to_document(&self) -> ArchiveResult<Document> {
        bson::to_document(self)
            .map_err(|e| ArchiveError::format(format!("unencodable prelude: {}", e)))
    }

    /// Parses the archive message payload.
    pub fn from_document(doc: &Document) -> ArchiveResult<Self> {
        bson::from_document(doc.clone())
            .map_err(|e| ArchiveError::format(format!("undecodable prelude: {}", e)))
    }

    /// Serializes to `prelude.json` bytes.
    pub fn to_json_bytes(&self) -> ArchiveResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| ArchiveError::format(format!("unencodable prelude JSON: {}", e)))
    }

    /// Parses `prelude.json` bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> ArchiveResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ArchiveError::format(format!("undecodable prelude JSON: {}", e)))
    }

    /// The virtual directory view: database to its entries, in order.
    pub fn tree(&self) -> BTreeMap<&str, Vec<&PreludeEntry>> {
        let mut tree: BTreeMap<&str, Vec<&PreludeEntry>> = BTreeMap::new();
        for entry in &self.namespaces {
            tree.entry(entry.db.as_str()).or_default().push(entry);
        }
        tree
    }

    /// Finds the entry for a namespace.
    pub fn find(&self, ns: &Namespace) -> Option<&PreludeEntry> {
        self.namespaces
            .iter()
            .find(|e| e.db == ns.db() && e.collection == ns.coll())
    }
}
