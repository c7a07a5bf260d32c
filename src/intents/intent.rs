//! The intent: one planned unit of work for one namespace

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::bsonio::{open_reader, BsonIoResult};
use crate::catalog::Namespace;
use crate::metadata::CollectionMetadata;

/// What an intent is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    /// An ordinary collection
    Normal,
    /// A view; no documents, created from options only
    View,
    /// A timeseries collection; the intent owns the bucket byte stream
    Timeseries,
    /// `admin.system.users` (or a single-db users file)
    Users,
    /// `admin.system.roles`
    Roles,
    /// The `system.version` auth-schema document
    AuthVersion,
    /// The replication log stream
    Oplog,
    /// The prelude metadata record itself
    PreludeMetadata,
}

impl IntentKind {
    /// Returns true for the kinds scheduled on the collection worker pool.
    pub fn is_collection_like(&self) -> bool {
        matches!(
            self,
            IntentKind::Normal | IntentKind::View | IntentKind::Timeseries
        )
    }
}

/// Where an intent's document bytes live.
///
/// Directory dumps hand restore a file path (possibly gzipped); archive
/// dumps hand it the demultiplexed body buffer. Dump-side intents carry no
/// location; their sinks are created when a worker picks them up.
#[derive(Debug, Clone)]
pub enum DataLocation {
    /// No data stream (views, dump-side intents)
    None,
    /// A file on disk, `.gz` decided by extension
    File(PathBuf),
    /// An in-memory body from the archive demultiplexer
    Buffer(Arc<Vec<u8>>),
}

impl DataLocation {
    /// Opens the location for reading; `None` yields no reader.
    pub fn open(&self) -> BsonIoResult<Option<Box<dyn Read + Send>>> {
        match self {
            DataLocation::None => Ok(None),
            DataLocation::File(path) => Ok(Some(open_reader(path)?)),
            DataLocation::Buffer(bytes) => {
                let bytes = Arc::clone(bytes);
                Ok(Some(Box::new(BufferReader { bytes, pos: 0 })))
            }
        }
    }

    /// Returns true when there is a data stream at all.
    pub fn is_some(&self) -> bool {
        !matches!(self, DataLocation::None)
    }

    /// A human-readable location for logs.
    pub fn describe(&self) -> String {
        match self {
            DataLocation::None => "(none)".to_string(),
            DataLocation::File(path) => path.display().to_string(),
            DataLocation::Buffer(bytes) => format!("(archive, {} bytes)", bytes.len()),
        }
    }
}

struct BufferReader {
    bytes: Arc<Vec<u8>>,
    pos: usize,
}

impl Read for BufferReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.bytes[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// One planned unit of work.
///
/// Immutable once the plan is frozen; progress lives in the executing
/// worker, not here.
#[derive(Debug, Clone)]
pub struct Intent {
    /// Post-rename target namespace; the plan key
    ns: Namespace,
    /// The namespace as dumped, before any rename
    source_ns: Namespace,
    kind: IntentKind,
    data: DataLocation,
    metadata: Option<CollectionMetadata>,
    size_hint: u64,
}

impl Intent {
    /// Creates an intent with identical source and target namespaces.
    pub fn new(ns: Namespace, kind: IntentKind) -> Self {
        Self {
            source_ns: ns.clone(),
            ns,
            kind,
            data: DataLocation::None,
            metadata: None,
            size_hint: 0,
        }
    }

    /// Redirects the intent to a rename target.
    pub fn with_rename(mut self, target: Namespace) -> Self {
        self.ns = target;
        self
    }

    /// Attaches the document byte stream.
    pub fn with_data(mut self, data: DataLocation) -> Self {
        self.data = data;
        self
    }

    /// Attaches parsed metadata.
    pub fn with_metadata(mut self, metadata: CollectionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the size hint in bytes.
    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = size;
        self
    }

    /// The post-rename namespace (the unique plan key).
    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    /// The namespace as it appeared in the dump.
    pub fn source_namespace(&self) -> &Namespace {
        &self.source_ns
    }

    /// Returns true when a rename redirects this intent.
    pub fn is_renamed(&self) -> bool {
        self.ns != self.source_ns
    }

    pub fn kind(&self) -> IntentKind {
        self.kind
    }

    pub fn data(&self) -> &DataLocation {
        &self.data
    }

    pub fn metadata(&self) -> Option<&CollectionMetadata> {
        self.metadata.as_ref()
    }

    pub fn size_hint(&self) -> u64 {
        self.size_hint
    }

    /// The UUID recorded for this collection, if any.
    pub fn uuid(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.uuid.as_deref())
    }

    /// Returns true for `system.*` targets other than buckets.
    pub fn is_special_collection(&self) -> bool {
        self.ns.is_system() && !self.ns.is_bucket()
    }
}
