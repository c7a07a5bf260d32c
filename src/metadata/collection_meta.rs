//! Collection metadata files
//!
//! Every data file in a dump (except the oplog and the auth-version doc)
//! has a sibling metadata file: canonical extended JSON carrying the
//! original collection name, the collection type, the UUID when known, the
//! creation options in server order, and the index specs. Key order inside
//! `options` is load-bearing (view pipelines, clustered index specs), so
//! parsing goes through ordered documents end to end.

use bson::{Bson, Document};

use crate::server::CollectionKind;

use super::errors::{MetadataError, MetadataResult};
use super::index_spec::IndexSpec;

/// Option key recording that a timeseries bucket collection may carry
/// mixed-schema buckets.
pub const MIXED_SCHEMA_OPTION: &str = "timeseriesBucketsMayHaveMixedSchemaData";

/// Parsed contents of one metadata file.
#[derive(Debug, Clone)]
pub struct CollectionMetadata {
    /// Original collection name (authoritative; file stems may be escaped
    /// or truncated)
    pub collection_name: String,
    pub kind: CollectionKind,
    /// Collection UUID as lowercase hex
    pub uuid: Option<String>,
    /// Creation options, order preserved
    pub options: Document,
    pub indexes: Vec<IndexSpec>,
}

impl CollectionMetadata {
    /// Metadata for a plain collection with no options or indexes.
    pub fn empty(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            kind: CollectionKind::Collection,
            uuid: None,
            options: Document::new(),
            indexes: Vec::new(),
        }
    }

    /// Returns true for view metadata.
    pub fn is_view(&self) -> bool {
        self.kind == CollectionKind::View
    }

    /// Returns true for timeseries metadata.
    pub fn is_timeseries(&self) -> bool {
        self.kind == CollectionKind::Timeseries
    }

    /// Returns true when the dump recorded mixed-schema buckets.
    pub fn mixed_schema(&self) -> bool {
        self.options.get_bool(MIXED_SCHEMA_OPTION).unwrap_or(false)
    }

    /// Records the mixed-schema flag.
    pub fn set_mixed_schema(&mut self) {
        self.options
            .insert(MIXED_SCHEMA_OPTION.to_string(), Bson::Boolean(true));
    }

    /// Creation options as sent to the server: the stored options minus
    /// bookkeeping keys that are not create parameters.
    pub fn create_options(&self) -> Document {
        let mut options = self.options.clone();
        options.remove(MIXED_SCHEMA_OPTION);
        options
    }

    /// Serializes to canonical extended JSON bytes.
    pub fn to_json_bytes(&self) -> MetadataResult<Vec<u8>> {
        let mut doc = Document::new();
        doc.insert("options", self.options.clone());
        doc.insert(
            "indexes",
            Bson::Array(
                self.indexes
                    .iter()
                    .map(|i| Bson::Document(i.to_document()))
                    .collect(),
            ),
        );
        if let Some(uuid) = &self.uuid {
            doc.insert("uuid", uuid.clone());
        }
        doc.insert("collectionName", self.collection_name.clone());
        doc.insert("type", self.kind.as_str());

        let value = Bson::Document(doc).into_canonical_extjson();
        serde_json::to_vec(&value).map_err(|e| MetadataError::invalid_json(e.to_string()))
    }

    /// Parses metadata bytes. An empty file parses to `None` (dumps of
    /// collections the source server was still creating can leave one).
    pub fn from_json_bytes(bytes: &[u8]) -> MetadataResult<Option<Self>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| MetadataError::invalid_json(e.to_string()))?;
        let bson = Bson::try_from(value).map_err(|e| MetadataError::invalid_json(e.to_string()))?;
        let doc = match bson {
            Bson::Document(doc) => doc,
            _ => return Err(MetadataError::invalid_json("not a JSON object")),
        };

        let collection_name = doc
            .get_str("collectionName")
            .map_err(|_| MetadataError::missing_field("collectionName"))?
            .to_string();
        let kind = match doc.get_str("type") {
            Ok(s) => CollectionKind::parse(s)
                .ok_or_else(|| MetadataError::unknown_collection_type(s))?,
            // Old dumps wrote no type field; everything was a collection
            Err(_) => CollectionKind::Collection,
        };
        let uuid = doc.get_str("uuid").ok().map(|s| s.to_string());
        let options = doc
            .get_document("options")
            .ok()
            .cloned()
            .unwrap_or_default();

        let mut indexes = Vec::new();
        if let Ok(array) = doc.get_array("indexes") {
            for entry in array {
                let entry = entry.as_document().ok_or_else(|| {
                    MetadataError::invalid_index("index entry is not a document")
                })?;
                indexes.push(IndexSpec::from_document(entry)?);
            }
        }

        Ok(Some(Self {
            collection_name,
            kind,
            uuid,
            options,
            indexes,
        }))
    }
}
