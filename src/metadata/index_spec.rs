//! Index specs and the rewrites applied before index builds
//!
//! An index spec is an ordered document with at least a key pattern and a
//! name. Everything else (`unique`, `sparse`, `expireAfterSeconds`,
//! collation, partial filter, the `v` version, the legacy `ns` field) rides
//! along as options. Rewrites:
//!
//! - the `ns` field is stripped for servers that reject it and filled in
//!   for older servers that require it;
//! - the `v` field is elided unless version preservation is requested;
//! - legacy dumps may carry key values no modern server accepts (`0`,
//!   `true`, `"foo"`); those are rewritten to ascending `1` on plain
//!   fields, after which exact duplicates and renamed duplicates collapse;
//! - hashed indexes on dotted fields are optionally rewritten to ascending.

use bson::{Bson, Document};

use crate::catalog::Namespace;
use crate::server::ServerVersion;

use super::errors::{MetadataError, MetadataResult};

/// Longest fully-qualified index name (`<db>.<coll>.$<name>`) accepted by
/// servers that still enforce the limit.
pub const MAX_FULL_INDEX_NAME_LEN: usize = 127;

/// One index, as carried in metadata files and sent to servers.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Key pattern, order preserved
    key: Document,
    /// Index name
    name: String,
    /// Remaining options in original order, `key`/`name` excluded
    options: Document,
}

impl IndexSpec {
    /// Builds a spec from a key pattern and name with no extra options.
    pub fn new(key: Document, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            options: Document::new(),
        }
    }

    /// Parses the flat document shape (`{v, key, name, ...options}`).
    pub fn from_document(doc: &Document) -> MetadataResult<Self> {
        let key = doc
            .get_document("key")
            .map_err(|_| MetadataError::invalid_index("missing key pattern"))?
            .clone();
        let name = doc
            .get_str("name")
            .map_err(|_| MetadataError::invalid_index("missing name"))?
            .to_string();
        let mut options = Document::new();
        for (k, v) in doc {
            if k != "key" && k != "name" {
                options.insert(k.clone(), v.clone());
            }
        }
        Ok(Self { key, name, options })
    }

    /// Returns the key pattern.
    pub fn key(&self) -> &Document {
        &self.key
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the options (everything but `key`/`name`).
    pub fn options(&self) -> &Document {
        &self.options
    }

    /// Inserts or replaces an option.
    pub fn set_option(&mut self, key: &str, value: impl Into<Bson>) {
        self.options.insert(key.to_string(), value.into());
    }

    /// Returns true for the implicit primary key index.
    pub fn is_id_index(&self) -> bool {
        self.key.len() == 1 && self.key.get("_id").is_some()
    }

    /// Serializes to the flat document shape with `v` first when present,
    /// then `key`, `name`, and the remaining options in original order.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if let Some(v) = self.options.get("v") {
            doc.insert("v", v.clone());
        }
        doc.insert("key", self.key.clone());
        doc.insert("name", self.name.clone());
        for (k, value) in &self.options {
            if k != "v" {
                doc.insert(k.clone(), value.clone());
            }
        }
        doc
    }

    /// Prepares the spec for a `createIndexes` call against `version`.
    ///
    /// Strips or fills the `ns` field as the server expects, and elides the
    /// index version unless preservation was requested.
    pub fn prepare_for_server(
        &self,
        ns: &Namespace,
        version: ServerVersion,
        keep_index_version: bool,
    ) -> MetadataResult<Document> {
        let mut spec = self.clone();
        if version.at_least(4, 4, 0) {
            // Servers from 4.4 reject the namespace field outright
            spec.options.remove("ns");
        } else {
            spec.options
                .insert("ns".to_string(), Bson::String(ns.to_string()));
        }
        if !keep_index_version {
            spec.options.remove("v");
        }

        if version.enforces_index_name_limit() {
            let full = format!("{}.${}", ns, spec.name);
            if full.len() > MAX_FULL_INDEX_NAME_LEN {
                return Err(MetadataError::index_name_too_long(
                    &spec.name,
                    full.len(),
                    MAX_FULL_INDEX_NAME_LEN,
                ));
            }
        }
        Ok(spec.to_document())
    }
}

/// Key values modern servers accept.
fn key_value_recognized(value: &Bson) -> bool {
    match value {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => true,
        Bson::String(s) => matches!(
            s.as_str(),
            "2d" | "2dsphere" | "geoHaystack" | "text" | "hashed" | "columnstore" | "wildcard"
        ),
        _ => false,
    }
}

/// Rewrites unrecognized key values on plain (non-dotted) fields to
/// ascending `1`, then drops specs whose keys collapsed into duplicates.
///
/// Legacy dumps produce families like `foo_`, `foo_1`, `foo_1.0` from key
/// values `""`, `1`, `1.0`; after rewriting they all carry `{foo: 1}` and
/// only the first survives.
pub fn fix_legacy_indexes(specs: Vec<IndexSpec>) -> Vec<IndexSpec> {
    let mut rewritten: Vec<IndexSpec> = specs
        .into_iter()
        .map(|mut spec| {
            let mut key = Document::new();
            for (field, value) in spec.key.iter() {
                if !field.contains('.') && !key_value_recognized(value) {
                    key.insert(field.clone(), Bson::Int32(1));
                } else {
                    key.insert(field.clone(), value.clone());
                }
            }
            spec.key = key;
            spec
        })
        .collect();

    let mut seen_keys: Vec<Document> = Vec::new();
    rewritten.retain(|spec| {
        if seen_keys.contains(&spec.key) {
            return false;
        }
        seen_keys.push(spec.key.clone());
        true
    });
    rewritten
}

/// Rewrites hashed indexes on dotted fields to ascending `1`.
///
/// Hashed indexes on plain fields are preserved; only the dotted form,
/// which some servers created but none accept back, is rewritten.
pub fn fix_hashed_dotted_indexes(specs: &mut [IndexSpec]) {
    for spec in specs.iter_mut() {
        let mut key = Document::new();
        for (field, value) in spec.key.iter() {
            let hashed = matches!(value, Bson::String(s) if s == "hashed");
            if hashed && field.contains('.') {
                key.insert(field.clone(), Bson::Int32(1));
            } else {
                key.insert(field.clone(), value.clone());
            }
        }
        spec.key = key;
    }
}

/// Drops every `_id` index spec after the first.
///
/// Some historical dumps carry more than one `_id` index; servers build
/// exactly one.
pub fn dedupe_id_indexes(specs: Vec<IndexSpec>) -> Vec<IndexSpec> {
    let mut seen_id = false;
    specs
        .into_iter()
        .filter(|spec| {
            if spec.is_id_index() {
                if seen_id {
                    return false;
                }
                seen_id = true;
            }
            true
        })
        .collect()
}
