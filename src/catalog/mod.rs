//! Namespace catalog
//!
//! The namespace model shared by dump and restore: `(database, collection)`
//! identity, timeseries bucket mapping, the `config` database allowlist,
//! file-system-safe name escaping, and include/exclude/rename pattern
//! matching.

mod errors;
mod escape;
mod filter;
mod namespace;

pub use errors::{CatalogError, CatalogErrorCode, CatalogResult};
pub use escape::{
    collection_file_stem, escape_collection_name, name_hash, truncated_hash_suffix,
    unescape_bytes, unescape_collection_name, MAX_ESCAPED_LEN,
};
pub use filter::{NamespaceMatcher, NamespaceRenamer};
pub use namespace::{
    config_collection_recognized, reject_bucket_argument, Namespace, BUCKET_PREFIX,
    CONFIG_ALLOWLIST,
};
