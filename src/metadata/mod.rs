//! Collection metadata and index handling
//!
//! The metadata file format (original name, type, UUID, ordered options,
//! index specs) plus every index rewrite the restore path applies before
//! building: namespace stripping, version elision, the legacy key rewrite
//! with duplicate collapse, the hashed-dotted rewrite, and the pre-4.2
//! name length check.

mod collection_meta;
mod errors;
mod index_spec;

pub use collection_meta::{CollectionMetadata, MIXED_SCHEMA_OPTION};
pub use errors::{MetadataError, MetadataErrorCode, MetadataResult};
pub use index_spec::{
    dedupe_id_indexes, fix_hashed_dotted_indexes, fix_legacy_indexes, IndexSpec,
    MAX_FULL_INDEX_NAME_LEN,
};
