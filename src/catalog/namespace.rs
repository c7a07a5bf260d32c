//! Namespace model
//!
//! A namespace is a `(database, collection)` pair. Database names never
//! contain the `.` separator; collection names may contain any codepoint,
//! including further dots (`system.buckets.weather`) and embedded newlines.
//! Parsing therefore splits on the first separator only.

use std::fmt;

use super::errors::{CatalogError, CatalogResult};

/// Prefix of the physical collections backing timeseries collections.
pub const BUCKET_PREFIX: &str = "system.buckets.";

/// A `(database, collection)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    db: String,
    coll: String,
}

impl Namespace {
    /// Creates a namespace from database and collection names.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    /// Parses a `<db>.<collection>` string, splitting on the first dot.
    pub fn parse(ns: &str) -> CatalogResult<Self> {
        let (db, coll) = ns
            .split_once('.')
            .ok_or_else(|| CatalogError::invalid_namespace(ns))?;
        if db.is_empty() || coll.is_empty() {
            return Err(CatalogError::invalid_namespace(ns));
        }
        Ok(Self::new(db, coll))
    }

    /// Returns the database name.
    pub fn db(&self) -> &str {
        &self.db
    }

    /// Returns the collection name.
    pub fn coll(&self) -> &str {
        &self.coll
    }

    /// Returns true for `system.*` collections.
    pub fn is_system(&self) -> bool {
        self.coll.starts_with("system.")
    }

    /// Returns true for `system.buckets.*` collections.
    pub fn is_bucket(&self) -> bool {
        self.coll.starts_with(BUCKET_PREFIX)
    }

    /// Returns the bucket namespace backing this (timeseries) namespace.
    pub fn bucket(&self) -> Namespace {
        Namespace::new(&self.db, format!("{}{}", BUCKET_PREFIX, self.coll))
    }

    /// For a bucket namespace, returns the user-visible timeseries namespace.
    pub fn unbucketed(&self) -> Namespace {
        match self.coll.strip_prefix(BUCKET_PREFIX) {
            Some(base) => Namespace::new(&self.db, base),
            None => self.clone(),
        }
    }

    /// Returns a namespace with the same database and a different collection.
    pub fn with_coll(&self, coll: impl Into<String>) -> Namespace {
        Namespace::new(&self.db, coll)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

/// Rejects a user-supplied collection argument that names a bucket
/// collection directly.
pub fn reject_bucket_argument(coll: &str) -> CatalogResult<()> {
    if coll.starts_with(BUCKET_PREFIX) {
        return Err(CatalogError::bucket_specified(coll));
    }
    Ok(())
}

/// The seven `config` database collections recognized during restore.
pub const CONFIG_ALLOWLIST: [&str; 7] = [
    "chunks",
    "collections",
    "databases",
    "settings",
    "shards",
    "tags",
    "version",
];

/// Returns true if a `config` collection is one of the recognized set.
pub fn config_collection_recognized(coll: &str) -> bool {
    CONFIG_ALLOWLIST.contains(&coll)
}
