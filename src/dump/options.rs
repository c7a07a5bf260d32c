//! Dump configuration

use bson::Document;

use crate::catalog::reject_bucket_argument;
use crate::observability::Logger;

use super::errors::{DumpError, DumpResult};

/// Configuration for one dump run.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Restrict to one database
    pub db: Option<String>,
    /// Restrict to one collection (requires `db`)
    pub collection: Option<String>,
    /// Filter applied to the (single) dumped collection
    pub query: Option<Document>,
    /// Collection names to exclude
    pub exclude_collections: Vec<String>,
    /// Collection name prefixes to exclude
    pub exclude_prefixes: Vec<String>,
    /// Also dump users/roles for a db-scoped dump
    pub dump_users_and_roles: bool,
    /// Capture the replication log around the data copy
    pub oplog: bool,
    /// Collection worker pool size
    pub num_parallel_collections: usize,
    /// Gzip directory-mode output files
    pub gzip: bool,
    pub logger: Logger,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            db: None,
            collection: None,
            query: None,
            exclude_collections: Vec::new(),
            exclude_prefixes: Vec::new(),
            dump_users_and_roles: false,
            oplog: false,
            num_parallel_collections: 1,
            gzip: false,
            logger: Logger::default(),
        }
    }
}

impl DumpOptions {
    /// Validates option combinations before any I/O.
    pub fn validate(&self) -> DumpResult<()> {
        if self.collection.is_some() && self.db.is_none() {
            return Err(DumpError::validation(
                "cannot dump a collection without a database",
            ));
        }
        if let Some(coll) = &self.collection {
            reject_bucket_argument(coll)?;
        }
        if self.query.is_some() && self.collection.is_none() {
            return Err(DumpError::validation(
                "cannot dump using a query without a collection",
            ));
        }
        if self.collection.is_some()
            && (!self.exclude_collections.is_empty() || !self.exclude_prefixes.is_empty())
        {
            return Err(DumpError::validation(
                "exclusion filters cannot be combined with a single collection",
            ));
        }
        if self.oplog && (self.db.is_some() || self.collection.is_some()) {
            return Err(DumpError::validation(
                "oplog capture requires a full dump, not a db or collection scope",
            ));
        }
        if self.num_parallel_collections == 0 {
            return Err(DumpError::validation(
                "the collection worker pool needs at least one worker",
            ));
        }
        Ok(())
    }

    /// Returns true when `coll` is excluded by name or prefix.
    pub fn is_excluded(&self, coll: &str) -> bool {
        self.exclude_collections.iter().any(|c| c == coll)
            || self.exclude_prefixes.iter().any(|p| coll.starts_with(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_default_is_valid() {
        DumpOptions::default().validate().unwrap();
    }

    #[test]
    fn test_collection_requires_db() {
        let options = DumpOptions {
            collection: Some("users".into()),
            ..DumpOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_bucket_collection_rejected() {
        let options = DumpOptions {
            db: Some("db1".into()),
            collection: Some("system.buckets.weather".into()),
            ..DumpOptions::default()
        };
        let err = options.validate().unwrap_err();
        assert_eq!(err.code().as_str(), "DV_DUMP_VALIDATION");
    }

    #[test]
    fn test_query_requires_collection() {
        let options = DumpOptions {
            db: Some("db1".into()),
            query: Some(doc! {"a": 1}),
            ..DumpOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_oplog_requires_full_scope() {
        let options = DumpOptions {
            db: Some("db1".into()),
            oplog: true,
            ..DumpOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_exclusions() {
        let options = DumpOptions {
            exclude_collections: vec!["skipme".into()],
            exclude_prefixes: vec!["tmp_".into()],
            ..DumpOptions::default()
        };
        assert!(options.is_excluded("skipme"));
        assert!(options.is_excluded("tmp_scratch"));
        assert!(!options.is_excluded("keepme"));
    }

    #[test]
    fn test_exclusions_conflict_with_single_collection() {
        let options = DumpOptions {
            db: Some("db1".into()),
            collection: Some("users".into()),
            exclude_collections: vec!["other".into()],
            ..DumpOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
