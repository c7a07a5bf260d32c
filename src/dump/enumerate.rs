//! Namespace enumeration
//!
//! Walks the server's databases and collections, applies the scope and
//! exclusion filters, validates timeseries queries, and produces the
//! intent plan with metadata (options, UUID, indexes) captured up front so
//! the archive prelude can be complete before any body bytes flow.

use bson::Document;

use crate::catalog::Namespace;
use crate::intents::{Intent, IntentKind, IntentManager};
use crate::metadata::{CollectionMetadata, IndexSpec};
use crate::server::{CollectionKind, CollectionSpec, ServerSession};

use super::errors::{DumpError, DumpResult};
use super::options::DumpOptions;

/// Databases never dumped.
const SKIPPED_DATABASES: [&str; 1] = ["local"];

/// Returns true for system collections that enumeration skips.
///
/// Buckets are skipped here because their timeseries collection owns
/// them; users, roles, and the auth version doc are dumped through their
/// dedicated streams, not as ordinary collections.
fn skip_system_collection(coll: &str) -> bool {
    coll.starts_with("system.")
}

/// Validates a query against a timeseries collection's metadata field.
///
/// Only filters referencing the metadata field can be pushed down to the
/// bucket scan; anything else is a hard error before any I/O.
fn validate_timeseries_query(
    ns: &Namespace,
    options: &Document,
    query: &Document,
) -> DumpResult<()> {
    let meta_field = options
        .get_document("timeseries")
        .ok()
        .and_then(|ts| ts.get_str("metaField").ok())
        .map(|s| s.to_string());

    let Some(meta_field) = meta_field else {
        return Err(DumpError::validation(format!(
            "cannot query timeseries collection {} because it has no metadata field",
            ns
        )));
    };

    for key in query.keys() {
        let allowed = key == &meta_field || key.starts_with(&format!("{}.", meta_field));
        if !allowed {
            return Err(DumpError::validation(format!(
                "cannot process query {:?} for timeseries collection {}: \
                 only queries on the metadata field '{}' are supported",
                query, ns, meta_field
            )));
        }
    }
    Ok(())
}

fn metadata_for(
    session: &dyn ServerSession,
    ns: &Namespace,
    spec: &CollectionSpec,
) -> DumpResult<CollectionMetadata> {
    // Views have no indexes; timeseries indexes live on the user-visible
    // namespace
    let indexes = match spec.kind {
        CollectionKind::View => Vec::new(),
        _ => {
            let mut specs = Vec::new();
            for doc in session.list_indexes(ns)? {
                specs.push(IndexSpec::from_document(&doc)?);
            }
            specs
        }
    };

    Ok(CollectionMetadata {
        collection_name: spec.name.clone(),
        kind: spec.kind,
        uuid: spec.uuid.clone(),
        options: spec.options.clone(),
        indexes,
    })
}

/// Builds the dump plan.
pub fn build_plan(
    session: &dyn ServerSession,
    options: &DumpOptions,
) -> DumpResult<IntentManager> {
    let info = session.info()?;
    let mut manager = IntentManager::new();

    let databases: Vec<String> = match &options.db {
        Some(db) => vec![db.clone()],
        None => session
            .list_database_names()?
            .into_iter()
            .filter(|db| !SKIPPED_DATABASES.contains(&db.as_str()))
            // A managed proxy owns admin and config outright
            .filter(|db| !(info.managed_proxy && (db == "admin" || db == "config")))
            .collect(),
    };

    for db in &databases {
        let specs = session.list_collections(db)?;

        if let Some(wanted) = &options.collection {
            let spec = specs
                .iter()
                .find(|s| &s.name == wanted)
                .ok_or_else(|| {
                    DumpError::enumeration(format!("collection {}.{} not found", db, wanted))
                })?;
            insert_intent(session, &mut manager, db, spec, options)?;
            continue;
        }

        for spec in &specs {
            if options.is_excluded(&spec.name) {
                continue;
            }
            if skip_system_collection(&spec.name) {
                continue;
            }
            insert_intent(session, &mut manager, db, spec, options)?;
        }
    }

    manager.finalize_dump();
    Ok(manager)
}

fn insert_intent(
    session: &dyn ServerSession,
    manager: &mut IntentManager,
    db: &str,
    spec: &CollectionSpec,
    options: &DumpOptions,
) -> DumpResult<()> {
    let ns = Namespace::new(db, &spec.name);

    if let Some(query) = &options.query {
        if spec.kind == CollectionKind::Timeseries {
            validate_timeseries_query(&ns, &spec.options, query)?;
        }
    }

    let metadata = metadata_for(session, &ns, spec)?;
    let kind = match spec.kind {
        CollectionKind::Collection => IntentKind::Normal,
        CollectionKind::View => IntentKind::View,
        CollectionKind::Timeseries => IntentKind::Timeseries,
    };

    // The scan target: timeseries collections dump their bucket collection
    let scan_ns = match kind {
        IntentKind::Timeseries => ns.bucket(),
        _ => ns.clone(),
    };
    let size_hint = match kind {
        IntentKind::View => 0,
        _ => session.collection_byte_size(&scan_ns)?,
    };

    manager
        .insert(
            Intent::new(ns, kind)
                .with_metadata(metadata)
                .with_size_hint(size_hint),
        )
        .map_err(|e| DumpError::enumeration(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::MemoryServer;
    use bson::doc;

    fn options() -> DumpOptions {
        DumpOptions {
            logger: crate::observability::Logger::quiet(),
            ..DumpOptions::default()
        }
    }

    fn seeded_server() -> MemoryServer {
        let server = MemoryServer::new();
        server.seed_collection(
            &Namespace::new("db1", "users"),
            doc! {},
            vec![doc! {"_id": 1}],
        );
        server.seed_collection(&Namespace::new("db1", "system.js"), doc! {}, vec![]);
        server.seed_collection(&Namespace::new("db2", "logs"), doc! {}, vec![]);
        server
    }

    #[test]
    fn test_full_enumeration_skips_system() {
        let server = seeded_server();
        let manager = build_plan(&server, &options()).unwrap();
        let names: Vec<String> = manager.iter().map(|i| i.namespace().to_string()).collect();
        assert_eq!(names, vec!["db1.users", "db2.logs"]);
    }

    #[test]
    fn test_db_scope() {
        let server = seeded_server();
        let opts = DumpOptions {
            db: Some("db2".into()),
            ..options()
        };
        let manager = build_plan(&server, &opts).unwrap();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.iter().next().unwrap().namespace().db(), "db2");
    }

    #[test]
    fn test_missing_collection_is_enumeration_error() {
        let server = seeded_server();
        let opts = DumpOptions {
            db: Some("db1".into()),
            collection: Some("absent".into()),
            ..options()
        };
        let err = build_plan(&server, &opts).unwrap_err();
        assert_eq!(err.code().as_str(), "DV_DUMP_ENUMERATION");
    }

    #[test]
    fn test_exclusions_apply() {
        let server = seeded_server();
        let opts = DumpOptions {
            exclude_prefixes: vec!["log".into()],
            ..options()
        };
        let manager = build_plan(&server, &opts).unwrap();
        let names: Vec<String> = manager.iter().map(|i| i.namespace().to_string()).collect();
        assert_eq!(names, vec!["db1.users"]);
    }

    #[test]
    fn test_timeseries_intent_owns_bucket_scan() {
        let server = MemoryServer::new();
        server
            .run_command(
                "db1",
                doc! {"create": "weather", "timeseries": {"timeField": "t", "metaField": "m"}},
            )
            .unwrap();

        let manager = build_plan(&server, &options()).unwrap();
        // Exactly one intent: the bucket collection is owned, not listed
        assert_eq!(manager.len(), 1);
        let intent = manager.iter().next().unwrap();
        assert_eq!(intent.kind(), IntentKind::Timeseries);
        assert_eq!(intent.namespace().coll(), "weather");
    }

    #[test]
    fn test_timeseries_query_on_meta_field_allowed() {
        let server = MemoryServer::new();
        server
            .run_command(
                "db1",
                doc! {"create": "weather", "timeseries": {"timeField": "t", "metaField": "m"}},
            )
            .unwrap();

        let opts = DumpOptions {
            db: Some("db1".into()),
            collection: Some("weather".into()),
            query: Some(doc! {"m.site": "north"}),
            ..options()
        };
        assert!(build_plan(&server, &opts).is_ok());
    }

    #[test]
    fn test_timeseries_query_on_other_field_rejected() {
        let server = MemoryServer::new();
        server
            .run_command(
                "db1",
                doc! {"create": "weather", "timeseries": {"timeField": "t", "metaField": "m"}},
            )
            .unwrap();

        let opts = DumpOptions {
            db: Some("db1".into()),
            collection: Some("weather".into()),
            query: Some(doc! {"temperature": {"$gt": 3}}),
            ..options()
        };
        let err = build_plan(&server, &opts).unwrap_err();
        assert_eq!(err.code().as_str(), "DV_DUMP_VALIDATION");
    }

    #[test]
    fn test_managed_proxy_skips_admin_and_config() {
        let server = MemoryServer::new().with_managed_proxy();
        server.seed_collection(&Namespace::new("db1", "users"), doc! {}, vec![]);
        server.seed_collection(&Namespace::new("admin", "things"), doc! {}, vec![]);
        server.seed_collection(&Namespace::new("config", "settings"), doc! {}, vec![]);

        let manager = build_plan(&server, &options()).unwrap();
        let names: Vec<String> = manager.iter().map(|i| i.namespace().to_string()).collect();
        assert_eq!(names, vec!["db1.users"]);
    }
}
