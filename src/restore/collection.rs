//! Per-intent restore execution
//!
//! For one intent: drop if asked, recreate the collection with its stored
//! options (through apply-ops when the UUID must survive), stream the
//! documents through the bulk loader, then build the indexes in one
//! `createIndexes` call with the version-gated rewrites applied.

use std::collections::HashMap;
use std::sync::Mutex;

use bson::{doc, Bson, Document};

use crate::catalog::Namespace;
use crate::intents::{Intent, IntentKind};
use crate::metadata::{
    dedupe_id_indexes, fix_hashed_dotted_indexes, fix_legacy_indexes, CollectionMetadata,
    IndexSpec, MIXED_SCHEMA_OPTION,
};
use crate::server::{uuid_hex_to_binary, ServerSession, ServerVersion};

use super::bulk::BulkLoader;
use super::errors::{RestoreError, RestoreResult};
use super::options::RestoreOptions;

/// Counters for one restored intent.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionStats {
    pub documents: u64,
    pub failed: u64,
    pub indexes_built: u64,
}

/// A cache over `listCollections`, updated as restore creates collections
/// so existence checks stop re-querying the server.
#[derive(Default)]
pub struct KnownCollections {
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl KnownCollections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the collection exists, listing each database once.
    ///
    /// The cache lock is never held across the server round-trip; two
    /// workers racing on a cold database both list it, and the second
    /// merge is harmless.
    pub fn exists(&self, session: &dyn ServerSession, ns: &Namespace) -> RestoreResult<bool> {
        {
            let cache = self.cache.lock().expect("collection cache poisoned");
            if let Some(names) = cache.get(ns.db()) {
                return Ok(names.iter().any(|n| n == ns.coll()));
            }
        }

        let names: Vec<String> = session
            .list_collections(ns.db())?
            .into_iter()
            .map(|c| c.name)
            .collect();

        let mut cache = self.cache.lock().expect("collection cache poisoned");
        let entry = cache.entry(ns.db().to_string()).or_default();
        for name in names {
            if !entry.contains(&name) {
                entry.push(name);
            }
        }
        Ok(entry.iter().any(|n| n == ns.coll()))
    }

    /// Records a collection this run created.
    pub fn record(&self, ns: &Namespace) {
        let mut cache = self.cache.lock().expect("collection cache poisoned");
        cache
            .entry(ns.db().to_string())
            .or_default()
            .push(ns.coll().to_string());
    }

    /// Forgets a collection this run dropped.
    pub fn forget(&self, ns: &Namespace) {
        let mut cache = self.cache.lock().expect("collection cache poisoned");
        if let Some(names) = cache.get_mut(ns.db()) {
            names.retain(|n| n != ns.coll());
        }
    }
}

/// Restores one intent end to end.
pub fn restore_intent(
    session: &dyn ServerSession,
    server_version: ServerVersion,
    options: &RestoreOptions,
    known: &KnownCollections,
    intent: &Intent,
) -> RestoreResult<CollectionStats> {
    let target = intent.namespace().clone();
    let fallback_meta = CollectionMetadata::empty(target.coll());
    let metadata = intent.metadata().unwrap_or(&fallback_meta);

    options.logger.info(
        "RESTORE_COLLECTION",
        &[
            ("namespace", &target.to_string()),
            ("source", &intent.data().describe()),
        ],
    );

    if options.drop {
        session.drop_collection(&target)?;
        known.forget(&target);
        if intent.kind() == IntentKind::Timeseries {
            session.drop_collection(&target.bucket())?;
            known.forget(&target.bucket());
        }
    }

    let exists = known.exists(session, &target)?;
    if !exists {
        create_collection(session, server_version, options, metadata, intent, &target)?;
        known.record(&target);
        if intent.kind() == IntentKind::Timeseries {
            known.record(&target.bucket());
        }
    }

    // A dump that recorded mixed-schema buckets must re-enable the flag
    // before any bucket is loaded
    if metadata.mixed_schema() {
        let mut coll_mod = doc! {"collMod": target.coll()};
        coll_mod.insert(MIXED_SCHEMA_OPTION, true);
        session.run_command(target.db(), coll_mod)?;
    }

    let mut stats = CollectionStats::default();

    if intent.kind() != IntentKind::View {
        if let Some(reader) = intent.data().open()? {
            let (insert_target, coll_mod) = match intent.kind() {
                IntentKind::Timeseries => (target.bucket(), Some(target.clone())),
                _ => (target.clone(), None),
            };
            let loader = BulkLoader::new(session, insert_target, coll_mod, options);
            let insert_stats = loader.load(reader)?;
            stats.documents = insert_stats.inserted;
            stats.failed = insert_stats.failed;
        }
    }

    stats.indexes_built =
        build_indexes(session, server_version, options, metadata, &target)?;
    Ok(stats)
}

fn create_collection(
    session: &dyn ServerSession,
    server_version: ServerVersion,
    options: &RestoreOptions,
    metadata: &CollectionMetadata,
    intent: &Intent,
    target: &Namespace,
) -> RestoreResult<()> {
    let mut create_options = metadata.create_options();
    rewrite_auto_index_id(&mut create_options, server_version, target, &options.logger);

    let mut command = doc! {"create": target.coll()};
    for (key, value) in &create_options {
        command.insert(key.clone(), value.clone());
    }

    match intent.uuid() {
        Some(uuid_hex) if options.preserve_uuid => {
            // A single apply-ops entry is the only way to pin the UUID
            let binary = uuid_hex_to_binary(uuid_hex)?;
            let entry = doc! {
                "op": "c",
                "ns": format!("{}.$cmd", target.db()),
                "ui": Bson::Binary(binary),
                "o": command,
            };
            session.apply_ops(&[entry])?;
        }
        _ => {
            session.run_command(target.db(), command)?;
        }
    }
    Ok(())
}

/// `autoIndexId: false` stopped being accepted at 4.0 everywhere except
/// the `local` database.
fn rewrite_auto_index_id(
    options: &mut Document,
    server_version: ServerVersion,
    target: &Namespace,
    logger: &crate::observability::Logger,
) {
    if !server_version.rejects_auto_index_id_false() || target.db() == "local" {
        return;
    }
    if options.get_bool("autoIndexId") == Ok(false) {
        logger.warn(
            "RESTORE_AUTO_INDEX_ID",
            &[("namespace", &target.to_string())],
        );
        options.insert("autoIndexId", true);
    }
}

fn build_indexes(
    session: &dyn ServerSession,
    server_version: ServerVersion,
    options: &RestoreOptions,
    metadata: &CollectionMetadata,
    target: &Namespace,
) -> RestoreResult<u64> {
    let mut specs: Vec<IndexSpec> = metadata.indexes.clone();
    if options.fix_legacy_indexes {
        specs = fix_legacy_indexes(specs);
    }
    if options.fix_dotted_hashed_indexes {
        fix_hashed_dotted_indexes(&mut specs);
    }
    specs = dedupe_id_indexes(specs);

    if specs.is_empty() {
        return Ok(0);
    }

    let mut prepared = Vec::with_capacity(specs.len());
    for spec in &specs {
        prepared.push(spec.prepare_for_server(
            target,
            server_version,
            options.keep_index_version,
        )?);
    }

    let names: Vec<&str> = specs.iter().map(|s| s.name()).collect();
    options.logger.info(
        "RESTORE_INDEXES",
        &[
            ("namespace", &target.to_string()),
            ("indexes", &names.join(", ")),
        ],
    );

    let mut command = doc! {
        "createIndexes": target.coll(),
        "indexes": prepared.iter().cloned().map(Bson::Document).collect::<Vec<_>>(),
    };
    if server_version.supports_ignore_unknown_index_options() {
        command.insert("ignoreUnknownIndexOptions", true);
    }

    match session.run_command(target.db(), command) {
        Ok(_) => Ok(prepared.len() as u64),
        Err(e) if e.is_unknown_command() => {
            // Ancient servers build indexes through system.indexes inserts
            options.logger.warn(
                "RESTORE_LEGACY_INDEX_PATH",
                &[("namespace", &target.to_string())],
            );
            let system_indexes = Namespace::new(target.db(), "system.indexes");
            for mut spec in prepared {
                spec.insert("ns", target.to_string());
                let mut raw = Vec::new();
                spec.to_writer(&mut raw).map_err(|e| {
                    RestoreError::index(format!("unencodable index spec: {}", e))
                })?;
                let result = session.insert_many(&system_indexes, &[raw], true, false)?;
                if let Some(failure) = result.failures.first() {
                    return Err(RestoreError::index(format!(
                        "legacy index insert failed: {}",
                        failure
                    )));
                }
            }
            Ok(specs.len() as u64)
        }
        Err(e) => Err(RestoreError::index(format!(
            "createIndexes on {} failed: {}",
            target, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intents::DataLocation;
    use crate::observability::Logger;
    use crate::server::{CollectionKind, MemoryServer};
    use std::sync::Arc;

    fn quiet() -> RestoreOptions {
        RestoreOptions {
            logger: Logger::quiet(),
            ..RestoreOptions::default()
        }
    }

    fn docs_buffer(count: i32) -> DataLocation {
        let mut out = Vec::new();
        for i in 0..count {
            doc! {"_id": i}.to_writer(&mut out).unwrap();
        }
        DataLocation::Buffer(Arc::new(out))
    }

    fn v8() -> ServerVersion {
        ServerVersion::new(8, 0, 0)
    }

    #[test]
    fn test_restore_plain_collection() {
        let server = MemoryServer::new();
        let ns = Namespace::new("db1", "users");
        let mut metadata = CollectionMetadata::empty("users");
        metadata.indexes = vec![IndexSpec::from_document(
            &doc! {"v": 2, "key": {"a": 1}, "name": "a_1"},
        )
        .unwrap()];

        let intent = Intent::new(ns.clone(), IntentKind::Normal)
            .with_metadata(metadata)
            .with_data(docs_buffer(10));

        let known = KnownCollections::new();
        let stats = restore_intent(&server, v8(), &quiet(), &known, &intent).unwrap();
        assert_eq!(stats.documents, 10);
        assert_eq!(stats.indexes_built, 1);

        let snapshot = server.snapshot(&ns).unwrap();
        assert_eq!(snapshot.documents.len(), 10);
        assert!(snapshot
            .indexes
            .iter()
            .any(|i| i.get_str("name") == Ok("a_1")));
    }

    #[test]
    fn test_drop_recreates() {
        let server = MemoryServer::new();
        let ns = Namespace::new("db1", "users");
        server.seed_collection(&ns, doc! {}, vec![doc! {"_id": "stale"}]);

        let intent = Intent::new(ns.clone(), IntentKind::Normal)
            .with_metadata(CollectionMetadata::empty("users"))
            .with_data(docs_buffer(3));

        let options = RestoreOptions {
            drop: true,
            ..quiet()
        };
        let known = KnownCollections::new();
        restore_intent(&server, v8(), &options, &known, &intent).unwrap();

        let snapshot = server.snapshot(&ns).unwrap();
        assert_eq!(snapshot.documents.len(), 3);
        assert!(snapshot.documents.iter().all(|d| d.get_str("_id").is_err()));
    }

    #[test]
    fn test_existing_collection_kept_without_drop() {
        let server = MemoryServer::new();
        let ns = Namespace::new("db1", "users");
        server.seed_collection(&ns, doc! {}, vec![doc! {"_id": "old"}]);

        let intent = Intent::new(ns.clone(), IntentKind::Normal)
            .with_metadata(CollectionMetadata::empty("users"))
            .with_data(docs_buffer(2));

        let known = KnownCollections::new();
        restore_intent(&server, v8(), &quiet(), &known, &intent).unwrap();

        // Old and new documents coexist
        assert_eq!(server.snapshot(&ns).unwrap().documents.len(), 3);
    }

    #[test]
    fn test_preserve_uuid() {
        let server = MemoryServer::new();
        let ns = Namespace::new("db1", "users");
        let uuid = "699f503df64b4aa8a484a8052046fa3a";

        let mut metadata = CollectionMetadata::empty("users");
        metadata.uuid = Some(uuid.to_string());
        let intent = Intent::new(ns.clone(), IntentKind::Normal)
            .with_metadata(metadata)
            .with_data(docs_buffer(1));

        let options = RestoreOptions {
            drop: true,
            preserve_uuid: true,
            ..quiet()
        };
        let known = KnownCollections::new();
        restore_intent(&server, v8(), &options, &known, &intent).unwrap();

        assert_eq!(server.snapshot(&ns).unwrap().uuid.as_deref(), Some(uuid));
    }

    #[test]
    fn test_auto_index_id_rewritten() {
        let server = MemoryServer::new();
        let ns = Namespace::new("db1", "legacy");
        let mut metadata = CollectionMetadata::empty("legacy");
        metadata.options = doc! {"autoIndexId": false};

        let intent = Intent::new(ns.clone(), IntentKind::Normal).with_metadata(metadata);
        let known = KnownCollections::new();
        restore_intent(&server, v8(), &quiet(), &known, &intent).unwrap();

        let snapshot = server.snapshot(&ns).unwrap();
        assert_eq!(snapshot.options.get_bool("autoIndexId"), Ok(true));
    }

    #[test]
    fn test_auto_index_id_kept_for_local_db() {
        let server = MemoryServer::new();
        let ns = Namespace::new("local", "startup_log");
        let mut metadata = CollectionMetadata::empty("startup_log");
        metadata.options = doc! {"autoIndexId": false};

        let intent = Intent::new(ns.clone(), IntentKind::Normal).with_metadata(metadata);
        let known = KnownCollections::new();
        restore_intent(&server, v8(), &quiet(), &known, &intent).unwrap();

        let snapshot = server.snapshot(&ns).unwrap();
        assert_eq!(snapshot.options.get_bool("autoIndexId"), Ok(false));
    }

    #[test]
    fn test_view_created_without_data() {
        let server = MemoryServer::new();
        server.seed_collection(&Namespace::new("db1", "scores"), doc! {}, vec![]);

        let ns = Namespace::new("db1", "top");
        let mut metadata = CollectionMetadata::empty("top");
        metadata.kind = CollectionKind::View;
        metadata.options = doc! {"viewOn": "scores", "pipeline": [{"$match": {}}]};

        let intent = Intent::new(ns.clone(), IntentKind::View).with_metadata(metadata);
        let known = KnownCollections::new();
        let stats = restore_intent(&server, v8(), &quiet(), &known, &intent).unwrap();

        assert_eq!(stats.documents, 0);
        let snapshot = server.snapshot(&ns).unwrap();
        assert_eq!(snapshot.kind, CollectionKind::View);
        assert_eq!(snapshot.options.get_str("viewOn"), Ok("scores"));
    }

    #[test]
    fn test_timeseries_restore_loads_bucket() {
        let server = MemoryServer::new();
        let ns = Namespace::new("db1", "weather");

        let mut metadata = CollectionMetadata::empty("weather");
        metadata.kind = CollectionKind::Timeseries;
        metadata.options = doc! {"timeseries": {"timeField": "t", "metaField": "m"}};
        metadata.set_mixed_schema();

        let intent = Intent::new(ns.clone(), IntentKind::Timeseries)
            .with_metadata(metadata)
            .with_data(docs_buffer(2));

        let known = KnownCollections::new();
        let stats = restore_intent(&server, v8(), &quiet(), &known, &intent).unwrap();
        assert_eq!(stats.documents, 2);

        // Documents landed in the bucket collection, not the view
        let bucket = server.snapshot(&ns.bucket()).unwrap();
        assert_eq!(bucket.documents.len(), 2);
        assert!(bucket.mixed_schema_allowed);
        let user = server.snapshot(&ns).unwrap();
        assert_eq!(user.kind, CollectionKind::Timeseries);
        assert!(user.documents.is_empty());
    }

    #[test]
    fn test_clustered_index_options_preserved() {
        let server = MemoryServer::new();
        let ns = Namespace::new("db1", "events");
        let mut metadata = CollectionMetadata::empty("events");
        metadata.options = doc! {
            "clusteredIndex": {"key": {"_id": 1}, "unique": true, "name": "events clustered"},
        };

        let intent = Intent::new(ns.clone(), IntentKind::Normal).with_metadata(metadata);
        let known = KnownCollections::new();
        restore_intent(&server, v8(), &quiet(), &known, &intent).unwrap();

        let snapshot = server.snapshot(&ns).unwrap();
        let clustered = snapshot.options.get_document("clusteredIndex").unwrap();
        assert_eq!(clustered.get_str("name"), Ok("events clustered"));
    }

    #[test]
    fn test_long_index_name_rejected_below_4_2() {
        let server = MemoryServer::with_version(ServerVersion::new(4, 0, 0));
        let ns = Namespace::new("db1", "users");
        let mut metadata = CollectionMetadata::empty("users");
        metadata.indexes = vec![IndexSpec::new(doc! {"a": 1}, "n".repeat(140))];

        let intent = Intent::new(ns, IntentKind::Normal).with_metadata(metadata);
        let known = KnownCollections::new();
        let err = restore_intent(
            &server,
            ServerVersion::new(4, 0, 0),
            &quiet(),
            &known,
            &intent,
        )
        .unwrap_err();
        assert_eq!(err.code().as_str(), "DV_RESTORE_INDEX");
    }

    #[test]
    fn test_hashed_dotted_fix_applied() {
        let server = MemoryServer::new();
        let ns = Namespace::new("db1", "users");
        let mut metadata = CollectionMetadata::empty("users");
        metadata.indexes = vec![
            IndexSpec::from_document(&doc! {"v": 2, "key": {"a.a": 1}, "name": "aa"}).unwrap(),
            IndexSpec::from_document(&doc! {"v": 2, "key": {"a.b": "hashed"}, "name": "ab"})
                .unwrap(),
            IndexSpec::from_document(&doc! {"v": 2, "key": {"b": "hashed"}, "name": "b"}).unwrap(),
        ];

        let intent = Intent::new(ns.clone(), IntentKind::Normal).with_metadata(metadata);
        let options = RestoreOptions {
            fix_dotted_hashed_indexes: true,
            ..quiet()
        };
        let known = KnownCollections::new();
        restore_intent(&server, v8(), &options, &known, &intent).unwrap();

        let indexes = server.snapshot(&ns).unwrap().indexes;
        let key_of = |name: &str| -> Document {
            indexes
                .iter()
                .find(|i| i.get_str("name") == Ok(name))
                .unwrap()
                .get_document("key")
                .unwrap()
                .clone()
        };
        assert_eq!(key_of("aa"), doc! {"a.a": 1});
        assert_eq!(key_of("ab"), doc! {"a.b": 1});
        assert_eq!(key_of("b"), doc! {"b": "hashed"});
    }
}
